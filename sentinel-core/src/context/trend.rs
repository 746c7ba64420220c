//! Trend analysis over the scored history series.
//!
//! Fits a simple linear regression over the last N scores to classify the
//! direction, overriding to volatile when the deltas swing too hard. A
//! 3-point moving average smooths the series before inflection points are
//! located.

use crate::config::ContextConfig;
use crate::types::{TrendAssessment, TrendDirection};
use tracing::debug;

/// Classifies the score trend.
pub struct TrendAnalyzer {
    window_n: usize,
    epsilon: f64,
    volatility_bound: f64,
}

impl TrendAnalyzer {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            window_n: config.trend_window_n.max(2),
            epsilon: config.trend_epsilon,
            volatility_bound: config.trend_volatility,
        }
    }

    /// Analyze the chronological score series (current message last).
    pub fn analyze(&self, scores: &[f64]) -> TrendAssessment {
        let window: &[f64] = if scores.len() > self.window_n {
            &scores[scores.len() - self.window_n..]
        } else {
            scores
        };

        if window.len() < 2 {
            return TrendAssessment {
                direction: TrendDirection::Stable,
                velocity: 0.0,
                inflection_points: Vec::new(),
            };
        }

        let slope = regression_slope(window);
        let deltas: Vec<f64> = window.windows(2).map(|w| w[1] - w[0]).collect();
        let delta_std = std_dev(&deltas);

        let direction = if delta_std > self.volatility_bound {
            TrendDirection::Volatile
        } else if slope >= self.epsilon {
            TrendDirection::Worsening
        } else if slope <= -self.epsilon {
            TrendDirection::Improving
        } else {
            TrendDirection::Stable
        };

        let smoothed = smooth(scores);
        let inflection_points = inflections(&smoothed);

        debug!(
            direction = %direction,
            slope,
            delta_std,
            window = window.len(),
            "Trend analyzed"
        );

        TrendAssessment {
            direction,
            velocity: slope.abs(),
            inflection_points,
        }
    }
}

/// Least-squares slope of `scores` against their indices.
fn regression_slope(scores: &[f64]) -> f64 {
    let n = scores.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = scores.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in scores.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 { 0.0 } else { num / den }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// 3-point centered moving average; endpoints keep their raw values.
pub fn smooth(scores: &[f64]) -> Vec<f64> {
    if scores.len() < 3 {
        return scores.to_vec();
    }
    let mut smoothed = Vec::with_capacity(scores.len());
    smoothed.push(scores[0]);
    for i in 1..scores.len() - 1 {
        smoothed.push((scores[i - 1] + scores[i] + scores[i + 1]) / 3.0);
    }
    smoothed.push(*scores.last().unwrap());
    smoothed
}

/// Indices where the smoothed delta changes sign (zero deltas are carried).
fn inflections(smoothed: &[f64]) -> Vec<usize> {
    let deltas: Vec<f64> = smoothed.windows(2).map(|w| w[1] - w[0]).collect();
    let mut points = Vec::new();
    let mut prev_sign = 0i8;
    for (i, delta) in deltas.iter().enumerate() {
        let sign = if *delta > 1e-12 {
            1
        } else if *delta < -1e-12 {
            -1
        } else {
            0
        };
        if sign != 0 {
            if prev_sign != 0 && sign != prev_sign {
                points.push(i + 1);
            }
            prev_sign = sign;
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> TrendAnalyzer {
        TrendAnalyzer::new(&ContextConfig::default())
    }

    #[test]
    fn test_worsening_trend() {
        let result = analyzer().analyze(&[0.2, 0.3, 0.4, 0.5, 0.6, 0.7]);
        assert_eq!(result.direction, TrendDirection::Worsening);
        assert!((result.velocity - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_improving_trend() {
        let result = analyzer().analyze(&[0.7, 0.6, 0.5, 0.4, 0.3, 0.2]);
        assert_eq!(result.direction, TrendDirection::Improving);
    }

    #[test]
    fn test_stable_trend() {
        let result = analyzer().analyze(&[0.40, 0.41, 0.39, 0.40, 0.41, 0.40]);
        assert_eq!(result.direction, TrendDirection::Stable);
        assert!(result.velocity < 0.02);
    }

    #[test]
    fn test_volatile_overrides_direction() {
        let result = analyzer().analyze(&[0.1, 0.8, 0.15, 0.9, 0.2, 0.85]);
        assert_eq!(result.direction, TrendDirection::Volatile);
    }

    #[test]
    fn test_window_limits_regression() {
        // Old declining scores fall outside the 6-item window; recent
        // scores rise.
        let scores = [0.9, 0.8, 0.7, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7];
        let result = analyzer().analyze(&scores);
        assert_eq!(result.direction, TrendDirection::Worsening);
    }

    #[test]
    fn test_short_series_is_stable() {
        let result = analyzer().analyze(&[0.5]);
        assert_eq!(result.direction, TrendDirection::Stable);
        assert_eq!(result.velocity, 0.0);
    }

    #[test]
    fn test_smooth_preserves_endpoints() {
        let smoothed = smooth(&[0.0, 0.9, 0.0, 0.9, 0.0]);
        assert_eq!(smoothed[0], 0.0);
        assert_eq!(*smoothed.last().unwrap(), 0.0);
        assert_eq!(smoothed.len(), 5);
        // Interior points are averaged.
        assert!((smoothed[1] - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_inflection_points_after_smoothing() {
        // Rise then fall: one inflection where the smoothed delta flips.
        let result = analyzer().analyze(&[0.1, 0.3, 0.5, 0.4, 0.2, 0.1]);
        assert!(!result.inflection_points.is_empty());
    }

    #[test]
    fn test_monotonic_series_has_no_inflections() {
        let result = analyzer().analyze(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert!(result.inflection_points.is_empty());
    }

    #[test]
    fn test_regression_slope_exact() {
        assert!((regression_slope(&[0.0, 0.1, 0.2, 0.3]) - 0.1).abs() < 1e-9);
        assert!(regression_slope(&[0.5, 0.5, 0.5]).abs() < 1e-12);
    }
}
