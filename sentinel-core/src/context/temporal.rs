//! Temporal risk detection.
//!
//! Maps the current message into the caller's timezone and checks three
//! factors: late-night posting, rapid posting bursts, and weekends. Each
//! factor adds to a capped `risk_modifier` that raises intervention urgency
//! but never touches the crisis score itself.

use crate::config::{ContextConfig, parse_hh_mm};
use crate::types::{HistoryItem, TemporalAssessment, TimeOfDayRisk};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use tracing::debug;

/// Detects time-based risk factors.
pub struct TemporalDetector {
    late_night_start: (u32, u32),
    late_night_end: (u32, u32),
    rapid_posting_k: usize,
    rapid_posting_window_min: i64,
    cap: f64,
    late_night_modifier: f64,
    rapid_posting_modifier: f64,
    weekend_modifier: f64,
}

impl TemporalDetector {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            late_night_start: parse_hh_mm(&config.late_night_start),
            late_night_end: parse_hh_mm(&config.late_night_end),
            rapid_posting_k: config.rapid_posting_k,
            rapid_posting_window_min: config.rapid_posting_window_min,
            cap: config.temporal_modifier_cap,
            late_night_modifier: config.late_night_modifier,
            rapid_posting_modifier: config.rapid_posting_modifier,
            weekend_modifier: config.weekend_modifier,
        }
    }

    /// Analyze the current moment plus the (validated) history timestamps.
    pub fn detect(
        &self,
        now: DateTime<Utc>,
        timezone: Option<&str>,
        history: &[HistoryItem],
    ) -> TemporalAssessment {
        let tz = resolve_timezone(timezone);
        let local = now.with_timezone(&tz);

        let late_night = self.in_late_night_window(local.hour(), local.minute());
        let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);

        // The current message counts toward the burst.
        let window_start = now - Duration::minutes(self.rapid_posting_window_min);
        let recent = history
            .iter()
            .filter(|item| item.timestamp > window_start && item.timestamp <= now)
            .count()
            + 1;
        let rapid_posting = recent >= self.rapid_posting_k;
        let posting_frequency = if self.rapid_posting_window_min > 0 {
            recent as f64 / self.rapid_posting_window_min as f64
        } else {
            0.0
        };

        let mut risk_modifier = 0.0;
        if late_night {
            risk_modifier += self.late_night_modifier;
        }
        if rapid_posting {
            risk_modifier += self.rapid_posting_modifier;
        }
        if weekend {
            risk_modifier += self.weekend_modifier;
        }
        risk_modifier = risk_modifier.min(self.cap);

        debug!(
            timezone = %tz,
            late_night,
            rapid_posting,
            weekend,
            risk_modifier,
            "Temporal factors computed"
        );

        TemporalAssessment {
            time_of_day_risk: if late_night {
                TimeOfDayRisk::LateNight
            } else {
                TimeOfDayRisk::Normal
            },
            rapid_posting,
            posting_frequency,
            weekend,
            risk_modifier,
        }
    }

    /// Late-night windows usually cross midnight (22:00–04:00).
    fn in_late_night_window(&self, hour: u32, minute: u32) -> bool {
        let t = (hour, minute);
        let start = self.late_night_start;
        let end = self.late_night_end;
        if start <= end {
            t >= start && t < end
        } else {
            t >= start || t < end
        }
    }
}

/// Parse an IANA timezone name, falling back to UTC.
fn resolve_timezone(timezone: Option<&str>) -> Tz {
    match timezone {
        Some(name) => name.parse().unwrap_or_else(|_| {
            debug!(timezone = name, "Unknown timezone, falling back to UTC");
            Tz::UTC
        }),
        None => Tz::UTC,
    }
}
