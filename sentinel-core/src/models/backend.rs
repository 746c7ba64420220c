//! Inference transport behind the model wrappers.
//!
//! A wrapper owns the *meaning* of a model's output (which labels matter,
//! how the crisis signal is extracted); a backend owns the *mechanics* of
//! producing a label distribution. Three implementations:
//!
//! - [`HttpBackend`] — a co-located transformers serving sidecar.
//! - [`LexiconBackend`] — deterministic in-process keyword scoring, used
//!   when no endpoint is configured.
//! - [`MockBackend`] — queued canned distributions for tests.

use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// A classification request forwarded to a backend.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyRequest {
    /// Upstream model identifier (e.g. `facebook/bart-large-mnli`).
    pub model_id: String,
    /// Optional revision pin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub text: String,
    pub labels: Vec<String>,
    /// Zero-shot hypothesis template; `{}` is replaced by each label.
    pub hypothesis_template: String,
    /// Whether labels are scored independently (multi-label) or softmaxed.
    pub multi_label: bool,
}

/// A label distribution returned by a backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifyOutput {
    pub scores: BTreeMap<String, f64>,
}

/// Produces label distributions for wrapper requests.
///
/// Implementations must be cheap to call concurrently; per-call timeouts are
/// enforced by the engine, not here.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short backend identifier for logs and `/status`.
    fn name(&self) -> &str;

    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyOutput, ModelError>;
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SidecarRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    revision: Option<&'a str>,
    text: &'a str,
    labels: &'a [String],
    hypothesis_template: &'a str,
    multi_label: bool,
}

#[derive(Debug, Deserialize)]
struct SidecarResponse {
    scores: BTreeMap<String, f64>,
}

/// Backend that calls a transformers serving sidecar over HTTP.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend for the given base URL. The client carries a
    /// generous transport timeout; the engine's per-model budget is the real
    /// bound.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ModelError::Inference {
                model: "http-backend".into(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyOutput, ModelError> {
        let body = SidecarRequest {
            model: &request.model_id,
            revision: request.revision.as_deref(),
            text: &request.text,
            labels: &request.labels,
            hypothesis_template: &request.hypothesis_template,
            multi_label: request.multi_label,
        };

        let response = self
            .client
            .post(format!("{}/classify", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Inference {
                model: request.model_id.clone(),
                message: format!("sidecar request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(ModelError::Inference {
                model: request.model_id.clone(),
                message: format!("sidecar returned HTTP {}", response.status().as_u16()),
            });
        }

        let parsed: SidecarResponse =
            response.json().await.map_err(|e| ModelError::Inference {
                model: request.model_id.clone(),
                message: format!("sidecar response parse failed: {e}"),
            })?;

        if parsed.scores.is_empty() {
            return Err(ModelError::EmptyDistribution {
                model: request.model_id.clone(),
            });
        }

        Ok(ClassifyOutput {
            scores: parsed.scores,
        })
    }
}

// ---------------------------------------------------------------------------
// Lexicon backend
// ---------------------------------------------------------------------------

/// Deterministic keyword scoring, label by label.
///
/// Each known label has a list of `(phrase, weight)` cues; a label's raw
/// score is the capped sum of matched cue weights. Labels with no cues
/// (e.g. "safe", "neutral") receive the residual of the strongest cued
/// label, so benign text lands on the benign labels.
pub struct LexiconBackend {
    cues: BTreeMap<&'static str, Vec<(&'static str, f64)>>,
}

impl Default for LexiconBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconBackend {
    pub fn new() -> Self {
        let mut cues: BTreeMap<&'static str, Vec<(&'static str, f64)>> = BTreeMap::new();
        cues.insert(
            "suicidal ideation",
            vec![
                ("suicide", 0.9),
                ("suicidal", 0.9),
                ("kill myself", 0.95),
                ("end it", 0.8),
                ("end my life", 0.95),
                ("want to die", 0.9),
                ("can't go on", 0.7),
            ],
        );
        cues.insert(
            "self-harm",
            vec![
                ("hurt myself", 0.85),
                ("harm myself", 0.85),
                ("cutting", 0.6),
            ],
        );
        cues.insert(
            "emotional distress",
            vec![
                ("crisis", 0.5),
                ("breakdown", 0.6),
                ("panic", 0.5),
                ("overwhelmed", 0.5),
                ("distress", 0.5),
                ("emergency", 0.5),
                ("can't breathe", 0.6),
                ("hopeless", 0.6),
                ("worthless", 0.6),
                ("can't do this anymore", 0.75),
            ],
        );
        cues.insert(
            "depression",
            vec![
                ("depressed", 0.7),
                ("depression", 0.7),
                ("empty", 0.4),
                ("numb", 0.4),
                ("so alone", 0.5),
            ],
        );
        cues.insert(
            "negative",
            vec![
                ("sad", 0.5),
                ("awful", 0.5),
                ("terrible", 0.5),
                ("hate", 0.5),
                ("miserable", 0.6),
                ("crying", 0.5),
                ("alone", 0.4),
                ("hopeless", 0.7),
                ("can't do this", 0.6),
                ("worst", 0.5),
            ],
        );
        cues.insert(
            "positive",
            vec![
                ("happy", 0.6),
                ("love", 0.5),
                ("great", 0.5),
                ("awesome", 0.6),
                ("fun", 0.5),
                ("excited", 0.6),
            ],
        );
        cues.insert(
            "ironic",
            vec![
                ("lol", 0.5),
                ("lmao", 0.6),
                ("haha", 0.5),
                ("😂", 0.6),
                ("🤣", 0.6),
                ("/s", 0.8),
                ("so funny", 0.5),
                ("yeah right", 0.5),
                ("totally", 0.3),
            ],
        );
        cues.insert(
            "sadness",
            vec![("sad", 0.6), ("crying", 0.6), ("tears", 0.5), ("miserable", 0.6)],
        );
        cues.insert(
            "fear",
            vec![("afraid", 0.6), ("scared", 0.6), ("terrified", 0.7), ("panic", 0.5)],
        );
        cues.insert(
            "anger",
            vec![("angry", 0.6), ("furious", 0.7), ("rage", 0.6), ("hate", 0.5)],
        );
        cues.insert(
            "grief",
            vec![("grief", 0.7), ("loss", 0.4), ("gone forever", 0.6)],
        );
        cues.insert(
            "despair",
            vec![
                ("hopeless", 0.7),
                ("despair", 0.7),
                ("give up", 0.6),
                ("pointless", 0.5),
                ("can't do this anymore", 0.7),
            ],
        );
        cues.insert("joy", vec![("happy", 0.6), ("joy", 0.6), ("excited", 0.6)]);
        Self { cues }
    }

    fn raw_score(&self, label: &str, text: &str) -> Option<f64> {
        let cues = self.cues.get(label)?;
        let mut score = 0.0;
        for (phrase, weight) in cues {
            if text.contains(phrase) {
                score += weight;
            }
        }
        Some(score.min(0.95))
    }
}

#[async_trait]
impl InferenceBackend for LexiconBackend {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyOutput, ModelError> {
        if request.labels.is_empty() {
            return Err(ModelError::EmptyDistribution {
                model: request.model_id.clone(),
            });
        }
        let text = request.text.to_lowercase();

        let mut scores = BTreeMap::new();
        let mut strongest_cued: f64 = 0.0;
        let mut uncued: Vec<String> = Vec::new();
        for label in &request.labels {
            match self.raw_score(label, &text) {
                Some(score) => {
                    strongest_cued = strongest_cued.max(score);
                    scores.insert(label.clone(), score);
                }
                None => uncued.push(label.clone()),
            }
        }

        // Benign labels take the residual of the strongest cued signal.
        let residual = (1.0 - strongest_cued).max(0.05);
        for label in uncued {
            scores.insert(label, residual);
        }

        Ok(ClassifyOutput { scores })
    }
}

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

/// Test backend with queued outcomes, in the spirit of a scripted provider.
///
/// Each `classify` call pops the next queued outcome; when the queue is
/// empty the configured default is returned. Received requests are recorded
/// for assertions.
pub struct MockBackend {
    queue: Mutex<std::collections::VecDeque<Result<ClassifyOutput, ModelError>>>,
    default: Option<ClassifyOutput>,
    requests: Mutex<Vec<ClassifyRequest>>,
}

impl MockBackend {
    /// A mock with no default: exhausting the queue is an inference error.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(std::collections::VecDeque::new()),
            default: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A mock that always returns the given distribution.
    pub fn with_scores(scores: &[(&str, f64)]) -> Self {
        let mut map = BTreeMap::new();
        for (label, score) in scores {
            map.insert(label.to_string(), *score);
        }
        Self {
            queue: Mutex::new(std::collections::VecDeque::new()),
            default: Some(ClassifyOutput { scores: map }),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A mock that always fails.
    pub fn failing(message: &str) -> Self {
        let mut mock = Self::new();
        mock.default = None;
        mock.queue
            .get_mut()
            .unwrap()
            .push_back(Err(ModelError::Inference {
                model: "mock".into(),
                message: message.to_string(),
            }));
        mock
    }

    /// Queue one outcome.
    pub fn queue_output(&self, output: Result<ClassifyOutput, ModelError>) {
        self.queue.lock().unwrap().push_back(output);
    }

    /// Requests observed so far.
    pub fn seen_requests(&self) -> Vec<ClassifyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyOutput, ModelError> {
        self.requests.lock().unwrap().push(request.clone());
        let queued = self.queue.lock().unwrap().pop_front();
        match queued {
            Some(outcome) => outcome,
            None => match &self.default {
                Some(output) => Ok(output.clone()),
                None => Err(ModelError::Inference {
                    model: request.model_id.clone(),
                    message: "mock queue exhausted".into(),
                }),
            },
        }
    }
}
