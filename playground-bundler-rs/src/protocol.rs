//! Messages exchanged with the host that drives the bundler.

use serde::{Deserialize, Serialize};

/// Request from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    /// Bundle `source` as the playground component. `uid` is echoed back.
    Compile { uid: String, source: String },
}

impl WorkerRequest {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn uid(&self) -> &str {
        match self {
            WorkerRequest::Compile { uid, .. } => uid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Compile,
}

/// Either the bundled script or a description of why bundling failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileOutcome {
    Code(String),
    Error(String),
}

/// Reply to a [`WorkerRequest`]. Exactly one is sent per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub uid: String,
    #[serde(flatten)]
    pub outcome: CompileOutcome,
}

impl WorkerResponse {
    pub fn code(uid: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Compile,
            uid: uid.into(),
            outcome: CompileOutcome::Code(code.into()),
        }
    }

    pub fn error(uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Compile,
            uid: uid.into(),
            outcome: CompileOutcome::Error(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, CompileOutcome::Error(_))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
