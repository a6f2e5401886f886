use thiserror::Error;

/// Failure of a single outbound fetch.
///
/// Cloneable because every caller awaiting the same in-flight request
/// receives the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request for {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request for {url} failed: {message}")]
    Network { url: String, message: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. } | FetchError::Network { url, .. } => url,
        }
    }
}

/// Errors produced while turning component source into a bundled script.
#[derive(Debug, Error)]
pub enum BundlerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unresolved import `{specifier}` from `{importer}`: {reason}")]
    UnresolvedImport {
        specifier: String,
        importer: String,
        reason: String,
    },

    #[error("invalid module specifier `{0}`")]
    InvalidSpecifier(String),

    #[error("component compilation failed: {0}")]
    Compile(String),

    #[error("link failed: {0}")]
    Link(String),
}

impl BundlerError {
    pub(crate) fn unresolved(
        specifier: &str,
        importer: Option<&str>,
        reason: impl ToString,
    ) -> Self {
        BundlerError::UnresolvedImport {
            specifier: specifier.to_string(),
            importer: importer.unwrap_or("<entry>").to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type BundlerResult<T> = Result<T, BundlerError>;
