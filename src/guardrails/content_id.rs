use sha2::{Digest, Sha256};
use tracing::warn;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Derives a stable id for a prompt/response pair so the evaluator can
/// correlate repeated evaluations.
pub trait ContentIdProvider: Send + Sync {
    fn content_id(&self, texts: &[&str]) -> Result<Option<String>, BoxError>;
}

/// Hex SHA-256 over the texts, separated by a NUL byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256ContentId;

impl ContentIdProvider for Sha256ContentId {
    fn content_id(&self, texts: &[&str]) -> Result<Option<String>, BoxError> {
        if texts.is_empty() {
            return Ok(None);
        }
        let mut hasher = Sha256::new();
        for (i, text) in texts.iter().enumerate() {
            if i > 0 {
                hasher.update([0u8]);
            }
            hasher.update(text.as_bytes());
        }
        let digest = hasher.finalize();
        Ok(Some(digest.iter().map(|b| format!("{b:02x}")).collect()))
    }
}

/// Runs the provider, logging and discarding any failure.
pub fn resolve_content_id(provider: Option<&dyn ContentIdProvider>, texts: &[&str]) -> Option<String> {
    let provider = provider?;
    match provider.content_id(texts) {
        Ok(id) => id,
        Err(err) => {
            warn!(error = %err, "Content id provider failed, evaluating without an id");
            None
        }
    }
}
