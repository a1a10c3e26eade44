//! Extraction boundary
//!
//! The one-shot vision capability this engine consumes. Implementations may
//! be nondeterministic across calls and fail arbitrarily; callers treat
//! every response as a candidate to be validated, never as ground truth.

use async_trait::async_trait;
use thiserror::Error;

/// A single extractor response for one work item
#[derive(Debug, Clone, Default)]
pub struct RawCandidate {
    /// Extracted text, if the extractor produced any
    pub text: Option<String>,
    /// True when the extractor declined to answer
    pub refused: bool,
}

/// Extraction transport and API errors
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid API key")]
    InvalidApiKey,
}

/// One-shot text extraction from a worksheet photo
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extractor name for logging
    fn name(&self) -> &'static str;

    /// Extract text from one image using the given prompt
    async fn extract(&self, image: &[u8], prompt: &str) -> Result<RawCandidate, ExtractError>;
}
