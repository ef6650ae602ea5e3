//! Token counting for prompt budgeting

use std::fmt;

use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::{Error, Result};

/// Model whose tokenizer is used when none is configured
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Counts tokens the way a given model would see them
pub trait Tokenizer: Send + Sync {
    /// Number of tokens in `text`
    fn count_tokens(&self, text: &str) -> usize;
}

/// `tiktoken` BPE tokenizer selected by model name
pub struct TiktokenCounter {
    model: String,
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Load the encoding used by `model` (e.g. `gpt-4`, `gpt-3.5-turbo`)
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the model has no known encoding.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .map_err(|e| Error::Config(format!("No tokenizer for model '{model}': {e}")))?;
        debug!(model = %model, "Loaded tokenizer");
        Ok(Self {
            model: model.to_string(),
            bpe,
        })
    }

    /// Model this counter was loaded for
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Tokenizer for TiktokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens_gpt4() {
        let counter = TiktokenCounter::for_model(DEFAULT_MODEL).unwrap();
        assert_eq!(counter.model(), "gpt-4");
        assert_eq!(counter.count_tokens("Hello world!"), 3);
        assert_eq!(counter.count_tokens(""), 0);
    }

    #[test]
    fn test_unknown_model() {
        let err = TiktokenCounter::for_model("definitely-not-a-model").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
