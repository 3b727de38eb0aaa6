use std::borrow::Cow;

use persona_bias::{TokenId, VocabularySource};

use crate::types::BackendError;

/// A language model runtime that produces the scores for one decoding step at a time. The vocabulary it exposes
/// must use the same token ids as its score arrays.
pub trait StepModel: VocabularySource {
	/// Token the model emits to signal the end of its output
	fn eos_token(&self) -> TokenId;

	fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, BackendError>;

	fn detokenize(&self, tokens: &[TokenId]) -> Result<String, BackendError>;

	/// Forget all previously fed tokens
	fn reset(&mut self);

	/// Advance the model state by the given tokens
	fn feed(&mut self, tokens: &[TokenId]) -> Result<(), BackendError>;

	/// Scores for the next token, one per token id. The caller may modify them in place.
	fn logits(&mut self) -> Result<&mut [f32], BackendError>;
}

/// Exposes the vocabulary of a model as a plain [`VocabularySource`]
pub struct ModelVocabulary<'a>(pub &'a dyn StepModel);

impl VocabularySource for ModelVocabulary<'_> {
	fn len(&self) -> usize {
		self.0.len()
	}

	fn score(&self, token: TokenId) -> f32 {
		self.0.score(token)
	}

	fn text(&self, token: TokenId) -> Cow<'_, str> {
		self.0.text(token)
	}
}
