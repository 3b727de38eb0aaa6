use std::borrow::Cow;

use thiserror::Error;

pub mod cleanup;
pub mod context;
pub mod controller;
pub mod engine;
pub mod vocabulary;

pub use context::{BiasParameters, ConversationContext, KeywordTable};
pub use controller::{GenerationController, GenerationState, StepInput, StepOutcome, StopReason};
pub use engine::LogitBiasEngine;
pub use vocabulary::{StaticVocabulary, TokenCategories, VocabularyEntry, VocabularyProfile};

/// Identifier of a token in the external vocabulary
pub type TokenId = u32;

/// Provides the text and frequency score of every token in a vocabulary. Token ids are `0..len()`.
pub trait VocabularySource {
	/// Number of tokens in the vocabulary
	fn len(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Frequency score of a token (higher means more frequent, no particular range)
	fn score(&self, token: TokenId) -> f32;

	/// Display text of a token
	fn text(&self, token: TokenId) -> Cow<'_, str>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BiasError {
	#[error("cannot build a vocabulary profile from an empty vocabulary")]
	EmptyVocabulary,

	#[error("token {token} is outside of the vocabulary (size {vocabulary_size})")]
	TokenOutOfRange { token: TokenId, vocabulary_size: usize },
}

/// Something that adjusts the raw scores of a single decoding step in place
pub trait Biaser {
	/// Adjust `logits` (one score per token id) for the step at `step_index` of the response, with `tokens_remaining`
	/// tokens left before the response reaches its hard maximum.
	fn bias(&self, context: &ConversationContext, logits: &mut [f32], step_index: usize, tokens_remaining: usize);
}

/// A biaser that does not bias in any way
pub struct NullBiaser {}

impl Biaser for NullBiaser {
	fn bias(&self, _context: &ConversationContext, _logits: &mut [f32], _step_index: usize, _tokens_remaining: usize) {}
}
