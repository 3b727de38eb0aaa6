use std::sync::Arc;

use crate::{Biaser, ConversationContext, TokenId, VocabularyProfile};

/// Response length assumed when estimating how far along a response is
pub const ASSUMED_MAX_RESPONSE_LENGTH: f32 = 200.0;

/// Responses are considered to be in their opening for this many steps
pub const OPENING_STEPS: usize = 10;

const ROLE_BOOST: f32 = 0.5;
const MOOD_BOOST: f32 = 0.3;
const OPENING_BOOST_MULTIPLIER: f32 = 1.5;
const DIALOGUE_BOOST: f32 = 0.4;
const DIALOGUE_SUPPRESSION: f32 = 2.0;

/// Below this completion ratio dialogue enders are suppressed, at or above it they are boosted
const CLOSURE_COMPLETION_RATIO: f32 = 0.6;

/// Tokens appearing in more than this fraction of successful turns are reinforced
const PATTERN_FREQUENCY_THRESHOLD: f32 = 0.1;
const PATTERN_BOOST: f32 = 0.2;

/// Applies the rank, role, mood, dialogue-flow and success-pattern biases to the scores of a decoding step.
#[derive(Debug, Clone, Default)]
pub struct LogitBiasEngine {
	profile: Option<Arc<VocabularyProfile>>,
}

impl LogitBiasEngine {
	pub fn new(profile: Arc<VocabularyProfile>) -> LogitBiasEngine {
		LogitBiasEngine { profile: Some(profile) }
	}

	/// An engine without a profile; [`LogitBiasEngine::apply`] leaves scores untouched
	pub fn unbuilt() -> LogitBiasEngine {
		LogitBiasEngine { profile: None }
	}

	pub fn is_initialized(&self) -> bool {
		self.profile.is_some()
	}

	pub fn profile(&self) -> Option<&Arc<VocabularyProfile>> {
		self.profile.as_ref()
	}

	/// Add all biases to `logits` in place. Every call adds the full set of biases again; nothing is capped.
	pub fn apply(&self, context: &ConversationContext, logits: &mut [f32], step_index: usize, tokens_remaining: usize) {
		let Some(profile) = self.profile.as_deref() else {
			return;
		};
		debug_assert_eq!(logits.len(), profile.len(), "score array does not match the vocabulary");
		let params = context.params();

		// Universal pull towards frequent tokens
		for (logit, bias) in logits.iter_mut().zip(profile.rank_bias()) {
			*logit += bias * params.complexity_factor;
		}

		// Character voice, strongest at the opening of a response
		let mut role_boost = ROLE_BOOST * params.engagement_modifier;
		let mut mood_boost = MOOD_BOOST * params.engagement_modifier;
		if step_index < OPENING_STEPS {
			role_boost *= OPENING_BOOST_MULTIPLIER;
			mood_boost *= OPENING_BOOST_MULTIPLIER;
		}
		for token in context.role_tokens() {
			add(logits, *token, role_boost);
		}
		for token in context.mood_tokens() {
			add(logits, *token, mood_boost);
		}

		// Keep the utterance open early on, encourage closing it as the budget runs out
		let completion_ratio = 1.0 - tokens_remaining as f32 / ASSUMED_MAX_RESPONSE_LENGTH;
		if completion_ratio < CLOSURE_COMPLETION_RATIO {
			// Dialogue markers are punctuation too
			for token in profile.dialogue_tokens() {
				add(logits, *token, -DIALOGUE_SUPPRESSION);
			}
		} else {
			let boost = DIALOGUE_BOOST * params.pattern_strength * completion_ratio;
			for token in profile.dialogue_tokens() {
				add(logits, *token, boost);
			}
		}

		// Tokens from well-received turns
		let pattern_boost = PATTERN_BOOST * params.pattern_strength;
		for (token, frequency) in context.turn_frequencies() {
			if *frequency > PATTERN_FREQUENCY_THRESHOLD {
				add(logits, *token, pattern_boost);
			}
		}

		tracing::trace!(step_index, tokens_remaining, completion_ratio, "biases applied");
	}

	/// Advisory check whether a token fits the current character voice. Rare tokens never do; role and mood tokens
	/// always do; anything else only when it is common. Without a profile every token is considered appropriate.
	pub fn appropriateness(&self, context: &ConversationContext, token: TokenId) -> bool {
		let Some(profile) = self.profile.as_deref() else {
			return true;
		};
		let categories = profile.category(token);
		if categories.is_rare() {
			return false;
		}
		if context.role_tokens().contains(&token) || context.mood_tokens().contains(&token) {
			return true;
		}
		categories.is_common()
	}
}

impl Biaser for LogitBiasEngine {
	fn bias(&self, context: &ConversationContext, logits: &mut [f32], step_index: usize, tokens_remaining: usize) {
		self.apply(context, logits, step_index, tokens_remaining)
	}
}

#[inline]
fn add(logits: &mut [f32], token: TokenId, amount: f32) {
	match logits.get_mut(token as usize) {
		Some(logit) => *logit += amount,
		None => {
			debug_assert!(false, "token {token} is outside of the score array");
			tracing::error!("token {token} is outside of the score array of length {}", logits.len());
		}
	}
}
