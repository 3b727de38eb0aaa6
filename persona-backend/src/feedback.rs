use persona_bias::{ConversationContext, TokenId};
use rustc_hash::{FxHashMap, FxHashSet};

/// Tracks in which fraction of the successful turns each token appeared, and publishes that to the conversation
/// context so the bias engine can reinforce those tokens.
#[derive(Debug, Clone, Default)]
pub struct SuccessTracker {
	successful_turns: usize,
	turns_containing: FxHashMap<TokenId, usize>,
}

impl SuccessTracker {
	/// Record the tokens of a turn that was well received
	pub fn record_success(&mut self, tokens: &[TokenId]) {
		self.successful_turns += 1;
		let unique: FxHashSet<TokenId> = tokens.iter().copied().collect();
		for token in unique {
			*self.turns_containing.entry(token).or_insert(0) += 1;
		}
	}

	pub fn successful_turns(&self) -> usize {
		self.successful_turns
	}

	/// Fraction of successful turns that contained the token
	pub fn frequency(&self, token: TokenId) -> f32 {
		if self.successful_turns == 0 {
			return 0.0;
		}
		self.turns_containing.get(&token).copied().unwrap_or(0) as f32 / self.successful_turns as f32
	}

	/// Replace the context's success frequencies with the current ones
	pub fn publish(&self, context: &mut ConversationContext) {
		let frequencies = context.turn_frequencies_mut();
		frequencies.clear();
		frequencies.extend(self.turns_containing.keys().map(|t| (*t, self.frequency(*t))));
	}
}
