use std::time::Duration;

use persona_bias::StopReason;
use serde::Serialize;

/// Token counts and timings of a single turn
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct TurnStats {
	pub prompt_tokens: usize,
	pub feed_prompt_duration: Duration,

	/// Tokens produced for the response (end-of-sequence tokens that were ignored are not counted)
	pub predict_tokens: usize,
	pub predict_duration: Duration,
}

impl TurnStats {
	pub fn add(&mut self, stats: &TurnStats) {
		self.prompt_tokens += stats.prompt_tokens;
		self.feed_prompt_duration += stats.feed_prompt_duration;
		self.predict_tokens += stats.predict_tokens;
		self.predict_duration += stats.predict_duration;
	}

	pub fn predict_tokens_per_second(&self) -> f64 {
		let secs = self.predict_duration.as_secs_f64();
		if secs > 0.0 {
			self.predict_tokens as f64 / secs
		} else {
			0.0
		}
	}
}

/// Totals over all turns of a conversation
#[derive(Serialize, Debug, Clone, Default)]
pub struct ConversationStats {
	/// Number of completed turns
	turns: usize,

	totals: TurnStats,

	natural_close: usize,
	forbidden_speaker: usize,
	max_length_reached: usize,
	model_signaled_end: usize,
}

impl ConversationStats {
	pub fn add_turn(&mut self, stats: &TurnStats, stop_reason: StopReason) {
		self.turns += 1;
		self.totals.add(stats);
		match stop_reason {
			StopReason::NaturalClose => self.natural_close += 1,
			StopReason::ForbiddenSpeaker => self.forbidden_speaker += 1,
			StopReason::MaxLengthReached => self.max_length_reached += 1,
			StopReason::ModelSignaledEnd => self.model_signaled_end += 1,
		}
	}

	pub fn turns(&self) -> usize {
		self.turns
	}

	pub fn totals(&self) -> &TurnStats {
		&self.totals
	}

	/// Number of turns that ended for the given reason
	pub fn stopped_by(&self, stop_reason: StopReason) -> usize {
		match stop_reason {
			StopReason::NaturalClose => self.natural_close,
			StopReason::ForbiddenSpeaker => self.forbidden_speaker,
			StopReason::MaxLengthReached => self.max_length_reached,
			StopReason::ModelSignaledEnd => self.model_signaled_end,
		}
	}
}
