use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::{TokenId, VocabularyProfile};

/// Base multiplier for a repeated token
pub const REPETITION_PENALTY: f32 = 0.9;

/// Penalty exponent per occurrence for common tokens
const COMMON_REPETITION_RATE: f32 = 0.7;

/// Penalty exponent per occurrence for all other tokens
const OTHER_REPETITION_RATE: f32 = 1.3;

/// Phrases (lower-cased) that show the model is speaking for the other party, in addition to `<player>:`
const FORBIDDEN_SPEAKER_CUES: [&str; 2] = ["you say", "adventurer:"];

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
	/// A closing quote appeared once the minimum length was reached
	NaturalClose,

	/// The model started to speak for the other party
	ForbiddenSpeaker,

	/// The response reached its maximum length
	MaxLengthReached,

	/// The model produced its end-of-sequence token after the minimum length was reached
	ModelSignaledEnd,
}

/// What the sampler produced for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepInput<'a> {
	EndOfSequence,

	/// A produced token and its detokenized text
	Token { token: TokenId, piece: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
	/// Token accepted, generate the next one
	Continue,

	/// End of sequence came too early; it was not counted, generate another token
	Retry,

	/// The response is finished
	Stop(StopReason),
}

/// Per-response generation state
#[derive(Debug, Clone, Default)]
pub struct GenerationState {
	pub step_index: usize,
	pub repeat_counts: FxHashMap<TokenId, usize>,
	pub text: String,
	pub tokens: Vec<TokenId>,
	pub closing_quote_seen: bool,
	pub forbidden_speaker_seen: bool,
}

/// Decides per produced token whether a response continues or stops, and how hard repeated tokens are penalized.
#[derive(Debug, Clone)]
pub struct GenerationController {
	profile: Arc<VocabularyProfile>,
	player_cue: String,
	min_tokens: usize,
	max_tokens: usize,
	state: GenerationState,
	stopped: Option<StopReason>,
}

impl GenerationController {
	pub fn new(profile: Arc<VocabularyProfile>, player_name: &str, min_tokens: usize, max_tokens: usize) -> GenerationController {
		if min_tokens > max_tokens {
			tracing::warn!("minimum response length {min_tokens} exceeds maximum {max_tokens}");
		}
		GenerationController {
			profile,
			player_cue: format!("{}:", player_name.to_lowercase()),
			min_tokens,
			max_tokens,
			state: GenerationState::default(),
			stopped: None,
		}
	}

	pub fn min_tokens(&self) -> usize {
		self.min_tokens
	}

	pub fn max_tokens(&self) -> usize {
		self.max_tokens
	}

	pub fn state(&self) -> &GenerationState {
		&self.state
	}

	/// The reason generation stopped, or `None` while still generating
	pub fn stop_reason(&self) -> Option<StopReason> {
		self.stopped
	}

	pub fn is_generating(&self) -> bool {
		self.stopped.is_none()
	}

	/// Number of times `token` has been produced in this response so far
	pub fn occurrences(&self, token: TokenId) -> usize {
		self.state.repeat_counts.get(&token).copied().unwrap_or(0)
	}

	pub fn into_state(self) -> GenerationState {
		self.state
	}

	/// Feed the output of the sampler for the step at `step_index`.
	pub fn step(&mut self, input: StepInput<'_>, step_index: usize) -> StepOutcome {
		if let Some(reason) = self.stopped {
			tracing::warn!(?reason, step_index, "step after generation already stopped");
			return StepOutcome::Stop(reason);
		}
		self.state.step_index = step_index;

		let outcome = match input {
			StepInput::EndOfSequence => {
				if step_index >= self.min_tokens {
					StepOutcome::Stop(StopReason::ModelSignaledEnd)
				} else {
					tracing::debug!(step_index, min_tokens = self.min_tokens, "ignoring early end of sequence");
					StepOutcome::Retry
				}
			}
			StepInput::Token { token, piece } => self.accept(token, piece, step_index),
		};

		let outcome = match outcome {
			StepOutcome::Stop(_) => outcome,
			_ if step_index + 1 >= self.max_tokens => StepOutcome::Stop(StopReason::MaxLengthReached),
			_ => outcome,
		};

		if let StepOutcome::Stop(reason) = outcome {
			tracing::debug!(?reason, step_index, tokens = self.state.tokens.len(), "generation stopped");
			self.stopped = Some(reason);
		}
		outcome
	}

	fn accept(&mut self, token: TokenId, piece: &str, step_index: usize) -> StepOutcome {
		if !self.profile.contains(token) {
			debug_assert!(false, "token {token} is outside of the vocabulary");
			tracing::error!("produced token {token} is outside of the vocabulary of size {}", self.profile.len());
		}
		*self.state.repeat_counts.entry(token).or_insert(0) += 1;
		self.state.tokens.push(token);
		self.state.text.push_str(piece);
		tracing::trace!(step_index, token, piece, "token accepted");

		if self.state.text.contains('"') {
			self.state.closing_quote_seen = true;
			if step_index >= self.min_tokens {
				return StepOutcome::Stop(StopReason::NaturalClose);
			}
		}

		let lower = self.state.text.to_lowercase();
		if lower.contains(self.player_cue.as_str()) || FORBIDDEN_SPEAKER_CUES.iter().any(|cue| lower.contains(cue)) {
			self.state.forbidden_speaker_seen = true;
			return StepOutcome::Stop(StopReason::ForbiddenSpeaker);
		}

		StepOutcome::Continue
	}

	/// Multiplier for the score of a token that already occurred `occurrence_count` times in this response. Only
	/// meaningful for `occurrence_count > 0`. Common tokens decay slowly, all others faster.
	pub fn repetition_multiplier(&self, token: TokenId, occurrence_count: usize) -> f32 {
		let rate = if self.profile.category(token).is_common() {
			COMMON_REPETITION_RATE
		} else {
			OTHER_REPETITION_RATE
		};
		REPETITION_PENALTY.powf(occurrence_count as f32 * rate)
	}

	/// Multiply the score of every token already produced in this response by its repetition multiplier. Call
	/// after the additive biases of the step have been applied.
	pub fn apply_repetition_penalty(&self, logits: &mut [f32]) {
		for (token, count) in self.state.repeat_counts.iter() {
			if *count == 0 {
				continue;
			}
			let multiplier = self.repetition_multiplier(*token, *count);
			if let Some(logit) = logits.get_mut(*token as usize) {
				*logit *= multiplier;
			}
		}
	}
}
