use std::{fmt::Debug, sync::Arc, time::Instant};

use persona_bias::{
	cleanup::clean_response, Biaser, ConversationContext, GenerationController, StepInput, StepOutcome, StopReason, TokenId, VocabularyProfile,
};

use crate::{
	config::{BackendConfig, CharacterConfig},
	feedback::SuccessTracker,
	mode::pick_mode,
	model::{ModelVocabulary, StepModel},
	prompt::build_prompt,
	sampler::TokenSampler,
	stats::{ConversationStats, TurnStats},
	types::{BackendError, PlayerState, TurnResponse},
};

/// A conversation between a player and one character
pub struct ConversationSession {
	pub(crate) config: Arc<BackendConfig>,
	pub(crate) profile: Arc<VocabularyProfile>,
	pub(crate) context: ConversationContext,
	pub(crate) biaser: Box<dyn Biaser>,
	pub(crate) character: CharacterConfig,
	pub(crate) player: PlayerState,
	pub(crate) tracker: SuccessTracker,
	pub(crate) stats: ConversationStats,
	pub(crate) last_turn_tokens: Option<Vec<TokenId>>,
}

impl Debug for ConversationSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConversationSession")
			.field("character", &self.character.name)
			.field("player", &self.player.name)
			.field("turns", &self.context.turn_count())
			.field("stats", &self.stats)
			.finish()
	}
}

impl ConversationSession {
	pub fn character(&self) -> &CharacterConfig {
		&self.character
	}

	pub fn player(&self) -> &PlayerState {
		&self.player
	}

	pub fn player_mut(&mut self) -> &mut PlayerState {
		&mut self.player
	}

	pub fn context(&self) -> &ConversationContext {
		&self.context
	}

	pub fn context_mut(&mut self) -> &mut ConversationContext {
		&mut self.context
	}

	pub fn stats(&self) -> &ConversationStats {
		&self.stats
	}

	/// Generate the character's response to the player's input.
	pub fn respond(&mut self, model: &mut dyn StepModel, sampler: &mut dyn TokenSampler, input: &str) -> Result<TurnResponse, BackendError> {
		if model.len() != self.profile.len() {
			return Err(BackendError::Config(format!(
				"model vocabulary has {} tokens but the profile was built for {}",
				model.len(),
				self.profile.len()
			)));
		}

		let mode_name = pick_mode(&self.character, &self.player, input).to_string();
		let mode = self.config.mode(&mode_name)?;
		let (min_tokens, max_tokens) = self.config.token_limits(mode);
		tracing::info!(character = self.character.name, mode = mode_name, min_tokens, max_tokens, "starting turn");

		self.context.begin_turn(&self.character.role, &mode_name, &ModelVocabulary(&*model));

		// Feed the prompt
		let mut turn_stats = TurnStats::default();
		let prompt = build_prompt(&self.character, mode, &self.player, input);
		tracing::trace!("prompt: {prompt}");
		let start = Instant::now();
		model.reset();
		let prompt_tokens = model.tokenize(&prompt)?;
		if prompt_tokens.is_empty() {
			return Err(BackendError::EmptyPrompt);
		}
		model.feed(&prompt_tokens)?;
		turn_stats.prompt_tokens = prompt_tokens.len();
		turn_stats.feed_prompt_duration = start.elapsed();

		// Inference loop
		let mut controller = GenerationController::new(self.profile.clone(), &self.player.name, min_tokens, max_tokens);
		let eos_token = model.eos_token();
		let start = Instant::now();
		let mut stop_reason = StopReason::MaxLengthReached;
		for step in 0..max_tokens {
			let logits = model.logits()?;
			if logits.len() != self.profile.len() {
				return Err(BackendError::Inference(format!(
					"model returned {} scores for a vocabulary of {}",
					logits.len(),
					self.profile.len()
				)));
			}
			self.biaser.bias(&self.context, logits, step, max_tokens - step);
			controller.apply_repetition_penalty(logits);

			let outcome = match sampler.sample(logits) {
				Some(token) if token != eos_token => {
					let piece = model.detokenize(&[token])?;
					tracing::trace!("step {step}: {token} {piece:?}");
					let outcome = controller.step(StepInput::Token { token, piece: &piece }, step);
					if outcome == StepOutcome::Continue {
						model.feed(&[token])?;
					}
					outcome
				}
				_ => controller.step(StepInput::EndOfSequence, step),
			};

			if let StepOutcome::Stop(reason) = outcome {
				stop_reason = reason;
				break;
			}
		}

		let state = controller.into_state();
		turn_stats.predict_tokens = state.tokens.len();
		turn_stats.predict_duration = start.elapsed();

		let raw = model.detokenize(&state.tokens).map_err(|e| match e {
			BackendError::Decode(_) => e,
			other => BackendError::Decode(other.to_string()),
		})?;
		tracing::debug!("raw response: {raw:?}");
		let text = clean_response(&raw, &self.player.name, &self.config.generation.fallback_response);
		self.context.record_turn_outcome(state.tokens.len());

		tracing::info!(
			"turn finished ({stop_reason:?}); {:.3} t/s predict; stats: {:?}",
			turn_stats.predict_tokens_per_second(),
			turn_stats
		);
		self.stats.add_turn(&turn_stats, stop_reason);
		self.last_turn_tokens = Some(state.tokens.clone());

		Ok(TurnResponse {
			text,
			mode: mode_name,
			stop_reason,
			tokens: state.tokens,
			stats: turn_stats,
		})
	}

	/// Tell the session whether the last response was well received. Tokens of successful responses are
	/// reinforced in later turns. Each response can be judged once.
	pub fn mark_last_turn(&mut self, successful: bool) {
		let Some(tokens) = self.last_turn_tokens.take() else {
			tracing::warn!("no turn to judge");
			return;
		};
		if successful {
			self.tracker.record_success(&tokens);
			self.tracker.publish(&mut self.context);
			tracing::debug!(successful_turns = self.tracker.successful_turns(), "success frequencies updated");
		}
	}
}
