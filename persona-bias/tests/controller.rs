use std::sync::Arc;

use persona_bias::{GenerationController, StaticVocabulary, StepInput, StepOutcome, StopReason, TokenId, VocabularyProfile, VocabularySource};
use tracing_test::traced_test;

const QUOTE: TokenId = 3;
const WORD: TokenId = 1;
const RARE_WORD: TokenId = 95;

/// 100 tokens ranked by id; `"` is token 3
fn profile() -> Arc<VocabularyProfile> {
	let vocab: StaticVocabulary = (0..100)
		.map(|i| {
			let text = match i {
				3 => "\"".to_string(),
				_ => format!(" w{i}"),
			};
			(text, -(i as f32))
		})
		.collect();
	Arc::new(VocabularyProfile::build(&vocab).unwrap())
}

fn word(token: TokenId) -> StepInput<'static> {
	StepInput::Token { token, piece: " word" }
}

#[traced_test]
#[test]
pub fn test_closing_quote_respects_minimum() {
	let mut controller = GenerationController::new(profile(), "Ariadne", 8, 150);
	for step in 0..5 {
		assert_eq!(controller.step(word(WORD), step), StepOutcome::Continue);
	}
	assert_eq!(controller.step(StepInput::Token { token: QUOTE, piece: "\"" }, 5), StepOutcome::Continue);
	assert!(controller.state().closing_quote_seen);
	assert!(controller.is_generating());

	assert_eq!(
		controller.step(StepInput::Token { token: QUOTE, piece: "\"" }, 9),
		StepOutcome::Stop(StopReason::NaturalClose)
	);
	assert_eq!(controller.stop_reason(), Some(StopReason::NaturalClose));
	assert_eq!(controller.occurrences(QUOTE), 2);
	assert_eq!(controller.state().tokens.len(), 7);
}

#[traced_test]
#[test]
pub fn test_forbidden_speaker_ignores_minimum() {
	let mut controller = GenerationController::new(profile(), "Ariadne", 20, 150);
	assert_eq!(controller.step(StepInput::Token { token: 10, piece: " Go away." }, 0), StepOutcome::Continue);
	assert_eq!(controller.step(StepInput::Token { token: 11, piece: " ARIAD" }, 1), StepOutcome::Continue);
	assert_eq!(
		controller.step(StepInput::Token { token: 12, piece: "NE:" }, 2),
		StepOutcome::Stop(StopReason::ForbiddenSpeaker)
	);
	assert!(controller.state().forbidden_speaker_seen);
}

#[traced_test]
#[test]
pub fn test_forbidden_phrases() {
	for phrase in [" You say", " Adventurer: hi"] {
		let mut controller = GenerationController::new(profile(), "Bob", 20, 150);
		assert_eq!(
			controller.step(StepInput::Token { token: 7, piece: phrase }, 0),
			StepOutcome::Stop(StopReason::ForbiddenSpeaker)
		);
	}
}

#[traced_test]
#[test]
pub fn test_end_of_sequence() {
	let mut controller = GenerationController::new(profile(), "Bob", 8, 150);
	assert_eq!(controller.step(StepInput::EndOfSequence, 3), StepOutcome::Retry);
	assert!(controller.state().tokens.is_empty());
	assert!(controller.state().repeat_counts.is_empty());
	assert!(controller.is_generating());
	assert_eq!(controller.step(StepInput::EndOfSequence, 8), StepOutcome::Stop(StopReason::ModelSignaledEnd));

	// Further steps are refused
	assert_eq!(controller.step(word(WORD), 9), StepOutcome::Stop(StopReason::ModelSignaledEnd));
	assert!(controller.state().tokens.is_empty());
}

#[traced_test]
#[test]
pub fn test_max_length() {
	let mut controller = GenerationController::new(profile(), "Bob", 2, 5);
	for step in 0..4 {
		assert_eq!(controller.step(word(WORD), step), StepOutcome::Continue);
	}
	assert_eq!(controller.step(word(WORD), 4), StepOutcome::Stop(StopReason::MaxLengthReached));
	assert_eq!(controller.occurrences(WORD), 5);
	assert_eq!(controller.into_state().text, " word word word word word");
}

#[traced_test]
#[test]
pub fn test_early_end_of_sequence_at_max_length() {
	let mut controller = GenerationController::new(profile(), "Bob", 10, 4);
	assert_eq!(controller.step(StepInput::EndOfSequence, 3), StepOutcome::Stop(StopReason::MaxLengthReached));
}

#[traced_test]
#[test]
pub fn test_repetition_multiplier() {
	let profile = profile();
	let controller = GenerationController::new(profile.clone(), "Bob", 8, 150);
	assert!(profile.category(WORD).is_common());
	assert!(profile.category(RARE_WORD).is_rare());

	assert_eq!(controller.repetition_multiplier(WORD, 0), 1.0);
	let common = controller.repetition_multiplier(WORD, 3);
	let rare = controller.repetition_multiplier(RARE_WORD, 3);
	assert!(common > rare);
	assert!((common - 0.9f32.powf(2.1)).abs() < 1e-6);
	assert!((rare - 0.9f32.powf(3.9)).abs() < 1e-6);
	assert!(controller.repetition_multiplier(WORD, 4) < common);
}

#[traced_test]
#[test]
pub fn test_apply_repetition_penalty() {
	let profile = profile();
	let mut controller = GenerationController::new(profile.clone(), "Bob", 8, 150);
	controller.step(word(WORD), 0);
	controller.step(word(WORD), 1);
	controller.step(word(50), 2);

	let mut logits = vec![2.0; profile.len()];
	controller.apply_repetition_penalty(&mut logits);
	assert!((logits[WORD as usize] - 2.0 * controller.repetition_multiplier(WORD, 2)).abs() < 1e-6);
	assert!((logits[50] - 2.0 * controller.repetition_multiplier(50, 1)).abs() < 1e-6);
	assert_eq!(logits[0], 2.0);
}

#[test]
pub fn test_vocabulary_len() {
	assert_eq!(profile().len(), 100);
	let vocab = StaticVocabulary::default();
	assert!(vocab.is_empty());
}
