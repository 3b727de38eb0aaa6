use std::{borrow::Cow, sync::Once};

use persona_backend::{
	config::BackendConfig, Backend, BackendError, GreedySampler, PlayerState, Relationship, StepModel, TokenSampler,
};
use persona_bias::{BiasError, StaticVocabulary, StopReason, TokenId, VocabularySource};

static INIT: Once = Once::new();

pub fn setup() {
	INIT.call_once(|| {
		tracing_subscriber::fmt::init();
	});
}

const EOS: TokenId = 0;
const QUOTE: TokenId = 2;
const PERIOD: TokenId = 3;
const STAY: TokenId = 4;
const BACK: TokenId = 5;
const ARIADNE: TokenId = 14;
const COLON: TokenId = 15;

const PIECES: [&str; 19] = [
	"</s>", "<unk>", "\"", ".", " Stay", " back", " traveler", " I", " watch", " this", " gate", " day", " and", " night", " Ariadne", ":",
	" You", " say", "!",
];

/// A model that emits a fixed sequence of tokens, one per call to `logits`, and end-of-sequence once the script runs
/// out. Every id below 60 is a token; ids past the named pieces are filler words.
struct ScriptedModel {
	script: Vec<TokenId>,
	position: usize,
	logits: Vec<f32>,
	fed: Vec<TokenId>,
	fail_decode: bool,
}

impl ScriptedModel {
	const SIZE: usize = 60;

	fn new(script: &[TokenId]) -> ScriptedModel {
		ScriptedModel {
			script: script.to_vec(),
			position: 0,
			logits: vec![0.0; Self::SIZE],
			fed: vec![],
			fail_decode: false,
		}
	}
}

impl VocabularySource for ScriptedModel {
	fn len(&self) -> usize {
		Self::SIZE
	}

	fn score(&self, token: TokenId) -> f32 {
		-(token as f32)
	}

	fn text(&self, token: TokenId) -> Cow<'_, str> {
		match PIECES.get(token as usize) {
			Some(piece) => Cow::Borrowed(*piece),
			None => Cow::Owned(format!(" w{token}")),
		}
	}
}

impl StepModel for ScriptedModel {
	fn eos_token(&self) -> TokenId {
		EOS
	}

	fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, BackendError> {
		Ok(text.split_whitespace().map(|_| 1).collect())
	}

	fn detokenize(&self, tokens: &[TokenId]) -> Result<String, BackendError> {
		if self.fail_decode && tokens.len() > 1 {
			return Err(BackendError::Decode("invalid utf-8".to_string()));
		}
		Ok(tokens.iter().map(|t| self.text(*t)).collect())
	}

	fn reset(&mut self) {
		self.position = 0;
		self.fed.clear();
	}

	fn feed(&mut self, tokens: &[TokenId]) -> Result<(), BackendError> {
		self.fed.extend_from_slice(tokens);
		Ok(())
	}

	fn logits(&mut self) -> Result<&mut [f32], BackendError> {
		let next = self.script.get(self.position).copied().unwrap_or(EOS);
		self.position += 1;
		self.logits.iter_mut().for_each(|l| *l = 0.0);
		self.logits[next as usize] = 100.0;
		Ok(&mut self.logits)
	}
}

/// Remembers the scores it was asked to sample from in the first step
#[derive(Default)]
struct RecordingSampler {
	first: Option<Vec<f32>>,
}

impl TokenSampler for RecordingSampler {
	fn sample(&mut self, logits: &[f32]) -> Option<TokenId> {
		if self.first.is_none() {
			self.first = Some(logits.to_vec());
		}
		GreedySampler {}.sample(logits)
	}
}

fn backend(config: BackendConfig) -> Backend {
	Backend::new(config, &ScriptedModel::new(&[])).unwrap()
}

fn stranger() -> PlayerState {
	PlayerState {
		name: "Ariadne".to_string(),
		class: "ranger".to_string(),
		level: 3,
		relationship: Relationship::Stranger,
		recent_action: String::new(),
	}
}

/// "I watch this gate day and night. Stay back traveler!" followed by a closing quote at step 12
const GATE_SPEECH: [TokenId; 13] = [7, 8, 9, 10, 11, 12, 13, PERIOD, STAY, BACK, 6, 18, QUOTE];

#[test]
pub fn test_natural_close() {
	setup();
	let backend = backend(BackendConfig::default());
	let mut session = backend.start("krackle", stranger()).unwrap();
	let mut model = ScriptedModel::new(&GATE_SPEECH);

	// Krackle is suspicious of strangers: 12 to 120 tokens
	let response = session.respond(&mut model, &mut GreedySampler {}, "Let me pass").unwrap();
	assert_eq!(response.mode, "suspicious");
	assert_eq!(response.stop_reason, StopReason::NaturalClose);
	assert_eq!(response.text, "I watch this gate day and night. Stay back traveler!");
	assert_eq!(response.tokens, GATE_SPEECH.to_vec());
	assert_eq!(response.stats.predict_tokens, 13);
	assert!(response.stats.prompt_tokens > 0);

	// The closing quote is not fed back into the model
	assert_eq!(model.fed.last(), Some(&18));

	assert_eq!(session.context().turn_count(), 1);
	assert_eq!(session.context().recent_lengths().iter().copied().collect::<Vec<_>>(), vec![13]);
	assert_eq!(session.stats().turns(), 1);
	assert_eq!(session.stats().stopped_by(StopReason::NaturalClose), 1);

	let json = serde_json::to_value(&response).unwrap();
	assert_eq!(json["stop_reason"], "natural_close");
}

#[test]
pub fn test_forbidden_speaker_is_cut() {
	setup();
	let backend = backend(BackendConfig::default());
	let mut session = backend.start("krackle", stranger()).unwrap();
	let mut model = ScriptedModel::new(&[STAY, BACK, PERIOD, ARIADNE, COLON, STAY]);

	let response = session.respond(&mut model, &mut GreedySampler {}, "Let me pass").unwrap();
	assert_eq!(response.stop_reason, StopReason::ForbiddenSpeaker);
	assert_eq!(response.tokens.len(), 5);
	assert_eq!(response.text, "Stay back.");
}

#[test]
pub fn test_early_end_of_sequence_is_ignored() {
	setup();
	let backend = backend(BackendConfig::default());
	let mut session = backend.start("krackle", stranger()).unwrap();
	let mut model = ScriptedModel::new(&[STAY, BACK, PERIOD]);

	let response = session.respond(&mut model, &mut GreedySampler {}, "Let me pass").unwrap();
	assert_eq!(response.stop_reason, StopReason::ModelSignaledEnd);
	assert_eq!(response.tokens, vec![STAY, BACK, PERIOD]);
	assert_eq!(response.text, "Stay back.");

	// End-of-sequence was produced from step 3 onwards and only accepted at the minimum length
	assert_eq!(model.position, 13);
}

#[test]
pub fn test_fallback_response() {
	setup();
	let config = BackendConfig::default();
	let fallback = config.generation.fallback_response.clone();
	let backend = backend(config);
	let mut session = backend.start("krackle", stranger()).unwrap();
	let mut model = ScriptedModel::new(&[QUOTE]);

	// The quote comes before the minimum length, so only end-of-sequence at step 12 ends the turn
	let response = session.respond(&mut model, &mut GreedySampler {}, "Let me pass").unwrap();
	assert_eq!(response.stop_reason, StopReason::ModelSignaledEnd);
	assert_eq!(response.tokens, vec![QUOTE]);
	assert_eq!(response.text, fallback);
}

#[test]
pub fn test_decode_failure() {
	setup();
	let backend = backend(BackendConfig::default());
	let mut session = backend.start("krackle", stranger()).unwrap();
	let mut model = ScriptedModel::new(&GATE_SPEECH);
	model.fail_decode = true;

	let result = session.respond(&mut model, &mut GreedySampler {}, "Let me pass");
	assert!(matches!(result, Err(BackendError::Decode(_))));
}

#[test]
pub fn test_vocabulary_mismatch() {
	setup();
	let vocabulary: StaticVocabulary = (0..10).map(|i| (format!(" w{i}"), -(i as f32))).collect();
	let backend = Backend::new(BackendConfig::default(), &vocabulary).unwrap();
	let mut session = backend.start("krackle", stranger()).unwrap();
	let result = session.respond(&mut ScriptedModel::new(&GATE_SPEECH), &mut GreedySampler {}, "Let me pass");
	assert!(matches!(result, Err(BackendError::Config(_))));
}

#[test]
pub fn test_empty_vocabulary() {
	setup();
	let result = Backend::new(BackendConfig::default(), &StaticVocabulary::default());
	assert!(matches!(result, Err(BackendError::Bias(BiasError::EmptyVocabulary))));
}

#[test]
pub fn test_unknown_character() {
	setup();
	let backend = backend(BackendConfig::default());
	assert!(matches!(backend.start("nobody", stranger()), Err(BackendError::CharacterNotFound(_))));
}

#[test]
pub fn test_success_feedback() {
	setup();
	let backend = backend(BackendConfig::default());
	let mut session = backend.start("krackle", stranger()).unwrap();

	session.respond(&mut ScriptedModel::new(&GATE_SPEECH), &mut GreedySampler {}, "Let me pass").unwrap();
	session.mark_last_turn(true);
	assert_eq!(session.context().turn_frequencies().len(), 13);
	assert_eq!(session.context().turn_frequencies().get(&STAY), Some(&1.0));

	// A turn is judged only once
	session.mark_last_turn(true);
	assert_eq!(session.context().turn_frequencies().get(&STAY), Some(&1.0));

	session
		.respond(&mut ScriptedModel::new(&[STAY, BACK, PERIOD]), &mut GreedySampler {}, "Let me pass")
		.unwrap();
	session.mark_last_turn(false);
	assert_eq!(session.context().turn_frequencies().get(&STAY), Some(&1.0));

	session
		.respond(&mut ScriptedModel::new(&[STAY, BACK, PERIOD]), &mut GreedySampler {}, "Let me pass")
		.unwrap();
	session.mark_last_turn(true);
	assert_eq!(session.context().turn_frequencies().get(&STAY), Some(&1.0));
	assert_eq!(session.context().turn_frequencies().get(&QUOTE), Some(&0.5));
	assert_eq!(session.context().turn_count(), 3);
}

#[test]
pub fn test_bias_reaches_sampler() {
	setup();
	let biased = backend(BackendConfig::default());
	let mut session = biased.start("krackle", stranger()).unwrap();
	let mut sampler = RecordingSampler::default();
	session.respond(&mut ScriptedModel::new(&GATE_SPEECH), &mut sampler, "Let me pass").unwrap();
	let first = sampler.first.unwrap();
	assert!(first[59] < 0.0);
	assert!(first[QUOTE as usize] < -2.0);

	let mut config = BackendConfig::default();
	config.generation.bias = false;
	let unbiased = backend(config);
	let mut session = unbiased.start("krackle", stranger()).unwrap();
	let mut sampler = RecordingSampler::default();
	session.respond(&mut ScriptedModel::new(&GATE_SPEECH), &mut sampler, "Let me pass").unwrap();
	let first = sampler.first.unwrap();
	assert_eq!(first[59], 0.0);
	assert_eq!(first[7], 100.0);
}
