use std::collections::{HashMap, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{TokenId, VocabularySource};

/// Number of recent response lengths kept for the complexity estimate
pub const RECENT_LENGTHS_CAPACITY: usize = 5;

pub const MIN_COMPLEXITY_FACTOR: f32 = 0.5;
pub const MAX_COMPLEXITY_FACTOR: f32 = 2.0;

/// Mean response length below which responses are steered to be simpler
const SHORT_RESPONSE_MEAN: f32 = 20.0;

/// Mean response length above which more complex responses are allowed
const LONG_RESPONSE_MEAN: f32 = 50.0;

/// Keywords associated with each character role and each mood. Keywords are stored lower-cased.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
	roles: HashMap<String, Vec<String>>,
	moods: HashMap<String, Vec<String>>,
}

impl KeywordTable {
	pub fn new(roles: HashMap<String, Vec<String>>, moods: HashMap<String, Vec<String>>) -> KeywordTable {
		fn lower(table: HashMap<String, Vec<String>>) -> HashMap<String, Vec<String>> {
			table
				.into_iter()
				.map(|(label, keywords)| (label, keywords.iter().map(|k| k.to_lowercase()).filter(|k| !k.is_empty()).collect()))
				.collect()
		}
		KeywordTable {
			roles: lower(roles),
			moods: lower(moods),
		}
	}

	/// Keywords for a role; unknown roles have none
	pub fn role_keywords(&self, role: &str) -> &[String] {
		self.roles.get(role).map(|k| k.as_slice()).unwrap_or(&[])
	}

	/// Keywords for a mood; unknown moods have none
	pub fn mood_keywords(&self, mood: &str) -> &[String] {
		self.moods.get(mood).map(|k| k.as_slice()).unwrap_or(&[])
	}
}

/// Multiplicative knobs read by the bias engine on every step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasParameters {
	pub complexity_factor: f32,
	pub engagement_modifier: f32,
	pub pattern_strength: f32,
}

impl Default for BiasParameters {
	fn default() -> Self {
		Self {
			complexity_factor: 1.0,
			engagement_modifier: 1.0,
			pattern_strength: 1.0,
		}
	}
}

/// State of a single conversation: the token sets for the current turn's role and mood, plus statistics that
/// accumulate over all turns.
#[derive(Debug, Clone)]
pub struct ConversationContext {
	keywords: KeywordTable,
	role_tokens: FxHashSet<TokenId>,
	mood_tokens: FxHashSet<TokenId>,
	turn_count: usize,
	recent_lengths: VecDeque<usize>,
	turn_frequencies: FxHashMap<TokenId, f32>,
	params: BiasParameters,
}

impl ConversationContext {
	pub fn new(keywords: KeywordTable) -> ConversationContext {
		ConversationContext {
			keywords,
			role_tokens: FxHashSet::default(),
			mood_tokens: FxHashSet::default(),
			turn_count: 0,
			recent_lengths: VecDeque::with_capacity(RECENT_LENGTHS_CAPACITY),
			turn_frequencies: FxHashMap::default(),
			params: BiasParameters::default(),
		}
	}

	/// Prepare for a new turn: rebuild the role and mood token sets by scanning the whole vocabulary, then update
	/// the turn statistics. Scans every token once per keyword, so call this once per turn only.
	pub fn begin_turn(&mut self, role: &str, mood: &str, vocabulary: &dyn VocabularySource) {
		self.role_tokens.clear();
		self.mood_tokens.clear();

		let role_keywords = self.keywords.role_keywords(role);
		let mood_keywords = self.keywords.mood_keywords(mood);
		if role_keywords.is_empty() {
			tracing::debug!("no keywords for role '{role}'");
		}
		if mood_keywords.is_empty() {
			tracing::debug!("no keywords for mood '{mood}'");
		}

		if !role_keywords.is_empty() || !mood_keywords.is_empty() {
			for token in 0..vocabulary.len() as TokenId {
				let text = vocabulary.text(token).to_lowercase();
				if role_keywords.iter().any(|k| text.contains(k.as_str())) {
					self.role_tokens.insert(token);
				}
				if mood_keywords.iter().any(|k| text.contains(k.as_str())) {
					self.mood_tokens.insert(token);
				}
			}
		}

		self.turn_count += 1;
		if self.recent_lengths.len() >= RECENT_LENGTHS_CAPACITY {
			self.recent_lengths.pop_front();
		}
		self.update_complexity_factor();

		tracing::debug!(
			turn = self.turn_count,
			role,
			mood,
			role_tokens = self.role_tokens.len(),
			mood_tokens = self.mood_tokens.len(),
			complexity_factor = self.params.complexity_factor,
			"turn context rebuilt"
		);
	}

	/// Record the length (in tokens) of the response that was generated for the current turn
	pub fn record_turn_outcome(&mut self, response_length: usize) {
		while self.recent_lengths.len() >= RECENT_LENGTHS_CAPACITY {
			self.recent_lengths.pop_front();
		}
		self.recent_lengths.push_back(response_length);
	}

	fn update_complexity_factor(&mut self) {
		let mean = if self.recent_lengths.is_empty() {
			0.0
		} else {
			self.recent_lengths.iter().sum::<usize>() as f32 / self.recent_lengths.len() as f32
		};

		if mean < SHORT_RESPONSE_MEAN {
			self.params.complexity_factor *= 0.9;
		} else if mean > LONG_RESPONSE_MEAN {
			self.params.complexity_factor *= 1.1;
		}
		self.params.complexity_factor = self.params.complexity_factor.clamp(MIN_COMPLEXITY_FACTOR, MAX_COMPLEXITY_FACTOR);
	}

	pub fn role_tokens(&self) -> &FxHashSet<TokenId> {
		&self.role_tokens
	}

	pub fn mood_tokens(&self) -> &FxHashSet<TokenId> {
		&self.mood_tokens
	}

	pub fn turn_count(&self) -> usize {
		self.turn_count
	}

	pub fn recent_lengths(&self) -> &VecDeque<usize> {
		&self.recent_lengths
	}

	pub fn complexity_factor(&self) -> f32 {
		self.params.complexity_factor
	}

	pub fn params(&self) -> &BiasParameters {
		&self.params
	}

	/// Scales the role and mood boosts. Not clamped.
	pub fn set_engagement_modifier(&mut self, engagement_modifier: f32) {
		self.params.engagement_modifier = engagement_modifier;
	}

	/// Scales the dialogue closure boost and the success pattern boost. Not clamped.
	pub fn set_pattern_strength(&mut self, pattern_strength: f32) {
		self.params.pattern_strength = pattern_strength;
	}

	/// Fraction of successful turns in which each token appeared
	pub fn turn_frequencies(&self) -> &FxHashMap<TokenId, f32> {
		&self.turn_frequencies
	}

	pub fn turn_frequencies_mut(&mut self) -> &mut FxHashMap<TokenId, f32> {
		&mut self.turn_frequencies
	}
}
