use std::{collections::HashMap, path::Path};

use persona_bias::KeywordTable;
use serde::{Deserialize, Serialize};

use crate::types::BackendError;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModeConfig {
	/// Instruction describing how the character behaves in this mode
	pub prompt_modifier: String,

	/// Minimum number of tokens in a response
	#[serde(default = "default_mode_min_tokens")]
	pub min_tokens: usize,

	/// Maximum number of tokens in a response
	#[serde(default = "default_mode_max_tokens")]
	pub max_tokens: usize,
}

const fn default_mode_min_tokens() -> usize {
	10
}

const fn default_mode_max_tokens() -> usize {
	150
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CharacterConfig {
	/// Name the character goes by
	pub name: String,

	/// Role label used to look up role keywords (e.g. "guard")
	pub role: String,

	/// Description of who the character is
	pub base_prompt: String,

	/// Additional background information
	#[serde(default)]
	pub background: String,

	/// Modes this character can respond in; the first one is the default
	pub allowed_modes: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GenerationConfig {
	/// Lower bound on the minimum response length of every mode
	#[serde(default = "default_min_response_tokens")]
	pub min_response_tokens: usize,

	/// Upper bound on the maximum response length of every mode
	#[serde(default = "default_max_output_tokens")]
	pub max_output_tokens: usize,

	/// Whether to bias the model output towards the character (when false, only stopping rules apply)
	#[serde(default = "default_bias")]
	pub bias: bool,

	/// Utterance used when generation produced nothing usable
	#[serde(default = "default_fallback_response")]
	pub fallback_response: String,
}

const fn default_min_response_tokens() -> usize {
	8
}

const fn default_max_output_tokens() -> usize {
	300
}

const fn default_bias() -> bool {
	true
}

fn default_fallback_response() -> String {
	String::from("I... I'm not sure what to say.")
}

impl Default for GenerationConfig {
	fn default() -> Self {
		Self {
			min_response_tokens: default_min_response_tokens(),
			max_output_tokens: default_max_output_tokens(),
			bias: default_bias(),
			fallback_response: default_fallback_response(),
		}
	}
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SamplerConfig {
	/// The top K words by score are kept during sampling.
	#[serde(default = "default_top_k")]
	pub top_k: usize,

	/// The cumulative probability after which no more words are kept for sampling.
	#[serde(default = "default_top_p")]
	pub top_p: f32,

	/// Temperature (randomness) used for sampling. A higher number is more random.
	#[serde(default = "default_temperature")]
	pub temperature: f32,

	/// Always pick the most likely remaining token instead of drawing one at random
	#[serde(default = "default_greedy")]
	pub greedy: bool,

	/// Seed for random draws (when not set, a random seed is used)
	pub seed: Option<u64>,
}

const fn default_top_k() -> usize {
	40
}

const fn default_top_p() -> f32 {
	0.95
}

const fn default_temperature() -> f32 {
	0.80
}

const fn default_greedy() -> bool {
	true
}

impl Default for SamplerConfig {
	fn default() -> Self {
		Self {
			top_k: default_top_k(),
			top_p: default_top_p(),
			temperature: default_temperature(),
			greedy: default_greedy(),
			seed: None,
		}
	}
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct BackendConfig {
	pub generation: GenerationConfig,

	pub sampler: SamplerConfig,

	/// Keywords per character role
	pub roles: HashMap<String, Vec<String>>,

	/// Keywords per mood (mood names are the same as mode names)
	pub moods: HashMap<String, Vec<String>>,

	/// Personality modes by name
	pub modes: HashMap<String, ModeConfig>,

	/// Characters by identifier
	pub characters: HashMap<String, CharacterConfig>,
}

impl Default for BackendConfig {
	fn default() -> Self {
		Self {
			generation: GenerationConfig::default(),
			sampler: SamplerConfig::default(),
			roles: default_roles(),
			moods: default_moods(),
			modes: default_modes(),
			characters: default_characters(),
		}
	}
}

impl BackendConfig {
	/// Parse a TOML configuration. Sections that are left out keep their built-in defaults.
	pub fn from_toml_str(s: &str) -> Result<BackendConfig, BackendError> {
		let config: BackendConfig = toml::from_str(s)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_path(path: &Path) -> Result<BackendConfig, BackendError> {
		let s = std::fs::read_to_string(path)?;
		Self::from_toml_str(&s)
	}

	pub fn validate(&self) -> Result<(), BackendError> {
		for (id, character) in &self.characters {
			if character.allowed_modes.is_empty() {
				return Err(BackendError::Config(format!("character {id} has no allowed modes")));
			}
			for mode in &character.allowed_modes {
				if !self.modes.contains_key(mode) {
					return Err(BackendError::Config(format!("mode {mode} not found for character {id}")));
				}
			}
		}
		for (name, mode) in &self.modes {
			if mode.max_tokens == 0 {
				return Err(BackendError::Config(format!("mode {name} allows no tokens")));
			}
		}
		if self.generation.max_output_tokens == 0 {
			return Err(BackendError::Config("max_output_tokens must be positive".to_string()));
		}
		Ok(())
	}

	pub fn character(&self, id: &str) -> Result<&CharacterConfig, BackendError> {
		self.characters.get(id).ok_or_else(|| BackendError::CharacterNotFound(id.to_string()))
	}

	pub fn mode(&self, name: &str) -> Result<&ModeConfig, BackendError> {
		self.modes.get(name).ok_or_else(|| BackendError::ModeNotFound(name.to_string()))
	}

	pub fn keyword_table(&self) -> KeywordTable {
		KeywordTable::new(self.roles.clone(), self.moods.clone())
	}

	/// Minimum and maximum response length for a mode
	pub fn token_limits(&self, mode: &ModeConfig) -> (usize, usize) {
		(
			self.generation.min_response_tokens.max(mode.min_tokens),
			self.generation.max_output_tokens.min(mode.max_tokens),
		)
	}
}

fn table(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
	entries
		.iter()
		.map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
		.collect()
}

fn default_roles() -> HashMap<String, Vec<String>> {
	table(&[
		("guard", &["guard", "watch", "protect", "duty", "patrol", "secure", "defend"]),
		("tavernkeeper", &["tavern", "ale", "drink", "brew", "welcome", "inn", "guest", "room"]),
		("scribe", &["scroll", "write", "record", "ink", "quill", "document", "archive", "knowledge"]),
		("merchant", &["gold", "coin", "trade", "sell", "buy", "price", "goods", "wares"]),
		("knight", &["honor", "sword", "shield", "oath", "noble", "quest", "chivalry"]),
		("wizard", &["magic", "spell", "arcane", "tome", "staff", "enchant", "ritual"]),
	])
}

fn default_moods() -> HashMap<String, Vec<String>> {
	table(&[
		("friendly", &["pleased", "welcome", "glad", "happy", "kind", "warm", "cheerful"]),
		("rude", &["annoyed", "irritated", "bah", "hmph", "whatever", "fool", "waste"]),
		("suspicious", &["wary", "careful", "suspicious", "doubt", "trust", "watch", "unsure"]),
		("deferential", &["sir", "madam", "honor", "respect", "please", "apologize", "forgive"]),
		("stoic", &["indeed", "understood", "very well", "quite", "certainly"]),
	])
}

fn default_modes() -> HashMap<String, ModeConfig> {
	let mode = |prompt_modifier: &str, min_tokens, max_tokens| ModeConfig {
		prompt_modifier: prompt_modifier.to_string(),
		min_tokens,
		max_tokens,
	};
	HashMap::from([
		(
			"friendly".to_string(),
			mode("You respond with warmth, politeness, and helpfulness. Speak in complete sentences.", 15, 150),
		),
		(
			"rude".to_string(),
			mode("You respond curtly, with irritation, sarcasm, or disrespect. Keep responses brief but complete.", 8, 80),
		),
		(
			"suspicious".to_string(),
			mode("You respond with mistrust, guarded language, and evasiveness. Answer hesitantly.", 12, 120),
		),
		(
			"deferential".to_string(),
			mode("You are very respectful and submissive to the speaker. Use honorifics and speak humbly.", 20, 200),
		),
		(
			"stoic".to_string(),
			mode("You speak briefly with little emotion, but still provide complete thoughts.", 10, 60),
		),
	])
}

fn default_characters() -> HashMap<String, CharacterConfig> {
	let character = |name: &str, role: &str, base_prompt: &str, background: &str, modes: &[&str]| CharacterConfig {
		name: name.to_string(),
		role: role.to_string(),
		base_prompt: base_prompt.to_string(),
		background: background.to_string(),
		allowed_modes: modes.iter().map(|m| m.to_string()).collect(),
	};
	HashMap::from([
		(
			"krackle".to_string(),
			character(
				"Krackle",
				"guard",
				"You are the deadly front door guard to the Ramsel Dynasty. You are blunt, experienced, and have no time for nonsense. You've seen many adventurers come and go.",
				"A veteran guard who has protected the dynasty for decades. Wears battle-scarred armor and carries an ancient sword.",
				&["friendly", "rude", "suspicious"],
			),
		),
		(
			"mira".to_string(),
			character(
				"Mira",
				"tavernkeeper",
				"You are a world-weary but kind tavernkeeper who welcomes all sorts but is slow to trust. You've heard countless stories from travelers.",
				"Runs 'The Weary Traveler' tavern. Has graying hair and knowing eyes that have seen much of the world through her patrons.",
				&["friendly", "suspicious", "stoic"],
			),
		),
		(
			"feylan".to_string(),
			character(
				"Feylan",
				"scribe",
				"You are an anxious young court scribe. You are always deferential to those in authority and eager to help with your knowledge of court matters and records.",
				"A young scholar with ink-stained fingers and nervous habits. Knows the history and procedures of the royal court intimately.",
				&["deferential", "friendly", "stoic"],
			),
		),
	])
}
