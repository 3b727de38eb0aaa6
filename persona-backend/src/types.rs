use persona_bias::{BiasError, StopReason, TokenId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::TurnStats;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
	#[default]
	Stranger,
	Friend,
	Foe,
}

impl std::str::FromStr for Relationship {
	type Err = BackendError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_lowercase().as_str() {
			"" | "stranger" => Ok(Relationship::Stranger),
			"friend" => Ok(Relationship::Friend),
			"foe" => Ok(Relationship::Foe),
			other => Err(BackendError::Config(format!("invalid relationship: {other}"))),
		}
	}
}

impl std::fmt::Display for Relationship {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Relationship::Stranger => "stranger",
			Relationship::Friend => "friend",
			Relationship::Foe => "foe",
		})
	}
}

/// The party the character is talking to
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PlayerState {
	pub name: String,

	#[serde(default)]
	pub class: String,

	#[serde(default = "default_level")]
	pub level: u32,

	#[serde(default)]
	pub relationship: Relationship,

	/// What the player did most recently (e.g. "threaten", "ask for help")
	#[serde(default)]
	pub recent_action: String,
}

const fn default_level() -> u32 {
	1
}

/// The outcome of one conversational turn
#[derive(Serialize, Clone, Debug)]
pub struct TurnResponse {
	/// The cleaned-up utterance of the character
	pub text: String,

	/// The personality mode the character responded in
	pub mode: String,

	pub stop_reason: StopReason,

	/// Tokens produced by the model for this response
	pub tokens: Vec<TokenId>,

	pub stats: TurnStats,
}

#[derive(Error, Debug)]
pub enum BackendError {
	#[error("character not found: {0}")]
	CharacterNotFound(String),

	#[error("mode not found: {0}")]
	ModeNotFound(String),

	#[error("configuration error: {0}")]
	Config(String),

	#[error("could not parse configuration: {0}")]
	ConfigParse(#[from] toml::de::Error),

	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),

	#[error("prompt tokenized to nothing")]
	EmptyPrompt,

	#[error("inference error: {0}")]
	Inference(String),

	#[error("decoding error: {0}")]
	Decode(String),

	#[error("bias error: {0}")]
	Bias(#[from] BiasError),
}
