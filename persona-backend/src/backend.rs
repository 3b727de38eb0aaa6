use std::sync::Arc;

use persona_bias::{Biaser, ConversationContext, LogitBiasEngine, NullBiaser, VocabularyProfile, VocabularySource};

use crate::{
	config::BackendConfig,
	feedback::SuccessTracker,
	session::ConversationSession,
	stats::ConversationStats,
	types::{BackendError, PlayerState},
};

/// Holds the configuration and the vocabulary profile of a loaded model. The profile is built once and shared by
/// all conversations started from this backend.
pub struct Backend {
	pub config: Arc<BackendConfig>,
	pub profile: Arc<VocabularyProfile>,
}

impl Backend {
	pub fn new(config: BackendConfig, vocabulary: &dyn VocabularySource) -> Result<Backend, BackendError> {
		let profile = VocabularyProfile::build(vocabulary)?;
		tracing::info!(
			characters = config.characters.len(),
			modes = config.modes.len(),
			bias = config.generation.bias,
			"backend instantiated"
		);
		Ok(Backend {
			config: Arc::new(config),
			profile: Arc::new(profile),
		})
	}

	/// Start a conversation between the player and the character with the given identifier
	pub fn start(&self, character_id: &str, player: PlayerState) -> Result<ConversationSession, BackendError> {
		let character = self.config.character(character_id)?.clone();
		let biaser: Box<dyn Biaser> = if self.config.generation.bias {
			Box::new(LogitBiasEngine::new(self.profile.clone()))
		} else {
			Box::new(NullBiaser {})
		};
		tracing::debug!("starting conversation between {} and {}", character.name, player.name);

		Ok(ConversationSession {
			config: self.config.clone(),
			profile: self.profile.clone(),
			context: ConversationContext::new(self.config.keyword_table()),
			biaser,
			character,
			player,
			tracker: SuccessTracker::default(),
			stats: ConversationStats::default(),
			last_turn_tokens: None,
		})
	}
}
