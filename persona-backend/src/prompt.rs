use crate::{
	config::{CharacterConfig, ModeConfig},
	types::PlayerState,
};

/// Render the prompt for one turn. The prompt ends inside an opening quote, so the model continues with the
/// character's words and a closing quote marks the natural end of the utterance.
pub fn build_prompt(character: &CharacterConfig, mode: &ModeConfig, player: &PlayerState, input: &str) -> String {
	let name = &character.name;
	let mut prompt = format!("You are {name}. {}\n\n", character.base_prompt);
	if !character.background.is_empty() {
		prompt += &format!("Background: {}\n\n", character.background);
	}
	prompt += &format!(
		"Current situation: You are speaking with {} (a level {} {}) who is a {} to you.\n\n",
		player.name, player.level, player.class, player.relationship
	);
	prompt += &format!("Your current mood/behavior: {}\n\n", mode.prompt_modifier);

	prompt.push_str("Important rules:\n");
	prompt += &format!("- Respond as {name} would, staying in character\n");
	prompt.push_str("- Give thoughtful, complete responses (not just one word)\n");
	prompt.push_str("- Do not speak for the other person or continue their dialogue\n");
	prompt.push_str("- Respond naturally as if in a real conversation\n\n");

	prompt += &format!("{} says: \"{}\"\n\n", player.name, input);
	prompt += &format!("{name} responds: \"");
	prompt
}

#[cfg(test)]
mod tests {
	use super::build_prompt;
	use crate::{
		config::BackendConfig,
		types::{PlayerState, Relationship},
	};

	#[test]
	fn test_build_prompt() {
		let config = BackendConfig::default();
		let mira = config.character("mira").unwrap();
		let player = PlayerState {
			name: "Ariadne".to_string(),
			class: "ranger".to_string(),
			level: 3,
			relationship: Relationship::Foe,
			recent_action: String::new(),
		};
		let prompt = build_prompt(mira, config.mode("stoic").unwrap(), &player, "A room, please.");
		assert!(prompt.starts_with("You are Mira. "));
		assert!(prompt.contains("Background: Runs 'The Weary Traveler' tavern."));
		assert!(prompt.contains("(a level 3 ranger) who is a foe to you."));
		assert!(prompt.contains("Your current mood/behavior: You speak briefly"));
		assert!(prompt.contains("- Respond as Mira would, staying in character\n"));
		assert!(prompt.ends_with("Ariadne says: \"A room, please.\"\n\nMira responds: \""));
	}
}
