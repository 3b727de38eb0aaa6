use crate::{
	config::CharacterConfig,
	types::{PlayerState, Relationship},
};

const THREAT_WORDS: [&str; 4] = ["threaten", "kill", "harm", "attack"];
const ROYALTY_WORDS: [&str; 4] = ["king", "queen", "majesty", "lord"];

/// Choose the personality mode a character responds in, given who they are talking to and what was said. Only
/// modes the character allows are considered; when nothing specific applies, the character's first mode is used.
pub fn pick_mode<'a>(character: &'a CharacterConfig, player: &PlayerState, input: &str) -> &'a str {
	let allowed = |mode: &str| character.allowed_modes.iter().find(|m| m.as_str() == mode).map(|m| m.as_str());
	let text = format!("{} {}", input, player.recent_action).to_lowercase();
	let mentions = |words: &[&str]| words.iter().any(|w| text.contains(w));

	// Threats override everything else
	if mentions(&THREAT_WORDS) {
		if let Some(mode) = allowed("rude") {
			return mode;
		}
	}

	let by_relationship = match player.relationship {
		Relationship::Friend => allowed("friendly"),
		Relationship::Foe => allowed("rude").or_else(|| allowed("suspicious")),
		Relationship::Stranger => allowed("suspicious"),
	};
	if let Some(mode) = by_relationship {
		return mode;
	}

	if mentions(&["thank"]) {
		if let Some(mode) = allowed("friendly") {
			return mode;
		}
	}

	if mentions(&ROYALTY_WORDS) {
		if let Some(mode) = allowed("deferential") {
			return mode;
		}
	}

	character.allowed_modes.first().map(|m| m.as_str()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::pick_mode;
	use crate::{
		config::BackendConfig,
		types::{PlayerState, Relationship},
	};

	fn player(relationship: Relationship, recent_action: &str) -> PlayerState {
		PlayerState {
			name: "Ariadne".to_string(),
			class: "ranger".to_string(),
			level: 3,
			relationship,
			recent_action: recent_action.to_string(),
		}
	}

	#[test]
	fn test_threat_overrides_relationship() {
		let config = BackendConfig::default();
		let krackle = config.character("krackle").unwrap();
		assert_eq!(pick_mode(krackle, &player(Relationship::Friend, ""), "I will attack you"), "rude");
		assert_eq!(pick_mode(krackle, &player(Relationship::Friend, "threaten"), "hello"), "rude");

		// Mira cannot be rude; threats fall through to the relationship
		let mira = config.character("mira").unwrap();
		assert_eq!(pick_mode(mira, &player(Relationship::Friend, ""), "I will kill you"), "friendly");
	}

	#[test]
	fn test_relationship() {
		let config = BackendConfig::default();
		let krackle = config.character("krackle").unwrap();
		assert_eq!(pick_mode(krackle, &player(Relationship::Friend, ""), "hello"), "friendly");
		assert_eq!(pick_mode(krackle, &player(Relationship::Foe, ""), "hello"), "rude");
		assert_eq!(pick_mode(krackle, &player(Relationship::Stranger, ""), "hello"), "suspicious");

		let mira = config.character("mira").unwrap();
		assert_eq!(pick_mode(mira, &player(Relationship::Foe, ""), "hello"), "suspicious");
	}

	#[test]
	fn test_keywords_and_default() {
		let config = BackendConfig::default();
		let feylan = config.character("feylan").unwrap();
		// Feylan is never suspicious, so strangers fall through to the keyword rules
		assert_eq!(pick_mode(feylan, &player(Relationship::Stranger, ""), "Thank you kindly"), "friendly");
		assert_eq!(pick_mode(feylan, &player(Relationship::Stranger, ""), "Where is the King?"), "deferential");
		assert_eq!(pick_mode(feylan, &player(Relationship::Foe, ""), "hello"), "deferential");
	}
}
