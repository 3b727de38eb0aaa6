//! Post-generation cleanup of a character response: strip speaker impersonation, avoid ending mid-sentence and
//! never return an empty utterance.

/// Cues after which the model is no longer speaking as the character (the player's own `<name>:` is added per call)
pub const SPEAKER_CUES: [&str; 8] = [
	"Adventurer:",
	"User:",
	"You say",
	"### Input:",
	"### Instruction:",
	"### Response:",
	"### Assistant:",
	"### Human:",
];

/// Fraction of the text after which a trailing partial sentence is dropped
const SENTENCE_END_THRESHOLD: f64 = 0.7;

/// Turn the raw detokenized response into the utterance shown to the player.
pub fn clean_response(raw: &str, player_name: &str, fallback: &str) -> String {
	let sanitized = sanitize(raw);
	let truncated = truncate_at_speaker_cue(&sanitized, player_name);

	let mut text = truncated.trim();
	text = text.strip_prefix('"').unwrap_or(text);
	text = text.strip_suffix('"').unwrap_or(text);
	text = text.trim();

	if text.trim_matches('"').trim().is_empty() {
		tracing::debug!("empty response replaced by fallback (raw: {raw:?})");
		return fallback.to_string();
	}
	text.to_string()
}

/// Replace anything that is not printable ASCII or a newline by a space and collapse runs of spaces.
pub fn sanitize(input: &str) -> String {
	let mut output = String::with_capacity(input.len());
	let mut last_was_space = false;
	for c in input.chars() {
		let c = if c == '\n' || (' '..='~').contains(&c) { c } else { ' ' };
		if c == ' ' {
			if !last_was_space {
				output.push(c);
			}
			last_was_space = true;
		} else {
			output.push(c);
			last_was_space = false;
		}
	}
	output
}

/// Cut the text at the earliest speaker cue, ignoring ASCII case (a cue at the very start does not count), then drop
/// a trailing partial sentence if the last sentence end lies in the final 30% of what remains.
pub fn truncate_at_speaker_cue<'a>(text: &'a str, player_name: &str) -> &'a str {
	// ASCII lower-casing keeps byte offsets
	let lower = text.to_ascii_lowercase();
	let player_cue = format!("{player_name}:");
	let cut = SPEAKER_CUES
		.iter()
		.copied()
		.chain(std::iter::once(player_cue.as_str()))
		.filter(|cue| !cue.is_empty())
		.filter_map(|cue| find_from(&lower, &cue.to_ascii_lowercase(), 1))
		.min();

	let mut result = match cut {
		Some(cut) => &text[..cut],
		None => text,
	};

	if let Some(last_end) = result.rfind(['.', '!', '?']) {
		if last_end as f64 > result.len() as f64 * SENTENCE_END_THRESHOLD {
			result = &result[..=last_end];
		}
	}
	result
}

fn find_from(haystack: &str, needle: &str, start: usize) -> Option<usize> {
	let start = (start..=haystack.len()).find(|i| haystack.is_char_boundary(*i))?;
	haystack[start..].find(needle).map(|p| p + start)
}
