use std::borrow::Cow;
use std::fmt::Display;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::{BiasError, TokenId, VocabularySource};

/// Maximum number of tokens in the `common` category
pub const COMMON_TOKEN_LIMIT: usize = 500;

/// Exponent of the Zipfian rank bias (`ln(1 / (rank + 1) ^ ZIPF_EXPONENT)`)
pub const ZIPF_EXPONENT: f32 = 0.3;

/// Characters that make a token count as punctuation
const PUNCTUATION_CHARS: [char; 5] = ['.', '!', '?', '"', '\''];

/// Set of categories a token belongs to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TokenCategories(u8);

impl TokenCategories {
	pub const NONE: TokenCategories = TokenCategories(0);
	pub const COMMON: TokenCategories = TokenCategories(1);
	pub const RARE: TokenCategories = TokenCategories(2);
	pub const PUNCTUATION: TokenCategories = TokenCategories(4);
	pub const DIALOGUE: TokenCategories = TokenCategories(8);

	pub const fn contains(&self, other: TokenCategories) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn insert(&mut self, other: TokenCategories) {
		self.0 |= other.0;
	}

	pub const fn is_common(&self) -> bool {
		self.contains(Self::COMMON)
	}

	pub const fn is_rare(&self) -> bool {
		self.contains(Self::RARE)
	}

	pub const fn is_punctuation(&self) -> bool {
		self.contains(Self::PUNCTUATION)
	}

	pub const fn is_dialogue(&self) -> bool {
		self.contains(Self::DIALOGUE)
	}
}

impl std::ops::BitOr for TokenCategories {
	type Output = TokenCategories;

	fn bitor(self, rhs: Self) -> Self::Output {
		TokenCategories(self.0 | rhs.0)
	}
}

impl Display for TokenCategories {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let names: Vec<&str> = [
			(Self::COMMON, "common"),
			(Self::RARE, "rare"),
			(Self::PUNCTUATION, "punctuation"),
			(Self::DIALOGUE, "dialogue"),
		]
		.iter()
		.filter(|(c, _)| self.contains(*c))
		.map(|(_, n)| *n)
		.collect();
		write!(f, "[{}]", names.join(","))
	}
}

/// Number of tokens per category in a profile
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CategorySummary {
	pub vocabulary_size: usize,
	pub common: usize,
	pub rare: usize,
	pub punctuation: usize,
	pub dialogue: usize,
}

/// Per-token categories and rank bias, computed once from a vocabulary and immutable afterwards.
#[derive(Debug, Clone)]
pub struct VocabularyProfile {
	rank_bias: Vec<f32>,
	ranks: Vec<u32>,
	categories: Vec<TokenCategories>,

	/// Dialogue-marker tokens, in rank order. A dialogue marker always contains a quote, so it is also punctuation.
	dialogue_tokens: Vec<TokenId>,
}

impl VocabularyProfile {
	/// Rank all tokens by descending frequency score and derive categories and the Zipfian bias from the rank.
	pub fn build(vocabulary: &dyn VocabularySource) -> Result<VocabularyProfile, BiasError> {
		let n = vocabulary.len();
		if n == 0 {
			return Err(BiasError::EmptyVocabulary);
		}

		let mut by_score: Vec<(TokenId, f32)> = (0..n as TokenId).map(|t| (t, vocabulary.score(t))).collect();
		// Stable, so tokens with equal scores keep id order
		by_score.sort_by(|a, b| b.1.total_cmp(&a.1));

		let common_cutoff = COMMON_TOKEN_LIMIT.min(n / 10);
		let rare_cutoff = n * 4 / 5;

		let mut profile = VocabularyProfile {
			rank_bias: vec![0.0; n],
			ranks: vec![0; n],
			categories: vec![TokenCategories::NONE; n],
			dialogue_tokens: vec![],
		};

		for (rank, (token, _score)) in by_score.iter().enumerate() {
			let idx = *token as usize;
			let text = vocabulary.text(*token);
			let mut categories = TokenCategories::NONE;

			if rank < common_cutoff {
				categories.insert(TokenCategories::COMMON);
			}
			if rank > rare_cutoff {
				categories.insert(TokenCategories::RARE);
			}
			if text.contains(PUNCTUATION_CHARS) {
				categories.insert(TokenCategories::PUNCTUATION);
				if text.contains('"') {
					categories.insert(TokenCategories::DIALOGUE);
					profile.dialogue_tokens.push(*token);
				}
			}

			profile.categories[idx] = categories;
			profile.ranks[idx] = rank as u32;
			profile.rank_bias[idx] = (1.0 / (rank as f32 + 1.0).powf(ZIPF_EXPONENT)).ln();
		}

		tracing::info!(
			vocabulary_size = n,
			common_cutoff,
			rare_cutoff,
			dialogue = profile.dialogue_tokens.len(),
			"vocabulary profile built"
		);
		Ok(profile)
	}

	pub fn len(&self) -> usize {
		self.categories.len()
	}

	pub fn is_empty(&self) -> bool {
		self.categories.is_empty()
	}

	pub fn contains(&self, token: TokenId) -> bool {
		(token as usize) < self.len()
	}

	/// Categories of a token. An id outside of the vocabulary is a caller bug: it trips an assertion in debug
	/// builds and is reported (with no categories) otherwise.
	pub fn category(&self, token: TokenId) -> TokenCategories {
		match self.try_category(token) {
			Ok(c) => c,
			Err(e) => {
				debug_assert!(false, "{e}");
				tracing::error!("category lookup failed: {e}");
				TokenCategories::NONE
			}
		}
	}

	pub fn try_category(&self, token: TokenId) -> Result<TokenCategories, BiasError> {
		self.categories.get(token as usize).copied().ok_or(BiasError::TokenOutOfRange {
			token,
			vocabulary_size: self.len(),
		})
	}

	/// 0-based rank of the token by descending frequency score
	pub fn rank(&self, token: TokenId) -> Option<usize> {
		self.ranks.get(token as usize).map(|r| *r as usize)
	}

	/// The precomputed Zipfian bias of every token, indexed by token id
	pub fn rank_bias(&self) -> &[f32] {
		&self.rank_bias
	}

	pub fn dialogue_tokens(&self) -> &[TokenId] {
		&self.dialogue_tokens
	}

	pub fn summary(&self) -> CategorySummary {
		let mut summary = CategorySummary {
			vocabulary_size: self.len(),
			..Default::default()
		};
		for c in self.categories.iter() {
			summary.common += c.is_common() as usize;
			summary.rare += c.is_rare() as usize;
			summary.punctuation += c.is_punctuation() as usize;
			summary.dialogue += c.is_dialogue() as usize;
		}
		summary
	}
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VocabularyEntry {
	pub text: String,
	pub score: f32,
}

/// A vocabulary held in memory; token ids are positions in the entry list
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(transparent)]
pub struct StaticVocabulary {
	entries: Vec<VocabularyEntry>,
}

impl StaticVocabulary {
	pub fn new(entries: Vec<VocabularyEntry>) -> StaticVocabulary {
		StaticVocabulary { entries }
	}

	/// Read a JSON array of `{"text": ..., "score": ...}` objects
	pub fn from_reader(rdr: impl Read) -> Result<StaticVocabulary, serde_json::Error> {
		serde_json::from_reader(rdr)
	}
}

impl<S: Into<String>> FromIterator<(S, f32)> for StaticVocabulary {
	fn from_iter<T: IntoIterator<Item = (S, f32)>>(iter: T) -> Self {
		StaticVocabulary {
			entries: iter
				.into_iter()
				.map(|(text, score)| VocabularyEntry { text: text.into(), score })
				.collect(),
		}
	}
}

impl VocabularySource for StaticVocabulary {
	fn len(&self) -> usize {
		self.entries.len()
	}

	fn score(&self, token: TokenId) -> f32 {
		self.entries.get(token as usize).map(|e| e.score).unwrap_or(f32::NEG_INFINITY)
	}

	fn text(&self, token: TokenId) -> Cow<'_, str> {
		self.entries.get(token as usize).map(|e| Cow::Borrowed(e.text.as_str())).unwrap_or_default()
	}
}
