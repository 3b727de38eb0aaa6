use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use persona_backend::{config::BackendConfig, mode::pick_mode, prompt::build_prompt, PlayerState, Relationship};
use persona_bias::{ConversationContext, LogitBiasEngine, StaticVocabulary, TokenId, VocabularyProfile, VocabularySource};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
	/// Where to load the config file from (the built-in configuration is used when the file does not exist)
	#[arg(long, short = 'c', default_value = "config.toml")]
	pub config_path: PathBuf,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Show how a vocabulary is categorized and which tokens a character's first step favors
	Inspect {
		/// JSON file with an array of `{ "text": ..., "score": ... }` entries, ordered by token id
		#[arg(long, short = 'v')]
		vocab: PathBuf,

		/// Character identifier
		#[arg(long, default_value = "krackle")]
		character: String,

		/// Mode to inspect (defaults to the character's first allowed mode)
		#[arg(long)]
		mode: Option<String>,

		/// Generation step to compute the biases for
		#[arg(long, default_value_t = 0)]
		step: usize,

		/// Number of tokens to list
		#[arg(long, default_value_t = 20)]
		top: usize,
	},

	/// Print the prompt a character would be given for some player input
	Prompt {
		/// Character identifier
		#[arg(long, default_value = "krackle")]
		character: String,

		/// Name of the player
		#[arg(long, default_value = "Adventurer")]
		player: String,

		#[arg(long, default_value = "stranger")]
		relationship: Relationship,

		/// What the player says
		input: String,
	},
}

#[derive(Serialize, Debug)]
struct BiasedToken {
	token: TokenId,
	text: String,
	bias: f32,
	categories: String,
	appropriate: bool,
}

pub fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt::init();
	let args = Args::parse();

	let config = if args.config_path.exists() {
		BackendConfig::from_path(&args.config_path).with_context(|| format!("loading {}", args.config_path.display()))?
	} else {
		tracing::info!("{} not found, using built-in configuration", args.config_path.display());
		BackendConfig::default()
	};

	match args.command {
		Command::Inspect {
			vocab,
			character,
			mode,
			step,
			top,
		} => {
			let file = File::open(&vocab).with_context(|| format!("opening {}", vocab.display()))?;
			let vocabulary = StaticVocabulary::from_reader(BufReader::new(file))?;
			let profile = Arc::new(VocabularyProfile::build(&vocabulary)?);

			let character = config.character(&character)?;
			let mode_name = match mode {
				Some(mode) => mode,
				None => character
					.allowed_modes
					.first()
					.cloned()
					.ok_or_else(|| anyhow!("character {} has no modes", character.name))?,
			};
			let (_, max_tokens) = config.token_limits(config.mode(&mode_name)?);

			let mut context = ConversationContext::new(config.keyword_table());
			context.begin_turn(&character.role, &mode_name, &vocabulary);

			let engine = LogitBiasEngine::new(profile.clone());
			let mut logits = vec![0.0; vocabulary.len()];
			engine.apply(&context, &mut logits, step, max_tokens.saturating_sub(step));

			let mut ranked: Vec<TokenId> = (0..vocabulary.len() as TokenId).collect();
			ranked.sort_by(|a, b| logits[*b as usize].total_cmp(&logits[*a as usize]));
			let strongest: Vec<BiasedToken> = ranked
				.into_iter()
				.take(top)
				.map(|token| BiasedToken {
					token,
					text: vocabulary.text(token).into_owned(),
					bias: logits[token as usize],
					categories: profile.category(token).to_string(),
					appropriate: engine.appropriateness(&context, token),
				})
				.collect();

			let report = serde_json::json!({
				"summary": profile.summary(),
				"character": character.name,
				"role": character.role,
				"mode": mode_name,
				"step": step,
				"role_tokens": context.role_tokens().len(),
				"mood_tokens": context.mood_tokens().len(),
				"dialogue_tokens": profile.dialogue_tokens().len(),
				"strongest": strongest,
			});
			println!("{}", serde_json::to_string_pretty(&report)?);
		}

		Command::Prompt {
			character,
			player,
			relationship,
			input,
		} => {
			let character = config.character(&character)?;
			let player = PlayerState {
				name: player,
				class: String::new(),
				level: 1,
				relationship,
				recent_action: String::new(),
			};
			let mode_name = pick_mode(character, &player, &input);
			let mode = config.mode(mode_name)?;
			tracing::info!("{} responds in mode {mode_name}", character.name);
			println!("{}", build_prompt(character, mode, &player, &input));
		}
	}
	Ok(())
}
