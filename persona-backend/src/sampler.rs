use llm_samplers::prelude::{
	Logits, SampleGreedy, SampleRandDistrib, SampleTemperature, SampleTopK, SampleTopP, Sampler, SamplerChain, SimpleSamplerResources,
};
use persona_bias::TokenId;
use rand::{rngs::StdRng, SeedableRng};

use crate::config::SamplerConfig;

/// Turns an adjusted score array into the next token. `None` means no token could be chosen, which the session
/// treats the same as an end-of-sequence token.
pub trait TokenSampler {
	fn sample(&mut self, logits: &[f32]) -> Option<TokenId>;
}

/// Always picks the highest scoring token
pub struct GreedySampler {}

impl TokenSampler for GreedySampler {
	fn sample(&mut self, logits: &[f32]) -> Option<TokenId> {
		logits
			.iter()
			.enumerate()
			.filter(|(_, l)| l.is_finite())
			.max_by(|a, b| a.1.total_cmp(b.1))
			.map(|(i, _)| i as TokenId)
	}
}

/// Top-k, then top-p on the unscaled distribution, then temperature, then either the most likely remaining token or
/// a random draw
pub struct ChainSampler {
	chain: SamplerChain,
	resources: SimpleSamplerResources,
}

impl ChainSampler {
	pub fn new(config: SamplerConfig) -> ChainSampler {
		let rng = match config.seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};

		let mut chain = SamplerChain::new();
		if config.top_k > 0 {
			chain.push_sampler(SampleTopK::new(config.top_k, 1));
		}
		if config.top_p < 1.0 {
			chain.push_sampler(SampleTopP::new(config.top_p, 1));
		}
		if config.greedy || config.temperature <= 0.0 {
			chain.push_sampler(SampleGreedy::new());
		} else {
			chain.push_sampler(SampleTemperature::new(config.temperature));
			chain.push_sampler(SampleRandDistrib::new());
		}
		tracing::debug!(
			top_k = config.top_k,
			top_p = config.top_p,
			temperature = config.temperature,
			greedy = config.greedy,
			"sampler chain built"
		);

		ChainSampler {
			chain,
			resources: SimpleSamplerResources::new(Some(Box::new(rng)), Some(vec![])),
		}
	}
}

impl TokenSampler for ChainSampler {
	fn sample(&mut self, logits: &[f32]) -> Option<TokenId> {
		if !logits.iter().any(|l| l.is_finite()) {
			return None;
		}
		let scores = logits.iter().map(|l| if l.is_nan() { f32::NEG_INFINITY } else { *l });
		let mut logits = match Logits::try_from_iter(scores) {
			Ok(logits) => logits,
			Err(e) => {
				tracing::warn!("cannot build sampler input: {e}");
				return None;
			}
		};
		match self.chain.sample_token(&mut self.resources, &mut logits) {
			Ok(token) => token,
			Err(e) => {
				tracing::warn!("sampling failed: {e}");
				None
			}
		}
	}
}
