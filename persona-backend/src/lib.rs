pub mod backend;
pub mod config;
pub mod feedback;
pub mod mode;
pub mod model;
pub mod prompt;
pub mod sampler;
pub mod session;
pub mod stats;
pub mod types;

pub use backend::Backend;
pub use config::BackendConfig;
pub use model::StepModel;
pub use sampler::{ChainSampler, GreedySampler, TokenSampler};
pub use session::ConversationSession;
pub use types::{BackendError, PlayerState, Relationship, TurnResponse};
