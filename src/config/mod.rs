pub mod traits;
pub mod evolution;
pub mod rl;
pub mod risk;
pub mod orchestration;
pub mod manager;

pub use manager::{ConfigManager, AppConfig};
pub use evolution::{BlendMode, GaParams};
pub use rl::{RewardShaping, RlParams};
pub use risk::RiskLimits;
pub use orchestration::{OrchestratorConfig, RetryPolicy};
pub use traits::ConfigSection;
