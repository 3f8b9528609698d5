pub mod config;
pub mod fix;
pub mod handlers;
pub mod logging;
pub mod model;
pub mod output;
pub mod traits;
pub mod version;

// Re-export common types for convenience
pub use config::{BotConfig, ConfigError, ProjectConfig};
pub use fix::{FixOrchestrator, OrchestratorError};
pub use model::*;
pub use traits::*;
