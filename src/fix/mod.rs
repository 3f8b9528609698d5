//! Fix delivery: from a deduplicated fix map to branches and pull requests.
//!
//! [`aggregate`] folds scanner findings into one candidate per package,
//! [`branch`] derives deterministic names and checksums, [`lifecycle`] talks
//! to git and the VCS provider, and [`orchestrator`] sequences a full run.

pub mod aggregate;
pub mod branch;
pub mod lifecycle;
pub mod orchestrator;

pub use aggregate::{build_fix_versions_map, AggregationError};
pub use branch::{FixBranchNamer, BranchTemplateError};
pub use lifecycle::{BranchLifecycle, LifecycleError};
pub use orchestrator::{FixOrchestrator, OrchestratorError};
