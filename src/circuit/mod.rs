//! Circuit representation: the two-phase (unstamped/stamped) lifecycle,
//! element stampers, and the stamping pipeline.

mod stamped;
mod types;
mod unstamped;

pub use stamped::StampedCircuit;
pub use types::{BranchLevel, ClassifiedIndex, IntegrationMethod, MeterSpec, NodeIndex};
pub use unstamped::UnstampedCircuit;
