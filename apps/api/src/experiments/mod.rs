// A/B experiments: deterministic variant assignment plus an in-process registry.
// Assignment is recomputed from a hash on every call; only the audit record is stored.

pub mod assignment;
pub mod handlers;
pub mod registry;

pub use assignment::{assign, Experiment, ExperimentAssignment, ExperimentError, Variant};
pub use registry::ExperimentRegistry;
