pub mod config;
pub mod contracts;
pub mod names;
pub mod types;

pub use config::{ConfigError, GateConfig, ListErrorPolicy, RollgateConfig};
pub use contracts::{EventRecorder, ListError, RolloutBlockLister, SubjectWriter, UpdateError};
pub use types::*;
