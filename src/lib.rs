pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod platform;
pub mod steps;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{LocalStorage, SystemRunner};
pub use config::profile::LabProfile;
pub use core::context::ProvisionContext;
pub use core::sequence::StepSequence;
pub use core::verify::Verifier;
pub use domain::model::Platform;
pub use utils::error::{LabError, Result};
