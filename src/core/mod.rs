pub mod context;
pub mod sequence;
pub mod verify;

pub use crate::domain::model::{RunSummary, StepOutcome, StepReport};
pub use crate::domain::ports::{CommandRunner, ServiceManager, Storage};
pub use crate::utils::error::Result;
