//! Runtime plumbing shared by the `ng-da` binaries: logging and settings.

mod logger;
pub mod settings;

pub use logger::Logger;
pub use ng_da_error::{DaError, DaResult};
pub use settings::Settings;
