pub mod config;
pub mod error;
pub mod handle_map;
pub mod report;

pub use config::{CoreSettings, HazardStrictness, LayerSettings, ReportSettings, ValidationSettings};
pub use error::{HandleError, LayerError, LifetimeError, ReflectError};
pub use handle_map::{HandleAllocator, HandleMap};
pub use report::{DebugReport, Diagnostic, ErrorKind, MessengerCreateInfo, MessengerId, Severity};
