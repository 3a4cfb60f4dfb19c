pub mod config;
pub mod logging;
mod span;

#[doc(hidden)]
pub use tracing;

pub use config::{Environment, env_or, env_string_or};
pub use logging::setup_logging;
