//! Terminal output for protogen commands
//!
//! Spinners and styled step lines in a terminal, plain prefixed lines
//! in CI or when output is piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, outro_success, outro_warn, step_info, step_ok, step_warn};
pub use progress::TaskSpinner;
