//! External process execution for experiment runners, rendering scripts and
//! document tools.

mod executor;
mod logs;
mod repetitions;

pub use executor::{shell_quote, BackgroundRun, Executor, Invocation};
pub use logs::LogLayout;
pub use repetitions::{apply_repetitions, patch_repetition_line};
