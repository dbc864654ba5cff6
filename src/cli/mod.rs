mod dispatch;
mod types;

pub use dispatch::run;
pub use types::{Cli, Commands};
