//! External command execution.

mod executor;
mod invocation;
mod runner;

pub use executor::{Executor, Fallback, Outcome};
pub use invocation::Invocation;
pub use runner::{CommandRunner, ProcessRunner};
