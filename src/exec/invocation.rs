//! A single external tool invocation.

use std::fmt;
use std::path::Path;

/// Program plus ISIS-style `key=value` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a `key=value` argument.
    pub fn arg(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.args.push(format!("{}={}", key, value));
        self
    }

    /// Append a `key=<path>` argument.
    pub fn path_arg(self, key: &str, path: &Path) -> Self {
        self.arg(key, path.display())
    }

    /// Value of the first `key=` argument, if present.
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|a| {
            a.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
