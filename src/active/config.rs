//! Runtime settings for active state machines.

use serde::{Deserialize, Serialize};

/// Worker thread settings. Missing fields take their defaults when
/// deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveConfig {
    pub thread_name: String,
    /// Worker stack size in bytes; the platform default when unset.
    pub stack_size: Option<usize>,
}

impl Default for ActiveConfig {
    fn default() -> Self {
        Self {
            thread_name: "statecraft-worker".to_string(),
            stack_size: None,
        }
    }
}

impl ActiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}
