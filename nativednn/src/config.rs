use std::path::Path;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Options consumed at load time.
///
/// Zero means "derive from the host" for every count below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Number of request slots, i.e. the concurrency limit.
    pub nireq: usize,
    /// Run inferences on the async executor instead of the caller's thread.
    #[serde(rename = "async")]
    pub async_mode: bool,
    /// Worker threads of the default async executor.
    pub threads: usize,
    /// Worker threads for conv2d rows; 0 or 1 runs conv2d inline.
    pub conv2d_threads: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            nireq: 0,
            async_mode: true,
            threads: 0,
            conv2d_threads: 0,
        }
    }
}

impl ModelOptions {
    pub fn sync() -> Self {
        Self {
            async_mode: false,
            ..Self::default()
        }
    }

    pub fn with_nireq(mut self, nireq: usize) -> Self {
        self.nireq = nireq;
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Pool size actually used: the configured value, or half the hardware
    /// threads plus one.
    pub fn resolved_nireq(&self) -> usize {
        if self.nireq > 0 {
            return self.nireq;
        }
        hardware_threads() / 2 + 1
    }
}

pub(crate) fn hardware_threads() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}
