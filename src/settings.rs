//! Mount-time configuration.

use serde::{Deserialize, Serialize};

/// Line width after which context values are printed on their own line.
pub const DEFAULT_REPR_WIDTH: usize = 88;

/// Settings applied when a story is mounted.
///
/// Deserializable, so it can be loaded from the application's own config:
///
/// ```
/// let settings: fabula::Settings = serde_json::from_str(r#"{"workers": 4}"#).unwrap();
/// assert_eq!(settings.workers, Some(4));
/// assert_eq!(settings.repr_width, 88);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker threads for parallel groups of function stories.
    /// `None` uses the global rayon pool.
    pub workers: Option<usize>,
    /// Width used by the context representation.
    pub repr_width: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: None,
            repr_width: DEFAULT_REPR_WIDTH,
        }
    }
}

impl Settings {
    /// Use a dedicated pool of `workers` threads for parallel groups.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Change the representation width.
    pub fn with_repr_width(mut self, width: usize) -> Self {
        self.repr_width = width;
        self
    }
}
