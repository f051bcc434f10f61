//! Extension allow-list for filesystem events.

use appy_config::WatchConfig;
use std::path::Path;

/// Decides which paths are worth reacting to.
///
/// A path passes when its file name ends with `.<ext>` for one of the allowed
/// extensions. Matching is on the file name rather than [`Path::extension`]
/// so dotfiles such as `.env` or `.env.development` are included.
#[derive(Debug, Clone)]
pub struct PathFilter {
    suffixes: Vec<String>,
}

impl PathFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suffixes = extensions
            .into_iter()
            .map(|ext| format!(".{}", ext.as_ref().trim_start_matches('.')))
            .collect();
        Self { suffixes }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(&config.extensions)
    }

    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        self.suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }
}
