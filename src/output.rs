use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Characters that are invalid in a file name on at least one platform.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("I/O error")]
    IoError(#[from] std::io::Error),
}

#[async_trait]
pub trait OutputNamer: Send + Sync {
    /// Resolves `base` to a path that does not overwrite existing output.
    async fn next_available_name(&self, base: &str) -> Result<PathBuf, OutputError>;
}

/// Names files inside a directory, appending `_<n>` on collision.
#[derive(Debug, Clone)]
pub struct FsNamer {
    dir: PathBuf,
}

impl FsNamer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl OutputNamer for FsNamer {
    async fn next_available_name(&self, base: &str) -> Result<PathBuf, OutputError> {
        let name = sanitize_filename(base);
        let path = self.dir.join(&name);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }

        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let ext = Path::new(&name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut n: u64 = 1;
        loop {
            let path = self.dir.join(format!("{}_{}{}", stem, n, ext));
            if !tokio::fs::try_exists(&path).await? {
                return Ok(path);
            }
            n += 1;
        }
    }
}

/// Replaces characters that cannot appear in file names and collapses runs
/// of them into a single `_`.
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}
