//! File-attributed, non-fatal errors.

use std::path::PathBuf;
use thiserror::Error;

/// An error attributed to one contributing file (config fragment or
/// dependency manifest). Never aborts the build; surfaced per target so the
/// host can render it at the right location.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", path.display())]
pub struct AttributedError {
    pub path: PathBuf,
    pub message: String,
}

impl AttributedError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_path_and_message() {
        let err = AttributedError::new("a/packline.conf.toml", "expected a table");
        let text = err.to_string();
        assert!(text.contains("a/packline.conf.toml"));
        assert!(text.contains("expected a table"));
    }
}
