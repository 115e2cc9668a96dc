//! System prompt loading
//!
//! The prompt file is read at the start of every session so edits take effect
//! without a restart.

use std::path::Path;

use tracing::{debug, warn};

use crate::llm::DEFAULT_DIAGNOSIS_SYSTEM_PROMPT;

/// Read the system prompt from `path`, falling back to the built-in prompt
/// when the file is missing, unreadable or empty.
pub async fn load_system_prompt(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => {
            debug!(path = %path.display(), "Loaded system prompt");
            text
        }
        Ok(_) => {
            warn!(path = %path.display(), "System prompt file is empty, using built-in prompt");
            DEFAULT_DIAGNOSIS_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "System prompt file unavailable, using built-in prompt");
            DEFAULT_DIAGNOSIS_SYSTEM_PROMPT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_reads_prompt_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "You are a careful SRE.").unwrap();

        assert_eq!(load_system_prompt(file.path()).await, "You are a careful SRE.");
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = load_system_prompt(&dir.path().join("system_prompt.txt")).await;
        assert_eq!(prompt, DEFAULT_DIAGNOSIS_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_empty_file_falls_back() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(load_system_prompt(file.path()).await, DEFAULT_DIAGNOSIS_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_edits_are_picked_up() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first").unwrap();
        assert_eq!(load_system_prompt(file.path()).await, "first");

        std::fs::write(file.path(), "second").unwrap();
        assert_eq!(load_system_prompt(file.path()).await, "second");
    }
}
