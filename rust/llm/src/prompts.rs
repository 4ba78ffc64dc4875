//! Versioned named prompt templates.
//!
//! Prompts live on disk as `<root>/<agent>/<version>.txt` and are resolved
//! verbatim; there is no templating.

use std::path::PathBuf;

use crate::error::{LlmError, LlmResult};

/// The version name resolved when none is given.
pub const CURRENT_VERSION: &str = "current";

/// Resolves `(agent, version)` pairs to prompt text under a prompts
/// directory.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    root: PathBuf,
}

impl PromptCatalog {
    /// Create a catalog rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn prompt_path(&self, agent: &str, version: &str) -> PathBuf {
        self.root.join(agent).join(format!("{version}.txt"))
    }

    /// Load the prompt for `agent` at `version`.
    pub fn load(&self, agent: &str, version: &str) -> LlmResult<String> {
        let path = self.prompt_path(agent, version);
        if !path.exists() {
            return Err(LlmError::PromptNotFound {
                agent: agent.to_string(),
                version: version.to_string(),
            });
        }
        Ok(std::fs::read_to_string(path)?)
    }

    /// Load the `current` version of the prompt for `agent`.
    pub fn load_current(&self, agent: &str) -> LlmResult<String> {
        self.load(agent, CURRENT_VERSION)
    }

    /// Store `content` as the prompt for `agent` at `version`, creating
    /// the agent directory if needed.
    pub fn save(&self, agent: &str, version: &str, content: &str) -> LlmResult<()> {
        let dir = self.root.join(agent);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(self.prompt_path(agent, version), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = PromptCatalog::new(dir.path());

        catalog
            .save("assist", "current", "You answer questions about PLCs.")
            .expect("save");
        assert_eq!(
            catalog.load_current("assist").expect("load"),
            "You answer questions about PLCs."
        );
    }

    #[test]
    fn versions_are_independent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = PromptCatalog::new(dir.path());

        catalog.save("assist", "current", "v2").expect("save");
        catalog.save("assist", "2024-01", "v1").expect("save");
        assert_eq!(catalog.load("assist", "2024-01").expect("load"), "v1");
        assert_eq!(catalog.load_current("assist").expect("load"), "v2");
    }

    #[test]
    fn missing_prompt_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = PromptCatalog::new(dir.path());

        let err = catalog.load("ghost", "current").expect_err("missing");
        assert_eq!(
            err,
            LlmError::PromptNotFound {
                agent: "ghost".to_string(),
                version: "current".to_string()
            }
        );
    }
}
