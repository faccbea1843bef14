//! Filesystem artifact compensation
//!
//! Rolling back an agent means deleting its artifact directory under the
//! configured root. Deletion is naturally idempotent: a directory that is
//! already gone counts as a successful compensation, so repeat invocations
//! have exactly-once effect.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tandem_core::collaborators::Compensator;
use tandem_core::error::CallError;
use tandem_core::types::AgentId;

/// [`Compensator`] that removes per-agent artifact directories.
pub struct ArtifactCleaner {
    root: PathBuf,
}

impl ArtifactCleaner {
    /// Create a cleaner rooted at the artifact directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The artifact directory for one agent slot.
    #[must_use]
    pub fn artifact_dir(&self, agent_id: AgentId) -> PathBuf {
        self.root.join(agent_id.as_str())
    }
}

#[async_trait]
impl Compensator for ArtifactCleaner {
    async fn compensate(&self, agent_id: AgentId) -> Result<(), CallError> {
        let dir = self.artifact_dir(agent_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(agent_id = %agent_id, dir = %dir.display(), "artifacts removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!(agent_id = %agent_id, dir = %dir.display(), "no artifacts to remove");
                Ok(())
            }
            Err(err) => Err(CallError::Transient(format!(
                "failed to remove {}: {err}",
                dir.display()
            ))),
        }
    }
}
