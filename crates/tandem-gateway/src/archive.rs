//! Test-bundle archive path guard
//!
//! The sandbox extracts an attacker-suppliable archive into a scratch
//! workspace. Every entry name must resolve to a path inside that workspace;
//! absolute entries and `..` traversal out of it are rejected before any file
//! would be written.

use std::path::{Component, Path, PathBuf};

/// Rejected archive entry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArchiveError {
    /// Entry carries an absolute path
    #[error("archive entry has an absolute path: {name}")]
    AbsoluteEntry {
        /// The offending entry name
        name: String,
    },

    /// Entry resolves outside the workspace
    #[error("archive entry escapes the workspace: {name}")]
    EscapesWorkspace {
        /// The offending entry name
        name: String,
    },
}

/// Resolve one archive entry name to its extraction path.
///
/// Normalizes `.` and `..` lexically; the entry is rejected the moment its
/// normalized form would step above `workspace`.
///
/// # Errors
/// [`ArchiveError::AbsoluteEntry`] for rooted names,
/// [`ArchiveError::EscapesWorkspace`] for traversal out of the workspace.
pub fn resolve_entry_path(workspace: &Path, entry_name: &str) -> Result<PathBuf, ArchiveError> {
    let entry = Path::new(entry_name);
    let mut resolved = PathBuf::new();

    for component in entry.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::AbsoluteEntry {
                    name: entry_name.to_string(),
                });
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(ArchiveError::EscapesWorkspace {
                        name: entry_name.to_string(),
                    });
                }
            }
            Component::Normal(part) => resolved.push(part),
        }
    }

    Ok(workspace.join(resolved))
}

/// Resolve every entry of an archive listing, rejecting the whole plan on the
/// first bad entry so nothing is extracted from a hostile bundle.
///
/// # Errors
/// The first entry's [`ArchiveError`], if any.
pub fn plan_extraction<'a>(
    workspace: &Path,
    entry_names: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<PathBuf>, ArchiveError> {
    entry_names
        .into_iter()
        .map(|name| resolve_entry_path(workspace, name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> &'static Path {
        Path::new("/sandbox/workspace")
    }

    #[test]
    fn plain_entries_resolve_inside_the_workspace() {
        assert_eq!(
            resolve_entry_path(workspace(), "tests/test_queue.py").unwrap(),
            Path::new("/sandbox/workspace/tests/test_queue.py")
        );
        assert_eq!(
            resolve_entry_path(workspace(), "./conftest.py").unwrap(),
            Path::new("/sandbox/workspace/conftest.py")
        );
    }

    #[test]
    fn internal_parent_segments_are_normalized() {
        assert_eq!(
            resolve_entry_path(workspace(), "a/../tests/run.py").unwrap(),
            Path::new("/sandbox/workspace/tests/run.py")
        );
    }

    #[test]
    fn absolute_entries_are_rejected() {
        assert_eq!(
            resolve_entry_path(workspace(), "/etc/passwd").unwrap_err(),
            ArchiveError::AbsoluteEntry {
                name: "/etc/passwd".to_string()
            }
        );
    }

    #[test]
    fn traversal_out_of_the_workspace_is_rejected() {
        for name in ["../evil.py", "a/../../evil.py", "../../../../etc/shadow"] {
            assert_eq!(
                resolve_entry_path(workspace(), name).unwrap_err(),
                ArchiveError::EscapesWorkspace {
                    name: name.to_string()
                }
            );
        }
    }

    #[test]
    fn one_bad_entry_rejects_the_whole_plan() {
        let err = plan_extraction(
            workspace(),
            ["tests/test_queue.py", "../evil.py", "conftest.py"],
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::EscapesWorkspace { .. }));
    }
}
