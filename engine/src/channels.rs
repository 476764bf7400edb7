use std::io::Write;
use std::path::{Path, PathBuf};

use orchestrator_core::{EngineError, Result};

use crate::workspace::Workspace;

/// Per-entry size limit.
pub const MAX_ENTRY_BYTES: usize = 4 * 1024;
/// Per-file size limit before rotation.
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// Maximum number of rotated suffixes kept (`.1` through `.5`).
pub const MAX_ROTATIONS: u32 = 5;

/// Strip control characters other than `\n` and `\t`, and reject
/// entries over the per-entry size limit.
pub fn sanitize_and_validate(text: &str) -> Result<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect();

    if cleaned.len() > MAX_ENTRY_BYTES {
        return Err(EngineError::InvalidInput(format!(
            "entry exceeds {MAX_ENTRY_BYTES} byte limit"
        )));
    }

    Ok(cleaned)
}

/// Append-only log file for one of the three context channels. Writes
/// are durable (`File::sync_data` before returning) and rotate the
/// underlying file once it exceeds `MAX_FILE_BYTES`.
pub struct ChannelLog {
    path: PathBuf,
}

impl ChannelLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn private_note(workspace: &Workspace, task_id: &str, agent_id: &str) -> Self {
        Self::new(workspace.notes_dir().join(format!("{task_id}_{agent_id}.log")))
    }

    pub fn shared_context(workspace: &Workspace, task_id: &str) -> Self {
        Self::new(workspace.contexts_dir().join(format!("{task_id}.log")))
    }

    pub fn broadcast(workspace: &Workspace) -> Self {
        Self::new(workspace.notifications_dir().join("broadcast.log"))
    }

    pub fn append(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::WorkspaceError(format!("failed to prepare channel directory: {e}")))?;
        }

        self.rotate_if_needed()?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::Corrupt(format!("failed to open channel log {}: {e}", self.path.display())))?;

        writeln!(file, "{line}")
            .map_err(|e| EngineError::Corrupt(format!("failed to append to channel log: {e}")))?;
        file.sync_data().ok();

        Ok(())
    }

    fn rotate_if_needed(&self) -> Result<()> {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            return Ok(());
        };
        if metadata.len() < MAX_FILE_BYTES {
            return Ok(());
        }

        for suffix in (1..MAX_ROTATIONS).rev() {
            let from = rotated_path(&self.path, suffix);
            let to = rotated_path(&self.path, suffix + 1);
            if from.exists() {
                let _ = std::fs::rename(from, to);
            }
        }
        let to = rotated_path(&self.path, 1);
        std::fs::rename(&self.path, to)
            .map_err(|e| EngineError::Corrupt(format!("failed to rotate channel log: {e}")))?;

        Ok(())
    }
}

fn rotated_path(path: &Path, suffix: u32) -> PathBuf {
    let mut rotated = path.as_os_str().to_owned();
    rotated.push(format!(".{suffix}"));
    PathBuf::from(rotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_strips_control_chars_but_keeps_newline_and_tab() {
        let dirty = "hello\x07world\n\ttab";
        let cleaned = sanitize_and_validate(dirty).unwrap();
        assert_eq!(cleaned, "helloworld\n\ttab");
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let huge = "a".repeat(MAX_ENTRY_BYTES + 1);
        assert!(sanitize_and_validate(&huge).is_err());
    }

    #[test]
    fn append_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let log = ChannelLog::new(dir.path().join("nested").join("file.log"));
        log.append("hello").unwrap();
        assert!(log.path.exists());
    }

    #[test]
    fn rotation_moves_oversized_file_to_suffix_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broadcast.log");
        std::fs::write(&path, vec![b'x'; MAX_FILE_BYTES as usize]).unwrap();

        let log = ChannelLog::new(&path);
        log.append("fresh entry").unwrap();

        assert!(rotated_path(&path, 1).exists());
        let fresh = std::fs::read_to_string(&path).unwrap();
        assert_eq!(fresh.trim(), "fresh entry");
    }

    #[test]
    fn channel_constructors_resolve_expected_paths() {
        let dir = tempdir().unwrap();
        let ws = Workspace::at(dir.path());
        ws.init().unwrap();

        let note = ChannelLog::private_note(&ws, "a1b2c3d4", "agent-1");
        assert!(note.path.ends_with("a1b2c3d4_agent-1.log"));

        let ctx = ChannelLog::shared_context(&ws, "a1b2c3d4");
        assert!(ctx.path.ends_with("a1b2c3d4.log"));

        let bc = ChannelLog::broadcast(&ws);
        assert!(bc.path.ends_with("broadcast.log"));
    }
}
