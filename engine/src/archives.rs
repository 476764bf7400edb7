use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;

use orchestrator_core::{
    models::{ContextEntry, PrivateNote, Task},
    EngineError, Result,
};

use crate::workspace::Workspace;

/// Bundles a completed task's record and its context/notes history into
/// an opaque `tar.gz` archive under `archives/`, for the `export`
/// operation. This is an internal archival format, not a
/// human-readable report: callers wanting Markdown/JSON summaries build
/// those themselves from the same `Store` data.
pub struct Archiver<'a> {
    workspace: &'a Workspace,
}

impl<'a> Archiver<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    /// Write `<archives>/<unix_ts>_<task_id>.tar.gz` containing
    /// `task.json`, `context.ndjson`, and `notes.ndjson`, returning the
    /// archive's path.
    pub fn export_task(&self, task: &Task, context: &[ContextEntry], notes: &[PrivateNote]) -> Result<PathBuf> {
        std::fs::create_dir_all(self.workspace.archives_dir())
            .map_err(|e| EngineError::WorkspaceError(format!("failed to prepare archives directory: {e}")))?;

        let archive_path = self.workspace.archives_dir().join(archive_file_name(task));
        let file = std::fs::File::create(&archive_path)
            .map_err(|e| EngineError::Corrupt(format!("failed to create archive file: {e}")))?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar = Builder::new(encoder);

        append_json(&mut tar, "task.json", task)?;
        append_ndjson(&mut tar, "context.ndjson", context)?;
        append_ndjson(&mut tar, "notes.ndjson", notes)?;

        let encoder = tar
            .into_inner()
            .map_err(|e| EngineError::Corrupt(format!("failed to finalize archive: {e}")))?;
        encoder.finish().map_err(|e| EngineError::Corrupt(format!("failed to flush archive: {e}")))?;

        Ok(archive_path)
    }
}

fn archive_file_name(task: &Task) -> String {
    let ts = task.completed_at.unwrap_or(task.updated_at).timestamp();
    format!("{ts}_{}.tar.gz", task.id)
}

fn append_json<W: Write>(tar: &mut Builder<W>, name: &str, value: &Task) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| EngineError::Corrupt(format!("failed to serialize {name}: {e}")))?;
    append_bytes(tar, name, &bytes)
}

fn append_ndjson<W: Write, T: serde::Serialize>(tar: &mut Builder<W>, name: &str, items: &[T]) -> Result<()> {
    let mut buf = Vec::new();
    for item in items {
        let line = serde_json::to_string(item)
            .map_err(|e| EngineError::Corrupt(format!("failed to serialize {name}: {e}")))?;
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
    }
    append_bytes(tar, name, &buf)
}

fn append_bytes<W: Write>(tar: &mut Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append_data(&mut header, name, bytes)
        .map_err(|e| EngineError::Corrupt(format!("failed to append {name} to archive: {e}")))
}

/// Read back an archive's `task.json` entry, for tests and any caller
/// that needs to verify a bundle without re-running `export`.
pub fn read_task_json(archive_path: &Path) -> Result<Task> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| EngineError::Corrupt(format!("failed to open archive: {e}")))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries().map_err(|e| EngineError::Corrupt(format!("failed to read archive: {e}")))? {
        let mut entry = entry.map_err(|e| EngineError::Corrupt(format!("failed to read archive entry: {e}")))?;
        let is_task_json = {
            let path = entry.path().map_err(|e| EngineError::Corrupt(format!("bad archive entry path: {e}")))?;
            &*path == Path::new("task.json")
        };
        if is_task_json {
            let mut contents = String::new();
            std::io::Read::read_to_string(&mut entry, &mut contents)
                .map_err(|e| EngineError::Corrupt(format!("failed to read task.json: {e}")))?;
            return serde_json::from_str(&contents)
                .map_err(|e| EngineError::Corrupt(format!("malformed task.json in archive: {e}")));
        }
    }

    Err(EngineError::Corrupt("archive has no task.json entry".to_string()))
}
