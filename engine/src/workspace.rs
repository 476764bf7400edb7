use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

/// Name of the state directory the locator creates inside a workspace root.
pub const STATE_DIR_NAME: &str = ".task-orchestrator";

/// Environment variable that overrides the workspace root, taking
/// precedence over the current working directory.
pub const WORKSPACE_ENV_VAR: &str = "TM_WORKSPACE";

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const STORE_MODE: u32 = 0o660;

/// Resolves and owns the on-disk layout of a single workspace: the
/// `.task-orchestrator` state directory and its fixed set of
/// subdirectories, created and validated before the store is opened.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Resolve the workspace root: honor `TM_WORKSPACE` if set,
    /// otherwise use the current working directory. Does not touch
    /// the filesystem.
    pub fn resolve() -> Result<Self> {
        let root = match std::env::var(WORKSPACE_ENV_VAR) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir().context("failed to determine current directory")?,
        };
        Ok(Self { root })
    }

    /// Resolve a workspace rooted at an explicit path, bypassing the
    /// environment override. Used by tests and by callers that have
    /// already located the root themselves.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR_NAME)
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir().join("tasks.db")
    }

    pub fn contexts_dir(&self) -> PathBuf {
        self.state_dir().join("contexts")
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.state_dir().join("notes")
    }

    pub fn notifications_dir(&self) -> PathBuf {
        self.state_dir().join("notifications")
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.state_dir().join("archives")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.state_dir().join("backups")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    pub fn telemetry_dir(&self) -> PathBuf {
        self.state_dir().join("telemetry")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.state_dir().join("config")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join(".lock")
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.state_dir().join("hooks")
    }

    /// `true` once `init` has created the state directory and its
    /// `tasks.db`.
    pub fn is_initialized(&self) -> bool {
        self.state_dir().is_dir() && self.db_path().exists()
    }

    /// Idempotently create the full directory tree. Safe to call on
    /// an already-initialized workspace. Fails with a workspace error
    /// wrapped by the caller if the root turns out not to be writable.
    pub fn init(&self) -> Result<()> {
        self.ensure_writable_root()?;

        for dir in [
            self.state_dir(),
            self.contexts_dir(),
            self.notes_dir(),
            self.notifications_dir(),
            self.archives_dir(),
            self.backups_dir(),
            self.logs_dir(),
            self.telemetry_dir(),
            self.config_dir(),
            self.hooks_dir(),
        ] {
            create_dir_with_mode(&dir)?;
        }

        Ok(())
    }

    fn ensure_writable_root(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)
                .with_context(|| format!("workspace root {} is not creatable", self.root.display()))?;
        }
        let probe = self.root.join(format!(".tm-write-probe-{}", std::process::id()));
        std::fs::write(&probe, b"")
            .with_context(|| format!("workspace root {} is not writable", self.root.display()))?;
        let _ = std::fs::remove_file(&probe);
        Ok(())
    }
}

#[cfg(unix)]
fn create_dir_with_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !path.is_dir() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory {}", path.display()))?;
    }
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(DIR_MODE);
    std::fs::set_permissions(path, perms)
        .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn create_dir_with_mode(path: &Path) -> Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Set file permissions to the store's fixed mode on platforms that
/// support it. A no-op elsewhere. Called once, right after the store
/// creates `tasks.db`.
#[cfg(unix)]
pub fn secure_store_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if path.exists() {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(STORE_MODE);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to secure store file {}", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn secure_store_file(_path: &Path) -> Result<()> {
    Ok(())
}
