use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use orchestrator_core::Result;

/// Operations a hook may be registered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Update,
    Complete,
    Delete,
    Assign,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Complete => "complete",
            Operation::Delete => "delete",
            Operation::Assign => "assign",
        }
    }
}

/// Lifecycle events hooks may subscribe to via an `on_<event>` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    TaskUnblocked,
    TaskCompleted,
    Discovery,
}

impl Event {
    fn as_str(self) -> &'static str {
        match self {
            Event::TaskUnblocked => "task_unblocked",
            Event::TaskCompleted => "task_completed",
            Event::Discovery => "discovery",
        }
    }
}

/// When in the pipeline a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pre,
    Post,
}

/// The JSON document written to a hook's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct HookEvent {
    pub tool: String,
    pub inputs: Json,
    pub derived: Json,
    pub workspace_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Decision {
    Approve,
    Block,
}

#[derive(Debug, Clone, Deserialize)]
struct HookOutput {
    decision: Decision,
    #[serde(default)]
    reason: Option<String>,
}

/// Outcome of running a single hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Approved,
    Blocked { reason: String },
    /// Non-JSON stdout or a non-zero exit: fail-open unless this is a
    /// pre-hook running under strict enforcement.
    Errored { message: String },
    TimedOut,
}

/// A hook's outcome paired with the filename it ran from, so a caller
/// can name the offending hook in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookResult {
    pub hook: String,
    pub outcome: HookOutcome,
}

fn hook_name(path: &Path) -> String {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("<unknown>").to_string()
}

#[derive(Debug, Clone, Default)]
pub struct HookStats {
    pub count: u64,
    pub errors: u64,
    pub timeouts: u64,
    durations_ms: Vec<u64>,
}

impl HookStats {
    pub fn record(&mut self, duration: Duration, outcome: &HookOutcome) {
        self.count += 1;
        self.durations_ms.push(duration.as_millis() as u64);
        match outcome {
            HookOutcome::Errored { .. } => self.errors += 1,
            HookOutcome::TimedOut => self.timeouts += 1,
            _ => {}
        }
    }

    pub fn avg_ms(&self) -> f64 {
        if self.durations_ms.is_empty() {
            return 0.0;
        }
        self.durations_ms.iter().sum::<u64>() as f64 / self.durations_ms.len() as f64
    }

    pub fn percentile(&self, p: f64) -> u64 {
        if self.durations_ms.is_empty() {
            return 0;
        }
        let mut sorted = self.durations_ms.clone();
        sorted.sort_unstable();
        let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn p50(&self) -> u64 {
        self.percentile(50.0)
    }

    pub fn p95(&self) -> u64 {
        self.percentile(95.0)
    }
}

/// Discovers and executes hook scripts under a directory, classifying
/// each by its filename prefix (`pre_<op>`, `post_<op>`, `on_<event>`).
pub struct HookPipeline {
    hooks_dir: PathBuf,
    timeout: Duration,
    stats: HookStats,
}

impl HookPipeline {
    pub fn new(hooks_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { hooks_dir: hooks_dir.into(), timeout, stats: HookStats::default() }
    }

    pub fn stats(&self) -> &HookStats {
        &self.stats
    }

    fn hooks_matching(&self, prefix: &str) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.hooks_dir) else {
            return Vec::new();
        };
        let mut hooks: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with(prefix)))
            .collect();
        hooks.sort();
        hooks
    }

    pub async fn run_pre(&mut self, op: Operation, workspace_root: &Path, agent_id: &str, event: &HookEvent) -> Result<Vec<HookResult>> {
        self.run_prefixed(&format!("pre_{}", op.as_str()), workspace_root, agent_id, event).await
    }

    pub async fn run_post(&mut self, op: Operation, workspace_root: &Path, agent_id: &str, event: &HookEvent) -> Result<Vec<HookResult>> {
        self.run_prefixed(&format!("post_{}", op.as_str()), workspace_root, agent_id, event).await
    }

    pub async fn run_event(&mut self, event_kind: Event, workspace_root: &Path, agent_id: &str, event: &HookEvent) -> Result<Vec<HookResult>> {
        self.run_prefixed(&format!("on_{}", event_kind.as_str()), workspace_root, agent_id, event).await
    }

    async fn run_prefixed(&mut self, prefix: &str, workspace_root: &Path, agent_id: &str, event: &HookEvent) -> Result<Vec<HookResult>> {
        let mut results = Vec::new();
        for hook in self.hooks_matching(prefix) {
            let outcome = self.run_one(&hook, workspace_root, agent_id, event).await;
            results.push(HookResult { hook: hook_name(&hook), outcome });
        }
        Ok(results)
    }

    async fn run_one(&mut self, hook: &Path, workspace_root: &Path, agent_id: &str, event: &HookEvent) -> HookOutcome {
        let started = Instant::now();
        let outcome = self.execute(hook, workspace_root, agent_id, event).await;
        self.stats.record(started.elapsed(), &outcome);
        outcome
    }

    async fn execute(&self, hook: &Path, workspace_root: &Path, agent_id: &str, event: &HookEvent) -> HookOutcome {
        let stdin_payload = match serde_json::to_vec(event) {
            Ok(bytes) => bytes,
            Err(e) => return HookOutcome::Errored { message: format!("failed to encode hook event: {e}") },
        };

        let mut env = HashMap::new();
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_string(), path);
        }
        if let Ok(home) = std::env::var("HOME") {
            env.insert("HOME".to_string(), home);
        }
        env.insert("TM_WORKSPACE_ROOT".to_string(), workspace_root.display().to_string());
        env.insert("TM_AGENT_ID".to_string(), agent_id.to_string());
        env.insert("TM_OPERATION".to_string(), event.tool.clone());

        let mut command = Command::new(hook);
        command
            .current_dir(workspace_root)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let run = async {
            let mut child = command.spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&stdin_payload).await?;
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => HookOutcome::TimedOut,
            Ok(Err(e)) => HookOutcome::Errored { message: format!("failed to run hook: {e}") },
            Ok(Ok(output)) => {
                if !output.status.success() {
                    return HookOutcome::Errored { message: format!("hook exited with status {}", output.status) };
                }
                match serde_json::from_slice::<HookOutput>(&output.stdout) {
                    Ok(parsed) => match parsed.decision {
                        Decision::Approve => HookOutcome::Approved,
                        Decision::Block => HookOutcome::Blocked {
                            reason: parsed.reason.unwrap_or_else(|| "blocked by hook".to_string()),
                        },
                    },
                    Err(e) => HookOutcome::Errored { message: format!("non-JSON hook output: {e}") },
                }
            }
        }
    }
}

/// Decide whether a set of pre-hook results should abort the
/// operation: any `Blocked` always aborts; an `Errored`/`TimedOut`
/// aborts only in strict mode (fail-closed for pre-hooks), otherwise
/// proceeds with a logged warning (fail-open). Returns the name of the
/// hook that aborted, along with the reason.
pub fn pre_hooks_block(results: &[HookResult], strict: bool) -> Option<(String, String)> {
    for result in results {
        let hook = &result.hook;
        match &result.outcome {
            HookOutcome::Blocked { reason } => return Some((hook.clone(), reason.clone())),
            HookOutcome::Errored { message } if strict => return Some((hook.clone(), message.clone())),
            HookOutcome::TimedOut if strict => return Some((hook.clone(), "hook timed out".to_string())),
            HookOutcome::Errored { message } => tracing::warn!(%message, %hook, "pre-hook failed open"),
            HookOutcome::TimedOut => tracing::warn!(%hook, "pre-hook timed out, failing open"),
            HookOutcome::Approved => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_event() -> HookEvent {
        HookEvent {
            tool: "add".to_string(),
            inputs: serde_json::json!({"title": "demo"}),
            derived: serde_json::json!({}),
            workspace_root: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn hooks_matching_filters_by_prefix_and_sorts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("pre_add_b.sh"), "#!/bin/sh\n").unwrap();
        std::fs::write(dir.path().join("pre_add_a.sh"), "#!/bin/sh\n").unwrap();
        std::fs::write(dir.path().join("post_add.sh"), "#!/bin/sh\n").unwrap();

        let pipeline = HookPipeline::new(dir.path(), Duration::from_secs(1));
        let matched = pipeline.hooks_matching("pre_add");
        assert_eq!(matched.len(), 2);
        assert!(matched[0].file_name().unwrap().to_str().unwrap().contains("_a"));
    }

    #[tokio::test]
    async fn no_hooks_directory_yields_no_outcomes() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let mut pipeline = HookPipeline::new(missing, Duration::from_secs(1));
        let outcomes = pipeline
            .run_pre(Operation::Add, dir.path(), "agent-1", &sample_event())
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn blocked_outcome_always_aborts() {
        let results = vec![
            HookResult { hook: "pre_add_a.sh".to_string(), outcome: HookOutcome::Approved },
            HookResult { hook: "pre_add_guard.sh".to_string(), outcome: HookOutcome::Blocked { reason: "no".to_string() } },
        ];
        assert_eq!(pre_hooks_block(&results, false), Some(("pre_add_guard.sh".to_string(), "no".to_string())));
    }

    #[test]
    fn errored_outcome_fails_open_outside_strict_mode() {
        let results = vec![HookResult { hook: "pre_add.sh".to_string(), outcome: HookOutcome::Errored { message: "boom".to_string() } }];
        assert_eq!(pre_hooks_block(&results, false), None);
    }

    #[test]
    fn errored_outcome_fails_closed_in_strict_mode() {
        let results = vec![HookResult { hook: "pre_add.sh".to_string(), outcome: HookOutcome::Errored { message: "boom".to_string() } }];
        assert_eq!(pre_hooks_block(&results, true), Some(("pre_add.sh".to_string(), "boom".to_string())));
    }

    #[test]
    fn stats_compute_percentiles() {
        let mut stats = HookStats::default();
        for ms in [10, 20, 30, 40, 50] {
            stats.record(Duration::from_millis(ms), &HookOutcome::Approved);
        }
        assert_eq!(stats.count, 5);
        assert_eq!(stats.p50(), 30);
    }
}
