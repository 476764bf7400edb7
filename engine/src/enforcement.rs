use serde::{Deserialize, Serialize};

use crate::config::EnforcementMode;
use crate::workspace::Workspace;
use orchestrator_core::{EngineError, Result};

/// A single policy violation surfaced by the gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub code: String,
    pub message: String,
    pub fix_hint: String,
}

/// Structured report returned by `Gate::validate`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ViolationReport {
    pub violations: Vec<Violation>,
}

impl ViolationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Describes the mutating call under evaluation, independent of which
/// concrete engine operation triggered it.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    pub agent_id: Option<String>,
    pub creates_task_or_dependency: bool,
    pub has_description: bool,
    pub has_success_criteria: bool,
    pub confirm: bool,
}

/// Evaluates policy before any mutating operation.
pub struct Gate {
    mode: EnforcementMode,
}

impl Gate {
    pub fn new(mode: EnforcementMode) -> Self {
        Self { mode }
    }

    /// Resolve the effective mode for a workspace: the configured mode,
    /// auto-escalated to `strict` if at least two orchestration-context
    /// heuristics are observed (an agent id env var is set, a hooks
    /// directory exists, or the workspace already has more than one
    /// distinct context-entry author — the caller supplies that last
    /// signal since only it can see the store).
    pub fn effective_mode(configured: EnforcementMode, workspace: &Workspace, multi_agent_activity_observed: bool) -> EnforcementMode {
        if configured == EnforcementMode::Strict {
            return EnforcementMode::Strict;
        }

        let agent_env_present = std::env::var("TM_AGENT_ID").is_ok();
        let hooks_dir_present = workspace.hooks_dir().is_dir();

        let heuristics_matched = [agent_env_present, hooks_dir_present, multi_agent_activity_observed]
            .into_iter()
            .filter(|x| *x)
            .count();

        if heuristics_matched >= 2 {
            EnforcementMode::Strict
        } else {
            configured
        }
    }

    /// Build the violation report for a proposed operation without
    /// enforcing it; used by `validate()` and the interactive fix
    /// wizard.
    pub fn validate(&self, workspace: &Workspace, ctx: &OperationContext) -> ViolationReport {
        let mut violations = Vec::new();

        match &ctx.agent_id {
            None => violations.push(Violation {
                code: "AGENT_ID_MISSING".to_string(),
                message: "no agent identity was supplied or could be resolved".to_string(),
                fix_hint: "pass an explicit agent id or set TM_AGENT_ID".to_string(),
            }),
            Some(id) if orchestrator_core::Validator::validate_agent_id(id).is_err() => {
                violations.push(Violation {
                    code: "AGENT_ID_MALFORMED".to_string(),
                    message: format!("agent id '{id}' is not well-formed"),
                    fix_hint: "agent ids must match [A-Za-z0-9_-]{1,64}".to_string(),
                })
            }
            _ => {}
        }

        if !workspace.is_initialized() {
            violations.push(Violation {
                code: "WORKSPACE_NOT_INITIALIZED".to_string(),
                message: "workspace has not been initialized".to_string(),
                fix_hint: "run init to create the .task-orchestrator state directory".to_string(),
            });
        }

        if self.mode == EnforcementMode::Strict
            && ctx.creates_task_or_dependency
            && !ctx.has_description
            && !ctx.has_success_criteria
        {
            violations.push(Violation {
                code: "INTENT_MISSING".to_string(),
                message: "no commander's intent: description and success criteria are both empty".to_string(),
                fix_hint: "supply a non-empty description or at least one success criterion".to_string(),
            });
        }

        ViolationReport { violations }
    }

    /// Enforce the policy: reject, warn, or merely record, depending
    /// on mode.
    pub fn enforce(&self, workspace: &Workspace, ctx: &OperationContext) -> Result<ViolationReport> {
        let report = self.validate(workspace, ctx);
        if report.is_clean() {
            return Ok(report);
        }

        match self.mode {
            EnforcementMode::Strict => Err(EngineError::PolicyViolation(summarize(&report))),
            EnforcementMode::Standard => {
                if ctx.confirm {
                    Ok(report)
                } else {
                    Err(EngineError::PolicyViolation(summarize(&report)))
                }
            }
            EnforcementMode::Advisory => {
                for v in &report.violations {
                    tracing::warn!(code = %v.code, message = %v.message, "policy violation (advisory)");
                }
                Ok(report)
            }
        }
    }
}

fn summarize(report: &ViolationReport) -> String {
    report
        .violations
        .iter()
        .map(|v| format!("{}: {}", v.code, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn initialized_workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempdir().unwrap();
        let ws = Workspace::at(dir.path());
        ws.init().unwrap();
        std::fs::write(ws.db_path(), b"").unwrap();
        (dir, ws)
    }

    #[test]
    fn advisory_never_rejects() {
        let (_dir, ws) = initialized_workspace();
        let gate = Gate::new(EnforcementMode::Advisory);
        let ctx = OperationContext::default();
        assert!(gate.enforce(&ws, &ctx).is_ok());
    }

    #[test]
    fn standard_rejects_without_confirm() {
        let dir = tempdir().unwrap();
        let ws = Workspace::at(dir.path());
        let gate = Gate::new(EnforcementMode::Standard);
        let ctx = OperationContext { confirm: false, ..Default::default() };
        assert!(gate.enforce(&ws, &ctx).is_err());
    }

    #[test]
    fn standard_proceeds_with_confirm() {
        let dir = tempdir().unwrap();
        let ws = Workspace::at(dir.path());
        let gate = Gate::new(EnforcementMode::Standard);
        let ctx = OperationContext { confirm: true, ..Default::default() };
        assert!(gate.enforce(&ws, &ctx).is_ok());
    }

    #[test]
    fn strict_rejects_missing_intent() {
        let (_dir, ws) = initialized_workspace();
        let gate = Gate::new(EnforcementMode::Strict);
        let ctx = OperationContext {
            agent_id: Some("agent-1".to_string()),
            creates_task_or_dependency: true,
            has_description: false,
            has_success_criteria: false,
            confirm: true,
        };
        let result = gate.enforce(&ws, &ctx);
        assert!(matches!(result, Err(EngineError::PolicyViolation(_))));
    }

    #[test]
    fn strict_allows_intent_present() {
        let (_dir, ws) = initialized_workspace();
        let gate = Gate::new(EnforcementMode::Strict);
        let ctx = OperationContext {
            agent_id: Some("agent-1".to_string()),
            creates_task_or_dependency: true,
            has_description: true,
            has_success_criteria: false,
            confirm: true,
        };
        assert!(gate.enforce(&ws, &ctx).is_ok());
    }

    #[test]
    fn effective_mode_escalates_on_two_heuristics() {
        let (_dir, ws) = initialized_workspace();
        std::fs::create_dir_all(ws.hooks_dir()).unwrap();
        std::env::set_var("TM_AGENT_ID", "agent-1");
        let mode = Gate::effective_mode(EnforcementMode::Standard, &ws, false);
        std::env::remove_var("TM_AGENT_ID");
        assert_eq!(mode, EnforcementMode::Strict);
    }

    #[test]
    fn effective_mode_stays_standard_with_one_heuristic() {
        let (_dir, ws) = initialized_workspace();
        let mode = Gate::effective_mode(EnforcementMode::Standard, &ws, false);
        assert_eq!(mode, EnforcementMode::Standard);
    }
}
