use orchestrator_core::{AgentId, Result, Validator};

const AGENT_ID_ENV_VAR: &str = "TM_AGENT_ID";

/// Resolve the acting agent's identity: an explicit caller-supplied id
/// wins, then `TM_AGENT_ID`, then a stable id derived from the OS
/// username and process group. The result is always validated before
/// being handed back, the same shape `Validator::validate_agent_id`
/// enforces for any agent id flowing through the store.
pub fn resolve(explicit: Option<&str>) -> Result<AgentId> {
    let candidate = if let Some(id) = explicit {
        id.to_string()
    } else if let Ok(id) = std::env::var(AGENT_ID_ENV_VAR) {
        id
    } else {
        derive_stable_id()
    };

    Validator::validate_agent_id(&candidate)?;
    Ok(candidate)
}

/// Derive a stable identity from the OS username and the process
/// group id, so that repeated invocations from the same shell session
/// resolve to the same agent without any explicit configuration.
fn derive_stable_id() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "agent".to_string());
    let pgid = process_group_id();
    sanitize(&format!("{user}-{pgid}"))
}

#[cfg(unix)]
fn process_group_id() -> u32 {
    // SAFETY: getpgrp takes no arguments and always succeeds.
    (unsafe { libc::getpgrp() }) as u32
}

#[cfg(not(unix))]
fn process_group_id() -> u32 {
    std::process::id()
}

/// Replace any character outside `[A-Za-z0-9_-]` with `_` and clamp to
/// 64 characters, matching the identity format the validator accepts.
fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    cleaned.chars().take(64).collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_id_wins_over_env() {
        std::env::set_var(AGENT_ID_ENV_VAR, "env-agent");
        let id = resolve(Some("explicit-agent")).unwrap();
        std::env::remove_var(AGENT_ID_ENV_VAR);
        assert_eq!(id, "explicit-agent");
    }

    #[test]
    fn env_var_used_when_no_explicit_id() {
        std::env::set_var(AGENT_ID_ENV_VAR, "env-agent");
        let id = resolve(None).unwrap();
        std::env::remove_var(AGENT_ID_ENV_VAR);
        assert_eq!(id, "env-agent");
    }

    #[test]
    fn invalid_explicit_id_is_rejected() {
        let result = resolve(Some("not a valid id!"));
        assert!(result.is_err());
    }

    #[test]
    fn derived_id_is_sanitized_and_non_empty() {
        std::env::remove_var(AGENT_ID_ENV_VAR);
        let id = resolve(None).unwrap();
        assert!(!id.is_empty());
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }
}
