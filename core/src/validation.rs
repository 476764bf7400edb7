use crate::{
    error::{EngineError, Result},
    models::{NewTask, TaskStatus},
};

/// Validation utilities for task coordination operations.
pub struct Validator;

impl Validator {
    /// Validate a task identifier: an 8-character lowercase hex string.
    ///
    /// This only validates the *shape* of an id supplied by a caller
    /// (e.g. in a dependency edge); ids themselves are always
    /// generated by the store.
    pub fn validate_task_id(id: &str) -> Result<()> {
        if id.len() != 8 || !id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(EngineError::invalid_field(
                "id",
                "must be an 8-character lowercase hex string",
            ));
        }
        Ok(())
    }

    /// Validate an agent identifier.
    ///
    /// Agent ids must:
    /// - Be 1-64 characters long
    /// - Contain only letters, numbers, hyphens, and underscores
    pub fn validate_agent_id(agent_id: &str) -> Result<()> {
        if agent_id.is_empty() {
            return Err(EngineError::invalid_field("agent_id", "must not be empty"));
        }

        if agent_id.len() > 64 {
            return Err(EngineError::invalid_field(
                "agent_id",
                "must be at most 64 characters long",
            ));
        }

        let valid_chars = agent_id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
        if !valid_chars {
            return Err(EngineError::invalid_field(
                "agent_id",
                "may only contain letters, numbers, hyphens, and underscores",
            ));
        }

        Ok(())
    }

    /// Validate a task title.
    ///
    /// Titles must be 1-500 characters long after trimming, contain no
    /// control characters, and not be only whitespace.
    pub fn validate_title(title: &str) -> Result<()> {
        let trimmed = title.trim();

        if trimmed.is_empty() {
            return Err(EngineError::invalid_field("title", "must not be empty"));
        }

        if trimmed.chars().count() > 500 {
            return Err(EngineError::invalid_field(
                "title",
                "must be at most 500 characters long",
            ));
        }

        if trimmed.chars().any(char::is_control) {
            return Err(EngineError::invalid_field(
                "title",
                "must not contain control characters",
            ));
        }

        Ok(())
    }

    /// Validate a task description.
    ///
    /// Unlike the title, an empty description is allowed; the limit
    /// guards against unbounded growth.
    pub fn validate_description(description: &str) -> Result<()> {
        if description.chars().count() > 5000 {
            return Err(EngineError::invalid_field(
                "description",
                "must be at most 5000 characters long",
            ));
        }

        Ok(())
    }

    /// Validate a tag: non-empty, no whitespace, at most 40 chars.
    pub fn validate_tag(tag: &str) -> Result<()> {
        if tag.is_empty() || tag.len() > 40 || tag.chars().any(char::is_whitespace) {
            return Err(EngineError::invalid_field(
                "tag",
                "must be 1-40 characters with no whitespace",
            ));
        }
        Ok(())
    }

    /// Validate a non-negative hours value (`estimated_hours`,
    /// `actual_hours`).
    pub fn validate_hours(field: &str, hours: f64) -> Result<()> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(EngineError::invalid_field(field, "must be a non-negative number"));
        }
        Ok(())
    }

    /// Validate a feedback score (`feedback_quality`,
    /// `feedback_timeliness`): an integer in `1..=5`.
    pub fn validate_feedback_score(field: &str, score: i32) -> Result<()> {
        if !(1..=5).contains(&score) {
            return Err(EngineError::invalid_field(field, "must be an integer from 1 to 5"));
        }
        Ok(())
    }

    /// Validate a complete `NewTask` payload, including every tag.
    pub fn validate_new_task(task: &NewTask) -> Result<()> {
        Self::validate_title(&task.title)?;
        Self::validate_description(&task.description)?;
        if let Some(assignee) = &task.assignee {
            Self::validate_agent_id(assignee)?;
        }
        for tag in &task.tags {
            Self::validate_tag(tag)?;
        }
        for dep in &task.depends_on {
            Self::validate_task_id(dep)?;
        }
        Ok(())
    }

    /// Whether a caller may explicitly request this status transition.
    ///
    /// `Blocked` is never a valid manual target: it is derived by the
    /// dependency resolver and re-derived on every dependency
    /// completion. `Completed` and `Cancelled` are terminal.
    pub fn validate_status_transition(from: TaskStatus, to: TaskStatus) -> Result<()> {
        if to == TaskStatus::Blocked {
            return Err(EngineError::invalid_field(
                "status",
                "blocked is derived automatically and cannot be set directly",
            ));
        }

        let allowed = matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Pending, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Cancelled)
                | (TaskStatus::InProgress, TaskStatus::Pending)
                | (TaskStatus::Blocked, TaskStatus::Cancelled)
        );

        if allowed {
            Ok(())
        } else {
            Err(EngineError::invalid_field(
                "status",
                &format!("cannot transition from {from} to {to}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_task_ids() {
        assert!(Validator::validate_task_id("a1b2c3d4").is_ok());
        assert!(Validator::validate_task_id("00000000").is_ok());
    }

    #[test]
    fn invalid_task_ids() {
        assert!(Validator::validate_task_id("").is_err());
        assert!(Validator::validate_task_id("A1B2C3D4").is_err());
        assert!(Validator::validate_task_id("a1b2c3d").is_err());
        assert!(Validator::validate_task_id("a1b2c3d4e").is_err());
        assert!(Validator::validate_task_id("zzzzzzzz").is_err());
    }

    #[test]
    fn valid_agent_ids() {
        assert!(Validator::validate_agent_id("agent1").is_ok());
        assert!(Validator::validate_agent_id("test-agent_01").is_ok());
        assert!(Validator::validate_agent_id("a").is_ok());
    }

    #[test]
    fn invalid_agent_ids() {
        assert!(Validator::validate_agent_id("").is_err());
        assert!(Validator::validate_agent_id(&"a".repeat(65)).is_err());
        assert!(Validator::validate_agent_id("agent 1").is_err());
        assert!(Validator::validate_agent_id("agent@1").is_err());
    }

    #[test]
    fn valid_titles() {
        assert!(Validator::validate_title("Implement auth").is_ok());
        assert!(Validator::validate_title("A").is_ok());
    }

    #[test]
    fn invalid_titles() {
        assert!(Validator::validate_title("").is_err());
        assert!(Validator::validate_title("   ").is_err());
        assert!(Validator::validate_title(&"a".repeat(501)).is_err());
        assert!(Validator::validate_title("bad\u{0007}title").is_err());
    }

    #[test]
    fn title_boundary_lengths() {
        assert!(Validator::validate_title(&"a".repeat(1)).is_ok());
        assert!(Validator::validate_title(&"a".repeat(500)).is_ok());
        assert!(Validator::validate_title(&"a".repeat(501)).is_err());
    }

    #[test]
    fn descriptions_may_be_empty() {
        assert!(Validator::validate_description("").is_ok());
        assert!(Validator::validate_description(&"a".repeat(5000)).is_ok());
        assert!(Validator::validate_description(&"a".repeat(5001)).is_err());
    }

    #[test]
    fn validate_new_task_checks_every_field() {
        let mut task = NewTask {
            title: "Ship it".to_string(),
            ..Default::default()
        };
        assert!(Validator::validate_new_task(&task).is_ok());

        task.tags.push("bad tag".to_string());
        assert!(Validator::validate_new_task(&task).is_err());
    }

    #[test]
    fn hours_must_be_non_negative() {
        assert!(Validator::validate_hours("actual_hours", 0.0).is_ok());
        assert!(Validator::validate_hours("actual_hours", 3.5).is_ok());
        assert!(Validator::validate_hours("actual_hours", -0.1).is_err());
        assert!(Validator::validate_hours("actual_hours", f64::NAN).is_err());
    }

    #[test]
    fn feedback_scores_are_bounded_one_to_five() {
        assert!(Validator::validate_feedback_score("feedback_quality", 1).is_ok());
        assert!(Validator::validate_feedback_score("feedback_quality", 5).is_ok());
        assert!(Validator::validate_feedback_score("feedback_quality", 0).is_err());
        assert!(Validator::validate_feedback_score("feedback_quality", 6).is_err());
    }

    #[test]
    fn status_transitions() {
        assert!(Validator::validate_status_transition(TaskStatus::Pending, TaskStatus::InProgress).is_ok());
        assert!(Validator::validate_status_transition(TaskStatus::Pending, TaskStatus::Completed).is_ok());
        assert!(Validator::validate_status_transition(TaskStatus::InProgress, TaskStatus::Completed).is_ok());
        assert!(Validator::validate_status_transition(TaskStatus::Completed, TaskStatus::InProgress).is_err());
        assert!(Validator::validate_status_transition(TaskStatus::Pending, TaskStatus::Blocked).is_err());
        assert!(Validator::validate_status_transition(TaskStatus::Blocked, TaskStatus::Completed).is_err());
    }
}
