//! Variable-substitution contract for [`crate::models::TemplateSpec`].
//!
//! Rendering itself (the actual handlebars pass) lives in
//! `engine::templates`, which depends on this crate's types but not
//! vice versa — `core` stays free of any rendering-engine dependency.
//! This module only validates that a caller has supplied every
//! variable a template requires before handing the template and
//! bindings off to the renderer.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::models::TemplateSpec;

/// Validate that `variables` supplies every name in
/// `spec.required_variables`, returning the names that are missing.
pub fn missing_variables(spec: &TemplateSpec, variables: &HashMap<String, String>) -> Vec<String> {
    spec.required_variables
        .iter()
        .filter(|name| !variables.contains_key(*name))
        .cloned()
        .collect()
}

/// Validate a template instantiation request, failing with
/// `TemplateError` if any required variable is absent.
pub fn validate_variables(spec: &TemplateSpec, variables: &HashMap<String, String>) -> Result<()> {
    let missing = missing_variables(spec, variables);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::TemplateError(format!(
            "template '{}' is missing required variable(s): {}",
            spec.name,
            missing.join(", ")
        )))
    }
}
