use std::collections::HashMap;

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use orchestrator_core::{EngineError, NewTask, Priority, Result};

/// Declared type of a template variable, used to validate and coerce
/// caller-supplied values before substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Int,
    Enum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
}

/// One task stub inside a template. `depends_on` is a set of
/// zero-based indices into the template's own `tasks` list, resolved
/// to freshly generated ids at instantiation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStub {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A declarative template document: metadata, the variables it
/// accepts, and the task stubs it expands into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub metadata: TemplateMetadata,
    pub variables: Vec<VariableDef>,
    pub tasks: Vec<TaskStub>,
}

/// The resolved output of instantiating a template: task stubs with
/// all `{{var}}` substitutions applied, still carrying by-index
/// dependency references for the caller to resolve against ids it
/// generates as it inserts each task in order.
pub struct InstantiationPlan {
    pub new_tasks: Vec<NewTask>,
    /// `edges[i]` lists the indices that task `i` depends on.
    pub edges: Vec<Vec<usize>>,
}

/// Renders `{{var}}` substitutions and `{{#if var}}…{{/if}}`
/// conditionals inside template documents via `handlebars`.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        Self { handlebars }
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate supplied variables against the document's declared
    /// variables, applying defaults and checking `required`.
    fn resolve_variables(&self, doc: &TemplateDocument, supplied: &HashMap<String, String>) -> Result<Json> {
        let mut resolved = serde_json::Map::new();
        let mut missing = Vec::new();

        for var in &doc.variables {
            match supplied.get(&var.name).cloned().or_else(|| var.default.clone()) {
                Some(value) => {
                    if var.var_type == VariableType::Enum
                        && !var.options.is_empty()
                        && !var.options.contains(&value)
                    {
                        return Err(EngineError::TemplateError(format!(
                            "variable '{}' must be one of {:?}, got '{}'",
                            var.name, var.options, value
                        )));
                    }
                    resolved.insert(var.name.clone(), Json::String(value));
                }
                None if var.required => missing.push(var.name.clone()),
                None => {
                    resolved.insert(var.name.clone(), Json::Bool(false));
                }
            }
        }

        if !missing.is_empty() {
            return Err(EngineError::TemplateError(format!(
                "missing required variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Json::Object(resolved))
    }

    fn render_str(&self, template: &str, vars: &Json) -> Result<String> {
        self.handlebars
            .render_template(template, vars)
            .map_err(|e| EngineError::TemplateError(format!("failed to render template: {e}")))
    }

    /// Instantiate a template against supplied variables, producing an
    /// ordered plan the caller inserts task-by-task, resolving each
    /// stub's `depends_on` indices to the ids generated so far.
    pub fn instantiate(&self, doc: &TemplateDocument, supplied: HashMap<String, String>) -> Result<InstantiationPlan> {
        let vars = self.resolve_variables(doc, &supplied)?;

        let mut new_tasks = Vec::with_capacity(doc.tasks.len());
        let mut edges = Vec::with_capacity(doc.tasks.len());

        for (index, stub) in doc.tasks.iter().enumerate() {
            for dep in &stub.depends_on {
                if *dep >= doc.tasks.len() {
                    return Err(EngineError::TemplateError(format!(
                        "task {index} depends_on out-of-range index {dep}"
                    )));
                }
            }

            let title = self.render_str(&stub.title, &vars)?;
            let description = self.render_str(&stub.description, &vars)?;
            let success_criteria = stub
                .success_criteria
                .iter()
                .map(|c| self.render_str(c, &vars))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .map(|text| orchestrator_core::Criterion { text, measurable: "true".to_string() })
                .collect();

            new_tasks.push(NewTask {
                title,
                description,
                priority: stub.priority,
                assignee: None,
                success_criteria,
                deadline: None,
                estimated_hours: stub.estimated_hours,
                tags: stub.tags.clone(),
                depends_on: Vec::new(),
            });
            edges.push(stub.depends_on.clone());
        }

        Ok(InstantiationPlan { new_tasks, edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> TemplateDocument {
        TemplateDocument {
            metadata: TemplateMetadata {
                name: "onboarding".to_string(),
                version: "1".to_string(),
                description: "bring a new service online".to_string(),
            },
            variables: vec![
                VariableDef {
                    name: "service".to_string(),
                    var_type: VariableType::String,
                    required: true,
                    default: None,
                    options: vec![],
                },
                VariableDef {
                    name: "tier".to_string(),
                    var_type: VariableType::Enum,
                    required: false,
                    default: Some("standard".to_string()),
                    options: vec!["standard".to_string(), "critical".to_string()],
                },
            ],
            tasks: vec![
                TaskStub {
                    title: "Provision {{service}}".to_string(),
                    description: "tier: {{tier}}".to_string(),
                    priority: Priority::Medium,
                    depends_on: vec![],
                    success_criteria: vec![],
                    estimated_hours: Some(2.0),
                    tags: vec![],
                },
                TaskStub {
                    title: "Deploy {{service}}".to_string(),
                    description: String::new(),
                    priority: Priority::Medium,
                    depends_on: vec![0],
                    success_criteria: vec![],
                    estimated_hours: Some(1.0),
                    tags: vec![],
                },
            ],
        }
    }

    #[test]
    fn instantiate_substitutes_variables_and_defaults() {
        let engine = TemplateEngine::new();
        let mut supplied = HashMap::new();
        supplied.insert("service".to_string(), "billing".to_string());

        let plan = engine.instantiate(&sample_doc(), supplied).unwrap();
        assert_eq!(plan.new_tasks[0].title, "Provision billing");
        assert_eq!(plan.new_tasks[0].description, "tier: standard");
        assert_eq!(plan.edges[1], vec![0]);
    }

    #[test]
    fn missing_required_variable_is_rejected() {
        let engine = TemplateEngine::new();
        let result = engine.instantiate(&sample_doc(), HashMap::new());
        assert!(matches!(result, Err(EngineError::TemplateError(_))));
    }

    #[test]
    fn enum_variable_rejects_out_of_range_option() {
        let engine = TemplateEngine::new();
        let mut supplied = HashMap::new();
        supplied.insert("service".to_string(), "billing".to_string());
        supplied.insert("tier".to_string(), "bogus".to_string());

        let result = engine.instantiate(&sample_doc(), supplied);
        assert!(matches!(result, Err(EngineError::TemplateError(_))));
    }

    #[test]
    fn out_of_range_dependency_index_is_rejected() {
        let mut doc = sample_doc();
        doc.tasks[1].depends_on = vec![5];
        let engine = TemplateEngine::new();
        let mut supplied = HashMap::new();
        supplied.insert("service".to_string(), "billing".to_string());

        let result = engine.instantiate(&doc, supplied);
        assert!(matches!(result, Err(EngineError::TemplateError(_))));
    }
}
