//! Workspace tools and the registry the agent loop dispatches through.
//!
//! The registry is a closed allow-list: a name that is not registered is a
//! tool-not-found outcome relayed to the model, never a crash.

pub mod file_ops;

pub use file_ops::{ListFilesTool, ReadFileTool, WriteFileTool};

use async_trait::async_trait;
use lumen_types::ToolOutcome;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Execution context handed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub work_dir: PathBuf,
}

impl ToolContext {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }
}

/// Parameter object parsed out of a tool directive. Shapes are
/// tool-specific; this wrapper only guarantees "parses as structured data".
#[derive(Debug, Clone, Default)]
pub struct ToolParameters {
    pub data: HashMap<String, serde_json::Value>,
}

impl ToolParameters {
    pub fn from_value(value: serde_json::Value) -> anyhow::Result<Self> {
        let data: HashMap<String, serde_json::Value> = serde_json::from_value(value)?;
        Ok(Self { data })
    }

    pub fn get_required<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = self
            .data
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("Required parameter '{}' missing", key))?;
        serde_json::from_value(value.clone())
            .map_err(|e| anyhow::anyhow!("Failed to parse parameter '{}': {}", key, e))
    }

    pub fn get_optional<T>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.data.get(key) {
            Some(value) => {
                let parsed: T = serde_json::from_value(value.clone())
                    .map_err(|e| anyhow::anyhow!("Failed to parse parameter '{}': {}", key, e))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }
}

/// Description of one tool parameter, for catalog rendering.
#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    pub param_type: String,
    pub description: String,
    pub required: bool,
}

/// Helper macro for declaring parameter definitions.
#[macro_export]
macro_rules! param {
    ($name:expr, $type:expr, $desc:expr, required) => {
        (
            $name.to_string(),
            $crate::ParameterDefinition {
                param_type: $type.to_string(),
                description: $desc.to_string(),
                required: true,
            },
        )
    };
    ($name:expr, $type:expr, $desc:expr, optional) => {
        (
            $name.to_string(),
            $crate::ParameterDefinition {
                param_type: $type.to_string(),
                description: $desc.to_string(),
                required: false,
            },
        )
    };
}

/// One executable workspace capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> HashMap<String, ParameterDefinition>;
    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolOutcome;
}

/// Closed allow-list of tools, keyed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with the built-in workspace tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ListFilesTool));
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(WriteFileTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Human-readable catalog for the panel's verbose startup output.
    pub fn render_catalog(&self) -> String {
        let mut lines = Vec::new();
        for name in self.names() {
            let tool = &self.tools[&name];
            lines.push(format!("{}: {}", name, tool.description()));
            let mut params: Vec<_> = tool.parameters().into_iter().collect();
            params.sort_by(|a, b| a.0.cmp(&b.0));
            for (pname, def) in params {
                let req = if def.required { "required" } else { "optional" };
                lines.push(format!(
                    "  {} ({}, {}): {}",
                    pname, def.param_type, req, def.description
                ));
            }
        }
        lines.join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_under_their_wire_names() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["list_files", "read_file", "write_file"]);
        assert!(registry.get("read_file").is_some());
        assert!(registry.get("rm_rf").is_none());
    }

    #[test]
    fn catalog_lists_every_tool_and_parameter() {
        let catalog = ToolRegistry::with_builtins().render_catalog();
        assert!(catalog.contains("list_files"));
        assert!(catalog.contains("path (string, required)"));
        assert!(catalog.contains("content (string, required)"));
    }

    #[test]
    fn parameters_reject_missing_required_keys() {
        let params = ToolParameters::from_value(serde_json::json!({ "path": "src" })).unwrap();
        assert_eq!(params.get_required::<String>("path").unwrap(), "src");
        assert!(params.get_required::<String>("content").is_err());
        assert_eq!(params.get_optional::<String>("pattern").unwrap(), None);
    }

    #[test]
    fn parameters_require_an_object() {
        assert!(ToolParameters::from_value(serde_json::json!([1, 2])).is_err());
        assert!(ToolParameters::from_value(serde_json::json!("path")).is_err());
    }
}
