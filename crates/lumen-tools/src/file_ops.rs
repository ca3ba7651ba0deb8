//! Built-in workspace file tools.

use crate::{param, ParameterDefinition, Tool, ToolContext, ToolParameters};
use async_trait::async_trait;
use lumen_types::ToolOutcome;
use std::collections::HashMap;
use std::fs;

const MAX_LISTED_FILES: usize = 1000;

/// List files under a directory, respecting .gitignore.
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files under a directory. Respects .gitignore; limited to 1000 results."
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("path", "string", "Directory relative to the workspace root; defaults to the root", optional),
            param!("pattern", "string", "Optional glob filter applied to relative paths (e.g. '**/*.rs')", optional),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolOutcome {
        let path = params
            .get_optional::<String>("path")
            .unwrap_or(None)
            .unwrap_or_else(|| ".".to_string());
        let pattern = params.get_optional::<String>("pattern").unwrap_or(None);

        let glob_matcher = match pattern.as_deref() {
            Some(p) => match glob::Pattern::new(p) {
                Ok(matcher) => Some(matcher),
                Err(e) => return ToolOutcome::error(format!("Invalid glob pattern: {}", e)),
            },
            None => None,
        };

        let root = context.work_dir.join(&path);
        if !root.exists() {
            return ToolOutcome::error(format!("Directory not found: {}", path));
        }
        if !root.is_dir() {
            return ToolOutcome::error(format!(
                "Path '{}' is a file, not a directory. Use read_file to read it.",
                path
            ));
        }

        let mut builder = ignore::WalkBuilder::new(&root);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true);

        let mut files = Vec::new();
        let mut total_matched = 0usize;

        for entry in builder.build().flatten() {
            let entry_path = entry.path();
            if !entry_path.is_file() {
                continue;
            }
            let Ok(relative) = entry_path.strip_prefix(&context.work_dir) else {
                continue;
            };
            let Some(path_str) = relative.to_str() else {
                continue;
            };
            if let Some(matcher) = &glob_matcher {
                if !matcher.matches(path_str) {
                    continue;
                }
            }
            total_matched += 1;
            if files.len() < MAX_LISTED_FILES {
                files.push(path_str.to_string());
            }
        }

        files.sort();
        if files.is_empty() {
            return ToolOutcome::success(format!("No files found under '{}'", path));
        }
        let mut out = format!("Found {} file(s) under '{}':\n{}", total_matched, path, files.join("\n"));
        if total_matched > MAX_LISTED_FILES {
            out.push_str(&format!(
                "\n(showing first {} of {})",
                MAX_LISTED_FILES, total_matched
            ));
        }
        ToolOutcome::success(out)
    }
}

/// Read a file's contents.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file's contents from the workspace."
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([param!(
            "path",
            "string",
            "Path to the file relative to the workspace root",
            required
        )])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolOutcome {
        let path = match params.get_required::<String>("path") {
            Ok(path) => path,
            Err(e) => return ToolOutcome::error(e.to_string()),
        };

        let full_path = context.work_dir.join(&path);
        if !full_path.exists() {
            return ToolOutcome::error(format!("File not found: {}", path));
        }
        if full_path.is_dir() {
            return ToolOutcome::error(format!(
                "Path '{}' is a directory, not a file. Use list_files to see its contents.",
                path
            ));
        }

        match fs::read_to_string(&full_path) {
            Ok(content) => ToolOutcome::success(content),
            Err(e) => ToolOutcome::error(format!("Failed to read file: {}", e)),
        }
    }
}

/// Write content to a file, creating parent directories as needed.
///
/// Failures are reported in the outcome and never retried here; the model
/// sees the error in the transcript and decides what to do next.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace."
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("path", "string", "Path to the file relative to the workspace root", required),
            param!("content", "string", "Content to write to the file", required),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolOutcome {
        let path = match params.get_required::<String>("path") {
            Ok(path) => path,
            Err(e) => return ToolOutcome::error(e.to_string()),
        };
        let content = match params.get_required::<String>("content") {
            Ok(content) => content,
            Err(e) => return ToolOutcome::error(e.to_string()),
        };

        let full_path = context.work_dir.join(&path);
        if let Some(parent) = full_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return ToolOutcome::error(format!("Failed to create directories: {}", e));
            }
        }

        match fs::write(&full_path, content) {
            Ok(()) => ToolOutcome::success(format!("Successfully wrote to file: {}", path)),
            Err(e) => ToolOutcome::error(format!("Failed to write file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolRegistry;
    use tempfile::TempDir;

    fn params(value: serde_json::Value) -> ToolParameters {
        ToolParameters::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let context = ToolContext::new(dir.path());

        let outcome = WriteFileTool
            .execute(
                params(serde_json::json!({ "path": "src/lib.rs", "content": "pub fn a() {}" })),
                &context,
            )
            .await;
        assert!(outcome.success, "{:?}", outcome.error);

        let outcome = ReadFileTool
            .execute(params(serde_json::json!({ "path": "src/lib.rs" })), &context)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.content, "pub fn a() {}");
    }

    #[tokio::test]
    async fn read_missing_file_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let context = ToolContext::new(dir.path());

        let outcome = ReadFileTool
            .execute(params(serde_json::json!({ "path": "nope.rs" })), &context)
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("File not found"));
    }

    #[tokio::test]
    async fn read_directory_suggests_list_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let context = ToolContext::new(dir.path());

        let outcome = ReadFileTool
            .execute(params(serde_json::json!({ "path": "src" })), &context)
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("list_files"));
    }

    #[tokio::test]
    async fn list_files_scopes_to_requested_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("README.md"), "# hi").unwrap();
        let context = ToolContext::new(dir.path());

        let outcome = ListFilesTool
            .execute(params(serde_json::json!({ "path": "src" })), &context)
            .await;
        assert!(outcome.success);
        assert!(outcome.content.contains("src/main.rs"));
        assert!(!outcome.content.contains("README.md"));
    }

    #[tokio::test]
    async fn list_files_applies_glob_filter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::write(dir.path().join("b.md"), "").unwrap();
        let context = ToolContext::new(dir.path());

        let outcome = ListFilesTool
            .execute(
                params(serde_json::json!({ "path": ".", "pattern": "*.rs" })),
                &context,
            )
            .await;
        assert!(outcome.success);
        assert!(outcome.content.contains("a.rs"));
        assert!(!outcome.content.contains("b.md"));
    }

    #[tokio::test]
    async fn registry_executes_by_wire_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.txt"), "payload").unwrap();
        let context = ToolContext::new(dir.path());

        let registry = ToolRegistry::with_builtins();
        let tool = registry.get("read_file").unwrap();
        let outcome = tool
            .execute(params(serde_json::json!({ "path": "x.txt" })), &context)
            .await;
        assert_eq!(outcome.content, "payload");
    }
}
