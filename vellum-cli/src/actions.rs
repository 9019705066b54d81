//! Note actions over a working folder.
//!
//! Each mutating action returns a reversible effect so the conversation ledger
//! can drive `:undo` / `:redo`. Paths are validated to stay inside the working
//! folder; mutations require approval by default, reading does not.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use vellum::{
    Action, ActionContext, ActionError, ActionReceipt, ActionRegistry, ActionSpec, Effect,
    RegistryError, Validation,
};

fn note_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": {
                "type": "string",
                "description": "Note path relative to the working folder, e.g. 'ideas/draft.md'"
            },
            "content": {
                "type": "string",
                "description": "Markdown content"
            }
        },
        "required": ["path"]
    })
}

fn relative_path(args: &Value) -> Result<&str, ActionError> {
    let path = args
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| ActionError::InvalidArguments("'path' must be a string".into()))?;
    if path.is_empty() || Path::new(path).is_absolute() || path.contains("..") {
        return Err(ActionError::InvalidArguments(
            "'path' must be a relative path inside the working folder".into(),
        ));
    }
    Ok(path)
}

fn validate_path(args: &Value) -> Validation {
    match relative_path(args) {
        Ok(_) => Validation::ok(),
        Err(e) => Validation::error(e.to_string()),
    }
}

fn write_effect(path: PathBuf, content: String) -> Effect {
    Arc::new(move || {
        let path = path.clone();
        let content = content.clone();
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &content).await?;
            Ok(())
        })
    })
}

fn remove_effect(path: PathBuf) -> Effect {
    Arc::new(move || {
        let path = path.clone();
        Box::pin(async move {
            tokio::fs::remove_file(&path).await?;
            Ok(())
        })
    })
}

/// Creates a new note. Undo removes the file, redo recreates it.
pub struct CreateNote {
    root: PathBuf,
}

#[async_trait]
impl Action for CreateNote {
    fn name(&self) -> &str {
        "create_note"
    }

    fn spec(&self) -> ActionSpec {
        ActionSpec::new("create_note", "Create a new note file", note_schema()).requires_approval()
    }

    fn validate(&self, args: &Value) -> Validation {
        validate_path(args)
    }

    async fn execute(
        &self,
        args: Value,
        _ctx: &ActionContext,
    ) -> Result<ActionReceipt, ActionError> {
        let rel = relative_path(&args)?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let path = self.root.join(rel);
        if path.exists() {
            return Err(ActionError::Failed(format!("note '{}' already exists", rel)));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content).await?;
        Ok(ActionReceipt::reversible(
            format!("Created note '{}' ({} bytes)", rel, content.len()),
            format!("Create note '{}'", rel),
            remove_effect(path.clone()),
            write_effect(path, content),
        ))
    }
}

/// Appends to an existing note. Undo restores the previous content.
pub struct AppendNote {
    root: PathBuf,
}

#[async_trait]
impl Action for AppendNote {
    fn name(&self) -> &str {
        "append_note"
    }

    fn spec(&self) -> ActionSpec {
        ActionSpec::new("append_note", "Append content to an existing note", note_schema())
            .requires_approval()
    }

    fn validate(&self, args: &Value) -> Validation {
        let mut validation = validate_path(args);
        if args.get("content").and_then(Value::as_str).is_none() {
            validation.errors.push("'content' must be a string".into());
        }
        validation
    }

    async fn execute(
        &self,
        args: Value,
        _ctx: &ActionContext,
    ) -> Result<ActionReceipt, ActionError> {
        let rel = relative_path(&args)?;
        let addition = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::InvalidArguments("'content' must be a string".into()))?;
        let path = self.root.join(rel);
        let old = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| ActionError::Failed(format!("note '{}' does not exist", rel)))?;
        let new = format!("{}{}", old, addition);
        tokio::fs::write(&path, &new).await?;
        Ok(ActionReceipt::reversible(
            format!("Appended {} bytes to '{}'", addition.len(), rel),
            format!("Append to note '{}'", rel),
            write_effect(path.clone(), old),
            write_effect(path, new),
        ))
    }
}

/// Deletes a note. Undo restores the deleted content.
pub struct DeleteNote {
    root: PathBuf,
}

#[async_trait]
impl Action for DeleteNote {
    fn name(&self) -> &str {
        "delete_note"
    }

    fn spec(&self) -> ActionSpec {
        ActionSpec::new(
            "delete_note",
            "Delete a note file",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Note path relative to the working folder"}
                },
                "required": ["path"]
            }),
        )
        .requires_approval()
    }

    fn validate(&self, args: &Value) -> Validation {
        validate_path(args)
    }

    async fn execute(
        &self,
        args: Value,
        _ctx: &ActionContext,
    ) -> Result<ActionReceipt, ActionError> {
        let rel = relative_path(&args)?;
        let path = self.root.join(rel);
        let old = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| ActionError::Failed(format!("note '{}' does not exist", rel)))?;
        tokio::fs::remove_file(&path).await?;
        Ok(ActionReceipt::reversible(
            format!("Deleted note '{}'", rel),
            format!("Delete note '{}'", rel),
            write_effect(path.clone(), old),
            remove_effect(path),
        ))
    }
}

/// Reads a note. No approval needed; safe to run in parallel.
pub struct ReadNote {
    root: PathBuf,
}

#[async_trait]
impl Action for ReadNote {
    fn name(&self) -> &str {
        "read_note"
    }

    fn spec(&self) -> ActionSpec {
        ActionSpec::new(
            "read_note",
            "Read the content of a note",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Note path relative to the working folder"}
                },
                "required": ["path"]
            }),
        )
        .parallel_safe()
    }

    fn validate(&self, args: &Value) -> Validation {
        validate_path(args)
    }

    async fn execute(
        &self,
        args: Value,
        _ctx: &ActionContext,
    ) -> Result<ActionReceipt, ActionError> {
        let rel = relative_path(&args)?;
        let content = tokio::fs::read_to_string(self.root.join(rel))
            .await
            .map_err(|_| ActionError::Failed(format!("note '{}' does not exist", rel)))?;
        Ok(ActionReceipt::text(content))
    }
}

/// Registers the full note action set against one working folder.
pub fn register_note_actions(
    registry: &mut ActionRegistry,
    root: &Path,
) -> Result<(), RegistryError> {
    let root = root.to_path_buf();
    registry.register(Arc::new(CreateNote { root: root.clone() }))?;
    registry.register(Arc::new(AppendNote { root: root.clone() }))?;
    registry.register(Arc::new(DeleteNote { root: root.clone() }))?;
    registry.register(Arc::new(ReadNote { root }))?;
    Ok(())
}
