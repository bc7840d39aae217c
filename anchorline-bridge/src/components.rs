// anchorline-bridge/src/components.rs
//
// Block type → component name table, the block → input-map conversion, and
// a plain-text component set that renders into container lines.

use std::collections::HashMap;

use anchorline_core::{Block, BlockType, Container};
use serde_json::Value;

use crate::mount::{ComponentFactory, ComponentInputs, MountError, MountedComponent, OutputSink};

pub const COMMAND_COMPONENT: &str = "command-block";
pub const AI_PROMPT_COMPONENT: &str = "ai-prompt-block";
pub const AI_RESPONSE_COMPONENT: &str = "ai-response-block";
pub const AI_COMMAND_COMPONENT: &str = "ai-command-block";
pub const DIRECTORY_COMPONENT: &str = "directory-block";
pub const STATUS_COMPONENT: &str = "status-block";
pub const SESSION_DIVIDER_COMPONENT: &str = "session-divider-block";

/// Which component renders which block type. Closed over `BlockType`;
/// entries can be replaced at startup.
#[derive(Debug, Clone, Default)]
pub struct ComponentTable {
    entries: HashMap<BlockType, String>,
}

impl ComponentTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        for block_type in BlockType::ALL {
            table.register_block_component(block_type, default_component(block_type));
        }
        table
    }

    /// Returns the component previously registered for the type.
    pub fn register_block_component(
        &mut self,
        block_type: BlockType,
        component: impl Into<String>,
    ) -> Option<String> {
        self.entries.insert(block_type, component.into())
    }

    pub fn component_for(&self, block_type: BlockType) -> Option<&str> {
        self.entries.get(&block_type).map(String::as_str)
    }
}

pub fn default_component(block_type: BlockType) -> &'static str {
    match block_type {
        BlockType::Command => COMMAND_COMPONENT,
        BlockType::AiPrompt => AI_PROMPT_COMPONENT,
        BlockType::AiResponse => AI_RESPONSE_COMPONENT,
        BlockType::AiCommand => AI_COMMAND_COMPONENT,
        BlockType::Directory => DIRECTORY_COMPONENT,
        BlockType::Status => STATUS_COMPONENT,
        BlockType::SessionDivider => SESSION_DIVIDER_COMPONENT,
    }
}

/// The block's serialized fields, camelCase, with `type` as the tag.
pub fn block_inputs(block: &Block) -> ComponentInputs {
    match serde_json::to_value(block) {
        Ok(Value::Object(map)) => map,
        Ok(_) => ComponentInputs::new(),
        Err(e) => {
            tracing::error!(block_id = %block.id, error = %e, "block did not serialize");
            ComponentInputs::new()
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Plain-text components
// ════════════════════════════════════════════════════════════════════

/// Mounts every default component as text lines in the container.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextComponentFactory;

impl TextComponentFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ComponentFactory for TextComponentFactory {
    fn mount(
        &self,
        component: &str,
        container: &Container,
        inputs: &ComponentInputs,
        _outputs: OutputSink,
    ) -> Result<Box<dyn MountedComponent>, MountError> {
        let known = BlockType::ALL
            .iter()
            .any(|&t| default_component(t) == component);
        if !known {
            return Err(MountError::UnknownComponent(component.to_string()));
        }
        let mut text = TextComponent {
            component: component.to_string(),
            container: container.clone(),
        };
        text.set_inputs(inputs);
        Ok(Box::new(text))
    }
}

struct TextComponent {
    component: String,
    container: Container,
}

impl MountedComponent for TextComponent {
    fn set_inputs(&mut self, inputs: &ComponentInputs) {
        let mut lines = render_lines(&self.component, inputs);
        let collapsed = inputs.get("isCollapsed").and_then(Value::as_bool).unwrap_or(false);
        let rows = if collapsed {
            1
        } else {
            usize::from(self.container.height_rows())
        };
        lines.truncate(rows.max(1));
        self.container.set_lines(lines);
    }

    fn destroy(&mut self) {
        self.container.clear();
    }
}

fn str_field<'a>(inputs: &'a ComponentInputs, key: &str) -> &'a str {
    inputs.get(key).and_then(Value::as_str).unwrap_or("")
}

fn bool_field(inputs: &ComponentInputs, key: &str) -> bool {
    inputs.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn render_lines(component: &str, inputs: &ComponentInputs) -> Vec<String> {
    match component {
        COMMAND_COMPONENT => {
            let mut status = str_field(inputs, "status").to_string();
            if let Some(code) = inputs.get("exitCode").and_then(Value::as_i64) {
                status.push_str(&format!(" (exit {code})"));
            }
            if let Some(ms) = inputs.get("durationMs").and_then(Value::as_u64) {
                status.push_str(&format!(" {ms} ms"));
            }
            vec![format!("$ {}", str_field(inputs, "command")), status]
        }
        AI_PROMPT_COMPONENT => vec![format!("? {}", str_field(inputs, "prompt"))],
        AI_RESPONSE_COMPONENT => {
            let mut lines: Vec<String> =
                str_field(inputs, "content").lines().map(str::to_string).collect();
            if bool_field(inputs, "isStreaming") {
                lines.push("…".to_string());
            }
            lines
        }
        AI_COMMAND_COMPONENT => {
            if bool_field(inputs, "isLoading") {
                return vec![format!("… {}", str_field(inputs, "query"))];
            }
            let mut lines = vec![
                format!("» {}", str_field(inputs, "command")),
                str_field(inputs, "explanation").to_string(),
            ];
            if let Some(warning) = inputs.get("warning").and_then(Value::as_str) {
                lines.push(format!("! {warning}"));
            }
            lines.push(format!("[{}]", str_field(inputs, "status")));
            lines
        }
        DIRECTORY_COMPONENT => match inputs.get("gitBranch").and_then(Value::as_str) {
            Some(branch) => vec![format!("{} ({branch})", str_field(inputs, "path"))],
            None => vec![str_field(inputs, "path").to_string()],
        },
        STATUS_COMPONENT => vec![format!(
            "[{}] {}",
            str_field(inputs, "level"),
            str_field(inputs, "message")
        )],
        SESSION_DIVIDER_COMPONENT => vec![format!("── {} ──", str_field(inputs, "label"))],
        _ => Vec::new(),
    }
}
