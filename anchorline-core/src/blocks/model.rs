//! Block model.
//!
//! `Block` carries the fields every block shares (id, timestamp, collapse
//! state) and a `BlockData` payload tagged by `BlockType`. The payload variant
//! is fixed at creation; updates go through `BlockPatch`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::patch::{BlockPatch, DataPatch};

/// Opaque block identifier: creation time in milliseconds plus a random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("block-{:x}-{}", millis, &random[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockType {
    Command,
    AiPrompt,
    AiResponse,
    AiCommand,
    Directory,
    Status,
    SessionDivider,
}

impl BlockType {
    pub const ALL: [BlockType; 7] = [
        BlockType::Command,
        BlockType::AiPrompt,
        BlockType::AiResponse,
        BlockType::AiCommand,
        BlockType::Directory,
        BlockType::Status,
        BlockType::SessionDivider,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Command => "command",
            BlockType::AiPrompt => "ai-prompt",
            BlockType::AiResponse => "ai-response",
            BlockType::AiCommand => "ai-command",
            BlockType::Directory => "directory",
            BlockType::Status => "status",
            BlockType::SessionDivider => "session-divider",
        }
    }

    /// Interactive blocks push buffer content down (inline placement);
    /// passive ones overlay it.
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            BlockType::Command | BlockType::AiPrompt | BlockType::AiResponse | BlockType::AiCommand
        )
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ════════════════════════════════════════════════════════════════════
// Per-type payloads
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandData {
    pub command: String,
    pub exit_code: Option<i32>,
    pub status: CommandStatus,
    pub working_directory: Option<String>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPromptData {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponseData {
    pub content: String,
    pub is_streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandAlternative {
    pub command: String,
    pub description: String,
}

/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiCommandStatus {
    #[default]
    Pending,
    Inserted,
    Executed,
    Rejected,
}

impl AiCommandStatus {
    pub fn is_terminal(self) -> bool {
        self != AiCommandStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiCommandData {
    pub query: String,
    pub is_loading: bool,
    pub command: String,
    pub explanation: String,
    pub is_dangerous: bool,
    pub requires_sudo: bool,
    pub affects_files: Vec<String>,
    pub alternatives: Vec<CommandAlternative>,
    pub warning: Option<String>,
    pub status: AiCommandStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryData {
    pub path: String,
    pub git_branch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    pub message: String,
    pub level: StatusLevel,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDividerData {
    pub label: String,
    pub session_id: Option<String>,
}

/// Type-tagged block payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BlockData {
    Command(CommandData),
    AiPrompt(AiPromptData),
    AiResponse(AiResponseData),
    AiCommand(AiCommandData),
    Directory(DirectoryData),
    Status(StatusData),
    SessionDivider(SessionDividerData),
}

impl BlockData {
    /// Type-specific seed values.
    pub fn defaults(block_type: BlockType) -> Self {
        match block_type {
            BlockType::Command => BlockData::Command(CommandData::default()),
            BlockType::AiPrompt => BlockData::AiPrompt(AiPromptData::default()),
            BlockType::AiResponse => BlockData::AiResponse(AiResponseData::default()),
            BlockType::AiCommand => BlockData::AiCommand(AiCommandData::default()),
            BlockType::Directory => BlockData::Directory(DirectoryData::default()),
            BlockType::Status => BlockData::Status(StatusData::default()),
            BlockType::SessionDivider => BlockData::SessionDivider(SessionDividerData::default()),
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            BlockData::Command(_) => BlockType::Command,
            BlockData::AiPrompt(_) => BlockType::AiPrompt,
            BlockData::AiResponse(_) => BlockType::AiResponse,
            BlockData::AiCommand(_) => BlockType::AiCommand,
            BlockData::Directory(_) => BlockType::Directory,
            BlockData::Status(_) => BlockType::Status,
            BlockData::SessionDivider(_) => BlockType::SessionDivider,
        }
    }

    /// Shallow-merge a same-type patch. Returns false (and changes nothing)
    /// when the patch targets a different block type.
    pub fn merge(&mut self, patch: &DataPatch) -> bool {
        match (self, patch) {
            (BlockData::Command(d), DataPatch::Command(p)) => p.apply_to(d),
            (BlockData::AiPrompt(d), DataPatch::AiPrompt(p)) => p.apply_to(d),
            (BlockData::AiResponse(d), DataPatch::AiResponse(p)) => p.apply_to(d),
            (BlockData::AiCommand(d), DataPatch::AiCommand(p)) => p.apply_to(d),
            (BlockData::Directory(d), DataPatch::Directory(p)) => p.apply_to(d),
            (BlockData::Status(d), DataPatch::Status(p)) => p.apply_to(d),
            (BlockData::SessionDivider(d), DataPatch::SessionDivider(p)) => p.apply_to(d),
            _ => return false,
        }
        true
    }
}

// ════════════════════════════════════════════════════════════════════
// Block
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,
    /// Creation time, unix milliseconds.
    pub timestamp: i64,
    pub is_collapsed: bool,
    #[serde(flatten)]
    pub data: BlockData,
}

impl Block {
    pub fn new(id: BlockId, data: BlockData) -> Self {
        Self {
            id,
            timestamp: Utc::now().timestamp_millis(),
            is_collapsed: false,
            data,
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.data.block_type()
    }

    /// Apply a partial update. The collapse flag applies to every type; the
    /// data part only when it matches this block's type. Returns false if the
    /// data part was rejected.
    pub fn apply(&mut self, patch: &BlockPatch) -> bool {
        if let Some(data) = &patch.data {
            if !self.data.merge(data) {
                return false;
            }
        }
        if let Some(collapsed) = patch.collapsed {
            self.is_collapsed = collapsed;
        }
        true
    }

    pub fn as_command(&self) -> Option<&CommandData> {
        match &self.data {
            BlockData::Command(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_ai_command(&self) -> Option<&AiCommandData> {
        match &self.data {
            BlockData::AiCommand(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_ai_response(&self) -> Option<&AiResponseData> {
        match &self.data {
            BlockData::AiResponse(d) => Some(d),
            _ => None,
        }
    }

    /// True for a command block still waiting for its end boundary.
    pub fn is_running_command(&self) -> bool {
        self.as_command()
            .map(|c| c.status == CommandStatus::Running)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::patch::CommandPatch;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = BlockId::generate();
        let b = BlockId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("block-"));
    }

    #[test]
    fn test_defaults_match_type() {
        for ty in BlockType::ALL {
            assert_eq!(BlockData::defaults(ty).block_type(), ty);
        }
    }

    #[test]
    fn test_interactive_types() {
        assert!(BlockType::Command.is_interactive());
        assert!(BlockType::AiCommand.is_interactive());
        assert!(!BlockType::Directory.is_interactive());
        assert!(!BlockType::SessionDivider.is_interactive());
    }

    #[test]
    fn test_mismatched_patch_is_rejected() {
        let mut block = Block::new(BlockId::from("b1"), BlockData::defaults(BlockType::Status));
        let patch = BlockPatch::from(CommandPatch {
            command: Some("ls".into()),
            ..Default::default()
        });
        assert!(!block.apply(&patch));
        assert_eq!(block.block_type(), BlockType::Status);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let block = Block::new(BlockId::from("b1"), BlockData::defaults(BlockType::AiCommand));
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "ai-command");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["isCollapsed"], false);
    }
}
