//! Partial block updates.
//!
//! Every field is optional; `None` leaves the stored value alone. Nullable
//! fields use `Option<Option<T>>` so a patch can clear them.

use super::model::{
    AiCommandData, AiCommandStatus, AiPromptData, AiResponseData, CommandAlternative,
    CommandData, CommandStatus, DirectoryData, SessionDividerData, StatusData, StatusLevel,
};

fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandPatch {
    pub command: Option<String>,
    pub exit_code: Option<Option<i32>>,
    pub status: Option<CommandStatus>,
    pub working_directory: Option<Option<String>>,
    pub duration_ms: Option<Option<u64>>,
}

impl CommandPatch {
    pub(crate) fn apply_to(&self, d: &mut CommandData) {
        set(&mut d.command, &self.command);
        set(&mut d.exit_code, &self.exit_code);
        set(&mut d.status, &self.status);
        set(&mut d.working_directory, &self.working_directory);
        set(&mut d.duration_ms, &self.duration_ms);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiPromptPatch {
    pub prompt: Option<String>,
}

impl AiPromptPatch {
    pub(crate) fn apply_to(&self, d: &mut AiPromptData) {
        set(&mut d.prompt, &self.prompt);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiResponsePatch {
    /// Cumulative content; replaces what is stored.
    pub content: Option<String>,
    pub is_streaming: Option<bool>,
}

impl AiResponsePatch {
    pub(crate) fn apply_to(&self, d: &mut AiResponseData) {
        set(&mut d.content, &self.content);
        set(&mut d.is_streaming, &self.is_streaming);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiCommandPatch {
    pub query: Option<String>,
    pub is_loading: Option<bool>,
    pub command: Option<String>,
    pub explanation: Option<String>,
    pub is_dangerous: Option<bool>,
    pub requires_sudo: Option<bool>,
    pub affects_files: Option<Vec<String>>,
    pub alternatives: Option<Vec<CommandAlternative>>,
    pub warning: Option<Option<String>>,
    pub status: Option<AiCommandStatus>,
}

impl AiCommandPatch {
    pub(crate) fn apply_to(&self, d: &mut AiCommandData) {
        set(&mut d.query, &self.query);
        set(&mut d.is_loading, &self.is_loading);
        set(&mut d.command, &self.command);
        set(&mut d.explanation, &self.explanation);
        set(&mut d.is_dangerous, &self.is_dangerous);
        set(&mut d.requires_sudo, &self.requires_sudo);
        set(&mut d.affects_files, &self.affects_files);
        set(&mut d.alternatives, &self.alternatives);
        set(&mut d.warning, &self.warning);
        set(&mut d.status, &self.status);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryPatch {
    pub path: Option<String>,
    pub git_branch: Option<Option<String>>,
}

impl DirectoryPatch {
    pub(crate) fn apply_to(&self, d: &mut DirectoryData) {
        set(&mut d.path, &self.path);
        set(&mut d.git_branch, &self.git_branch);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPatch {
    pub message: Option<String>,
    pub level: Option<StatusLevel>,
}

impl StatusPatch {
    pub(crate) fn apply_to(&self, d: &mut StatusData) {
        set(&mut d.message, &self.message);
        set(&mut d.level, &self.level);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDividerPatch {
    pub label: Option<String>,
    pub session_id: Option<Option<String>>,
}

impl SessionDividerPatch {
    pub(crate) fn apply_to(&self, d: &mut SessionDividerData) {
        set(&mut d.label, &self.label);
        set(&mut d.session_id, &self.session_id);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataPatch {
    Command(CommandPatch),
    AiPrompt(AiPromptPatch),
    AiResponse(AiResponsePatch),
    AiCommand(AiCommandPatch),
    Directory(DirectoryPatch),
    Status(StatusPatch),
    SessionDivider(SessionDividerPatch),
}

/// A partial update for one block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockPatch {
    pub collapsed: Option<bool>,
    pub data: Option<DataPatch>,
}

impl BlockPatch {
    pub fn collapsed(collapsed: bool) -> Self {
        Self {
            collapsed: Some(collapsed),
            data: None,
        }
    }

    pub fn with_collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = Some(collapsed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.collapsed.is_none() && self.data.is_none()
    }
}

macro_rules! impl_from_patch {
    ($($patch:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$patch> for DataPatch {
                fn from(p: $patch) -> Self {
                    DataPatch::$variant(p)
                }
            }

            impl From<$patch> for BlockPatch {
                fn from(p: $patch) -> Self {
                    BlockPatch {
                        collapsed: None,
                        data: Some(DataPatch::$variant(p)),
                    }
                }
            }
        )*
    };
}

impl_from_patch! {
    CommandPatch => Command,
    AiPromptPatch => AiPrompt,
    AiResponsePatch => AiResponse,
    AiCommandPatch => AiCommand,
    DirectoryPatch => Directory,
    StatusPatch => Status,
    SessionDividerPatch => SessionDivider,
}
