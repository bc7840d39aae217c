//! Block data contracts.
//!
//! A "block" is a typed, addressable UI region anchored to a line of the
//! terminal scroll buffer:
//! - command results
//! - AI prompts / responses / suggested commands
//! - directory headers, status lines, session dividers
//!
//! The `BlockId` is the only key shared by the registry, the store and the
//! mounted component.

pub mod model;
pub mod patch;

pub use model::{
    AiCommandData, AiCommandStatus, AiPromptData, AiResponseData, Block, BlockData, BlockId,
    BlockType, CommandAlternative, CommandData, CommandStatus, DirectoryData,
    SessionDividerData, StatusData, StatusLevel,
};
pub use patch::{
    AiCommandPatch, AiPromptPatch, AiResponsePatch, BlockPatch, CommandPatch, DataPatch,
    DirectoryPatch, SessionDividerPatch, StatusPatch,
};
