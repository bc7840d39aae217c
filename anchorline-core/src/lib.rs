pub mod blocks;
pub mod config;
pub mod detector;
pub mod events;
pub mod host;
pub mod registry;
pub mod store;
pub mod term;

// Re-export the main types so users can just use `anchorline_core::BlockRegistry`
pub use blocks::{Block, BlockData, BlockId, BlockPatch, BlockType};
pub use config::{AnchorlineConfig, ConfigError};
pub use detector::{CommandDetector, CommandEvent, DetectorError, DetectorState};
pub use events::{ListenerList, Subscription};
pub use host::{Container, DecorationOptions, Placement, TerminalHost};
pub use registry::{
    BlockHandle, BlockRegistry, BlockRemoved, BlockUpdated, ContainerReady, CreateBlockOptions,
    RemovalCause,
};
pub use store::BlockStore;
pub use term::HeadlessTerminal;
