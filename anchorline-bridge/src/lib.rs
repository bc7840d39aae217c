//! Anchorline Bridge library target.
//!
//! Wires the core block machinery to UI components and PTY sessions. The
//! replay binary lives in `main.rs`; integration tests import from here.

pub mod components;
pub mod factory;
pub mod mount;
pub mod session;
pub mod util;

pub use components::{ComponentTable, TextComponentFactory, block_inputs};
pub use factory::{AiCommandAction, BlockFactory};
pub use mount::{
    ComponentFactory, ComponentInputs, ComponentOutput, MountError, MountRegistry,
    MountedComponent, OutputSink,
};
pub use session::{SessionCommand, TerminalSession};
