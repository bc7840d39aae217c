//! Terminal-side helpers that sit next to the emulator.
//!
//! - `osc`: streaming OSC parser (OSC 7 cwd, OSC 133 / 633 shell-integration marks)
//! - `semantic`: shell-integration state derived from those marks
//! - `headless`: in-memory `TerminalHost` with a trimmed scroll buffer

pub mod headless;
pub mod osc;
pub mod semantic;

pub use headless::HeadlessTerminal;
pub use osc::{OscEvent, OscParser};
pub use semantic::{IntegrationEvent, ShellIntegration};
