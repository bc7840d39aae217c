use super::osc::{OscEvent, OscParser};

/// Command lifecycle reported by the shell itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationEvent {
    PromptStarted,
    CommandStarted { command: Option<String> },
    CommandFinished { exit_code: Option<i32> },
    CwdChanged(String),
}

/// Shell-integration state derived from OSC marks (prompt vs running).
///
/// Becomes `active` on the first OSC 133 / 633 mark; from then on the shell's
/// own boundaries are more reliable than the output heuristic.
#[derive(Debug, Clone, Default)]
pub struct ShellIntegration {
    parser: OscParser,
    active: bool,
    in_prompt: bool,
    in_command: bool,
    last_exit: Option<i32>,
    cwd: Option<String>,
    pending_command: Option<String>,
}

impl ShellIntegration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<IntegrationEvent> {
        let marks = self.parser.feed(bytes);
        marks.iter().filter_map(|ev| self.apply(ev)).collect()
    }

    pub fn apply(&mut self, ev: &OscEvent) -> Option<IntegrationEvent> {
        if ev.is_semantic_mark() && !self.active {
            tracing::info!("shell integration marks detected");
            self.active = true;
        }

        match ev {
            OscEvent::Cwd(path) => {
                if self.cwd.as_deref() == Some(path.as_str()) {
                    return None;
                }
                self.cwd = Some(path.clone());
                Some(IntegrationEvent::CwdChanged(path.clone()))
            }
            OscEvent::PromptStart => {
                self.in_prompt = true;
                self.in_command = false;
                Some(IntegrationEvent::PromptStarted)
            }
            OscEvent::InputStart => {
                self.in_prompt = false;
                None
            }
            OscEvent::CommandLine(line) => {
                self.pending_command = Some(line.clone());
                None
            }
            OscEvent::CommandExecuted => {
                self.in_prompt = false;
                self.in_command = true;
                Some(IntegrationEvent::CommandStarted {
                    command: self.pending_command.take(),
                })
            }
            OscEvent::CommandFinished { exit_code } => {
                self.last_exit = *exit_code;
                if !self.in_command {
                    return None;
                }
                self.in_command = false;
                Some(IntegrationEvent::CommandFinished {
                    exit_code: *exit_code,
                })
            }
            OscEvent::Unknown(_) => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn in_prompt(&self) -> bool {
        self.in_prompt
    }

    pub fn in_command(&self) -> bool {
        self.in_command
    }

    pub fn last_exit(&self) -> Option<i32> {
        self.last_exit
    }

    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    /// Forget everything, including whether the shell was integrated.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
