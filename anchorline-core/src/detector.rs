//! Heuristic command-boundary detection.
//!
//! Classifies raw shell output, line by line, into a command lifecycle:
//! prompt seen → command typed → output → next prompt (command ended).
//! The shell does not cooperate, so this is a best-effort guess:
//! - a missed command just means no block is created
//! - a false command start anchors a block to random output
//!
//! so the command test leans towards rejecting. Exit codes cannot be read
//! from output; `command-end` carries one only when it comes in through
//! `mark_command_end` (shell integration).
//!
//! One detector per terminal session. `reset()` must be called when a new
//! PTY session reuses the detector.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::config::DetectorConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// `line` is the prompt line the command was typed at.
    CommandStart { line: usize, command: String },
    CommandEnd { line: usize, exit_code: Option<i32> },
    PromptDetected { line: usize },
}

impl CommandEvent {
    pub fn line(&self) -> usize {
        match self {
            CommandEvent::CommandStart { line, .. }
            | CommandEvent::CommandEnd { line, .. }
            | CommandEvent::PromptDetected { line } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    PromptSeen,
    InCommand,
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("invalid prompt pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// ════════════════════════════════════════════════════════════════════
// Built-in patterns
// ════════════════════════════════════════════════════════════════════

struct BuiltinPrompt {
    name: &'static str,
    regex: Regex,
}

static BUILTIN_PROMPTS: OnceLock<Vec<BuiltinPrompt>> = OnceLock::new();
static ANSI_REGEX: OnceLock<Regex> = OnceLock::new();

fn builtin_prompts() -> &'static [BuiltinPrompt] {
    BUILTIN_PROMPTS.get_or_init(|| {
        let table: [(&'static str, &'static str); 8] = [
            // user@host:~$   [user@host dir]#   (venv) bash-5.1$
            ("posix", r"^[\w.@:~/\\+()\[\] -]*[$#]$"),
            // PS C:\Users\me>
            ("powershell", r"^PS [^>]*>$"),
            // C:\Windows\System32>
            ("cmd", r"^[A-Za-z]:\\[^>]*>$"),
            // mysql>   user@host ~/src>
            ("generic", r"^[\w.@:~/+ -]+>$"),
            // user@host ~ %
            ("zsh", r"^[\w.+()\[\]-]*[@~][\w.@:~/+()\[\] -]*%$"),
            // ~/src ❯   ➜  src git:(main)
            ("styled-suffix", r"^.*[❯➜λ»▶]$"),
            ("styled-prefix", r"^[❯➜λ»▶]\s"),
            // ⋊> ~/src
            ("fish", r"^⋊>"),
        ];
        table
            .iter()
            .map(|&(name, pattern)| BuiltinPrompt {
                name,
                regex: Regex::new(pattern).expect("Invalid built-in prompt regex"),
            })
            .collect()
    })
}

/// Remove CSI, OSC and two-byte escape sequences.
pub fn strip_ansi(text: &str) -> String {
    let re = ANSI_REGEX.get_or_init(|| {
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?|\x1b[@-Z\\-_]")
            .expect("Invalid ANSI Regex")
    });
    re.replace_all(text, "").into_owned()
}

const COMMAND_VERBS: &[&str] = &[
    "apt", "awk", "brew", "cargo", "cat", "cd", "chmod", "chown", "clear", "code", "cp", "curl",
    "dnf", "docker", "echo", "exit", "export", "find", "git", "go", "grep", "head", "history",
    "htop", "journalctl", "kill", "kubectl", "less", "ls", "make", "man", "mkdir", "more", "mv",
    "nano", "node", "npm", "npx", "pip", "pnpm", "ps", "pwd", "python", "python3", "rg", "rm",
    "rustc", "scp", "sed", "source", "ssh", "sudo", "systemctl", "tail", "tar", "top", "touch",
    "unzip", "vi", "vim", "wget", "which", "yarn", "yum", "zip",
];

const PATH_PREFIXES: &[&str] = &["./", "../", "/", "~/"];

/// Lowercased prefixes of diagnostics and table headers.
const OUTPUT_PREFIXES: &[&str] = &[
    "error:",
    "warning:",
    "fatal:",
    "note:",
    "usage:",
    "total ",
    "drwx",
    "-rw",
    "lrwx",
    "container id",
    "repository",
    "image id",
    "name ",
    "pid ",
];

const SHELL_METACHARS: &[char] = &['|', '&', ';', '>', '<'];

// ════════════════════════════════════════════════════════════════════
// Detector
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct CustomPrompt {
    source: String,
    regex: Regex,
}

/// Per-session detection state.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    config: DetectorConfig,
    custom: Vec<CustomPrompt>,
    last_prompt_line: Option<usize>,
    in_command: bool,
    command_start_line: Option<usize>,
    current_command: Option<String>,
}

impl Default for CommandDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDetector {
    pub fn new() -> Self {
        Self::with_config(DetectorConfig::default())
    }

    /// Invalid `custom_prompts` entries are logged and skipped.
    pub fn with_config(config: DetectorConfig) -> Self {
        let mut detector = Self {
            config,
            custom: Vec::new(),
            last_prompt_line: None,
            in_command: false,
            command_start_line: None,
            current_command: None,
        };
        for pattern in detector.config.custom_prompts.clone() {
            if let Err(e) = detector.add_prompt_pattern(&pattern) {
                tracing::warn!("{}", e);
            }
        }
        detector
    }

    /// Classify a chunk of output. `current_line` is the cursor line after the
    /// chunk was written; earlier lines of the chunk sit above it.
    pub fn process_output(&mut self, chunk: &str, current_line: usize) -> Vec<CommandEvent> {
        let text = strip_ansi(chunk);
        let segments: Vec<&str> = text.split('\n').collect();
        let last = segments.len() - 1;
        let mut events = Vec::new();

        for (i, raw) in segments.iter().enumerate() {
            let line = raw.replace('\r', "");
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = current_line.saturating_sub(last - i);

            if let Some(pattern) = self.matching_prompt(line) {
                tracing::debug!(line = line_no, pattern, "prompt");
                if self.in_command {
                    events.push(CommandEvent::CommandEnd {
                        line: line_no,
                        exit_code: None,
                    });
                    self.finish_command();
                }
                events.push(CommandEvent::PromptDetected { line: line_no });
                self.last_prompt_line = Some(line_no);
                continue;
            }

            if let Some(prompt_line) = self.last_prompt_line {
                if !self.in_command && self.is_likely_command(line) {
                    tracing::debug!(line = prompt_line, command = line, "command start");
                    events.push(CommandEvent::CommandStart {
                        line: prompt_line,
                        command: line.to_string(),
                    });
                    self.begin_command(prompt_line, line);
                }
            }
        }

        events
    }

    /// Custom patterns first, then the built-ins.
    pub fn is_prompt_line(&self, line: &str) -> bool {
        self.matching_prompt(line).is_some()
    }

    /// Which pattern matched: the source of a custom pattern or the name of
    /// a built-in one.
    pub fn matching_prompt(&self, line: &str) -> Option<&str> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Some(custom) = self.custom.iter().find(|p| p.regex.is_match(line)) {
            return Some(custom.source.as_str());
        }
        builtin_prompts()
            .iter()
            .find(|p| p.regex.is_match(line))
            .map(|p| p.name)
    }

    pub fn is_likely_command(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }

        let len = trimmed.chars().count();
        if len > self.config.max_command_length {
            return false;
        }

        let lower = trimmed.to_lowercase();
        if OUTPUT_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return false;
        }

        let first = trimmed.split_whitespace().next().unwrap_or("");
        if COMMAND_VERBS.contains(&first) || PATH_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            return true;
        }

        if trimmed.contains(SHELL_METACHARS) {
            return true;
        }

        if len <= self.config.short_command_length && !trimmed.contains(char::is_whitespace) {
            return true;
        }

        len < self.config.default_accept_length
    }

    // ── Escape hatches ───────────────────────────────────────────

    /// Force a command start (e.g. OSC 133;C). A command still in progress
    /// is ended first.
    pub fn mark_command_start(&mut self, line: usize, command: impl Into<String>) -> Vec<CommandEvent> {
        let mut events = Vec::new();
        if self.in_command {
            events.push(CommandEvent::CommandEnd {
                line,
                exit_code: None,
            });
            self.finish_command();
        }
        let command = command.into();
        events.push(CommandEvent::CommandStart {
            line,
            command: command.clone(),
        });
        self.begin_command(line, &command);
        events
    }

    /// Force a command end with a known exit code. `None` if nothing was running.
    pub fn mark_command_end(&mut self, line: usize, exit_code: Option<i32>) -> Option<CommandEvent> {
        if !self.in_command {
            return None;
        }
        self.finish_command();
        Some(CommandEvent::CommandEnd { line, exit_code })
    }

    // ── Custom prompt patterns ───────────────────────────────────

    pub fn add_prompt_pattern(&mut self, pattern: &str) -> Result<(), DetectorError> {
        if self.custom.iter().any(|p| p.source == pattern) {
            return Ok(());
        }
        let regex = Regex::new(pattern).map_err(|source| DetectorError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.custom.push(CustomPrompt {
            source: pattern.to_string(),
            regex,
        });
        Ok(())
    }

    pub fn remove_prompt_pattern(&mut self, pattern: &str) -> bool {
        let before = self.custom.len();
        self.custom.retain(|p| p.source != pattern);
        self.custom.len() != before
    }

    pub fn clear_prompt_patterns(&mut self) {
        self.custom.clear();
    }

    pub fn custom_patterns(&self) -> Vec<&str> {
        self.custom.iter().map(|p| p.source.as_str()).collect()
    }

    // ── State ────────────────────────────────────────────────────

    /// Back to idle. Custom patterns are kept.
    pub fn reset(&mut self) {
        self.last_prompt_line = None;
        self.in_command = false;
        self.command_start_line = None;
        self.current_command = None;
    }

    pub fn state(&self) -> DetectorState {
        if self.in_command {
            DetectorState::InCommand
        } else if self.last_prompt_line.is_some() {
            DetectorState::PromptSeen
        } else {
            DetectorState::Idle
        }
    }

    pub fn last_prompt_line(&self) -> Option<usize> {
        self.last_prompt_line
    }

    pub fn command_start_line(&self) -> Option<usize> {
        self.command_start_line
    }

    pub fn current_command(&self) -> Option<&str> {
        self.current_command.as_deref()
    }

    fn begin_command(&mut self, line: usize, command: &str) {
        self.in_command = true;
        self.command_start_line = Some(line);
        self.current_command = Some(command.to_string());
    }

    fn finish_command(&mut self) {
        self.in_command = false;
        self.command_start_line = None;
        self.current_command = None;
    }
}
