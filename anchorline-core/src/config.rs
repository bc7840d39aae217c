//! Runtime configuration.
//!
//! Every field has a default, so a partial (or absent) `config.json` works.
//! Location: the platform config dir from `directories`, e.g.
//! `~/.config/anchorline/config.json`.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::blocks::BlockType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorlineConfig {
    pub detector: DetectorConfig,
    pub layout: LayoutConfig,
    pub terminal: TerminalConfig,
    pub assistant: AssistantConfig,
}

/// Thresholds for the command-likeness heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Lines longer than this are output, never a typed command.
    pub max_command_length: usize,
    /// Lines that pass no specific test are still accepted below this length.
    pub default_accept_length: usize,
    /// Single-word lines up to this length are accepted.
    pub short_command_length: usize,
    /// Extra prompt regexes, checked before the built-ins.
    pub custom_prompts: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_command_length: 200,
            default_accept_length: 100,
            short_command_length: 30,
            custom_prompts: Vec::new(),
        }
    }
}

/// Render-region heights, in terminal rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub command_rows: u16,
    pub ai_prompt_rows: u16,
    pub ai_response_rows: u16,
    pub ai_command_rows: u16,
    pub directory_rows: u16,
    pub status_rows: u16,
    pub session_divider_rows: u16,
    /// Height of the placeholder shown while an AI suggestion is in flight.
    pub loading_rows: u16,
    pub ai_response_min_rows: u16,
    pub ai_response_max_rows: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            command_rows: 2,
            ai_prompt_rows: 2,
            ai_response_rows: 4,
            ai_command_rows: 6,
            directory_rows: 1,
            status_rows: 1,
            session_divider_rows: 1,
            loading_rows: 2,
            ai_response_min_rows: 2,
            ai_response_max_rows: 10,
        }
    }
}

impl LayoutConfig {
    pub fn default_rows(&self, block_type: BlockType) -> u16 {
        match block_type {
            BlockType::Command => self.command_rows,
            BlockType::AiPrompt => self.ai_prompt_rows,
            BlockType::AiResponse => self.ai_response_rows,
            BlockType::AiCommand => self.ai_command_rows,
            BlockType::Directory => self.directory_rows,
            BlockType::Status => self.status_rows,
            BlockType::SessionDivider => self.session_divider_rows,
        }
    }

    /// One row per content line plus a header row, clamped.
    pub fn ai_response_rows_for(&self, content: &str) -> u16 {
        let lines = content.lines().count().max(1);
        let wanted = u16::try_from(lines + 1).unwrap_or(u16::MAX);
        wanted.clamp(self.ai_response_min_rows, self.ai_response_max_rows)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub rows: usize,
    pub scrollback: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            rows: 24,
            scrollback: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub base_url: String,
    pub model: String,
    /// Recent terminal lines sent along with a query.
    pub context_lines: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            context_lines: 20,
        }
    }
}

impl AnchorlineConfig {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "anchorline", "anchorline")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load from the platform config dir; defaults if there is no file.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                tracing::debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_response_rows_clamped() {
        let layout = LayoutConfig::default();
        assert_eq!(layout.ai_response_rows_for("line1\nline2\nline3"), 4);
        assert_eq!(layout.ai_response_rows_for(""), 2);
        let long = vec!["x"; 40].join("\n");
        assert_eq!(layout.ai_response_rows_for(&long), 10);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AnchorlineConfig =
            serde_json::from_str(r#"{"detector": {"max_command_length": 80}}"#).unwrap();
        assert_eq!(config.detector.max_command_length, 80);
        assert_eq!(config.detector.short_command_length, 30);
        assert_eq!(config.layout, LayoutConfig::default());
    }
}
