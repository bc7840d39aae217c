//! Structured command suggestions and local risk checks.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Alternative {
    pub command: String,
    pub description: String,
}

/// What the provider hands back for a natural-language query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommandSuggestion {
    pub command: String,
    pub explanation: String,
    pub is_dangerous: bool,
    pub requires_sudo: bool,
    pub affects_files: Vec<String>,
    pub alternatives: Vec<Alternative>,
    pub warning: Option<String>,
}

impl CommandSuggestion {
    pub fn new(command: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            explanation: explanation.into(),
            ..Default::default()
        }
    }

    /// OR the provider's flags with our own reading of the command. The
    /// provider can only make a suggestion look riskier, never safer.
    pub fn with_local_assessment(mut self) -> Self {
        let risk = assess_command(&self.command);
        self.is_dangerous |= risk.is_dangerous;
        self.requires_sudo |= risk.requires_sudo;
        for file in risk.affects_files {
            if !self.affects_files.contains(&file) {
                self.affects_files.push(file);
            }
        }
        if self.warning.is_none() {
            self.warning = risk.warning;
        }
        self
    }
}

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("empty reply from provider")]
    Empty,
    #[error("reply contains no JSON object")]
    NoJson,
    #[error("malformed suggestion: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("suggestion has no command")]
    MissingCommand,
}

/// Parse a provider reply. Accepts a bare JSON object, one wrapped in a
/// markdown fence, or one surrounded by prose.
pub fn parse_suggestion(reply: &str) -> Result<CommandSuggestion, SuggestionError> {
    let text = reply.trim();
    if text.is_empty() {
        return Err(SuggestionError::Empty);
    }

    let suggestion = match serde_json::from_str::<CommandSuggestion>(text) {
        Ok(s) => s,
        Err(direct) => {
            let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
                return Err(SuggestionError::NoJson);
            };
            if start >= end {
                return Err(SuggestionError::NoJson);
            }
            match text.get(start..=end) {
                Some(slice) => serde_json::from_str::<CommandSuggestion>(slice)?,
                None => return Err(SuggestionError::Malformed(direct)),
            }
        }
    };

    if suggestion.command.trim().is_empty() {
        return Err(SuggestionError::MissingCommand);
    }
    Ok(CommandSuggestion {
        command: suggestion.command.trim().to_string(),
        ..suggestion
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RiskAssessment {
    pub is_dangerous: bool,
    pub requires_sudo: bool,
    pub affects_files: Vec<String>,
    pub warning: Option<String>,
}

static DANGER_REGEX: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn danger_patterns() -> &'static [(Regex, &'static str)] {
    DANGER_REGEX.get_or_init(|| {
        let table: [(&'static str, &'static str); 8] = [
            (r"\brm\s+(-[a-zA-Z]*[rf][a-zA-Z]*\s+)+(/|~|\*|\.)(\s|$)", "Recursively deletes a broad path"),
            (r"\bmkfs(\.\w+)?\b", "Formats a filesystem"),
            (r"\bdd\s+.*\bof=/dev/", "Writes directly to a block device"),
            (r">\s*/dev/(sd|nvme|hd)\w*", "Overwrites a block device"),
            (r":\(\)\s*\{\s*:\|:&\s*\};:", "Fork bomb"),
            (r"\bchmod\s+(-R\s+)?0?777\s+/", "Makes system paths world-writable"),
            (r"\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(ba|z)?sh\b", "Pipes a download into a shell"),
            (r"\b(shutdown|reboot|halt|poweroff)\b", "Stops or restarts the machine"),
        ];
        table
            .iter()
            .map(|&(pattern, why)| (Regex::new(pattern).expect("Invalid Danger Regex"), why))
            .collect()
    })
}

const FILE_VERBS: &[&str] = &["rm", "mv", "cp", "chmod", "chown", "touch"];

/// Cheap, local risk reading of a shell command. Does not parse the shell
/// grammar; pipelines and `;`/`&&` chains are split on their operators.
pub fn assess_command(command: &str) -> RiskAssessment {
    let mut risk = RiskAssessment::default();

    for (re, why) in danger_patterns() {
        if re.is_match(command) {
            risk.is_dangerous = true;
            risk.warning.get_or_insert_with(|| why.to_string());
        }
    }

    for segment in command.split(['|', ';', '&']) {
        let mut words = segment.split_whitespace().peekable();
        if words.peek() == Some(&"sudo") {
            risk.requires_sudo = true;
            words.next();
            while words.peek().is_some_and(|w| w.starts_with('-')) {
                words.next();
            }
        }
        let Some(verb) = words.next() else {
            continue;
        };
        if !FILE_VERBS.contains(&verb) {
            continue;
        }
        let mut operands = words.filter(|w| !w.starts_with('-'));
        // chmod/chown take a mode or owner first.
        if verb == "chmod" || verb == "chown" {
            operands.next();
        }
        for file in operands {
            if !risk.affects_files.iter().any(|f| f == file) {
                risk.affects_files.push(file.to_string());
            }
        }
    }

    if risk.requires_sudo && risk.warning.is_none() {
        risk.warning = Some("Runs with elevated privileges".to_string());
    }
    risk
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let s = parse_suggestion(r#"{"command":"ls -la","explanation":"list"}"#).unwrap();
        assert_eq!(s.command, "ls -la");
        assert!(s.alternatives.is_empty());
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "Sure:\n```json\n{\"command\": \"df -h\", \"explanation\": \"disk\", \"requiresSudo\": false}\n```";
        let s = parse_suggestion(reply).unwrap();
        assert_eq!(s.command, "df -h");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_suggestion("  "), Err(SuggestionError::Empty)));
        assert!(matches!(parse_suggestion("just text"), Err(SuggestionError::NoJson)));
        assert!(matches!(
            parse_suggestion(r#"{"explanation":"no command"}"#),
            Err(SuggestionError::MissingCommand)
        ));
    }

    #[test]
    fn test_assess_rm_rf_root() {
        let r = assess_command("sudo rm -rf /");
        assert!(r.is_dangerous);
        assert!(r.requires_sudo);
        assert_eq!(r.affects_files, vec!["/"]);
    }

    #[test]
    fn test_assess_chmod_skips_mode() {
        let r = assess_command("chmod +x build.sh && ./build.sh");
        assert!(!r.is_dangerous);
        assert_eq!(r.affects_files, vec!["build.sh"]);
    }

    #[test]
    fn test_local_assessment_only_raises_risk() {
        let s = CommandSuggestion {
            is_dangerous: true,
            ..CommandSuggestion::new("ls", "list")
        }
        .with_local_assessment();
        assert!(s.is_dangerous);
        assert!(s.warning.is_none());
    }
}
