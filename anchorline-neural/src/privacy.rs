use regex::Regex;
use std::sync::OnceLock;

/// Redacts secrets and PII from a query (and its terminal context) before it
/// leaves the machine.
pub struct PrivacyGuard;

struct Rule {
    regex: Regex,
    replacement: &'static str,
}

static RULES: OnceLock<Vec<Rule>> = OnceLock::new();

fn rules() -> &'static [Rule] {
    RULES.get_or_init(|| {
        // Order matters: URL credentials before emails, assignments before
        // the generic key rule so `TOKEN=sk-...` keeps its name.
        let table: [(&'static str, &'static str); 6] = [
            (r"://[^/\s:@]+:[^/\s@]+@", "://[REDACTED_AUTH]@"),
            (
                r"(?i)\b(password|passwd|pwd|secret|token|api[_-]?key)(\s*[=:]\s*)\S+",
                "${1}${2}[REDACTED_SECRET]",
            ),
            (r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]{16,}", "Bearer [REDACTED_KEY]"),
            (r"\b(sk-[a-zA-Z0-9]{20,}|gh[pousr]_[a-zA-Z0-9]{20,}|AKIA[0-9A-Z]{16})\b", "[REDACTED_KEY]"),
            (
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                "[REDACTED_EMAIL]",
            ),
            (r"\b(?:\d{1,3}\.){3}\d{1,3}\b", "[REDACTED_IP]"),
        ];
        table
            .iter()
            .map(|&(pattern, replacement)| Rule {
                regex: Regex::new(pattern).expect("Invalid Privacy Regex"),
                replacement,
            })
            .collect()
    })
}

impl PrivacyGuard {
    pub fn scrub(input: &str) -> String {
        rules().iter().fold(input.to_string(), |text, rule| {
            rule.regex.replace_all(&text, rule.replacement).into_owned()
        })
    }

    /// Keep the last `limit` lines of terminal context, scrubbed.
    pub fn scrub_context(lines: &[String], limit: usize) -> Vec<String> {
        let start = lines.len().saturating_sub(limit);
        lines[start..].iter().map(|l| Self::scrub(l)).collect()
    }

    pub fn contains_sensitive(input: &str) -> bool {
        rules().iter().any(|rule| rule.regex.is_match(input))
    }
}
