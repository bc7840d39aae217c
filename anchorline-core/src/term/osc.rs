use std::borrow::Cow;

/// Shell-integration OSC sequences (streaming, chunk-safe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OscEvent {
    /// OSC 7;file://host/path
    Cwd(String),

    /// OSC 133;A
    PromptStart,

    /// OSC 133;B  end of prompt, user input begins
    InputStart,

    /// OSC 133;C  command is about to run
    CommandExecuted,

    /// OSC 133;D[;<exit>]
    CommandFinished { exit_code: Option<i32> },

    /// OSC 133;E;<cmdline> or OSC 633;E;<cmdline>
    CommandLine(String),

    Unknown(String),
}

impl OscEvent {
    /// True for the OSC 133 / 633 family.
    pub fn is_semantic_mark(&self) -> bool {
        !matches!(self, OscEvent::Cwd(_) | OscEvent::Unknown(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Scan {
    #[default]
    Ground,
    Escape,
    Payload,
    PayloadEscape,
}

/// Streaming OSC parser. Terminators: BEL or ST (`ESC \`). A sequence split
/// across chunks is completed by the next `feed`.
#[derive(Debug, Default, Clone)]
pub struct OscParser {
    scan: Scan,
    payload: Vec<u8>,
}

/// Upper bound for a single payload; longer sequences are dropped.
const MAX_PAYLOAD: usize = 4096;

impl OscParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<OscEvent> {
        let mut out = Vec::new();

        for &b in bytes {
            self.scan = match (self.scan, b) {
                (Scan::Ground, 0x1b) => Scan::Escape,
                (Scan::Ground, 0x9d) => self.begin(),
                (Scan::Ground, _) => Scan::Ground,

                (Scan::Escape, b']') => self.begin(),
                (Scan::Escape, 0x1b) => Scan::Escape,
                (Scan::Escape, _) => Scan::Ground,

                (Scan::Payload, 0x07) => {
                    out.extend(self.finish());
                    Scan::Ground
                }
                (Scan::Payload, 0x1b) => Scan::PayloadEscape,
                (Scan::Payload, _) => self.push(b),

                (Scan::PayloadEscape, b'\\') => {
                    out.extend(self.finish());
                    Scan::Ground
                }
                (Scan::PayloadEscape, b']') => {
                    // Unterminated sequence followed by a new one.
                    self.begin()
                }
                (Scan::PayloadEscape, _) => {
                    self.payload.clear();
                    Scan::Ground
                }
            };
        }

        out
    }

    pub fn reset(&mut self) {
        self.scan = Scan::Ground;
        self.payload.clear();
    }

    fn begin(&mut self) -> Scan {
        self.payload.clear();
        Scan::Payload
    }

    fn push(&mut self, b: u8) -> Scan {
        if self.payload.len() >= MAX_PAYLOAD {
            self.payload.clear();
            return Scan::Ground;
        }
        self.payload.push(b);
        Scan::Payload
    }

    fn finish(&mut self) -> Option<OscEvent> {
        if self.payload.is_empty() {
            return None;
        }
        let event = parse_payload(String::from_utf8_lossy(&self.payload));
        self.payload.clear();
        Some(event)
    }
}

fn parse_payload(payload: Cow<'_, str>) -> OscEvent {
    let s = payload.trim_matches('\0').trim();

    if let Some(rest) = s.strip_prefix("7;") {
        return OscEvent::Cwd(decode_file_uri(rest));
    }

    let marks = s.strip_prefix("133;").or_else(|| s.strip_prefix("633;"));
    if let Some(rest) = marks {
        let mut parts = rest.splitn(2, ';');
        let kind = parts.next().unwrap_or("");
        let arg = parts.next();
        match kind {
            "A" => return OscEvent::PromptStart,
            "B" => return OscEvent::InputStart,
            "C" => return OscEvent::CommandExecuted,
            "D" => {
                let exit_code = arg
                    .and_then(|a| a.split(';').next())
                    .and_then(|code| code.trim().parse::<i32>().ok());
                return OscEvent::CommandFinished { exit_code };
            }
            "E" => {
                let line = arg.map(|a| a.split(';').next().unwrap_or(a)).unwrap_or("");
                return OscEvent::CommandLine(unescape_command_line(line));
            }
            _ => {}
        }
    }

    OscEvent::Unknown(s.to_string())
}

/// `file://host/path` → `/path`, with `%20` decoded. Windows drive paths
/// (`file://host/C:/x`) keep their drive letter.
fn decode_file_uri(uri: &str) -> String {
    let u = uri.trim();
    let path = match u.strip_prefix("file://") {
        Some(rest) => match rest.find('/') {
            Some(idx) => &rest[idx..],
            None => rest,
        },
        None => u,
    };
    let path = path.replace("%20", " ");

    let bytes = path.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'/' && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
        return path[1..].to_string();
    }
    path
}

/// VS Code style escaping: `\\` and `\xNN`.
fn unescape_command_line(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some('x') => {
                chars.next();
                let hex: String = chars.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) => out.push(byte as char),
                    Err(_) => {
                        out.push_str("\\x");
                        out.push_str(&hex);
                    }
                }
            }
            _ => out.push('\\'),
        }
    }
    out
}
