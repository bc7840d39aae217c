//! Terminal-emulator contract.
//!
//! The registry never talks to a concrete emulator. It needs:
//! - output written in, and the absolute cursor line
//! - markers: line anchors that follow scrolling and report their own disposal
//! - decorations: sized regions bound to a marker, rendered asynchronously
//! - scrolling to a buffer line
//!
//! Lines are indices into the scroll buffer (0 = oldest retained line).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type MarkerId = u64;
pub type DecorationId = u64;

/// How a decoration shares rows with buffer content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Pushes subsequent buffer content down.
    Inline,
    /// Drawn over buffer content.
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecorationOptions {
    pub height_rows: u16,
    pub placement: Placement,
}

/// Backing region of a rendered decoration (the DOM node in a browser host).
#[derive(Clone)]
pub struct Container {
    id: u64,
    decoration: DecorationId,
    options: DecorationOptions,
    lines: Rc<RefCell<Vec<String>>>,
}

impl Container {
    pub fn new(id: u64, decoration: DecorationId, options: DecorationOptions) -> Self {
        Self {
            id,
            decoration,
            options,
            lines: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn decoration(&self) -> DecorationId {
        self.decoration
    }

    pub fn height_rows(&self) -> u16 {
        self.options.height_rows
    }

    pub fn placement(&self) -> Placement {
        self.options.placement
    }

    /// Replace the rendered text. Lines beyond the region height are kept;
    /// clipping is the host's business.
    pub fn set_lines(&self, lines: Vec<String>) {
        *self.lines.borrow_mut() = lines;
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn text(&self) -> String {
        self.lines.borrow().join("\n")
    }

    pub fn clear(&self) {
        self.lines.borrow_mut().clear();
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("decoration", &self.decoration)
            .field("height_rows", &self.options.height_rows)
            .field("placement", &self.options.placement)
            .finish()
    }
}

/// What a terminal emulator must provide to host anchored blocks.
///
/// Implementations call listeners without holding internal borrows, so a
/// listener may call back into the host.
pub trait TerminalHost {
    /// Feed PTY output to the emulator.
    fn write_output(&self, text: &str);

    /// Absolute buffer line of the cursor.
    fn cursor_line(&self) -> usize;

    /// Anchor a marker `cursor_offset` lines from the cursor line.
    /// `None` if the target line is outside the buffer.
    fn register_marker(&self, cursor_offset: isize) -> Option<MarkerId>;

    /// Absolute buffer line of a live marker.
    fn marker_line(&self, marker: MarkerId) -> Option<usize>;

    /// Fires once when the marker is disposed, explicitly or by eviction.
    fn on_marker_disposed(&self, marker: MarkerId, listener: Box<dyn FnOnce()>);

    fn dispose_marker(&self, marker: MarkerId);

    fn register_decoration(
        &self,
        marker: MarkerId,
        options: DecorationOptions,
    ) -> Option<DecorationId>;

    /// Fires whenever the decoration is rendered into a container.
    fn on_decoration_rendered(&self, decoration: DecorationId, listener: Box<dyn Fn(&Container)>);

    fn dispose_decoration(&self, decoration: DecorationId);

    /// `line` is absolute, as returned by `cursor_line`/`marker_line`.
    fn scroll_to_line(&self, line: usize);
}
