//! In-memory terminal host.
//!
//! Keeps a line buffer of `rows + scrollback` lines. Writing past that trims
//! the oldest lines; markers on trimmed lines are disposed, together with
//! their decorations. Decorations get a container only on `render()`, so
//! readiness always comes after registration.
//!
//! Line numbers are absolute: they count trimmed lines too, so a number
//! handed out once keeps naming the same line.
//!
//! Escape sequences are stripped on write; cursor movement is not emulated
//! (the cursor is always at the end of the last line).

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::config::TerminalConfig;
use crate::detector::strip_ansi;
use crate::host::{Container, DecorationId, DecorationOptions, MarkerId, TerminalHost};

struct MarkerSlot {
    /// Absolute line: counts trimmed lines too, so it never moves.
    abs_line: usize,
    on_dispose: Vec<Box<dyn FnOnce()>>,
}

struct DecorationSlot {
    marker: MarkerId,
    options: DecorationOptions,
    container: Option<Container>,
    on_render: Vec<Rc<dyn Fn(&Container)>>,
}

struct Buffer {
    rows: usize,
    scrollback: usize,
    lines: VecDeque<String>,
    trimmed: usize,
    markers: HashMap<MarkerId, MarkerSlot>,
    decorations: HashMap<DecorationId, DecorationSlot>,
    next_id: u64,
    scrolled_to: Option<usize>,
}

impl Buffer {
    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Absolute: trimmed lines keep counting, so line numbers never shift.
    fn cursor_line(&self) -> usize {
        self.trimmed + self.lines.len() - 1
    }

    fn index_of(&self, abs_line: usize) -> Option<usize> {
        let index = abs_line.checked_sub(self.trimmed)?;
        (index < self.lines.len()).then_some(index)
    }

    /// Remove a marker and every decoration bound to it; hand back the
    /// dispose listeners so they run after the borrow is released.
    fn drop_marker(&mut self, marker: MarkerId) -> Vec<Box<dyn FnOnce()>> {
        let Some(slot) = self.markers.remove(&marker) else {
            return Vec::new();
        };
        self.decorations.retain(|_, d| d.marker != marker);
        slot.on_dispose
    }

    fn trim_history(&mut self) -> Vec<Box<dyn FnOnce()>> {
        let capacity = self.rows + self.scrollback;
        while self.lines.len() > capacity {
            self.lines.pop_front();
            self.trimmed += 1;
        }

        let trimmed = self.trimmed;
        let evicted: Vec<MarkerId> = self
            .markers
            .iter()
            .filter(|(_, m)| m.abs_line < trimmed)
            .map(|(id, _)| *id)
            .collect();

        let mut listeners = Vec::new();
        for id in evicted {
            tracing::debug!(marker = id, "marker evicted from scrollback");
            listeners.extend(self.drop_marker(id));
        }
        listeners
    }
}

pub struct HeadlessTerminal {
    buffer: RefCell<Buffer>,
}

impl HeadlessTerminal {
    pub fn new(rows: usize, scrollback: usize) -> Self {
        let mut lines = VecDeque::new();
        lines.push_back(String::new());
        Self {
            buffer: RefCell::new(Buffer {
                rows: rows.max(1),
                scrollback,
                lines,
                trimmed: 0,
                markers: HashMap::new(),
                decorations: HashMap::new(),
                next_id: 1,
                scrolled_to: None,
            }),
        }
    }

    pub fn from_config(config: &TerminalConfig) -> Self {
        Self::new(config.rows, config.scrollback)
    }

    /// Append output. `\n` starts a new line, `\r` is dropped.
    pub fn write(&self, text: &str) {
        let clean = strip_ansi(text);
        let listeners = {
            let mut buf = self.buffer.borrow_mut();
            for ch in clean.chars() {
                match ch {
                    '\n' => buf.lines.push_back(String::new()),
                    '\r' => {}
                    c => {
                        if let Some(last) = buf.lines.back_mut() {
                            last.push(c);
                        }
                    }
                }
            }
            buf.trim_history()
        };
        for listener in listeners {
            listener();
        }
    }

    /// Materialise containers for decorations that do not have one yet and
    /// notify their render listeners. Returns how many were rendered.
    pub fn render(&self) -> usize {
        let pending: Vec<(Container, Vec<Rc<dyn Fn(&Container)>>)> = {
            let mut buf = self.buffer.borrow_mut();
            let ids: Vec<DecorationId> = buf
                .decorations
                .iter()
                .filter(|(_, d)| d.container.is_none())
                .map(|(id, _)| *id)
                .collect();

            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                let container_id = buf.alloc_id();
                if let Some(slot) = buf.decorations.get_mut(&id) {
                    let container = Container::new(container_id, id, slot.options);
                    slot.container = Some(container.clone());
                    out.push((container, slot.on_render.clone()));
                }
            }
            out
        };

        let count = pending.len();
        for (container, listeners) in pending {
            for listener in listeners {
                listener(&container);
            }
        }
        count
    }

    /// Text of an absolute line; `None` once it has been trimmed.
    pub fn line_text(&self, line: usize) -> Option<String> {
        let buf = self.buffer.borrow();
        buf.index_of(line).and_then(|i| buf.lines.get(i).cloned())
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.borrow().lines.len()
    }

    /// Number of lines evicted from history so far.
    pub fn trimmed_lines(&self) -> usize {
        self.buffer.borrow().trimmed
    }

    /// Last absolute line passed to `scroll_to_line`.
    pub fn scrolled_to(&self) -> Option<usize> {
        self.buffer.borrow().scrolled_to
    }

    pub fn live_markers(&self) -> usize {
        self.buffer.borrow().markers.len()
    }

    pub fn live_decorations(&self) -> usize {
        self.buffer.borrow().decorations.len()
    }

    pub fn container(&self, decoration: DecorationId) -> Option<Container> {
        self.buffer
            .borrow()
            .decorations
            .get(&decoration)
            .and_then(|d| d.container.clone())
    }
}

impl TerminalHost for HeadlessTerminal {
    fn write_output(&self, text: &str) {
        self.write(text);
    }

    fn cursor_line(&self) -> usize {
        self.buffer.borrow().cursor_line()
    }

    fn register_marker(&self, cursor_offset: isize) -> Option<MarkerId> {
        let mut buf = self.buffer.borrow_mut();
        let abs_line = buf.cursor_line().checked_add_signed(cursor_offset)?;
        buf.index_of(abs_line)?;
        let id = buf.alloc_id();
        buf.markers.insert(
            id,
            MarkerSlot {
                abs_line,
                on_dispose: Vec::new(),
            },
        );
        Some(id)
    }

    fn marker_line(&self, marker: MarkerId) -> Option<usize> {
        let buf = self.buffer.borrow();
        buf.markers.get(&marker).map(|m| m.abs_line)
    }

    fn on_marker_disposed(&self, marker: MarkerId, listener: Box<dyn FnOnce()>) {
        // Already gone: fire right away.
        let unregistered = {
            let mut buf = self.buffer.borrow_mut();
            match buf.markers.get_mut(&marker) {
                Some(slot) => {
                    slot.on_dispose.push(listener);
                    None
                }
                None => Some(listener),
            }
        };
        if let Some(listener) = unregistered {
            listener();
        }
    }

    fn dispose_marker(&self, marker: MarkerId) {
        let listeners = self.buffer.borrow_mut().drop_marker(marker);
        for listener in listeners {
            listener();
        }
    }

    fn register_decoration(
        &self,
        marker: MarkerId,
        options: DecorationOptions,
    ) -> Option<DecorationId> {
        let mut buf = self.buffer.borrow_mut();
        if !buf.markers.contains_key(&marker) {
            return None;
        }
        let id = buf.alloc_id();
        buf.decorations.insert(
            id,
            DecorationSlot {
                marker,
                options,
                container: None,
                on_render: Vec::new(),
            },
        );
        Some(id)
    }

    fn on_decoration_rendered(&self, decoration: DecorationId, listener: Box<dyn Fn(&Container)>) {
        if let Some(slot) = self.buffer.borrow_mut().decorations.get_mut(&decoration) {
            slot.on_render.push(Rc::from(listener));
        }
    }

    fn dispose_decoration(&self, decoration: DecorationId) {
        self.buffer.borrow_mut().decorations.remove(&decoration);
    }

    fn scroll_to_line(&self, line: usize) {
        self.buffer.borrow_mut().scrolled_to = Some(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Placement;
    use std::cell::Cell;

    fn opts() -> DecorationOptions {
        DecorationOptions {
            height_rows: 2,
            placement: Placement::Inline,
        }
    }

    #[test]
    fn test_write_tracks_cursor_line() {
        let term = HeadlessTerminal::new(5, 0);
        term.write("a\nb\nc");
        assert_eq!(term.cursor_line(), 2);
        assert_eq!(term.line_text(1).as_deref(), Some("b"));
    }

    #[test]
    fn test_marker_follows_trimming_then_is_disposed() {
        let term = HeadlessTerminal::new(2, 1);
        term.write("one\ntwo");
        let marker = term.register_marker(-1).unwrap();
        assert_eq!(term.marker_line(marker), Some(0));

        let disposed = Rc::new(Cell::new(false));
        let flag = disposed.clone();
        term.on_marker_disposed(marker, Box::new(move || flag.set(true)));

        term.write("\nthree");
        assert_eq!(term.marker_line(marker), Some(0));
        assert!(!disposed.get());

        term.write("\nfour\nfive");
        assert!(disposed.get());
        assert_eq!(term.marker_line(marker), None);
    }

    #[test]
    fn test_render_fires_once_per_decoration() {
        let term = HeadlessTerminal::new(5, 0);
        let marker = term.register_marker(0).unwrap();
        let deco = term.register_decoration(marker, opts()).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        term.on_decoration_rendered(deco, Box::new(move |_| c.set(c.get() + 1)));

        assert!(term.container(deco).is_none());
        assert_eq!(term.render(), 1);
        assert_eq!(term.render(), 0);
        assert_eq!(count.get(), 1);
        assert_eq!(term.container(deco).unwrap().height_rows(), 2);
    }

    #[test]
    fn test_lines_stay_absolute_after_trimming() {
        let term = HeadlessTerminal::new(2, 0);
        term.write("a\nb\nc\nd");
        assert_eq!(term.cursor_line(), 3);
        assert_eq!(term.line_text(3).as_deref(), Some("d"));

        let marker = term.register_marker(-1).unwrap();
        assert_eq!(term.marker_line(marker), Some(2));
        // Line 1 ("b") is gone.
        assert!(term.register_marker(-2).is_none());
        assert_eq!(term.line_text(1), None);
    }

    #[test]
    fn test_marker_outside_buffer_is_rejected() {
        let term = HeadlessTerminal::new(5, 0);
        assert!(term.register_marker(-1).is_none());
        assert!(term.register_marker(1).is_none());
    }

    #[test]
    fn test_disposing_marker_drops_decorations() {
        let term = HeadlessTerminal::new(5, 0);
        let marker = term.register_marker(0).unwrap();
        term.register_decoration(marker, opts()).unwrap();
        term.dispose_marker(marker);
        assert_eq!(term.live_decorations(), 0);
        assert_eq!(term.live_markers(), 0);
    }
}
