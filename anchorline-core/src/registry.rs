//! Block registry (the injector).
//!
//! Owns every live block: one marker, one decoration and the current data
//! per block id. Three notification channels:
//! - container ready: the decoration got its backing container (once)
//! - updated: data changed
//! - removed: block is gone (explicitly, by eviction, or on dispose)
//!
//! Nothing here returns an error or panics. Missing terminal or unknown ids
//! are logged and turned into `None` / `false`; this runs on the terminal
//! data path.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::blocks::{Block, BlockData, BlockId, BlockPatch, BlockType};
use crate::config::LayoutConfig;
use crate::events::{ListenerList, Subscription};
use crate::host::{Container, DecorationId, DecorationOptions, MarkerId, Placement, TerminalHost};

#[derive(Debug, Clone, PartialEq)]
pub struct BlockHandle {
    pub id: BlockId,
    pub block_type: BlockType,
    pub marker: MarkerId,
    pub decoration: DecorationId,
    pub height_rows: u16,
    pub placement: Placement,
}

#[derive(Debug, Clone)]
pub struct CreateBlockOptions {
    pub block_type: BlockType,
    /// Defaults to the layout height for the type.
    pub height_rows: Option<u16>,
    /// Overrides applied on top of the type defaults.
    pub data: Option<BlockPatch>,
    /// Relative to the cursor line; defaults to 0.
    pub cursor_line_offset: Option<isize>,
}

impl CreateBlockOptions {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            height_rows: None,
            data: None,
            cursor_line_offset: None,
        }
    }

    pub fn height(mut self, rows: u16) -> Self {
        self.height_rows = Some(rows);
        self
    }

    pub fn data(mut self, patch: impl Into<BlockPatch>) -> Self {
        self.data = Some(patch.into());
        self
    }

    pub fn cursor_offset(mut self, offset: isize) -> Self {
        self.cursor_line_offset = Some(offset);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ContainerReady {
    pub handle: BlockHandle,
    pub container: Container,
    pub block: Block,
}

#[derive(Debug, Clone)]
pub struct BlockUpdated {
    pub block: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    Explicit,
    /// The marker died first, e.g. its line was trimmed from scrollback.
    AnchorDisposed,
    RegistryDisposed,
}

#[derive(Debug, Clone)]
pub struct BlockRemoved {
    pub id: BlockId,
    pub block_type: BlockType,
    pub cause: RemovalCause,
}

struct Entry {
    handle: BlockHandle,
    block: Block,
    ready: bool,
}

pub struct BlockRegistry {
    me: Weak<BlockRegistry>,
    host: RefCell<Option<Rc<dyn TerminalHost>>>,
    layout: LayoutConfig,
    entries: RefCell<HashMap<BlockId, Entry>>,
    order: RefCell<Vec<BlockId>>,
    container_ready: ListenerList<ContainerReady>,
    updated: ListenerList<BlockUpdated>,
    removed: ListenerList<BlockRemoved>,
}

impl BlockRegistry {
    pub fn new(layout: LayoutConfig) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            host: RefCell::new(None),
            layout,
            entries: RefCell::new(HashMap::new()),
            order: RefCell::new(Vec::new()),
            container_ready: ListenerList::new("container-ready"),
            updated: ListenerList::new("block-updated"),
            removed: ListenerList::new("block-removed"),
        })
    }

    pub fn attach(&self, host: Rc<dyn TerminalHost>) {
        *self.host.borrow_mut() = Some(host);
    }

    pub fn is_attached(&self) -> bool {
        self.host.borrow().is_some()
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    fn host(&self) -> Option<Rc<dyn TerminalHost>> {
        self.host.borrow().clone()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Anchor a new block. `None` if no terminal is attached (or the host
    /// refuses the anchor). The container is not usable until the
    /// container-ready notification fires.
    pub fn create_block(&self, options: CreateBlockOptions) -> Option<BlockHandle> {
        let Some(host) = self.host() else {
            tracing::error!(
                block_type = %options.block_type,
                "create_block called before a terminal was attached"
            );
            return None;
        };

        let block_type = options.block_type;
        let height_rows = options
            .height_rows
            .unwrap_or_else(|| self.layout.default_rows(block_type))
            .max(1);
        let placement = if block_type.is_interactive() {
            Placement::Inline
        } else {
            Placement::Overlay
        };
        let offset = options.cursor_line_offset.unwrap_or(0);

        let Some(marker) = host.register_marker(offset) else {
            tracing::warn!(%block_type, offset, "terminal refused marker");
            return None;
        };
        let decoration_options = DecorationOptions {
            height_rows,
            placement,
        };
        let Some(decoration) = host.register_decoration(marker, decoration_options) else {
            tracing::warn!(%block_type, marker, "terminal refused decoration");
            host.dispose_marker(marker);
            return None;
        };

        let mut id = BlockId::generate();
        while self.entries.borrow().contains_key(&id) {
            id = BlockId::generate();
        }

        let mut block = Block::new(id.clone(), BlockData::defaults(block_type));
        if let Some(patch) = &options.data {
            if !block.apply(patch) {
                tracing::warn!(block_id = %id, %block_type, "seed data is for another block type; ignored");
            }
        }

        let handle = BlockHandle {
            id: id.clone(),
            block_type,
            marker,
            decoration,
            height_rows,
            placement,
        };

        self.entries.borrow_mut().insert(
            id.clone(),
            Entry {
                handle: handle.clone(),
                block,
                ready: false,
            },
        );
        self.order.borrow_mut().push(id.clone());

        let me = self.me.clone();
        let ready_id = id.clone();
        host.on_decoration_rendered(
            decoration,
            Box::new(move |container| {
                if let Some(registry) = me.upgrade() {
                    registry.handle_rendered(&ready_id, container);
                }
            }),
        );

        let me = self.me.clone();
        let disposed_id = id.clone();
        host.on_marker_disposed(
            marker,
            Box::new(move || {
                if let Some(registry) = me.upgrade() {
                    registry.finalize_removal(&disposed_id, RemovalCause::AnchorDisposed);
                }
            }),
        );

        tracing::debug!(block_id = %id, %block_type, height_rows, "block created");
        Some(handle)
    }

    /// Shallow-merge `patch` into the stored data and notify. Unknown ids and
    /// patches for another block type are logged no-ops.
    pub fn update_block(&self, id: &BlockId, patch: impl Into<BlockPatch>) -> bool {
        let patch = patch.into();
        let event = {
            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries.get_mut(id) else {
                tracing::warn!(block_id = %id, "update for unknown block");
                return false;
            };
            if !entry.block.apply(&patch) {
                tracing::warn!(
                    block_id = %id,
                    block_type = %entry.handle.block_type,
                    "patch does not match block type"
                );
                return false;
            }
            BlockUpdated {
                block: entry.block.clone(),
            }
        };
        self.updated.emit(&event);
        true
    }

    /// Safe to call repeatedly; only the first call notifies.
    pub fn remove_block(&self, id: &BlockId) -> bool {
        self.finalize_removal(id, RemovalCause::Explicit)
    }

    /// Single cleanup path for explicit removal, anchor disposal and dispose.
    /// The record is gone before any host call or notification, so a
    /// re-entrant call for the same id is a no-op.
    fn finalize_removal(&self, id: &BlockId, cause: RemovalCause) -> bool {
        let removed = self.entries.borrow_mut().remove(id);
        let Some(entry) = removed else {
            return false;
        };
        self.order.borrow_mut().retain(|other| other != id);

        if let Some(host) = self.host() {
            host.dispose_decoration(entry.handle.decoration);
            host.dispose_marker(entry.handle.marker);
        }

        tracing::debug!(block_id = %id, ?cause, "block removed");
        self.removed.emit(&BlockRemoved {
            id: id.clone(),
            block_type: entry.handle.block_type,
            cause,
        });
        true
    }

    fn handle_rendered(&self, id: &BlockId, container: &Container) {
        let event = {
            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries.get_mut(id) else {
                return;
            };
            if entry.ready {
                return;
            }
            entry.ready = true;
            ContainerReady {
                handle: entry.handle.clone(),
                container: container.clone(),
                block: entry.block.clone(),
            }
        };
        self.container_ready.emit(&event);
    }

    /// Remove every block (each one notifies), then drop all listeners and
    /// the terminal. Call before the terminal itself is torn down.
    pub fn dispose(&self) {
        let ids: Vec<BlockId> = self.order.borrow().clone();
        for id in &ids {
            self.finalize_removal(id, RemovalCause::RegistryDisposed);
        }
        self.entries.borrow_mut().clear();
        self.order.borrow_mut().clear();
        self.container_ready.clear();
        self.updated.clear();
        self.removed.clear();
        *self.host.borrow_mut() = None;
        tracing::debug!(blocks = ids.len(), "registry disposed");
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn get_block(&self, id: &BlockId) -> Option<Block> {
        self.entries.borrow().get(id).map(|e| e.block.clone())
    }

    pub fn get_handle(&self, id: &BlockId) -> Option<BlockHandle> {
        self.entries.borrow().get(id).map(|e| e.handle.clone())
    }

    /// All blocks in creation order.
    pub fn get_all_blocks(&self) -> Vec<Block> {
        let entries = self.entries.borrow();
        self.order
            .borrow()
            .iter()
            .filter_map(|id| entries.get(id).map(|e| e.block.clone()))
            .collect()
    }

    pub fn get_blocks_by_type(&self, block_type: BlockType) -> Vec<Block> {
        self.get_all_blocks()
            .into_iter()
            .filter(|b| b.block_type() == block_type)
            .collect()
    }

    pub fn is_ready(&self, id: &BlockId) -> bool {
        self.entries.borrow().get(id).map(|e| e.ready).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Absolute buffer line of the block's anchor.
    pub fn block_line(&self, id: &BlockId) -> Option<usize> {
        let marker = self.entries.borrow().get(id).map(|e| e.handle.marker)?;
        self.host()?.marker_line(marker)
    }

    /// Scroll the terminal to the block's anchor. False if the block, its
    /// anchor or the terminal is gone.
    pub fn scroll_to_block(&self, id: &BlockId) -> bool {
        let Some(host) = self.host() else {
            return false;
        };
        let Some(marker) = self.entries.borrow().get(id).map(|e| e.handle.marker) else {
            return false;
        };
        match host.marker_line(marker) {
            Some(line) => {
                host.scroll_to_line(line);
                true
            }
            None => false,
        }
    }

    // ── Subscriptions ────────────────────────────────────────────

    pub fn on_container_ready(&self, listener: impl Fn(&ContainerReady) + 'static) -> Subscription {
        self.container_ready.subscribe(listener)
    }

    pub fn on_block_updated(&self, listener: impl Fn(&BlockUpdated) + 'static) -> Subscription {
        self.updated.subscribe(listener)
    }

    pub fn on_block_removed(&self, listener: impl Fn(&BlockRemoved) + 'static) -> Subscription {
        self.removed.subscribe(listener)
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("attached", &self.is_attached())
            .field("blocks", &self.len())
            .finish()
    }
}
