//! Reactive view over block data: ordered blocks, collapsed set, focus.
//!
//! Every mutation bumps a revision published on a `watch` channel, so UI code
//! can `changed().await` instead of polling.

use std::collections::{HashMap, HashSet};

use tokio::sync::watch;

use crate::blocks::{Block, BlockId, BlockPatch, BlockType, CommandStatus};

#[derive(Debug)]
pub struct BlockStore {
    blocks: HashMap<BlockId, Block>,
    /// Insertion order; ties on timestamp keep this order.
    order: Vec<BlockId>,
    collapsed: HashSet<BlockId>,
    focused: Option<BlockId>,
    revision: watch::Sender<u64>,
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            blocks: HashMap::new(),
            order: Vec::new(),
            collapsed: HashSet::new(),
            focused: None,
            revision,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn sync_collapsed(&mut self, id: &BlockId) {
        match self.blocks.get(id) {
            Some(block) if block.is_collapsed => {
                self.collapsed.insert(id.clone());
            }
            _ => {
                self.collapsed.remove(id);
            }
        }
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Insert, or replace an existing block with the same id (keeping its
    /// position).
    pub fn add_block(&mut self, block: Block) {
        let id = block.id.clone();
        if self.blocks.insert(id.clone(), block).is_none() {
            self.order.push(id.clone());
        }
        self.sync_collapsed(&id);
        self.bump();
    }

    pub fn update_block(&mut self, id: &BlockId, patch: &BlockPatch) -> bool {
        let Some(block) = self.blocks.get_mut(id) else {
            tracing::warn!(block_id = %id, "store update for unknown block");
            return false;
        };
        if !block.apply(patch) {
            return false;
        }
        self.sync_collapsed(id);
        self.bump();
        true
    }

    /// Clears focus if the removed block held it.
    pub fn remove_block(&mut self, id: &BlockId) -> Option<Block> {
        let removed = self.blocks.remove(id)?;
        self.order.retain(|other| other != id);
        self.collapsed.remove(id);
        if self.focused.as_ref() == Some(id) {
            self.focused = None;
        }
        self.bump();
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.order.clear();
        self.collapsed.clear();
        self.focused = None;
        self.bump();
    }

    /// Flip the collapsed flag; returns the new state.
    pub fn toggle_collapse(&mut self, id: &BlockId) -> Option<bool> {
        let next = !self.blocks.get(id)?.is_collapsed;
        self.set_collapsed(id, next);
        Some(next)
    }

    pub fn set_collapsed(&mut self, id: &BlockId, collapsed: bool) -> bool {
        let Some(block) = self.blocks.get_mut(id) else {
            return false;
        };
        block.is_collapsed = collapsed;
        self.sync_collapsed(id);
        self.bump();
        true
    }

    pub fn collapse_all(&mut self) {
        for block in self.blocks.values_mut() {
            block.is_collapsed = true;
        }
        self.collapsed = self.blocks.keys().cloned().collect();
        self.bump();
    }

    pub fn expand_all(&mut self) {
        for block in self.blocks.values_mut() {
            block.is_collapsed = false;
        }
        self.collapsed.clear();
        self.bump();
    }

    // ── Focus ────────────────────────────────────────────────────

    /// Any id is accepted, known or not.
    pub fn set_focus(&mut self, id: Option<BlockId>) {
        self.focused = id;
        self.bump();
    }

    pub fn focused(&self) -> Option<&BlockId> {
        self.focused.as_ref()
    }

    /// Next block in display order, wrapping to the first. With nothing
    /// focused (or an unknown id focused) the first block is picked.
    pub fn focus_next(&mut self) -> Option<BlockId> {
        let ids = self.ordered_ids();
        if ids.is_empty() {
            return None;
        }
        let next = match self.focused_index(&ids) {
            Some(i) => (i + 1) % ids.len(),
            None => 0,
        };
        let id = ids[next].clone();
        self.set_focus(Some(id.clone()));
        Some(id)
    }

    /// Previous block, wrapping to the last.
    pub fn focus_previous(&mut self) -> Option<BlockId> {
        let ids = self.ordered_ids();
        if ids.is_empty() {
            return None;
        }
        let n = ids.len();
        let prev = match self.focused_index(&ids) {
            Some(i) => (i + n - 1) % n,
            None => n - 1,
        };
        let id = ids[prev].clone();
        self.set_focus(Some(id.clone()));
        Some(id)
    }

    fn focused_index(&self, ids: &[BlockId]) -> Option<usize> {
        let focused = self.focused.as_ref()?;
        ids.iter().position(|id| id == focused)
    }

    // ── Derived views ────────────────────────────────────────────

    fn ordered_ids(&self) -> Vec<BlockId> {
        let mut ids = self.order.clone();
        ids.sort_by_key(|id| self.blocks.get(id).map(|b| b.timestamp).unwrap_or(i64::MAX));
        ids
    }

    pub fn get_block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    /// All blocks, oldest first.
    pub fn blocks(&self) -> Vec<&Block> {
        self.ordered_ids()
            .iter()
            .filter_map(|id| self.blocks.get(id))
            .collect()
    }

    pub fn blocks_by_type(&self, block_type: BlockType) -> Vec<&Block> {
        self.blocks()
            .into_iter()
            .filter(|b| b.block_type() == block_type)
            .collect()
    }

    pub fn command_blocks(&self) -> Vec<&Block> {
        self.blocks_by_type(BlockType::Command)
    }

    pub fn running_commands(&self) -> Vec<&Block> {
        self.blocks()
            .into_iter()
            .filter(|b| b.as_command().map(|c| c.status == CommandStatus::Running).unwrap_or(false))
            .collect()
    }

    pub fn most_recent_command(&self) -> Option<&Block> {
        self.command_blocks().into_iter().last()
    }

    pub fn most_recent_running_command(&self) -> Option<&Block> {
        self.running_commands().into_iter().last()
    }

    pub fn collapsed_ids(&self) -> &HashSet<BlockId> {
        &self.collapsed
    }

    pub fn is_collapsed(&self, id: &BlockId) -> bool {
        self.collapsed.contains(id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockData, CommandData, CommandPatch};

    fn command(id: &str, ts: i64, status: CommandStatus) -> Block {
        let mut b = Block::new(
            BlockId::from(id),
            BlockData::Command(CommandData {
                command: id.to_string(),
                status,
                ..Default::default()
            }),
        );
        b.timestamp = ts;
        b
    }

    #[test]
    fn test_ordering_follows_timestamp() {
        let mut store = BlockStore::new();
        store.add_block(command("b", 20, CommandStatus::Completed));
        store.add_block(command("a", 10, CommandStatus::Completed));
        let ids: Vec<&str> = store.blocks().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_collapsed_set_tracks_flag() {
        let mut store = BlockStore::new();
        store.add_block(command("a", 1, CommandStatus::Running));
        let id = BlockId::from("a");

        assert_eq!(store.toggle_collapse(&id), Some(true));
        assert!(store.is_collapsed(&id));
        assert!(store.get_block(&id).unwrap().is_collapsed);

        store.update_block(&id, &BlockPatch::collapsed(false));
        assert!(!store.is_collapsed(&id));
    }

    #[test]
    fn test_focus_wraps_both_ways() {
        let mut store = BlockStore::new();
        store.add_block(command("a", 1, CommandStatus::Completed));
        store.add_block(command("b", 2, CommandStatus::Completed));

        assert_eq!(store.focus_next().unwrap().as_str(), "a");
        assert_eq!(store.focus_next().unwrap().as_str(), "b");
        assert_eq!(store.focus_next().unwrap().as_str(), "a");
        assert_eq!(store.focus_previous().unwrap().as_str(), "b");
    }

    #[test]
    fn test_remove_clears_focus() {
        let mut store = BlockStore::new();
        store.add_block(command("a", 1, CommandStatus::Completed));
        store.set_focus(Some(BlockId::from("a")));
        store.remove_block(&BlockId::from("a"));
        assert!(store.focused().is_none());
    }

    #[test]
    fn test_running_views() {
        let mut store = BlockStore::new();
        store.add_block(command("a", 1, CommandStatus::Running));
        store.add_block(command("b", 2, CommandStatus::Running));
        store.add_block(command("c", 3, CommandStatus::Completed));

        assert_eq!(store.running_commands().len(), 2);
        assert_eq!(store.most_recent_running_command().unwrap().id.as_str(), "b");
        assert_eq!(store.most_recent_command().unwrap().id.as_str(), "c");

        let patch = BlockPatch::from(CommandPatch {
            status: Some(CommandStatus::Failed),
            ..Default::default()
        });
        store.update_block(&BlockId::from("b"), &patch);
        assert_eq!(store.most_recent_running_command().unwrap().id.as_str(), "a");
    }

    #[test]
    fn test_revision_bumps_on_mutation() {
        let mut store = BlockStore::new();
        let rx = store.subscribe();
        store.add_block(command("a", 1, CommandStatus::Running));
        store.collapse_all();
        assert_eq!(*rx.borrow(), 2);
        assert!(store.is_collapsed(&BlockId::from("a")));
    }
}
