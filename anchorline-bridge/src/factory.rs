// anchorline-bridge/src/factory.rs
//
// Block Factory. Turns product-level intents ("a command started", "the AI
// answered") into registry calls, mounts a component into every container
// that becomes ready, and keeps the store and mounted components in step
// with registry notifications.
//
// All collapse and status changes go through the registry, so registry,
// store and component always see the same data.

use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};

use anchorline_core::blocks::{
    AiCommandPatch, AiCommandStatus, AiPromptPatch, AiResponsePatch, CommandAlternative,
    CommandPatch, CommandStatus, DirectoryPatch, SessionDividerPatch, StatusLevel, StatusPatch,
};
use anchorline_core::{
    BlockId, BlockPatch, BlockRegistry, BlockRemoved, BlockStore, BlockType, BlockUpdated,
    ContainerReady, CreateBlockOptions, ListenerList, Subscription,
};
use anchorline_neural::CommandSuggestion;
use tokio::sync::watch;

use crate::components::{ComponentTable, block_inputs};
use crate::mount::{ComponentFactory, ComponentOutput, MountRegistry, OutputSink};

/// A user decision taken inside an ai-command block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiCommandAction {
    pub block_id: BlockId,
    pub command: String,
}

struct FactoryShared {
    me: Weak<FactoryShared>,
    registry: RefCell<Option<Rc<BlockRegistry>>>,
    subscriptions: RefCell<Vec<Subscription>>,
    store: RefCell<BlockStore>,
    mounts: MountRegistry,
    components: RefCell<ComponentTable>,
    component_factory: Rc<dyn ComponentFactory>,
    on_insert: ListenerList<AiCommandAction>,
    on_execute: ListenerList<AiCommandAction>,
    on_reject: ListenerList<AiCommandAction>,
}

pub struct BlockFactory {
    shared: Rc<FactoryShared>,
}

impl BlockFactory {
    pub fn new(component_factory: Rc<dyn ComponentFactory>) -> Self {
        Self::with_components(component_factory, ComponentTable::with_defaults())
    }

    pub fn with_components(
        component_factory: Rc<dyn ComponentFactory>,
        components: ComponentTable,
    ) -> Self {
        let shared = Rc::new_cyclic(|me| FactoryShared {
            me: me.clone(),
            registry: RefCell::new(None),
            subscriptions: RefCell::new(Vec::new()),
            store: RefCell::new(BlockStore::new()),
            mounts: MountRegistry::new(),
            components: RefCell::new(components),
            component_factory,
            on_insert: ListenerList::new("ai-command-insert"),
            on_execute: ListenerList::new("ai-command-execute"),
            on_reject: ListenerList::new("ai-command-reject"),
        });
        Self { shared }
    }

    /// Bind to a registry. Re-initializing drops the previous binding.
    pub fn initialize(&self, registry: Rc<BlockRegistry>) {
        self.unsubscribe();

        let me = self.shared.me.clone();
        let ready = registry.on_container_ready(move |ev| {
            if let Some(shared) = me.upgrade() {
                shared.handle_container_ready(ev);
            }
        });
        let me = self.shared.me.clone();
        let updated = registry.on_block_updated(move |ev| {
            if let Some(shared) = me.upgrade() {
                shared.handle_updated(ev);
            }
        });
        let me = self.shared.me.clone();
        let removed = registry.on_block_removed(move |ev| {
            if let Some(shared) = me.upgrade() {
                shared.handle_removed(ev);
            }
        });

        *self.shared.subscriptions.borrow_mut() = vec![ready, updated, removed];
        *self.shared.registry.borrow_mut() = Some(registry);
        tracing::debug!("block factory initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.registry.borrow().is_some()
    }

    fn unsubscribe(&self) {
        let subs: Vec<Subscription> = self.shared.subscriptions.borrow_mut().drain(..).collect();
        for sub in subs {
            sub.dispose();
        }
    }

    /// Destroy every mounted component, clear the store and all action
    /// callbacks, and let go of the registry.
    pub fn dispose(&self) {
        self.unsubscribe();
        let destroyed = self.shared.mounts.destroy_all();
        self.shared.store.borrow_mut().clear();
        *self.shared.registry.borrow_mut() = None;
        self.shared.on_insert.clear();
        self.shared.on_execute.clear();
        self.shared.on_reject.clear();
        tracing::debug!(destroyed, "block factory disposed");
    }

    pub fn register_block_component(
        &self,
        block_type: BlockType,
        component: impl Into<String>,
    ) -> Option<String> {
        self.shared
            .components
            .borrow_mut()
            .register_block_component(block_type, component)
    }

    pub fn store(&self) -> Ref<'_, BlockStore> {
        self.shared.store.borrow()
    }

    pub fn subscribe_store(&self) -> watch::Receiver<u64> {
        self.shared.store.borrow().subscribe()
    }

    pub fn mounts(&self) -> &MountRegistry {
        &self.shared.mounts
    }

    pub fn set_focus(&self, id: Option<BlockId>) {
        self.shared.store.borrow_mut().set_focus(id);
    }

    pub fn focus_next(&self) -> Option<BlockId> {
        self.shared.store.borrow_mut().focus_next()
    }

    pub fn focus_previous(&self) -> Option<BlockId> {
        self.shared.store.borrow_mut().focus_previous()
    }

    // ── Creation helpers ─────────────────────────────────────────

    /// `line_offset` is relative to the cursor; pass the prompt line's
    /// offset to anchor at the prompt.
    pub fn create_command_block(
        &self,
        command: &str,
        working_directory: Option<String>,
        line_offset: isize,
    ) -> Option<BlockId> {
        let patch = CommandPatch {
            command: Some(command.to_string()),
            status: Some(CommandStatus::Running),
            working_directory: Some(working_directory),
            ..Default::default()
        };
        self.shared.create(
            CreateBlockOptions::new(BlockType::Command)
                .data(patch)
                .cursor_offset(line_offset),
        )
    }

    /// Record the end of a command. Exit code 0 or unknown is `completed`.
    pub fn complete_command_block(
        &self,
        id: &BlockId,
        exit_code: Option<i32>,
        duration_ms: Option<u64>,
    ) -> bool {
        let status = match exit_code {
            Some(code) if code != 0 => CommandStatus::Failed,
            _ => CommandStatus::Completed,
        };
        self.shared.update(
            id,
            CommandPatch {
                exit_code: Some(exit_code),
                status: Some(status),
                duration_ms: Some(duration_ms),
                ..Default::default()
            },
        )
    }

    pub fn create_ai_prompt_block(&self, prompt: &str) -> Option<BlockId> {
        self.shared
            .create(CreateBlockOptions::new(BlockType::AiPrompt).data(AiPromptPatch {
                prompt: Some(prompt.to_string()),
            }))
    }

    /// Height follows the content: one row per line plus a header, clamped
    /// to the layout's bounds.
    pub fn create_ai_response_block(&self, content: &str, is_streaming: bool) -> Option<BlockId> {
        let rows = self.shared.registry()?.layout().ai_response_rows_for(content);
        self.shared.create(
            CreateBlockOptions::new(BlockType::AiResponse)
                .height(rows)
                .data(AiResponsePatch {
                    content: Some(content.to_string()),
                    is_streaming: Some(is_streaming),
                }),
        )
    }

    /// `content` is cumulative and replaces what is stored.
    pub fn update_ai_response_content(&self, id: &BlockId, content: &str, is_streaming: bool) -> bool {
        self.shared.update(
            id,
            AiResponsePatch {
                content: Some(content.to_string()),
                is_streaming: Some(is_streaming),
            },
        )
    }

    pub fn create_ai_command_block(&self, query: &str, suggestion: &CommandSuggestion) -> Option<BlockId> {
        let patch = AiCommandPatch {
            query: Some(query.to_string()),
            is_loading: Some(false),
            status: Some(AiCommandStatus::Pending),
            ..suggestion_patch(suggestion)
        };
        self.shared
            .create(CreateBlockOptions::new(BlockType::AiCommand).data(patch))
    }

    /// Minimal-height placeholder shown while the provider is working.
    pub fn create_loading_ai_command_block(&self, query: &str) -> Option<BlockId> {
        let rows = self.shared.registry()?.layout().loading_rows;
        self.shared.create(
            CreateBlockOptions::new(BlockType::AiCommand)
                .height(rows)
                .data(AiCommandPatch {
                    query: Some(query.to_string()),
                    is_loading: Some(true),
                    status: Some(AiCommandStatus::Pending),
                    ..Default::default()
                }),
        )
    }

    /// Fill a placeholder with the provider's answer. Ignored (false) once the
    /// user has already decided on the block.
    pub fn update_ai_command_block_with_response(
        &self,
        id: &BlockId,
        suggestion: &CommandSuggestion,
    ) -> bool {
        if !self.shared.is_pending_ai_command(id) {
            return false;
        }
        self.shared.update(
            id,
            AiCommandPatch {
                is_loading: Some(false),
                ..suggestion_patch(suggestion)
            },
        )
    }

    /// End loading with a warning instead of a command.
    pub fn fail_ai_command_block(&self, id: &BlockId, message: &str) -> bool {
        if !self.shared.is_pending_ai_command(id) {
            return false;
        }
        self.shared.update(
            id,
            AiCommandPatch {
                is_loading: Some(false),
                warning: Some(Some(message.to_string())),
                ..Default::default()
            },
        )
    }

    pub fn create_directory_block(&self, path: &str, git_branch: Option<String>) -> Option<BlockId> {
        self.shared
            .create(CreateBlockOptions::new(BlockType::Directory).data(DirectoryPatch {
                path: Some(path.to_string()),
                git_branch: Some(git_branch),
            }))
    }

    pub fn create_status_block(&self, message: &str, level: StatusLevel) -> Option<BlockId> {
        self.shared
            .create(CreateBlockOptions::new(BlockType::Status).data(StatusPatch {
                message: Some(message.to_string()),
                level: Some(level),
            }))
    }

    pub fn create_session_divider_block(&self, label: &str, session_id: Option<String>) -> Option<BlockId> {
        self.shared.create(
            CreateBlockOptions::new(BlockType::SessionDivider).data(SessionDividerPatch {
                label: Some(label.to_string()),
                session_id: Some(session_id),
            }),
        )
    }

    // ── Generic operations ───────────────────────────────────────

    pub fn update_block(&self, id: &BlockId, patch: impl Into<BlockPatch>) -> bool {
        self.shared.update(id, patch)
    }

    pub fn remove_block(&self, id: &BlockId) -> bool {
        match self.shared.registry() {
            Some(registry) => registry.remove_block(id),
            None => false,
        }
    }

    pub fn scroll_to_block(&self, id: &BlockId) -> bool {
        match self.shared.registry() {
            Some(registry) => registry.scroll_to_block(id),
            None => false,
        }
    }

    /// Returns the new collapsed state.
    pub fn toggle_collapse(&self, id: &BlockId) -> Option<bool> {
        self.shared.toggle_collapse(id)
    }

    pub fn set_collapsed(&self, id: &BlockId, collapsed: bool) -> bool {
        self.shared.update(id, BlockPatch::collapsed(collapsed))
    }

    pub fn collapse_all(&self) {
        self.shared.set_all_collapsed(true);
    }

    pub fn expand_all(&self) {
        self.shared.set_all_collapsed(false);
    }

    // ── Action callbacks ─────────────────────────────────────────

    pub fn on_ai_command_insert(&self, listener: impl Fn(&AiCommandAction) + 'static) -> Subscription {
        self.shared.on_insert.subscribe(listener)
    }

    pub fn on_ai_command_execute(&self, listener: impl Fn(&AiCommandAction) + 'static) -> Subscription {
        self.shared.on_execute.subscribe(listener)
    }

    pub fn on_ai_command_reject(&self, listener: impl Fn(&AiCommandAction) + 'static) -> Subscription {
        self.shared.on_reject.subscribe(listener)
    }

    /// Same path a mounted component's output takes.
    pub fn dispatch_output(&self, id: &BlockId, output: ComponentOutput) {
        self.shared.handle_output(id, output);
    }
}

impl Drop for BlockFactory {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for BlockFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockFactory")
            .field("initialized", &self.is_initialized())
            .field("mounted", &self.shared.mounts.len())
            .finish()
    }
}

fn suggestion_patch(s: &CommandSuggestion) -> AiCommandPatch {
    AiCommandPatch {
        command: Some(s.command.clone()),
        explanation: Some(s.explanation.clone()),
        is_dangerous: Some(s.is_dangerous),
        requires_sudo: Some(s.requires_sudo),
        affects_files: Some(s.affects_files.clone()),
        alternatives: Some(
            s.alternatives
                .iter()
                .map(|a| CommandAlternative {
                    command: a.command.clone(),
                    description: a.description.clone(),
                })
                .collect(),
        ),
        warning: Some(s.warning.clone()),
        ..Default::default()
    }
}

impl FactoryShared {
    fn registry(&self) -> Option<Rc<BlockRegistry>> {
        let registry = self.registry.borrow().clone();
        if registry.is_none() {
            tracing::error!("block factory used before initialize");
        }
        registry
    }

    fn create(&self, options: CreateBlockOptions) -> Option<BlockId> {
        let registry = self.registry()?;
        let handle = registry.create_block(options)?;
        let block = registry.get_block(&handle.id)?;
        self.store.borrow_mut().add_block(block);
        Some(handle.id)
    }

    fn update(&self, id: &BlockId, patch: impl Into<BlockPatch>) -> bool {
        match self.registry() {
            Some(registry) => registry.update_block(id, patch),
            None => false,
        }
    }

    fn is_pending_ai_command(&self, id: &BlockId) -> bool {
        let Some(block) = self.registry().and_then(|r| r.get_block(id)) else {
            tracing::warn!(block_id = %id, "ai-command block not found");
            return false;
        };
        match block.as_ai_command() {
            Some(data) if data.status == AiCommandStatus::Pending => true,
            Some(data) => {
                tracing::debug!(block_id = %id, status = ?data.status, "late ai response ignored");
                false
            }
            None => {
                tracing::warn!(block_id = %id, block_type = %block.block_type(), "not an ai-command block");
                false
            }
        }
    }

    fn toggle_collapse(&self, id: &BlockId) -> Option<bool> {
        let registry = self.registry()?;
        let next = !registry.get_block(id)?.is_collapsed;
        registry
            .update_block(id, BlockPatch::collapsed(next))
            .then_some(next)
    }

    fn set_all_collapsed(&self, collapsed: bool) {
        let Some(registry) = self.registry() else {
            return;
        };
        for block in registry.get_all_blocks() {
            if block.is_collapsed != collapsed {
                registry.update_block(&block.id, BlockPatch::collapsed(collapsed));
            }
        }
    }

    // ── Registry notifications ───────────────────────────────────

    fn handle_container_ready(&self, ev: &ContainerReady) {
        let id = &ev.handle.id;
        self.store.borrow_mut().add_block(ev.block.clone());

        let component = self
            .components
            .borrow()
            .component_for(ev.handle.block_type)
            .map(str::to_string);
        let Some(component) = component else {
            tracing::warn!(block_id = %id, block_type = %ev.handle.block_type, "no component registered");
            return;
        };

        let me = self.me.clone();
        let output_id = id.clone();
        let outputs: OutputSink = Rc::new(move |output| {
            if let Some(shared) = me.upgrade() {
                shared.handle_output(&output_id, output);
            }
        });

        let inputs = block_inputs(&ev.block);
        if let Err(e) = self.mounts.mount(
            id,
            self.component_factory.as_ref(),
            &component,
            &ev.container,
            &inputs,
            outputs,
        ) {
            tracing::error!(block_id = %id, error = %e, "component mount failed");
        }
    }

    fn handle_updated(&self, ev: &BlockUpdated) {
        self.store.borrow_mut().add_block(ev.block.clone());
        if self.mounts.is_mounted(&ev.block.id) {
            self.mounts.update(&ev.block.id, &block_inputs(&ev.block));
        }
    }

    fn handle_removed(&self, ev: &BlockRemoved) {
        self.store.borrow_mut().remove_block(&ev.id);
        self.mounts.destroy(&ev.id);
    }

    // ── Component outputs ────────────────────────────────────────

    fn handle_output(&self, id: &BlockId, output: ComponentOutput) {
        let (status, listeners) = match output {
            ComponentOutput::ToggleCollapse => {
                self.toggle_collapse(id);
                return;
            }
            ComponentOutput::Insert => (AiCommandStatus::Inserted, &self.on_insert),
            ComponentOutput::Execute => (AiCommandStatus::Executed, &self.on_execute),
            ComponentOutput::Reject => (AiCommandStatus::Rejected, &self.on_reject),
        };

        let Some(registry) = self.registry() else {
            return;
        };
        let Some(block) = registry.get_block(id) else {
            tracing::warn!(block_id = %id, "action for unknown block");
            return;
        };
        let Some(data) = block.as_ai_command() else {
            tracing::warn!(block_id = %id, ?output, "action on a non ai-command block");
            return;
        };
        if data.status != AiCommandStatus::Pending {
            tracing::debug!(block_id = %id, status = ?data.status, ?output, "block already decided");
            return;
        }
        // Nothing to insert or run (still loading, or the provider failed);
        // rejecting is still allowed.
        let no_command = data.is_loading || data.command.trim().is_empty();
        if no_command && output != ComponentOutput::Reject {
            tracing::debug!(block_id = %id, ?output, "no command to act on");
            return;
        }

        let action = AiCommandAction {
            block_id: id.clone(),
            command: data.command.clone(),
        };
        let patch = BlockPatch::from(AiCommandPatch {
            status: Some(status),
            ..Default::default()
        })
        .with_collapsed(true);
        registry.update_block(id, patch);
        listeners.emit(&action);
    }
}
