// anchorline-bridge/src/session.rs
//
// Per-PTY-session glue. Output goes to the terminal, then through shell
// integration (when the shell emits OSC 133 marks) or the heuristic
// detector (when it does not). Command boundaries become command blocks
// anchored at the prompt line; ai-command decisions go back to the session
// transport.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use anchorline_core::blocks::{CommandPatch, CommandStatus};
use anchorline_core::config::AnchorlineConfig;
use anchorline_core::detector::strip_ansi;
use anchorline_core::term::{IntegrationEvent, ShellIntegration};
use anchorline_core::{
    BlockId, BlockRegistry, CommandDetector, CommandEvent, DetectorError, DetectorState,
    Subscription, TerminalHost,
};
use anchorline_neural::CommandSuggester;
use tokio::sync::mpsc;

use crate::factory::BlockFactory;
use crate::mount::ComponentFactory;

/// What the session sends back to the PTY transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Type text at the prompt without running it.
    Input(String),
    /// Type and run (the transport appends the newline).
    Execute(String),
}

#[derive(Debug, Clone)]
struct RunningCommand {
    block_id: Option<BlockId>,
    started: Instant,
}

pub struct TerminalSession {
    id: String,
    host: Rc<dyn TerminalHost>,
    registry: Rc<BlockRegistry>,
    factory: BlockFactory,
    detector: RefCell<CommandDetector>,
    shell: RefCell<ShellIntegration>,
    running: RefCell<Option<RunningCommand>>,
    prompt_line: RefCell<Option<usize>>,
    cwd: RefCell<Option<String>>,
    recent: RefCell<VecDeque<String>>,
    context_lines: usize,
    action_subs: RefCell<Vec<Subscription>>,
}

impl TerminalSession {
    pub fn new(
        id: impl Into<String>,
        host: Rc<dyn TerminalHost>,
        components: Rc<dyn ComponentFactory>,
        config: &AnchorlineConfig,
        transport: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        let id = id.into();
        let registry = BlockRegistry::new(config.layout.clone());
        registry.attach(host.clone());

        let factory = BlockFactory::new(components);
        factory.initialize(registry.clone());

        let tx = transport.clone();
        let insert = factory.on_ai_command_insert(move |action| {
            if tx.send(SessionCommand::Input(action.command.clone())).is_err() {
                tracing::warn!(block_id = %action.block_id, "session transport closed");
            }
        });
        let tx = transport;
        let execute = factory.on_ai_command_execute(move |action| {
            if tx.send(SessionCommand::Execute(action.command.clone())).is_err() {
                tracing::warn!(block_id = %action.block_id, "session transport closed");
            }
        });

        tracing::info!(session = %id, "terminal session started");
        Self {
            id,
            host,
            registry,
            factory,
            detector: RefCell::new(CommandDetector::with_config(config.detector.clone())),
            shell: RefCell::new(ShellIntegration::new()),
            running: RefCell::new(None),
            prompt_line: RefCell::new(None),
            cwd: RefCell::new(None),
            recent: RefCell::new(VecDeque::new()),
            context_lines: config.assistant.context_lines,
            action_subs: RefCell::new(vec![insert, execute]),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn factory(&self) -> &BlockFactory {
        &self.factory
    }

    pub fn registry(&self) -> &Rc<BlockRegistry> {
        &self.registry
    }

    pub fn detector_state(&self) -> DetectorState {
        self.detector.borrow().state()
    }

    pub fn shell_integration_active(&self) -> bool {
        self.shell.borrow().is_active()
    }

    pub fn cwd(&self) -> Option<String> {
        self.cwd.borrow().clone()
    }

    /// Block of the command currently running, if one was created.
    pub fn running_block(&self) -> Option<BlockId> {
        self.running.borrow().as_ref().and_then(|r| r.block_id.clone())
    }

    pub fn add_prompt_pattern(&self, pattern: &str) -> Result<(), DetectorError> {
        self.detector.borrow_mut().add_prompt_pattern(pattern)
    }

    pub fn remove_prompt_pattern(&self, pattern: &str) -> bool {
        self.detector.borrow_mut().remove_prompt_pattern(pattern)
    }

    /// Recent output lines, oldest first, for AI context.
    pub fn recent_output(&self) -> Vec<String> {
        self.recent.borrow().iter().cloned().collect()
    }

    // ── Output path ──────────────────────────────────────────────

    /// Write a chunk of PTY output to the terminal and classify it.
    pub fn ingest(&self, chunk: &str) {
        self.host.write_output(chunk);
        let line = self.host.cursor_line();
        self.remember(chunk);

        let marks = self.shell.borrow_mut().feed(chunk.as_bytes());
        let mut events = Vec::new();
        for mark in marks {
            match mark {
                IntegrationEvent::PromptStarted => {
                    *self.prompt_line.borrow_mut() = Some(line);
                }
                IntegrationEvent::CommandStarted { command } => {
                    let at = self.prompt_line.borrow_mut().take().unwrap_or(line);
                    let command = command.unwrap_or_default();
                    events.extend(self.detector.borrow_mut().mark_command_start(at, command));
                }
                IntegrationEvent::CommandFinished { exit_code } => {
                    events.extend(self.detector.borrow_mut().mark_command_end(line, exit_code));
                }
                IntegrationEvent::CwdChanged(path) => self.change_directory(path),
            }
        }

        if !self.shell.borrow().is_active() {
            let detected = self.detector.borrow_mut().process_output(chunk, line);
            events.extend(detected);
        }

        for event in events {
            self.apply(event);
        }
    }

    /// Feed chunks until the sender side closes.
    pub async fn drive(&self, mut output: mpsc::UnboundedReceiver<String>) {
        let mut chunks = 0usize;
        while let Some(chunk) = output.recv().await {
            self.ingest(&chunk);
            chunks += 1;
        }
        tracing::debug!(session = %self.id, chunks, "output stream closed");
    }

    fn remember(&self, chunk: &str) {
        if self.context_lines == 0 {
            return;
        }
        let mut recent = self.recent.borrow_mut();
        for line in strip_ansi(chunk).lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            recent.push_back(line.to_string());
            while recent.len() > self.context_lines {
                recent.pop_front();
            }
        }
    }

    fn apply(&self, event: CommandEvent) {
        match event {
            CommandEvent::CommandStart { line, command } => {
                let cursor = self.host.cursor_line();
                let offset = line as isize - cursor as isize;
                let block_id = self.factory.create_command_block(&command, self.cwd(), offset);
                if block_id.is_none() {
                    tracing::debug!(line, %command, "no block for command");
                }
                *self.running.borrow_mut() = Some(RunningCommand {
                    block_id,
                    started: Instant::now(),
                });
            }
            CommandEvent::CommandEnd { exit_code, .. } => {
                let finished = self.running.borrow_mut().take();
                if let Some(RunningCommand {
                    block_id: Some(id),
                    started,
                }) = finished
                {
                    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    self.factory.complete_command_block(&id, exit_code, Some(elapsed));
                }
            }
            CommandEvent::PromptDetected { line } => {
                tracing::trace!(line, "prompt");
            }
        }
    }

    fn change_directory(&self, path: String) {
        if self.cwd.borrow().as_deref() == Some(path.as_str()) {
            return;
        }
        self.factory.create_directory_block(&path, None);
        *self.cwd.borrow_mut() = Some(path);
    }

    /// A new PTY replaced the old one: forget detection state, fail any
    /// command left running and mark the boundary.
    pub fn restart(&self) {
        self.detector.borrow_mut().reset();
        self.shell.borrow_mut().reset();
        *self.prompt_line.borrow_mut() = None;
        self.recent.borrow_mut().clear();

        let abandoned = self.running.borrow_mut().take();
        if let Some(id) = abandoned.and_then(|r| r.block_id) {
            self.factory.update_block(
                &id,
                CommandPatch {
                    status: Some(CommandStatus::Failed),
                    ..Default::default()
                },
            );
        }
        self.factory
            .create_session_divider_block("Session restarted", Some(self.id.clone()));
        tracing::info!(session = %self.id, "terminal session restarted");
    }

    // ── AI path ──────────────────────────────────────────────────

    /// Show a placeholder right away, then fill it with the provider's
    /// suggestion (or a warning if the provider failed).
    pub async fn request_ai_command(
        &self,
        suggester: &dyn CommandSuggester,
        query: &str,
    ) -> Option<BlockId> {
        let id = self.factory.create_loading_ai_command_block(query)?;
        let context = self.recent_output();

        match suggester.suggest_command(query, &context).await {
            Ok(suggestion) => {
                self.factory.update_ai_command_block_with_response(&id, &suggestion);
            }
            Err(e) => {
                tracing::warn!(block_id = %id, error = %e, "command suggestion failed");
                self.factory.fail_ai_command_block(&id, &format!("{e:#}"));
            }
        }
        Some(id)
    }

    /// Tear down blocks and components. Call before the terminal goes away.
    pub fn dispose(&self) {
        let subs: Vec<Subscription> = self.action_subs.borrow_mut().drain(..).collect();
        for sub in subs {
            sub.dispose();
        }
        self.registry.dispose();
        self.factory.dispose();
        tracing::info!(session = %self.id, "terminal session disposed");
    }
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("blocks", &self.registry.len())
            .field("state", &self.detector_state())
            .finish()
    }
}
