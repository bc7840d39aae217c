use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anchorline_core::blocks::{
    AiResponsePatch, BlockData, CommandPatch, CommandStatus, StatusPatch,
};
use anchorline_core::config::{AnchorlineConfig, LayoutConfig};
use anchorline_core::term::{IntegrationEvent, ShellIntegration};
use anchorline_core::{
    Block, BlockId, BlockPatch, BlockRegistry, BlockStore, BlockType, CommandDetector,
    CommandEvent, CreateBlockOptions, DetectorState, HeadlessTerminal, Placement, RemovalCause,
    TerminalHost,
};

fn attached(rows: usize, scrollback: usize) -> (Rc<HeadlessTerminal>, Rc<BlockRegistry>) {
    let term = Rc::new(HeadlessTerminal::new(rows, scrollback));
    let registry = BlockRegistry::new(LayoutConfig::default());
    registry.attach(term.clone());
    (term, registry)
}

// ============================================================================
// Command Detector Tests
// ============================================================================

#[test]
fn test_detector_prompt_then_command() {
    let mut d = CommandDetector::new();
    let events = d.process_output("user@host:~$ ", 5);
    assert_eq!(events, vec![CommandEvent::PromptDetected { line: 5 }]);

    let events = d.process_output("ls -la", 6);
    assert_eq!(
        events,
        vec![CommandEvent::CommandStart {
            line: 5,
            command: "ls -la".into()
        }]
    );
    assert_eq!(d.state(), DetectorState::InCommand);
}

#[test]
fn test_detector_next_prompt_ends_command() {
    let mut d = CommandDetector::new();
    d.process_output("$", 0);
    d.process_output("make", 1);
    let events = d.process_output("building...\nuser@host:~/src$", 4);
    assert_eq!(
        events,
        vec![
            CommandEvent::CommandEnd {
                line: 4,
                exit_code: None
            },
            CommandEvent::PromptDetected { line: 4 },
        ]
    );
    assert_eq!(d.state(), DetectorState::PromptSeen);
}

#[test]
fn test_detector_docker_ps_lifecycle() {
    let mut d = CommandDetector::new();
    let mut events = Vec::new();
    for (line, text) in [
        "user@host:~$",
        "docker ps",
        "CONTAINER ID   IMAGE     COMMAND",
        "3f2a9c1b      nginx     \"nginx -g\"",
        "user@host:~$",
    ]
    .iter()
    .enumerate()
    {
        events.extend(d.process_output(text, line));
    }
    assert_eq!(
        events,
        vec![
            CommandEvent::PromptDetected { line: 0 },
            CommandEvent::CommandStart {
                line: 0,
                command: "docker ps".into()
            },
            CommandEvent::CommandEnd {
                line: 4,
                exit_code: None
            },
            CommandEvent::PromptDetected { line: 4 },
        ]
    );
}

#[test]
fn test_detector_long_line_after_prompt_is_output() {
    let mut d = CommandDetector::new();
    d.process_output("user@host:~$", 0);
    let long = "x".repeat(250);
    assert!(d.process_output(&long, 1).is_empty());
    assert_eq!(d.state(), DetectorState::PromptSeen);
}

#[test]
fn test_detector_reset_drops_running_command() {
    let mut d = CommandDetector::new();
    d.process_output("$", 0);
    d.process_output("top", 1);
    d.reset();
    assert_eq!(d.state(), DetectorState::Idle);
    assert_eq!(
        d.process_output("$", 5),
        vec![CommandEvent::PromptDetected { line: 5 }]
    );
}

#[test]
fn test_detector_output_lines_do_not_start_commands_while_running() {
    let mut d = CommandDetector::new();
    d.process_output("$", 0);
    d.process_output("ls", 1);
    let events = d.process_output("Cargo.toml\nsrc\ntarget", 4);
    assert!(events.is_empty());
    assert_eq!(d.current_command(), Some("ls"));
}

#[test]
fn test_detector_ignores_text_before_first_prompt() {
    let mut d = CommandDetector::new();
    assert!(d.process_output("git status\nls", 1).is_empty());
    assert_eq!(d.state(), DetectorState::Idle);
}

#[test]
fn test_detector_strips_escape_sequences() {
    let mut d = CommandDetector::new();
    let events = d.process_output("\x1b[32muser@host\x1b[0m:~$ ", 0);
    assert_eq!(events, vec![CommandEvent::PromptDetected { line: 0 }]);
}

#[test]
fn test_detector_marks_override_heuristics() {
    let mut d = CommandDetector::new();
    let events = d.mark_command_start(3, "cargo test");
    assert_eq!(events.len(), 1);
    let events = d.mark_command_start(9, "cargo build");
    assert!(matches!(events[0], CommandEvent::CommandEnd { line: 9, .. }));
    assert!(matches!(events[1], CommandEvent::CommandStart { line: 9, .. }));

    assert_eq!(
        d.mark_command_end(12, Some(101)),
        Some(CommandEvent::CommandEnd {
            line: 12,
            exit_code: Some(101)
        })
    );
    assert_eq!(d.mark_command_end(13, Some(0)), None);
}

#[test]
fn test_detector_custom_prompt_patterns() {
    let mut d = CommandDetector::new();
    assert!(!d.is_prompt_line("[dev] ::"));
    d.add_prompt_pattern(r"^\[\w+\] ::$").unwrap();
    d.add_prompt_pattern(r"^\[\w+\] ::$").unwrap();
    assert_eq!(d.custom_patterns().len(), 1);
    assert!(d.is_prompt_line("[dev] ::"));

    assert!(d.add_prompt_pattern("(").is_err());

    d.reset();
    assert!(d.is_prompt_line("[dev] ::"));
    d.clear_prompt_patterns();
    assert!(!d.is_prompt_line("[dev] ::"));
}

#[test]
fn test_detector_config_custom_prompts_loaded() {
    let mut config = AnchorlineConfig::default().detector;
    config.custom_prompts = vec!["^>>>$".into(), "(".into()];
    let d = CommandDetector::with_config(config);
    assert_eq!(d.custom_patterns(), vec!["^>>>$"]);
}

// ============================================================================
// Block Registry Tests
// ============================================================================

#[test]
fn test_registry_requires_terminal() {
    let registry = BlockRegistry::new(LayoutConfig::default());
    assert!(registry.create_block(CreateBlockOptions::new(BlockType::Command)).is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_registry_create_uses_layout_heights_and_placement() {
    let (_term, registry) = attached(10, 10);

    let cmd = registry.create_block(CreateBlockOptions::new(BlockType::Command)).unwrap();
    assert_eq!(cmd.height_rows, 2);
    assert_eq!(cmd.placement, Placement::Inline);

    let status = registry.create_block(CreateBlockOptions::new(BlockType::Status)).unwrap();
    assert_eq!(status.height_rows, 1);
    assert_eq!(status.placement, Placement::Overlay);

    let tall = registry
        .create_block(CreateBlockOptions::new(BlockType::AiResponse).height(7))
        .unwrap();
    assert_eq!(tall.height_rows, 7);
    assert_ne!(cmd.id, status.id);
}

#[test]
fn test_registry_seed_data_overrides_defaults() {
    let (_term, registry) = attached(10, 10);
    let handle = registry
        .create_block(CreateBlockOptions::new(BlockType::Command).data(CommandPatch {
            command: Some("ls".into()),
            ..Default::default()
        }))
        .unwrap();
    let block = registry.get_block(&handle.id).unwrap();
    let cmd = block.as_command().unwrap();
    assert_eq!(cmd.command, "ls");
    assert_eq!(cmd.status, CommandStatus::Running);
}

#[test]
fn test_registry_container_ready_fires_once_after_render() {
    let (term, registry) = attached(10, 10);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let _sub = registry.on_container_ready(move |ev| sink.borrow_mut().push(ev.handle.id.clone()));

    let handle = registry.create_block(CreateBlockOptions::new(BlockType::Command)).unwrap();
    assert!(seen.borrow().is_empty());
    assert!(!registry.is_ready(&handle.id));

    term.render();
    term.render();
    assert_eq!(*seen.borrow(), vec![handle.id.clone()]);
    assert!(registry.is_ready(&handle.id));
}

#[test]
fn test_registry_update_notifies_with_merged_data() {
    let (_term, registry) = attached(10, 10);
    let handle = registry.create_block(CreateBlockOptions::new(BlockType::Command)).unwrap();
    let updates = Rc::new(Cell::new(0));
    let count = updates.clone();
    let _sub = registry.on_block_updated(move |_| count.set(count.get() + 1));

    assert!(registry.update_block(
        &handle.id,
        CommandPatch {
            exit_code: Some(Some(0)),
            status: Some(CommandStatus::Completed),
            ..Default::default()
        }
    ));
    assert_eq!(updates.get(), 1);

    let block = registry.get_block(&handle.id).unwrap();
    assert_eq!(block.as_command().unwrap().exit_code, Some(0));

    // Wrong type and unknown id are no-ops.
    assert!(!registry.update_block(&handle.id, StatusPatch::default()));
    assert!(!registry.update_block(&BlockId::from("missing"), CommandPatch::default()));
    assert_eq!(updates.get(), 1);
}

#[test]
fn test_registry_remove_is_idempotent() {
    let (term, registry) = attached(10, 10);
    let handle = registry.create_block(CreateBlockOptions::new(BlockType::Command)).unwrap();
    let removed = Rc::new(Cell::new(0));
    let count = removed.clone();
    let _sub = registry.on_block_removed(move |_| count.set(count.get() + 1));

    assert!(registry.remove_block(&handle.id));
    assert!(!registry.remove_block(&handle.id));
    assert_eq!(removed.get(), 1);
    assert_eq!(term.live_markers(), 0);
    assert_eq!(term.live_decorations(), 0);
}

#[test]
fn test_registry_eviction_removes_block() {
    let (term, registry) = attached(2, 1);
    let handle = registry.create_block(CreateBlockOptions::new(BlockType::Command)).unwrap();
    let causes = Rc::new(RefCell::new(Vec::new()));
    let sink = causes.clone();
    let _sub = registry.on_block_removed(move |ev| sink.borrow_mut().push(ev.cause));

    term.write("a\nb\nc\nd");
    assert!(registry.get_block(&handle.id).is_none());
    assert_eq!(*causes.borrow(), vec![RemovalCause::AnchorDisposed]);
}

#[test]
fn test_registry_dispose_removes_everything_once() {
    let (term, registry) = attached(10, 10);
    registry.create_block(CreateBlockOptions::new(BlockType::Command));
    registry.create_block(CreateBlockOptions::new(BlockType::Status));
    let removed = Rc::new(Cell::new(0));
    let count = removed.clone();
    let _sub = registry.on_block_removed(move |_| count.set(count.get() + 1));

    registry.dispose();
    assert_eq!(removed.get(), 2);
    assert!(registry.is_empty());
    assert!(!registry.is_attached());
    assert_eq!(term.live_markers(), 0);
}

#[test]
fn test_registry_scroll_to_block() {
    let (term, registry) = attached(5, 10);
    term.write("one\ntwo\nthree");
    let handle = registry
        .create_block(CreateBlockOptions::new(BlockType::Command).cursor_offset(-1))
        .unwrap();
    assert_eq!(registry.block_line(&handle.id), Some(1));
    assert!(registry.scroll_to_block(&handle.id));
    assert_eq!(term.scrolled_to(), Some(1));
    assert!(!registry.scroll_to_block(&BlockId::from("missing")));
}

#[test]
fn test_registry_listener_panic_is_isolated() {
    let (term, registry) = attached(10, 10);
    let reached = Rc::new(Cell::new(false));
    let flag = reached.clone();
    let _bad = registry.on_container_ready(|_| panic!("listener failure"));
    let _good = registry.on_container_ready(move |_| flag.set(true));

    registry.create_block(CreateBlockOptions::new(BlockType::Status));
    term.render();
    assert!(reached.get());
}

#[test]
fn test_registry_by_type_keeps_creation_order() {
    let (_term, registry) = attached(10, 10);
    let a = registry.create_block(CreateBlockOptions::new(BlockType::Command)).unwrap();
    registry.create_block(CreateBlockOptions::new(BlockType::Status));
    let c = registry.create_block(CreateBlockOptions::new(BlockType::Command)).unwrap();

    let ids: Vec<BlockId> = registry
        .get_blocks_by_type(BlockType::Command)
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(ids, vec![a.id, c.id]);
    assert_eq!(registry.get_all_blocks().len(), 3);
}

// ============================================================================
// Block Store Tests
// ============================================================================

#[test]
fn test_store_mirrors_registry_updates() {
    let (_term, registry) = attached(10, 10);
    let store = Rc::new(RefCell::new(BlockStore::new()));
    let sink = store.clone();
    let _sub = registry.on_block_updated(move |ev| sink.borrow_mut().add_block(ev.block.clone()));

    let handle = registry.create_block(CreateBlockOptions::new(BlockType::AiResponse)).unwrap();
    store.borrow_mut().add_block(registry.get_block(&handle.id).unwrap());

    registry.update_block(
        &handle.id,
        AiResponsePatch {
            content: Some("hello".into()),
            is_streaming: Some(true),
        },
    );
    let store = store.borrow();
    let block = store.get_block(&handle.id).unwrap();
    assert_eq!(block.as_ai_response().unwrap().content, "hello");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_focus_unknown_id_is_allowed() {
    let mut store = BlockStore::new();
    store.set_focus(Some(BlockId::from("ghost")));
    assert_eq!(store.focused().map(|id| id.as_str()), Some("ghost"));
    assert!(store.focus_next().is_none());
}

#[test]
fn test_store_expand_all_after_collapse_all() {
    let mut store = BlockStore::new();
    for id in ["a", "b"] {
        store.add_block(Block::new(BlockId::from(id), BlockData::defaults(BlockType::Status)));
    }
    store.collapse_all();
    assert_eq!(store.collapsed_ids().len(), 2);
    store.expand_all();
    assert!(store.collapsed_ids().is_empty());
    assert!(store.blocks().iter().all(|b| !b.is_collapsed));
    assert!(!store.update_block(&BlockId::from("a"), &BlockPatch::from(CommandPatch::default())));
}

// ============================================================================
// Shell Integration Tests
// ============================================================================

#[test]
fn test_shell_integration_drives_detector() {
    let mut shell = ShellIntegration::new();
    let mut d = CommandDetector::new();
    let mut out = Vec::new();

    for ev in shell.feed(b"\x1b]133;A\x07$ \x1b]133;E;ls\x07\x1b]133;C\x07a b\n\x1b]133;D;2\x07") {
        match ev {
            IntegrationEvent::CommandStarted { command } => {
                out.extend(d.mark_command_start(0, command.unwrap_or_default()));
            }
            IntegrationEvent::CommandFinished { exit_code } => {
                out.extend(d.mark_command_end(1, exit_code));
            }
            _ => {}
        }
    }

    assert_eq!(
        out,
        vec![
            CommandEvent::CommandStart {
                line: 0,
                command: "ls".into()
            },
            CommandEvent::CommandEnd {
                line: 1,
                exit_code: Some(2)
            },
        ]
    );
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "terminal": { "rows": 40 }, "layout": { "command_rows": 3 } }"#)
        .unwrap();

    let config = AnchorlineConfig::load_from(&path).unwrap();
    assert_eq!(config.terminal.rows, 40);
    assert_eq!(config.terminal.scrollback, 1000);
    assert_eq!(config.layout.default_rows(BlockType::Command), 3);
}

#[test]
fn test_config_rejects_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(AnchorlineConfig::load_from(&path).is_err());
}

#[test]
fn test_headless_terminal_cursor_follows_writes() {
    let term = HeadlessTerminal::new(3, 0);
    term.write("a\nb\nc\nd");
    assert_eq!(term.cursor_line(), 3);
    assert_eq!(term.trimmed_lines(), 1);
    assert_eq!(term.line_text(0), None);
    assert_eq!(term.line_text(1).as_deref(), Some("b"));
}
