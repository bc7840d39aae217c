//! anchorline-replay: feed a recorded terminal transcript through a headless
//! terminal and print the blocks it produces.
//!
//! Usage: anchorline-replay <transcript> [config.json]

use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use anchorline_bridge::util::{init_tracing, install_panic_hook};
use anchorline_bridge::{SessionCommand, TerminalSession, TextComponentFactory};
use anchorline_core::{AnchorlineConfig, HeadlessTerminal};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    install_panic_hook();

    let mut args = std::env::args().skip(1);
    let transcript = args
        .next()
        .context("usage: anchorline-replay <transcript> [config.json]")?;
    let config = match args.next() {
        Some(path) => AnchorlineConfig::load_from(Path::new(&path))?,
        None => AnchorlineConfig::load()?,
    };

    let text = std::fs::read_to_string(&transcript)
        .with_context(|| format!("Failed to read transcript {transcript}"))?;

    let term = Rc::new(HeadlessTerminal::from_config(&config.terminal));
    let (transport_tx, mut transport_rx) = mpsc::unbounded_channel::<SessionCommand>();
    let session = TerminalSession::new(
        "replay",
        term.clone(),
        Rc::new(TextComponentFactory::new()),
        &config,
        transport_tx,
    );

    let (output_tx, output_rx) = mpsc::unbounded_channel();
    for chunk in text.split_inclusive('\n') {
        output_tx
            .send(chunk.to_string())
            .context("Replay channel closed early")?;
    }
    drop(output_tx);

    session.drive(output_rx).await;
    let rendered = term.render();
    tracing::info!(rendered, "containers rendered");

    for block in session.factory().store().blocks() {
        let text = session
            .registry()
            .get_handle(&block.id)
            .and_then(|h| term.container(h.decoration))
            .map(|c| c.text())
            .unwrap_or_default();
        let line = session.registry().block_line(&block.id);
        println!("{:<16} line {:>5}  {}", block.block_type().as_str(), fmt_line(line), block.id);
        for row in text.lines() {
            println!("    {row}");
        }
    }

    while let Ok(cmd) = transport_rx.try_recv() {
        tracing::debug!(?cmd, "unsent transport command");
    }

    session.dispose();
    Ok(())
}

fn fmt_line(line: Option<usize>) -> String {
    line.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string())
}
