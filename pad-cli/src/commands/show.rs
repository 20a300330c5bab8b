//! Print a pad's text as a viewer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;

use pad_client::{EngineConfig, EngineEvent, RelayConnector, RelayPool, RelaySelector, SyncEngine};
use pad_types::PadId;

use crate::context::{relay_summary, CliContext};

/// How long to wait for the first stored payload before deciding the pad
/// is empty.
const SETTLE_WAIT: Duration = Duration::from_secs(3);

/// Quiet window after an adoption before the text counts as converged.
const QUIET: Duration = Duration::from_millis(600);

/// Run the show command.
pub async fn run(ctx: &CliContext, pad_id: PadId, follow: bool) -> Result<()> {
    if ctx.mock {
        show_on(ctx.mock_pool(), ctx, pad_id, follow).await
    } else {
        show_on(ctx.ws_pool(), ctx, pad_id, follow).await
    }
}

async fn show_on<C: RelayConnector + 'static>(
    pool: Arc<RelayPool<C>>,
    ctx: &CliContext,
    pad_id: PadId,
    follow: bool,
) -> Result<()> {
    let store = ctx.store().await?;
    let selector = RelaySelector::new(pool.clone(), store, ctx.bootstrap.clone());
    let selection = selector.select_for_reader(&pad_id).await;
    eprintln!("Relays: {}", relay_summary(&selection));

    let engine = SyncEngine::viewer(
        pool.clone(),
        selection.urls(),
        pad_id,
        EngineConfig::default(),
    );
    let mut events = engine.events();

    if follow {
        eprintln!("Watching pad {pad_id}. Press Ctrl-C to stop.");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(EngineEvent::ContentAdopted { text, .. }) => println!("{text}"),
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    } else {
        // Relays replay their stored payload and the register keeps the
        // newest; once adoptions go quiet the text has converged.
        let mut text: Option<String> = None;
        loop {
            let window = if text.is_none() { SETTLE_WAIT } else { QUIET };
            match tokio::time::timeout(window, events.recv()).await {
                Ok(Ok(EngineEvent::ContentAdopted { text: adopted, .. })) => {
                    text = Some(adopted);
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(_))) => {}
                Ok(Err(RecvError::Closed)) => break,
                Err(_) => break,
            }
        }
        match text {
            Some(text) => println!("{text}"),
            None => println!("(no content yet)"),
        }
    }

    engine.shutdown().await;
    pool.shutdown().await;
    Ok(())
}
