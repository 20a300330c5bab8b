//! Edit a pad interactively over stdin.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use pad_client::{
    EngineConfig, EngineEvent, InvalidationWatcher, LocalStore, PadIdentity, RelayConnector,
    RelayPool, RelaySelector, SessionVault, SoftKeyStore, SyncEngine,
};
use pad_types::PadId;

use crate::context::{relay_summary, CliContext};

/// Bound on draining a pending publish after stdin closes: debounce plus
/// the per-relay publish timeout, with margin.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(6);

/// Run the edit command.
pub async fn run(ctx: &CliContext, pad_id: PadId) -> Result<()> {
    let store = ctx.store().await?;
    let vault = ctx.vault(store.clone()).await?;

    let session = vault.session().await.ok_or_else(|| {
        anyhow::anyhow!("No session. Run 'driftpad create' or 'driftpad import' first.")
    })?;
    if session.pad_id != pad_id {
        anyhow::bail!(
            "The stored session is for pad {}, not {pad_id}. Run 'driftpad import' to switch.",
            session.pad_id
        );
    }
    let seed = vault
        .secret_key(&pad_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("The session key could not be unsealed."))?;
    let identity = PadIdentity::from_seed(&seed, Some(&pad_id))?;
    let session_started = session.created_at_ms.unwrap_or(0);

    if ctx.mock {
        edit_on(ctx.mock_pool(), ctx, store, &vault, identity, session_started).await
    } else {
        edit_on(ctx.ws_pool(), ctx, store, &vault, identity, session_started).await
    }
}

async fn edit_on<C: RelayConnector + 'static>(
    pool: Arc<RelayPool<C>>,
    ctx: &CliContext,
    store: Arc<LocalStore>,
    vault: &SessionVault<SoftKeyStore>,
    identity: PadIdentity,
    session_started: u64,
) -> Result<()> {
    let pad_id = identity.pad_id();
    let selector = RelaySelector::new(pool.clone(), store, ctx.bootstrap.clone());
    let selection = selector.select_for_writer(&identity).await;
    let urls = selection.urls();
    println!("Relays: {}", relay_summary(&selection));

    let engine = SyncEngine::writer(pool.clone(), urls.clone(), identity, EngineConfig::default());
    let mut watcher = InvalidationWatcher::start(pool.clone(), urls, pad_id, session_started);
    let mut events = engine.events();

    println!("Editing pad {pad_id}. Each line replaces the pad text; Ctrl-D to finish.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = false;
    let mut watching = true;
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    engine.edit(line)?;
                    pending = true;
                }
                None => break,
            },
            event = events.recv() => match event {
                Ok(EngineEvent::Published { delivered, attempted, .. }) => {
                    pending = false;
                    println!("  synced to {delivered}/{attempted} relay(s)");
                }
                Ok(EngineEvent::ContentAdopted { text, .. }) => {
                    println!("  pad changed elsewhere: {text}");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            signal = watcher.superseded(), if watching => match signal {
                Some(signal) => {
                    println!("A newer device took over this pad at {}.", signal.created_at_ms);
                    println!("Signing out.");
                    vault.clear().await?;
                    engine.superseded();
                    break;
                }
                None => watching = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Let a debounced edit finish its publish before tearing down.
    if pending {
        let flush = async {
            loop {
                match events.recv().await {
                    Ok(EngineEvent::Published {
                        delivered,
                        attempted,
                        ..
                    }) => {
                        println!("  synced to {delivered}/{attempted} relay(s)");
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        };
        if tokio::time::timeout(FLUSH_TIMEOUT, flush).await.is_err() {
            println!("  a pending edit did not sync in time");
        }
    }

    watcher.shutdown().await;
    engine.shutdown().await;
    pool.shutdown().await;
    Ok(())
}
