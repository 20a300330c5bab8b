//! Sign in with an existing secret key.
//!
//! Importing a key is a takeover: the new session is stored locally and a
//! signed logout signal goes out so devices holding the old session
//! downgrade to read-only.

use std::sync::Arc;

use anyhow::{Context, Result};

use pad_client::{
    announce_takeover, now_ms, LocalStore, PadIdentity, RelayConnector, RelayPool, RelaySelector,
};
use pad_core::SecretSeed;
use pad_types::PadId;

use crate::context::{relay_summary, CliContext};

/// Run the import command.
pub async fn run(ctx: &CliContext, pad_id: Option<PadId>, key: Option<String>) -> Result<()> {
    let key_hex = match key {
        Some(key) => key,
        None => rpassword::prompt_password("Secret key (hex): ")
            .context("Failed to read secret key")?,
    };
    let seed = parse_seed(&key_hex)?;
    let identity = PadIdentity::from_seed(&seed, pad_id.as_ref())?;

    let store = ctx.store().await?;
    let vault = ctx.vault(store.clone()).await?;
    if let Some(session) = vault.session().await {
        anyhow::bail!(
            "Already signed in to pad {}. Run 'driftpad logout' first.",
            session.pad_id
        );
    }
    vault
        .create_session(&identity.pad_id(), &seed, now_ms())
        .await?;

    println!("Signed in to pad {}.", identity.pad_id());

    if ctx.mock {
        takeover_on(ctx.mock_pool(), ctx, store, &identity).await
    } else {
        takeover_on(ctx.ws_pool(), ctx, store, &identity).await
    }
}

/// Publish the sign-out signal over the pad's relay selection.
async fn takeover_on<C: RelayConnector + 'static>(
    pool: Arc<RelayPool<C>>,
    ctx: &CliContext,
    store: Arc<LocalStore>,
    identity: &PadIdentity,
) -> Result<()> {
    let selector = RelaySelector::new(pool.clone(), store, ctx.bootstrap.clone());
    let selection = selector.select_for_writer(identity).await;
    println!("Relays: {}", relay_summary(&selection));

    let delivered = announce_takeover(&pool, &selection.urls(), identity).await;
    if delivered == 0 {
        println!("Warning: no relay took the sign-out signal.");
        println!("Other devices stay writable until they next lose last-writer-wins.");
    } else {
        println!("Other devices signed out ({delivered} relay(s) notified).");
    }
    pool.shutdown().await;
    Ok(())
}

/// Parse a 64-hex-character signing-key seed.
fn parse_seed(key_hex: &str) -> Result<SecretSeed> {
    let bytes = hex::decode(key_hex.trim()).context("Secret key must be hex")?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("Secret key must be 64 hex characters"))?;
    Ok(SecretSeed::from_bytes(seed))
}
