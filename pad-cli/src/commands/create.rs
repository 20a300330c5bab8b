//! Mint a new pad and sign in on this device.

use anyhow::Result;

use pad_client::{now_ms, PadIdentity};

use crate::context::CliContext;

/// Run the create command.
pub async fn run(ctx: &CliContext) -> Result<()> {
    let store = ctx.store().await?;
    let vault = ctx.vault(store).await?;

    if let Some(session) = vault.session().await {
        anyhow::bail!(
            "Already signed in to pad {}. Run 'driftpad logout' first.",
            session.pad_id
        );
    }

    let identity = PadIdentity::generate();
    vault
        .create_session(&identity.pad_id(), &identity.seed(), now_ms())
        .await?;

    println!("Pad created!");
    println!();
    println!("  Pad id:     {}", identity.pad_id());
    println!("  Secret key: {}", identity.seed().to_hex());
    println!();
    println!("Share the pad id with readers. Keep the secret key private;");
    println!("it is shown only once and moves write access between devices.");
    println!();
    println!("Next steps:");
    println!("  1. Edit the pad: driftpad edit {}", identity.pad_id());
    println!("  2. View it anywhere: driftpad show {}", identity.pad_id());

    Ok(())
}
