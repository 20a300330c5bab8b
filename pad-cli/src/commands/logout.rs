//! Sign out on this device.

use anyhow::Result;

use crate::context::CliContext;

/// Run the logout command.
pub async fn run(ctx: &CliContext) -> Result<()> {
    let store = ctx.store().await?;
    let vault = ctx.vault(store).await?;

    // Clear unconditionally so a corrupt record is swept out too.
    let session = vault.session().await;
    vault.clear().await?;

    match session {
        Some(session) => {
            println!("Signed out of pad {}.", session.pad_id);
            println!("Other devices keep their sessions; import the key there to revoke them.");
        }
        None => println!("No active session."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pad_client::PadIdentity;
    use tempfile::tempdir;

    fn ctx_in(dir: &std::path::Path) -> CliContext {
        CliContext::new(dir.to_path_buf(), vec!["wss://a.mock".to_string()], true)
    }

    #[tokio::test]
    async fn logout_clears_the_session() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());

        let store = ctx.store().await.unwrap();
        let vault = ctx.vault(store).await.unwrap();
        let identity = PadIdentity::generate();
        vault
            .create_session(&identity.pad_id(), &identity.seed(), 1_000)
            .await
            .unwrap();

        run(&ctx).await.unwrap();

        let store = ctx.store().await.unwrap();
        let vault = ctx.vault(store).await.unwrap();
        assert!(vault.session().await.is_none());
    }

    #[tokio::test]
    async fn logout_without_a_session_succeeds() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        run(&ctx).await.unwrap();
    }
}
