//! Show session and relay-cache state.

use anyhow::Result;

use pad_client::now_ms;

use crate::context::CliContext;

/// Run the status command.
pub async fn run(ctx: &CliContext) -> Result<()> {
    println!("=== driftpad status ===");
    println!();
    println!("Data dir: {}", ctx.data_dir.display());
    println!();

    let store = ctx.store().await?;
    let vault = ctx.vault(store.clone()).await?;

    match vault.session().await {
        Some(session) => {
            println!("Session:");
            println!("  Pad id:  {}", session.pad_id);
            if let Some(created) = session.created_at_ms {
                println!("  Started: {}", format_age(created));
            }

            let cache_file = format!("relays-{}.json", session.pad_id);
            match store.read_json::<serde_json::Value>(&cache_file).await? {
                Some(cached) => print_cache(&cached),
                None => println!("  Relays:  not cached"),
            }
        }
        None => {
            println!("Session: NONE");
            println!();
            println!("Run 'driftpad create' to mint a pad, or 'driftpad import' to sign in.");
        }
    }

    println!();
    println!("Bootstrap relays:");
    for url in &ctx.bootstrap {
        println!("  {url}");
    }

    Ok(())
}

/// Summarize a cached relay selection without depending on its exact shape.
fn print_cache(cached: &serde_json::Value) {
    let urls: Vec<&str> = cached
        .pointer("/selection/endpoints")
        .and_then(|e| e.as_array())
        .map(|endpoints| {
            endpoints
                .iter()
                .filter_map(|e| e.get("url").and_then(|u| u.as_str()))
                .collect()
        })
        .unwrap_or_default();
    let stored_at = cached.get("stored_at_ms").and_then(|v| v.as_u64());

    match stored_at {
        Some(stored_at) => println!(
            "  Relays:  {} cached ({})",
            urls.len(),
            format_age(stored_at)
        ),
        None => println!("  Relays:  cache unreadable"),
    }
    for url in urls {
        println!("    {url}");
    }
}

/// Format a millisecond timestamp as a relative age.
fn format_age(ts_ms: u64) -> String {
    let diff = now_ms().saturating_sub(ts_ms) / 1_000;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
