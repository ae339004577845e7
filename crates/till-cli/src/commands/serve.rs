//! Server command implementation

use std::path::Path;

use anyhow::{anyhow, Context, Result};

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    static_dir: Option<&Path>,
) -> Result<()> {
    let mut config = till_server::ServerConfig::from_env().context("Invalid server configuration")?;
    config.require_auth = !no_auth;

    println!("🚀 Starting Till web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    println!("   Receipts: {}", config.receipts_dir.display());
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        println!("   🔒 Authentication: X-Till-User header from the auth proxy");
        if !config.api_keys.is_empty() {
            println!(
                "   🔑 API keys: {} configured (TILL_API_KEYS)",
                config.api_keys.len()
            );
        }
    }
    if !config.admins.is_empty() {
        println!("   👤 Admins: {} (TILL_ADMINS)", config.admins.join(", "));
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    let static_dir_str = static_dir
        .map(|p| {
            p.to_str()
                .ok_or_else(|| anyhow!("Static dir path must be valid UTF-8: {}", p.display()))
        })
        .transpose()?;
    till_server::serve_with_config(db, host, port, static_dir_str, config).await?;

    Ok(())
}
