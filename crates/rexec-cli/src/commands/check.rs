//! `rexec check [target]`: verify that some local key is accepted.

use anyhow::Result;

use super::Globals;

/// Establish a session, report which key was accepted, and close it.
pub async fn run(globals: &Globals, target: Option<&str>) -> Result<()> {
    let target = globals.target_or_default(target)?;
    let mut connector = super::connect(globals, &target).await?;

    let cfg = connector.config();
    let key = connector
        .credential()
        .map_or_else(|| "no key".to_string(), |c| c.label());
    println!(
        "authenticated to {}@{}:{} using {key}",
        cfg.user, cfg.host, cfg.port
    );

    connector.close().await;
    Ok(())
}
