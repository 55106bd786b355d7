//! `reflex [script.json]`
//!
//! Plays a dialogue scene in the terminal. Without an argument the script
//! configured in `~/.reflex/config.json` is used, falling back to the
//! built-in airport scene.

use anyhow::Context;
use reflex_lib::config;
use reflex_lib::script::{builtin, DialogueScript};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    reflex_lib::init_logging();
    tracing::info!("Reflex starting");

    let config = config::load_config();
    let script_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.scene.script_path.clone());

    let script = match script_path {
        Some(path) => DialogueScript::load(&path)
            .with_context(|| format!("Failed to load script {}", path.display()))?,
        None => builtin::airport_scene().context("Built-in scene is invalid")?,
    };

    let exit = reflex_lib::terminal::run_terminal(Arc::new(script), config).await?;
    tracing::info!("Reflex exiting ({:?})", exit);
    Ok(())
}
