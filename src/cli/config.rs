//! Config command handlers.

use anyhow::{bail, Context, Result};

use nanoclaw::config::Config;

use super::common::mask_secret;
use super::ConfigAction;

pub(crate) async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => cmd_config_show(),
        ConfigAction::Init { force } => cmd_config_init(force),
    }
}

fn cmd_config_show() -> Result<()> {
    let mut config = Config::load().with_context(|| "Failed to load configuration")?;
    if let Some(openai) = config.providers.openai.as_mut() {
        openai.api_key = openai.api_key.as_deref().map(mask_secret);
    }

    println!("Config file: {}", Config::path().display());
    if !Config::path().exists() {
        println!("(no config file, showing defaults)");
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init(force: bool) -> Result<()> {
    let path = Config::path();
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    let config = Config::default();
    config
        .save_to_path(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let workspace = config.workspace_path();
    std::fs::create_dir_all(workspace.join("memory"))
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;
    std::fs::create_dir_all(workspace.join("skills"))?;

    println!("Wrote {}", path.display());
    println!("Workspace: {}", workspace.display());
    println!("Next: add your API key under providers.openai.api_key");
    Ok(())
}
