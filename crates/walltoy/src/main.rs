mod cli;
mod paths;
mod run;
mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cli::{Command, ShadersAction};
use paths::AppPaths;
use settings::Settings;
use shadertoy::ShaderStore;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Shaders(shaders_cmd)) => {
            handle_shaders_command(shaders_cmd.action, cli.run.data_dir)
        }
        None => run::run(cli.run),
    }
}

fn handle_shaders_command(action: ShadersAction, data_dir: Option<PathBuf>) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = Settings::load_or_default(&paths.settings_file())?;
    let store = run::open_store(&paths, &settings, data_dir)?;

    match action {
        ShadersAction::List { json } => run_shaders_list(&store, json),
        ShadersAction::Import { file } => run_shaders_import(&store, &file),
        ShadersAction::Remove { id } => run_shaders_remove(&store, &id),
    }
}

fn run_shaders_list(store: &ShaderStore, json: bool) -> Result<()> {
    let summaries = store.list()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No shaders stored in {}", store.root().display());
        return Ok(());
    }

    println!("Stored shaders:");
    for summary in summaries {
        let kinds = if summary.channel_kinds.is_empty() {
            "-".to_string()
        } else {
            summary.channel_kinds.join(",")
        };
        println!(
            "  {:<8} {:<32} author={:<16} passes={:<6} inputs={}",
            summary.id,
            summary.name,
            summary.author.as_deref().unwrap_or("?"),
            if summary.multipass { "multi" } else { "single" },
            kinds
        );
    }
    Ok(())
}

fn run_shaders_import(store: &ShaderStore, file: &Path) -> Result<()> {
    let contents = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let raw: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    let summary = store
        .import(raw)
        .with_context(|| format!("failed to import {}", file.display()))?;
    println!("Imported {} ({})", summary.id, summary.name);
    Ok(())
}

fn run_shaders_remove(store: &ShaderStore, id: &str) -> Result<()> {
    if !store.remove(id)? {
        bail!("no stored shader with id {id}");
    }
    println!("Removed {id}");
    Ok(())
}
