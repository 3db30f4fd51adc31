use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use renderer::RendererConfig;
use shadertoy::{AssetSource, DirectoryAssets, ProxyClient, ShaderStore, Url};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::paths::{shaders_dir, AppPaths};
use crate::settings::Settings;

pub fn run(args: RunArgs) -> Result<()> {
    let input = args
        .shader
        .as_deref()
        .ok_or_else(|| anyhow!("no shader given; pass an id or run `walltoy shaders list`"))?;
    let id = shadertoy::shader_id_from_input(input)
        .ok_or_else(|| anyhow!("'{input}' is not a shader id or ShaderToy URL"))?;

    let paths = AppPaths::discover()?;
    let settings = Settings::load_or_init(&paths.settings_file())?;
    let store = open_store(&paths, &settings, args.data_dir.clone())?;
    let description = store
        .get(&id)
        .with_context(|| format!("failed to load shader {id} from {}", store.root().display()))?;
    info!(
        shader = %id,
        name = %description.info.name,
        passes = description.passes.len(),
        "loaded shader description"
    );

    let assets = build_assets(&args, &settings)?;
    let surface_size = match args.size {
        Some(size) => size,
        None => settings
            .surface_size()?
            .unwrap_or(RendererConfig::default().surface_size),
    };
    let window_title = args
        .window_title
        .clone()
        .unwrap_or_else(|| format!("walltoy - {}", description.info.name));
    let config = RendererConfig {
        surface_size,
        window_title,
    };

    renderer::run_window(config, assets, &description)
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Store root: `--data-dir`, then the settings override, then the user data
/// directory.
pub fn open_store(
    paths: &AppPaths,
    settings: &Settings,
    data_dir: Option<PathBuf>,
) -> Result<ShaderStore> {
    let data_dir = data_dir
        .or_else(|| settings.data_dir.clone())
        .unwrap_or_else(|| paths.data_dir().to_path_buf());
    let root = shaders_dir(&data_dir);
    debug!(
        config = %paths.config_dir().display(),
        store = %root.display(),
        "resolved directories"
    );
    ShaderStore::open(&root)
        .with_context(|| format!("failed to open shader store at {}", root.display()))
}

fn build_assets(args: &RunArgs, settings: &Settings) -> Result<Arc<dyn AssetSource>> {
    if let Some(dir) = &args.media_dir {
        info!(dir = %dir.display(), "reading media from local directory");
        return Ok(Arc::new(DirectoryAssets::new(dir.clone())));
    }
    let raw = args.proxy_url.as_deref().unwrap_or(&settings.proxy_url);
    let base = Url::parse(raw).with_context(|| format!("invalid proxy URL '{raw}'"))?;
    info!(proxy = %base, "fetching media through proxy");
    let client = ProxyClient::new(base).context("failed to build proxy client")?;
    Ok(Arc::new(client))
}
