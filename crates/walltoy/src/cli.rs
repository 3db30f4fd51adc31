use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "walltoy",
    author,
    version,
    about = "Play stored ShaderToy shaders in a window",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Shader id, `shadertoy://<id>`, or a ShaderToy `/view/<id>` URL.
    #[arg(value_name = "SHADER")]
    pub shader: Option<String>,

    /// Directory holding the shader store (defaults to the user data dir).
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the media proxy used for texture downloads.
    #[arg(long, value_name = "URL", env = "WALLTOY_PROXY_URL")]
    pub proxy_url: Option<String>,

    /// Read media from a local mirror of `/media/...` instead of the proxy.
    #[arg(long, value_name = "DIR", conflicts_with = "proxy_url")]
    pub media_dir: Option<PathBuf>,

    /// Initial window size.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Window title (defaults to the shader name).
    #[arg(long, value_name = "TITLE")]
    pub window_title: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the local shader store.
    Shaders(ShadersCommand),
}

#[derive(Parser, Debug)]
pub struct ShadersCommand {
    #[command(subcommand)]
    pub action: ShadersAction,
}

#[derive(Subcommand, Debug)]
pub enum ShadersAction {
    /// List stored shaders, newest import first.
    List {
        /// Print the summaries as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Import a ShaderToy JSON document (wrapped or bare form).
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Delete a stored shader.
    Remove {
        #[arg(value_name = "ID")]
        id: String,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

/// Parses `WIDTHxHEIGHT` (either `x` or `X`) into non-zero dimensions.
pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{trimmed}'; expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("size '{trimmed}' must be non-zero"));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_surface_size("1920x1080"), Ok((1920, 1080)));
        assert_eq!(parse_surface_size(" 640X480 "), Ok((640, 480)));
        assert!(parse_surface_size("0x480").is_err());
        assert!(parse_surface_size("640").is_err());
        assert!(parse_surface_size("axb").is_err());
    }

    #[test]
    fn shader_subcommands_parse() {
        let cli = Cli::try_parse_from(["walltoy", "shaders", "remove", "Xs3Bzl"]).unwrap();
        match cli.command {
            Some(Command::Shaders(ShadersCommand {
                action: ShadersAction::Remove { id },
            })) => assert_eq!(id, "Xs3Bzl"),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(cli.run.shader.is_none());
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "walltoy",
            "https://www.shadertoy.com/view/4dXGR4",
            "--size",
            "800x600",
            "--window-title",
            "demo",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.shader.as_deref(), Some("https://www.shadertoy.com/view/4dXGR4"));
        assert_eq!(cli.run.size, Some((800, 600)));
        assert_eq!(cli.run.window_title.as_deref(), Some("demo"));
    }

    #[test]
    fn media_dir_conflicts_with_proxy() {
        let result = Cli::try_parse_from([
            "walltoy",
            "abc",
            "--media-dir",
            "/tmp/media",
            "--proxy-url",
            "http://localhost/",
        ]);
        assert!(result.is_err());
    }
}
