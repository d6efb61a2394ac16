use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use lfconfig::FailurePolicy;

#[derive(Parser, Debug)]
#[command(
    name = "lfview",
    author,
    version,
    about = "Light-field image-array loader and synthetic-aperture renderer"
)]
pub struct Cli {
    /// Configuration file; defaults to `config.toml` in the user config directory.
    #[arg(long, global = true, env = "LFVIEW_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a view grid and report progress and gaps.
    Load(LoadArgs),
    /// Load a grid and write one refocused frame as PNG.
    Render(RenderArgs),
    /// Run a rating session over a test sequence read from CSV.
    Session(SessionArgs),
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct GridArgs {
    /// Base URL or directory the views are fetched from.
    #[arg(long, value_name = "URL|DIR")]
    pub source: String,

    /// Directory part of each view location, relative to `--source`.
    #[arg(long, value_name = "PATH", default_value = "")]
    pub directory: String,

    /// File prefix; views are named `{prefix}{column}_{row}.png`.
    #[arg(long, value_name = "PREFIX")]
    pub prefix: String,

    #[arg(long)]
    pub columns: u32,

    #[arg(long)]
    pub rows: u32,

    #[arg(long)]
    pub width: u32,

    #[arg(long)]
    pub height: u32,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Behaviour when a view cannot be fetched: `abort` or `skip`.
    #[arg(long, value_name = "POLICY", value_parser = parse_policy)]
    pub on_error: Option<FailurePolicy>,

    /// Extra attempts per view after a failed fetch.
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// HTTP request timeout (e.g. `10s`, `1m`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    /// Synthetic aperture radius in cameras (0 = pinhole).
    #[arg(long, value_name = "RADIUS")]
    pub aperture: Option<f32>,

    /// Focus depth; `1 / baseline` leaves the views unshifted.
    #[arg(long, value_name = "DEPTH")]
    pub focus: Option<f32>,

    /// Tint a 0.1 uv debug grid over the output.
    #[arg(long)]
    pub grid_overlay: bool,

    /// Directory with `vertex.wgsl` and `fragment.wgsl` overriding the built-in shaders.
    #[arg(long, value_name = "DIR")]
    pub shaders: Option<PathBuf>,

    /// Rendering backend: `cpu` or `gpu`.
    #[arg(long, value_name = "BACKEND", value_parser = parse_backend, default_value = "cpu")]
    pub backend: Backend,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    #[command(flatten)]
    pub grid: GridArgs,
    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub grid: GridArgs,
    #[command(flatten)]
    pub fetch: FetchArgs,
    #[command(flatten)]
    pub view: ViewArgs,

    /// PNG file to write.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Viewer offset in scene units (`X,Y`).
    #[arg(long, value_name = "X,Y", value_parser = parse_offset, allow_hyphen_values = true)]
    pub offset: Option<[f32; 2]>,

    /// Plane zoom factor.
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0)]
    pub zoom: f32,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Test sequence CSV.
    #[arg(long, value_name = "FILE")]
    pub sequence: PathBuf,

    /// Participant identifier recorded with the results.
    #[arg(long, value_name = "ID")]
    pub test_id: String,

    /// Base URL or directory the sequence's view directories are relative to.
    #[arg(long, value_name = "URL|DIR", default_value = ".")]
    pub source: String,

    /// Shuffle seed; random when omitted.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Rating scale: `acr`, `dsis`, or `server` to fetch it.
    #[arg(long, value_name = "SCALE", value_parser = parse_scale, default_value = "acr")]
    pub scale: ScaleChoice,

    /// Post the results to the configured server instead of only printing them.
    #[arg(long)]
    pub submit: bool,

    /// Write a preview PNG per sample into this directory.
    #[arg(long, value_name = "DIR")]
    pub previews: Option<PathBuf>,

    #[command(flatten)]
    pub fetch: FetchArgs,
    #[command(flatten)]
    pub view: ViewArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleChoice {
    Acr,
    Dsis,
    Server,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_policy(value: &str) -> Result<FailurePolicy, String> {
    value.parse()
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

pub fn parse_offset(value: &str) -> Result<[f32; 2], String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("invalid offset '{value}'; expected X,Y"))?;
    let parse = |raw: &str| {
        raw.trim()
            .parse::<f32>()
            .map_err(|_| format!("invalid offset component '{}'", raw.trim()))
    };
    Ok([parse(x)?, parse(y)?])
}

pub fn parse_backend(value: &str) -> Result<Backend, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "cpu" | "software" => Ok(Backend::Cpu),
        "gpu" | "wgpu" => Ok(Backend::Gpu),
        other => Err(format!("unknown backend '{other}' (expected cpu or gpu)")),
    }
}

pub fn parse_scale(value: &str) -> Result<ScaleChoice, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "acr" => Ok(ScaleChoice::Acr),
        "dsis" => Ok(ScaleChoice::Dsis),
        "server" => Ok(ScaleChoice::Server),
        other => Err(format!(
            "unknown rating scale '{other}' (expected acr, dsis or server)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_offset("0.1,-0.2").unwrap(), [0.1, -0.2]);
        assert_eq!(parse_offset(" 1 , 2 ").unwrap(), [1.0, 2.0]);
        assert!(parse_offset("1").is_err());
        assert!(parse_offset("a,b").is_err());
    }

    #[test]
    fn parses_durations_and_choices() {
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_backend("GPU").unwrap(), Backend::Gpu);
        assert_eq!(parse_scale("dsis").unwrap(), ScaleChoice::Dsis);
        assert_eq!(parse_policy("skip").unwrap(), FailurePolicy::Skip);
        assert!(parse_backend("metal").is_err());
    }

    #[test]
    fn render_command_accepts_negative_offsets() {
        let cli = Cli::try_parse_from([
            "lfview", "render", "--source", "lf", "--prefix", "p_", "--columns", "2", "--rows",
            "2", "--width", "4", "--height", "4", "--output", "out.png", "--offset", "-0.1,0.2",
            "--backend", "gpu",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render command");
        };
        assert_eq!(args.offset, Some([-0.1, 0.2]));
        assert_eq!(args.view.backend, Backend::Gpu);
        assert_eq!(args.zoom, 1.0);
    }

    #[test]
    fn session_command_has_no_offset() {
        let result = Cli::try_parse_from([
            "lfview", "session", "--sequence", "seq.csv", "--test-id", "p01", "--offset", "0,0",
        ]);
        assert!(result.is_err());
    }
}
