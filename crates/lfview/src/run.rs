use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use lfconfig::ViewerConfig;
use lightfield::{
    load_image_array, source_from_location, spawn_load, GridSpec, ImageSource, LoadGenerations,
    LoadOptions, LoadOutcome, LoadTicket,
};
use renderer::{
    CpuBackend, FrameLoop, GpuBackend, LoadStatus, ParamEvent, RenderParams, ShaderSources,
    SurfaceBackend, SurfaceSettings, ViewerPose,
};
use session::{ExperimentClient, Phase, RatingScale, Session, TestSequence};
use tracing_subscriber::EnvFilter;

use crate::cli::{Backend, FetchArgs, GridArgs, LoadArgs, RenderArgs, ScaleChoice, SessionArgs, ViewArgs};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

pub fn print_config(config: &ViewerConfig) -> Result<()> {
    let text = config
        .to_toml_string()
        .context("failed to render configuration")?;
    print!("{text}");
    Ok(())
}

pub fn run_load(args: LoadArgs, config: ViewerConfig) -> Result<()> {
    let config = with_overrides(config, &args.fetch, None)?;
    let grid = grid_spec(&args.grid)?;
    let source = source_from_location(&args.grid.source, config.loader.timeout)
        .with_context(|| format!("invalid source '{}'", args.grid.source))?;
    let outcome = load_blocking(&grid, source.as_ref(), &config)?;

    println!(
        "loaded {} views ({} bytes) from {} in {:.2?}",
        grid.image_count(),
        outcome.buffer.len(),
        source.describe(),
        outcome.elapsed
    );
    for gap in &outcome.gaps {
        println!("gap ({}, {}) {}: {}", gap.column, gap.row, gap.location, gap.error);
    }
    Ok(())
}

pub fn run_render(args: RenderArgs, config: ViewerConfig) -> Result<()> {
    let config = with_overrides(config, &args.fetch, Some(&args.view))?;
    let grid = grid_spec(&args.grid)?;
    let source = source_from_location(&args.grid.source, config.loader.timeout)
        .with_context(|| format!("invalid source '{}'", args.grid.source))?;
    let outcome = load_blocking(&grid, source.as_ref(), &config)?;
    let offset = args.offset.unwrap_or([0.0, 0.0]);

    match args.view.backend {
        Backend::Cpu => render_with(CpuBackend::new(), &config, outcome, offset, &args),
        Backend::Gpu => {
            let shaders = ShaderSources::load(config.shaders.directory.as_deref())?;
            let backend = GpuBackend::new(&shaders).context("failed to initialise GPU backend")?;
            render_with(backend, &config, outcome, offset, &args)
        }
    }
}

fn render_with<B: SurfaceBackend>(
    backend: B,
    config: &ViewerConfig,
    outcome: LoadOutcome,
    offset: [f32; 2],
    args: &RenderArgs,
) -> Result<()> {
    let mut frames = frame_loop(backend, config);
    frames.show(outcome.buffer, args.zoom)?;
    let frame = frames
        .frame(ViewerPose::Desktop {
            position: [offset[0], offset[1], 0.0],
        })?
        .ok_or_else(|| anyhow!("nothing was rendered"))?;
    frame.save_png(&args.output)?;
    println!(
        "wrote {}x{} frame to {}",
        frame.width(),
        frame.height(),
        args.output.display()
    );
    Ok(())
}

pub fn run_session(args: SessionArgs, config: ViewerConfig) -> Result<()> {
    let config = with_overrides(config, &args.fetch, Some(&args.view))?;

    let mut sequence = TestSequence::from_path(&args.sequence)?;
    let seed = args.seed.unwrap_or_else(clock_seed);
    sequence.shuffle(seed);
    tracing::info!(samples = sequence.len(), seed, "shuffled test sequence");

    let client = ExperimentClient::new(&config.server, config.loader.timeout)?;
    let scale = match args.scale {
        ScaleChoice::Acr => RatingScale::acr(),
        ScaleChoice::Dsis => RatingScale::dsis(),
        ScaleChoice::Server => client.fetch_rating_scale(RatingScale::acr()),
    };
    let session = Session::new(&args.test_id, sequence, scale)?;
    let source = source_from_location(&args.source, config.loader.timeout)
        .with_context(|| format!("invalid source '{}'", args.source))?;

    let session = match args.view.backend {
        Backend::Cpu => drive_session(CpuBackend::new(), &config, session, source, &args)?,
        Backend::Gpu => {
            let shaders = ShaderSources::load(config.shaders.directory.as_deref())?;
            let backend = GpuBackend::new(&shaders).context("failed to initialise GPU backend")?;
            drive_session(backend, &config, session, source, &args)?
        }
    };

    let submission = session.submission()?;
    println!("{}", serde_json::to_string_pretty(&submission)?);
    if args.submit {
        let reply = client.submit(&submission)?;
        tracing::info!(%reply, "results accepted");
    }
    Ok(())
}

fn drive_session<B: SurfaceBackend>(
    backend: B,
    config: &ViewerConfig,
    mut session: Session,
    source: Arc<dyn ImageSource>,
    args: &SessionArgs,
) -> Result<Session> {
    let mut frames = frame_loop(backend, config);
    let generations = LoadGenerations::new();
    let options = LoadOptions::from(&config.loader);
    let stdin = io::stdin();
    let mut ratings = stdin.lock();

    if let Some(dir) = &args.previews {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    while session.phase() != Phase::End {
        let sample = session
            .current()
            .cloned()
            .ok_or_else(|| anyhow!("session ran out of samples"))?;
        let grid = sample
            .grid()
            .with_context(|| format!("sample '{}' has an invalid grid", sample.sample_id))?;
        let load = spawn_load(grid.clone(), Arc::clone(&source), options, generations.begin());
        frames.attach(load, grid.shape(), sample.zoom_factor)?;
        frames
            .finish_load()
            .with_context(|| format!("failed to load sample '{}'", sample.sample_id))?;
        if let LoadStatus::Ready { gaps, .. } = frames.status() {
            if *gaps > 0 {
                tracing::warn!(sample = %sample.sample_id, gaps, "sample has missing views");
            }
        }

        frames.apply(ParamEvent::Reset);
        session.begin_sample(Instant::now())?;
        let preview = frames.frame(ViewerPose::Untracked)?;
        if let (Some(dir), Some(frame)) = (&args.previews, preview) {
            frame.save_png(&dir.join(format!("{}.png", sample.sample_id)))?;
        }
        while !session.presentation_finished(Instant::now()) {
            std::thread::sleep(Duration::from_millis(20));
        }

        session.start_rating()?;
        let index = prompt_rating(&mut ratings, &sample.sample_id, session.scale())?;
        session.rate_index(index)?;
    }
    frames.clear();
    Ok(session)
}

fn prompt_rating(input: &mut impl BufRead, sample_id: &str, scale: &RatingScale) -> Result<usize> {
    let mut stderr = io::stderr();
    loop {
        writeln!(stderr, "Rate sample {sample_id}:")?;
        for (index, label) in scale.labels().iter().enumerate() {
            writeln!(stderr, "  {}) {label}", index + 1)?;
        }
        write!(stderr, "> ")?;
        stderr.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("input closed before sample '{sample_id}' was rated");
        }
        match parse_choice(&line, scale.len()) {
            Some(index) => return Ok(index),
            None => writeln!(stderr, "enter a number between 1 and {}", scale.len())?,
        }
    }
}

/// 1-based menu choice to a scale index.
fn parse_choice(line: &str, len: usize) -> Option<usize> {
    let choice: usize = line.trim().parse().ok()?;
    (1..=len).contains(&choice).then(|| choice - 1)
}

fn frame_loop<B: SurfaceBackend>(backend: B, config: &ViewerConfig) -> FrameLoop<B> {
    FrameLoop::new(
        backend,
        SurfaceSettings::from_settings(&config.render),
        RenderParams::from_settings(&config.render),
        config.render.head_tracking_scale,
    )
}

fn load_blocking(
    grid: &GridSpec,
    source: &dyn ImageSource,
    config: &ViewerConfig,
) -> Result<LoadOutcome> {
    let options = LoadOptions::from(&config.loader);
    let mut stderr = io::stderr();
    let outcome = load_image_array(grid, source, options, &LoadTicket::detached(), |progress| {
        let _ = write!(stderr, "\rloading {:>3}%", progress.percent);
        if progress.is_complete() {
            let _ = writeln!(stderr);
        }
    })
    .with_context(|| format!("failed to load views from {}", source.describe()))?;
    Ok(outcome)
}

fn grid_spec(args: &GridArgs) -> Result<GridSpec> {
    Ok(GridSpec::new(
        args.directory.clone(),
        args.prefix.clone(),
        args.columns,
        args.rows,
        args.width,
        args.height,
    )?)
}

/// Applies command-line overrides and validates the result like a config file.
fn with_overrides(
    mut config: ViewerConfig,
    fetch: &FetchArgs,
    view: Option<&ViewArgs>,
) -> Result<ViewerConfig> {
    apply_fetch_overrides(&mut config, fetch);
    if let Some(view) = view {
        apply_view_overrides(&mut config, view);
    }
    config
        .validate()
        .context("invalid command-line override")?;
    Ok(config)
}

fn apply_fetch_overrides(config: &mut ViewerConfig, fetch: &FetchArgs) {
    if let Some(policy) = fetch.on_error {
        config.loader.on_error = policy;
    }
    if let Some(retries) = fetch.retries {
        config.loader.retries = retries;
    }
    if let Some(timeout) = fetch.timeout {
        config.loader.timeout = timeout;
    }
}

fn apply_view_overrides(config: &mut ViewerConfig, view: &ViewArgs) {
    if let Some(aperture) = view.aperture {
        config.render.aperture = aperture;
    }
    if let Some(focus) = view.focus {
        config.render.focus = focus;
    }
    if view.grid_overlay {
        config.render.grid_overlay = true;
    }
    if let Some(dir) = &view.shaders {
        config.shaders.directory = Some(dir.clone());
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_choices_are_one_based() {
        assert_eq!(parse_choice("1\n", 5), Some(0));
        assert_eq!(parse_choice(" 5 ", 5), Some(4));
        assert_eq!(parse_choice("0", 5), None);
        assert_eq!(parse_choice("6", 5), None);
        assert_eq!(parse_choice("good", 5), None);
    }

    #[test]
    fn prompt_rejects_until_valid_and_fails_on_eof() {
        let scale = RatingScale::acr();
        let mut input = io::Cursor::new("9\nx\n2\n");
        assert_eq!(prompt_rating(&mut input, "a", &scale).unwrap(), 1);
        let mut empty = io::Cursor::new("");
        assert!(prompt_rating(&mut empty, "a", &scale).is_err());
    }

    #[test]
    fn cli_overrides_replace_config_values() {
        let mut config = ViewerConfig::current();
        apply_fetch_overrides(
            &mut config,
            &FetchArgs {
                on_error: Some(lfconfig::FailurePolicy::Skip),
                retries: Some(3),
                timeout: None,
            },
        );
        apply_view_overrides(
            &mut config,
            &ViewArgs {
                aperture: Some(2.0),
                grid_overlay: true,
                ..ViewArgs::default()
            },
        );
        assert_eq!(config.loader.on_error, lfconfig::FailurePolicy::Skip);
        assert_eq!(config.loader.retries, 3);
        assert_eq!(config.render.aperture, 2.0);
        assert!(config.render.grid_overlay);
        assert_eq!(config.render.focus, 1.0);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let zero_focus = ViewArgs {
            focus: Some(0.0),
            ..ViewArgs::default()
        };
        assert!(with_overrides(ViewerConfig::current(), &FetchArgs::default(), Some(&zero_focus))
            .is_err());

        let negative_aperture = ViewArgs {
            aperture: Some(-1.0),
            ..ViewArgs::default()
        };
        assert!(with_overrides(
            ViewerConfig::current(),
            &FetchArgs::default(),
            Some(&negative_aperture)
        )
        .is_err());

        let zero_timeout = FetchArgs {
            timeout: Some(Duration::ZERO),
            ..FetchArgs::default()
        };
        assert!(with_overrides(ViewerConfig::current(), &zero_timeout, None).is_err());

        let config = with_overrides(
            ViewerConfig::current(),
            &FetchArgs::default(),
            Some(&ViewArgs {
                focus: Some(0.5),
                ..ViewArgs::default()
            }),
        )
        .unwrap();
        assert_eq!(config.render.focus, 0.5);
    }
}
