use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dialect_roundtrip::config::Credentials;
use dialect_roundtrip::models::openai::ChatCompletionsClient;
use dialect_roundtrip::pipeline::{
    build_report, format_summary, init_default_config, write_report_file, CliOverrides,
    PipelineConfig, RoundTripPipeline, TraceWriter, TracingObserver,
};
use dialect_roundtrip::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "dialect-roundtrip")]
#[command(
    about = "Translate English into a regional French dialect and back, analyse the drift, and refine the translation",
    long_about = None
)]
#[command(version)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Config file path (default: search for dialect-roundtrip.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// English passage to translate (default: built-in passage)
    #[arg(long, conflicts_with = "phrase_file")]
    phrase: Option<String>,

    /// Read the English passage from a file
    #[arg(long, value_name = "FILE")]
    phrase_file: Option<PathBuf>,

    /// Dialect prompt set (e.g. quebecois)
    #[arg(long)]
    dialect: Option<String>,

    /// Model name sent to the generation service (e.g. gpt-4)
    #[arg(long)]
    model: Option<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long)]
    temperature: Option<f32>,

    /// Write every rendered prompt and raw response under the trace dir
    #[arg(long)]
    trace: bool,

    /// Write a JSON report with every intermediate value
    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,

    /// Log rendered prompts and raw responses to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress lines
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let cfg = PipelineConfig::from_args(CliOverrides {
        config: args.config,
        phrase: args.phrase,
        phrase_file: args.phrase_file,
        dialect: args.dialect,
        model: args.model,
        temperature: args.temperature,
        trace: args.trace,
        report: args.report,
    })
    .context("build config")?;
    tracing::debug!(config = %cfg.config_path.display(), dialect = %cfg.dialect, "config resolved");

    let credentials = Credentials::from_env(&cfg.model.credential_env)?;
    let pipeline = build_pipeline(&cfg, credentials, progress)?;
    let rt = pipeline.run(&cfg.phrase)?;

    println!("{}", format_summary(&rt));

    if let Some(path) = cfg.report_path.as_ref() {
        let report = build_report(&cfg.dialect, &cfg.model.model, cfg.model.temperature, &rt);
        write_report_file(path, &report)?;
    }
    Ok(())
}

fn build_pipeline(
    cfg: &PipelineConfig,
    credentials: Credentials,
    progress: ConsoleProgress,
) -> anyhow::Result<RoundTripPipeline<ChatCompletionsClient>> {
    let client = ChatCompletionsClient::new(&cfg.model, credentials)
        .context("create generation client")?;
    let trace = TraceWriter::new(cfg.trace_dir.clone(), cfg.trace_prompts)?;
    if cfg.trace_prompts {
        progress.info(format!("Trace dir: {}", trace.dir().display()));
    }

    Ok(
        RoundTripPipeline::new(client, cfg.prompts.clone(), cfg.model.temperature, progress)
            .with_log_max_chars(cfg.log_max_chars)
            .with_observer(TracingObserver)
            .with_observer(trace),
    )
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(log_filter(verbose, rust_log.as_deref())?)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

/// `-v` forces debug for this crate; otherwise `RUST_LOG` wins when set.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> anyhow::Result<EnvFilter> {
    let rust_log = rust_log.map(str::trim).filter(|s| !s.is_empty());
    let filter = match rust_log {
        Some(spec) => EnvFilter::try_new(spec).context("parse RUST_LOG")?,
        None => EnvFilter::new("dialect_roundtrip=warn"),
    };
    if verbose {
        return Ok(filter.add_directive("dialect_roundtrip=debug".parse()?));
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_warn() {
        let filter = log_filter(false, None).unwrap().to_string();
        assert!(filter.contains("dialect_roundtrip=warn"));
    }

    #[test]
    fn rust_log_can_raise_crate_level() {
        let filter = log_filter(false, Some("dialect_roundtrip=trace"))
            .unwrap()
            .to_string();
        assert!(filter.contains("dialect_roundtrip=trace"));
        assert!(!filter.contains("warn"));
    }

    #[test]
    fn verbose_forces_debug() {
        let filter = log_filter(true, Some("info")).unwrap().to_string();
        assert!(filter.contains("dialect_roundtrip=debug"));
    }

    #[test]
    fn bad_rust_log_is_an_error() {
        assert!(log_filter(false, Some("dialect_roundtrip=loud")).is_err());
    }
}
