use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::{
    find_default_config, load_config, AppConfig, ModelSettings, CONFIG_ENV, CONFIG_FILENAME,
};
use crate::error::RoundTripError;
use crate::pipeline::prompts::{
    default_prompt_files, PromptSet, DEFAULT_DIALECT, DEFAULT_PROMPTS_DIR,
};

pub const DEFAULT_PHRASE: &str = include_str!("../../prompts/default_phrase.txt");

/// Command-line overrides; `None` defers to the config file.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub phrase: Option<String>,
    pub phrase_file: Option<PathBuf>,
    pub dialect: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub trace: bool,
    pub report: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub config_path: PathBuf,
    pub phrase: String,
    pub dialect: String,
    pub model: ModelSettings,
    pub trace_dir: PathBuf,
    pub trace_prompts: bool,
    pub log_max_chars: usize,
    pub report_path: Option<PathBuf>,
    pub prompts: PromptSet,
}

impl PipelineConfig {
    pub fn from_args(args: CliOverrides) -> anyhow::Result<Self> {
        let cfg_file = args
            .config
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            } else if args.config.is_some() {
                return Err(anyhow::anyhow!("config file not found: {}", p.display()));
            }
        }
        let cfg_path = match cfg_file {
            Some(p) => p,
            None => std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(CONFIG_FILENAME),
        };
        Self::resolve(cfg_path, &file_cfg, args)
    }

    pub fn resolve(
        cfg_path: PathBuf,
        file_cfg: &AppConfig,
        args: CliOverrides,
    ) -> anyhow::Result<Self> {
        let config_dir = cfg_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let phrase = resolve_phrase(&config_dir, file_cfg, &args)?;

        let dialect = args
            .dialect
            .clone()
            .or_else(|| file_cfg.dialect.name.clone())
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_DIALECT.to_string());

        let model = ModelSettings::resolve(&file_cfg.model, args.model.clone(), args.temperature)?;

        let trace_dir = file_cfg
            .pipeline
            .trace_dir
            .clone()
            .unwrap_or_else(|| "_trace".to_string());
        let trace_dir = relative_to(&config_dir, Path::new(&trace_dir));
        let trace_prompts = args.trace || file_cfg.pipeline.trace_prompts.unwrap_or(false);
        let log_max_chars = file_cfg.pipeline.log_max_chars.unwrap_or(240);

        let report_path = args.report.clone().or_else(|| {
            file_cfg
                .pipeline
                .report
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| relative_to(&config_dir, Path::new(s)))
        });

        let prompts =
            PromptSet::load(&cfg_path, &file_cfg.prompts, &dialect).context("load prompts")?;

        Ok(Self {
            config_path: cfg_path,
            phrase,
            dialect,
            model,
            trace_dir,
            trace_prompts,
            log_max_chars,
            report_path,
            prompts,
        })
    }
}

fn resolve_phrase(
    config_dir: &Path,
    file_cfg: &AppConfig,
    args: &CliOverrides,
) -> anyhow::Result<String> {
    let raw = if let Some(p) = args.phrase.clone() {
        p
    } else if let Some(path) = args.phrase_file.as_ref() {
        std::fs::read_to_string(path)
            .with_context(|| format!("read phrase file: {}", path.display()))?
    } else if let Some(p) = file_cfg.pipeline.phrase.clone() {
        p
    } else if let Some(rel) = file_cfg.pipeline.phrase_file.as_deref() {
        let path = relative_to(config_dir, Path::new(rel));
        std::fs::read_to_string(&path)
            .with_context(|| format!("read phrase file: {}", path.display()))?
    } else {
        DEFAULT_PHRASE.to_string()
    };

    let phrase = raw.trim();
    if phrase.is_empty() {
        return Err(RoundTripError::config("input phrase is empty").into());
    }
    Ok(phrase.to_string())
}

fn relative_to(base: &Path, p: &Path) -> PathBuf {
    if p.is_relative() {
        base.join(p)
    } else {
        p.to_path_buf()
    }
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    for (rel, body) in default_prompt_files() {
        let p = prompts_dir.join(rel);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create prompts dir: {}", parent.display()))?;
        }
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[pipeline]
# Input passage. Leave both unset to use the built-in passage.
# phrase = "There is value in the remix."
# phrase_file = "phrase.txt"

trace_dir = "_trace"
trace_prompts = false
log_max_chars = 240
# report = "roundtrip.json"

[dialect]
# Prompts are read from prompts/<name>/*.txt; "quebecois" is also built in.
name = "quebecois"

[model]
endpoint = "https://api.openai.com/v1/chat/completions"
model = "gpt-4"
temperature = 0.7
# Environment variable that holds the API key.
credential_env = "OPENAI_ACCESS_TOKEN"
# timeout_secs = 120
# max_tokens = 2048

[prompts]
# Per-template overrides (relative to this file).
# to_dialect = "prompts/quebecois/to_dialect.txt"
# to_english = "prompts/quebecois/to_english.txt"
# analyze = "prompts/quebecois/analyze.txt"
# refine = "prompts/quebecois/refine.txt"
"#;
