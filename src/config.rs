use std::env::VarError;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::error::RoundTripError;
use crate::pipeline::TemplateName;

pub const CONFIG_FILENAME: &str = "dialect-roundtrip.toml";
pub const CONFIG_ENV: &str = "DIALECT_ROUNDTRIP_CONFIG";

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_CREDENTIAL_ENV: &str = "OPENAI_ACCESS_TOKEN";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub dialect: DialectSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    /// Inline input passage.
    #[serde(default)]
    pub phrase: Option<String>,
    /// Input passage file, relative to the config file directory.
    #[serde(default)]
    pub phrase_file: Option<String>,

    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,
    #[serde(default)]
    pub log_max_chars: Option<usize>,

    /// Optional JSON run report (every intermediate value).
    #[serde(default)]
    pub report: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct DialectSection {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ModelSection {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub credential_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub to_dialect: Option<String>,
    #[serde(default)]
    pub to_english: Option<String>,
    #[serde(default)]
    pub analyze: Option<String>,
    #[serde(default)]
    pub refine: Option<String>,
}

impl PromptsSection {
    pub fn path_for(&self, name: TemplateName) -> Option<&str> {
        let p = match name {
            TemplateName::ToDialect => self.to_dialect.as_deref(),
            TemplateName::ToEnglish => self.to_english.as_deref(),
            TemplateName::Analyze => self.analyze.as_deref(),
            TemplateName::Refine => self.refine.as_deref(),
        };
        p.map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Generation service settings after defaults and CLI overrides are applied.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub credential_env: String,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
}

impl ModelSettings {
    pub fn resolve(
        section: &ModelSection,
        model: Option<String>,
        temperature: Option<f32>,
    ) -> Result<Self, RoundTripError> {
        let temperature = temperature
            .or(section.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(RoundTripError::config(format!(
                "temperature must be within 0.0..=2.0, got {temperature}"
            )));
        }
        let non_empty =
            |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        Ok(Self {
            endpoint: non_empty(section.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: non_empty(model)
                .or_else(|| non_empty(section.model.clone()))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            credential_env: non_empty(section.credential_env.clone())
                .unwrap_or_else(|| DEFAULT_CREDENTIAL_ENV.to_string()),
            timeout_secs: section.timeout_secs.filter(|s| *s > 0),
            max_tokens: section.max_tokens.filter(|n| *n > 0),
        })
    }
}

/// API credential, resolved once at startup and handed to the client constructor.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn from_env(var: &str) -> Result<Self, RoundTripError> {
        Self::resolve_with(var, |k| std::env::var(k))
    }

    pub fn resolve_with(
        var: &str,
        lookup: impl Fn(&str) -> Result<String, VarError>,
    ) -> Result<Self, RoundTripError> {
        match lookup(var) {
            Ok(v) if !v.trim().is_empty() => Ok(Self::new(v.trim())),
            Ok(_) => Err(RoundTripError::config(format!(
                "credential environment variable {var} is empty"
            ))),
            Err(VarError::NotPresent) => Err(RoundTripError::config(format!(
                "credential environment variable {var} is not set"
            ))),
            Err(VarError::NotUnicode(_)) => Err(RoundTripError::config(format!(
                "credential environment variable {var} is not valid UTF-8"
            ))),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

pub fn find_file_upwards(start: &Path, filename: &str, max_depth: usize) -> Option<PathBuf> {
    let mut dir = Some(start);
    for _ in 0..=max_depth {
        let d = dir?;
        let cand = d.join(filename);
        if cand.is_file() {
            return Some(cand);
        }
        dir = d.parent();
    }
    None
}

pub fn find_default_config(filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}
