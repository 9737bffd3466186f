use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::PromptsSection;
use crate::error::{RoundTripError, TemplateBindingError};

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";
pub const DEFAULT_DIALECT: &str = "quebecois";

static SLOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("slot regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TemplateName {
    ToDialect,
    ToEnglish,
    Analyze,
    Refine,
}

impl TemplateName {
    pub const ALL: [TemplateName; 4] = [
        TemplateName::ToDialect,
        TemplateName::ToEnglish,
        TemplateName::Analyze,
        TemplateName::Refine,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::ToDialect => "to_dialect",
            Self::ToEnglish => "to_english",
            Self::Analyze => "analyze",
            Self::Refine => "refine",
        }
    }

    pub fn slots(self) -> &'static [&'static str] {
        match self {
            Self::ToDialect | Self::ToEnglish => &["phrase"],
            Self::Analyze => &["english_phrase", "round_trip_phrase"],
            Self::Refine => &["english_phrase", "quebecois", "round_trip_phrase", "analysis"],
        }
    }

    pub fn default_filename(self) -> String {
        format!("{}.txt", self.key())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    name: TemplateName,
    text: String,
}

impl PromptTemplate {
    /// Checks that `text` uses every slot `name` declares and no other `{identifier}` slot.
    pub fn new(name: TemplateName, text: &str) -> Result<Self, RoundTripError> {
        let text = text.trim();
        let declared: BTreeSet<&str> = name.slots().iter().copied().collect();
        let used: BTreeSet<&str> = SLOT_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        let absent: Vec<&str> = declared.difference(&used).copied().collect();
        if !absent.is_empty() {
            return Err(RoundTripError::config(format!(
                "prompt template {} never uses slot(s): {}",
                name.key(),
                absent.join(", ")
            )));
        }
        let undeclared: Vec<&str> = used.difference(&declared).copied().collect();
        if !undeclared.is_empty() {
            return Err(RoundTripError::config(format!(
                "prompt template {} uses undeclared slot(s): {}",
                name.key(),
                undeclared.join(", ")
            )));
        }

        Ok(Self {
            name,
            text: text.to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String, TemplateBindingError> {
        let declared: BTreeSet<&str> = self.name.slots().iter().copied().collect();
        let mut supplied: BTreeSet<&str> = BTreeSet::new();
        let mut duplicate: BTreeSet<&str> = BTreeSet::new();
        for (k, _) in vars {
            if !supplied.insert(*k) {
                duplicate.insert(*k);
            }
        }

        let missing: Vec<String> = declared
            .difference(&supplied)
            .map(|s| s.to_string())
            .collect();
        let unexpected: Vec<String> = supplied
            .difference(&declared)
            .map(|s| s.to_string())
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() || !duplicate.is_empty() {
            return Err(TemplateBindingError {
                template: self.name.key().to_string(),
                missing,
                unexpected,
                duplicate: duplicate.into_iter().map(str::to_string).collect(),
            });
        }

        // Single pass: bound values are copied in and never rescanned.
        let out = SLOT_RE.replace_all(&self.text, |caps: &Captures| {
            let slot = &caps[1];
            vars.iter()
                .find(|(k, _)| *k == slot)
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(out.into_owned())
    }
}

#[derive(Clone, Debug)]
pub struct PromptSet {
    pub dialect: String,
    pub to_dialect: PromptTemplate,
    pub to_english: PromptTemplate,
    pub analyze: PromptTemplate,
    pub refine: PromptTemplate,
}

impl PromptSet {
    pub fn builtin(dialect: &str) -> Option<Self> {
        let dialect = dialect.trim().to_ascii_lowercase();
        let texts: [(TemplateName, &str); 4] = match dialect.as_str() {
            DEFAULT_DIALECT => [
                (TemplateName::ToDialect, QUEBECOIS_TO_DIALECT),
                (TemplateName::ToEnglish, QUEBECOIS_TO_ENGLISH),
                (TemplateName::Analyze, QUEBECOIS_ANALYZE),
                (TemplateName::Refine, QUEBECOIS_REFINE),
            ],
            _ => return None,
        };
        let mut templates = Vec::with_capacity(texts.len());
        for (name, text) in texts {
            templates.push(PromptTemplate::new(name, text).ok()?);
        }
        Self::from_templates(&dialect, templates).ok()
    }

    /// Resolves each template from an explicit `[prompts]` path, then
    /// `prompts/<dialect>/<template>.txt` beside the config, then the built-in set.
    pub fn load(config_path: &Path, p: &PromptsSection, dialect: &str) -> anyhow::Result<Self> {
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let dialect = dialect.trim().to_ascii_lowercase();
        if dialect.is_empty() {
            return Err(RoundTripError::config("dialect name is empty").into());
        }
        let builtin = Self::builtin(&dialect);

        let mut templates = Vec::with_capacity(TemplateName::ALL.len());
        for name in TemplateName::ALL {
            let path = match p.path_for(name) {
                Some(explicit) => Some(resolve_relative(config_dir, explicit)),
                None => {
                    let cand = config_dir
                        .join(DEFAULT_PROMPTS_DIR)
                        .join(&dialect)
                        .join(name.default_filename());
                    cand.exists().then_some(cand)
                }
            };

            let template = match path {
                Some(path) => {
                    if !path.exists() {
                        return Err(RoundTripError::config(format!(
                            "prompt file not found for {}: {} (run: dialect-roundtrip --init-config)",
                            name.key(),
                            path.display()
                        ))
                        .into());
                    }
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("read prompt: {}", path.display()))?;
                    PromptTemplate::new(name, &text)
                        .with_context(|| format!("prompt file: {}", path.display()))?
                }
                None => match builtin.as_ref() {
                    Some(set) => set.get(name).clone(),
                    None => {
                        return Err(RoundTripError::config(format!(
                            "no {} prompt for dialect {dialect} (expected {})",
                            name.key(),
                            config_dir
                                .join(DEFAULT_PROMPTS_DIR)
                                .join(&dialect)
                                .join(name.default_filename())
                                .display()
                        ))
                        .into())
                    }
                },
            };
            templates.push(template);
        }

        Ok(Self::from_templates(&dialect, templates)?)
    }

    pub fn get(&self, name: TemplateName) -> &PromptTemplate {
        match name {
            TemplateName::ToDialect => &self.to_dialect,
            TemplateName::ToEnglish => &self.to_english,
            TemplateName::Analyze => &self.analyze,
            TemplateName::Refine => &self.refine,
        }
    }

    fn from_templates(
        dialect: &str,
        templates: Vec<PromptTemplate>,
    ) -> Result<Self, RoundTripError> {
        let mut iter = templates.into_iter();
        let mut next = |expected: TemplateName| {
            iter.next()
                .filter(|t| t.name == expected)
                .ok_or_else(|| {
                    RoundTripError::config(format!("missing {} template", expected.key()))
                })
        };
        Ok(Self {
            dialect: dialect.to_string(),
            to_dialect: next(TemplateName::ToDialect)?,
            to_english: next(TemplateName::ToEnglish)?,
            analyze: next(TemplateName::Analyze)?,
            refine: next(TemplateName::Refine)?,
        })
    }
}

fn resolve_relative(base: &Path, p: &str) -> PathBuf {
    let p = PathBuf::from(p);
    if p.is_relative() {
        base.join(p)
    } else {
        p
    }
}

pub fn default_prompt_files() -> Vec<(String, &'static str)> {
    vec![
        (
            format!("{DEFAULT_DIALECT}/{}", TemplateName::ToDialect.default_filename()),
            QUEBECOIS_TO_DIALECT,
        ),
        (
            format!("{DEFAULT_DIALECT}/{}", TemplateName::ToEnglish.default_filename()),
            QUEBECOIS_TO_ENGLISH,
        ),
        (
            format!("{DEFAULT_DIALECT}/{}", TemplateName::Analyze.default_filename()),
            QUEBECOIS_ANALYZE,
        ),
        (
            format!("{DEFAULT_DIALECT}/{}", TemplateName::Refine.default_filename()),
            QUEBECOIS_REFINE,
        ),
    ]
}

pub const QUEBECOIS_TO_DIALECT: &str = include_str!("../../prompts/quebecois/to_dialect.txt");
pub const QUEBECOIS_TO_ENGLISH: &str = include_str!("../../prompts/quebecois/to_english.txt");
pub const QUEBECOIS_ANALYZE: &str = include_str!("../../prompts/quebecois/analyze.txt");
pub const QUEBECOIS_REFINE: &str = include_str!("../../prompts/quebecois/refine.txt");
