use std::path::{Path, PathBuf};

use anyhow::Context;

use super::Step;

/// Hook invoked by the pipeline around every generation step.
pub trait StepObserver {
    fn before_step(&self, _step: Step, _prompt: &str) {}

    fn after_step(&self, _step: Step, _output: &str) {}
}

/// Emits rendered prompts and raw responses as `debug` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl StepObserver for TracingObserver {
    fn before_step(&self, step: Step, prompt: &str) {
        tracing::debug!(
            step = step.key(),
            index = step.index(),
            chars = prompt.chars().count(),
            "prompt after formatting:\n{prompt}"
        );
    }

    fn after_step(&self, step: Step, output: &str) {
        tracing::debug!(
            step = step.key(),
            index = step.index(),
            chars = output.chars().count(),
            "raw response:\n{output}"
        );
    }
}

pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self { dir, enabled })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    pub fn write_step_text(&self, step: Step, kind: &str, text: &str) -> anyhow::Result<()> {
        let name = format!("step_{:02}.{}.{kind}.txt", step.index(), step.key());
        self.write_named_text(&name, text)
    }

    fn write_or_warn(&self, step: Step, kind: &str, text: &str) {
        if let Err(err) = self.write_step_text(step, kind, text) {
            tracing::warn!(step = step.key(), "trace write failed: {err:#}");
        }
    }
}

impl StepObserver for TraceWriter {
    fn before_step(&self, step: Step, prompt: &str) {
        self.write_or_warn(step, "prompt", prompt);
    }

    fn after_step(&self, step: Step, output: &str) {
        self.write_or_warn(step, "output", output);
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}
