use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use super::RoundTrip;

#[derive(Clone, Debug, Serialize)]
pub struct RoundTripReport<'a> {
    #[serde(rename = "schema")]
    pub schema_version: &'static str,
    pub dialect: &'a str,
    pub model: &'a str,
    pub temperature: f32,
    #[serde(flatten)]
    pub values: &'a RoundTrip,
}

pub fn build_report<'a>(
    dialect: &'a str,
    model: &'a str,
    temperature: f32,
    values: &'a RoundTrip,
) -> RoundTripReport<'a> {
    RoundTripReport {
        schema_version: "dialect-roundtrip.report.v1",
        dialect,
        model,
        temperature,
        values,
    }
}

pub fn write_report_file(path: &Path, report: &RoundTripReport<'_>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create report dir: {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(report).context("serialize report")?;
    std::fs::write(path, text).with_context(|| format!("write report: {}", path.display()))?;
    Ok(())
}

/// The console result: original and refined phrase, labelled, separated by a blank line.
pub fn format_summary(rt: &RoundTrip) -> String {
    format!("Original:\n{}\n\nFinal:\n{}", rt.original, rt.refined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RoundTrip {
        RoundTrip {
            original: "O".into(),
            dialect_phrase: "D1".into(),
            round_trip: "R1".into(),
            analysis: "A1".into(),
            refined: "F1".into(),
            verified: "R2".into(),
        }
    }

    #[test]
    fn summary_matches_console_layout() {
        assert_eq!(format_summary(&sample()), "Original:\nO\n\nFinal:\nF1");
    }

    #[test]
    fn report_includes_every_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        let rt = sample();
        write_report_file(&path, &build_report("quebecois", "gpt-4", 0.7, &rt)).unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["schema"], "dialect-roundtrip.report.v1");
        assert_eq!(v["dialect"], "quebecois");
        assert_eq!(v["model"], "gpt-4");
        assert_eq!(v["original"], "O");
        assert_eq!(v["dialect_phrase"], "D1");
        assert_eq!(v["round_trip"], "R1");
        assert_eq!(v["analysis"], "A1");
        assert_eq!(v["refined"], "F1");
        assert_eq!(v["verified"], "R2");
    }
}
