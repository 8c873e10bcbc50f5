//! Electrical-rules-check boundary.
//!
//! The heavy lifting happens in an external `kicad-cli` process; this
//! module invokes it, reads back the JSON report and reduces it to a
//! severity summary. KiCad emits either a flat `violations` list or a
//! per-sheet nested one; both are flattened into a single ordered
//! sequence before counting.
//!
//! A run that could not produce a report (binary missing, process
//! failure, unreadable or malformed output) yields the
//! [`ErcSummary::unknown`] sentinel with negative counters. "Unknown" is
//! never the same thing as "zero violations": validation is expected to
//! be retried in a loop, so these conditions are reported, not thrown.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::warn;
use serde::Deserialize;

/// One rule violation from the report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Violation {
    pub severity: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct RawSheet {
    #[serde(default)]
    violations: Vec<Violation>,
}

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    violations: Vec<Violation>,
    #[serde(default)]
    sheets: Vec<RawSheet>,
}

/// Severity override for the persisted project settings. The settings
/// file itself is outside this crate; [`override_severity`] is the pure
/// mapping update it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Ignore,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Ignore => "ignore",
        }
    }
}

/// Return `overrides` with `rule` mapped to `severity`.
pub fn override_severity(
    overrides: &BTreeMap<String, Severity>,
    rule: &str,
    severity: Severity,
) -> BTreeMap<String, Severity> {
    let mut out = overrides.clone();
    out.insert(rule.to_owned(), severity);
    out
}

/// Aggregated result of one ERC run.
#[derive(Debug, Clone, PartialEq)]
pub struct ErcSummary {
    pub errors: i64,
    pub warnings: i64,
    pub total: i64,
    pub error_types: BTreeMap<String, usize>,
    pub warning_types: BTreeMap<String, usize>,
    pub violations: Vec<Violation>,
}

impl ErcSummary {
    /// Sentinel for runs that produced no usable report. All counters
    /// are negative so it can never be mistaken for a clean result.
    pub fn unknown() -> Self {
        Self {
            errors: -1,
            warnings: -1,
            total: -1,
            error_types: BTreeMap::new(),
            warning_types: BTreeMap::new(),
            violations: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.total < 0
    }

    /// True only when the run completed and found zero errors.
    pub fn success(&self) -> bool {
        self.errors == 0
    }
}

fn categorize<'a>(
    violations: impl Iterator<Item = &'a Violation>,
) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for v in violations {
        *out.entry(v.kind.clone()).or_insert(0) += 1;
    }
    out
}

/// Reduce a flattened violation list to a summary.
pub fn summarize(violations: Vec<Violation>) -> ErcSummary {
    let errors = violations.iter().filter(|v| v.severity == "error").count();
    let warnings = violations
        .iter()
        .filter(|v| v.severity == "warning")
        .count();
    ErcSummary {
        errors: errors as i64,
        warnings: warnings as i64,
        total: (errors + warnings) as i64,
        error_types: categorize(violations.iter().filter(|v| v.severity == "error")),
        warning_types: categorize(violations.iter().filter(|v| v.severity == "warning")),
        violations,
    }
}

/// Parse report text in either of the two shapes KiCad produces and
/// flatten it to one ordered violation list.
pub fn parse_report(text: &str) -> Option<Vec<Violation>> {
    let report: RawReport = serde_json::from_str(text).ok()?;
    let mut violations = report.violations;
    for sheet in report.sheets {
        violations.extend(sheet.violations);
    }
    Some(violations)
}

/// Run `kicad-cli sch erc` on a schematic and summarize its report.
/// Never fails hard; any breakdown maps to [`ErcSummary::unknown`].
pub fn run_erc(schematic: &Path, output: Option<&Path>, kicad_cli: &str) -> ErcSummary {
    let default_output: PathBuf;
    let output = match output {
        Some(p) => p,
        None => {
            default_output = schematic.with_extension("erc.json");
            &default_output
        }
    };

    let spawned = Command::new(kicad_cli)
        .arg("sch")
        .arg("erc")
        .arg("--output")
        .arg(output)
        .arg("--format")
        .arg("json")
        .arg("--severity-all")
        .arg(schematic)
        .output();
    if let Err(err) = spawned {
        warn!("failed to run {kicad_cli}: {err}");
        return ErcSummary::unknown();
    }

    let Ok(text) = std::fs::read_to_string(output) else {
        warn!("ERC report {} not readable", output.display());
        return ErcSummary::unknown();
    };
    match parse_report(&text) {
        Some(violations) => summarize(violations),
        None => {
            warn!("malformed ERC report {}", output.display());
            ErcSummary::unknown()
        }
    }
}
