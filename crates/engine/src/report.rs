//! Per-extension result aggregation.
//!
//! An extension analysis merges the background-page (`bp`) and
//! content-script (`cs`) sections deterministically into one JSON document,
//! together with phase timings, crash entries and the manifest facts the
//! caller extracted.

use std::collections::BTreeMap;

use estree::CodeStats;
use serde::Serialize;

use crate::detect::FileAnalysis;

/// Timing counters and crash entries of one section.
#[derive(Debug, Default, Serialize)]
pub struct SectionBenchmarks {
    #[serde(flatten)]
    pub timings: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub crashes: Vec<String>,
}

impl SectionBenchmarks {
    pub fn record(&mut self, phase: &str, seconds: f64) {
        self.timings.insert(phase.to_string(), seconds);
    }

    pub fn crash(&mut self, message: impl Into<String>) {
        self.crashes.push(message.into());
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Benchmarks {
    pub bp: SectionBenchmarks,
    pub cs: SectionBenchmarks,
}

/// One analyzed script section (`bp` or `cs`).
#[derive(Debug, Serialize)]
pub struct SectionReport {
    pub code_stats: CodeStats,
    #[serde(flatten)]
    pub analysis: FileAnalysis,
}

impl SectionReport {
    /// Stand-in for a section whose file was missing or uncompilable.
    pub fn unavailable() -> SectionReport {
        SectionReport {
            code_stats: CodeStats::UNAVAILABLE,
            analysis: FileAnalysis::default(),
        }
    }
}

impl Default for SectionReport {
    fn default() -> Self {
        SectionReport::unavailable()
    }
}

/// Manifest facts extracted by the (external) manifest reader.
#[derive(Debug, Clone, Default)]
pub struct ManifestInfo {
    pub manifest_version: Option<u64>,
    pub content_script_injected_into: Vec<String>,
}

fn is_false(b: &bool) -> bool {
    !b
}

#[derive(Debug, Serialize)]
pub struct ExtensionReport {
    pub extension: String,
    pub benchmarks: Benchmarks,
    pub manifest_version: Option<u64>,
    pub content_script_injected_into: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub war: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub timed_out: bool,
    pub bp: SectionReport,
    pub cs: SectionReport,
}

impl ExtensionReport {
    pub fn new(extension: impl Into<String>, manifest: ManifestInfo) -> ExtensionReport {
        ExtensionReport {
            extension: extension.into(),
            benchmarks: Benchmarks::default(),
            manifest_version: manifest.manifest_version,
            content_script_injected_into: manifest.content_script_injected_into,
            war: false,
            timed_out: false,
            bp: SectionReport::unavailable(),
            cs: SectionReport::unavailable(),
        }
    }

    pub fn total_danger_count(&self) -> usize {
        self.bp.analysis.exfiltration_dangers.len()
            + self.bp.analysis.infiltration_dangers.len()
            + self.cs.analysis.exfiltration_dangers.len()
            + self.cs.analysis.infiltration_dangers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_serialize_with_sentinels() {
        let report = ExtensionReport::new("ext-1", ManifestInfo::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["extension"], "ext-1");
        assert_eq!(json["bp"]["code_stats"]["avg_identifier_length"], -1.0);
        assert_eq!(
            json["cs"]["31_violations_without_sensitive_api_access"],
            serde_json::json!([])
        );
        // `war` and `timed_out` stay out of the document unless set.
        assert!(json.get("war").is_none());
        assert!(json.get("timed_out").is_none());
    }

    #[test]
    fn benchmarks_flatten_timings_and_keep_crashes() {
        let mut b = SectionBenchmarks::default();
        b.record("got bp pdg", 0.25);
        b.crash("invariant violated: orphan occurrence");
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["got bp pdg"], 0.25);
        assert_eq!(json["crashes"][0], "invariant violated: orphan occurrence");
    }
}
