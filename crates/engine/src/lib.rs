//! Data-flow engine and vulnerability detector for browser-extension
//! analysis.
//!
//! Consumes the [`pdg`] crate's program dependence graphs, materializes
//! source and sink flows, pairs them at rendezvous call expressions and
//! aggregates per-extension reports.

pub mod detect;
pub mod error;
pub mod flow;
pub mod graph;
pub mod report;

use estree::{CodeStats, SyntaxTree};
use pdg::Pdg;
use profiles::ApiProfiles;
use tracing::debug;

pub use detect::{
    guards, listeners, Danger, DangerClass, Detector, DetectorConfig, FileAnalysis, Rendezvous,
    StorageAccess, Violation31,
};
pub use error::AnalysisError;
pub use flow::{Flow, FlowRecord};
pub use graph::{FlowGraph, FlowPolicy};
pub use report::{Benchmarks, ExtensionReport, ManifestInfo, SectionBenchmarks, SectionReport};

/// Builds the PDG of one file and runs the detector over it.
pub fn analyze_tree(
    tree: SyntaxTree,
    profiles: &ApiProfiles,
    config: &DetectorConfig,
) -> Result<SectionReport, AnalysisError> {
    let file = tree.file.clone();
    let code_stats = CodeStats::of(&tree);
    let pdg = Pdg::build(tree, profiles).map_err(|source| AnalysisError::ResolveFailure {
        file: file.clone(),
        source,
    })?;
    check_resolution_invariant(&pdg)?;
    let analysis = Detector::new(&pdg, profiles, config.clone()).run();
    debug!(file = %file, "file analysis complete");
    Ok(SectionReport {
        code_stats,
        analysis,
    })
}

/// Every value-position identifier occurrence must resolve to exactly one
/// binding; a miss here is fatal for the extension and becomes a crash
/// entry in its report.
fn check_resolution_invariant(pdg: &Pdg) -> Result<(), AnalysisError> {
    let tree = pdg.tree();
    for node in tree.iter() {
        if node.kind == estree::NodeKind::Identifier
            && tree.is_value_occurrence(node.id)
            && node.name().is_some()
            && pdg.scopes().binding_of(node.id).is_none()
        {
            return Err(AnalysisError::InvariantViolation(format!(
                "unresolved occurrence `{}` at {} in {}",
                node.name().unwrap_or_default(),
                tree.location(node.id),
                tree.file,
            )));
        }
    }
    Ok(())
}
