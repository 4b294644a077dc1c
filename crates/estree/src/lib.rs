//! Typed syntax trees for the JavaScript sources of a browser extension.
//!
//! The AST itself is produced by an external parser process (espree by
//! default) which writes an ESTree-compatible JSON document. This crate
//! ingests that JSON into an arena of [`Node`]s with stable integer ids,
//! parent back-references and role-tagged children, which is what the PDG
//! builder and the data-flow engine operate on.

pub mod ingest;
pub mod stats;
mod tree;

pub use ingest::{parse_document, parse_str, IngestError};
pub use stats::CodeStats;
pub use tree::{Attrs, Loc, Node, NodeId, NodeKind, Pos, Role, SyntaxTree};

/// Source-type option handed to the external parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Script,
    Module,
    Commonjs,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Script => "script",
            SourceType::Module => "module",
            SourceType::Commonjs => "commonjs",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "script" => Ok(SourceType::Script),
            "module" => Ok(SourceType::Module),
            "commonjs" => Ok(SourceType::Commonjs),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}
