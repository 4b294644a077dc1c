//! Invocation of the external AST parser process.
//!
//! The parser contract: invoked as `<cmd> <source_path> <output_json_path>
//! <source_type>`, exit code 0 on success, an ESTree JSON document at the
//! output path, diagnostics on stderr. `espree` and `esprima` are named
//! shortcuts for the companion converter commands.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use engine::AnalysisError;
use estree::{SourceType, SyntaxTree};
use tempfile::TempDir;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ParserCommand {
    program: String,
    source_type: SourceType,
    timeout: Duration,
}

impl ParserCommand {
    pub fn new(selector: &str, source_type: SourceType, timeout: Duration) -> ParserCommand {
        let program = match selector {
            "espree" => "crossflow-espree".to_string(),
            "esprima" => "crossflow-esprima".to_string(),
            custom => custom.to_string(),
        };
        ParserCommand {
            program,
            source_type,
            timeout,
        }
    }

    /// Parses one JavaScript file into a syntax tree.
    pub fn parse_file(&self, source_path: &Path) -> Result<SyntaxTree, AnalysisError> {
        let source = std::fs::read_to_string(source_path)?;
        let out_dir = TempDir::new()?;
        let out_path = out_dir.path().join("ast.json");
        self.convert(source_path, &out_path)?;
        let json = std::fs::read_to_string(&out_path)?;
        estree::parse_str(&json, &source_path.to_string_lossy(), &source).map_err(|e| {
            AnalysisError::ParseFailure {
                file: source_path.display().to_string(),
                message: e.to_string(),
            }
        })
    }

    fn convert(&self, source_path: &Path, out_path: &Path) -> Result<(), AnalysisError> {
        let file = source_path.display().to_string();
        let mut child = Command::new(&self.program)
            .arg(source_path)
            .arg(out_path)
            .arg(self.source_type.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AnalysisError::ParseFailure {
                file: file.clone(),
                message: format!("failed to spawn parser `{}`: {e}", self.program),
            })?;

        let started = Instant::now();
        loop {
            match child.try_wait()? {
                Some(status) if status.success() => break,
                Some(status) => {
                    let stderr = child
                        .stderr
                        .take()
                        .map(|mut s| {
                            use std::io::Read;
                            let mut buf = String::new();
                            let _ = s.read_to_string(&mut buf);
                            buf
                        })
                        .unwrap_or_default();
                    return Err(AnalysisError::ParseFailure {
                        file,
                        message: format!("parser exited with {status}: {}", stderr.trim()),
                    });
                }
                None => {
                    if started.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(AnalysisError::ParseFailure {
                            file,
                            message: format!(
                                "parser timed out after {} s",
                                self.timeout.as_secs()
                            ),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
            }
        }
        debug!(file = %file, elapsed_ms = started.elapsed().as_millis() as u64, "file parsed");
        Ok(())
    }
}
