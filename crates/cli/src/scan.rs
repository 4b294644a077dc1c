//! The scan driver: discovers extensions, fans analyses out over a thread
//! pool, enforces per-extension wall-clock budgets and writes one analysis
//! JSON per extension.
//!
//! Two levels of parallelism: extensions run on a rayon pool sized
//! `--parallelize`, and within one extension the background and content
//! script sections run as two parallel tasks. Every extension owns its
//! private arenas; nothing is shared across them.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};

use engine::{
    AnalysisError, DetectorConfig, ExtensionReport, FlowPolicy, ManifestInfo, SectionBenchmarks,
    SectionReport,
};
use profiles::ApiProfiles;

use crate::args::ScanArgs;
use crate::config::load_config;
use crate::output;
use crate::parser::ParserCommand;

#[derive(Clone)]
struct ScanContext {
    parser: ParserCommand,
    profiles: ApiProfiles,
    detector: DetectorConfig,
    cs_override: Option<PathBuf>,
    bp_override: Option<PathBuf>,
    war: bool,
    timeout: Duration,
}

pub fn run_scan(args: ScanArgs) -> Result<()> {
    let level = if args.quiet {
        LevelFilter::OFF
    } else if args.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let user_cfg = load_config().context("failed to load configuration")?;
    let parser_selector = if args.parser == "espree" {
        user_cfg.parser.clone().unwrap_or(args.parser.clone())
    } else {
        args.parser.clone()
    };
    let apis = args.apis.clone().or(user_cfg.apis.clone());
    let profiles = match &apis {
        Some(path) => ApiProfiles::with_override_file(path)
            .with_context(|| format!("failed to load API profiles from {}", path.display()))?,
        None => ApiProfiles::defaults(),
    };
    info!(version = %profiles.version, "API profile tables loaded");

    let context = ScanContext {
        parser: ParserCommand::new(
            &parser_selector,
            args.source_type,
            Duration::from_secs(args.parser_timeout_seconds),
        ),
        profiles,
        detector: DetectorConfig {
            include_31_violations: args.include_31_violations,
            flow_depth_limit: (args.flow_depth_limit > 0).then_some(args.flow_depth_limit),
            policy: FlowPolicy::OnePerNode,
        },
        cs_override: args.cs.clone(),
        bp_override: args.bp.clone(),
        war: args.war,
        timeout: Duration::from_secs(args.timeout_seconds),
    };

    let path = args.path.canonicalize()?;
    let mut extensions = if args.batch {
        collect_extension_dirs(&path)?
    } else {
        vec![path.clone()]
    };
    if extensions.is_empty() {
        bail!("no extensions found under {}", path.display());
    }
    if args.sort_by_size_ascending {
        extensions.sort_by_key(|dir| (dir_size(dir), dir.clone()));
    }
    info!(count = extensions.len(), workers = args.parallelize, "scan started");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.parallelize)
        .build()
        .context("failed to build thread pool")?;
    let reports: Vec<(PathBuf, ExtensionReport)> = pool.install(|| {
        extensions
            .par_iter()
            .map(|dir| (dir.clone(), analyze_with_timeout(dir, &context)))
            .collect()
    });

    let mut total_dangers = 0usize;
    for (dir, report) in &reports {
        total_dangers += report.total_danger_count();
        let out_path = output::analysis_path(dir, args.analysis.as_deref(), args.batch);
        output::write_report(report, &out_path)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        if !args.quiet {
            output::print_summary(report);
        }
    }
    info!(
        extensions = reports.len(),
        dangers = total_dangers,
        "scan completed"
    );
    Ok(())
}

/// One subdirectory per extension in batch mode.
fn collect_extension_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

fn dir_size(dir: &Path) -> u64 {
    let mut total = 0;
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            total += dir_size(&entry.path());
        } else {
            total += meta.len();
        }
    }
    total
}

/// Runs one extension on a dedicated thread and bounds the wait. On expiry
/// a partial result marked timed-out is recorded; other extensions are
/// unaffected.
fn analyze_with_timeout(dir: &Path, context: &ScanContext) -> ExtensionReport {
    let name = extension_name(dir);
    let (tx, rx) = mpsc::channel();
    let dir = dir.to_path_buf();
    let context = context.clone();
    let timeout = context.timeout;
    std::thread::spawn(move || {
        let _ = tx.send(analyze_extension(&dir, &context));
    });
    match rx.recv_timeout(timeout) {
        Ok(report) => report,
        Err(_) => {
            let err = AnalysisError::Timeout(timeout.as_secs());
            warn!(extension = %name, error = %err, "extension abandoned");
            let mut report = ExtensionReport::new(name, ManifestInfo::default());
            report.timed_out = true;
            report
        }
    }
}

fn extension_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

fn analyze_extension(dir: &Path, context: &ScanContext) -> ExtensionReport {
    let started = Instant::now();
    let manifest = read_manifest(dir);
    let mut report = ExtensionReport::new(extension_name(dir), manifest.info);
    report.war = context.war;

    let bp_path = context
        .bp_override
        .clone()
        .or(manifest.background)
        .map(|p| join_if_relative(dir, p));
    let cs_path = context
        .cs_override
        .clone()
        .or(manifest.content_script)
        .map(|p| join_if_relative(dir, p));
    debug!(
        extension = %report.extension,
        bp = ?bp_path,
        cs = ?cs_path,
        "scripts located"
    );

    // Background and content script analyses run in parallel inside the
    // extension's worker.
    let (bp, cs) = rayon::join(
        || analyze_section(bp_path.as_deref(), "bp", context),
        || analyze_section(cs_path.as_deref(), "cs", context),
    );
    let (bp_report, bp_bench) = bp;
    let (cs_report, cs_bench) = cs;
    report.bp = bp_report;
    report.cs = cs_report;
    report.benchmarks.bp = bp_bench;
    report.benchmarks.cs = cs_bench;
    report
        .benchmarks
        .bp
        .record("total", started.elapsed().as_secs_f64());
    report
}

fn analyze_section(
    path: Option<&Path>,
    side: &str,
    context: &ScanContext,
) -> (SectionReport, SectionBenchmarks) {
    let mut bench = SectionBenchmarks::default();
    let Some(path) = path else {
        return (SectionReport::unavailable(), bench);
    };
    if !path.exists() {
        debug!(side, path = %path.display(), "script missing, skipped");
        return (SectionReport::unavailable(), bench);
    }

    let parse_start = Instant::now();
    let tree = match context.parser.parse_file(path) {
        Ok(tree) => tree,
        Err(err) => {
            // Uncompilable file: the extension continues with what parsed.
            warn!(side, path = %path.display(), error = %err, "file not compilable");
            bench.record(&format!("{side}: uncompilable"), 1.0);
            return (SectionReport::unavailable(), bench);
        }
    };
    bench.record(
        &format!("got {side} ast"),
        parse_start.elapsed().as_secs_f64(),
    );

    let analysis_start = Instant::now();
    match engine::analyze_tree(tree, &context.profiles, &context.detector) {
        Ok(section) => {
            bench.record(
                &format!("{side}: detected dangers"),
                analysis_start.elapsed().as_secs_f64(),
            );
            (section, bench)
        }
        Err(err @ AnalysisError::ResolveFailure { .. }) => {
            warn!(side, path = %path.display(), error = %err, "section skipped");
            bench.crash(err.to_string());
            (SectionReport::unavailable(), bench)
        }
        Err(err) => {
            bench.crash(err.to_string());
            (SectionReport::unavailable(), bench)
        }
    }
}

fn join_if_relative(dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        dir.join(path)
    }
}

struct ManifestScripts {
    info: ManifestInfo,
    background: Option<PathBuf>,
    content_script: Option<PathBuf>,
}

/// Reads the few manifest facts the analysis needs. Full manifest handling
/// lives with the unpacker, not here.
fn read_manifest(dir: &Path) -> ManifestScripts {
    let mut scripts = ManifestScripts {
        info: ManifestInfo::default(),
        background: None,
        content_script: None,
    };
    let Ok(data) = std::fs::read_to_string(dir.join("manifest.json")) else {
        return scripts;
    };
    let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&data) else {
        return scripts;
    };
    scripts.info.manifest_version = manifest.get("manifest_version").and_then(|v| v.as_u64());
    if let Some(background) = manifest.get("background") {
        scripts.background = background
            .get("service_worker")
            .and_then(|v| v.as_str())
            .or_else(|| {
                background
                    .get("scripts")
                    .and_then(|s| s.as_array())
                    .and_then(|s| s.first())
                    .and_then(|v| v.as_str())
            })
            .or_else(|| background.get("page").and_then(|v| v.as_str()))
            .map(PathBuf::from);
    }
    if let Some(content_scripts) = manifest.get("content_scripts").and_then(|v| v.as_array()) {
        for entry in content_scripts {
            if let Some(matches) = entry.get("matches").and_then(|v| v.as_array()) {
                scripts.info.content_script_injected_into.extend(
                    matches
                        .iter()
                        .filter_map(|m| m.as_str().map(|s| s.to_string())),
                );
            }
            if scripts.content_script.is_none() {
                scripts.content_script = entry
                    .get("js")
                    .and_then(|v| v.as_array())
                    .and_then(|v| v.first())
                    .and_then(|v| v.as_str())
                    .map(PathBuf::from);
            }
        }
    }
    scripts
}
