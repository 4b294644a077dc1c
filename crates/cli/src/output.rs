use std::path::{Path, PathBuf};

use engine::ExtensionReport;

/// Where an extension's analysis JSON goes: the `--analysis` path (a
/// directory in batch mode, keyed by extension name), or
/// `<extension>/analysis.json`.
pub fn analysis_path(extension_dir: &Path, analysis: Option<&Path>, batch: bool) -> PathBuf {
    match analysis {
        Some(path) if batch => {
            let name = extension_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "extension".to_string());
            path.join(format!("{name}.json"))
        }
        Some(path) => path.to_path_buf(),
        None => extension_dir.join("analysis.json"),
    }
}

pub fn write_report(report: &ExtensionReport, path: &Path) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let data = serde_json::to_string_pretty(report)?;
    std::fs::write(path, data)
}

pub fn print_summary(report: &ExtensionReport) {
    let exfil =
        report.bp.analysis.exfiltration_dangers.len() + report.cs.analysis.exfiltration_dangers.len();
    let infil =
        report.bp.analysis.infiltration_dangers.len() + report.cs.analysis.infiltration_dangers.len();
    if report.timed_out {
        println!("{}: timed out", report.extension);
    } else {
        println!(
            "{}: {} exfiltration, {} infiltration danger(s)",
            report.extension, exfil, infil
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_analysis_path_is_inside_the_extension() {
        let p = analysis_path(Path::new("/tmp/ext"), None, false);
        assert_eq!(p, PathBuf::from("/tmp/ext/analysis.json"));
    }

    #[test]
    fn batch_analysis_paths_are_keyed_by_extension_name() {
        let p = analysis_path(Path::new("/tmp/exts/foo"), Some(Path::new("/out")), true);
        assert_eq!(p, PathBuf::from("/out/foo.json"));
    }
}
