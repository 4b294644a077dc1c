use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn profiles_prints_the_builtin_tables() {
    let mut cmd = Command::cargo_bin("crossflow").unwrap();
    cmd.arg("profiles")
        .assert()
        .success()
        .stdout(predicate::str::contains("chrome.cookies.getAll"))
        .stdout(predicate::str::contains("guard_properties"));
}

#[test]
fn scan_requires_a_path() {
    let mut cmd = Command::cargo_bin("crossflow").unwrap();
    cmd.arg("scan").assert().failure();
}

#[test]
fn rejects_zero_workers() {
    let mut cmd = Command::cargo_bin("crossflow").unwrap();
    cmd.args(["scan", ".", "--parallelize", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parallelize"));
}

#[cfg(unix)]
mod with_fake_parser {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A stand-in for the external AST converter: writes a fixed empty
    /// Program document to the requested output path.
    fn install_fake_parser(dir: &std::path::Path) -> std::path::PathBuf {
        let script = dir.join("fake-parser.sh");
        fs::write(
            &script,
            "#!/bin/sh\nprintf '{\"type\":\"Program\",\"body\":[]}' > \"$2\"\n",
        )
        .unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();
        script
    }

    #[test]
    fn scan_writes_an_analysis_json() {
        let tmp = TempDir::new().unwrap();
        let ext = tmp.path().join("my-extension");
        fs::create_dir_all(&ext).unwrap();
        fs::write(
            ext.join("manifest.json"),
            r#"{
                "manifest_version": 3,
                "background": {"service_worker": "background.js"},
                "content_scripts": [{"matches": ["<all_urls>"], "js": ["content.js"]}]
            }"#,
        )
        .unwrap();
        fs::write(ext.join("background.js"), "").unwrap();
        fs::write(ext.join("content.js"), "").unwrap();
        let parser = install_fake_parser(tmp.path());

        let mut cmd = Command::cargo_bin("crossflow").unwrap();
        cmd.env("HOME", tmp.path())
            .args(["scan"])
            .arg(&ext)
            .arg("--parser")
            .arg(&parser)
            .arg("--quiet")
            .assert()
            .success();

        let analysis = fs::read_to_string(ext.join("analysis.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&analysis).unwrap();
        assert_eq!(json["extension"], "my-extension");
        assert_eq!(json["manifest_version"], 3);
        assert_eq!(json["content_script_injected_into"][0], "<all_urls>");
        assert_eq!(json["bp"]["exfiltration_dangers"], serde_json::json!([]));
        assert_eq!(json["bp"]["code_stats"]["one_character_identifier_percentage"], -1);
    }

    #[test]
    fn parse_failure_marks_the_section_uncompilable() {
        let tmp = TempDir::new().unwrap();
        let ext = tmp.path().join("broken-extension");
        fs::create_dir_all(&ext).unwrap();
        fs::write(
            ext.join("manifest.json"),
            r#"{"manifest_version": 2, "background": {"scripts": ["bg.js"]}}"#,
        )
        .unwrap();
        fs::write(ext.join("bg.js"), "syntax error((").unwrap();
        // A parser that always fails.
        let script = tmp.path().join("failing-parser.sh");
        fs::write(&script, "#!/bin/sh\necho 'SyntaxError' >&2\nexit 1\n").unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();

        let mut cmd = Command::cargo_bin("crossflow").unwrap();
        cmd.env("HOME", tmp.path())
            .args(["scan"])
            .arg(&ext)
            .arg("--parser")
            .arg(&script)
            .arg("--quiet")
            .assert()
            .success();

        let analysis = fs::read_to_string(ext.join("analysis.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&analysis).unwrap();
        // The batch survives; the section is reported unavailable.
        assert_eq!(json["bp"]["code_stats"]["avg_identifier_length"], -1.0);
        assert!(json["benchmarks"]["bp"]["bp: uncompilable"].is_number());
    }
}
