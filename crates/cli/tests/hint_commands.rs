use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use hintdis::commands::{apply_hints_command, check_hints_command, ApplyHintsArgs};
use predicates::prelude::*;
use tempfile::tempdir;

/// IR with `main` as a code block at 0x100000 and a data block right after it.
fn write_ir(path: &Path) {
    let body = r#"{
  "format_version": 1,
  "modules": [
    {
      "name": "prog",
      "isa": "x86_64",
      "entry_point": 0,
      "blocks": [
        { "id": 0, "kind": "code", "address": 1048576, "size": 42 },
        { "id": 1, "kind": "data", "address": 1048618, "size": 16 }
      ],
      "symbols": [
        { "name": "main", "address": 1048576, "referent": 0 },
        { "name": "table", "address": 1048618, "referent": 1 }
      ],
      "cfg": [
        { "source": 0, "target": "proxy", "kind": "return" }
      ]
    }
  ]
}
"#;
    fs::write(path, body).unwrap();
}

#[test]
fn apply_hints_demotes_main_and_writes_debug_csv() {
    let temp = tempdir().unwrap();
    let ir = temp.path().join("prog.json");
    write_ir(&ir);
    let hints = temp.path().join("hints.tsv");
    fs::write(&hints, "invalid\t0x100000\tmain\n").unwrap();
    let debug = temp.path().join("debug");
    let out = temp.path().join("out.json");

    cargo_bin_cmd!("hintdis")
        .arg("apply-hints")
        .arg("--ir")
        .arg(&ir)
        .arg("--out")
        .arg(&out)
        .arg("--hints")
        .arg(&hints)
        .arg("--debug-dir")
        .arg(&debug)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 block(s) demoted to data"));

    let csv = fs::read_to_string(debug.join("invalid.csv")).unwrap();
    assert_eq!(csv, "1048576,main\n");
    assert!(!csv.contains("0x100000"));

    let output = cargo_bin_cmd!("hintdis")
        .arg("show")
        .arg("--ir")
        .arg(&out)
        .args(["--symbol", "main", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let view: serde_json::Value = serde_json::from_slice(&output).expect("show json");
    assert_eq!(view["kind"], "data");
    assert_eq!(view["block_address"], "0x100000");
    assert_eq!(view["block_size"], 42);

    // The input IR is untouched when --out is given.
    let original: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&ir).unwrap()).unwrap();
    assert_eq!(original["modules"][0]["blocks"][0]["kind"], "code");
}

#[test]
fn apply_hints_rewrites_in_place_and_drops_edges() {
    let temp = tempdir().unwrap();
    let ir = temp.path().join("prog.json");
    write_ir(&ir);
    let hints = temp.path().join("hints.tsv");
    fs::write(&hints, "invalid\t1048600\n").unwrap();

    apply_hints_command(&ApplyHintsArgs {
        ir: ir.display().to_string(),
        hints: vec![hints.display().to_string()],
        ..ApplyHintsArgs::default()
    })
    .unwrap();

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&ir).unwrap()).unwrap();
    assert_eq!(doc["modules"][0]["blocks"][0]["kind"], "data");
    assert!(doc["modules"][0]["cfg"].as_array().unwrap().is_empty());
    assert_eq!(doc["modules"][0]["symbols"][0]["referent"], 0);
}

#[test]
fn unresolved_hint_leaves_ir_unchanged() {
    let temp = tempdir().unwrap();
    let ir = temp.path().join("prog.json");
    write_ir(&ir);
    let out = temp.path().join("out.json");
    let hints = temp.path().join("hints.tsv");
    fs::write(&hints, "invalid\t0x5\n").unwrap();

    apply_hints_command(&ApplyHintsArgs {
        ir: ir.display().to_string(),
        out: Some(out.display().to_string()),
        hints: vec![hints.display().to_string()],
        ..ApplyHintsArgs::default()
    })
    .unwrap();

    let before = hintdis_core::ir::load_ir(&ir).unwrap();
    let after = hintdis_core::ir::load_ir(&out).unwrap();
    assert_eq!(before, after);
}

#[test]
fn missing_hints_file_is_fatal() {
    let temp = tempdir().unwrap();
    let ir = temp.path().join("prog.json");
    write_ir(&ir);

    cargo_bin_cmd!("hintdis")
        .arg("apply-hints")
        .arg("--ir")
        .arg(&ir)
        .arg("--hints")
        .arg(temp.path().join("absent.tsv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read hints file"));

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&ir).unwrap()).unwrap();
    assert_eq!(doc["modules"][0]["blocks"][0]["kind"], "code");
}

#[test]
fn apply_hints_without_files_errors() {
    let temp = tempdir().unwrap();
    let ir = temp.path().join("prog.json");
    write_ir(&ir);
    let err = apply_hints_command(&ApplyHintsArgs {
        ir: ir.display().to_string(),
        ..ApplyHintsArgs::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("No hint files"));
}

#[test]
fn config_file_supplies_hints_and_debug_dir() {
    let temp = tempdir().unwrap();
    let ir = temp.path().join("prog.json");
    write_ir(&ir);
    fs::write(temp.path().join("cfg_hints.tsv"), "invalid\t0x100000\n").unwrap();
    let config = temp.path().join("hintdis.yaml");
    fs::write(&config, "hints: [cfg_hints.tsv]\ndebug_dir: logs\n").unwrap();

    apply_hints_command(&ApplyHintsArgs {
        ir: ir.display().to_string(),
        config: Some(config.display().to_string()),
        ..ApplyHintsArgs::default()
    })
    .unwrap();

    assert_eq!(fs::read_to_string(temp.path().join("logs/invalid.csv")).unwrap(), "1048576,\n");
}

#[test]
fn apply_hints_report_records_hint_hashes() {
    let temp = tempdir().unwrap();
    let ir = temp.path().join("prog.json");
    write_ir(&ir);
    let hints = temp.path().join("hints.tsv");
    fs::write(&hints, "invalid\t0x100000\n").unwrap();
    let report = temp.path().join("reports/run.json");

    apply_hints_command(&ApplyHintsArgs {
        ir: ir.display().to_string(),
        hints: vec![hints.display().to_string()],
        report: Some(report.display().to_string()),
        ..ApplyHintsArgs::default()
    })
    .unwrap();

    let body: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(body["command"], "apply-hints");
    assert_eq!(body["hints"][0]["sha256"].as_str().unwrap().len(), 64);
    assert_eq!(body["outcome"]["reclassify"]["demoted"].as_array().unwrap().len(), 1);
    assert!(body["started_at"].as_str().unwrap().contains('T'));
}

#[test]
fn check_hints_json_reports_counts_and_conflicts() {
    let temp = tempdir().unwrap();
    let hints = temp.path().join("hints.tsv");
    fs::write(&hints, "# comment\ninvalid\t0x10\tx\nnote\t0x10\nbad\ninvalid\t0x10\ty\n").unwrap();

    let output = cargo_bin_cmd!("hintdis")
        .arg("check-hints")
        .arg("--hints")
        .arg(&hints)
        .args(["--predicate", "note", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value = serde_json::from_slice(&output).expect("check json");
    assert_eq!(body["load"]["lines"], 5);
    assert_eq!(body["load"]["skipped"], 1);
    assert_eq!(body["load"]["rejected"], 1);
    assert_eq!(body["load"]["superseded"], 1);
    assert_eq!(body["load"]["accepted"], 2);
    assert_eq!(body["hints"][0]["label"], "y");
    assert_eq!(body["conflicting_addresses"][0], "0x10");
}

#[test]
fn check_hints_counts_unknown_predicates_as_rejected() {
    let temp = tempdir().unwrap();
    let hints = temp.path().join("hints.tsv");
    fs::write(&hints, "note\t0x10\n").unwrap();
    check_hints_command(&[hints.display().to_string()], &[], false).unwrap();

    cargo_bin_cmd!("hintdis")
        .arg("check-hints")
        .arg("--hints")
        .arg(&hints)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 accepted").and(predicate::str::contains("1 rejected")));
}

#[test]
fn malformed_and_extra_field_hints_through_apply_hints() {
    let temp = tempdir().unwrap();
    let ir = temp.path().join("prog.json");
    // `main` at 0x401000; neither 0x0 nor 0x100000 is covered.
    let body = r#"{
  "format_version": 1,
  "modules": [
    {
      "name": "prog",
      "isa": "x86_64",
      "entry_point": 0,
      "blocks": [
        { "id": 0, "kind": "code", "address": 4198400, "size": 16 }
      ],
      "symbols": [
        { "name": "main", "address": 4198400, "referent": 0 }
      ],
      "cfg": []
    }
  ]
}
"#;
    fs::write(&ir, body).unwrap();
    let hints = temp.path().join("hints.tsv");
    fs::write(
        &hints,
        "not-a-real-predicate\t10\n\
         invalid\tnot-address\tbad-hint\n\
         invalid\t0x100000\n\
         invalid\t0x0\tuser-provided-extra-field\tthe-extra-field\n\
         invalid\t4198400\tuser-provided-hint\n",
    )
    .unwrap();
    let debug = temp.path().join("debug");

    cargo_bin_cmd!("hintdis")
        .arg("apply-hints")
        .arg("--ir")
        .arg(&ir)
        .arg("--hints")
        .arg(&hints)
        .arg("--debug-dir")
        .arg(&debug)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("3 accepted")
                .and(predicate::str::contains("2 rejected"))
                .and(predicate::str::contains("1 block(s) demoted to data")),
        );

    let csv = fs::read_to_string(debug.join("invalid.csv")).unwrap();
    assert_eq!(csv, "0,user-provided-extra-field\n1048576,\n4198400,user-provided-hint\n");
    assert!(csv.contains("user-provided-extra-field"));
    assert!(csv.contains("user-provided-hint"));
    assert!(!csv.contains("the-extra-field"));
    assert!(!csv.contains("bad-hint"));
    assert!(!csv.contains("0x100000"));

    let output = cargo_bin_cmd!("hintdis")
        .arg("show")
        .arg("--ir")
        .arg(&ir)
        .args(["--symbol", "main", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let view: serde_json::Value = serde_json::from_slice(&output).expect("show json");
    assert_eq!(view["kind"], "data");
    assert_eq!(view["block_address"], "0x401000");
    assert_eq!(view["block_size"], 16);
}
