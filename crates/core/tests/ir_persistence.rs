use std::fs;
use std::path::Path;

use hintdis_core::ir::{
    load_ir, parse_ir, render_ir, save_ir, IrError, IrFormat, CURRENT_FORMAT_VERSION,
};
use hintdis_core::model::{
    Block, CfgEdge, EdgeKind, EdgeTarget, ModelError, Module, ProgramModel, Symbol,
};
use tempfile::tempdir;

fn sample_model() -> ProgramModel {
    let mut module = Module::new("sample.bin");
    module.isa = Some("x86_64".into());
    let main = module.add_block(Block::code(0x1000, 0x20)).unwrap();
    let data = module.add_block(Block::data(0x1020, 0x10)).unwrap();
    module.add_symbol(Symbol::new("main", Some(0x1000), Some(main))).unwrap();
    module.add_symbol(Symbol::new("blob", Some(0x1020), Some(data))).unwrap();
    module.add_symbol(Symbol::new("puts", None, None)).unwrap();
    module
        .add_edge(CfgEdge { source: main, target: EdgeTarget::Proxy, kind: EdgeKind::Return })
        .unwrap();
    module.entry_point = Some(main);
    ProgramModel::with_module(module)
}

#[test]
fn json_and_yaml_files_load_back_identically() {
    let temp = tempdir().unwrap();
    let model = sample_model();
    for name in ["out/model.json", "model.yaml", "model.yml"] {
        let path = temp.path().join(name);
        save_ir(&model, &path).unwrap();
        assert_eq!(load_ir(&path).unwrap(), model, "mismatch for {name}");
    }
}

#[test]
fn format_follows_extension() {
    assert_eq!(IrFormat::from_path(Path::new("a.yaml")), IrFormat::Yaml);
    assert_eq!(IrFormat::from_path(Path::new("a.YML")), IrFormat::Yaml);
    assert_eq!(IrFormat::from_path(Path::new("a.json")), IrFormat::Json);
    assert_eq!(IrFormat::from_path(Path::new("a")), IrFormat::Json);
}

#[test]
fn rendered_json_is_tagged_and_stable() {
    let model = sample_model();
    let first = render_ir(&model, IrFormat::Json).unwrap();
    let second = render_ir(&model, IrFormat::Json).unwrap();
    assert_eq!(first, second);
    assert!(first.ends_with('\n'));

    let value: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(value["format_version"], CURRENT_FORMAT_VERSION);
    let blocks = value["modules"][0]["blocks"].as_array().unwrap();
    assert_eq!(blocks[0]["kind"], "code");
    assert_eq!(blocks[0]["address"], 0x1000);
    assert_eq!(blocks[1]["kind"], "data");
}

#[test]
fn unsupported_format_version_is_an_error() {
    let body = br#"{ "format_version": 99, "modules": [] }"#;
    match parse_ir(body, IrFormat::Json) {
        Err(IrError::UnsupportedFormatVersion { found, .. }) => assert_eq!(found, 99),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn dangling_symbol_referent_is_rejected_on_load() {
    let body = br#"{
        "format_version": 1,
        "modules": [{
            "name": "m",
            "blocks": [{ "id": 0, "kind": "data", "address": 16, "size": 4 }],
            "symbols": [{ "name": "ghost", "referent": 7 }]
        }]
    }"#;
    match parse_ir(body, IrFormat::Json) {
        Err(IrError::Model(ModelError::DanglingReferent { symbol, .. })) => {
            assert_eq!(symbol, "ghost")
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn missing_file_reports_path() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("missing.json");
    let err = load_ir(&path).unwrap_err();
    assert!(err.to_string().contains("missing.json"));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("bad.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(load_ir(&path), Err(IrError::Json(_))));
}
