use std::fs;
use std::io::Cursor;
use std::path::Path;

use hintdis_core::hints::{
    log_file_name, render_predicate_csv, write_hint_logs, HintError, HintTable,
    PredicateRegistry,
};
use tempfile::tempdir;

fn table_from(text: &str, registry: PredicateRegistry) -> HintTable {
    let mut table = HintTable::new(registry);
    table.ingest_reader(Path::new("hints.tsv"), Cursor::new(text.as_bytes().to_vec())).unwrap();
    table
}

#[test]
fn writes_one_csv_per_predicate_with_final_hints() {
    let temp = tempdir().unwrap();
    let debug_dir = temp.path().join("debug");
    let table = table_from(
        "invalid\t0x100000\tmain\nbogus line\ninvalid\t0x20\ninvalid\t0x100000\tmain2\n",
        PredicateRegistry::default(),
    );

    let written = write_hint_logs(&table, &debug_dir).unwrap();
    assert_eq!(written, vec![debug_dir.join("invalid.csv")]);

    let body = fs::read_to_string(debug_dir.join("invalid.csv")).unwrap();
    assert_eq!(body, "32,\n1048576,main2\n");
    assert!(!body.contains("bogus"));
}

#[test]
fn predicates_without_hints_get_no_file() {
    let temp = tempdir().unwrap();
    let registry = PredicateRegistry::with_extra(["note"]);
    let table = table_from("note\t7\tx\n", registry);

    let written = write_hint_logs(&table, temp.path()).unwrap();
    assert_eq!(written, vec![temp.path().join("note.csv")]);
    assert!(!temp.path().join("invalid.csv").exists());
}

#[test]
fn labels_with_separators_are_quoted() {
    let table = table_from("invalid\t1\ta,b\ninvalid\t2\tsay \"hi\"\n", PredicateRegistry::default());
    assert_eq!(render_predicate_csv(&table, "invalid"), "1,\"a,b\"\n2,\"say \"\"hi\"\"\"\n");
}

#[test]
fn rewriting_logs_is_deterministic() {
    let temp = tempdir().unwrap();
    let table = table_from("invalid\t0x30\ninvalid\t0x10\tx\n", PredicateRegistry::default());
    write_hint_logs(&table, temp.path()).unwrap();
    let first = fs::read(temp.path().join("invalid.csv")).unwrap();
    write_hint_logs(&table, temp.path()).unwrap();
    let second = fs::read(temp.path().join("invalid.csv")).unwrap();
    assert_eq!(first, second);
    assert_eq!(String::from_utf8(first).unwrap(), "16,x\n48,\n");
}

#[test]
fn log_file_names_are_sanitized() {
    assert_eq!(log_file_name("invalid"), "invalid.csv");
    assert_eq!(log_file_name("../evil/name"), ".._evil_name.csv");
    assert_eq!(log_file_name("a b"), "a_b.csv");
}

#[test]
fn predicates_sharing_a_log_file_name_are_rejected() {
    let temp = tempdir().unwrap();
    let registry = PredicateRegistry::with_extra(["a b", "a_b"]);
    let table = table_from("a b\t1\tfirst\na_b\t2\tsecond\n", registry);

    let err = write_hint_logs(&table, temp.path()).unwrap_err();
    match err {
        HintError::LogNameCollision { file_name, first, second } => {
            assert_eq!(file_name, "a_b.csv");
            assert_eq!(first, "a b");
            assert_eq!(second, "a_b");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!temp.path().join("a_b.csv").exists());
}
