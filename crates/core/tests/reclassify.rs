use std::io::Cursor;
use std::path::Path;

use hintdis_core::hints::{
    apply_hints, demote_block, resolve, HintTable, PredicateRegistry, Resolution,
};
use hintdis_core::model::{
    Block, BlockId, BlockKind, CfgEdge, EdgeKind, EdgeTarget, ModelError, Module, ProgramModel,
    Symbol,
};

struct Fixture {
    model: ProgramModel,
    main: BlockId,
    helper: BlockId,
    table: BlockId,
}

/// main [0x1000, 0x1010) calls helper [0x1010, 0x1020); table [0x1020, 0x1040) is data.
fn fixture() -> Fixture {
    let mut module = Module::new("prog");
    let main = module.add_block(Block::code(0x1000, 0x10)).unwrap();
    let helper = module.add_block(Block::code(0x1010, 0x10)).unwrap();
    let table = module.add_block(Block::data(0x1020, 0x20)).unwrap();
    module.add_symbol(Symbol::new("main", Some(0x1000), Some(main))).unwrap();
    module.add_symbol(Symbol::new("helper", Some(0x1010), Some(helper))).unwrap();
    module.add_symbol(Symbol::new("table", Some(0x1020), Some(table))).unwrap();
    module
        .add_edge(CfgEdge {
            source: main,
            target: EdgeTarget::Block(helper),
            kind: EdgeKind::Call,
        })
        .unwrap();
    module
        .add_edge(CfgEdge { source: helper, target: EdgeTarget::Proxy, kind: EdgeKind::Return })
        .unwrap();
    module.entry_point = Some(main);
    Fixture { model: ProgramModel::with_module(module), main, helper, table }
}

fn hints(text: &str) -> HintTable {
    let mut table = HintTable::new(PredicateRegistry::default());
    table.ingest_reader(Path::new("hints.tsv"), Cursor::new(text.as_bytes().to_vec())).unwrap();
    table
}

fn prog(model: &ProgramModel) -> &Module {
    model.module("prog").unwrap()
}

#[test]
fn invalid_hint_demotes_main_to_data_with_same_range() {
    let mut fx = fixture();
    let report = apply_hints(&mut fx.model, &hints("invalid\t0x1000\tmain\n")).unwrap();

    assert_eq!(report.demoted.len(), 1);
    assert_eq!(report.demoted[0].block, fx.main);
    assert_eq!(report.demoted[0].hint_line, 1);

    let module = prog(&fx.model);
    let block = module.symbol_referent("main").unwrap();
    assert_eq!(block.kind(), BlockKind::Data);
    assert_eq!(block.address(), 0x1000);
    assert_eq!(block.size(), 0x10);
    assert!(module.block(fx.helper).unwrap().is_code());
    assert_eq!(module.code_block_count(), 1);
    assert_eq!(module.data_block_count(), 2);
    module.validate().unwrap();
}

#[test]
fn hint_inside_block_demotes_the_covering_block() {
    let mut fx = fixture();
    apply_hints(&mut fx.model, &hints("invalid\t0x1018\n")).unwrap();
    let module = prog(&fx.model);
    assert!(module.block(fx.helper).unwrap().is_data());
    assert!(module.block(fx.main).unwrap().is_code());
}

#[test]
fn demotion_removes_edges_touching_the_block() {
    let mut fx = fixture();
    let report = apply_hints(&mut fx.model, &hints("invalid\t0x1010\n")).unwrap();
    assert_eq!(report.removed_edges, 2);
    let module = prog(&fx.model);
    assert!(module.cfg().is_empty());
    assert_eq!(module.entry_point, Some(fx.main));
}

#[test]
fn unresolved_address_is_a_noop() {
    let mut fx = fixture();
    let before = fx.model.clone();
    let report = apply_hints(&mut fx.model, &hints("invalid\t0x9999\n")).unwrap();
    assert_eq!(report.unresolved, 1);
    assert!(report.demoted.is_empty());
    assert_eq!(fx.model, before);
}

#[test]
fn hint_on_data_block_changes_nothing() {
    let mut fx = fixture();
    let before = fx.model.clone();
    let report = apply_hints(&mut fx.model, &hints("invalid\t0x1030\n")).unwrap();
    assert_eq!(report.already_data, 1);
    assert_eq!(fx.model, before);
    assert!(prog(&fx.model).block(fx.table).unwrap().is_data());
}

#[test]
fn applying_twice_is_idempotent() {
    let mut fx = fixture();
    let table = hints("invalid\t0x1000\ninvalid\t0x1010\n");
    apply_hints(&mut fx.model, &table).unwrap();
    let once = fx.model.clone();
    let second = apply_hints(&mut fx.model, &table).unwrap();
    assert!(second.demoted.is_empty());
    assert_eq!(second.already_data, 2);
    assert_eq!(second.duplicate, 0);
    assert_eq!(fx.model, once);
}

#[test]
fn data_blocks_are_never_promoted_and_block_count_is_stable() {
    let mut fx = fixture();
    let blocks_before = prog(&fx.model).blocks().len();
    let data_before = prog(&fx.model).data_block_count();
    apply_hints(&mut fx.model, &hints("invalid\t0x1000\ninvalid\t0x1020\n")).unwrap();
    let module = prog(&fx.model);
    assert_eq!(module.blocks().len(), blocks_before);
    assert!(module.data_block_count() >= data_before);
}

#[test]
fn two_hints_in_one_block_demote_it_once() {
    let mut fx = fixture();
    let report = apply_hints(&mut fx.model, &hints("invalid\t0x1000\ninvalid\t0x1004\n")).unwrap();
    assert_eq!(report.demoted.len(), 1);
    assert_eq!(report.duplicate, 1);
    assert_eq!(report.already_data, 0);
}

#[test]
fn record_only_predicates_do_not_reclassify() {
    let mut fx = fixture();
    let before = fx.model.clone();
    let mut table = HintTable::new(PredicateRegistry::with_extra(["note"]));
    table.ingest_reader(Path::new("h"), Cursor::new(b"note\t0x1000\n".to_vec())).unwrap();
    let report = apply_hints(&mut fx.model, &table).unwrap();
    assert!(report.demoted.is_empty());
    assert_eq!(fx.model, before);
}

#[test]
fn ambiguous_coverage_fails_and_leaves_model_untouched() {
    let mut fx = fixture();
    fx.model.modules[0].add_block(Block::code(0x2000, 0x10)).unwrap();
    fx.model.modules[0].add_block(Block::code(0x2008, 0x10)).unwrap();
    let before = fx.model.clone();

    // The first hint is fine on its own; the second one must abort the whole pass.
    let err = apply_hints(&mut fx.model, &hints("invalid\t0x1000\ninvalid\t0x200c\n")).unwrap_err();
    assert!(matches!(err, ModelError::AmbiguousAddress { address: 0x200c, .. }));
    assert_eq!(fx.model, before);
}

#[test]
fn partially_overlapped_code_block_is_not_demoted() {
    let mut fx = fixture();
    // Overlaps the tail of main but does not cover 0x1000.
    fx.model.modules[0].add_block(Block::data(0x100c, 0x8)).unwrap();
    let before = fx.model.clone();

    let err = apply_hints(&mut fx.model, &hints("invalid\t0x1000\n")).unwrap_err();
    match err {
        ModelError::OverlappingBlocks { block, .. } => assert_eq!(block, fx.main),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.model, before);
}

#[test]
fn resolve_reports_block_kind() {
    let fx = fixture();
    let module = prog(&fx.model);
    assert_eq!(resolve(module, 0x1000).unwrap(), Resolution::Code(fx.main));
    assert_eq!(resolve(module, 0x1020).unwrap(), Resolution::Data(fx.table));
    assert_eq!(resolve(module, 0x1040).unwrap(), Resolution::Unresolved);
}

#[test]
fn demote_block_keeps_handle_and_symbols() {
    let mut fx = fixture();
    let module = &mut fx.model.modules[0];
    let removed = demote_block(module, fx.main).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(module.symbol("main").unwrap().referent, Some(fx.main));
    assert!(module.block(fx.main).unwrap().is_data());
    assert_eq!(demote_block(module, fx.main).unwrap(), 0);
}
