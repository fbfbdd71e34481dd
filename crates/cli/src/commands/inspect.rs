use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use hintdis_core::ir::load_ir;
use hintdis_core::model::{Block, Module, ProgramModel, Symbol};

#[derive(Debug, Serialize)]
pub struct SymbolView {
    pub module: String,
    pub name: String,
    pub address: Option<String>,
    pub block: Option<String>,
    pub kind: Option<String>,
    pub block_address: Option<String>,
    pub block_size: Option<u64>,
}

fn symbol_view(module: &Module, symbol: &Symbol) -> SymbolView {
    let block: Option<&Block> = module.referent(symbol);
    SymbolView {
        module: module.name.clone(),
        name: symbol.name.clone(),
        address: symbol.address.map(|a| format!("0x{a:X}")),
        block: symbol.referent.map(|id| id.to_string()),
        kind: block.map(|b| b.kind().to_string()),
        block_address: block.map(|b| format!("0x{:X}", b.address())),
        block_size: block.map(Block::size),
    }
}

/// Follow a symbol name to the block it refers to, across all modules.
pub fn lookup_symbol(model: &ProgramModel, name: &str) -> Option<SymbolView> {
    model.find_symbol(name).map(|(module, symbol)| symbol_view(module, symbol))
}

/// Print modules, blocks and symbols of a persisted IR, or a single symbol's referent.
pub fn show_command(ir: &str, symbol: Option<&str>, json: bool) -> Result<()> {
    let path = Path::new(ir);
    let model =
        load_ir(path).with_context(|| format!("Failed to load IR from {}", path.display()))?;

    if let Some(name) = symbol {
        let view =
            lookup_symbol(&model, name).ok_or_else(|| anyhow!("Symbol '{}' not found", name))?;
        if json {
            println!("{}", serde_json::to_string_pretty(&view)?);
        } else {
            match (&view.kind, &view.block_address, view.block_size) {
                (Some(kind), Some(addr), Some(size)) => println!(
                    "{} ({}) -> {} block {} at {} size {}",
                    view.name,
                    view.module,
                    kind,
                    view.block.as_deref().unwrap_or("?"),
                    addr,
                    size
                ),
                _ => println!("{} ({}) -> (no block)", view.name, view.module),
            }
        }
        return Ok(());
    }

    if json {
        let doc = hintdis_core::ir::to_document(&model);
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if model.modules.is_empty() {
        println!("Modules: (none)");
        return Ok(());
    }
    for module in &model.modules {
        println!("Module: {}", module.name);
        if let Some(isa) = &module.isa {
            println!("  ISA: {}", isa);
        }
        if let Some(entry) = module.entry_point {
            println!("  Entry: {}", entry);
        }
        println!("  Blocks:");
        for (id, block) in module.blocks().iter() {
            println!(
                "  - {} {} 0x{:X}..0x{:X} ({} bytes)",
                id,
                block.kind(),
                block.address(),
                block.end(),
                block.size()
            );
        }
        println!("  Symbols:");
        for sym in module.symbols() {
            let target = module
                .referent(sym)
                .map(|b| format!("{} 0x{:X}", b.kind(), b.address()))
                .unwrap_or_else(|| "(none)".to_string());
            println!("  - {} -> {}", sym.name, target);
        }
    }
    Ok(())
}
