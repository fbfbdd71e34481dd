use std::collections::{BTreeMap, BTreeSet};

use capstone::arch::arm::ArmCC;
use capstone::arch::ArchDetail;
use capstone::{arch, prelude::*, Capstone, InsnGroupId};
use goblin::{elf, mach, pe, Object};
use tracing::debug;

use crate::model::{Block, BlockId, CfgEdge, EdgeKind, EdgeTarget, Module, Symbol};
use crate::services::disasm::{read_binary, DisasmError, DisassemblyBackend, DisassemblyRequest};

const DEFAULT_MAX_INSTRUCTIONS: usize = 200_000;

/// Longest instruction we ask capstone to look at (x86 tops out at 15 bytes).
const MAX_INSN_BYTES: usize = 16;

/// Recursive-descent disassembler over ELF, PE and Mach-O images.
///
/// Decoding starts at function symbols and the entry point. Reached
/// instructions become code blocks, split at branch targets and after
/// terminators; every other allocated byte becomes data.
pub struct CapstoneBackend;

#[derive(Debug, Clone)]
struct SectionInfo {
    name: String,
    address: u64,
    size: u64,
    /// File bytes backing the section (absent for bss-like sections).
    file_range: Option<(usize, usize)>,
    executable: bool,
}

impl SectionInfo {
    fn contains(&self, address: u64) -> bool {
        address >= self.address && address - self.address < self.size
    }

    fn end(&self) -> u64 {
        self.address.saturating_add(self.size)
    }
}

#[derive(Debug, Clone)]
struct SymbolInfo {
    name: String,
    address: u64,
    is_function: bool,
}

#[derive(Debug, Default)]
struct Image {
    arch: Option<String>,
    sections: Vec<SectionInfo>,
    symbols: Vec<SymbolInfo>,
    entry: Option<u64>,
}

impl Image {
    fn section_at(&self, address: u64) -> Option<&SectionInfo> {
        self.sections.iter().find(|s| s.contains(address))
    }

    fn is_executable(&self, address: u64) -> bool {
        self.section_at(address).is_some_and(|s| s.executable)
    }

    /// Bytes from `address` to the end of its section's file data.
    fn bytes_at<'b>(&self, bytes: &'b [u8], address: u64) -> Option<&'b [u8]> {
        let section = self.section_at(address)?;
        let (start, end) = section.file_range?;
        let offset = usize::try_from(address - section.address).ok()?;
        let from = start.checked_add(offset)?;
        if from >= end {
            return None;
        }
        bytes.get(from..end)
    }
}

fn file_range(offset: u64, size: u64, bytes_len: usize) -> Option<(usize, usize)> {
    let start = usize::try_from(offset).ok()?;
    if size == 0 || start >= bytes_len {
        return None;
    }
    let end = start.saturating_add(usize::try_from(size).ok()?).min(bytes_len);
    Some((start, end))
}

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align).saturating_mul(align)
    }
}

fn elf_arch(machine: u16) -> Option<String> {
    match machine {
        elf::header::EM_X86_64 => Some("x86_64".into()),
        elf::header::EM_386 => Some("x86".into()),
        elf::header::EM_AARCH64 => Some("arm64".into()),
        elf::header::EM_ARM => Some("arm".into()),
        elf::header::EM_RISCV => Some("riscv64".into()),
        _ => None,
    }
}

fn load_elf(elf: &elf::Elf, bytes_len: usize) -> Image {
    let relocatable = elf.header.e_type == elf::header::ET_REL;
    let alloc = u64::from(elf::section_header::SHF_ALLOC);
    let exec = u64::from(elf::section_header::SHF_EXECINSTR);

    // Relocatable objects leave every section at address 0; lay them out back to back.
    let mut cursor = 0u64;
    let mut bases: Vec<Option<u64>> = Vec::with_capacity(elf.section_headers.len());
    let mut sections = Vec::new();
    for shdr in &elf.section_headers {
        if shdr.sh_flags & alloc == 0 || shdr.sh_size == 0 {
            bases.push(None);
            continue;
        }
        let address = if relocatable {
            let base = align_up(cursor, shdr.sh_addralign);
            cursor = base.saturating_add(shdr.sh_size);
            base
        } else {
            shdr.sh_addr
        };
        bases.push(Some(address));
        let backing = if shdr.sh_type == elf::section_header::SHT_NOBITS {
            None
        } else {
            file_range(shdr.sh_offset, shdr.sh_size, bytes_len)
        };
        sections.push(SectionInfo {
            name: elf.shdr_strtab.get_at(shdr.sh_name).unwrap_or("").to_string(),
            address,
            size: shdr.sh_size,
            file_range: backing,
            executable: shdr.sh_flags & exec != 0,
        });
    }

    let mut symbols = Vec::new();
    for sym in elf.syms.iter() {
        let kind = sym.st_type();
        if kind == elf::sym::STT_SECTION || kind == elf::sym::STT_FILE {
            continue;
        }
        let Some(Some(base)) = bases.get(sym.st_shndx) else { continue };
        let name = elf.strtab.get_at(sym.st_name).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        let address = if relocatable { base.saturating_add(sym.st_value) } else { sym.st_value };
        symbols.push(SymbolInfo { name: name.to_string(), address, is_function: sym.is_function() });
    }

    let entry = (!relocatable && elf.header.e_entry != 0).then_some(elf.header.e_entry);
    Image { arch: elf_arch(elf.header.e_machine), sections, symbols, entry }
}

fn load_pe(pe: &pe::PE, bytes_len: usize) -> Image {
    let image_base = pe.image_base as u64;
    let sections = pe
        .sections
        .iter()
        .filter_map(|sec| {
            let size = if sec.virtual_size == 0 { sec.size_of_raw_data } else { sec.virtual_size };
            if size == 0 {
                return None;
            }
            let raw = u64::from(sec.size_of_raw_data.min(size));
            Some(SectionInfo {
                name: sec.name().unwrap_or_default().to_string(),
                address: image_base + u64::from(sec.virtual_address),
                size: u64::from(size),
                file_range: file_range(u64::from(sec.pointer_to_raw_data), raw, bytes_len),
                executable: sec.characteristics & pe::section_table::IMAGE_SCN_MEM_EXECUTE != 0,
            })
        })
        .collect();
    let symbols = pe
        .exports
        .iter()
        .filter(|exp| exp.rva != 0)
        .filter_map(|exp| {
            let name = exp.name?;
            Some(SymbolInfo {
                name: name.to_string(),
                address: image_base + exp.rva as u64,
                is_function: true,
            })
        })
        .collect();
    let arch = match pe.header.coff_header.machine {
        pe::header::COFF_MACHINE_X86 => Some("x86".into()),
        pe::header::COFF_MACHINE_X86_64 => Some("x86_64".into()),
        pe::header::COFF_MACHINE_ARM64 => Some("arm64".into()),
        _ => None,
    };
    let entry = (pe.entry != 0).then(|| image_base + pe.entry as u64);
    Image { arch, sections, symbols, entry }
}

fn load_macho(bin: &mach::MachO, bytes_len: usize) -> Image {
    const S_ZEROFILL: u32 = 0x1;
    const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
    const S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;

    let mut sections = Vec::new();
    for (sec, _) in bin.segments.sections().flatten().filter_map(Result::ok) {
        if sec.size == 0 {
            continue;
        }
        let zerofill = sec.flags & 0xff == S_ZEROFILL;
        sections.push(SectionInfo {
            name: sec.name().unwrap_or("").to_string(),
            address: sec.addr,
            size: sec.size,
            file_range: if zerofill {
                None
            } else {
                file_range(u64::from(sec.offset), sec.size, bytes_len)
            },
            executable: sec.flags & (S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS) != 0,
        });
    }

    let mut symbols = Vec::new();
    for sym in bin.symbols() {
        let Ok((name, nlist)) = sym else { continue };
        if nlist.is_undefined() || nlist.is_stab() {
            continue;
        }
        let name = name.trim_start_matches('_');
        if name.is_empty() {
            continue;
        }
        let is_function =
            sections.iter().any(|s: &SectionInfo| s.executable && s.contains(nlist.n_value));
        symbols.push(SymbolInfo { name: name.to_string(), address: nlist.n_value, is_function });
    }

    let arch = match bin.header.cputype() {
        mach::cputype::CPU_TYPE_X86 => Some("x86".into()),
        mach::cputype::CPU_TYPE_X86_64 => Some("x86_64".into()),
        mach::cputype::CPU_TYPE_ARM => Some("arm".into()),
        mach::cputype::CPU_TYPE_ARM64 => Some("arm64".into()),
        _ => None,
    };
    let entry = (bin.entry != 0).then_some(bin.entry);
    Image { arch, sections, symbols, entry }
}

fn load_image(bytes: &[u8]) -> Result<Image, DisasmError> {
    match Object::parse(bytes) {
        Ok(Object::Elf(elf)) => Ok(load_elf(&elf, bytes.len())),
        Ok(Object::PE(pe)) => Ok(load_pe(&pe, bytes.len())),
        Ok(Object::Mach(mach::Mach::Binary(bin))) => Ok(load_macho(&bin, bytes.len())),
        Ok(_) => Err(DisasmError::Backend("unsupported object format".into())),
        Err(e) => Err(DisasmError::Backend(format!("failed to parse binary: {e}"))),
    }
}

fn make_cs(arch: &str) -> Result<Capstone, DisasmError> {
    let built = match arch {
        "x86_64" | "amd64" => {
            Capstone::new().x86().mode(arch::x86::ArchMode::Mode64).detail(true).build()
        }
        "x86" | "i386" => {
            Capstone::new().x86().mode(arch::x86::ArchMode::Mode32).detail(true).build()
        }
        "arm" | "armv7" => {
            Capstone::new().arm().mode(arch::arm::ArchMode::Arm).detail(true).build()
        }
        "arm64" | "aarch64" => {
            Capstone::new().arm64().mode(arch::arm64::ArchMode::Arm).detail(true).build()
        }
        "riscv" | "riscv64" => {
            Capstone::new().riscv().mode(arch::riscv::ArchMode::RiscV64).detail(true).build()
        }
        other => return Err(DisasmError::Backend(format!("unsupported architecture '{other}'"))),
    };
    built.map_err(|e| DisasmError::Backend(format!("capstone init failed: {e}")))
}

/// How control leaves an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Call(Option<u64>),
    Jump(Option<u64>),
    CondJump(Option<u64>),
    Return,
    Halt,
}

impl Flow {
    fn ends_block(self) -> bool {
        self != Flow::Next
    }
}

#[derive(Debug, Clone, Copy)]
struct DecodedInsn {
    len: u64,
    flow: Flow,
}

fn branch_target(detail: &capstone::InsnDetail) -> Option<u64> {
    detail.arch_detail().operands().iter().find_map(|op| match op {
        capstone::arch::ArchOperand::X86Operand(op) => match op.op_type {
            capstone::arch::x86::X86OperandType::Imm(imm) => Some(imm as u64),
            _ => None,
        },
        capstone::arch::ArchOperand::ArmOperand(op) => match op.op_type {
            capstone::arch::arm::ArmOperandType::Imm(imm) => Some(imm as u64),
            _ => None,
        },
        capstone::arch::ArchOperand::Arm64Operand(op) => match op.op_type {
            capstone::arch::arm64::Arm64OperandType::Imm(imm) => Some(imm as u64),
            _ => None,
        },
        _ => None,
    })
}

/// Whether a jump only sometimes transfers control.
///
/// ARM32 predicates any branch with a condition code, so the detail is
/// authoritative there; other architectures spell the condition in the mnemonic.
fn is_conditional(detail: &capstone::InsnDetail, mnemonic: &str) -> bool {
    if let ArchDetail::ArmDetail(arm) = detail.arch_detail() {
        return !matches!(arm.cc(), ArmCC::ARM_CC_AL | ArmCC::ARM_CC_INVALID);
    }
    let m = mnemonic.to_ascii_lowercase();
    (m.starts_with('j') && m != "jmp" && m != "jr")
        || m.starts_with("b.")
        || matches!(m.as_str(), "cbz" | "cbnz" | "tbz" | "tbnz" | "loop" | "loope" | "loopne")
        || ["beq", "bne", "blt", "bge"].iter().any(|p| m.starts_with(p))
}

fn decode_one(cs: &Capstone, code: &[u8], address: u64) -> Option<DecodedInsn> {
    let window = &code[..code.len().min(MAX_INSN_BYTES)];
    let insns = cs.disasm_count(window, address, 1).ok()?;
    let insn = insns.iter().next()?;
    let len = insn.bytes().len() as u64;
    if len == 0 {
        return None;
    }
    let mnemonic = insn.mnemonic().unwrap_or("");
    let detail = cs.insn_detail(insn).ok()?;
    let in_group = |group: u8| detail.groups().iter().any(|g| *g == InsnGroupId(group));

    let flow = if in_group(capstone::InsnGroupType::CS_GRP_RET as u8) {
        Flow::Return
    } else if in_group(capstone::InsnGroupType::CS_GRP_CALL as u8) {
        Flow::Call(branch_target(&detail))
    } else if in_group(capstone::InsnGroupType::CS_GRP_JUMP as u8) {
        let target = branch_target(&detail);
        if is_conditional(&detail, mnemonic) {
            Flow::CondJump(target)
        } else {
            Flow::Jump(target)
        }
    } else if matches!(mnemonic, "hlt" | "ud2") {
        Flow::Halt
    } else {
        Flow::Next
    };
    Some(DecodedInsn { len, flow })
}

/// Instructions reached from the seeds plus the addresses that must start a block.
#[derive(Debug, Default)]
struct Traversal {
    insns: BTreeMap<u64, DecodedInsn>,
    leaders: BTreeSet<u64>,
}

impl Traversal {
    /// Whether `[address, address + len)` collides with an already decoded instruction.
    fn conflicts(&self, address: u64, len: u64) -> bool {
        if let Some((start, insn)) = self.insns.range(..address).next_back() {
            if start + insn.len > address {
                return true;
            }
        }
        self.insns.range(address.saturating_add(1)..address.saturating_add(len)).next().is_some()
    }
}

fn traverse(
    cs: &Capstone,
    image: &Image,
    bytes: &[u8],
    seeds: &[u64],
    mut budget: usize,
) -> Traversal {
    let mut t = Traversal::default();
    let mut work: Vec<u64> = seeds.iter().rev().copied().collect();
    t.leaders.extend(seeds.iter().copied());

    while let Some(start) = work.pop() {
        let mut address = start;
        loop {
            if t.insns.contains_key(&address) || budget == 0 {
                break;
            }
            let Some(code) = image.bytes_at(bytes, address) else { break };
            let Some(insn) = decode_one(cs, code, address) else {
                debug!(address = %format!("0x{address:X}"), "decode failed");
                break;
            };
            if t.conflicts(address, insn.len) {
                break;
            }
            budget -= 1;
            t.insns.insert(address, insn);
            let next = address.saturating_add(insn.len);

            let mut follow = |target: Option<u64>, t: &mut Traversal| {
                if let Some(target) = target.filter(|a| image.is_executable(*a)) {
                    if t.leaders.insert(target) {
                        work.push(target);
                    }
                }
            };
            match insn.flow {
                Flow::Next => address = next,
                Flow::Call(target) | Flow::CondJump(target) => {
                    follow(target, &mut t);
                    t.leaders.insert(next);
                    address = next;
                }
                Flow::Jump(target) => {
                    follow(target, &mut t);
                    break;
                }
                Flow::Return | Flow::Halt => break,
            }
        }
    }
    t
}

struct CodeRun {
    start: u64,
    end: u64,
    last: Flow,
}

/// Group decoded instructions into maximal runs that start at leaders or after terminators.
fn code_runs(t: &Traversal) -> Vec<CodeRun> {
    let mut runs: Vec<CodeRun> = Vec::new();
    let mut open: Option<CodeRun> = None;
    for (&address, insn) in &t.insns {
        let end = address + insn.len;
        let extends = open
            .as_ref()
            .is_some_and(|run| run.end == address && !t.leaders.contains(&address));
        if extends {
            if let Some(run) = open.as_mut() {
                run.end = end;
                run.last = insn.flow;
            }
        } else {
            runs.extend(open.take());
            open = Some(CodeRun { start: address, end, last: insn.flow });
        }
        if insn.flow.ends_block() {
            runs.extend(open.take());
        }
    }
    runs.extend(open);
    runs
}

/// Uncovered sub-ranges of `[start, end)` given non-overlapping occupied ranges.
fn gaps(start: u64, end: u64, occupied: &BTreeMap<u64, u64>) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    let mut cursor = start;
    if let Some((_, prev_end)) = occupied.range(..start).next_back() {
        cursor = cursor.max(*prev_end);
    }
    for (&s, &e) in occupied.range(start..end) {
        if s > cursor {
            out.push((cursor, s));
        }
        cursor = cursor.max(e);
    }
    if cursor < end {
        out.push((cursor, end));
    }
    out
}

fn build_module(
    request: &DisassemblyRequest,
    arch: &str,
    image: &Image,
    t: &Traversal,
) -> Result<Module, DisasmError> {
    let mut module = Module::new(&request.binary_name);
    module.isa = Some(arch.to_string());
    module.binary_path = Some(request.binary_path.display().to_string());

    let runs = code_runs(t);
    let mut occupied: BTreeMap<u64, u64> = BTreeMap::new();
    let mut code_at: BTreeMap<u64, BlockId> = BTreeMap::new();
    for run in &runs {
        let id = module.add_block(Block::code(run.start, run.end - run.start))?;
        occupied.insert(run.start, run.end);
        code_at.insert(run.start, id);
    }

    for (index, run) in runs.iter().enumerate() {
        let source = code_at[&run.start];
        let to = |address: Option<u64>| match address.and_then(|a| code_at.get(&a)) {
            Some(id) => EdgeTarget::Block(*id),
            None => EdgeTarget::Proxy,
        };
        let fallthrough = runs
            .get(index + 1)
            .filter(|next| next.start == run.end)
            .map(|next| EdgeTarget::Block(code_at[&next.start]));
        let mut edges = Vec::new();
        match run.last {
            Flow::Next => {
                if let Some(target) = fallthrough {
                    edges.push((target, EdgeKind::Fallthrough));
                }
            }
            Flow::Call(target) => {
                let kind = if target.is_some() { EdgeKind::Call } else { EdgeKind::IndirectCall };
                edges.push((to(target), kind));
                if let Some(next) = fallthrough {
                    edges.push((next, EdgeKind::Fallthrough));
                }
            }
            Flow::CondJump(target) => {
                edges.push((to(target), EdgeKind::ConditionalBranch));
                if let Some(next) = fallthrough {
                    edges.push((next, EdgeKind::Fallthrough));
                }
            }
            Flow::Jump(Some(target)) => edges.push((to(Some(target)), EdgeKind::Branch)),
            Flow::Jump(None) => edges.push((EdgeTarget::Proxy, EdgeKind::IndirectBranch)),
            Flow::Return => edges.push((EdgeTarget::Proxy, EdgeKind::Return)),
            Flow::Halt => {}
        }
        for (target, kind) in edges {
            module.add_edge(CfgEdge { source, target, kind })?;
        }
    }

    // Data blocks fill every allocated byte not claimed by code, split at symbol addresses.
    let split_points: BTreeSet<u64> = image.symbols.iter().map(|s| s.address).collect();
    let mut sections: Vec<&SectionInfo> = image.sections.iter().collect();
    sections.sort_by_key(|s| (s.address, s.size));
    for section in sections {
        for (gap_start, gap_end) in gaps(section.address, section.end(), &occupied) {
            let mut cursor = gap_start;
            let cuts = split_points.range(gap_start.saturating_add(1)..gap_end).copied();
            for cut in cuts.chain(std::iter::once(gap_end)) {
                module.add_block(Block::data(cursor, cut - cursor))?;
                cursor = cut;
            }
            occupied.insert(gap_start, gap_end);
        }
        debug!(section = %section.name, "classified section");
    }

    for sym in &image.symbols {
        let referent = module.blocks().covering(sym.address).first().copied();
        module.add_symbol(Symbol::new(&sym.name, Some(sym.address), referent))?;
    }
    module.entry_point =
        image.entry.and_then(|entry| module.blocks().covering(entry).first().copied());

    Ok(module)
}

impl DisassemblyBackend for CapstoneBackend {
    fn disassemble(&self, request: &DisassemblyRequest) -> Result<Module, DisasmError> {
        let bytes = read_binary(&request.binary_path)?;
        if bytes.is_empty() {
            let mut module = Module::new(&request.binary_name);
            module.binary_path = Some(request.binary_path.display().to_string());
            return Ok(module);
        }

        let image = load_image(&bytes)?;
        let arch = request
            .arch
            .as_deref()
            .map(str::to_lowercase)
            .or_else(|| image.arch.clone())
            .unwrap_or_else(|| "x86_64".to_string());
        let cs = make_cs(&arch)?;

        let mut seeds: Vec<u64> = image
            .symbols
            .iter()
            .filter(|s| s.is_function && image.is_executable(s.address))
            .map(|s| s.address)
            .collect();
        seeds.extend(image.entry.filter(|e| image.is_executable(*e)));
        if seeds.is_empty() {
            seeds = image.sections.iter().filter(|s| s.executable).map(|s| s.address).collect();
        }
        seeds.sort_unstable();
        seeds.dedup();

        let budget = request.options.max_instructions.unwrap_or(DEFAULT_MAX_INSTRUCTIONS);
        let traversal = traverse(&cs, &image, &bytes, &seeds, budget);
        debug!(
            seeds = seeds.len(),
            instructions = traversal.insns.len(),
            leaders = traversal.leaders.len(),
            "traversal finished"
        );
        build_module(request, &arch, &image, &traversal)
    }

    fn name(&self) -> &'static str {
        "capstone"
    }

    fn description(&self) -> &'static str {
        "Capstone recursive-descent disassembly of ELF/PE/Mach-O images"
    }
}
