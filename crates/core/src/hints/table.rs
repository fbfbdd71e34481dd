use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::record::{parse_line, HintRecord, ParsedLine, RejectReason};
use super::registry::{Predicate, PredicateRegistry};
use super::HintError;

/// Where an accepted hint came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HintSource {
    pub path: PathBuf,
    /// 1-based line number.
    pub line: usize,
}

/// A validated hint plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedHint {
    record: HintRecord,
    source: HintSource,
}

impl AcceptedHint {
    pub fn record(&self) -> &HintRecord {
        &self.record
    }

    pub fn source(&self) -> &HintSource {
        &self.source
    }

    pub fn predicate(&self) -> &str {
        self.record.predicate()
    }

    pub fn address(&self) -> u64 {
        self.record.address()
    }

    pub fn label(&self) -> Option<&str> {
        self.record.label()
    }
}

/// Counters describing how hint lines were handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HintLoadReport {
    pub files: usize,
    pub lines: usize,
    pub skipped: usize,
    pub rejected: usize,
    /// Accepted lines later replaced by a line with the same predicate and address.
    pub superseded: usize,
    /// Hints in the final table.
    pub accepted: usize,
}

/// Final, deduplicated set of accepted hints.
///
/// Keyed by `(registry position, address)`, so iteration groups hints by
/// predicate in registry order with ascending addresses. Inserting an
/// existing key replaces the previous hint (last line wins).
#[derive(Debug, Clone)]
pub struct HintTable {
    registry: PredicateRegistry,
    entries: BTreeMap<(usize, u64), AcceptedHint>,
    report: HintLoadReport,
}

impl HintTable {
    pub fn new(registry: PredicateRegistry) -> Self {
        Self { registry, entries: BTreeMap::new(), report: HintLoadReport::default() }
    }

    pub fn registry(&self) -> &PredicateRegistry {
        &self.registry
    }

    pub fn report(&self) -> &HintLoadReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold a sequence of `(line number, parse result)` pairs from one source into the table.
    pub fn ingest<I>(&mut self, path: &Path, lines: I)
    where
        I: IntoIterator<Item = (usize, ParsedLine)>,
    {
        for (line, parsed) in lines {
            self.report.lines += 1;
            match parsed {
                ParsedLine::Skipped => self.report.skipped += 1,
                ParsedLine::Rejected(reason) => self.reject(line, reason),
                ParsedLine::Record(record) => {
                    let Some(position) = self.registry.position(record.predicate()) else {
                        self.reject(line, RejectReason::UnknownPredicate);
                        continue;
                    };
                    let key = (position, record.address());
                    let source = HintSource { path: path.to_path_buf(), line };
                    if self.entries.insert(key, AcceptedHint { record, source }).is_some() {
                        self.report.superseded += 1;
                    }
                }
            }
        }
        self.report.accepted = self.entries.len();
    }

    /// Read and ingest lines from `reader`, one at a time.
    ///
    /// Lines that are not valid UTF-8 are rejected; I/O failures are fatal.
    pub fn ingest_reader<R: BufRead>(&mut self, path: &Path, mut reader: R) -> Result<(), HintError> {
        let mut buf = Vec::new();
        let mut line_no = 0usize;
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| HintError::Read { path: path.to_path_buf(), source })?;
            if n == 0 {
                break;
            }
            line_no += 1;
            let result = match std::str::from_utf8(&buf) {
                Ok(text) => parse_line(text),
                Err(_) => ParsedLine::Rejected(RejectReason::InvalidEncoding),
            };
            self.ingest(path, std::iter::once((line_no, result)));
        }
        self.report.files += 1;
        Ok(())
    }

    /// Open and ingest one hints file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), HintError> {
        let file = File::open(path)
            .map_err(|source| HintError::Read { path: path.to_path_buf(), source })?;
        self.ingest_reader(path, BufReader::new(file))
    }

    pub fn get(&self, predicate: &str, address: u64) -> Option<&AcceptedHint> {
        let position = self.registry.position(predicate)?;
        self.entries.get(&(position, address))
    }

    /// All hints, grouped by predicate in registry order, addresses ascending.
    pub fn iter(&self) -> impl Iterator<Item = &AcceptedHint> {
        self.entries.values()
    }

    /// Hints for one predicate, addresses ascending.
    pub fn for_predicate<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a AcceptedHint> + 'a {
        self.registry.position(name).into_iter().flat_map(move |p| {
            self.entries.range((p, 0)..=(p, u64::MAX)).map(|(_, hint)| hint)
        })
    }

    /// Predicates that have at least one accepted hint, in registry order.
    pub fn predicates_with_hints(&self) -> Vec<&Predicate> {
        let positions: BTreeSet<usize> = self.entries.keys().map(|(p, _)| *p).collect();
        positions.into_iter().filter_map(|p| self.registry.get(p)).collect()
    }

    /// Addresses hinted under more than one predicate, ascending.
    pub fn conflicting_addresses(&self) -> Vec<u64> {
        let mut seen: BTreeMap<u64, usize> = BTreeMap::new();
        for (_, address) in self.entries.keys() {
            *seen.entry(*address).or_default() += 1;
        }
        seen.into_iter().filter(|(_, count)| *count > 1).map(|(address, _)| address).collect()
    }

    fn reject(&mut self, line: usize, reason: RejectReason) {
        self.report.rejected += 1;
        debug!(line, %reason, "dropped hint line");
    }
}

/// Load hint files in declaration order into one table.
///
/// Every file is opened before any line is processed, so an unreadable file
/// fails the whole load up front. Later files override earlier ones for the
/// same predicate and address.
pub fn load_hint_files<P: AsRef<Path>>(
    paths: &[P],
    registry: PredicateRegistry,
) -> Result<HintTable, HintError> {
    let mut opened = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|source| HintError::Read { path: path.to_path_buf(), source })?;
        opened.push((path, file));
    }

    let mut table = HintTable::new(registry);
    for (path, file) in opened {
        table.ingest_reader(path, BufReader::new(file))?;
        info!(path = %path.display(), accepted = table.len(), "loaded hints file");
    }

    for address in table.conflicting_addresses() {
        warn!(address = %format!("0x{address:X}"), "address hinted by multiple predicates");
    }
    let report = table.report();
    info!(
        files = report.files,
        accepted = report.accepted,
        rejected = report.rejected,
        superseded = report.superseded,
        "hint validation finished"
    );
    Ok(table)
}
