use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::table::HintTable;
use super::HintError;

/// Write one `<predicate>.csv` per predicate that has accepted hints.
///
/// Rows are `address,label` in final table order; the address is decimal and
/// the label is empty when absent. Existing files are overwritten. Returns the
/// written paths in registry order.
///
/// Two predicates whose names map to the same file name are an error, raised
/// before any file is written.
pub fn write_hint_logs(table: &HintTable, debug_dir: &Path) -> Result<Vec<PathBuf>, HintError> {
    let mut targets: BTreeMap<String, &str> = BTreeMap::new();
    let mut planned = Vec::new();
    for predicate in table.predicates_with_hints() {
        let file_name = log_file_name(&predicate.name);
        if let Some(first) = targets.get(&file_name) {
            return Err(HintError::LogNameCollision {
                file_name,
                first: first.to_string(),
                second: predicate.name.clone(),
            });
        }
        targets.insert(file_name.clone(), &predicate.name);
        planned.push((predicate, file_name));
    }

    fs::create_dir_all(debug_dir)
        .map_err(|source| HintError::WriteLog { path: debug_dir.to_path_buf(), source })?;

    let mut written = Vec::new();
    for (predicate, file_name) in planned {
        let path = debug_dir.join(file_name);
        let body = render_predicate_csv(table, &predicate.name);
        fs::write(&path, body)
            .map_err(|source| HintError::WriteLog { path: path.clone(), source })?;
        debug!(path = %path.display(), predicate = %predicate.name, "wrote hint log");
        written.push(path);
    }
    Ok(written)
}

/// CSV body for one predicate's accepted hints.
pub fn render_predicate_csv(table: &HintTable, predicate: &str) -> String {
    let mut out = String::new();
    for hint in table.for_predicate(predicate) {
        out.push_str(&hint.address().to_string());
        out.push(',');
        out.push_str(&csv_field(hint.label().unwrap_or_default()));
        out.push('\n');
    }
    out
}

/// File name for a predicate's log; characters unsafe in file names become `_`.
pub fn log_file_name(predicate: &str) -> String {
    let stem: String = predicate
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    format!("{stem}.csv")
}

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
