use std::fmt;

/// One parsed line of a hints file.
///
/// Only the predicate, address and optional label survive parsing; any
/// further tab-separated fields are dropped here and never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintRecord {
    predicate: String,
    address: u64,
    label: Option<String>,
}

impl HintRecord {
    pub fn new(predicate: impl Into<String>, address: u64, label: Option<String>) -> Self {
        Self { predicate: predicate.into(), address, label }
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Why a hint line could not be turned into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Fewer than two tab-separated fields.
    MissingAddress,
    EmptyPredicate,
    /// Address is neither `0x`-hex nor decimal, or does not fit in 64 bits.
    InvalidAddress,
    /// Predicate is not in the registry (checked after parsing).
    UnknownPredicate,
    /// Line is not valid UTF-8.
    InvalidEncoding,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::MissingAddress => "missing address field",
            RejectReason::EmptyPredicate => "empty predicate",
            RejectReason::InvalidAddress => "invalid address",
            RejectReason::UnknownPredicate => "unknown predicate",
            RejectReason::InvalidEncoding => "invalid encoding",
        };
        f.write_str(text)
    }
}

/// Result of parsing a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Record(HintRecord),
    /// Blank line or `#` comment.
    Skipped,
    Rejected(RejectReason),
}

/// Parse one line of a hints file: `predicate<TAB>address[<TAB>label[<TAB>...]]`.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return ParsedLine::Skipped;
    }

    let mut fields = line.split('\t');
    let predicate = fields.next().unwrap_or_default().trim();
    let Some(address_field) = fields.next() else {
        return ParsedLine::Rejected(RejectReason::MissingAddress);
    };
    if predicate.is_empty() {
        return ParsedLine::Rejected(RejectReason::EmptyPredicate);
    }
    let Some(address) = parse_address(address_field.trim()) else {
        return ParsedLine::Rejected(RejectReason::InvalidAddress);
    };
    let label = fields.next().filter(|l| !l.is_empty()).map(str::to_string);

    ParsedLine::Record(HintRecord::new(predicate, address, label))
}

/// Parse an unsigned 64-bit address in `0x`-prefixed hexadecimal or decimal form.
pub fn parse_address(token: &str) -> Option<u64> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return u64::from_str_radix(hex, 16).ok();
    }
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
