//! The mastership transfer journal (`spec.md` §4.6, §6): S-expression
//! `acqm`/`finm` records and an append-only log the recovery driver reads
//! back on startup. `spec.md`'s Non-goals exclude the on-disk transaction
//! log *file format*, not this in-process record shape, which the
//! protocol cannot be exercised without.

use crate::error::{Error, Result};

/// One journal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// `(acqm "pathname" "sep" "requestid")` -- opens a pending transfer.
    Acqm { pathname: String, sep: String, requestid: String },
    /// `(finm "pathname" "sep" "id")` -- closes the transfer named by
    /// `id`, which is either the matching `requestid` or `grantid`.
    Finm { pathname: String, sep: String, id: String },
}

impl Record {
    /// Encodes this record to its wire line, including the trailing `\n`.
    pub fn encode(&self) -> String {
        match self {
            Record::Acqm { pathname, sep, requestid } => {
                format!("(acqm {} {} {})\n", quote(pathname), quote(sep), quote(requestid))
            }
            Record::Finm { pathname, sep, id } => {
                format!("(finm {} {} {})\n", quote(pathname), quote(sep), quote(id))
            }
        }
    }

    /// Decodes a single record line (without its trailing newline).
    pub fn decode(line: &str) -> Result<Record> {
        let line = line.trim_end_matches(['\n', '\r']);
        let inner = line
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| Error::InvalidArgs(format!("malformed journal record: {line}")))?;

        let (tag, rest) = inner.split_once(' ').ok_or_else(|| Error::InvalidArgs("missing record tag".into()))?;
        let fields = split_quoted_fields(rest)?;
        let [a, b, c]: [String; 3] = fields
            .try_into()
            .map_err(|_| Error::InvalidArgs(format!("expected 3 fields in record: {line}")))?;

        match tag {
            "acqm" => Ok(Record::Acqm { pathname: a, sep: b, requestid: c }),
            "finm" => Ok(Record::Finm { pathname: a, sep: b, id: c }),
            other => Err(Error::InvalidArgs(format!("unknown record tag: {other}"))),
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn split_quoted_fields(s: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' {
            continue;
        }
        if c != '"' {
            return Err(Error::InvalidArgs(format!("expected quoted field, found {c:?}")));
        }
        let mut field = String::new();
        loop {
            match chars.next() {
                None => return Err(Error::InvalidArgs("unterminated quoted field".into())),
                Some('\\') => match chars.next() {
                    Some(escaped) => field.push(escaped),
                    None => return Err(Error::InvalidArgs("dangling escape in quoted field".into())),
                },
                Some('"') => break,
                Some(other) => field.push(other),
            }
        }
        fields.push(field);
    }
    Ok(fields)
}

/// An append-only sequence of journal records, read back in full on
/// startup by the mastership recovery driver.
pub trait Journal: Send + Sync {
    fn append(&self, record: Record);
    /// All records appended since the journal was created (or since the
    /// last truncation), in append order.
    fn records_since_start(&self) -> Vec<Record>;
}

/// An in-memory journal, sufficient for tests and for an in-process
/// repository that doesn't need to survive a real process crash.
#[derive(Default)]
pub struct MemoryJournal {
    records: std::sync::Mutex<Vec<Record>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, record: Record) {
        self.records.lock().unwrap().push(record);
    }

    fn records_since_start(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acqm_roundtrips() {
        let r = Record::Acqm {
            pathname: "/vesta/foo/5".into(),
            sep: "/".into(),
            requestid: "deadbeef 12345 a.b.c:1 d.e.f:2".into(),
        };
        let encoded = r.encode();
        assert_eq!(Record::decode(&encoded).unwrap(), r);
    }

    #[test]
    fn quoting_escapes_backslash_and_quote() {
        let r = Record::Finm { pathname: r#"odd\name"with"quotes"#.into(), sep: "/".into(), id: "x".into() };
        let encoded = r.encode();
        assert_eq!(Record::decode(&encoded).unwrap(), r);
    }

    #[test]
    fn memory_journal_preserves_append_order() {
        let j = MemoryJournal::new();
        j.append(Record::Acqm { pathname: "/a".into(), sep: "/".into(), requestid: "r1".into() });
        j.append(Record::Finm { pathname: "/a".into(), sep: "/".into(), id: "r1".into() });
        let records = j.records_since_start();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], Record::Acqm { .. }));
        assert!(matches!(records[1], Record::Finm { .. }));
    }
}
