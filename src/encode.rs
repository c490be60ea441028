//! JSON line encoding, run only on the writer thread.
//!
//! Key order is fixed: `timestamp`, `level`, `message`, user fields in
//! call order, `thread_id`. Field names are emitted verbatim, so a user
//! field may repeat a reserved key.

use crate::record::LogRecord;
use crate::value::FieldValue;
use std::io::Write;

/// A field whose value had no faithful JSON form and was replaced by its
/// `Debug` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub field: String,
    pub reason: String,
}

/// Append one newline-terminated JSON object to `out`.
///
/// Never fails: an unencodable field value is rewritten as a string and
/// reported through `on_fallback`; the rest of the record is unaffected.
pub fn encode_record<F>(record: &LogRecord, out: &mut Vec<u8>, mut on_fallback: F)
where
    F: FnMut(Fallback),
{
    // Writes into a Vec<u8> cannot fail, and strings always serialize.
    let _ = write!(out, "{{\"timestamp\":{},\"level\":\"{}\",\"message\":", record.timestamp, record.level);
    write_str(out, &record.message);

    for (name, value) in &record.fields {
        out.push(b',');
        write_str(out, name);
        out.push(b':');
        if let Err(reason) = write_value(out, value) {
            write_str(out, &format!("{value:?}"));
            on_fallback(Fallback {
                field: name.clone(),
                reason,
            });
        }
    }

    let _ = write!(out, ",\"thread_id\":{}}}", record.thread_id);
    out.push(b'\n');
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    let _ = serde_json::to_writer(&mut *out, s);
}

/// Write `value` or restore `out` to its previous length on failure.
fn write_value(out: &mut Vec<u8>, value: &FieldValue) -> Result<(), String> {
    let mark = out.len();
    serde_json::to_writer(&mut *out, value).map_err(|e| {
        out.truncate(mark);
        e.to_string()
    })
}
