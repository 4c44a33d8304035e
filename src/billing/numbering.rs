// billing/numbering.rs
// Document number formats. Counters are reserved in state::users; this only renders them.

use chrono::{DateTime, Datelike, Utc};

/// Quote and invoice numbers: the counter left-padded to 5 digits.
pub fn document_number(counter: i64) -> String {
    format!("{counter:05}")
}

/// Receipt numbers: `RCPT-YYYY-MM-NNNNN` using the issue date.
pub fn receipt_number(counter: i64, issued_at: DateTime<Utc>) -> String {
    format!(
        "RCPT-{:04}-{:02}-{:05}",
        issued_at.year(),
        issued_at.month(),
        counter
    )
}
