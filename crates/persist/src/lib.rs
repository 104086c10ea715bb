//! Tessera persistence bridge
//!
//! Append-only log of packed records holding chunk code, chunk attributes,
//! variable names, comments, and deletion markers. The runtime appends and
//! scans; the current state of any key is the latest non-deleted record for
//! it, and compaction rewrites the log down to exactly that.

pub mod log;
pub mod record;

pub use log::RecordLog;
pub use record::{RecordHeader, RecordRef, RecordType, RECORD_HEADER_WORDS};
