//! `dseq read`: print committed entries of the entry log

use crate::config::STREAM_FILE;
use anyhow::{Context, Result};
use dseq_stream::{StreamEntry, StreamReader};
use std::io::Write;
use std::path::Path;

/// One output line: `number | kind | 0xpayload`
pub fn format_entry(entry: &StreamEntry) -> String {
    format!(
        "{:>6} | {:>11} | 0x{}",
        entry.number,
        entry.kind.name(),
        hex::encode(&entry.payload)
    )
}

/// Write the committed entries of `<home>/dseq.bin` numbered `from` and above.
/// Returns the number of entries written.
pub fn print_entries(home: &Path, from: u64, out: &mut impl Write) -> Result<usize> {
    let path = home.join(STREAM_FILE);
    let reader = StreamReader::open(&path)
        .with_context(|| format!("failed to open entry log {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        entries = reader.entry_count(),
        last_block = ?reader.last_block_height(),
        "reading entry log"
    );

    let mut count = 0;
    for entry in reader.entries_from(from) {
        let entry = entry.context("failed to decode entry")?;
        writeln!(out, "{}", format_entry(&entry))?;
        count += 1;
    }
    Ok(count)
}
