//! CSV serialization utilities.

use serde::Serialize;
use std::io::Write;

/// Writes an iterator of records to a CSV writer.
/// Each record must implement Serialize.
pub fn write_csv<T, W>(writer: W, records: impl Iterator<Item = T>) -> csv::Result<()>
where
    T: Serialize,
    W: Write,
{
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}
