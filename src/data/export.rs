//! CSV export of decoded records.
//!
//! One row per [`SampleRecord`]: `sequence,ch0,ch1,...` with unsigned channel values.
//! Only available with the `storage_csv` feature; without it [`CsvExporter::create`]
//! returns an error so callers compile either way.

#[cfg(feature = "storage_csv")]
use std::fs::File;
#[cfg(feature = "storage_csv")]
use std::io::Write;
use std::path::Path;

#[cfg(feature = "storage_csv")]
use tracing::info;

use crate::error::{AppResult, DaqError};
use crate::frame::SampleRecord;

/// Streams records into a CSV file.
#[cfg(feature = "storage_csv")]
pub struct CsvExporter<W: Write = File> {
    writer: csv::Writer<W>,
    channels: usize,
    rows: u64,
}

#[cfg(feature = "storage_csv")]
impl CsvExporter<File> {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: &Path, channels: usize) -> AppResult<Self> {
        let file = File::create(path).map_err(|e| {
            DaqError::Export(format!("Failed to create CSV file '{}': {}", path.display(), e))
        })?;
        info!(path = %path.display(), channels, "CSV export started");
        Self::from_writer(file, channels)
    }
}

#[cfg(feature = "storage_csv")]
impl<W: Write> CsvExporter<W> {
    /// Export into any writer.
    pub fn from_writer(inner: W, channels: usize) -> AppResult<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        let header = std::iter::once("sequence".to_string())
            .chain((0..channels).map(|i| format!("ch{i}")));
        writer
            .write_record(header)
            .map_err(|e| DaqError::Export(e.to_string()))?;
        Ok(Self {
            writer,
            channels,
            rows: 0,
        })
    }

    /// Append one record.
    pub fn write_record(&mut self, record: &SampleRecord) -> AppResult<()> {
        if record.channel_count() != self.channels {
            return Err(DaqError::Export(format!(
                "record {} has {} channels, export expects {}",
                record.sequence(),
                record.channel_count(),
                self.channels
            )));
        }
        let row = std::iter::once(record.sequence().to_string())
            .chain(record.values().iter().map(u16::to_string));
        self.writer
            .write_record(row)
            .map_err(|e| DaqError::Export(e.to_string()))?;
        self.rows += 1;
        Ok(())
    }

    /// Append records in order.
    pub fn write_batch(&mut self, records: &[SampleRecord]) -> AppResult<()> {
        records.iter().try_for_each(|record| self.write_record(record))
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush and hand back the writer.
    pub fn finish(self) -> AppResult<W> {
        let rows = self.rows;
        let inner = self
            .writer
            .into_inner()
            .map_err(|e| DaqError::Export(e.into_error().to_string()))?;
        info!(rows, "CSV export finished");
        Ok(inner)
    }
}

/// Placeholder when CSV support is compiled out.
#[cfg(not(feature = "storage_csv"))]
pub struct CsvExporter;

#[cfg(not(feature = "storage_csv"))]
impl CsvExporter {
    /// Always fails: rebuild with `--features storage_csv`.
    pub fn create(_path: &Path, _channels: usize) -> AppResult<Self> {
        Err(DaqError::Export(
            "CSV export not enabled. Rebuild with --features storage_csv".to_string(),
        ))
    }

    /// Unreachable without a constructed exporter.
    pub fn write_batch(&mut self, _records: &[SampleRecord]) -> AppResult<()> {
        Ok(())
    }

    /// Unreachable without a constructed exporter.
    pub fn rows(&self) -> u64 {
        0
    }

    /// Unreachable without a constructed exporter.
    pub fn finish(self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;

    fn records() -> Vec<SampleRecord> {
        vec![
            SampleRecord::new(0, vec![0x123, 0x567]),
            SampleRecord::new(1, vec![4095, 0]),
        ]
    }

    #[test]
    fn writes_header_and_rows() {
        let mut exporter = CsvExporter::from_writer(Vec::new(), 2).unwrap();
        exporter.write_batch(&records()).unwrap();
        assert_eq!(exporter.rows(), 2);
        let bytes = exporter.finish().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "sequence,ch0,ch1\n0,291,1383\n1,4095,0\n"
        );
    }

    #[test]
    fn rejects_channel_count_mismatch() {
        let mut exporter = CsvExporter::from_writer(Vec::new(), 3).unwrap();
        let err = exporter.write_record(&records()[0]).unwrap_err();
        assert!(matches!(err, DaqError::Export(_)));
        assert_eq!(exporter.rows(), 0);
    }

    #[test]
    fn creates_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        let mut exporter = CsvExporter::create(&path, 2).unwrap();
        exporter.write_batch(&records()).unwrap();
        exporter.finish().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), ["sequence", "ch0", "ch1"]);
        assert_eq!(reader.records().count(), 2);
    }
}
