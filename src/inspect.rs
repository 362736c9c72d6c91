//! Text rendering for the link inspection commands.
//!
//! Everything here only formats; nothing alters decoded values. The signed view of a
//! channel is computed for display next to the unsigned value.

use crate::frame::{to_signed16, FrameFormat, FrameSynchronizer, SampleRecord, Step};

/// Default bytes per hex dump line.
pub const DEFAULT_HEX_WIDTH: usize = 16;

fn printable(byte: u8) -> char {
    if (32..=126).contains(&byte) {
        byte as char
    } else {
        '.'
    }
}

/// One raw byte: `[000042] 0xFF (255) '.'`.
pub fn raw_byte_line(index: u64, byte: u8) -> String {
    format!("[{index:06}] 0x{byte:02X} ({byte:3}) '{}'", printable(byte))
}

/// One hex dump line for `bytes` starting at `offset`, padded to 16 columns.
pub fn hex_dump_line(offset: u64, bytes: &[u8]) -> String {
    hex_dump_line_padded(offset, bytes, DEFAULT_HEX_WIDTH)
}

fn hex_dump_line_padded(offset: u64, bytes: &[u8], width: usize) -> String {
    let hex = bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    let ascii: String = bytes.iter().copied().map(printable).collect();
    format!("{offset:08X}: {hex:<pad$} |{ascii}|", pad = width * 3)
}

/// Groups a byte stream into hex dump lines.
#[derive(Debug)]
pub struct HexDumper {
    width: usize,
    offset: u64,
    line: Vec<u8>,
}

impl HexDumper {
    /// Dumper emitting `width` bytes per line (at least 1).
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            offset: 0,
            line: Vec::with_capacity(width),
        }
    }

    /// Add bytes, handing each completed line to `emit`.
    pub fn push(&mut self, bytes: &[u8], mut emit: impl FnMut(String)) {
        for &byte in bytes {
            self.line.push(byte);
            if self.line.len() == self.width {
                emit(self.take_line());
            }
        }
    }

    /// Emit whatever is buffered as a short final line.
    pub fn finish(&mut self) -> Option<String> {
        if self.line.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    /// Bytes seen so far.
    pub fn total_bytes(&self) -> u64 {
        self.offset + self.line.len() as u64
    }

    fn take_line(&mut self) -> String {
        let line = hex_dump_line_padded(self.offset, &self.line, self.width);
        self.offset += self.line.len() as u64;
        self.line.clear();
        line
    }
}

/// Finds sync markers in a raw stream without decoding frames.
#[derive(Debug)]
pub struct MarkerScanner {
    sync: FrameSynchronizer,
    position: u64,
    offsets: Vec<u64>,
}

impl MarkerScanner {
    /// Scanner for the marker of `format`.
    pub fn new(format: &FrameFormat) -> Self {
        Self {
            sync: FrameSynchronizer::for_format(format),
            position: 0,
            offsets: Vec::new(),
        }
    }

    /// Feed one byte. Returns the offset of the marker's first byte when this byte
    /// completes one.
    pub fn push(&mut self, byte: u8) -> Option<u64> {
        let position = self.position;
        self.position += 1;
        if self.sync.push(byte) {
            let start = position + 1 - self.sync.marker_len() as u64;
            self.offsets.push(start);
            Some(start)
        } else {
            None
        }
    }

    /// Markers found so far.
    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    /// Start offsets of every marker found.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Bytes scanned.
    pub fn bytes_scanned(&self) -> u64 {
        self.position
    }
}

/// `#12 ch0=291 (0x123, +291) ch1=...`
pub fn describe_record(record: &SampleRecord) -> String {
    let mut line = format!("#{}", record.sequence());
    for (channel, &value) in record.values().iter().enumerate() {
        line.push_str(&format!(
            " ch{channel}={value} (0x{value:03X}, {:+})",
            to_signed16(value)
        ));
    }
    line
}

/// Annotate one byte with what it did to the decoder.
pub fn describe_step(index: u64, byte: u8, step: &Step, format: &FrameFormat) -> String {
    let prefix = format!("[{index:06}] 0x{byte:02X} ({byte:3})");
    let note = match step {
        Step::Discarded => "<- data byte (no sync)".to_string(),
        Step::SyncProgress { matched, needed } => {
            format!("<- sync byte {matched}/{needed}")
        }
        Step::Synchronized => {
            let needed = format.sync_bytes().len();
            format!("<- sync byte {needed}/{needed}, packet start")
        }
        Step::Resynchronized { discarded } => {
            format!("<- sync inside payload, {discarded} bytes dropped, packet restart")
        }
        Step::Payload { index } => format!("<- payload byte {index}"),
        Step::Record(record) => {
            return format!(
                "{prefix} <- payload byte {}\n*** PACKET COMPLETE {} ***",
                format.payload_length() - 1,
                describe_record(record)
            );
        }
        Step::Closed => "<- ignored, decoder closed".to_string(),
    };
    format!("{prefix} {note}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameDecoder;

    #[test]
    fn raw_line_matches_debugger_layout() {
        assert_eq!(raw_byte_line(42, 0xFF), "[000042] 0xFF (255) '.'");
        assert_eq!(raw_byte_line(7, b'A'), "[000007] 0x41 ( 65) 'A'");
    }

    #[test]
    fn hex_line_is_padded_to_sixteen_columns() {
        let line = hex_dump_line(0x10, &[0xAE, 0xBC, 0x41]);
        assert_eq!(line, format!("00000010: {:<48} |..A|", "AE BC 41"));
    }

    #[test]
    fn dumper_splits_lines_and_flushes_tail() {
        let mut dumper = HexDumper::new(4);
        let mut lines = Vec::new();
        dumper.push(&[0, 1, 2, 3, 4, 5], |line| lines.push(line));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("00000000: 00 01 02 03"));
        let tail = dumper.finish().unwrap();
        assert!(tail.starts_with("00000004: 04 05"));
        assert_eq!(dumper.finish(), None);
        assert_eq!(dumper.total_bytes(), 6);
    }

    #[test]
    fn scanner_reports_marker_offsets() {
        let mut scanner = MarkerScanner::new(&FrameFormat::ae_bc_nibble());
        let hits: Vec<u64> = [0x00, 0xAE, 0xBC, 0x11, 0xAE, 0xAE, 0xBC]
            .into_iter()
            .filter_map(|b| scanner.push(b))
            .collect();
        assert_eq!(hits, vec![1, 5]);
        assert_eq!(scanner.count(), 2);
        assert_eq!(scanner.bytes_scanned(), 7);
    }

    #[test]
    fn completed_frame_shows_signed_view() {
        let format = FrameFormat::builder([0xFF, 0xFF], 2)
            .masked(0, 0xFFFF)
            .resync_in_payload(false)
            .build()
            .unwrap();
        let mut decoder = FrameDecoder::new(format.clone());
        let lines: Vec<String> = [0xFF, 0xFF, 0xFF, 0x38]
            .into_iter()
            .enumerate()
            .map(|(i, b)| describe_step(i as u64, b, &decoder.step(b), &format))
            .collect();
        assert!(lines[0].ends_with("<- sync byte 1/2"));
        assert!(lines[1].ends_with("packet start"));
        assert!(lines[2].ends_with("<- payload byte 0"));
        assert!(lines[3].contains("ch0=65336 (0xFF38, -200)"));
    }

    #[test]
    fn record_description_keeps_unsigned_value() {
        let record = SampleRecord::new(3, vec![0x123, 0x567]);
        assert_eq!(
            describe_record(&record),
            "#3 ch0=291 (0x123, +291) ch1=1383 (0x567, +1383)"
        );
    }
}
