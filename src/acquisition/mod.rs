//! Producer/consumer acquisition.
//!
//! The producer context owns the byte source and the decoder and runs on its own
//! thread ([`session::start`]). The consumer owns its [`crate::data::ChannelWindows`]
//! and drains the [`channel`] at its own pace. Records are the only thing crossing
//! between the two.
//!
//! # Example
//! ```no_run
//! use frame_daq::acquisition::{self, SessionOptions};
//! use frame_daq::data::ChannelWindows;
//! use frame_daq::frame::FrameFormat;
//! use frame_daq::source::ReaderSource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ReaderSource::open("capture.bin".as_ref())?;
//! let format = FrameFormat::ae_bc_nibble();
//! let mut windows = ChannelWindows::new(format.channel_count(), 2500)?;
//! let (handle, receiver) = acquisition::start(source, format, SessionOptions::default())?;
//! loop {
//!     let drained = receiver.drain();
//!     windows.extend(&drained.records);
//!     if drained.is_final() {
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! let summary = handle.join()?;
//! println!("{} records", summary.stats.records_decoded);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod session;

pub use channel::{channel, Drained, OverflowPolicy, RecordReceiver, RecordSender, StreamEnd};
pub use session::{start, AcquisitionHandle, SessionOptions, SessionStats, SessionSummary};
