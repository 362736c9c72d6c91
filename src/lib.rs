//! # Frame DAQ Core Library
//!
//! This crate decodes the framed sample stream an FPGA ADC sends over a serial link and
//! hands the decoded samples to live consumers. It is organised as a library so the
//! `frame-daq` command-line front end and any other consumer share one decoder.
//!
//! ## Crate Structure
//!
//! - **`frame`**: the frame format descriptor, the sync-marker synchronizer, field
//!   extraction and the `FrameDecoder` state machine. `frame::stream` binds a decoder to
//!   a byte source.
//! - **`source`**: the `ByteSource` trait with serial, file/reader and scripted
//!   implementations.
//! - **`data`**: consumer-side sliding windows (one per channel) and CSV export.
//! - **`acquisition`**: the producer thread and the channel carrying records to the
//!   consumer, with an explicit overflow policy.
//! - **`inspect`**: text rendering for the byte-level debugging commands.
//! - **`config`**: layered configuration from TOML and `FRAME_DAQ_` environment variables.
//! - **`tracing_init`**: structured logging setup.
//! - **`error`**: the `DaqError` enum shared by every module.
//!
//! ## Data flow
//!
//! ```text
//! ByteSource -> FrameDecoder -> SampleRecord -> RecordSender ~~> RecordReceiver -> ChannelWindows
//!                                                 (producer thread)   (consumer)
//! ```
//!
//! The decoder is sans-IO: it takes bytes and returns records, so the same code runs
//! inside the producer thread and in the single-threaded inspection loops.

pub mod acquisition;
pub mod config;
pub mod data;
pub mod error;
pub mod frame;
pub mod inspect;
pub mod source;
pub mod tracing_init;
