//! Frame synchronization and decoding.
//!
//! Leaf to root:
//!
//! - [`format`]: the Frame Format Descriptor (marker, payload length, field rules)
//! - [`sync`]: marker matching over a raw byte stream
//! - [`fields`]: payload bytes to channel values
//! - [`decoder`]: the synchronizer + assembler state machine
//! - [`stream`]: the state machine bound to an owned byte source

pub mod decoder;
pub mod fields;
pub mod format;
pub mod record;
pub mod stream;
pub mod sync;

pub use decoder::{DecoderCounters, DecoderState, FrameDecoder, Step};
pub use fields::{to_signed16, FieldRule};
pub use format::{FieldRuleConfig, FrameFormat, FrameFormatBuilder, FrameFormatConfig, SyncPolicy};
pub use record::SampleRecord;
pub use stream::{ReadProgress, StreamDecoder};
pub use sync::FrameSynchronizer;
