//! Consumer-side data handling: live sliding windows and record export.
pub mod export;
pub mod window;

pub use export::CsvExporter;
pub use window::{ChannelWindows, SlidingWindow, WindowSummary};
