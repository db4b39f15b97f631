//! Helpers shared by the swaplist test suites.

pub mod fixtures;
pub mod logs;

pub use fixtures::{archive_entry_names, read_archive_entry, ArchiveBuilder, PlateFixture};
pub use logs::{capture_logs, CapturedLogs};
