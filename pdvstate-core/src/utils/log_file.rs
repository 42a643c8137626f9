//! Daily log file naming.

use std::path::{Path, PathBuf};
use time::{Date, OffsetDateTime, UtcOffset};

/// File name of `channel`'s log for `date`: `<channel><MM><DD>.txt`.
pub fn log_file_name(channel: &str, date: Date) -> String {
    format!("{channel}{:02}{:02}.txt", u8::from(date.month()), date.day())
}

/// Full path of `channel`'s log for `date` inside `dir`.
pub fn log_file_path(dir: impl AsRef<Path>, channel: &str, date: Date) -> PathBuf {
    dir.as_ref().join(log_file_name(channel, date))
}

/// Current calendar date at `offset`.
pub fn today_at(offset: UtcOffset) -> Date {
    OffsetDateTime::now_utc().to_offset(offset).date()
}
