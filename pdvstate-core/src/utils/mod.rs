pub mod log_file;
pub mod log_tail;

pub use log_file::{log_file_name, log_file_path, today_at};
pub use log_tail::LogTail;
