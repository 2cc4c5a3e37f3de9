//! Utility modules.

pub mod datetime;

pub use datetime::{parse_date, parse_date_time, parse_time, DateTimeParseError};
