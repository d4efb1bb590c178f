//! Moving archives to destinations and reporting on it.

pub mod copy;
pub mod progress;

pub use copy::copy_file;
pub use progress::{format_age, format_bytes, format_duration, format_speed, CopyStats};
