//! IO modules - side effects (network) and stream framing

pub mod download;
pub mod gzip;
