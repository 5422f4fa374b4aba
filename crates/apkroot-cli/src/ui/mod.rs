//! Terminal output.

pub mod console;
pub mod theme;

pub use console::ConsoleReporter;
pub use theme::{Icons, format_size};
