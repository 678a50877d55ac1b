//! Terminal output helpers.

pub mod progress;
pub mod table;

pub use progress::create_spinner;
pub use table::{format_outputs_table, format_sources_table};
