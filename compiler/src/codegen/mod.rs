//! Code generation for the embedded target
//!
//! This module renders the C header/source pair for an export and,
//! optionally, the weight blob as a C array initializer.

pub mod blob;
pub mod c;

pub use blob::render_weights_header;
pub use c::{render_header, render_source, rename_symbol};
