//! embedc: export captured tensor-kernel traces to standalone C.
//!
//! This crate turns a trace of compiled kernels, recorded once from a tensor
//! engine, into a dependency-free C translation unit plus a binary weight
//! blob for embedded targets.

pub mod classify;
pub mod codegen;
pub mod config;
pub mod dtype;
pub mod engine;
pub mod error;
pub mod export;
pub mod layout;
pub mod params;
pub mod scratch;
pub mod trace;

pub use classify::{classify, BufferRegistry, Classification, Role};
pub use config::ExportConfig;
pub use error::ExportError;
pub use export::{export, Export};
pub use layout::{WeightBlob, WeightLayout, WeightSpan};
pub use params::{resolve_weight_map, ParameterTable, WeightReport};
pub use scratch::ScratchStrategy;
pub use trace::{BufferId, Trace};
