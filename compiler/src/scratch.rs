//! Scratch buffer storage
//!
//! Scratch buffers can live in three places in the generated code. The set
//! of buffers, their names and their sizes never depend on the choice; only
//! where the declaration goes and how long it lives.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classify::Buffer;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScratchStrategy {
    /// Struct field, allocated in `*_init` and released in `*_free`
    #[default]
    Heap,
    /// Local array of the driver function
    Stack,
    /// Local array with static storage duration
    Static,
}

impl ScratchStrategy {
    /// Map the `heap` / `static` option pair onto a strategy.
    /// `static_` only matters when `heap` is false.
    pub fn from_flags(heap: bool, static_: bool) -> Self {
        match (heap, static_) {
            (true, _) => ScratchStrategy::Heap,
            (false, true) => ScratchStrategy::Static,
            (false, false) => ScratchStrategy::Stack,
        }
    }

    pub fn storage(&self) -> &'static dyn ScratchStorage {
        match self {
            ScratchStrategy::Heap => &HeapScratch,
            ScratchStrategy::Stack => &StackScratch,
            ScratchStrategy::Static => &StaticScratch,
        }
    }
}

impl fmt::Display for ScratchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScratchStrategy::Heap => write!(f, "heap"),
            ScratchStrategy::Stack => write!(f, "stack"),
            ScratchStrategy::Static => write!(f, "static"),
        }
    }
}

/// Rendering hooks for one storage strategy.
///
/// `var` is the name of the struct pointer in the generated code. Every
/// returned line is fully indented.
pub trait ScratchStorage {
    /// Extra fields of the opaque struct
    fn struct_fields(&self, _scratch: &[&Buffer]) -> Vec<String> {
        Vec::new()
    }

    /// Statements of `*_init` after the struct is allocated
    fn init_lines(&self, _var: &str, _scratch: &[&Buffer]) -> Vec<String> {
        Vec::new()
    }

    /// Statements of `*_free` before the struct is released
    fn free_lines(&self, _var: &str, _scratch: &[&Buffer]) -> Vec<String> {
        Vec::new()
    }

    /// Declarations at the top of the driver function
    fn local_lines(&self, _scratch: &[&Buffer]) -> Vec<String> {
        Vec::new()
    }

    /// Expression passed to a kernel for `buffer`
    fn reference(&self, _var: &str, buffer: &Buffer) -> String {
        buffer.name.clone()
    }
}

pub struct HeapScratch;

impl ScratchStorage for HeapScratch {
    fn struct_fields(&self, scratch: &[&Buffer]) -> Vec<String> {
        scratch
            .iter()
            .map(|b| format!("  {} *{};", b.dtype.c_name(), b.name))
            .collect()
    }

    fn init_lines(&self, var: &str, scratch: &[&Buffer]) -> Vec<String> {
        scratch
            .iter()
            .map(|b| {
                format!(
                    "  {}->{} = malloc(sizeof({}) * {});",
                    var,
                    b.name,
                    b.dtype.c_name(),
                    b.len
                )
            })
            .collect()
    }

    fn free_lines(&self, var: &str, scratch: &[&Buffer]) -> Vec<String> {
        scratch
            .iter()
            .map(|b| format!("  free({}->{});", var, b.name))
            .collect()
    }

    fn reference(&self, var: &str, buffer: &Buffer) -> String {
        format!("({} *)({}->{})", buffer.dtype.c_name(), var, buffer.name)
    }
}

pub struct StackScratch;

impl ScratchStorage for StackScratch {
    fn local_lines(&self, scratch: &[&Buffer]) -> Vec<String> {
        scratch
            .iter()
            .map(|b| format!("  {} {}[{}];", b.dtype.c_name(), b.name, b.len))
            .collect()
    }
}

pub struct StaticScratch;

impl ScratchStorage for StaticScratch {
    fn local_lines(&self, scratch: &[&Buffer]) -> Vec<String> {
        scratch
            .iter()
            .map(|b| format!("  static {} {}[{}];", b.dtype.c_name(), b.name, b.len))
            .collect()
    }
}
