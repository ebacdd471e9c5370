//! Buffer Classification
//!
//! A single pass over the trace, in invocation order, that gives every
//! distinct buffer identity a canonical name and one of four roles:
//!
//! - `Input` / `Output`: designated by the caller, referenced by symbol
//! - `Weight`: first seen as something a kernel reads, so its value has to
//!   come from the weight blob
//! - `Scratch`: first seen as something a kernel writes, recomputed every call
//!
//! Name and role are fixed at the first observation of an identity. Buffers
//! live in an arena indexed by [`BufferIndex`]; the engine identity is only
//! used as a lookup key.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use crate::dtype::DType;
use crate::error::ExportError;
use crate::layout::WeightLayout;
use crate::trace::{Access, BufferId, BufferRef, SpecialKind, Trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Input,
    Output,
    Weight,
    Scratch,
}

impl Role {
    pub fn is_special(&self) -> bool {
        matches!(self, Role::Input | Role::Output)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Input => write!(f, "input"),
            Role::Output => write!(f, "output"),
            Role::Weight => write!(f, "weight"),
            Role::Scratch => write!(f, "scratch"),
        }
    }
}

/// Position of a buffer in the registry arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferIndex(pub u32);

impl BufferIndex {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A classified buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Buffer {
    pub id: BufferId,
    pub name: String,
    pub role: Role,
    pub dtype: DType,
    /// Element count
    pub len: usize,
    /// `i` in `input_i` / `output_i`
    pub special_index: Option<usize>,
    /// Blob offset, for weights
    pub offset: Option<usize>,
}

/// Arena of classified buffers, keyed by engine identity
#[derive(Clone, Debug, Default)]
pub struct BufferRegistry {
    buffers: Vec<Buffer>,
    index: HashMap<BufferId, BufferIndex>,
}

impl BufferRegistry {
    fn insert(&mut self, buffer: Buffer) -> BufferIndex {
        let idx = BufferIndex(self.buffers.len() as u32);
        self.index.insert(buffer.id, idx);
        self.buffers.push(buffer);
        idx
    }

    pub fn get(&self, idx: BufferIndex) -> &Buffer {
        &self.buffers[idx.index()]
    }

    pub fn lookup(&self, id: BufferId) -> Option<&Buffer> {
        self.index.get(&id).map(|&idx| self.get(idx))
    }

    pub fn role_of(&self, id: BufferId) -> Option<Role> {
        self.lookup(id).map(|b| b.role)
    }

    /// Buffers in first-encounter order
    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }

    pub fn by_role(&self, role: Role) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter().filter(move |b| b.role == role)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// How a call statement refers to one argument
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgRef {
    /// Driver parameter `input_i` / `output_i`
    Special(BufferIndex),
    Scratch(BufferIndex),
    /// Pointer into the weight blob
    Weight { buffer: BufferIndex, offset: usize },
}

impl ArgRef {
    pub fn buffer(&self) -> BufferIndex {
        match *self {
            ArgRef::Special(idx) | ArgRef::Scratch(idx) => idx,
            ArgRef::Weight { buffer, .. } => buffer,
        }
    }
}

/// One call statement of the driver function
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    /// Kernel name as recorded, before namespacing
    pub kernel: String,
    pub args: Vec<ArgRef>,
}

/// A distinct kernel body, in first registration order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelBody {
    pub name: String,
    pub source: String,
}

/// Result of the classification pass
#[derive(Clone, Debug)]
pub struct Classification {
    pub registry: BufferRegistry,
    pub layout: WeightLayout,
    pub calls: Vec<Call>,
    pub kernels: Vec<KernelBody>,
}

impl Classification {
    /// Scratch buffers in first-encounter order
    pub fn scratch_buffers(&self) -> Vec<&Buffer> {
        self.registry.by_role(Role::Scratch).collect()
    }

    /// Referenced special buffers: inputs by index, then outputs by index
    pub fn special_buffers(&self) -> Vec<&Buffer> {
        let mut specials: Vec<&Buffer> = self.registry.iter().filter(|b| b.role.is_special()).collect();
        specials.sort_by_key(|b| (b.role == Role::Output, b.special_index));
        specials
    }
}

/// Classify every buffer in `trace` and plan the weight layout.
pub fn classify(trace: &Trace, weight_alignment: usize) -> Result<Classification, ExportError> {
    let specials = trace.special_map();
    let mut registry = BufferRegistry::default();
    let mut layout = WeightLayout::new(weight_alignment);
    let mut calls = Vec::with_capacity(trace.kernels.len());
    let mut kernels = Vec::new();
    let mut seen_kernels = HashSet::new();
    let mut scratch_count = 0usize;

    for kernel in &trace.kernels {
        if seen_kernels.insert(kernel.name.as_str()) {
            kernels.push(KernelBody {
                name: kernel.name.clone(),
                source: kernel.source.clone(),
            });
        }

        let mut args = Vec::with_capacity(kernel.args.len());
        for (i, arg) in kernel.args.iter().enumerate() {
            let buf = arg.as_buffer().ok_or_else(|| {
                ExportError::contract(format!(
                    "argument {} of kernel {} is not a buffer",
                    i, kernel.name
                ))
            })?;
            let access = buf.effective_access(i);

            let idx = match registry.index.get(&buf.id) {
                Some(&idx) => {
                    check_same_shape(registry.get(idx), buf)?;
                    idx
                }
                None => {
                    let buffer = match specials.get(&buf.id) {
                        Some(special) => Buffer {
                            id: buf.id,
                            name: special.symbol(),
                            role: match special.kind {
                                SpecialKind::Input => Role::Input,
                                SpecialKind::Output => Role::Output,
                            },
                            dtype: buf.dtype,
                            len: buf.len,
                            special_index: Some(special.index),
                            offset: None,
                        },
                        None => {
                            let name = format!("scratch_{}", scratch_count);
                            scratch_count += 1;
                            let (role, offset) = match access {
                                Access::Read => {
                                    let offset = layout.assign(buf.id, &name, buf.len, buf.dtype)?;
                                    (Role::Weight, Some(offset))
                                }
                                Access::Write => (Role::Scratch, None),
                            };
                            Buffer {
                                id: buf.id,
                                name,
                                role,
                                dtype: buf.dtype,
                                len: buf.len,
                                special_index: None,
                                offset,
                            }
                        }
                    };
                    debug!(
                        buffer = %buffer.id,
                        name = %buffer.name,
                        role = %buffer.role,
                        dtype = %buffer.dtype,
                        len = buffer.len,
                        "registered buffer"
                    );
                    registry.insert(buffer)
                }
            };

            let buffer = registry.get(idx);
            if buffer.role == Role::Input && access == Access::Write {
                return Err(ExportError::contract(format!(
                    "kernel {} writes {} (buffer {}), which is a read-only input",
                    kernel.name, buffer.name, buffer.id
                )));
            }

            args.push(match (buffer.role, buffer.offset) {
                (Role::Weight, Some(offset)) => ArgRef::Weight { buffer: idx, offset },
                (Role::Scratch, _) => ArgRef::Scratch(idx),
                _ => ArgRef::Special(idx),
            });
        }

        calls.push(Call {
            kernel: kernel.name.clone(),
            args,
        });
    }

    for special in &trace.special {
        if registry.lookup(special.id).is_none() {
            warn!(
                buffer = %special.id,
                symbol = %special.symbol(),
                "special buffer is never referenced by the trace; omitted from the driver signature"
            );
        }
    }

    Ok(Classification {
        registry,
        layout,
        calls,
        kernels,
    })
}

fn check_same_shape(known: &Buffer, seen: &BufferRef) -> Result<(), ExportError> {
    if known.dtype != seen.dtype || known.len != seen.len {
        return Err(ExportError::consistency(
            known.id,
            format!(
                "first seen as {} x {}, later as {} x {}",
                known.len, known.dtype, seen.len, seen.dtype
            ),
        ));
    }
    Ok(())
}
