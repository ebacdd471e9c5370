//! Captured Kernel Traces
//!
//! A trace is the ordered list of kernel invocations recorded from one
//! concrete run of a tensor program, together with the buffers the caller
//! designated as program inputs/outputs and the live bytes of every buffer
//! after that run.
//!
//! Traces are read from JSON recordings:
//!
//! ```text
//! {
//!   "kernels": [
//!     { "name": "E_4", "source": "void E_4(float* data0, ...) { ... }",
//!       "args": [ { "kind": "buffer", "id": 1, "len": 4, "dtype": "float" } ] }
//!   ],
//!   "special": [ { "id": 0, "kind": "input", "index": 0 } ],
//!   "contents": { "3": [0, 0, 128, 63] }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::dtype::DType;
use crate::error::ExportError;

/// Engine-assigned buffer identity, stable for the lifetime of a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl From<u64> for BufferId {
    fn from(id: u64) -> Self {
        BufferId(id)
    }
}

/// How a kernel uses one of its buffer arguments
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    Write,
}

/// A buffer passed to a kernel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferRef {
    pub id: BufferId,
    /// Element count
    pub len: usize,
    pub dtype: DType,
    /// Access tag supplied by the engine, if it records one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,
}

impl BufferRef {
    pub fn new(id: impl Into<BufferId>, len: usize, dtype: DType) -> Self {
        Self {
            id: id.into(),
            len,
            dtype,
            access: None,
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = Some(access);
        self
    }

    /// `None` when `len x itemsize` does not fit in `usize`
    pub fn byte_size(&self) -> Option<usize> {
        self.dtype.byte_size(self.len)
    }

    /// Access used for classification.
    ///
    /// An explicit tag wins. Without one, argument 0 is the kernel's output
    /// and every later argument is read.
    pub fn effective_access(&self, position: usize) -> Access {
        match self.access {
            Some(access) => access,
            None if position == 0 => Access::Write,
            None => Access::Read,
        }
    }
}

/// One kernel argument as recorded by the engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KernelArg {
    Buffer(BufferRef),
    /// Immediate value baked into the launch
    Scalar { value: f64 },
    /// Unresolved symbolic shape variable
    Symbol { name: String },
}

impl KernelArg {
    pub fn as_buffer(&self) -> Option<&BufferRef> {
        match self {
            KernelArg::Buffer(buf) => Some(buf),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            KernelArg::Buffer(_) => "buffer",
            KernelArg::Scalar { .. } => "scalar",
            KernelArg::Symbol { .. } => "symbol",
        }
    }
}

/// One compiled kernel call in the trace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelInvocation {
    pub name: String,
    /// C source of the kernel, as emitted by the engine
    pub source: String,
    pub args: Vec<KernelArg>,
}

impl KernelInvocation {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: KernelArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_buffer(self, buf: BufferRef) -> Self {
        self.with_arg(KernelArg::Buffer(buf))
    }

    /// Buffer arguments with their positions. Non-buffer arguments are skipped.
    pub fn buffers(&self) -> impl Iterator<Item = (usize, &BufferRef)> {
        self.args
            .iter()
            .enumerate()
            .filter_map(|(i, arg)| arg.as_buffer().map(|buf| (i, buf)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialKind {
    Input,
    Output,
}

impl fmt::Display for SpecialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecialKind::Input => write!(f, "input"),
            SpecialKind::Output => write!(f, "output"),
        }
    }
}

/// A buffer designated as a program input or output by the caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialBuffer {
    pub id: BufferId,
    pub kind: SpecialKind,
    pub index: usize,
}

impl SpecialBuffer {
    /// Symbolic name used in generated code: `input_<i>` or `output_<i>`
    pub fn symbol(&self) -> String {
        format!("{}_{}", self.kind, self.index)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub kernels: Vec<KernelInvocation>,
    #[serde(default)]
    pub special: Vec<SpecialBuffer>,
    /// Buffer bytes after the captured run
    #[serde(default)]
    pub contents: BTreeMap<BufferId, Vec<u8>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_kernel(&mut self, kernel: KernelInvocation) {
        self.kernels.push(kernel);
    }

    pub fn add_special(&mut self, id: impl Into<BufferId>, kind: SpecialKind, index: usize) {
        self.special.push(SpecialBuffer {
            id: id.into(),
            kind,
            index,
        });
    }

    pub fn set_contents(&mut self, id: impl Into<BufferId>, bytes: Vec<u8>) {
        self.contents.insert(id.into(), bytes);
    }

    pub fn contents_of(&self, id: BufferId) -> Option<&[u8]> {
        self.contents.get(&id).map(Vec::as_slice)
    }

    /// Parse and validate a JSON recording
    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        let trace: Trace = serde_json::from_str(json)?;
        trace.validate()?;
        Ok(trace)
    }

    /// Load and validate a JSON recording from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let bytes = std::fs::read(path)?;
        let trace: Trace = serde_json::from_slice(&bytes)?;
        trace.validate()?;
        Ok(trace)
    }

    /// Special designations keyed by identity
    pub fn special_map(&self) -> HashMap<BufferId, &SpecialBuffer> {
        self.special.iter().map(|s| (s.id, s)).collect()
    }

    /// Check the input contract.
    ///
    /// Shape consistency of a repeated identity is checked during
    /// classification, where the first observation is recorded.
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.kernels.is_empty() {
            return Err(ExportError::contract("trace contains no kernel invocations"));
        }

        let mut bodies: HashMap<&str, &str> = HashMap::new();
        for (k, kernel) in self.kernels.iter().enumerate() {
            if !is_c_identifier(&kernel.name) {
                return Err(ExportError::contract(format!(
                    "kernel #{} has invalid name {:?}",
                    k, kernel.name
                )));
            }
            if RESERVED_KERNEL_NAMES.contains(&kernel.name.as_str()) {
                return Err(ExportError::contract(format!(
                    "kernel name {:?} would clash with a generated symbol once namespaced",
                    kernel.name
                )));
            }
            match bodies.get(kernel.name.as_str()) {
                Some(body) if *body != kernel.source => {
                    return Err(ExportError::KernelMismatch {
                        kernel: kernel.name.clone(),
                        detail: "same name recorded with two different bodies".into(),
                    });
                }
                Some(_) => {}
                None => {
                    bodies.insert(&kernel.name, &kernel.source);
                }
            }

            for (i, arg) in kernel.args.iter().enumerate() {
                let buf = arg.as_buffer().ok_or_else(|| {
                    ExportError::contract(format!(
                        "argument {} of kernel {} is a {}, not a buffer",
                        i,
                        kernel.name,
                        arg.type_name()
                    ))
                })?;
                if buf.len == 0 {
                    return Err(ExportError::contract(format!(
                        "buffer {} passed to kernel {} has no elements",
                        buf.id, kernel.name
                    )));
                }
                if buf.byte_size().is_none() {
                    return Err(ExportError::consistency(
                        buf.id,
                        format!("{} x {} overflows the addressable size", buf.len, buf.dtype),
                    ));
                }
            }
        }

        let mut ids = HashSet::new();
        let mut symbols = HashSet::new();
        for special in &self.special {
            if !ids.insert(special.id) {
                return Err(ExportError::contract(format!(
                    "buffer {} designated special more than once",
                    special.id
                )));
            }
            if !symbols.insert((special.kind, special.index)) {
                return Err(ExportError::contract(format!(
                    "symbol {} assigned to more than one buffer",
                    special.symbol()
                )));
            }
        }

        Ok(())
    }
}

/// Suffixes the emitter uses for the typedef and ABI functions
/// (`<name>_t`, `<name>_fn`, `<name>_init`, `<name>_free`)
const RESERVED_KERNEL_NAMES: [&str; 4] = ["t", "fn", "init", "free"];

/// Is `name` usable as a C identifier?
pub(crate) fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
