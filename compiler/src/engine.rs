//! Trace capture
//!
//! The tensor engine is an external collaborator. Capturing a trace is an
//! explicit two-step protocol: `compile` builds (and warms up) the program,
//! `capture` runs it once more and records the final kernel list, buffer
//! identities and buffer contents.
//!
//! [`RecordedEngine`] replays a trace that an engine already wrote to disk,
//! which is how the CLI gets its input.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ExportError;
use crate::trace::Trace;

pub trait ExecutionEngine {
    /// What to compile (model + entry point, a recording path, ...)
    type Spec: ?Sized;
    /// A compiled, warmed-up program
    type Program;
    /// Concrete example inputs for the capture run
    type Inputs: ?Sized;

    fn compile(&mut self, spec: &Self::Spec) -> Result<Self::Program, ExportError>;

    fn capture(&mut self, program: &Self::Program, inputs: &Self::Inputs) -> Result<Trace, ExportError>;
}

/// Compile then capture, validating the result before it reaches the exporter.
pub fn capture_trace<E: ExecutionEngine>(
    engine: &mut E,
    spec: &E::Spec,
    inputs: &E::Inputs,
) -> Result<Trace, ExportError> {
    let program = engine.compile(spec)?;
    let trace = engine.capture(&program, inputs)?;
    trace.validate()?;
    Ok(trace)
}

/// Engine backed by JSON recordings on disk
#[derive(Debug, Default)]
pub struct RecordedEngine {
    loaded: Vec<PathBuf>,
}

impl RecordedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recordings compiled so far
    pub fn loaded(&self) -> &[PathBuf] {
        &self.loaded
    }
}

impl ExecutionEngine for RecordedEngine {
    type Spec = Path;
    type Program = Trace;
    type Inputs = ();

    fn compile(&mut self, spec: &Path) -> Result<Trace, ExportError> {
        debug!(path = %spec.display(), "loading recorded trace");
        let trace = Trace::load(spec)?;
        self.loaded.push(spec.to_path_buf());
        Ok(trace)
    }

    fn capture(&mut self, program: &Trace, _inputs: &()) -> Result<Trace, ExportError> {
        Ok(program.clone())
    }
}
