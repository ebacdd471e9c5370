//! Export pipeline
//!
//! `trace -> validate -> classify (+ weight offsets) -> pack blob -> render C`
//!
//! The pipeline is a pure function of the trace and the configuration.
//! Nothing is retained between exports and the same input always yields the
//! same bytes.

use tracing::info;

use crate::classify::{classify, Role};
use crate::codegen::{render_header, render_source, render_weights_header};
use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::layout::WeightBlob;
use crate::trace::Trace;

/// Artifacts of one export
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub header: String,
    pub source: String,
    pub weights: WeightBlob,
    /// Blob as a C array, when requested
    pub weights_header: Option<String>,
}

impl Export {
    /// File name and contents of every artifact, in a fixed order:
    /// `<name>.h`, `<name>.c`, `<name>.bin`, `<name>.weights.json`
    /// and optionally `<name>_weights.h`.
    pub fn artifacts(&self) -> Result<Vec<(String, Vec<u8>)>, ExportError> {
        let mut files = vec![
            (format!("{}.h", self.name), self.header.clone().into_bytes()),
            (format!("{}.c", self.name), self.source.clone().into_bytes()),
            (format!("{}.bin", self.name), self.weights.bytes.clone()),
            (
                format!("{}.weights.json", self.name),
                self.weights.map_json()?.into_bytes(),
            ),
        ];
        if let Some(weights_header) = &self.weights_header {
            files.push((
                format!("{}_weights.h", self.name),
                weights_header.clone().into_bytes(),
            ));
        }
        Ok(files)
    }
}

/// Export `trace` as C source, header and weight blob
pub fn export(trace: &Trace, config: &ExportConfig) -> Result<Export, ExportError> {
    config.validate()?;
    trace.validate()?;

    let classification = classify(trace, config.weight_alignment)?;
    let weights = classification.layout.pack(trace)?;
    weights.check_invariants()?;

    let header = render_header(&config.name, &classification, config.scratch);
    let source = render_source(&config.name, &classification, config.scratch);
    let weights_header = config
        .weights_header
        .then(|| render_weights_header(&config.name, &weights));

    let registry = &classification.registry;
    info!(
        name = %config.name,
        kernels = classification.kernels.len(),
        calls = classification.calls.len(),
        inputs = registry.by_role(Role::Input).count(),
        outputs = registry.by_role(Role::Output).count(),
        weights = registry.by_role(Role::Weight).count(),
        scratch = registry.by_role(Role::Scratch).count(),
        weight_bytes = weights.len(),
        strategy = %config.scratch,
        "exported trace"
    );

    Ok(Export {
        name: config.name.clone(),
        header,
        source,
        weights,
        weights_header,
    })
}
