//! Weight Layout
//!
//! Persisted buffers are laid out in a single contiguous blob. Offsets are
//! handed out in first-encounter order while the trace is classified; once
//! classification is done the live bytes of each buffer are copied into the
//! blob at its offset.
//!
//! With the default alignment of 1 the spans are packed back-to-back, so the
//! offset of the k-th weight is the sum of the byte sizes of the weights
//! before it. A larger alignment rounds each offset up and zero-fills the gap.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::dtype::DType;
use crate::error::ExportError;
use crate::trace::{BufferId, Trace};

/// One persisted buffer inside the blob
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WeightSpan {
    pub offset: usize,
    /// Byte length
    pub len: usize,
    pub buffer: BufferId,
    /// Generated buffer name (`scratch_<n>`)
    pub name: String,
    pub dtype: DType,
    /// Element count
    pub elements: usize,
}

impl WeightSpan {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Offset assignment for weight buffers
#[derive(Clone, Debug)]
pub struct WeightLayout {
    alignment: usize,
    cursor: usize,
    spans: Vec<WeightSpan>,
    by_buffer: HashMap<BufferId, usize>,
}

impl WeightLayout {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment: alignment.max(1),
            cursor: 0,
            spans: Vec::new(),
            by_buffer: HashMap::new(),
        }
    }

    /// Assign the next offset to `buffer`, or return the one it already has.
    pub fn assign(
        &mut self,
        buffer: BufferId,
        name: &str,
        elements: usize,
        dtype: DType,
    ) -> Result<usize, ExportError> {
        if let Some(&idx) = self.by_buffer.get(&buffer) {
            return Ok(self.spans[idx].offset);
        }

        let overflow = || {
            ExportError::consistency(
                buffer,
                format!("{} x {} does not fit in the weight blob", elements, dtype),
            )
        };
        let len = dtype.byte_size(elements).ok_or_else(overflow)?;
        let offset = self
            .cursor
            .checked_next_multiple_of(self.alignment)
            .ok_or_else(overflow)?;
        let end = offset.checked_add(len).ok_or_else(overflow)?;

        self.by_buffer.insert(buffer, self.spans.len());
        self.spans.push(WeightSpan {
            offset,
            len,
            buffer,
            name: name.to_string(),
            dtype,
            elements,
        });
        self.cursor = end;
        Ok(offset)
    }

    /// Total blob size in bytes
    pub fn total_len(&self) -> usize {
        self.cursor
    }

    pub fn spans(&self) -> &[WeightSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Copy each weight's live bytes into a blob laid out by this plan.
    ///
    /// Every recorded payload is checked against its span before the blob
    /// is allocated.
    pub fn pack(&self, trace: &Trace) -> Result<WeightBlob, ExportError> {
        let mut payloads = Vec::with_capacity(self.spans.len());
        for span in &self.spans {
            let contents = trace.contents_of(span.buffer).ok_or_else(|| {
                ExportError::contract(format!(
                    "no contents recorded for weight buffer {} ({})",
                    span.buffer, span.name
                ))
            })?;
            if contents.len() != span.len {
                return Err(ExportError::consistency(
                    span.buffer,
                    format!(
                        "recorded contents are {} bytes, expected {} ({} x {})",
                        contents.len(),
                        span.len,
                        span.elements,
                        span.dtype
                    ),
                ));
            }
            payloads.push((span, contents));
        }

        let mut bytes = vec![0u8; self.cursor];
        let mut map = BTreeMap::new();
        for (span, contents) in payloads {
            bytes[span.offset..span.end()].copy_from_slice(contents);
            map.insert(span.offset, span.clone());
        }

        Ok(WeightBlob { bytes, map })
    }
}

/// The serialized weights plus the out-of-band map describing them
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeightBlob {
    pub bytes: Vec<u8>,
    /// Offset -> span
    pub map: BTreeMap<usize, WeightSpan>,
}

impl WeightBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Spans in offset order
    pub fn spans(&self) -> impl Iterator<Item = &WeightSpan> {
        self.map.values()
    }

    /// Bytes belonging to the span at `offset`
    pub fn slice(&self, offset: usize) -> Option<&[u8]> {
        self.map
            .get(&offset)
            .map(|span| &self.bytes[span.offset..span.end()])
    }

    /// The map as pretty JSON, one entry per span in offset order
    pub fn map_json(&self) -> Result<String, ExportError> {
        let spans: Vec<&WeightSpan> = self.spans().collect();
        Ok(serde_json::to_string_pretty(&spans)?)
    }

    /// Verify that spans are ordered, disjoint, correctly sized and inside the blob.
    pub fn check_invariants(&self) -> Result<(), ExportError> {
        let mut prev_end = 0usize;
        let mut first = true;
        for (&offset, span) in &self.map {
            if offset != span.offset {
                return Err(ExportError::consistency(
                    span.buffer,
                    format!("map key {} disagrees with span offset {}", offset, span.offset),
                ));
            }
            if !first && offset < prev_end {
                return Err(ExportError::consistency(
                    span.buffer,
                    format!("span at {} overlaps previous span ending at {}", offset, prev_end),
                ));
            }
            if span.dtype.byte_size(span.elements) != Some(span.len) {
                return Err(ExportError::consistency(
                    span.buffer,
                    format!("span length {} is not {} x {}", span.len, span.elements, span.dtype),
                ));
            }
            let end = match span.offset.checked_add(span.len) {
                Some(end) if end <= self.bytes.len() => end,
                _ => {
                    return Err(ExportError::consistency(
                        span.buffer,
                        format!(
                            "span {}+{} runs past blob end {}",
                            span.offset,
                            span.len,
                            self.bytes.len()
                        ),
                    ))
                }
            };
            prev_end = end;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Trace;

    #[test]
    fn test_packed_offsets() {
        let mut layout = WeightLayout::new(1);
        assert_eq!(layout.assign(BufferId(10), "scratch_1", 4, DType::Float).unwrap(), 0);
        assert_eq!(layout.assign(BufferId(11), "scratch_2", 3, DType::Uint8).unwrap(), 16);
        assert_eq!(layout.assign(BufferId(12), "scratch_3", 2, DType::Half).unwrap(), 19);
        assert_eq!(layout.total_len(), 23);

        // Re-assigning keeps the first offset
        assert_eq!(layout.assign(BufferId(11), "scratch_2", 3, DType::Uint8).unwrap(), 16);
        assert_eq!(layout.spans().len(), 3);
    }

    #[test]
    fn test_aligned_offsets() {
        let mut layout = WeightLayout::new(4);
        assert_eq!(layout.assign(BufferId(1), "a", 3, DType::Uint8).unwrap(), 0);
        assert_eq!(layout.assign(BufferId(2), "b", 1, DType::Float).unwrap(), 4);
        assert_eq!(layout.assign(BufferId(3), "c", 1, DType::Uint8).unwrap(), 8);
        assert_eq!(layout.total_len(), 9);
    }

    #[test]
    fn test_pack_copies_contents() {
        let mut layout = WeightLayout::new(4);
        layout.assign(BufferId(1), "a", 2, DType::Uint8).unwrap();
        layout.assign(BufferId(2), "b", 1, DType::Float).unwrap();

        let mut trace = Trace::new();
        trace.set_contents(1, vec![7, 8]);
        trace.set_contents(2, vec![1, 2, 3, 4]);

        let blob = layout.pack(&trace).unwrap();
        assert_eq!(blob.bytes, vec![7, 8, 0, 0, 1, 2, 3, 4]);
        assert_eq!(blob.slice(4), Some(&[1u8, 2, 3, 4][..]));
        blob.check_invariants().unwrap();
    }

    #[test]
    fn test_pack_missing_contents() {
        let mut layout = WeightLayout::new(1);
        layout.assign(BufferId(1), "scratch_0", 2, DType::Float).unwrap();
        let err = layout.pack(&Trace::new()).unwrap_err();
        assert!(matches!(err, ExportError::ContractViolation(_)));
    }

    #[test]
    fn test_pack_wrong_size() {
        let mut layout = WeightLayout::new(1);
        layout.assign(BufferId(1), "scratch_0", 2, DType::Float).unwrap();
        let mut trace = Trace::new();
        trace.set_contents(1, vec![0; 4]);
        let err = layout.pack(&trace).unwrap_err();
        assert!(matches!(err, ExportError::ConsistencyViolation { .. }));
    }

    #[test]
    fn test_assign_overflow() {
        let mut layout = WeightLayout::new(1);
        let err = layout
            .assign(BufferId(2), "scratch_1", 1usize << 62, DType::Float)
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::ConsistencyViolation { buffer: BufferId(2), .. }
        ));

        // Offset + length past usize::MAX
        let mut layout = WeightLayout::new(1);
        layout.assign(BufferId(1), "a", usize::MAX - 1, DType::Uint8).unwrap();
        assert!(layout.assign(BufferId(2), "b", 4, DType::Uint8).is_err());
        assert_eq!(layout.spans().len(), 1);
    }

    #[test]
    fn test_pack_checks_contents_before_allocating() {
        // A 4 TiB plan must be rejected from its short payload, not allocated
        let mut layout = WeightLayout::new(1);
        layout.assign(BufferId(1), "scratch_0", 1usize << 40, DType::Float).unwrap();
        let mut trace = Trace::new();
        trace.set_contents(1, vec![0; 4]);
        let err = layout.pack(&trace).unwrap_err();
        assert!(matches!(
            err,
            ExportError::ConsistencyViolation { buffer: BufferId(1), .. }
        ));
    }

    #[test]
    fn test_invariants_detect_overlap() {
        let span = |offset, buffer| WeightSpan {
            offset,
            len: 8,
            buffer: BufferId(buffer),
            name: format!("w{}", buffer),
            dtype: DType::Float,
            elements: 2,
        };
        let mut blob = WeightBlob {
            bytes: vec![0; 12],
            map: BTreeMap::new(),
        };
        blob.map.insert(0, span(0, 1));
        blob.map.insert(4, span(4, 2));
        assert!(blob.check_invariants().is_err());
    }
}
