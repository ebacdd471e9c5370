//! C Header and Source Generation
//!
//! Produces, for an export named `net`:
//!
//! ```text
//! typedef struct { ... } net_t;
//! net_t *net_init(void *weights, size_t weights_len);
//! void net_free(net_t *net);
//! void net_fn(net_t *net, const float *restrict input_0, float *restrict output_0);
//! ```
//!
//! Kernel bodies are copied from the trace with their symbol prefixed by the
//! export name, so several exports can be linked into one program. Call
//! statements keep the trace order exactly.

use crate::classify::{ArgRef, Buffer, Classification, Role};
use crate::scratch::{ScratchStorage, ScratchStrategy};

const HEADER_PREAMBLE: &str = "#pragma once
#include <stdbool.h>
#include <stddef.h>
#include <stdlib.h>
#include <math.h>

#ifndef max
#define max(x,y) ((x>y)?x:y)
#endif
#ifndef uint8
#define uint8 unsigned char
#endif
#ifndef half
#define half __fp16
#endif
";

/// Render the header declaring the struct and the three exported functions
pub fn render_header(name: &str, c: &Classification, strategy: ScratchStrategy) -> String {
    let scratch = c.scratch_buffers();
    let storage = strategy.storage();

    let mut out = String::from(HEADER_PREAMBLE);
    out.push('\n');
    out.push_str("typedef struct {\n");
    out.push_str("  void *weights;\n");
    out.push_str("  size_t weights_len;\n");
    for field in storage.struct_fields(&scratch) {
        out.push_str(&field);
        out.push('\n');
    }
    out.push_str(&format!("}} {}_t;\n\n", name));

    out.push_str(&format!(
        "{name}_t *{name}_init(void *weights, size_t weights_len);\n\n",
        name = name
    ));
    out.push_str(&format!("void {name}_free({name}_t *{name});\n\n", name = name));
    out.push_str(&driver_signature(name, c));
    out.push_str(";\n");
    out
}

/// Render the source: lifecycle functions, kernel bodies, driver function
pub fn render_source(name: &str, c: &Classification, strategy: ScratchStrategy) -> String {
    let scratch = c.scratch_buffers();
    let storage = strategy.storage();

    let mut out = format!("#include \"{}.h\"\n\n", name);

    // init
    out.push_str(&format!(
        "{name}_t *{name}_init(void *weights, size_t weights_len) {{\n",
        name = name
    ));
    out.push_str(&format!(
        "  {name}_t *{name} = malloc(sizeof({name}_t));\n",
        name = name
    ));
    out.push_str(&format!("  if ({} == NULL) {{\n    return NULL;\n  }}\n", name));
    out.push_str(&format!("  {}->weights = weights;\n", name));
    out.push_str(&format!("  {}->weights_len = weights_len;\n", name));
    push_lines(&mut out, storage.init_lines(name, &scratch));
    out.push_str(&format!("  return {};\n}}\n\n", name));

    // free
    out.push_str(&format!("void {name}_free({name}_t *{name}) {{\n", name = name));
    push_lines(&mut out, storage.free_lines(name, &scratch));
    out.push_str(&format!("  free({});\n}}\n\n", name));

    for kernel in &c.kernels {
        let renamed = rename_symbol(&kernel.source, &kernel.name, &namespaced(name, &kernel.name));
        out.push_str(renamed.trim_end());
        out.push_str("\n\n");
    }

    // driver
    out.push_str(&driver_signature(name, c));
    out.push_str(" {\n");
    let locals = storage.local_lines(&scratch);
    if !locals.is_empty() {
        push_lines(&mut out, locals);
        out.push('\n');
    }
    for call in &c.calls {
        let args: Vec<String> = call
            .args
            .iter()
            .map(|arg| render_arg(arg, c, name, storage))
            .collect();
        out.push_str(&format!(
            "  {}({});\n",
            namespaced(name, &call.kernel),
            args.join(", ")
        ));
    }
    out.push_str("}\n");
    out
}

/// Expression passed to a kernel for one argument
pub fn render_arg(arg: &ArgRef, c: &Classification, var: &str, storage: &dyn ScratchStorage) -> String {
    let buffer = c.registry.get(arg.buffer());
    match *arg {
        ArgRef::Special(_) => buffer.name.clone(),
        ArgRef::Scratch(_) => storage.reference(var, buffer),
        ArgRef::Weight { offset, .. } => format!(
            "({} *)((unsigned char *){}->weights + {})",
            buffer.dtype.c_name(),
            var,
            offset
        ),
    }
}

/// Replace whole-identifier occurrences of `from` with `to`.
///
/// `E_2` in `E_23` or `xE_2` is left alone.
pub fn rename_symbol(source: &str, from: &str, to: &str) -> String {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut out = String::with_capacity(source.len() + to.len());
    let mut rest = source;
    let mut prev: Option<char> = None;

    while let Some(pos) = rest.find(from) {
        let before = rest[..pos].chars().next_back().or(prev);
        let after = rest[pos + from.len()..].chars().next();
        let bounded = !before.is_some_and(is_ident) && !after.is_some_and(is_ident);

        out.push_str(&rest[..pos]);
        if bounded {
            out.push_str(to);
        } else {
            out.push_str(from);
        }
        prev = from.chars().next_back();
        rest = &rest[pos + from.len()..];
    }
    out.push_str(rest);
    out
}

fn namespaced(export: &str, kernel: &str) -> String {
    format!("{}_{}", export, kernel)
}

fn driver_signature(name: &str, c: &Classification) -> String {
    let mut params = vec![format!("{name}_t *{name}", name = name)];
    params.extend(c.special_buffers().into_iter().map(driver_param));
    format!("void {}_fn({})", name, params.join(", "))
}

fn driver_param(buffer: &Buffer) -> String {
    let constness = if buffer.role == Role::Input { "const " } else { "" };
    format!(
        "{}{} *restrict {}",
        constness,
        buffer.dtype.c_name(),
        buffer.name
    )
}

fn push_lines(out: &mut String, lines: Vec<String>) {
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::dtype::DType;
    use crate::trace::{BufferRef, KernelInvocation, SpecialKind, Trace};

    fn trace() -> Trace {
        let mut trace = Trace::new();
        trace.add_kernel(
            KernelInvocation::new("E_4", "void E_4(float* restrict data0, const uint8* restrict data1) { }")
                .with_buffer(BufferRef::new(2, 4, DType::Float))
                .with_buffer(BufferRef::new(1, 4, DType::Uint8)),
        );
        trace.add_kernel(
            KernelInvocation::new("r_4", "void r_4(float* data0, const float* data1, const float* data2) { }")
                .with_buffer(BufferRef::new(3, 1, DType::Float))
                .with_buffer(BufferRef::new(2, 4, DType::Float))
                .with_buffer(BufferRef::new(4, 4, DType::Float)),
        );
        trace.add_special(1, SpecialKind::Input, 0);
        trace.add_special(3, SpecialKind::Output, 0);
        trace
    }

    #[test]
    fn test_rename_symbol_boundaries() {
        let src = "void E_2(int x) { E_23(); xE_2(); E_2(); }";
        assert_eq!(
            rename_symbol(src, "E_2", "net_E_2"),
            "void net_E_2(int x) { E_23(); xE_2(); net_E_2(); }"
        );
    }

    #[test]
    fn test_rename_symbol_adjacent_matches() {
        assert_eq!(rename_symbol("abab ab", "ab", "X"), "abab X");
        assert_eq!(rename_symbol("ab(ab)", "ab", "X"), "X(X)");
    }

    #[test]
    fn test_header_heap_fields() {
        let c = classify(&trace(), 1).unwrap();
        let h = render_header("net", &c, ScratchStrategy::Heap);
        assert!(h.contains("  float *scratch_0;\n} net_t;"));
        assert!(h.contains("net_t *net_init(void *weights, size_t weights_len);"));
        assert!(h.contains("void net_free(net_t *net);"));
        assert!(h.contains(
            "void net_fn(net_t *net, const uint8 *restrict input_0, float *restrict output_0);"
        ));
    }

    #[test]
    fn test_header_without_heap_has_no_scratch_fields() {
        let c = classify(&trace(), 1).unwrap();
        let h = render_header("net", &c, ScratchStrategy::Stack);
        assert!(h.contains("  size_t weights_len;\n} net_t;"));
        assert!(!h.contains("scratch_0"));
    }

    #[test]
    fn test_source_calls() {
        let c = classify(&trace(), 1).unwrap();
        let src = render_source("net", &c, ScratchStrategy::Stack);
        assert!(src.contains("void net_E_4(float* restrict data0"));
        assert!(src.contains("void net_r_4(float* data0"));
        assert!(src.contains("  float scratch_0[4];\n"));
        assert!(src.contains("  net_E_4(scratch_0, input_0);\n"));
        assert!(src.contains(
            "  net_r_4(output_0, scratch_0, (float *)((unsigned char *)net->weights + 0));\n"
        ));
    }

    #[test]
    fn test_source_heap_lifecycle() {
        let c = classify(&trace(), 1).unwrap();
        let src = render_source("net", &c, ScratchStrategy::Heap);
        assert!(src.contains("  net->scratch_0 = malloc(sizeof(float) * 4);\n"));
        assert!(src.contains("  free(net->scratch_0);\n  free(net);\n"));
        assert!(src.contains("  net_E_4((float *)(net->scratch_0), input_0);\n"));
        assert!(!src.contains("float scratch_0[4]"));
    }
}
