//! Weight blob as a C array
//!
//! For targets without a filesystem the blob is compiled into the firmware.

use crate::layout::WeightBlob;

const BYTES_PER_LINE: usize = 16;

/// Render `<name>_weights[]` and `<NAME>_WEIGHTS_LEN` as a header.
///
/// An empty blob still gets a one-byte array (C forbids zero-length arrays)
/// but a length of 0.
pub fn render_weights_header(name: &str, blob: &WeightBlob) -> String {
    let len_macro = format!("{}_WEIGHTS_LEN", name.to_ascii_uppercase());

    let mut out = String::from("#pragma once\n\n");
    out.push_str(&format!("#define {} {}\n", len_macro, blob.len()));

    if blob.is_empty() {
        out.push_str(&format!("const unsigned char {}_weights[1] = {{0}};\n", name));
        return out;
    }

    out.push_str(&format!(
        "const unsigned char {}_weights[{}] = {{\n",
        name, len_macro
    ));
    let lines: Vec<String> = blob
        .bytes
        .chunks(BYTES_PER_LINE)
        .map(|chunk| {
            let bytes: Vec<String> = chunk.iter().map(|b| b.to_string()).collect();
            format!("  {}", bytes.join(", "))
        })
        .collect();
    out.push_str(&lines.join(",\n"));
    out.push_str("\n};\n");
    out
}
