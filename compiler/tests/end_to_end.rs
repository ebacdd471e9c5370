use embedc::classify::classify;
use embedc::params::{resolve_weight_map, ParameterTable};
use embedc::{export, BufferId, ExportConfig, Role, ScratchStrategy, Trace};
use std::path::Path;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../docs/examples")
        .join(name)
}

fn load_two_kernel() -> Trace {
    Trace::load(fixture("two_kernel.trace.json")).expect("Failed to load fixture trace")
}

#[test]
fn test_two_kernel_classification() {
    let trace = load_two_kernel();
    let c = classify(&trace, 1).expect("Classification failed");

    assert_eq!(c.registry.role_of(BufferId(1)), Some(Role::Input));
    assert_eq!(c.registry.role_of(BufferId(3)), Some(Role::Output));
    assert_eq!(c.registry.role_of(BufferId(2)), Some(Role::Scratch));
    assert_eq!(c.registry.role_of(BufferId(4)), Some(Role::Weight));

    assert_eq!(c.registry.lookup(BufferId(2)).unwrap().name, "scratch_0");
    assert_eq!(c.registry.lookup(BufferId(4)).unwrap().offset, Some(0));
}

#[test]
fn test_two_kernel_export_stack() {
    let trace = load_two_kernel();
    let config = ExportConfig::new("net").with_scratch(ScratchStrategy::Stack);
    let out = export(&trace, &config).expect("Export failed");

    assert_eq!(out.weights.len(), 16);
    assert_eq!(out.weights.map.keys().copied().collect::<Vec<_>>(), vec![0]);
    let span = &out.weights.map[&0];
    assert_eq!(span.len, 16);
    assert_eq!(span.buffer, BufferId(4));
    assert_eq!(
        out.weights.bytes,
        vec![0, 0, 128, 63, 0, 0, 0, 64, 0, 0, 64, 64, 0, 0, 128, 64]
    );

    // Call statements, in trace order
    let calls: Vec<&str> = out
        .source
        .lines()
        .filter(|l| l.starts_with("  net_E_4"))
        .collect();
    assert_eq!(
        calls,
        vec![
            "  net_E_4(scratch_0, input_0);",
            "  net_E_4n1(output_0, scratch_0, (float *)((unsigned char *)net->weights + 0));",
        ]
    );

    // Kernel bodies renamed into the export namespace
    assert!(out
        .source
        .contains("void net_E_4(float* restrict data0, const float* restrict data1) {"));
    assert!(out.source.contains("void net_E_4n1(float* restrict data0,"));
    assert!(!out.source.contains("void E_4("));

    assert!(out.header.contains(
        "void net_fn(net_t *net, const float *restrict input_0, float *restrict output_0);"
    ));
}

#[test]
fn test_two_kernel_export_heap() {
    let trace = load_two_kernel();
    let out = export(&trace, &ExportConfig::new("net")).expect("Export failed");

    assert!(out.header.contains("  float *scratch_0;\n"));
    assert!(out
        .source
        .contains("  net->scratch_0 = malloc(sizeof(float) * 4);"));
    assert!(out.source.contains("  free(net->scratch_0);"));
    assert!(out
        .source
        .contains("  net_E_4((float *)(net->scratch_0), input_0);"));
}

#[test]
fn test_config_file_drives_export() {
    let trace = load_two_kernel();
    let config = ExportConfig::load(fixture("two_kernel.config.json")).expect("Failed to load config");
    let out = export(&trace, &config).expect("Export failed");

    assert!(out.source.contains("  static float scratch_0[4];"));
    let weights_h = out.weights_header.expect("weights header requested");
    assert!(weights_h.contains("#define NET_WEIGHTS_LEN 16"));
}

#[test]
fn test_weight_map_resolution() {
    let trace = load_two_kernel();
    let out = export(&trace, &ExportConfig::new("net")).expect("Export failed");
    let table =
        ParameterTable::load(fixture("two_kernel.params.json")).expect("Failed to load params");

    let report = resolve_weight_map(&out.weights, &table);
    assert!(report.is_complete());
    assert_eq!(report.lines(), vec!["scale.weight -> off: 0, len: 16"]);

    let report = resolve_weight_map(&out.weights, &ParameterTable::new());
    assert_eq!(report.unmatched.len(), 1);
    assert_eq!(report.unmatched[0].buffer, BufferId(4));
}

#[test]
fn test_weight_map_json_sidecar() {
    let trace = load_two_kernel();
    let out = export(&trace, &ExportConfig::new("net")).expect("Export failed");
    let json: serde_json::Value =
        serde_json::from_str(&out.weights.map_json().unwrap()).expect("map is valid JSON");

    assert_eq!(json[0]["offset"], 0);
    assert_eq!(json[0]["len"], 16);
    assert_eq!(json[0]["buffer"], 4);
    assert_eq!(json[0]["name"], "scratch_1");
    assert_eq!(json[0]["dtype"], "float");
}
