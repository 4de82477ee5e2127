//! End-to-end compilations through the backend driver
//!
//! Each test builds a typed program with the shared fixtures, runs it
//! through `DpdkBackend` and checks the final state, the assembly text and
//! the side outputs.

mod support;

use dpdkc::asm::Operand;
use dpdkc::optimizer::MAX_IDENTIFIER_LEN;
use dpdkc::{ArchVariant, BackendOptions, BackendState, DpdkBackend, Error, Severity};
use support::*;

fn assembly_of(outcome: &dpdkc::CompileOutcome) -> &str {
    outcome.assembly.as_deref().unwrap_or_default()
}

#[test]
fn test_pna_program_compiles() {
    let outcome = DpdkBackend::new(BackendOptions::new(ArchVariant::Pna))
        .compile(pna_program())
        .unwrap();

    assert!(outcome.succeeded(), "diagnostics: {:?}", outcome.diagnostics);
    assert_eq!(outcome.error_count(), 0);
    let asm = assembly_of(&outcome);
    assert!(asm.contains("rx m.pna_main_input_metadata_input_port"));
    assert!(asm.contains("tx m.pna_main_output_metadata_output_port"));
    assert!(asm.contains("table ipv4_host"));
    assert!(asm.contains("extract h.ethernet"));
    assert!(asm.contains("emit h.ipv4"));
}

#[test]
fn test_checkpoints_are_monotonic() {
    let mut backend = DpdkBackend::new(BackendOptions::new(ArchVariant::Pna));
    backend.convert(pna_program()).unwrap();
    assert_eq!(backend.state(), BackendState::CheckpointB);

    let mut text = Vec::new();
    backend.codegen(&mut text).unwrap();

    assert_eq!(
        backend.history(),
        &[
            BackendState::Init,
            BackendState::Lowering,
            BackendState::CheckpointA,
            BackendState::PostCodegenOptimization,
            BackendState::CheckpointB,
            BackendState::Serialize,
            BackendState::Done,
        ]
    );
    assert!(!text.is_empty());
}

#[test]
fn test_convert_twice_is_rejected() {
    let mut backend = DpdkBackend::new(BackendOptions::new(ArchVariant::Pna));
    backend.convert(pna_program()).unwrap();
    assert!(matches!(
        backend.convert(pna_program()),
        Err(Error::InvalidState { .. })
    ));
}

#[test]
fn test_shared_key_uses_one_field() {
    let mut backend = DpdkBackend::new(BackendOptions::new(ArchVariant::Pna));
    backend.convert(shared_key_program()).unwrap();
    assert_eq!(backend.state(), BackendState::CheckpointB);

    let structure = backend.structure();
    let routes = structure.table("routes").unwrap();
    let acl = structure.table("acl").unwrap();
    assert!(routes.keys[0].target.is_some());
    assert_eq!(routes.keys[0].target, acl.keys[0].target);
    assert_ne!(acl.keys[0].target, acl.keys[1].target);
    // dst_addr once, protocol once
    assert_eq!(structure.key_struct().fields.len(), 2);

    let asm = backend.assembly().unwrap();
    let key_of = |name: &str| {
        asm.tables
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.keys[0].0.clone())
    };
    let shared = key_of("routes");
    assert!(matches!(shared, Some(Operand::Meta(_))));
    assert_eq!(shared, key_of("acl"));
}

#[test]
fn test_runtime_loop_bound_aborts() {
    let mut backend = DpdkBackend::new(BackendOptions::new(ArchVariant::Pna));
    backend.convert(runtime_loop_program()).unwrap();

    assert_eq!(backend.state(), BackendState::Aborted);
    assert_eq!(
        backend.history(),
        &[
            BackendState::Init,
            BackendState::Lowering,
            BackendState::CheckpointA,
            BackendState::Aborted,
        ]
    );
    assert!(backend.assembly().is_none());
    assert!(backend
        .diagnostics()
        .errors()
        .any(|d| d.pass == "LoopUnroll"));

    let mut text = Vec::new();
    assert!(matches!(
        backend.codegen(&mut text),
        Err(Error::Aborted { .. })
    ));
    assert!(text.is_empty());
}

#[test]
fn test_aborted_compile_has_no_assembly() {
    let outcome = DpdkBackend::new(BackendOptions::new(ArchVariant::Pna))
        .compile(runtime_loop_program())
        .unwrap();
    assert!(!outcome.succeeded());
    assert!(outcome.assembly.is_none());
    assert!(outcome.error_count() > 0);
}

#[test]
fn test_no_context_destination() {
    let outcome = DpdkBackend::new(BackendOptions::new(ArchVariant::Pna))
        .compile(pna_program())
        .unwrap();

    assert_eq!(outcome.state, BackendState::Done);
    assert!(outcome.assembly.is_some());
    assert!(outcome.artifacts.context_json.is_none());
    assert!(outcome.artifacts.io_errors.is_empty());
    assert!(outcome
        .diagnostics
        .iter()
        .all(|d| d.severity != Severity::Error));
}

#[test]
fn test_pna_adds_recirculation_id() {
    let outcome = DpdkBackend::new(BackendOptions::new(ArchVariant::Pna))
        .compile(pna_program())
        .unwrap();
    assert!(assembly_of(&outcome).contains("recircid m.pna_main_input_metadata_pass"));
}

#[test]
fn test_psa_has_no_recirculation_id() {
    let outcome = DpdkBackend::new(BackendOptions::new(ArchVariant::Psa))
        .compile(psa_program())
        .unwrap();

    assert!(outcome.succeeded(), "diagnostics: {:?}", outcome.diagnostics);
    let asm = assembly_of(&outcome);
    assert!(!asm.contains("recircid"));
    assert!(asm.contains("rx m.psa_ingress_input_metadata_ingress_port"));
    assert!(asm.contains("tx m.psa_ingress_output_metadata_egress_port"));
    assert!(asm.contains("psa_ingress_output_metadata_drop"));
}

#[test]
fn test_program_for_other_architecture_is_rejected() {
    let mut backend = DpdkBackend::new(BackendOptions::new(ArchVariant::Psa));
    assert!(matches!(
        backend.convert(pna_program()),
        Err(Error::UnknownPackage { .. })
    ));
}

#[test]
fn test_context_file_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("context.json");
    let mut options = BackendOptions::new(ArchVariant::Pna);
    options.context_file = Some(path.clone());
    options.program_name = "l3fwd".into();

    let outcome = DpdkBackend::new(options).compile(pna_program()).unwrap();
    assert!(outcome.succeeded());
    assert!(outcome.artifacts.io_errors.is_empty());

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(outcome.artifacts.context_json.as_deref(), Some(text.as_str()));
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["program_name"], "l3fwd");
    assert_eq!(json["target"], "DPDK");
    assert_eq!(json["tables"][0]["target_name"], FORWARD_TABLE);
    assert_eq!(json["tables"][0]["match_key_fields"][0]["name"], "hdr.ipv4.dst_addr");
}

#[test]
fn test_unwritable_context_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = BackendOptions::new(ArchVariant::Pna);
    options.context_file = Some(dir.path().join("missing").join("context.json"));

    let outcome = DpdkBackend::new(options).compile(pna_program()).unwrap();

    // I/O problems never stop the compilation
    assert!(outcome.succeeded());
    assert_eq!(outcome.error_count(), 0);
    assert_eq!(outcome.artifacts.io_errors.len(), 1);
    assert!(matches!(outcome.artifacts.io_errors[0], Error::Io { .. }));
    // The rendered text is still handed back
    assert!(outcome
        .artifacts
        .context_json
        .as_deref()
        .is_some_and(|json| json.contains("\"target\"")));
}

#[test]
fn test_context_keeps_names_table_config_shortens() {
    let long = "ipv4_host_routes_for_the_datacenter_fabric_spine_and_leaf_layers";
    assert!(long.len() > MAX_IDENTIFIER_LEN);
    let dir = tempfile::tempdir().unwrap();
    let mut options = BackendOptions::new(ArchVariant::Pna);
    options.context_file = Some(dir.path().join("context.json"));
    options.table_config_dir = Some(dir.path().to_path_buf());

    let program = pna_program_with(pna_main_control(vec![forward_table(
        long,
        vec![send_entry(0x0a00_0001, 1)],
    )]));
    let outcome = DpdkBackend::new(options).compile(program).unwrap();
    assert!(outcome.succeeded(), "diagnostics: {:?}", outcome.diagnostics);

    let short = outcome.artifacts.rename_map.get(long).cloned().unwrap();
    assert!(short.len() <= MAX_IDENTIFIER_LEN);

    // The context artifact is written before renaming and keeps the long name
    let context = outcome.artifacts.context_json.as_deref().unwrap();
    assert!(context.contains(long));
    assert!(!context.contains(&short));

    // Assembly and table configuration use the short one
    let asm = assembly_of(&outcome);
    assert!(!asm.contains(long));
    assert!(asm.contains(&short));
    assert!(!outcome.artifacts.table_configs.contains_key(long));
    assert_eq!(
        outcome.artifacts.table_configs.get(&short).map(String::as_str),
        Some("match 0xa000001 action send port 0x1\n")
    );
    let written = std::fs::read_to_string(dir.path().join(format!("{}.txt", short))).unwrap();
    assert_eq!(written, "match 0xa000001 action send port 0x1\n");
}

#[test]
fn test_debug_hook_sees_both_pipelines() {
    use std::sync::{Arc, Mutex};

    let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = BackendOptions::new(ArchVariant::Pna).with_debug_hook(Arc::new(
        move |event: &dpdkc::PassEvent, _tree: &dyn std::fmt::Debug| {
            sink.lock().unwrap().push(event.pipeline);
        },
    ));

    let outcome = DpdkBackend::new(options).compile(pna_program()).unwrap();
    assert!(outcome.succeeded());

    let seen = seen.lock().unwrap();
    let lowering = seen.iter().filter(|p| **p == "lowering").count();
    let postcodegen = seen.iter().filter(|p| **p == "postcodegen").count();
    assert_eq!(
        lowering,
        dpdkc::passes::lowering_pipeline(ArchVariant::Pna).execution_order().len()
    );
    assert_eq!(
        postcodegen,
        dpdkc::optimizer::postcodegen_pipeline(ArchVariant::Pna)
            .execution_order()
            .len()
    );
    assert_eq!(seen.first(), Some(&"lowering"));
    assert_eq!(seen.last(), Some(&"postcodegen"));
}
