//! Integration tests for the persistent code store across context restarts.

mod common;

use common::{persistent_config, record_files, source, Runtime};
use kiln_diagnostics::DiagnosticSink;

// ---------------------------------------------------------------------------
// Restart behavior
// ---------------------------------------------------------------------------

#[test]
fn restart_loads_from_persistent_store() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DiagnosticSink::new();
    let src = source("a.js", "var x=1;");

    let first_id = {
        let runtime = Runtime::start(persistent_config(dir.path()));
        let artifact = runtime.context.compile(&src, &sink).unwrap();
        assert_eq!(runtime.codegen.calls(), 1);
        assert!(!artifact.is_isolated());
        artifact.compilation_id()
    };
    assert_eq!(record_files(dir.path()).len(), 1);

    let runtime = Runtime::start(persistent_config(dir.path()));
    let artifact = runtime.context.compile(&src, &sink).unwrap();
    assert_eq!(runtime.codegen.calls(), 0);
    assert_eq!(artifact.compilation_id(), first_id);
    assert_eq!(runtime.context.stats().persistent_hits, 1);
    assert_eq!(runtime.context.stats().fresh_compiles, 0);
}

#[test]
fn persisted_units_are_reinstalled_completely() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DiagnosticSink::new();
    let src = source("f.js", "function f(){} function g(){} f(g);");

    let original = {
        let runtime = Runtime::start(persistent_config(dir.path()));
        let artifact = runtime.context.compile(&src, &sink).unwrap();
        (
            artifact.entry().code_hash(),
            artifact.sub_units().len(),
            artifact.constants().to_vec(),
        )
    };

    let runtime = Runtime::start(persistent_config(dir.path()));
    let restored = runtime.context.compile(&src, &sink).unwrap();
    assert_eq!(runtime.codegen.calls(), 0);
    assert_eq!(restored.entry().code_hash(), original.0);
    assert_eq!(restored.sub_units().len(), original.1);
    assert_eq!(restored.constants(), original.2.as_slice());
    assert_eq!(restored.sub_unit(2).unwrap().initializer.arity, 1);

    let loader = restored.entry().loader_id().unwrap();
    assert_eq!(runtime.target.units_in(loader), 3);
}

#[test]
fn fresh_ids_continue_past_restored_ids() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DiagnosticSink::new();

    let stored_id = {
        let runtime = Runtime::start(persistent_config(dir.path()));
        let _a = runtime.context.compile(&source("a.js", "1"), &sink).unwrap();
        let _b = runtime.context.compile(&source("b.js", "2"), &sink).unwrap();
        let c = runtime.context.compile(&source("c.js", "3"), &sink).unwrap();
        c.compilation_id()
    };

    let runtime = Runtime::start(persistent_config(dir.path()));
    let restored = runtime.context.compile(&source("c.js", "3"), &sink).unwrap();
    assert_eq!(restored.compilation_id(), stored_id);

    let fresh = runtime.context.compile(&source("d.js", "4"), &sink).unwrap();
    assert!(fresh.compilation_id() > stored_id);
}

// ---------------------------------------------------------------------------
// Invalidation
// ---------------------------------------------------------------------------

#[test]
fn runtime_upgrade_ignores_old_records() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DiagnosticSink::new();
    let src = source("a.js", "var x=1;");

    {
        let runtime = Runtime::start_version(persistent_config(dir.path()), "1.0.0");
        runtime.context.compile(&src, &sink).unwrap();
    }

    let runtime = Runtime::start_version(persistent_config(dir.path()), "2.0.0");
    runtime.context.compile(&src, &sink).unwrap();
    assert_eq!(runtime.codegen.calls(), 1);
    assert_eq!(runtime.context.stats().persistent_hits, 0);
    assert_eq!(record_files(dir.path()).len(), 2);
}

#[test]
fn optimistic_and_standard_profiles_do_not_share_records() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DiagnosticSink::new();
    let src = source("a.js", "var x=1;");

    {
        let runtime = Runtime::start(persistent_config(dir.path()));
        runtime.context.compile(&src, &sink).unwrap();
    }

    let mut optimistic = persistent_config(dir.path());
    optimistic.compile.optimistic_types = true;
    let runtime = Runtime::start(optimistic);
    runtime.context.compile(&src, &sink).unwrap();
    assert_eq!(runtime.codegen.calls(), 1);

    let store_dir = runtime.context.persistent_store_dir().unwrap();
    assert!(store_dir.to_string_lossy().ends_with("_opt"));
}

#[test]
fn eager_optimistic_compiles_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = persistent_config(dir.path());
    config.compile.optimistic_types = true;
    config.compile.lazy = false;

    let runtime = Runtime::start(config);
    runtime
        .context
        .compile(&source("a.js", "var x=1;"), &DiagnosticSink::new())
        .unwrap();
    assert!(record_files(dir.path()).is_empty());
}

#[test]
fn corrupt_record_falls_back_to_codegen() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DiagnosticSink::new();
    let src = source("a.js", "var x=1;");

    {
        let runtime = Runtime::start(persistent_config(dir.path()));
        runtime.context.compile(&src, &sink).unwrap();
    }
    let record = record_files(dir.path()).pop().unwrap();
    let mut bytes = std::fs::read(&record).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&record, bytes).unwrap();

    let runtime = Runtime::start(persistent_config(dir.path()));
    let artifact = runtime.context.compile(&src, &sink).unwrap();
    assert_eq!(runtime.codegen.calls(), 1);
    assert_eq!(runtime.context.stats().persistent_hits, 0);
    drop(artifact);

    // the fresh compile rewrote the record
    let runtime = Runtime::start(persistent_config(dir.path()));
    runtime.context.compile(&src, &sink).unwrap();
    assert_eq!(runtime.codegen.calls(), 0);
}

#[test]
fn small_sources_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = persistent_config(dir.path());
    config.cache.min_persist_size = 100;

    let runtime = Runtime::start(config);
    let artifact = runtime
        .context
        .compile(&source("a.js", "var x=1;"), &DiagnosticSink::new())
        .unwrap();
    assert!(record_files(dir.path()).is_empty());
    // persistence still forces named installation
    assert!(!artifact.is_isolated());
}

// ---------------------------------------------------------------------------
// Write failures
// ---------------------------------------------------------------------------

#[test]
fn failed_store_write_does_not_fail_compile() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::start(persistent_config(dir.path()));
    let store_dir = runtime.context.persistent_store_dir().unwrap();
    std::fs::remove_dir_all(&store_dir).unwrap();

    let artifact = runtime
        .context
        .compile(&source("a.js", "var x=1;"), &DiagnosticSink::new());
    assert!(artifact.is_ok());

    let stats = runtime.context.stats();
    assert_eq!(stats.persist_failures, 1);
    assert_eq!(stats.fresh_compiles, 1);
    assert!(record_files(dir.path()).is_empty());
}
