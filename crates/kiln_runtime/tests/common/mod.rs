//! Shared fixtures for the runtime integration tests.

#![allow(dead_code)]

use kiln_common::{CompiledUnits, Constant, RawSubUnit, RawUnit, UnitInitializer};
use kiln_config::RuntimeConfig;
use kiln_diagnostics::DiagnosticSink;
use kiln_runtime::{Codegen, Collaborators, ExecutionContext, LocalTarget};
use kiln_source::{Origin, Source};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Emits the source text as the main unit and one nested unit per
/// `function` keyword, counting every invocation.
#[derive(Default)]
pub struct CountingCodegen {
    calls: AtomicUsize,
}

impl CountingCodegen {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Codegen for CountingCodegen {
    fn compile_units(
        &self,
        source: &Source,
        _strict: bool,
        _sink: &DiagnosticSink,
    ) -> Option<CompiledUnits> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut units = CompiledUnits::single(RawUnit::new(
            "program",
            source.text().as_bytes().to_vec(),
        ));
        for (i, _) in source.text().match_indices("function").enumerate() {
            let id = i as u32 + 1;
            units.sub_units.insert(
                id,
                RawSubUnit {
                    unit: RawUnit::new(format!("fn{id}"), vec![id as u8; 4]),
                    initializer: UnitInitializer {
                        function_name: format!("fn{id}"),
                        arity: 1,
                        flags: 0,
                    },
                },
            );
        }
        units.constants.push(Constant::Str(source.name().to_string()));
        Some(units)
    }
}

pub struct Runtime {
    pub context: Arc<ExecutionContext>,
    pub codegen: Arc<CountingCodegen>,
    pub target: Arc<LocalTarget>,
}

impl Runtime {
    pub fn start(config: RuntimeConfig) -> Self {
        Self::start_version(config, kiln_common::RUNTIME_VERSION)
    }

    pub fn start_version(config: RuntimeConfig, version: &str) -> Self {
        let codegen = Arc::new(CountingCodegen::default());
        let target = Arc::new(LocalTarget::new());
        let context = Arc::new(ExecutionContext::with_runtime_version(
            config,
            Collaborators::new(codegen.clone(), target.clone()),
            version,
        ));
        Self {
            context,
            codegen,
            target,
        }
    }
}

/// Persistence on, with every source eligible.
pub fn persistent_config(dir: &Path) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.cache.persistent = true;
    config.cache.directory = dir.to_path_buf();
    config.cache.min_persist_size = 1;
    config
}

pub fn source(name: &str, text: &str) -> Source {
    Source::new(name, Origin::new(format!("file:{name}")), text)
}

pub fn record_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap().flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(record_files(&path));
        } else if path.extension().is_some_and(|ext| ext == "rec") {
            files.push(path);
        }
    }
    files
}
