//! # Backend Driver
//!
//! Runs one compilation through its stages:
//!
//! ```text
//! Init -> Lowering -> CheckpointA -> PostCodegenOptimization -> CheckpointB -> Serialize -> Done
//!                          |                                        |
//!                          +--------------> Aborted <---------------+
//! ```
//!
//! Diagnostics never stop a stage; a checkpoint with at least one error
//! aborts the compilation and no assembly is produced. Contract violations
//! by the caller are returned as [`Error`] right away.
//!
//! ## Usage
//! ```ignore
//! use dpdkc::{BackendOptions, DpdkBackend};
//!
//! let outcome = DpdkBackend::new(BackendOptions::default()).compile(program)?;
//! if outcome.succeeded() {
//!     std::fs::write("l2fwd.spec", outcome.assembly.unwrap_or_default())?;
//! }
//! ```

use crate::arch::ArchVariant;
use crate::asm::AsmProgram;
use crate::context::ProgramStructure;
use crate::convert::ConvertToDpdkProgram;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{Error, Result};
use crate::ir::Program;
use crate::optimizer::postcodegen_pipeline;
use crate::pass::{Artifacts, Collector, Convert, DebugHook, PassContext};
use crate::passes::{lowering_pipeline, ParseDpdkArchitecture};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Backend configuration
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    /// Target architecture
    pub arch: ArchVariant,
    /// Destination of the context JSON; nothing is written when unset
    pub context_file: Option<PathBuf>,
    /// Directory receiving `<table>.txt` configuration files
    pub table_config_dir: Option<PathBuf>,
    /// Program name recorded in the context JSON
    pub program_name: String,
    /// Command line recorded in the context JSON
    pub compile_command: String,
    /// Called after every pass with the resulting tree
    #[serde(skip)]
    pub debug_hook: Option<DebugHook>,
}

impl fmt::Debug for BackendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendOptions")
            .field("arch", &self.arch)
            .field("context_file", &self.context_file)
            .field("table_config_dir", &self.table_config_dir)
            .field("program_name", &self.program_name)
            .field("compile_command", &self.compile_command)
            .field("debug_hook", &self.debug_hook.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl BackendOptions {
    /// Options for `arch`, everything else default
    pub fn new(arch: ArchVariant) -> Self {
        Self {
            arch,
            ..Self::default()
        }
    }

    /// Load options from JSON; missing keys take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Install a debug hook
    pub fn with_debug_hook(mut self, hook: DebugHook) -> Self {
        self.debug_hook = Some(hook);
        self
    }
}

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendState {
    /// Nothing run yet
    Init,
    /// Running the lowering pipeline and conversion
    Lowering,
    /// Checking diagnostics after lowering
    CheckpointA,
    /// Running the post-codegen pipeline
    PostCodegenOptimization,
    /// Checking diagnostics after post-codegen
    CheckpointB,
    /// Writing the assembly text
    Serialize,
    /// Assembly produced
    Done,
    /// Stopped at a checkpoint
    Aborted,
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything one compilation produced
#[derive(Debug)]
pub struct CompileOutcome {
    /// Final state
    pub state: BackendState,
    /// Assembly text, only when the compilation succeeded
    pub assembly: Option<String>,
    /// All diagnostics in report order
    pub diagnostics: Vec<Diagnostic>,
    /// Side outputs
    pub artifacts: Artifacts,
}

impl CompileOutcome {
    /// The compilation reached `Done`
    pub fn succeeded(&self) -> bool {
        self.state == BackendState::Done
    }

    /// Number of error diagnostics
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == crate::diagnostics::Severity::Error)
            .count()
    }
}

/// P4 to DPDK assembly backend
pub struct DpdkBackend {
    options: BackendOptions,
    structure: ProgramStructure,
    diagnostics: Diagnostics,
    artifacts: Artifacts,
    state: BackendState,
    history: Vec<BackendState>,
    asm: Option<AsmProgram>,
}

impl DpdkBackend {
    /// Create a backend in state `Init`
    pub fn new(options: BackendOptions) -> Self {
        Self {
            structure: ProgramStructure::new(options.arch),
            options,
            diagnostics: Diagnostics::new(),
            artifacts: Artifacts::default(),
            state: BackendState::Init,
            history: vec![BackendState::Init],
            asm: None,
        }
    }

    /// Current state
    pub fn state(&self) -> BackendState {
        self.state
    }

    /// States entered so far, in order
    pub fn history(&self) -> &[BackendState] {
        &self.history
    }

    /// Architecture context
    pub fn structure(&self) -> &ProgramStructure {
        &self.structure
    }

    /// Diagnostics reported so far
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Side outputs produced so far
    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// The assembly program, once post-codegen optimization has passed
    pub fn assembly(&self) -> Option<&AsmProgram> {
        self.asm.as_ref()
    }

    fn transition(&mut self, next: BackendState) {
        tracing::info!(from = %self.state, to = %next, "backend state");
        self.state = next;
        self.history.push(next);
    }

    fn expect_state(&self, expected: BackendState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: expected.to_string(),
                found: self.state.to_string(),
            })
        }
    }

    /// `true` when the compilation may go on
    fn checkpoint(&mut self) -> bool {
        let errors = self.diagnostics.error_count();
        if errors == 0 {
            return true;
        }
        tracing::warn!(errors, at = %self.state, "compilation aborted");
        self.transition(BackendState::Aborted);
        false
    }

    fn context(&mut self) -> PassContext<'_> {
        PassContext {
            structure: &mut self.structure,
            diagnostics: &mut self.diagnostics,
            options: &self.options,
            artifacts: &mut self.artifacts,
        }
    }

    /// Lower, convert and optimize `program`.
    ///
    /// Ends in `CheckpointB`, or in `Aborted` when a checkpoint found errors.
    pub fn convert(&mut self, program: Program) -> Result<()> {
        self.expect_state(BackendState::Init)?;
        let arch = self.options.arch;
        let hook = self.options.debug_hook.clone();

        self.transition(BackendState::Lowering);
        self.diagnostics.enter_pass("ParseDpdkArchitecture");
        ParseDpdkArchitecture.collect(&program, &mut self.structure)?;
        let asm = {
            let mut cx = self.context();
            let program = lowering_pipeline(arch)
                .with_hook(hook.clone())
                .run(program, &mut cx)?;
            cx.diagnostics.enter_pass("ConvertToDpdkProgram");
            ConvertToDpdkProgram.convert(program, &mut cx)?
        };

        self.transition(BackendState::CheckpointA);
        if !self.checkpoint() {
            return Ok(());
        }

        self.transition(BackendState::PostCodegenOptimization);
        let asm = {
            let mut cx = self.context();
            postcodegen_pipeline(arch).with_hook(hook).run(asm, &mut cx)?
        };

        self.transition(BackendState::CheckpointB);
        if !self.checkpoint() {
            return Ok(());
        }
        self.asm = Some(asm);
        Ok(())
    }

    /// Write the assembly text to `out`
    pub fn codegen<W: std::io::Write>(&mut self, out: &mut W) -> Result<()> {
        if self.state == BackendState::Aborted {
            return Err(Error::Aborted {
                errors: self.diagnostics.error_count(),
            });
        }
        self.expect_state(BackendState::CheckpointB)?;
        let Some(asm) = self.asm.as_ref() else {
            return Err(Error::contract("codegen", "no assembly after post-codegen"));
        };
        let text = asm.to_string();
        self.transition(BackendState::Serialize);
        out.write_all(text.as_bytes())
            .map_err(|e| Error::io("<output>", &e))?;
        self.transition(BackendState::Done);
        Ok(())
    }

    /// Run the whole compilation
    pub fn compile(mut self, program: Program) -> Result<CompileOutcome> {
        self.convert(program)?;
        let mut text = Vec::new();
        let assembly = match self.codegen(&mut text) {
            Ok(()) => Some(String::from_utf8_lossy(&text).into_owned()),
            Err(Error::Aborted { .. }) => None,
            Err(err) => return Err(err),
        };
        Ok(CompileOutcome {
            state: self.state,
            assembly,
            diagnostics: self.diagnostics.into_vec(),
            artifacts: self.artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_json() {
        let options = BackendOptions::from_json(r#"{"arch": "psa", "program_name": "fw"}"#);
        let Ok(options) = options else {
            panic!("options did not parse");
        };
        assert_eq!(options.arch, ArchVariant::Psa);
        assert_eq!(options.program_name, "fw");
        assert!(options.context_file.is_none());
    }

    #[test]
    fn test_unknown_arch_rejected() {
        assert!(BackendOptions::from_json(r#"{"arch": "tna"}"#).is_err());
    }

    #[test]
    fn test_codegen_before_convert() {
        let mut backend = DpdkBackend::new(BackendOptions::default());
        let mut out = Vec::new();
        assert!(matches!(
            backend.codegen(&mut out),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_missing_main_stops_immediately() {
        let mut backend = DpdkBackend::new(BackendOptions::default());
        assert_eq!(backend.convert(Program::default()), Err(Error::MissingMain));
        assert_eq!(backend.state(), BackendState::Lowering);
    }

    #[test]
    fn test_debug_hides_hook() {
        let options = BackendOptions::default()
            .with_debug_hook(std::sync::Arc::new(|_event: &crate::pass::PassEvent, _tree: &dyn fmt::Debug| {}));
        assert!(format!("{:?}", options).contains("<hook>"));
    }
}
