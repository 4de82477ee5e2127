//! # dpdkc - P4 to DPDK Pipeline Assembly
//!
//! Backend that lowers a typed P4 program (PSA or PNA architecture) into the
//! assembly language of the DPDK software switch pipeline, together with a
//! context JSON for the control plane and per-table configuration text.
//!
//! ## Stages
//!
//! 1. **Lowering** - collectors, validators and normalizers bring the
//!    program tree into a shape the target can express ([`passes`])
//! 2. **Conversion** - the lowered tree becomes flat assembly ([`convert`])
//! 3. **Post-codegen optimization** - jump cleanup, copy propagation,
//!    field pruning and identifier shortening ([`optimizer`])
//! 4. **Serialization** - the assembly text ([`asm::display`])
//!
//! Problems in the program are collected as [`Diagnostics`] and checked
//! between stages; see [`backend`] for the state machine.
//!
//! ## Configuration
//!
//! ```rust
//! use dpdkc::{ArchVariant, BackendOptions};
//!
//! let options = BackendOptions::from_json(r#"{"arch": "pna", "program_name": "l2fwd"}"#)?;
//! assert_eq!(options.arch, ArchVariant::Pna);
//! assert!(options.context_file.is_none());
//! # Ok::<(), dpdkc::Error>(())
//! ```

#![allow(clippy::collapsible_match)] // Nested matches mirror the tree shape

/// Backend version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod arch;
pub mod asm;
pub mod backend;
pub mod context;
pub mod context_json;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod ir;
pub mod optimizer;
pub mod pass;
pub mod passes;

// Re-export main types
pub use arch::{ArchVariant, BlockRole};
pub use asm::AsmProgram;
pub use backend::{BackendOptions, BackendState, CompileOutcome, DpdkBackend};
pub use context::ProgramStructure;
pub use context_json::{ContextGenerator, ContextJson};
pub use diagnostics::{Diagnostic, Diagnostics, ErrorKind, Severity};
pub use error::{Error, Result};
pub use ir::Program;
pub use pass::{Artifacts, DebugHook, PassEvent, Pipeline};
