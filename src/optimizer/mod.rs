//! # Post-codegen Optimization
//!
//! Passes over the assembly program, run after conversion:
//! - PNA fixups (recirculation id, direction register)
//! - Unused action removal
//! - Jump and label cleanup
//! - Copy propagation and dead `mov` removal
//! - Metadata field pruning
//! - Identifier shortening and table configuration output

pub mod copy_prop;
pub mod jumps;
pub mod liveness;
pub mod pna;
pub mod rename;
pub mod table_config;

pub use copy_prop::CopyPropagationAndElimination;
pub use jumps::{
    EliminateUnusedAction, RemoveLabelAfterLabel, RemoveRedundantJumps, RemoveUnusedLabels,
    ThreadJumps,
};
pub use liveness::{CollectUsedMetadataField, RemoveUnusedMetadataFields};
pub use pna::{DirectionToRegRead, PrependPassRecircId};
pub use rename::{ApplyRenameMap, ShortenTokenLength, MAX_IDENTIFIER_LEN};
pub use table_config::EmitDpdkTableConfig;

use crate::arch::ArchVariant;
use crate::asm::AsmProgram;
use crate::pass::{Normalize, Paired, PassItem, Pipeline};

/// Runs of the jump cleanup group
pub const JUMP_CLEANUP_REPEAT: usize = 2;

/// Jump and label cleanup, repeated a fixed number of times
pub fn asm_optimization() -> PassItem<AsmProgram> {
    PassItem::repeated(
        JUMP_CLEANUP_REPEAT,
        vec![
            PassItem::pass(Normalize(RemoveRedundantJumps)),
            PassItem::pass(Normalize(RemoveLabelAfterLabel)),
            PassItem::pass(Normalize(ThreadJumps)),
            PassItem::pass(Normalize(RemoveUnusedLabels)),
        ],
    )
}

/// The post-codegen pipeline
pub fn postcodegen_pipeline(arch: ArchVariant) -> Pipeline<AsmProgram> {
    let pipeline: Pipeline<AsmProgram> = Pipeline::new("postcodegen");
    let pipeline = match arch {
        ArchVariant::Pna => pipeline
            .add(Normalize(PrependPassRecircId))
            .add(Normalize(DirectionToRegRead)),
        ArchVariant::Psa => pipeline,
    };
    pipeline
        .add(Normalize(EliminateUnusedAction))
        .item(asm_optimization())
        .add(Normalize(CopyPropagationAndElimination))
        .add(Paired::new(CollectUsedMetadataField, RemoveUnusedMetadataFields))
        .add(Paired::new(
            ShortenTokenLength,
            (ApplyRenameMap, EmitDpdkTableConfig),
        ))
}
