//! Metadata field liveness
//!
//! A metadata field is live when any instruction, table key or `learn`
//! refers to it. `learn` copies the action data from consecutive metadata
//! fields starting at its operand, so the whole window counts.

use crate::asm::{AsmProgram, AsmStmt, Operand};
use crate::error::Result;
use crate::pass::{Analysis, PassContext, Rewrite};
use std::collections::BTreeSet;

/// Metadata fields some instruction, table key or `learn` reads
pub fn read_metadata_fields(program: &AsmProgram) -> BTreeSet<String> {
    let mut read: BTreeSet<String> = program
        .tables
        .iter()
        .flat_map(|t| t.keys.iter())
        .filter_map(|(key, _)| key.meta_field().map(str::to_string))
        .collect();
    for body in program.bodies() {
        for stmt in body {
            read.extend(
                stmt.reads()
                    .into_iter()
                    .filter_map(|o| o.meta_field().map(str::to_string)),
            );
        }
    }
    read.extend(learn_windows(program));
    read
}

/// Every metadata field name the program refers to
pub fn used_metadata_fields(program: &AsmProgram) -> BTreeSet<String> {
    let mut used = read_metadata_fields(program);
    for body in program.bodies() {
        for stmt in body {
            if let Some(field) = stmt.writes().and_then(Operand::meta_field) {
                used.insert(field.to_string());
            }
        }
    }
    used
}

fn learn_windows(program: &AsmProgram) -> Vec<String> {
    let Some(metadata) = program.metadata_struct() else {
        return Vec::new();
    };
    let mut window = Vec::new();
    for body in program.bodies() {
        for stmt in body {
            let AsmStmt::Learn {
                action,
                arg: Some(Operand::Meta(first)),
            } = stmt
            else {
                continue;
            };
            let count = program
                .actions
                .iter()
                .find(|a| &a.name == action)
                .and_then(|a| a.args.as_deref())
                .and_then(|args| program.struct_named(args))
                .map_or(1, |s| s.fields.len().max(1));
            if let Some(start) = metadata.fields.iter().position(|f| &f.name == first) {
                window.extend(
                    metadata.fields[start..]
                        .iter()
                        .take(count)
                        .map(|f| f.name.clone()),
                );
            }
        }
    }
    window
}

/// Computes the live metadata fields
pub struct CollectUsedMetadataField;

impl Analysis<AsmProgram> for CollectUsedMetadataField {
    type Output = BTreeSet<String>;

    fn name(&self) -> &'static str {
        "CollectUsedMetadataField"
    }

    fn analyze(&mut self, program: &AsmProgram, _cx: &mut PassContext<'_>) -> Result<Self::Output> {
        Ok(used_metadata_fields(program))
    }
}

/// Drops metadata fields outside the live set
pub struct RemoveUnusedMetadataFields;

impl Rewrite<AsmProgram, BTreeSet<String>> for RemoveUnusedMetadataFields {
    fn name(&self) -> &'static str {
        "RemoveUnusedMetadataFields"
    }

    fn rewrite(
        &mut self,
        mut program: AsmProgram,
        used: &BTreeSet<String>,
        _cx: &mut PassContext<'_>,
    ) -> Result<AsmProgram> {
        if let Some(metadata) = program.metadata_struct_mut() {
            let before = metadata.fields.len();
            metadata.fields.retain(|f| used.contains(&f.name));
            tracing::debug!(
                removed = before - metadata.fields.len(),
                kept = metadata.fields.len(),
                "metadata fields pruned"
            );
        }
        Ok(program)
    }
}
