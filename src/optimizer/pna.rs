//! PNA-only fixups

use crate::arch::{ArchVariant, PNA_DIRECTION_FIELDS, PNA_PASS_FIELD};
use crate::asm::{AsmField, AsmProgram, AsmStmt, Operand, RegArray};
use crate::error::Result;
use crate::pass::{Normalizer, PassContext};

/// Register array holding the direction of every port
pub const DIRECTION_REGARRAY: &str = "direction";

/// Ports covered by the direction register array
pub const DIRECTION_REGARRAY_SIZE: u64 = 0x100;

/// Position right after `rx`
fn after_rx(apply: &[AsmStmt]) -> usize {
    apply
        .iter()
        .position(|s| matches!(s, AsmStmt::Rx(_)))
        .map_or(0, |i| i + 1)
}

/// Loads the recirculation pass number at the start of `apply`
pub struct PrependPassRecircId;

impl Normalizer<AsmProgram> for PrependPassRecircId {
    fn name(&self) -> &'static str {
        "PrependPassRecircId"
    }

    fn normalize(&mut self, mut program: AsmProgram, _cx: &mut PassContext<'_>) -> Result<AsmProgram> {
        if program.apply.iter().any(|s| matches!(s, AsmStmt::RecircId(_))) {
            return Ok(program);
        }
        let at = after_rx(&program.apply);
        program
            .apply
            .insert(at, AsmStmt::RecircId(Operand::Meta(PNA_PASS_FIELD.to_string())));
        if let Some(metadata) = program.metadata_struct_mut() {
            if !metadata.fields.iter().any(|f| f.name == PNA_PASS_FIELD) {
                metadata.fields.push(AsmField::new(PNA_PASS_FIELD, 32));
            }
        }
        Ok(program)
    }
}

/// Serves reads of the direction fields from the `direction` register
/// array, indexed by the input port
pub struct DirectionToRegRead;

impl Normalizer<AsmProgram> for DirectionToRegRead {
    fn name(&self) -> &'static str {
        "DirectionToRegRead"
    }

    fn normalize(&mut self, mut program: AsmProgram, _cx: &mut PassContext<'_>) -> Result<AsmProgram> {
        let read: Vec<&str> = PNA_DIRECTION_FIELDS
            .iter()
            .copied()
            .filter(|field| {
                program.bodies().flatten().any(|stmt| {
                    stmt.reads().iter().any(|o| o.meta_field() == Some(*field))
                })
            })
            .collect();
        if read.is_empty() {
            return Ok(program);
        }

        if !program.regarrays.iter().any(|r| r.name == DIRECTION_REGARRAY) {
            program.regarrays.push(RegArray {
                name: DIRECTION_REGARRAY.to_string(),
                size: DIRECTION_REGARRAY_SIZE,
                init: 0,
            });
        }
        let port = Operand::Meta(ArchVariant::Pna.rx_field().to_string());
        let at = after_rx(&program.apply);
        for (k, field) in read.iter().enumerate() {
            program.apply.insert(
                at + k,
                AsmStmt::RegRead {
                    dst: Operand::Meta(field.to_string()),
                    reg: DIRECTION_REGARRAY.to_string(),
                    index: port.clone(),
                },
            );
        }
        tracing::debug!(fields = read.len(), "direction served from register array");
        Ok(program)
    }
}
