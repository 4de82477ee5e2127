//! Copy propagation and dead `mov` elimination
//!
//! Within a straight-line run of instructions (a label starts a new run), a
//! read of `m.x` after `mov m.x src` is replaced by `src` as long as neither
//! side has been written since and both have the same width. A `mov` into a
//! metadata field nothing reads is then removed.

use super::liveness::read_metadata_fields;
use crate::asm::{AsmProgram, AsmStmt, Operand};
use crate::error::Result;
use crate::pass::{Normalizer, PassContext};
use std::collections::HashMap;

/// Forward copy propagation followed by dead store removal
pub struct CopyPropagationAndElimination;

impl Normalizer<AsmProgram> for CopyPropagationAndElimination {
    fn name(&self) -> &'static str {
        "CopyPropagationAndElimination"
    }

    fn normalize(&mut self, mut program: AsmProgram, _cx: &mut PassContext<'_>) -> Result<AsmProgram> {
        let widths = Widths::of(&program);
        let mut replaced = 0;
        for body in program.bodies_mut() {
            replaced += propagate(body, &widths);
        }

        let read = read_metadata_fields(&program);
        let mut removed = 0;
        for body in program.bodies_mut() {
            let before = body.len();
            body.retain(|stmt| match stmt {
                AsmStmt::Mov { dst, src } if dst == src => false,
                AsmStmt::Mov {
                    dst: Operand::Meta(field),
                    ..
                } => read.contains(field),
                _ => true,
            });
            removed += before - body.len();
        }
        tracing::debug!(replaced, removed, "copy propagation");
        Ok(program)
    }
}

/// Operand widths known from the metadata and header layouts
struct Widths {
    meta: HashMap<String, u32>,
    header: HashMap<(String, String), u32>,
}

impl Widths {
    fn of(program: &AsmProgram) -> Self {
        let meta = program
            .metadata_struct()
            .map(|m| m.fields.iter().map(|f| (f.name.clone(), f.width)).collect())
            .unwrap_or_default();
        let mut header = HashMap::new();
        for (instance, ty) in &program.headers {
            if let Some(layout) = program.header_types.iter().find(|h| &h.name == ty) {
                for field in &layout.fields {
                    header.insert((instance.clone(), field.name.clone()), field.width);
                }
            }
        }
        Self { meta, header }
    }

    fn get(&self, operand: &Operand) -> Option<u32> {
        match operand {
            Operand::Meta(name) => self.meta.get(name).copied(),
            Operand::Header { instance, field } => {
                self.header.get(&(instance.clone(), field.clone())).copied()
            }
            _ => None,
        }
    }

    /// `src` can stand in for `dst` everywhere `dst` is read
    fn interchangeable(&self, dst: &Operand, src: &Operand) -> bool {
        let Some(width) = self.get(dst) else {
            return false;
        };
        match src {
            Operand::Imm(v) => width >= 64 || *v < (1u64 << width),
            Operand::Meta(_) | Operand::Header { .. } => self.get(src) == Some(width),
            Operand::ActionArg(_) => false,
        }
    }
}

fn propagate(body: &mut [AsmStmt], widths: &Widths) -> usize {
    let mut copies: HashMap<String, Operand> = HashMap::new();
    let mut replaced = 0;
    for stmt in body.iter_mut() {
        if matches!(stmt, AsmStmt::Label(_)) {
            copies.clear();
            continue;
        }
        replaced += substitute(stmt, &copies);

        match stmt {
            AsmStmt::Table(_)
            | AsmStmt::Extract(_)
            | AsmStmt::Validate(_)
            | AsmStmt::Invalidate(_)
            | AsmStmt::Learn { .. }
            | AsmStmt::Recirculate
            | AsmStmt::Mirror { .. } => {
                copies.clear();
                continue;
            }
            _ => {}
        }
        if let Some(written) = stmt.writes().cloned() {
            copies.retain(|_, src| *src != written);
            if let Operand::Meta(field) = &written {
                copies.remove(field);
            }
            if let AsmStmt::Mov { dst, src } = &*stmt {
                if let Some(field) = dst.meta_field() {
                    if dst != src && widths.interchangeable(dst, src) {
                        copies.insert(field.to_string(), src.clone());
                    }
                }
            }
        }
    }
    replaced
}

/// Replace the read-only operands of `stmt`; returns the number replaced
fn substitute(stmt: &mut AsmStmt, copies: &HashMap<String, Operand>) -> usize {
    if copies.is_empty() {
        return 0;
    }
    let mut replaced = 0;
    let mut replace = |operand: &mut Operand, allow_imm: bool| {
        let Some(field) = operand.meta_field() else {
            return;
        };
        if let Some(src) = copies.get(field) {
            if allow_imm || !src.is_imm() {
                *operand = src.clone();
                replaced += 1;
            }
        }
    };
    match stmt {
        AsmStmt::Mov { src, .. } | AsmStmt::Alu { src, .. } => replace(src, true),
        AsmStmt::JmpCmp { left, right, .. } => {
            replace(left, false);
            replace(right, true);
        }
        AsmStmt::RegRead { index, .. } => replace(index, true),
        AsmStmt::RegWrite { index, src, .. } | AsmStmt::RegAdd { index, src, .. } => {
            replace(index, true);
            replace(src, true);
        }
        _ => {}
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{AsmField, AsmStruct, CmpOp};
    use crate::pass::testing::Harness;

    fn meta(name: &str) -> Operand {
        Operand::Meta(name.into())
    }

    fn program(apply: Vec<AsmStmt>) -> AsmProgram {
        AsmProgram {
            structs: vec![AsmStruct {
                name: "meta_t".into(),
                fields: vec![
                    AsmField::new("tmp", 8),
                    AsmField::new("x", 8),
                    AsmField::new("wide", 32),
                    AsmField::new("port", 32),
                ],
            }],
            metadata: Some("meta_t".into()),
            apply,
            ..AsmProgram::default()
        }
    }

    fn run(apply: Vec<AsmStmt>) -> Vec<AsmStmt> {
        let mut h = Harness::default();
        CopyPropagationAndElimination
            .normalize(program(apply), &mut h.cx())
            .map(|p| p.apply)
            .unwrap_or_default()
    }

    #[test]
    fn test_temp_copy_folded_into_use() {
        let out = run(vec![
            AsmStmt::Mov {
                dst: meta("tmp"),
                src: meta("x"),
            },
            AsmStmt::JmpCmp {
                op: CmpOp::Eq,
                target: "L".into(),
                left: meta("tmp"),
                right: Operand::Imm(1),
            },
            AsmStmt::Label("L".into()),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0],
            AsmStmt::JmpCmp {
                op: CmpOp::Eq,
                target: "L".into(),
                left: meta("x"),
                right: Operand::Imm(1),
            }
        );
    }

    #[test]
    fn test_source_overwritten_stops_propagation() {
        let out = run(vec![
            AsmStmt::Mov {
                dst: meta("tmp"),
                src: meta("x"),
            },
            AsmStmt::Mov {
                dst: meta("x"),
                src: Operand::Imm(3),
            },
            AsmStmt::Mov {
                dst: meta("port"),
                src: meta("tmp"),
            },
            AsmStmt::Tx(meta("port")),
        ]);
        assert!(out.contains(&AsmStmt::Mov {
            dst: meta("port"),
            src: meta("tmp"),
        }));
    }

    #[test]
    fn test_width_mismatch_is_not_propagated() {
        let out = run(vec![
            AsmStmt::Mov {
                dst: meta("tmp"),
                src: meta("wide"),
            },
            AsmStmt::Mov {
                dst: meta("port"),
                src: meta("tmp"),
            },
            AsmStmt::Tx(meta("port")),
        ]);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_immediate_not_placed_first_in_compare() {
        let out = run(vec![
            AsmStmt::Mov {
                dst: meta("tmp"),
                src: Operand::Imm(7),
            },
            AsmStmt::JmpCmp {
                op: CmpOp::Eq,
                target: "L".into(),
                left: meta("tmp"),
                right: meta("x"),
            },
            AsmStmt::Label("L".into()),
        ]);
        assert_eq!(out.len(), 3);
    }
}
