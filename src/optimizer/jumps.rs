//! Jump and label cleanup, and unused action removal
//!
//! Labels are local to one instruction list: the `apply` block and each
//! action body are cleaned independently.

use crate::asm::{AsmProgram, AsmStmt};
use crate::error::Result;
use crate::pass::{Normalizer, PassContext};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Labels directly following position `i`
fn labels_after(body: &[AsmStmt], i: usize) -> impl Iterator<Item = &str> {
    body[i + 1..].iter().map_while(|s| match s {
        AsmStmt::Label(l) => Some(l.as_str()),
        _ => None,
    })
}

/// Removes jumps to a label that immediately follows the jump
pub struct RemoveRedundantJumps;

impl Normalizer<AsmProgram> for RemoveRedundantJumps {
    fn name(&self) -> &'static str {
        "RemoveRedundantJumps"
    }

    fn normalize(&mut self, mut program: AsmProgram, _cx: &mut PassContext<'_>) -> Result<AsmProgram> {
        for body in program.bodies_mut() {
            let mut keep = Vec::with_capacity(body.len());
            for (i, stmt) in body.iter().enumerate() {
                let redundant = match stmt.jump_target() {
                    Some(target) => labels_after(body, i).any(|l| l == target),
                    None => false,
                };
                keep.push(!redundant);
            }
            let mut flags = keep.into_iter();
            body.retain(|_| flags.next().unwrap_or(true));
        }
        Ok(program)
    }
}

/// Merges runs of adjacent labels into the first one
pub struct RemoveLabelAfterLabel;

impl Normalizer<AsmProgram> for RemoveLabelAfterLabel {
    fn name(&self) -> &'static str {
        "RemoveLabelAfterLabel"
    }

    fn normalize(&mut self, mut program: AsmProgram, _cx: &mut PassContext<'_>) -> Result<AsmProgram> {
        for body in program.bodies_mut() {
            let mut alias: HashMap<String, String> = HashMap::new();
            let mut previous: Option<String> = None;
            for stmt in body.iter() {
                match stmt {
                    AsmStmt::Label(l) => match &previous {
                        Some(first) => {
                            alias.insert(l.clone(), first.clone());
                        }
                        None => previous = Some(l.clone()),
                    },
                    _ => previous = None,
                }
            }
            if alias.is_empty() {
                continue;
            }
            body.retain(|s| !matches!(s, AsmStmt::Label(l) if alias.contains_key(l)));
            for stmt in body.iter_mut() {
                if let Some(target) = stmt.jump_target_mut() {
                    if let Some(first) = alias.get(target.as_str()) {
                        *target = first.clone();
                    }
                }
            }
        }
        Ok(program)
    }
}

/// Retargets jumps to a label whose first instruction is `jmp`
pub struct ThreadJumps;

impl Normalizer<AsmProgram> for ThreadJumps {
    fn name(&self) -> &'static str {
        "ThreadJumps"
    }

    fn normalize(&mut self, mut program: AsmProgram, _cx: &mut PassContext<'_>) -> Result<AsmProgram> {
        for body in program.bodies_mut() {
            let mut forward: HashMap<String, String> = HashMap::new();
            for (i, stmt) in body.iter().enumerate() {
                let AsmStmt::Label(label) = stmt else {
                    continue;
                };
                let next = body[i + 1..].iter().find(|s| !matches!(s, AsmStmt::Label(_)));
                if let Some(AsmStmt::Jmp(target)) = next {
                    if target != label {
                        forward.insert(label.clone(), target.clone());
                    }
                }
            }
            for stmt in body.iter_mut() {
                let Some(target) = stmt.jump_target_mut() else {
                    continue;
                };
                let mut seen = HashSet::new();
                while let Some(next) = forward.get(target.as_str()) {
                    if !seen.insert(next.clone()) {
                        break;
                    }
                    *target = next.clone();
                }
            }
        }
        Ok(program)
    }
}

/// Removes labels no jump refers to
pub struct RemoveUnusedLabels;

impl Normalizer<AsmProgram> for RemoveUnusedLabels {
    fn name(&self) -> &'static str {
        "RemoveUnusedLabels"
    }

    fn normalize(&mut self, mut program: AsmProgram, _cx: &mut PassContext<'_>) -> Result<AsmProgram> {
        for body in program.bodies_mut() {
            let used: HashSet<String> = body
                .iter()
                .filter_map(|s| s.jump_target().map(str::to_string))
                .collect();
            body.retain(|s| !matches!(s, AsmStmt::Label(l) if !used.contains(l)));
        }
        Ok(program)
    }
}

/// Removes actions no table and no `learn` refers to, with their argument
/// structs
pub struct EliminateUnusedAction;

impl Normalizer<AsmProgram> for EliminateUnusedAction {
    fn name(&self) -> &'static str {
        "EliminateUnusedAction"
    }

    fn normalize(&mut self, mut program: AsmProgram, _cx: &mut PassContext<'_>) -> Result<AsmProgram> {
        let mut used: BTreeSet<String> = BTreeSet::new();
        for table in &program.tables {
            used.extend(table.actions.iter().map(|(a, _)| a.clone()));
            used.insert(table.default_action.clone());
            used.extend(table.entries.iter().map(|e| e.action.clone()));
        }
        for body in program.bodies() {
            for stmt in body {
                if let AsmStmt::Learn { action, .. } = stmt {
                    used.insert(action.clone());
                }
            }
        }

        let mut dropped_args = BTreeSet::new();
        program.actions.retain(|action| {
            let keep = used.contains(&action.name);
            if !keep {
                tracing::debug!(action = %action.name, "removing unused action");
                dropped_args.extend(action.args.clone());
            }
            keep
        });
        program.structs.retain(|s| !dropped_args.contains(&s.name));
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{AsmAction, AsmStruct, AsmTable, CmpOp, Operand};
    use crate::pass::testing::Harness;

    fn label(l: &str) -> AsmStmt {
        AsmStmt::Label(l.into())
    }

    fn jmp(l: &str) -> AsmStmt {
        AsmStmt::Jmp(l.into())
    }

    fn run(pass: &mut dyn Normalizer<AsmProgram>, apply: Vec<AsmStmt>) -> Vec<AsmStmt> {
        let program = AsmProgram {
            apply,
            ..AsmProgram::default()
        };
        let mut h = Harness::default();
        pass.normalize(program, &mut h.cx())
            .map(|p| p.apply)
            .unwrap_or_default()
    }

    #[test]
    fn test_redundant_jump_over_label_run() {
        let out = run(
            &mut RemoveRedundantJumps,
            vec![jmp("B"), label("A"), label("B"), AsmStmt::Drop],
        );
        assert_eq!(out, vec![label("A"), label("B"), AsmStmt::Drop]);
    }

    #[test]
    fn test_label_after_label_merged() {
        let out = run(
            &mut RemoveLabelAfterLabel,
            vec![jmp("B"), AsmStmt::Drop, label("A"), label("B"), AsmStmt::Return],
        );
        assert_eq!(out, vec![jmp("A"), AsmStmt::Drop, label("A"), AsmStmt::Return]);
    }

    #[test]
    fn test_thread_jump_chain() {
        let cond = AsmStmt::JmpCmp {
            op: CmpOp::Eq,
            target: "A".into(),
            left: Operand::Meta("x".into()),
            right: Operand::Imm(1),
        };
        let out = run(
            &mut ThreadJumps,
            vec![cond, AsmStmt::Drop, label("A"), jmp("B"), label("B"), jmp("C"), label("C")],
        );
        assert_eq!(out[0].jump_target(), Some("C"));
        assert_eq!(out[3], jmp("C"));
    }

    #[test]
    fn test_self_loop_is_left_alone() {
        let out = run(&mut ThreadJumps, vec![label("A"), jmp("A")]);
        assert_eq!(out, vec![label("A"), jmp("A")]);
    }

    #[test]
    fn test_unused_labels_removed() {
        let out = run(
            &mut RemoveUnusedLabels,
            vec![jmp("B"), label("A"), AsmStmt::Drop, label("B")],
        );
        assert_eq!(out, vec![jmp("B"), AsmStmt::Drop, label("B")]);
    }

    #[test]
    fn test_unused_action_and_args_removed() {
        let action = |name: &str, args: Option<&str>| AsmAction {
            name: name.into(),
            args: args.map(str::to_string),
            body: vec![AsmStmt::Return],
        };
        let program = AsmProgram {
            structs: vec![AsmStruct {
                name: "orphan_arg_t".into(),
                fields: Vec::new(),
            }],
            actions: vec![action("fwd", None), action("orphan", Some("orphan_arg_t"))],
            tables: vec![AsmTable {
                name: "t".into(),
                keys: Vec::new(),
                actions: vec![("fwd".into(), false)],
                default_action: "fwd".into(),
                default_args: Vec::new(),
                const_default: false,
                size: 1,
                learner: false,
                entries: Vec::new(),
            }],
            ..AsmProgram::default()
        };
        let mut h = Harness::default();
        let out = EliminateUnusedAction
            .normalize(program, &mut h.cx())
            .unwrap_or_default();
        assert_eq!(out.actions.len(), 1);
        assert!(out.structs.is_empty());
    }
}
