//! # Lowering Passes
//!
//! Collectors, validators and normalizers over the program tree, and the
//! composition of the lowering pipeline that runs them.

pub mod arch_convert;
pub mod artifact;
pub mod collect;
pub mod keys;
pub mod lower;
pub mod simplify;
pub mod validate;

pub use arch_convert::{ConvertToDpdkArch, InjectFixedMetadataField, InjectJumboStruct};
pub use artifact::EmitContextArtifact;
pub use collect::{
    CollectAddOnMissTable, CollectDirectCounterMeter, CollectErrors, CollectExternDeclaration,
    CollectLocalVariables, CollectMetadataHeaderInfo, CollectProgramStructure, CollectTableInfo,
    ParseDpdkArchitecture,
};
pub use keys::CopyMatchKeysToSingleStruct;
pub use lower::{
    ConvertBinaryOperationTo2Params, ConvertLogicalExpression, IfStatementUnroll,
    MoveDeclarations, PrependPDotToActionArgs, StatementUnroll,
};
pub use simplify::{
    ConstantFolding, DismantleMuxExpressions, EliminateHeaderCopy, LoopUnroll, LowerExpressions,
    RemoveAllUnusedDeclarations, RemoveComplexExpressions, SimplifyKey,
};
pub use validate::{
    CheckExternInvocation, InspectDpdkProgram, TypeCheck, TypeWidthValidator,
    ValidateAddOnMissExterns, ValidateDirectCounterMeter, ValidateOperandSize,
};

use crate::arch::ArchVariant;
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::ir::{
    flat_map_stmts, BodyKind, Declaration, Expr, ExprKind, Local, Program, Scope, Stmt,
    TempAllocator,
};
use crate::pass::{Collect, Emit, Normalize, PassItem, Pipeline, Validate};

/// Number of `LowerExpressions` runs; one run leaves nested casts behind
pub const LOWER_EXPRESSIONS_REPEAT: usize = 2;

/// The lowering pipeline, from the typed program to the converter's input
pub fn lowering_pipeline(arch: ArchVariant) -> Pipeline<Program> {
    tracing::debug!(%arch, "composing lowering pipeline");
    Pipeline::<Program>::new("lowering")
        .add(Validate(ValidateOperandSize))
        .add(Normalize(LoopUnroll))
        .add(Normalize(SimplifyKey))
        .add(Validate(TypeCheck))
        .item(PassItem::repeated(
            LOWER_EXPRESSIONS_REPEAT,
            vec![PassItem::pass(Normalize(LowerExpressions))],
        ))
        .add(Normalize(RemoveComplexExpressions))
        .add(Normalize(DismantleMuxExpressions))
        .add(Normalize(ConstantFolding))
        .add(Normalize(EliminateHeaderCopy))
        .add(Validate(TypeCheck))
        .add(Normalize(RemoveAllUnusedDeclarations))
        .add(Collect(CollectTableInfo))
        .add(Collect(CollectAddOnMissTable))
        .add(Validate(ValidateAddOnMissExterns))
        .add(Normalize(MoveDeclarations))
        .add(Collect(CollectProgramStructure))
        .add(Collect(CollectMetadataHeaderInfo))
        .add(Normalize(ConvertToDpdkArch))
        .add(Normalize(InjectJumboStruct))
        .add(Normalize(InjectFixedMetadataField))
        .add(Validate(TypeCheck))
        .add(Normalize(StatementUnroll))
        .add(Normalize(IfStatementUnroll))
        .add(Normalize(ConvertBinaryOperationTo2Params))
        .add(Collect(CollectProgramStructure))
        .add(Normalize(CopyMatchKeysToSingleStruct))
        .add(Collect(CollectLocalVariables))
        .add(Validate(TypeCheck))
        .add(Collect(CollectErrors))
        .add(Normalize(PrependPDotToActionArgs))
        .add(Normalize(ConvertLogicalExpression))
        .add(Collect(CollectExternDeclaration))
        .add(Collect(CollectDirectCounterMeter))
        .add(Validate(ValidateDirectCounterMeter))
        .add(Collect(CollectProgramStructure))
        .add(Validate(InspectDpdkProgram))
        .add(Validate(CheckExternInvocation))
        .add(Validate(TypeWidthValidator))
        .add(Emit(EmitContextArtifact))
}

/// Rewrite every statement list of every parser, control and top-level
/// action. Temporaries allocated by `f` are declared in the enclosing block.
///
/// Returns the top-level actions that asked for temporaries; those have no
/// block to declare them in.
pub(crate) fn rewrite_bodies(
    program: &mut Program,
    f: &mut dyn FnMut(&Scope, Vec<Stmt>, &mut TempAllocator) -> Vec<Stmt>,
) -> Vec<String> {
    let mut homeless = Vec::new();
    for decl in &mut program.declarations {
        match decl {
            Declaration::Action(action) => {
                let mut temps =
                    TempAllocator::new(action.params.iter().map(|p| p.name.clone()));
                let scope = Scope {
                    block: None,
                    kind: BodyKind::Action,
                    name: action.name.clone(),
                };
                action.body = f(&scope, std::mem::take(&mut action.body), &mut temps);
                if !temps.is_empty() {
                    homeless.push(action.name.clone());
                }
            }
            Declaration::Control(control) => {
                let mut temps = TempAllocator::for_block(&control.locals, &control.params);
                for local in &mut control.locals {
                    if let Local::Action(action) = local {
                        let scope = Scope {
                            block: Some(control.name.clone()),
                            kind: BodyKind::Action,
                            name: action.name.clone(),
                        };
                        action.body = f(&scope, std::mem::take(&mut action.body), &mut temps);
                    }
                }
                let scope = Scope {
                    block: Some(control.name.clone()),
                    kind: BodyKind::Control,
                    name: control.name.clone(),
                };
                control.body = f(&scope, std::mem::take(&mut control.body), &mut temps);
                control.locals.extend(temps.into_locals());
            }
            Declaration::Parser(parser) => {
                let mut temps = TempAllocator::for_block(&parser.locals, &parser.params);
                for state in &mut parser.states {
                    let scope = Scope {
                        block: Some(parser.name.clone()),
                        kind: BodyKind::ParserState,
                        name: state.name.clone(),
                    };
                    state.body = f(&scope, std::mem::take(&mut state.body), &mut temps);
                }
                parser.locals.extend(temps.into_locals());
            }
            _ => {}
        }
    }
    homeless
}

/// Report top-level actions that needed temporaries
pub(crate) fn report_homeless(actions: Vec<String>, diagnostics: &mut Diagnostics) {
    for action in actions {
        diagnostics.error(
            ErrorKind::Unsupported,
            format!(
                "action {} needs temporary variables; declare it inside a control",
                action
            ),
        );
    }
}

/// Whether evaluating `stmt` (not its branches) applies `table`
pub(crate) fn applies_table(stmt: &Stmt, table: &str) -> bool {
    match stmt {
        Stmt::Apply(t) => t == table,
        Stmt::If { cond, .. } => {
            cond.any(&mut |e| matches!(&e.kind, ExprKind::TableHit { table: t, .. } if t == table))
        }
        _ => false,
    }
}

/// Insert `copies` before every statement that applies `table`
pub(crate) fn insert_before_applies(stmts: Vec<Stmt>, table: &str, copies: &[Stmt]) -> Vec<Stmt> {
    flat_map_stmts(stmts, &mut |stmt| {
        if applies_table(&stmt, table) {
            let mut out = copies.to_vec();
            out.push(stmt);
            out
        } else {
            vec![stmt]
        }
    })
}

/// Replace every reference to variable `name` by `replacement`
pub(crate) fn substitute(expr: &mut Expr, name: &str, replacement: &Expr) {
    expr.rewrite_post(&mut |e| {
        if matches!(&e.kind, ExprKind::Path(p) if p == name) {
            *e = replacement.clone();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Type;

    #[test]
    fn test_lowering_pipeline_order() {
        let order = lowering_pipeline(ArchVariant::Pna).execution_order();
        assert_eq!(order.first(), Some(&"ValidateOperandSize"));
        assert_eq!(order.last(), Some(&"EmitContextArtifact"));
        assert_eq!(
            order.iter().filter(|n| **n == "LowerExpressions").count(),
            LOWER_EXPRESSIONS_REPEAT
        );
        let pos = |name: &str| order.iter().position(|n| *n == name);
        assert!(pos("ConvertToDpdkArch") < pos("CopyMatchKeysToSingleStruct"));
        assert!(pos("CopyMatchKeysToSingleStruct") < pos("CollectLocalVariables"));
    }

    #[test]
    fn test_insert_before_nested_apply() {
        let copy = Stmt::assign(Expr::path("k", Type::bits(8)), Expr::constant(1, 8));
        let body = vec![Stmt::if_else(
            Expr::boolean(true),
            vec![Stmt::Apply("t".into())],
            vec![Stmt::if_else(Expr::table_hit("t", true), vec![], vec![])],
        )];
        let out = insert_before_applies(body, "t", std::slice::from_ref(&copy));
        let mut copies = 0;
        crate::ir::walk_stmts(&out, &mut |s| {
            if *s == copy {
                copies += 1;
            }
        });
        assert_eq!(copies, 2);
    }
}
