//! Instruction-shaped lowering
//!
//! After these passes every assignment has at most one operator, every
//! arithmetic operator has its destination as first operand, and every
//! condition compares simple operands.

use super::{report_homeless, rewrite_bodies, substitute};
use crate::diagnostics::ErrorKind;
use crate::error::Result;
use crate::ir::{
    flat_map_stmts, walk_exprs_mut, walk_stmts, Action, Declaration, Expr, ExprKind, Local,
    Program, Stmt, TempAllocator, Type, UnaryOp,
};
use crate::pass::{Normalizer, PassContext};
use std::collections::{HashSet, VecDeque};

/// Name of the action data struct parameter inside action bodies
pub const ACTION_ARGS_PARAM: &str = "t";

/// Hoists variable declarations out of bodies into block locals
pub struct MoveDeclarations;

impl Normalizer<Program> for MoveDeclarations {
    fn name(&self) -> &'static str {
        "MoveDeclarations"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        for decl in &mut program.declarations {
            match decl {
                Declaration::Control(control) => {
                    let mut taken = taken_names(&control.locals, control.params.iter().map(|p| &p.name));
                    let mut hoisted = Vec::new();
                    for local in &mut control.locals {
                        if let Local::Action(action) = local {
                            let body = std::mem::take(&mut action.body);
                            action.body = hoist(body, &mut taken, &mut hoisted);
                        }
                    }
                    let body = std::mem::take(&mut control.body);
                    control.body = hoist(body, &mut taken, &mut hoisted);
                    control.locals.extend(hoisted);
                }
                Declaration::Parser(parser) => {
                    let mut taken = taken_names(&parser.locals, parser.params.iter().map(|p| &p.name));
                    let mut hoisted = Vec::new();
                    for state in &mut parser.states {
                        let body = std::mem::take(&mut state.body);
                        state.body = hoist(body, &mut taken, &mut hoisted);
                    }
                    parser.locals.extend(hoisted);
                }
                Declaration::Action(action) => {
                    walk_stmts(&action.body, &mut |s| {
                        if let Stmt::VarDecl { name, .. } = s {
                            cx.diagnostics.error(
                                ErrorKind::Unsupported,
                                format!(
                                    "action {} declares variable {}; only actions inside a control may declare variables",
                                    action.name, name
                                ),
                            );
                        }
                    });
                }
                _ => {}
            }
        }
        Ok(program)
    }
}

fn taken_names<'a>(locals: &[Local], params: impl Iterator<Item = &'a String>) -> HashSet<String> {
    let mut taken: HashSet<String> = locals.iter().map(|l| l.name().to_string()).collect();
    taken.extend(params.cloned());
    for local in locals {
        if let Local::Action(a) = local {
            taken.extend(a.params.iter().map(|p| p.name.clone()));
        }
    }
    taken
}

// A declaration shadowing a taken name is renamed `<name>_<k>` in the
// statements that follow it.
fn hoist(stmts: Vec<Stmt>, taken: &mut HashSet<String>, hoisted: &mut Vec<Local>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    let mut pending: VecDeque<Stmt> = stmts.into();
    while let Some(stmt) = pending.pop_front() {
        match stmt {
            Stmt::VarDecl { name, ty, init } => {
                let mut fresh = name.clone();
                let mut k = 0;
                while !taken.insert(fresh.clone()) {
                    k += 1;
                    fresh = format!("{}_{}", name, k);
                }
                let var = Expr::path(fresh.clone(), ty.clone());
                if fresh != name {
                    let (front, back) = pending.as_mut_slices();
                    for rest in [front, back] {
                        walk_exprs_mut(rest, &mut |e| substitute(e, &name, &var));
                    }
                }
                hoisted.push(Local::Var { name: fresh, ty });
                if let Some(init) = init {
                    out.push(Stmt::assign(var, init));
                }
            }
            mut other => {
                for child in other.children_mut() {
                    let taken_child = std::mem::take(child);
                    *child = hoist(taken_child, taken, hoisted);
                }
                out.push(other);
            }
        }
    }
    out
}

/// Whether `e` is evaluated by branching rather than by an ALU instruction
pub(crate) fn is_condition(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::Binary { op, .. } => op.is_comparison() || op.is_logical(),
        ExprKind::Unary {
            op: UnaryOp::Not, ..
        } => true,
        ExprKind::IsValid(_) | ExprKind::TableHit { .. } => true,
        _ => false,
    }
}

fn make_simple(e: &mut Expr, temps: &mut TempAllocator, out: &mut Vec<Stmt>) {
    if e.is_simple() {
        return;
    }
    let tmp = temps.fresh(e.ty.clone());
    let original = std::mem::replace(e, tmp.clone());
    unroll_assign(tmp, original, temps, out);
}

fn simplify_condition(e: &mut Expr, temps: &mut TempAllocator, out: &mut Vec<Stmt>) {
    match &mut e.kind {
        ExprKind::Binary { op, left, right } if op.is_logical() => {
            simplify_condition(left, temps, out);
            simplify_condition(right, temps, out);
        }
        ExprKind::Binary { left, right, .. } => {
            make_simple(left, temps, out);
            make_simple(right, temps, out);
        }
        ExprKind::Unary {
            op: UnaryOp::Not,
            expr,
        } => simplify_condition(expr, temps, out),
        _ => {}
    }
}

fn unroll_assign(lhs: Expr, mut rhs: Expr, temps: &mut TempAllocator, out: &mut Vec<Stmt>) {
    if is_condition(&rhs) {
        simplify_condition(&mut rhs, temps, out);
    } else {
        match &mut rhs.kind {
            ExprKind::Binary { left, right, .. } => {
                make_simple(left, temps, out);
                make_simple(right, temps, out);
            }
            ExprKind::Unary { expr, .. } | ExprKind::Cast(expr) => make_simple(expr, temps, out),
            ExprKind::Call(call) => {
                for arg in &mut call.args {
                    make_simple(arg, temps, out);
                }
            }
            _ => {}
        }
    }
    out.push(Stmt::assign(lhs, rhs));
}

/// Splits assignments into three-address form
pub struct StatementUnroll;

impl Normalizer<Program> for StatementUnroll {
    fn name(&self) -> &'static str {
        "StatementUnroll"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let homeless = rewrite_bodies(&mut program, &mut |_, body, temps| {
            flat_map_stmts(body, &mut |stmt| {
                let mut out = Vec::new();
                match stmt {
                    Stmt::Assign { lhs, rhs } => unroll_assign(lhs, rhs, temps, &mut out),
                    Stmt::Call(mut call) => {
                        for arg in &mut call.args {
                            make_simple(arg, temps, &mut out);
                        }
                        out.push(Stmt::Call(call));
                    }
                    other => out.push(other),
                }
                out
            })
        });
        report_homeless(homeless, cx.diagnostics);
        Ok(program)
    }
}

/// Gives every comparison inside an `if` condition simple operands
pub struct IfStatementUnroll;

impl Normalizer<Program> for IfStatementUnroll {
    fn name(&self) -> &'static str {
        "IfStatementUnroll"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let homeless = rewrite_bodies(&mut program, &mut |_, body, temps| {
            flat_map_stmts(body, &mut |stmt| match stmt {
                Stmt::If {
                    mut cond,
                    then_branch,
                    else_branch,
                } => {
                    let mut out = Vec::new();
                    simplify_condition(&mut cond, temps, &mut out);
                    out.push(Stmt::if_else(cond, then_branch, else_branch));
                    out
                }
                other => vec![other],
            })
        });
        report_homeless(homeless, cx.diagnostics);
        Ok(program)
    }
}

/// Rewrites `d = a op b` into `d = a; d = d op b`, the two-operand form of
/// the target's ALU instructions
pub struct ConvertBinaryOperationTo2Params;

impl Normalizer<Program> for ConvertBinaryOperationTo2Params {
    fn name(&self) -> &'static str {
        "ConvertBinaryOperationTo2Params"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let homeless = rewrite_bodies(&mut program, &mut |_, body, temps| {
            flat_map_stmts(body, &mut |stmt| two_operand(stmt, temps))
        });
        report_homeless(homeless, cx.diagnostics);
        Ok(program)
    }
}

fn two_operand(stmt: Stmt, temps: &mut TempAllocator) -> Vec<Stmt> {
    let (lhs, op, left, right, ty) = match stmt {
        Stmt::Assign {
            lhs,
            rhs:
                Expr {
                    kind: ExprKind::Binary { op, left, right },
                    ty,
                },
        } => (lhs, op, left, right, ty),
        other => return vec![other],
    };
    if !op.is_arithmetic() || left.kind == lhs.kind {
        let rhs = Expr::new(ExprKind::Binary { op, left, right }, ty);
        return vec![Stmt::assign(lhs, rhs)];
    }
    if right.kind == lhs.kind {
        if op.is_commutative() {
            return vec![Stmt::assign(lhs.clone(), Expr::binary(op, lhs, *left))];
        }
        let tmp = temps.fresh(lhs.ty.clone());
        return vec![
            Stmt::assign(tmp.clone(), *left),
            Stmt::assign(tmp.clone(), Expr::binary(op, tmp.clone(), *right)),
            Stmt::assign(lhs, tmp),
        ];
    }
    vec![
        Stmt::assign(lhs.clone(), *left),
        Stmt::assign(lhs.clone(), Expr::binary(op, lhs, *right)),
    ]
}

/// Rewrites action data parameter `p` to `t.p`, a field of the action's
/// argument struct
pub struct PrependPDotToActionArgs;

impl Normalizer<Program> for PrependPDotToActionArgs {
    fn name(&self) -> &'static str {
        "PrependPDotToActionArgs"
    }

    fn normalize(&mut self, mut program: Program, _cx: &mut PassContext<'_>) -> Result<Program> {
        for decl in &mut program.declarations {
            match decl {
                Declaration::Action(action) => prefix_action_args(action),
                Declaration::Control(control) => {
                    for local in &mut control.locals {
                        if let Local::Action(action) = local {
                            prefix_action_args(action);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(program)
    }
}

fn prefix_action_args(action: &mut Action) {
    let args = Expr::path(
        ACTION_ARGS_PARAM,
        Type::Struct(format!("{}_arg_t", action.name)),
    );
    let params: Vec<(String, Type)> = action
        .data_params()
        .map(|p| (p.name.clone(), p.ty.clone()))
        .collect();
    for (name, ty) in params {
        let field = Expr::member(args.clone(), name.clone(), ty);
        walk_exprs_mut(&mut action.body, &mut |e| substitute(e, &name, &field));
    }
}

/// Assignments of a condition become `if (c) { d = true } else { d = false }`
pub struct ConvertLogicalExpression;

impl Normalizer<Program> for ConvertLogicalExpression {
    fn name(&self) -> &'static str {
        "ConvertLogicalExpression"
    }

    fn normalize(&mut self, mut program: Program, _cx: &mut PassContext<'_>) -> Result<Program> {
        program.bodies_mut(&mut |_, body| {
            let stmts = std::mem::take(body);
            *body = flat_map_stmts(stmts, &mut |stmt| match stmt {
                Stmt::Assign { lhs, rhs } if is_condition(&rhs) => vec![Stmt::if_else(
                    rhs,
                    vec![Stmt::assign(lhs.clone(), Expr::constant_of(1, lhs.ty.clone()))],
                    vec![Stmt::assign(lhs.clone(), Expr::constant_of(0, lhs.ty))],
                )],
                other => vec![other],
            });
        });
        Ok(program)
    }
}
