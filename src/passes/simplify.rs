//! Early normalizers: loops, keys, expression shapes, folding and copies

use super::{insert_before_applies, report_homeless, rewrite_bodies, substitute};
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::error::Result;
use crate::ir::{
    flat_map_stmts, walk_exprs, walk_rvalues_mut, walk_stmts, BinOp, Declaration, Expr, ExprKind,
    HeaderType, Local, MethodCall, Program, Stmt, StructType, TempAllocator, Transition, Type,
    UnaryOp,
};
use crate::pass::{Normalizer, PassContext};
use std::collections::{HashMap, HashSet};

/// Largest trip count a loop may be unrolled to
pub const MAX_UNROLL_TRIPS: u64 = 1024;

/// Replaces loops with constant bounds by copies of their body
pub struct LoopUnroll;

impl Normalizer<Program> for LoopUnroll {
    fn name(&self) -> &'static str {
        "LoopUnroll"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let diagnostics = &mut *cx.diagnostics;
        program.bodies_mut(&mut |_, body| {
            let stmts = std::mem::take(body);
            *body = unroll_stmts(stmts, diagnostics);
        });
        Ok(program)
    }
}

// Outer loops first, so inner bounds that depend on an outer induction
// variable are constant by the time they are visited.
fn unroll_stmts(stmts: Vec<Stmt>, diagnostics: &mut Diagnostics) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::For {
                var,
                ty,
                start,
                end,
                body,
            } => match (start.as_const(), end.as_const()) {
                (Some(first), Some(last)) if last.saturating_sub(first) <= MAX_UNROLL_TRIPS => {
                    let mut copies = Vec::new();
                    for i in first..last {
                        let value = Expr::constant_of(i, ty.clone());
                        let mut copy = body.clone();
                        crate::ir::walk_exprs_mut(&mut copy, &mut |e| substitute(e, &var, &value));
                        copies.extend(copy);
                    }
                    out.extend(unroll_stmts(copies, diagnostics));
                }
                (Some(first), Some(last)) => {
                    diagnostics.error(
                        ErrorKind::Overlimit,
                        format!(
                            "loop over {} runs {} times; at most {} iterations can be unrolled",
                            var,
                            last - first,
                            MAX_UNROLL_TRIPS
                        ),
                    );
                    out.push(Stmt::For {
                        var,
                        ty,
                        start,
                        end,
                        body,
                    });
                }
                _ => {
                    diagnostics.error(
                        ErrorKind::Unsupported,
                        format!(
                            "loop over {} has bounds {} .. {} that are not compile-time constants",
                            var, start, end
                        ),
                    );
                    out.push(Stmt::For {
                        var,
                        ty,
                        start,
                        end,
                        body,
                    });
                }
            },
            mut other => {
                for child in other.children_mut() {
                    let taken = std::mem::take(child);
                    *child = unroll_stmts(taken, diagnostics);
                }
                out.push(other);
            }
        }
    }
    out
}

/// Table keys that are neither lvalues nor validity tests are computed into
/// temporaries before each application of the table
pub struct SimplifyKey;

impl Normalizer<Program> for SimplifyKey {
    fn name(&self) -> &'static str {
        "SimplifyKey"
    }

    fn normalize(&mut self, mut program: Program, _cx: &mut PassContext<'_>) -> Result<Program> {
        for decl in &mut program.declarations {
            let Declaration::Control(control) = decl else {
                continue;
            };
            let mut temps = TempAllocator::for_block(&control.locals, &control.params);
            let mut copies: Vec<(String, Vec<Stmt>)> = Vec::new();
            for local in &mut control.locals {
                let Local::Table(table) = local else { continue };
                let mut table_copies = Vec::new();
                for key in &mut table.keys {
                    if is_simple_key(&key.expr) {
                        continue;
                    }
                    let tmp = temps.fresh(key.expr.ty.clone());
                    let original = std::mem::replace(&mut key.expr, tmp.clone());
                    table_copies.push(Stmt::assign(tmp, original));
                }
                if !table_copies.is_empty() {
                    copies.push((table.name.clone(), table_copies));
                }
            }
            for (table, stmts) in copies {
                let body = std::mem::take(&mut control.body);
                control.body = insert_before_applies(body, &table, &stmts);
            }
            control.locals.extend(temps.into_locals());
        }
        Ok(program)
    }
}

fn is_simple_key(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::IsValid(header) => header.is_lvalue(),
        _ => expr.is_lvalue(),
    }
}

/// Rewrites operators the target has no instruction for
pub struct LowerExpressions;

impl Normalizer<Program> for LowerExpressions {
    fn name(&self) -> &'static str {
        "LowerExpressions"
    }

    fn normalize(&mut self, mut program: Program, _cx: &mut PassContext<'_>) -> Result<Program> {
        program.bodies_mut(&mut |_, body| {
            walk_rvalues_mut(body, &mut |e| e.rewrite_post(&mut lower_expr));
        });
        program.side_exprs_mut(&mut |e| e.rewrite_post(&mut lower_expr));
        Ok(program)
    }
}

fn lower_expr(e: &mut Expr) {
    let ty = e.ty.clone();
    let replacement = match &e.kind {
        ExprKind::Unary {
            op: UnaryOp::Neg,
            expr,
        } => Some(Expr::binary(
            BinOp::Sub,
            Expr::constant_of(0, expr.ty.clone()),
            (**expr).clone(),
        )),
        ExprKind::Unary {
            op: UnaryOp::Complement,
            expr,
        } => Some(Expr::binary(
            BinOp::BitXor,
            (**expr).clone(),
            Expr::constant_of(u64::MAX, expr.ty.clone()),
        )),
        ExprKind::Slice { expr, hi, lo } => {
            let width = *hi - *lo + 1;
            let shifted = if *lo == 0 {
                (**expr).clone()
            } else {
                Expr::binary(BinOp::Shr, (**expr).clone(), Expr::constant(*lo as u64, 8))
            };
            Some(Expr::cast(shifted, Type::bits(width)))
        }
        ExprKind::Binary {
            op: BinOp::Concat,
            left,
            right,
        } => {
            let right_width = right.ty.width().unwrap_or(0);
            let widened = Expr::binary(
                BinOp::Shl,
                Expr::cast((**left).clone(), ty.clone()),
                Expr::constant(right_width as u64, 8),
            );
            Some(Expr::binary(
                BinOp::BitOr,
                widened,
                Expr::cast((**right).clone(), ty.clone()),
            ))
        }
        ExprKind::Binary {
            op: BinOp::Mul,
            left,
            right,
        } => {
            let by_power = |c: &Expr| c.as_const().filter(|v| v.is_power_of_two());
            if let Some(c) = by_power(&**right) {
                Some(Expr::binary(
                    BinOp::Shl,
                    (**left).clone(),
                    Expr::constant(c.trailing_zeros() as u64, 8),
                ))
            } else {
                by_power(&**left).map(|c| {
                    Expr::binary(
                        BinOp::Shl,
                        (**right).clone(),
                        Expr::constant(c.trailing_zeros() as u64, 8),
                    )
                })
            }
        }
        ExprKind::Binary {
            op: BinOp::Shl | BinOp::Shr,
            right,
            ..
        } => match (right.as_const(), ty.width()) {
            (Some(amount), Some(width)) if amount >= width as u64 => Some(Expr::constant_of(0, ty.clone())),
            _ => None,
        },
        ExprKind::Cast(inner) => {
            if inner.ty == ty {
                Some((**inner).clone())
            } else if let ExprKind::Cast(innermost) = &inner.kind {
                let widening = match (inner.ty.width(), innermost.ty.width()) {
                    (Some(mid), Some(src)) => mid >= src,
                    _ => false,
                };
                widening.then(|| Expr::cast((**innermost).clone(), ty.clone()))
            } else {
                None
            }
        }
        _ => None,
    };
    if let Some(replacement) = replacement {
        *e = replacement;
    }
}

/// Extern arguments and select expressions in pipeline blocks become simple
/// operands computed into temporaries
pub struct RemoveComplexExpressions;

impl Normalizer<Program> for RemoveComplexExpressions {
    fn name(&self) -> &'static str {
        "RemoveComplexExpressions"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let structure = &*cx.structure;
        for decl in &mut program.declarations {
            match decl {
                Declaration::Control(control) if structure.is_pipeline_control(&control.name) => {
                    let mut temps = TempAllocator::for_block(&control.locals, &control.params);
                    for local in &mut control.locals {
                        if let Local::Action(action) = local {
                            let body = std::mem::take(&mut action.body);
                            action.body = simplify_call_args(body, &mut temps);
                        }
                    }
                    let body = std::mem::take(&mut control.body);
                    control.body = simplify_call_args(body, &mut temps);
                    control.locals.extend(temps.into_locals());
                }
                Declaration::Parser(parser) => {
                    let mut temps = TempAllocator::for_block(&parser.locals, &parser.params);
                    for state in &mut parser.states {
                        if let Transition::Select { expr, .. } = &mut state.transition {
                            if !expr.is_simple() {
                                let tmp = temps.fresh(expr.ty.clone());
                                let original = std::mem::replace(expr, tmp.clone());
                                state.body.push(Stmt::assign(tmp, original));
                            }
                        }
                    }
                    parser.locals.extend(temps.into_locals());
                }
                _ => {}
            }
        }
        Ok(program)
    }
}

fn simplify_call_args(stmts: Vec<Stmt>, temps: &mut TempAllocator) -> Vec<Stmt> {
    flat_map_stmts(stmts, &mut |mut stmt| {
        let mut pre = Vec::new();
        let call: Option<&mut MethodCall> = match &mut stmt {
            Stmt::Call(call) => Some(call),
            Stmt::Assign { rhs, .. } => match &mut rhs.kind {
                ExprKind::Call(call) => Some(call.as_mut()),
                _ => None,
            },
            _ => None,
        };
        if let Some(call) = call {
            for arg in &mut call.args {
                if !arg.is_simple() {
                    let tmp = temps.fresh(arg.ty.clone());
                    let original = std::mem::replace(arg, tmp.clone());
                    pre.push(Stmt::assign(tmp, original));
                }
            }
        }
        pre.push(stmt);
        pre
    })
}

/// Conditional expressions become if/else statements
pub struct DismantleMuxExpressions;

impl Normalizer<Program> for DismantleMuxExpressions {
    fn name(&self) -> &'static str {
        "DismantleMuxExpressions"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let homeless = rewrite_bodies(&mut program, &mut |_, body, temps| {
            dismantle_stmts(body, temps)
        });
        report_homeless(homeless, cx.diagnostics);
        Ok(program)
    }
}

fn dismantle_stmts(stmts: Vec<Stmt>, temps: &mut TempAllocator) -> Vec<Stmt> {
    flat_map_stmts(stmts, &mut |stmt| dismantle_stmt(stmt, temps))
}

fn dismantle_stmt(stmt: Stmt, temps: &mut TempAllocator) -> Vec<Stmt> {
    let mut pre = Vec::new();
    let mut stmt = match stmt {
        Stmt::Assign {
            lhs,
            rhs:
                Expr {
                    kind:
                        ExprKind::Mux {
                            mut cond,
                            then_expr,
                            else_expr,
                        },
                    ..
                },
        } => {
            extract_muxes(&mut cond, temps, &mut pre);
            let then_branch = dismantle_stmt(Stmt::assign(lhs.clone(), *then_expr), temps);
            let else_branch = dismantle_stmt(Stmt::assign(lhs, *else_expr), temps);
            pre.push(Stmt::if_else(*cond, then_branch, else_branch));
            return pre;
        }
        other => other,
    };
    match &mut stmt {
        Stmt::Assign { rhs, .. } => extract_muxes(rhs, temps, &mut pre),
        Stmt::Call(call) => {
            for arg in &mut call.args {
                extract_muxes(arg, temps, &mut pre);
            }
        }
        other => {
            for e in other.exprs_mut() {
                extract_muxes(e, temps, &mut pre);
            }
        }
    }
    pre.push(stmt);
    pre
}

fn extract_muxes(expr: &mut Expr, temps: &mut TempAllocator, pre: &mut Vec<Stmt>) {
    expr.rewrite_post(&mut |e| {
        if let ExprKind::Mux { .. } = e.kind {
            let tmp = temps.fresh(e.ty.clone());
            let mux = std::mem::replace(e, tmp.clone());
            if let ExprKind::Mux {
                cond,
                then_expr,
                else_expr,
            } = mux.kind
            {
                pre.push(Stmt::if_else(
                    *cond,
                    vec![Stmt::assign(tmp.clone(), *then_expr)],
                    vec![Stmt::assign(tmp, *else_expr)],
                ));
            }
        }
    });
}

/// Evaluates constant sub-expressions and drops statically dead branches
pub struct ConstantFolding;

impl Normalizer<Program> for ConstantFolding {
    fn name(&self) -> &'static str {
        "ConstantFolding"
    }

    fn normalize(&mut self, mut program: Program, _cx: &mut PassContext<'_>) -> Result<Program> {
        program.exprs_mut(&mut |e| e.rewrite_post(&mut fold_expr));
        program.bodies_mut(&mut |_, body| {
            let stmts = std::mem::take(body);
            *body = flat_map_stmts(stmts, &mut |stmt| match stmt {
                Stmt::If {
                    cond:
                        Expr {
                            kind: ExprKind::Bool(value),
                            ..
                        },
                    then_branch,
                    else_branch,
                } => {
                    if value {
                        then_branch
                    } else {
                        else_branch
                    }
                }
                other => vec![other],
            });
        });
        for decl in &mut program.declarations {
            let Declaration::Parser(parser) = decl else { continue };
            for state in &mut parser.states {
                if let Transition::Select {
                    expr,
                    cases,
                    default,
                } = &state.transition
                {
                    if let Some(value) = expr.as_const() {
                        let next = cases
                            .iter()
                            .find(|c| c.value == value)
                            .map(|c| c.next.clone())
                            .unwrap_or_else(|| default.clone());
                        state.transition = Transition::Goto(next);
                    }
                }
            }
        }
        Ok(program)
    }
}

/// Fold one node whose children are already folded
pub(crate) fn fold_expr(e: &mut Expr) {
    let ty = e.ty.clone();
    let mask = ty.mask();
    let folded = match &e.kind {
        ExprKind::Binary { op, left, right } => match (left.as_const(), right.as_const()) {
            (Some(a), Some(b)) => fold_binary(*op, a, b, &ty, left.ty.mask()),
            (_, Some(b)) => match op {
                BinOp::LAnd if b == 1 => Some((**left).clone()),
                BinOp::LAnd => Some(Expr::boolean(false)),
                BinOp::LOr if b == 1 => Some(Expr::boolean(true)),
                BinOp::LOr => Some((**left).clone()),
                BinOp::Add | BinOp::Sub | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr
                    if b == 0 =>
                {
                    Some((**left).clone())
                }
                _ => None,
            },
            (Some(a), _) => match op {
                BinOp::LAnd if a == 1 => Some((**right).clone()),
                BinOp::LAnd => Some(Expr::boolean(false)),
                BinOp::LOr if a == 1 => Some(Expr::boolean(true)),
                BinOp::LOr => Some((**right).clone()),
                _ => None,
            },
            _ => None,
        },
        ExprKind::Unary { op, expr } => match (op, expr.as_const(), &expr.kind) {
            (UnaryOp::Not, Some(v), _) => Some(Expr::boolean(v == 0)),
            (UnaryOp::Not, None, ExprKind::Unary { op: UnaryOp::Not, expr: inner }) => {
                Some((**inner).clone())
            }
            (UnaryOp::Complement, Some(v), _) => Some(Expr::constant_of(!v & mask, ty.clone())),
            (UnaryOp::Neg, Some(v), _) => Some(Expr::constant_of(v.wrapping_neg() & mask, ty.clone())),
            _ => None,
        },
        ExprKind::Cast(inner) => inner.as_const().map(|v| Expr::constant_of(v, ty.clone())),
        ExprKind::Slice { expr, lo, .. } => expr
            .as_const()
            .map(|v| Expr::constant_of(v.checked_shr(*lo).unwrap_or(0), ty.clone())),
        ExprKind::Mux {
            cond,
            then_expr,
            else_expr,
        } => cond.as_const().map(|c| {
            if c != 0 {
                (**then_expr).clone()
            } else {
                (**else_expr).clone()
            }
        }),
        _ => None,
    };
    if let Some(folded) = folded {
        *e = folded;
    }
}

fn fold_binary(op: BinOp, a: u64, b: u64, ty: &Type, operand_mask: u64) -> Option<Expr> {
    let value = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => u32::try_from(b).ok().and_then(|n| a.checked_shl(n)).unwrap_or(0),
        BinOp::Shr => u32::try_from(b).ok().and_then(|n| a.checked_shr(n)).unwrap_or(0),
        BinOp::Eq => return Some(Expr::boolean(a & operand_mask == b & operand_mask)),
        BinOp::Ne => return Some(Expr::boolean(a & operand_mask != b & operand_mask)),
        BinOp::Lt => return Some(Expr::boolean(a < b)),
        BinOp::Le => return Some(Expr::boolean(a <= b)),
        BinOp::Gt => return Some(Expr::boolean(a > b)),
        BinOp::Ge => return Some(Expr::boolean(a >= b)),
        BinOp::LAnd => return Some(Expr::boolean(a != 0 && b != 0)),
        BinOp::LOr => return Some(Expr::boolean(a != 0 || b != 0)),
        BinOp::Concat => return None,
    };
    Some(Expr::constant_of(value, ty.clone()))
}

/// Header and struct assignments become field-wise copies; header copies
/// carry the validity bit
pub struct EliminateHeaderCopy;

impl Normalizer<Program> for EliminateHeaderCopy {
    fn name(&self) -> &'static str {
        "EliminateHeaderCopy"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let mut headers = HashMap::new();
        let mut structs = HashMap::new();
        for decl in &program.declarations {
            match decl {
                Declaration::Header(h) => {
                    headers.insert(h.name.clone(), h.clone());
                }
                Declaration::Struct(s) => {
                    structs.insert(s.name.clone(), s.clone());
                }
                _ => {}
            }
        }
        let types = Layouts { headers, structs };
        let diagnostics = &mut *cx.diagnostics;
        program.bodies_mut(&mut |_, body| {
            let stmts = std::mem::take(body);
            *body = flat_map_stmts(stmts, &mut |stmt| match stmt {
                Stmt::Assign { lhs, rhs } if !lhs.ty.is_scalar() => {
                    types.expand_copy(lhs, rhs, diagnostics)
                }
                other => vec![other],
            });
        });
        Ok(program)
    }
}

struct Layouts {
    headers: HashMap<String, HeaderType>,
    structs: HashMap<String, StructType>,
}

impl Layouts {
    fn expand_copy(&self, lhs: Expr, rhs: Expr, diagnostics: &mut Diagnostics) -> Vec<Stmt> {
        let fields = match &lhs.ty {
            Type::Header(name) => self.headers.get(name).map(|h| &h.fields),
            Type::Struct(name) => self.structs.get(name).map(|s| &s.fields),
            _ => None,
        };
        let Some(fields) = fields else {
            return vec![Stmt::assign(lhs, rhs)];
        };
        if !rhs.is_lvalue() {
            diagnostics.error(
                ErrorKind::Unsupported,
                format!("cannot copy {} into {} field by field", rhs, lhs),
            );
            return vec![Stmt::assign(lhs, rhs)];
        }
        let mut copies = Vec::new();
        for field in fields {
            let dst = Expr::member(lhs.clone(), field.name.clone(), field.ty.clone());
            let src = Expr::member(rhs.clone(), field.name.clone(), field.ty.clone());
            if field.ty.is_scalar() {
                copies.push(Stmt::assign(dst, src));
            } else {
                copies.extend(self.expand_copy(dst, src, diagnostics));
            }
        }
        if let Type::Header(_) = lhs.ty {
            let mut valid = vec![Stmt::Call(MethodCall::new(lhs.clone(), "setValid", Vec::new()))];
            valid.extend(copies);
            let invalid = vec![Stmt::Call(MethodCall::new(lhs, "setInvalid", Vec::new()))];
            return vec![Stmt::if_else(Expr::is_valid(rhs), valid, invalid)];
        }
        copies
    }
}

/// Drops variables, tables, actions and extern instances nothing refers to.
/// Removing one declaration can orphan another, so this runs to a fixpoint.
pub struct RemoveAllUnusedDeclarations;

impl Normalizer<Program> for RemoveAllUnusedDeclarations {
    fn name(&self) -> &'static str {
        "RemoveAllUnusedDeclarations"
    }

    fn normalize(&mut self, mut program: Program, _cx: &mut PassContext<'_>) -> Result<Program> {
        loop {
            let used = used_names(&program);
            let mut removed = 0;
            for decl in &mut program.declarations {
                let locals = match decl {
                    Declaration::Control(c) => &mut c.locals,
                    Declaration::Parser(p) => &mut p.locals,
                    _ => continue,
                };
                let before = locals.len();
                locals.retain(|l| used.contains(l.name()));
                removed += before - locals.len();
            }
            let before = program.declarations.len();
            program
                .declarations
                .retain(|d| !matches!(d, Declaration::Action(a) if !used.contains(&a.name)));
            removed += before - program.declarations.len();
            if removed == 0 {
                break;
            }
            tracing::debug!(removed, "unused declarations removed");
        }
        Ok(program)
    }
}

// Names are compared without scoping; a local that shares its name with a
// used declaration elsewhere is kept.
fn note_expr(e: &Expr, used: &mut HashSet<String>) {
    e.walk(&mut |n| match &n.kind {
        ExprKind::Path(p) => {
            used.insert(p.clone());
        }
        ExprKind::TableHit { table, .. } => {
            used.insert(table.clone());
        }
        ExprKind::Call(call) if call.method == "add_entry" => {
            if let Some(ExprKind::Str(action)) = call.args.first().map(|a| &a.kind) {
                used.insert(action.clone());
            }
        }
        _ => {}
    });
}

fn used_names(program: &Program) -> HashSet<String> {
    let mut used = HashSet::new();
    program.bodies(&mut |_, body| {
        walk_exprs(body, &mut |e| note_expr(e, &mut used));
        walk_stmts(body, &mut |s| match s {
            Stmt::Apply(table) => {
                used.insert(table.clone());
            }
            Stmt::Call(call) if call.method == "add_entry" => {
                if let Some(ExprKind::Str(action)) = call.args.first().map(|a| &a.kind) {
                    used.insert(action.clone());
                }
            }
            _ => {}
        });
    });
    for decl in &program.declarations {
        match decl {
            Declaration::Control(control) => {
                let applied: HashSet<&str> = control
                    .tables()
                    .map(|t| t.name.as_str())
                    .filter(|t| used.contains(*t))
                    .collect();
                let mut extra = Vec::new();
                for table in control.tables().filter(|t| applied.contains(t.name.as_str())) {
                    for key in &table.keys {
                        note_expr(&key.expr, &mut used);
                    }
                    extra.extend(table.actions.iter().map(|a| a.name.clone()));
                    extra.extend(table.default_action.iter().map(|a| a.name.clone()));
                    extra.extend(table.entries.iter().map(|e| e.action.name.clone()));
                    extra.extend(table.direct_counter.iter().cloned());
                }
                used.extend(extra);
            }
            Declaration::Parser(parser) => {
                for state in &parser.states {
                    if let Transition::Select { expr, .. } = &state.transition {
                        note_expr(expr, &mut used);
                    }
                }
            }
            _ => {}
        }
    }
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::testing::Harness;

    fn var(name: &str, width: u32) -> Expr {
        Expr::path(name, Type::bits(width))
    }

    fn lowered(mut e: Expr) -> Expr {
        for _ in 0..2 {
            e.rewrite_post(&mut lower_expr);
        }
        e
    }

    #[test]
    fn test_unroll_constant_loop() {
        let body = vec![Stmt::assign(var("a", 8), var("i", 8))];
        let stmts = vec![Stmt::For {
            var: "i".into(),
            ty: Type::bits(8),
            start: Expr::constant(0, 8),
            end: Expr::constant(3, 8),
            body,
        }];
        let mut diags = Diagnostics::new();
        let out = unroll_stmts(stmts, &mut diags);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2], Stmt::assign(var("a", 8), Expr::constant(2, 8)));
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_unroll_runtime_bound_is_reported() {
        let stmts = vec![Stmt::For {
            var: "i".into(),
            ty: Type::bits(8),
            start: Expr::constant(0, 8),
            end: var("n", 8),
            body: Vec::new(),
        }];
        let mut diags = Diagnostics::new();
        let out = unroll_stmts(stmts, &mut diags);
        assert_eq!(out.len(), 1);
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_unroll_over_limit() {
        let stmts = vec![Stmt::For {
            var: "i".into(),
            ty: Type::bits(16),
            start: Expr::constant(0, 16),
            end: Expr::constant(2000, 16),
            body: Vec::new(),
        }];
        let mut diags = Diagnostics::new();
        unroll_stmts(stmts, &mut diags);
        assert_eq!(diags.errors().next().map(|d| d.kind), Some(ErrorKind::Overlimit));
    }

    #[test]
    fn test_lower_slice_and_mul() {
        let slice = lowered(Expr::slice(var("a", 16), 11, 4));
        assert_eq!(slice.to_string(), "(bit<8>)(a >> 4)");
        let mul = lowered(Expr::binary(BinOp::Mul, var("a", 16), Expr::constant(8, 16)));
        assert_eq!(mul.to_string(), "(a << 3)");
    }

    #[test]
    fn test_lower_concat() {
        let e = lowered(Expr::binary(BinOp::Concat, var("a", 8), var("b", 8)));
        assert_eq!(e.ty, Type::bits(16));
        assert_eq!(e.to_string(), "(((bit<16>)a << 8) | (bit<16>)b)");
    }

    #[test]
    fn test_fold_arith_and_logic() {
        let mut e = Expr::binary(BinOp::Add, Expr::constant(250, 8), Expr::constant(10, 8));
        e.rewrite_post(&mut fold_expr);
        assert_eq!(e.as_const(), Some(4));

        let mut e = Expr::binary(BinOp::LAnd, Expr::boolean(true), var("f", 1));
        e.ty = Type::Bool;
        e.rewrite_post(&mut fold_expr);
        assert_eq!(e, var("f", 1));
    }

    #[test]
    fn test_fold_wide_shift_amount() {
        let ty = Type::bits(64);
        let fold = |op: BinOp, a: u64, b: u64| fold_binary(op, a, b, &ty, ty.mask()).and_then(|e| e.as_const());
        assert_eq!(fold(BinOp::Shl, 1, 4), Some(16));
        assert_eq!(fold(BinOp::Shl, 1, 0x1_0000_0001), Some(0));
        assert_eq!(fold(BinOp::Shr, u64::MAX, 0x1_0000_0001), Some(0));
        assert_eq!(fold(BinOp::Shl, 1, 64), Some(0));
    }

    #[test]
    fn test_dismantle_nested_mux() {
        let mut temps = TempAllocator::default();
        let mux = Expr::mux(
            Expr::boolean(true),
            Expr::mux(Expr::boolean(false), var("a", 8), var("b", 8)),
            var("c", 8),
        );
        let out = dismantle_stmt(Stmt::assign(var("x", 8), mux), &mut temps);
        assert_eq!(out.len(), 1);
        let mut muxes = 0;
        crate::ir::walk_exprs(&out, &mut |e| {
            if matches!(e.kind, ExprKind::Mux { .. }) {
                muxes += 1;
            }
        });
        assert_eq!(muxes, 0);
    }

    #[test]
    fn test_remove_unused_is_fixpoint() {
        use crate::ir::{Control, Table, TableAction, ActionScope, Action};
        let mut table = Table::new("unused_t");
        table.actions.push(TableAction {
            name: "only_here".into(),
            scope: ActionScope::TableAndDefault,
        });
        let program = Program {
            declarations: vec![Declaration::Control(Control {
                name: "c".into(),
                params: Vec::new(),
                locals: vec![
                    Local::Action(Action {
                        name: "only_here".into(),
                        params: Vec::new(),
                        body: Vec::new(),
                    }),
                    Local::Table(table),
                ],
                body: Vec::new(),
            })],
            main: None,
        };
        let mut harness = Harness::default();
        let out = RemoveAllUnusedDeclarations.normalize(program, &mut harness.cx());
        let locals = out.map(|p| p.controls().map(|c| c.locals.len()).sum::<usize>());
        assert_eq!(locals, Ok(0));
    }
}
