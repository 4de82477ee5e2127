//! Statements

use super::expr::{Expr, MethodCall};
use super::types::Type;
use std::fmt;

/// Statement node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stmt {
    /// `lhs = rhs;`
    Assign {
        /// Destination (an lvalue)
        lhs: Expr,
        /// Source
        rhs: Expr,
    },
    /// `if (cond) { .. } else { .. }`
    If {
        /// Boolean condition
        cond: Expr,
        /// Taken when `cond` is true
        then_branch: Vec<Stmt>,
        /// Taken otherwise
        else_branch: Vec<Stmt>,
    },
    /// `table.apply();`
    Apply(String),
    /// Extern or packet method call used as a statement
    Call(MethodCall),
    /// Local variable declaration inside a body
    VarDecl {
        /// Variable name
        name: String,
        /// Variable type
        ty: Type,
        /// Optional initializer
        init: Option<Expr>,
    },
    /// `for (var = start; var < end; var++) { .. }`
    For {
        /// Induction variable
        var: String,
        /// Induction variable type
        ty: Type,
        /// First value
        start: Expr,
        /// Exclusive upper bound
        end: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// Nested block
    Block(Vec<Stmt>),
    /// `exit;`
    Exit,
    /// `return;`
    Return,
}

impl Stmt {
    /// `lhs = rhs;`
    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Stmt::Assign { lhs, rhs }
    }

    /// `if (cond) { then } else { otherwise }`
    pub fn if_else(cond: Expr, then_branch: Vec<Stmt>, else_branch: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        }
    }

    /// Expressions held directly by this statement (not by nested statements)
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Assign { lhs, rhs } => vec![lhs, rhs],
            Stmt::If { cond, .. } => vec![cond],
            Stmt::Call(call) => call.target.iter().chain(call.args.iter()).collect(),
            Stmt::VarDecl { init, .. } => init.iter().collect(),
            Stmt::For { start, end, .. } => vec![start, end],
            _ => Vec::new(),
        }
    }

    /// Expressions held directly by this statement, mutably
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Stmt::Assign { lhs, rhs } => vec![lhs, rhs],
            Stmt::If { cond, .. } => vec![cond],
            Stmt::Call(call) => call
                .target
                .iter_mut()
                .chain(call.args.iter_mut())
                .collect(),
            Stmt::VarDecl { init, .. } => init.iter_mut().collect(),
            Stmt::For { start, end, .. } => vec![start, end],
            _ => Vec::new(),
        }
    }

    /// Nested statement lists
    pub fn children(&self) -> Vec<&Vec<Stmt>> {
        match self {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => vec![then_branch, else_branch],
            Stmt::For { body, .. } | Stmt::Block(body) => vec![body],
            _ => Vec::new(),
        }
    }

    /// Nested statement lists, mutably
    pub fn children_mut(&mut self) -> Vec<&mut Vec<Stmt>> {
        match self {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => vec![then_branch, else_branch],
            Stmt::For { body, .. } | Stmt::Block(body) => vec![body],
            _ => Vec::new(),
        }
    }
}

/// Visit every statement, outermost first
pub fn walk_stmts(stmts: &[Stmt], f: &mut dyn FnMut(&Stmt)) {
    for stmt in stmts {
        f(stmt);
        for child in stmt.children() {
            walk_stmts(child, f);
        }
    }
}

/// Visit every expression root held by any statement
pub fn walk_exprs(stmts: &[Stmt], f: &mut dyn FnMut(&Expr)) {
    walk_stmts(stmts, &mut |stmt| {
        for e in stmt.exprs() {
            f(e);
        }
    });
}

/// Visit every expression root held by any statement, mutably
pub fn walk_exprs_mut(stmts: &mut [Stmt], f: &mut dyn FnMut(&mut Expr)) {
    for stmt in stmts.iter_mut() {
        for e in stmt.exprs_mut() {
            f(e);
        }
        for child in stmt.children_mut() {
            walk_exprs_mut(child, f);
        }
    }
}

/// Visit every expression root read by the statements, mutably.
///
/// Assignment destinations and call receivers are skipped.
pub fn walk_rvalues_mut(stmts: &mut [Stmt], f: &mut dyn FnMut(&mut Expr)) {
    for stmt in stmts.iter_mut() {
        match &mut *stmt {
            Stmt::Assign { rhs, .. } => f(rhs),
            Stmt::Call(call) => call.args.iter_mut().for_each(&mut *f),
            other => {
                for e in other.exprs_mut() {
                    f(e);
                }
            }
        }
        for child in stmt.children_mut() {
            walk_rvalues_mut(child, f);
        }
    }
}

/// Rewrite each statement into zero or more statements.
///
/// Nested lists are rewritten before their enclosing statement is handed to `f`.
pub fn flat_map_stmts(stmts: Vec<Stmt>, f: &mut dyn FnMut(Stmt) -> Vec<Stmt>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for mut stmt in stmts {
        for child in stmt.children_mut() {
            let taken = std::mem::take(child);
            *child = flat_map_stmts(taken, f);
        }
        out.extend(f(stmt));
    }
    out
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { lhs, rhs } => write!(f, "{} = {};", lhs, rhs),
            Stmt::If { cond, .. } => write!(f, "if ({}) {{ .. }}", cond),
            Stmt::Apply(table) => write!(f, "{}.apply();", table),
            Stmt::Call(call) => write!(f, "{};", Expr::call(call.clone(), Type::Void)),
            Stmt::VarDecl { name, ty, .. } => write!(f, "{} {};", ty, name),
            Stmt::For { var, start, end, .. } => {
                write!(f, "for ({} = {}; {} < {}; ..) {{ .. }}", var, start, var, end)
            }
            Stmt::Block(_) => f.write_str("{ .. }"),
            Stmt::Exit => f.write_str("exit;"),
            Stmt::Return => f.write_str("return;"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_map_reaches_nested_blocks() {
        let inner = Stmt::assign(Expr::path("a", Type::bits(8)), Expr::constant(1, 8));
        let stmts = vec![Stmt::if_else(
            Expr::boolean(true),
            vec![inner.clone()],
            vec![Stmt::Block(vec![inner])],
        )];
        let out = flat_map_stmts(stmts, &mut |s| match s {
            Stmt::Assign { .. } => vec![s.clone(), s],
            other => vec![other],
        });
        let mut assigns = 0;
        walk_stmts(&out, &mut |s| {
            if matches!(s, Stmt::Assign { .. }) {
                assigns += 1;
            }
        });
        assert_eq!(assigns, 4);
    }

    #[test]
    fn test_walk_exprs_sees_conditions() {
        let stmts = vec![Stmt::if_else(Expr::table_hit("t", true), vec![], vec![])];
        let mut seen = Vec::new();
        walk_exprs(&stmts, &mut |e| seen.push(e.to_string()));
        assert_eq!(seen, vec!["t.apply().hit".to_string()]);
    }
}
