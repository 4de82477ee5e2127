//! # Program Tree
//!
//! Typed, architecture-independent representation handed over by the front
//! end. Every expression carries its type; the lowering pipeline rewrites
//! this tree until it only contains shapes the assembly converter accepts.

pub mod decl;
pub mod expr;
pub mod program;
pub mod stmt;
pub mod temps;
pub mod types;

pub use decl::{
    Action, ActionRef, ActionScope, Control, Declaration, Direction, ExternInstance, ExternKind,
    Key, KeySetValue, Local, MatchKind, Param, Parser, ParserState, SelectCase, Table,
    TableAction, TableEntry, Transition,
};
pub use expr::{BinOp, Expr, ExprKind, MethodCall, UnaryOp};
pub use program::{BodyKind, PackageInstance, Program, Scope};
pub use stmt::{flat_map_stmts, walk_exprs, walk_exprs_mut, walk_rvalues_mut, walk_stmts, Stmt};
pub use temps::TempAllocator;
pub use types::{Field, HeaderType, StructType, Type};
