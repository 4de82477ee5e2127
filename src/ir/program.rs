//! Program root

use super::decl::{Action, Control, Declaration, Local, Parser, Transition};
use super::expr::Expr;
use super::stmt::Stmt;
use super::types::{HeaderType, StructType};

/// Top-level package instantiation (`PNA_NIC(..) main;`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageInstance {
    /// Package type (`PNA_NIC`, `PSA_SWITCH`)
    pub type_name: String,
    /// Block names bound to the package parameters, in parameter order
    pub args: Vec<String>,
}

/// What kind of body a statement list belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// Control `apply` block
    Control,
    /// Action body
    Action,
    /// Parser state body
    ParserState,
}

/// Location of a statement list within the program
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    /// Enclosing parser or control (`None` for top-level actions)
    pub block: Option<String>,
    /// Body kind
    pub kind: BodyKind,
    /// Name of the action, state or control owning the body
    pub name: String,
}

/// Typed, architecture-independent program
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Program {
    /// Declarations in source order
    pub declarations: Vec<Declaration>,
    /// The `main` package instance
    pub main: Option<PackageInstance>,
}

impl Program {
    /// Header type by name
    pub fn header_type(&self, name: &str) -> Option<&HeaderType> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::Header(h) if h.name == name => Some(h),
            _ => None,
        })
    }

    /// Struct type by name
    pub fn struct_type(&self, name: &str) -> Option<&StructType> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::Struct(s) if s.name == name => Some(s),
            _ => None,
        })
    }

    /// Struct type by name, mutably
    pub fn struct_type_mut(&mut self, name: &str) -> Option<&mut StructType> {
        self.declarations.iter_mut().find_map(|d| match d {
            Declaration::Struct(s) if s.name == name => Some(s),
            _ => None,
        })
    }

    /// Control by name
    pub fn control(&self, name: &str) -> Option<&Control> {
        self.controls().find(|c| c.name == name)
    }

    /// Parser by name
    pub fn parser(&self, name: &str) -> Option<&Parser> {
        self.parsers().find(|p| p.name == name)
    }

    /// Controls in declaration order
    pub fn controls(&self) -> impl Iterator<Item = &Control> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Control(c) => Some(c),
            _ => None,
        })
    }

    /// Parsers in declaration order
    pub fn parsers(&self) -> impl Iterator<Item = &Parser> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Parser(p) => Some(p),
            _ => None,
        })
    }

    /// Top-level actions
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Action(a) => Some(a),
            _ => None,
        })
    }

    /// Declared error names in declaration order
    pub fn error_names(&self) -> impl Iterator<Item = &str> {
        self.declarations
            .iter()
            .filter_map(|d| match d {
                Declaration::Errors(names) => Some(names),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
    }

    /// Action visible from `block` (local first, then top-level)
    pub fn action_in(&self, block: Option<&str>, name: &str) -> Option<&Action> {
        block
            .and_then(|b| self.control(b))
            .and_then(|c| c.action(name))
            .or_else(|| self.actions().find(|a| a.name == name))
    }

    /// Visit every statement list in the program
    pub fn bodies(&self, f: &mut dyn FnMut(&Scope, &[Stmt])) {
        for decl in &self.declarations {
            match decl {
                Declaration::Action(a) => f(&action_scope(None, &a.name), &a.body),
                Declaration::Parser(p) => {
                    for local in &p.locals {
                        if let Local::Action(a) = local {
                            f(&action_scope(Some(&p.name), &a.name), &a.body);
                        }
                    }
                    for state in &p.states {
                        f(&state_scope(&p.name, &state.name), &state.body);
                    }
                }
                Declaration::Control(c) => {
                    for local in &c.locals {
                        if let Local::Action(a) = local {
                            f(&action_scope(Some(&c.name), &a.name), &a.body);
                        }
                    }
                    f(&control_scope(&c.name), &c.body);
                }
                _ => {}
            }
        }
    }

    /// Visit every statement list in the program, mutably
    pub fn bodies_mut(&mut self, f: &mut dyn FnMut(&Scope, &mut Vec<Stmt>)) {
        for decl in &mut self.declarations {
            match decl {
                Declaration::Action(a) => f(&action_scope(None, &a.name), &mut a.body),
                Declaration::Parser(p) => {
                    for local in &mut p.locals {
                        if let Local::Action(a) = local {
                            f(&action_scope(Some(&p.name), &a.name), &mut a.body);
                        }
                    }
                    for state in &mut p.states {
                        f(&state_scope(&p.name, &state.name), &mut state.body);
                    }
                }
                Declaration::Control(c) => {
                    for local in &mut c.locals {
                        if let Local::Action(a) = local {
                            f(&action_scope(Some(&c.name), &a.name), &mut a.body);
                        }
                    }
                    f(&control_scope(&c.name), &mut c.body);
                }
                _ => {}
            }
        }
    }

    /// Visit every expression root outside statement bodies:
    /// table keys, default action arguments and select expressions
    pub fn side_exprs_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        for decl in &mut self.declarations {
            match decl {
                Declaration::Control(c) => {
                    for local in &mut c.locals {
                        if let Local::Table(t) = local {
                            for key in &mut t.keys {
                                f(&mut key.expr);
                            }
                            if let Some(default) = &mut t.default_action {
                                default.args.iter_mut().for_each(&mut *f);
                            }
                        }
                    }
                }
                Declaration::Parser(p) => {
                    for state in &mut p.states {
                        if let Transition::Select { expr, .. } = &mut state.transition {
                            f(expr);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Visit every expression root in the program, mutably
    pub fn exprs_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        self.bodies_mut(&mut |_, body| super::stmt::walk_exprs_mut(body, f));
        self.side_exprs_mut(f);
    }

    /// Visit every expression root in the program
    pub fn exprs(&self, f: &mut dyn FnMut(&Expr)) {
        self.bodies(&mut |_, body| super::stmt::walk_exprs(body, f));
        for decl in &self.declarations {
            match decl {
                Declaration::Control(c) => {
                    for t in c.tables() {
                        t.keys.iter().for_each(|k| f(&k.expr));
                        if let Some(default) = &t.default_action {
                            default.args.iter().for_each(&mut *f);
                        }
                    }
                }
                Declaration::Parser(p) => {
                    for state in &p.states {
                        if let Transition::Select { expr, .. } = &state.transition {
                            f(expr);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn action_scope(block: Option<&str>, name: &str) -> Scope {
    Scope {
        block: block.map(str::to_string),
        kind: BodyKind::Action,
        name: name.to_string(),
    }
}

fn state_scope(block: &str, name: &str) -> Scope {
    Scope {
        block: Some(block.to_string()),
        kind: BodyKind::ParserState,
        name: name.to_string(),
    }
}

fn control_scope(block: &str) -> Scope {
    Scope {
        block: Some(block.to_string()),
        kind: BodyKind::Control,
        name: block.to_string(),
    }
}
