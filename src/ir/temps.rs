//! Fresh temporary variables for normalizing passes

use super::decl::{Local, Param};
use super::expr::Expr;
use super::types::Type;
use std::collections::HashSet;

/// Hands out `tmp_<n>` names that do not clash with the enclosing block
#[derive(Debug, Clone, Default)]
pub struct TempAllocator {
    taken: HashSet<String>,
    next: usize,
    fresh: Vec<(String, Type)>,
}

impl TempAllocator {
    /// Allocator that avoids the given names
    pub fn new(taken: impl IntoIterator<Item = String>) -> Self {
        Self {
            taken: taken.into_iter().collect(),
            next: 0,
            fresh: Vec::new(),
        }
    }

    /// Allocator for a parser or control with these locals and parameters.
    /// Parameters of local actions are avoided as well.
    pub fn for_block(locals: &[Local], params: &[Param]) -> Self {
        let action_params = locals.iter().flat_map(|l| match l {
            Local::Action(a) => a.params.iter().map(|p| p.name.clone()).collect(),
            _ => Vec::new(),
        });
        Self::new(
            locals
                .iter()
                .map(|l| l.name().to_string())
                .chain(params.iter().map(|p| p.name.clone()))
                .chain(action_params),
        )
    }

    /// A new variable of type `ty`, as a path expression
    pub fn fresh(&mut self, ty: Type) -> Expr {
        let name = loop {
            let candidate = format!("tmp_{}", self.next);
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                break candidate;
            }
        };
        self.fresh.push((name.clone(), ty.clone()));
        Expr::path(name, ty)
    }

    /// Nothing was allocated
    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty()
    }

    /// Declarations for every allocated variable
    pub fn into_locals(self) -> Vec<Local> {
        self.fresh
            .into_iter()
            .map(|(name, ty)| Local::Var { name, ty })
            .collect()
    }
}
