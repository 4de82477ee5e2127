//! # Pass Contract
//!
//! Every stage of the backend is a [`Pass`] over an owned tree. The category
//! traits below narrow what a stage may touch; each one is lifted into a
//! [`Pass`] by a wrapper so the pipeline can hold them side by side.
//!
//! | Category | Tree | Context | Diagnostics |
//! |---|---|---|---|
//! | [`Collector`] | read | write | - |
//! | [`Validator`] | read | read | write |
//! | [`Normalizer`] | rewrite | read/write | write |
//! | [`Analysis`] + [`Rewrite`] | read, then rewrite | read | write |
//! | [`Emitter`] | read | read | write |
//! | [`Convert`] | consume, produce a new vocabulary | read | write |

pub mod pipeline;

pub use pipeline::{DebugHook, PassEvent, PassItem, Pipeline};

use crate::backend::BackendOptions;
use crate::context::ProgramStructure;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Pass category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Fills the context
    Collector,
    /// Reports diagnostics
    Validator,
    /// Rewrites the tree
    Normalizer,
    /// Analysis feeding an adjacent rewrite
    Analysis,
    /// Produces an artifact
    Emitter,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PassKind::Collector => "collector",
            PassKind::Validator => "validator",
            PassKind::Normalizer => "normalizer",
            PassKind::Analysis => "analysis",
            PassKind::Emitter => "emitter",
        })
    }
}

/// Side outputs produced while compiling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifacts {
    /// Rendered context JSON, when a destination was configured.
    ///
    /// Set even when writing the destination failed; the failure is then
    /// in `io_errors`.
    pub context_json: Option<String>,
    /// Table configuration text keyed by (renamed) table name
    pub table_configs: BTreeMap<String, String>,
    /// Identifier shortening map
    pub rename_map: BTreeMap<String, String>,
    /// Output channels that could not be written
    pub io_errors: Vec<Error>,
}

/// Everything a pass may touch besides the tree
pub struct PassContext<'a> {
    /// Architecture context
    pub structure: &'a mut ProgramStructure,
    /// Diagnostics sink
    pub diagnostics: &'a mut Diagnostics,
    /// Backend configuration
    pub options: &'a BackendOptions,
    /// Side outputs
    pub artifacts: &'a mut Artifacts,
}

/// A unit of transformation or validation
pub trait Pass<T> {
    /// Stable name used in logs and diagnostics
    fn name(&self) -> &'static str;

    /// Category
    fn kind(&self) -> PassKind;

    /// Run over the tree. Returning an equal tree means "no change".
    fn run(&mut self, tree: T, cx: &mut PassContext<'_>) -> Result<T>;
}

/// Reads the tree, records facts into the context
pub trait Collector<T> {
    /// Pass name
    fn name(&self) -> &'static str;

    /// Record facts. Must be idempotent on an unchanged tree.
    fn collect(&mut self, tree: &T, structure: &mut ProgramStructure) -> Result<()>;
}

/// Reads the tree and context, reports diagnostics
pub trait Validator<T> {
    /// Pass name
    fn name(&self) -> &'static str;

    /// Check the tree
    fn validate(&self, tree: &T, structure: &ProgramStructure, diagnostics: &mut Diagnostics);
}

/// Rewrites the tree into a more target-legal shape
pub trait Normalizer<T> {
    /// Pass name
    fn name(&self) -> &'static str;

    /// Rewrite
    fn normalize(&mut self, tree: T, cx: &mut PassContext<'_>) -> Result<T>;
}

/// Produces an artifact without changing the tree
pub trait Emitter<T> {
    /// Pass name
    fn name(&self) -> &'static str;

    /// Emit
    fn emit(&mut self, tree: &T, cx: &mut PassContext<'_>) -> Result<()>;
}

/// Computes a value handed to the next rewrite
pub trait Analysis<T> {
    /// Analysis result
    type Output;

    /// Pass name
    fn name(&self) -> &'static str;

    /// Analyze
    fn analyze(&mut self, tree: &T, cx: &mut PassContext<'_>) -> Result<Self::Output>;
}

/// Rewrite driven by an analysis result
pub trait Rewrite<T, I> {
    /// Pass name
    fn name(&self) -> &'static str;

    /// Rewrite using `input`
    fn rewrite(&mut self, tree: T, input: &I, cx: &mut PassContext<'_>) -> Result<T>;
}

/// Changes node vocabulary (`S` in, `D` out)
pub trait Convert<S, D> {
    /// Pass name
    fn name(&self) -> &'static str;

    /// Convert
    fn convert(&mut self, tree: S, cx: &mut PassContext<'_>) -> Result<D>;
}

/// Lifts a [`Collector`] into a [`Pass`]
pub struct Collect<C>(pub C);

impl<T, C: Collector<T>> Pass<T> for Collect<C> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn kind(&self) -> PassKind {
        PassKind::Collector
    }

    fn run(&mut self, tree: T, cx: &mut PassContext<'_>) -> Result<T> {
        self.0.collect(&tree, cx.structure)?;
        Ok(tree)
    }
}

/// Lifts a [`Validator`] into a [`Pass`]
pub struct Validate<V>(pub V);

impl<T, V: Validator<T>> Pass<T> for Validate<V> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn kind(&self) -> PassKind {
        PassKind::Validator
    }

    fn run(&mut self, tree: T, cx: &mut PassContext<'_>) -> Result<T> {
        self.0.validate(&tree, cx.structure, cx.diagnostics);
        Ok(tree)
    }
}

/// Lifts a [`Normalizer`] into a [`Pass`]
pub struct Normalize<N>(pub N);

impl<T, N: Normalizer<T>> Pass<T> for Normalize<N> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn kind(&self) -> PassKind {
        PassKind::Normalizer
    }

    fn run(&mut self, tree: T, cx: &mut PassContext<'_>) -> Result<T> {
        self.0.normalize(tree, cx)
    }
}

/// Lifts an [`Emitter`] into a [`Pass`]
pub struct Emit<E>(pub E);

impl<T, E: Emitter<T>> Pass<T> for Emit<E> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn kind(&self) -> PassKind {
        PassKind::Emitter
    }

    fn run(&mut self, tree: T, cx: &mut PassContext<'_>) -> Result<T> {
        self.0.emit(&tree, cx)?;
        Ok(tree)
    }
}

/// Two rewrites fed the same analysis result, in order
impl<T, I, R1: Rewrite<T, I>, R2: Rewrite<T, I>> Rewrite<T, I> for (R1, R2) {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn rewrite(&mut self, tree: T, input: &I, cx: &mut PassContext<'_>) -> Result<T> {
        let tree = self.0.rewrite(tree, input, cx)?;
        tracing::debug!(pass = self.1.name(), "rewrite");
        self.1.rewrite(tree, input, cx)
    }
}

/// An analysis and the rewrite consuming its result, composed adjacently
pub struct Paired<A, R> {
    analysis: A,
    rewrite: R,
}

impl<A, R> Paired<A, R> {
    /// Compose
    pub fn new(analysis: A, rewrite: R) -> Self {
        Self { analysis, rewrite }
    }
}

impl<T, A: Analysis<T>, R: Rewrite<T, A::Output>> Pass<T> for Paired<A, R> {
    fn name(&self) -> &'static str {
        self.analysis.name()
    }

    fn kind(&self) -> PassKind {
        PassKind::Analysis
    }

    fn run(&mut self, tree: T, cx: &mut PassContext<'_>) -> Result<T> {
        let output = self.analysis.analyze(&tree, cx)?;
        tracing::debug!(
            analysis = self.analysis.name(),
            pass = self.rewrite.name(),
            "rewrite"
        );
        self.rewrite.rewrite(tree, &output, cx)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Owns everything a [`PassContext`] borrows
    #[derive(Default)]
    pub struct Harness {
        pub structure: ProgramStructure,
        pub diagnostics: Diagnostics,
        pub options: BackendOptions,
        pub artifacts: Artifacts,
    }

    impl Harness {
        pub fn new(structure: ProgramStructure) -> Self {
            Self {
                structure,
                ..Self::default()
            }
        }

        pub fn cx(&mut self) -> PassContext<'_> {
            PassContext {
                structure: &mut self.structure,
                diagnostics: &mut self.diagnostics,
                options: &self.options,
                artifacts: &mut self.artifacts,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Harness;
    use super::*;

    struct Length;

    impl Analysis<Vec<u32>> for Length {
        type Output = usize;

        fn name(&self) -> &'static str {
            "Length"
        }

        fn analyze(&mut self, tree: &Vec<u32>, _cx: &mut PassContext<'_>) -> Result<usize> {
            Ok(tree.len())
        }
    }

    struct Push(u32);

    impl Rewrite<Vec<u32>, usize> for Push {
        fn name(&self) -> &'static str {
            "Push"
        }

        fn rewrite(&mut self, mut tree: Vec<u32>, len: &usize, _cx: &mut PassContext<'_>) -> Result<Vec<u32>> {
            tree.push(self.0 + *len as u32);
            Ok(tree)
        }
    }

    #[test]
    fn test_paired_rewrites_share_one_result() {
        let mut pass = Paired::new(Length, (Push(10), Push(20)));
        let mut h = Harness::default();
        assert_eq!(Pass::<Vec<u32>>::name(&pass), "Length");
        assert_eq!(Pass::<Vec<u32>>::kind(&pass), PassKind::Analysis);
        // Both rewrites see the length computed before either ran
        assert_eq!(pass.run(vec![7], &mut h.cx()), Ok(vec![7, 11, 21]));
    }

    #[test]
    fn test_rewrite_error_propagates() {
        struct Fail;

        impl Rewrite<Vec<u32>, usize> for Fail {
            fn name(&self) -> &'static str {
                "Fail"
            }

            fn rewrite(&mut self, _tree: Vec<u32>, _len: &usize, _cx: &mut PassContext<'_>) -> Result<Vec<u32>> {
                Err(Error::contract("Fail", "refused"))
            }
        }

        let mut pass = Paired::new(Length, (Fail, Push(1)));
        let mut h = Harness::default();
        assert!(matches!(
            pass.run(Vec::new(), &mut h.cx()),
            Err(Error::ContractViolation { .. })
        ));
    }
}
