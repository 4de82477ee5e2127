//! Ordered pass execution

use super::{Pass, PassContext, PassKind};
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Identity of a pass that just finished, handed to the debug hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassEvent {
    /// Enclosing pipeline
    pub pipeline: &'static str,
    /// Pass name
    pub pass: &'static str,
    /// Pass category
    pub kind: PassKind,
    /// Position in execution order, counting repetitions
    pub sequence: usize,
}

/// Observer called after every pass with the resulting tree
pub type DebugHook = Arc<dyn Fn(&PassEvent, &dyn fmt::Debug) + Send + Sync>;

/// Element of a pipeline
pub enum PassItem<T> {
    /// One pass
    Single(Box<dyn Pass<T>>),
    /// A group run a fixed number of times
    Repeated {
        /// Number of runs
        count: usize,
        /// Group members
        items: Vec<PassItem<T>>,
    },
}

impl<T> PassItem<T> {
    /// Wrap a pass
    pub fn pass(pass: impl Pass<T> + 'static) -> Self {
        PassItem::Single(Box::new(pass))
    }

    /// Repeat a group `count` times
    pub fn repeated(count: usize, items: Vec<PassItem<T>>) -> Self {
        PassItem::Repeated { count, items }
    }

    fn collect_names(&self, out: &mut Vec<&'static str>) {
        match self {
            PassItem::Single(pass) => out.push(pass.name()),
            PassItem::Repeated { count, items } => {
                for _ in 0..*count {
                    for item in items {
                        item.collect_names(out);
                    }
                }
            }
        }
    }
}

/// A sequence of passes over one owned tree
pub struct Pipeline<T> {
    name: &'static str,
    items: Vec<PassItem<T>>,
    hook: Option<DebugHook>,
}

impl<T: fmt::Debug> Pipeline<T> {
    /// Empty pipeline
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: Vec::new(),
            hook: None,
        }
    }

    /// Append a pass
    pub fn add(mut self, pass: impl Pass<T> + 'static) -> Self {
        self.items.push(PassItem::pass(pass));
        self
    }

    /// Append an item
    pub fn item(mut self, item: PassItem<T>) -> Self {
        self.items.push(item);
        self
    }

    /// Append several items
    pub fn extend(mut self, items: impl IntoIterator<Item = PassItem<T>>) -> Self {
        self.items.extend(items);
        self
    }

    /// Install a debug hook
    pub fn with_hook(mut self, hook: Option<DebugHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Pipeline name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Pass names in execution order, repetitions expanded
    pub fn execution_order(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for item in &self.items {
            item.collect_names(&mut names);
        }
        names
    }

    /// Run every pass in order.
    ///
    /// Diagnostics do not stop the run; only `Err` from a pass does.
    pub fn run(&mut self, tree: T, cx: &mut PassContext<'_>) -> Result<T> {
        let mut sequence = 0;
        let name = self.name;
        let hook = self.hook.clone();
        run_items(name, &mut self.items, tree, cx, hook.as_ref(), &mut sequence)
    }
}

fn run_items<T: fmt::Debug>(
    pipeline: &'static str,
    items: &mut [PassItem<T>],
    mut tree: T,
    cx: &mut PassContext<'_>,
    hook: Option<&DebugHook>,
    sequence: &mut usize,
) -> Result<T> {
    for item in items.iter_mut() {
        match item {
            PassItem::Single(pass) => {
                let event = PassEvent {
                    pipeline,
                    pass: pass.name(),
                    kind: pass.kind(),
                    sequence: *sequence,
                };
                cx.diagnostics.enter_pass(event.pass);
                let errors_before = cx.diagnostics.error_count();
                tracing::debug!(pipeline, pass = event.pass, kind = %event.kind, "start");

                tree = pass.run(tree, cx)?;

                let new_errors = cx.diagnostics.error_count() - errors_before;
                tracing::debug!(pipeline, pass = event.pass, new_errors, "finish");
                if let Some(hook) = hook {
                    hook(&event, &tree);
                }
                *sequence += 1;
            }
            PassItem::Repeated { count, items } => {
                for _ in 0..*count {
                    tree = run_items(pipeline, items, tree, cx, hook, sequence)?;
                }
            }
        }
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorKind;
    use crate::pass::testing::Harness;
    use crate::pass::{Normalize, Normalizer, Validate, Validator};
    use crate::context::ProgramStructure;
    use crate::diagnostics::Diagnostics;
    use std::sync::Mutex;

    struct Increment;

    impl Normalizer<u32> for Increment {
        fn name(&self) -> &'static str {
            "Increment"
        }

        fn normalize(&mut self, tree: u32, _cx: &mut PassContext<'_>) -> Result<u32> {
            Ok(tree + 1)
        }
    }

    struct RejectOdd;

    impl Validator<u32> for RejectOdd {
        fn name(&self) -> &'static str {
            "RejectOdd"
        }

        fn validate(&self, tree: &u32, _s: &ProgramStructure, diagnostics: &mut Diagnostics) {
            if tree % 2 == 1 {
                diagnostics.error(ErrorKind::Invalid, format!("{} is odd", tree));
            }
        }
    }

    #[test]
    fn test_repeated_group_runs_fixed_count() {
        let mut pipeline = Pipeline::new("test").item(PassItem::repeated(
            2,
            vec![PassItem::pass(Normalize(Increment))],
        ));
        let mut harness = Harness::default();
        let out = pipeline.run(0, &mut harness.cx());
        assert_eq!(out, Ok(2));
        assert_eq!(pipeline.execution_order(), vec!["Increment", "Increment"]);
    }

    #[test]
    fn test_diagnostics_do_not_stop_the_stage() {
        let mut pipeline = Pipeline::new("test")
            .add(Normalize(Increment))
            .add(Validate(RejectOdd))
            .add(Normalize(Increment))
            .add(Normalize(Increment))
            .add(Validate(RejectOdd));
        let mut harness = Harness::default();
        let out = pipeline.run(0, &mut harness.cx());
        assert_eq!(out, Ok(3));
        assert_eq!(harness.diagnostics.error_count(), 2);
        assert_eq!(
            harness.diagnostics.errors().map(|d| d.pass).collect::<Vec<_>>(),
            vec!["RejectOdd", "RejectOdd"]
        );
    }

    #[test]
    fn test_hook_sees_every_pass() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: DebugHook = Arc::new(move |event, tree| {
            if let Ok(mut seen) = sink.lock() {
                seen.push(format!("{}#{}={:?}", event.pass, event.sequence, tree));
            }
        });
        let mut pipeline = Pipeline::new("test")
            .add(Normalize(Increment))
            .add(Validate(RejectOdd))
            .with_hook(Some(hook));
        let mut harness = Harness::default();
        let _ = pipeline.run(4, &mut harness.cx());
        let seen = seen.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen, vec!["Increment#0=5", "RejectOdd#1=5"]);
    }
}
