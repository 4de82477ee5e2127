//! Identifier shortening
//!
//! The target's loader rejects identifiers longer than
//! [`MAX_IDENTIFIER_LEN`]. Every longer name is mapped to a prefix of itself
//! plus a counter; the map is injective and never produces a name that is
//! already in use.

use crate::asm::AsmProgram;
use crate::error::Result;
use crate::pass::{Analysis, PassContext, Rewrite};
use std::collections::{BTreeMap, BTreeSet};

/// Longest identifier the target accepts
pub const MAX_IDENTIFIER_LEN: usize = 60;

/// Map from each over-long name to its replacement.
///
/// `names` must contain every identifier of the program so replacements
/// cannot collide with a name that stays.
pub fn shorten_names<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, String> {
    let names: BTreeSet<&str> = names.into_iter().collect();
    let mut taken: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();
    let mut map = BTreeMap::new();
    let mut counter = 0usize;
    for name in names.iter().filter(|n| n.chars().count() > MAX_IDENTIFIER_LEN) {
        let short = loop {
            let suffix = format!("_{}", counter);
            counter += 1;
            let prefix: String = name
                .chars()
                .take(MAX_IDENTIFIER_LEN - suffix.len())
                .collect();
            let candidate = prefix + &suffix;
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(short.clone());
        map.insert(name.to_string(), short);
    }
    map
}

/// Computes the rename map
pub struct ShortenTokenLength;

impl Analysis<AsmProgram> for ShortenTokenLength {
    type Output = BTreeMap<String, String>;

    fn name(&self) -> &'static str {
        "ShortenTokenLength"
    }

    fn analyze(&mut self, program: &AsmProgram, cx: &mut PassContext<'_>) -> Result<Self::Output> {
        let mut names: Vec<String> = Vec::new();
        program.for_each_name(&mut |n| names.push(n.to_string()));
        let map = shorten_names(names.iter().map(String::as_str));
        if !map.is_empty() {
            tracing::debug!(renamed = map.len(), "identifiers shortened");
        }
        cx.artifacts.rename_map = map.clone();
        Ok(map)
    }
}

/// Applies the rename map to every identifier
pub struct ApplyRenameMap;

impl Rewrite<AsmProgram, BTreeMap<String, String>> for ApplyRenameMap {
    fn name(&self) -> &'static str {
        "ApplyRenameMap"
    }

    fn rewrite(
        &mut self,
        mut program: AsmProgram,
        map: &BTreeMap<String, String>,
        _cx: &mut PassContext<'_>,
    ) -> Result<AsmProgram> {
        if map.is_empty() {
            return Ok(program);
        }
        program.for_each_name_mut(&mut |name| {
            if let Some(short) = map.get(name.as_str()) {
                *name = short.clone();
            }
        });
        Ok(program)
    }
}
