//! Key consolidation
//!
//! The target looks tables up with keys read from one record. Every match
//! key of every table is copied into a field of the metadata struct before
//! the table is applied, and the table then matches on that field.
//!
//! Fields are appended in table-processing order and, within a table, in
//! declared key order. Two keys holding the same expression at the same type
//! share one field. A table is consolidated at most once per compilation, so
//! running the pass again leaves the tree unchanged.

use super::arch_convert::{extend_metadata_struct, DEFAULT_METADATA_TYPE};
use super::insert_before_applies;
use crate::arch::METADATA_PARAM;
use crate::context::KeyField;
use crate::error::Result;
use crate::ir::{Declaration, Expr, ExprKind, Field, Local, Program, Stmt, Type};
use crate::pass::{Normalizer, PassContext};
use std::collections::HashSet;

/// Rewrites every table key to a field of the consolidated key record
pub struct CopyMatchKeysToSingleStruct;

impl Normalizer<Program> for CopyMatchKeysToSingleStruct {
    fn name(&self) -> &'static str {
        "CopyMatchKeysToSingleStruct"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let metadata = cx
            .structure
            .metadata_type()
            .unwrap_or(DEFAULT_METADATA_TYPE)
            .to_string();
        let meta = Expr::path(METADATA_PARAM, Type::Struct(metadata.clone()));
        let mut taken: HashSet<String> = program
            .struct_type(&metadata)
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();
        let mut new_fields = Vec::new();

        for decl in &mut program.declarations {
            let Declaration::Control(control) = decl else {
                continue;
            };
            let mut copies: Vec<(String, Vec<Stmt>)> = Vec::new();
            for local in &mut control.locals {
                let Local::Table(table) = local else {
                    continue;
                };
                if table.keys.is_empty() || cx.structure.is_consolidated(&table.name) {
                    continue;
                }
                let mut table_copies = Vec::new();
                let mut targets = Vec::new();
                for key in &mut table.keys {
                    let ty = key.expr.ty.clone();
                    let existing = cx
                        .structure
                        .key_struct()
                        .find(&key.expr, &ty)
                        .map(|f| f.name.clone());
                    let name = match existing {
                        Some(name) => name,
                        None => {
                            let name = unique(key_field_name(&control.name, &key.expr), &mut taken);
                            cx.structure.key_struct_mut().fields.push(KeyField {
                                name: name.clone(),
                                ty: ty.clone(),
                                expr: key.expr.clone(),
                            });
                            new_fields.push(Field::new(name.clone(), ty.clone()));
                            name
                        }
                    };
                    let field = Expr::member(meta.clone(), name.clone(), ty);
                    let original = std::mem::replace(&mut key.expr, field.clone());
                    let copy = Stmt::assign(field, original);
                    if !table_copies.contains(&copy) {
                        table_copies.push(copy);
                    }
                    targets.push(name);
                }
                if let Some(info) = cx.structure.table_mut(&table.name) {
                    for (key, target) in info.keys.iter_mut().zip(targets) {
                        key.target = Some(target);
                    }
                }
                cx.structure.mark_consolidated(&table.name);
                tracing::debug!(table = %table.name, keys = table.keys.len(), "keys consolidated");
                copies.push((table.name.clone(), table_copies));
            }
            for (table, stmts) in copies {
                let body = std::mem::take(&mut control.body);
                control.body = insert_before_applies(body, &table, &stmts);
            }
        }

        extend_metadata_struct(&mut program, &metadata, new_fields);
        Ok(program)
    }
}

/// `<control>_<key path without its root>`, reduced to identifier characters
fn key_field_name(control: &str, expr: &Expr) -> String {
    let text = expr.to_string();
    let root = match &expr.kind {
        ExprKind::IsValid(header) => header.root_path(),
        _ => expr.root_path(),
    };
    let text = root
        .and_then(|root| text.strip_prefix(root))
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(&text);
    let mut name = String::with_capacity(control.len() + text.len() + 1);
    name.push_str(control);
    let mut pending_sep = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_sep {
                name.push('_');
                pending_sep = false;
            }
            name.push(c);
        } else {
            pending_sep = true;
        }
    }
    name
}

fn unique(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut k = 1;
    loop {
        let candidate = format!("{}_{}", base, k);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        k += 1;
    }
}
