//! Architecture flattening: block parameters collapse onto `h` and `m`

use super::collect::block_params;
use crate::arch::{flattened_name, ArchVariant, HEADERS_PARAM, METADATA_PARAM, TABLE_ENTRY_INDEX_FIELD};
use crate::error::Result;
use crate::ir::{
    flat_map_stmts, walk_exprs_mut, Declaration, Direction, Expr, ExprKind, Field, Local, Param,
    Program, Stmt, StructType, Transition, Type,
};
use crate::pass::{Normalizer, PassContext};
use std::collections::BTreeMap;

/// Metadata struct created when the program declares none
pub const DEFAULT_METADATA_TYPE: &str = "main_metadata_t";

/// Renames the headers and metadata parameters of every bound block to `h`
/// and `m`, folds built-in metadata structs into fields of `m`, and turns
/// port-forwarding extern functions into plain assignments
pub struct ConvertToDpdkArch;

impl Normalizer<Program> for ConvertToDpdkArch {
    fn name(&self) -> &'static str {
        "ConvertToDpdkArch"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let arch = cx.structure.arch();
        let headers = cx.structure.headers_type().map(str::to_string);
        let metadata = match cx.structure.metadata_type() {
            Some(name) => name.to_string(),
            None => {
                cx.structure.record_metadata_type(DEFAULT_METADATA_TYPE);
                DEFAULT_METADATA_TYPE.to_string()
            }
        };
        let meta = Expr::path(METADATA_PARAM, Type::Struct(metadata.clone()));
        let blocks: Vec<String> = cx.structure.blocks().map(|(_, b)| b.to_string()).collect();

        for block in &blocks {
            let mut renamed = BTreeMap::new();
            let mut flattened = BTreeMap::new();
            for param in block_params(&program, block) {
                let Type::Struct(type_name) = &param.ty else {
                    continue;
                };
                if Some(type_name) == headers.as_ref() {
                    renamed.insert(param.name.clone(), HEADERS_PARAM);
                } else if *type_name == metadata {
                    renamed.insert(param.name.clone(), METADATA_PARAM);
                } else if arch.standard_struct(type_name).is_some() {
                    flattened.insert(param.name.clone(), type_name.clone());
                }
            }

            program.bodies_mut(&mut |scope, body| {
                if scope.block.as_deref() != Some(block.as_str()) {
                    return;
                }
                let stmts = std::mem::take(body);
                *body = flat_map_stmts(stmts, &mut |stmt| lower_port_call(stmt, arch, &meta));
            });

            block_exprs_mut(&mut program, block, &mut |e| {
                e.rewrite_post(&mut |node| {
                    let replacement = match &node.kind {
                        ExprKind::Path(p) => renamed
                            .get(p)
                            .map(|new_name| Expr::path(*new_name, node.ty.clone())),
                        ExprKind::Member { base, field } => match &base.kind {
                            ExprKind::Path(p) => flattened.get(p).map(|type_name| {
                                Expr::member(
                                    meta.clone(),
                                    flattened_name(type_name, field),
                                    node.ty.clone(),
                                )
                            }),
                            _ => None,
                        },
                        _ => None,
                    };
                    if let Some(replacement) = replacement {
                        *node = replacement;
                    }
                })
            });

            if let Some(params) = block_params_mut(&mut program, block) {
                params.retain(|p| !flattened.contains_key(&p.name));
                for param in params.iter_mut() {
                    if let Some(new_name) = renamed.get(&param.name) {
                        param.name = new_name.to_string();
                    }
                }
                if !params.iter().any(|p| p.name == METADATA_PARAM) {
                    params.push(Param::new(METADATA_PARAM, meta.ty.clone(), Direction::InOut));
                }
            }
            tracing::debug!(
                block = %block,
                renamed = renamed.len(),
                flattened = flattened.len(),
                "block parameters converted"
            );
        }
        Ok(program)
    }
}

fn lower_port_call(stmt: Stmt, arch: ArchVariant, meta: &Expr) -> Vec<Stmt> {
    port_assignments(&stmt, arch, meta).unwrap_or_else(|| vec![stmt])
}

fn port_assignments(stmt: &Stmt, arch: ArchVariant, meta: &Expr) -> Option<Vec<Stmt>> {
    let Stmt::Call(call) = stmt else {
        return None;
    };
    if call.target.is_some() {
        return None;
    }
    let field = |name: String, ty: Type| Expr::member(meta.clone(), name, ty);
    let std_type = |arg: &Expr| match &arg.ty {
        Type::Struct(name) => Some(name.clone()),
        _ => None,
    };
    match (arch, call.method.as_str(), call.args.as_slice()) {
        (ArchVariant::Pna, "send_to_port", [port]) => Some(vec![Stmt::assign(
            field(arch.tx_field().to_string(), Type::bits(32)),
            port.clone(),
        )]),
        (ArchVariant::Psa, "send_to_port", [ostd, port]) => std_type(ostd).map(|ty| {
            vec![
                Stmt::assign(field(flattened_name(&ty, "drop"), Type::Bool), Expr::boolean(false)),
                Stmt::assign(
                    field(flattened_name(&ty, "egress_port"), Type::bits(32)),
                    port.clone(),
                ),
            ]
        }),
        (ArchVariant::Psa, "ingress_drop" | "egress_drop", [ostd]) => std_type(ostd).map(|ty| {
            vec![Stmt::assign(
                field(flattened_name(&ty, "drop"), Type::Bool),
                Expr::boolean(true),
            )]
        }),
        _ => None,
    }
}

/// Visit every expression root inside one parser or control
fn block_exprs_mut(program: &mut Program, block: &str, f: &mut dyn FnMut(&mut Expr)) {
    for decl in &mut program.declarations {
        match decl {
            Declaration::Control(c) if c.name == block => {
                for local in &mut c.locals {
                    match local {
                        Local::Action(a) => walk_exprs_mut(&mut a.body, f),
                        Local::Table(t) => {
                            t.keys.iter_mut().for_each(|k| f(&mut k.expr));
                            if let Some(default) = &mut t.default_action {
                                default.args.iter_mut().for_each(&mut *f);
                            }
                        }
                        _ => {}
                    }
                }
                walk_exprs_mut(&mut c.body, f);
            }
            Declaration::Parser(p) if p.name == block => {
                for state in &mut p.states {
                    walk_exprs_mut(&mut state.body, f);
                    if let Transition::Select { expr, .. } = &mut state.transition {
                        f(expr);
                    }
                }
            }
            _ => {}
        }
    }
}

fn block_params_mut<'p>(program: &'p mut Program, block: &str) -> Option<&'p mut Vec<Param>> {
    program.declarations.iter_mut().find_map(|d| match d {
        Declaration::Control(c) if c.name == block => Some(&mut c.params),
        Declaration::Parser(p) if p.name == block => Some(&mut p.params),
        _ => None,
    })
}

/// Append fields to the metadata struct declaration, creating it ahead of
/// the first block when missing. Returns how many fields were new.
pub(crate) fn extend_metadata_struct(
    program: &mut Program,
    name: &str,
    fields: impl IntoIterator<Item = Field>,
) -> usize {
    match program.struct_type_mut(name) {
        Some(st) => fields.into_iter().filter(|f| st.push_unique(f.clone())).count(),
        None => {
            let mut st = StructType {
                name: name.to_string(),
                fields: Vec::new(),
            };
            let added = fields.into_iter().filter(|f| st.push_unique(f.clone())).count();
            let at = program
                .declarations
                .iter()
                .position(|d| {
                    matches!(
                        d,
                        Declaration::Action(_) | Declaration::Parser(_) | Declaration::Control(_)
                    )
                })
                .unwrap_or(program.declarations.len());
            program.declarations.insert(at, Declaration::Struct(st));
            added
        }
    }
}

/// Adds the flattened built-in metadata fields to the metadata struct
pub struct InjectJumboStruct;

impl Normalizer<Program> for InjectJumboStruct {
    fn name(&self) -> &'static str {
        "InjectJumboStruct"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let name = cx
            .structure
            .metadata_type()
            .unwrap_or(DEFAULT_METADATA_TYPE)
            .to_string();
        let fields = cx.structure.compiler_added_fields().to_vec();
        let added = extend_metadata_struct(&mut program, &name, fields);
        tracing::debug!(metadata = %name, added, "metadata struct extended");
        Ok(program)
    }
}

/// Adds the fields the target always reads or writes: the port fields, the
/// PNA pass number and, with direct resources, the table entry index
pub struct InjectFixedMetadataField;

impl Normalizer<Program> for InjectFixedMetadataField {
    fn name(&self) -> &'static str {
        "InjectFixedMetadataField"
    }

    fn normalize(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Result<Program> {
        let name = cx
            .structure
            .metadata_type()
            .unwrap_or(DEFAULT_METADATA_TYPE)
            .to_string();
        let mut fields = cx.structure.arch().fixed_fields();
        let direct = program
            .controls()
            .flat_map(|c| c.tables())
            .any(|t| t.direct_counter.is_some());
        if direct {
            fields.push(Field::new(TABLE_ENTRY_INDEX_FIELD, Type::bits(32)));
        }
        extend_metadata_struct(&mut program, &name, fields);
        Ok(program)
    }
}
