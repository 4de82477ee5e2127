//! # Assembly Conversion
//!
//! Turns the fully lowered program tree into the target's flat assembly:
//! parsers become labelled state chains, conditions become compare-and-jump
//! sequences, assignments become `mov` and two-operand ALU instructions and
//! extern calls become their dedicated instructions.
//!
//! Anything the lowering pipeline should have removed but did not is
//! reported as a diagnostic; the instruction is skipped and conversion goes
//! on so that every leftover is reported in one run.

use crate::arch::{ArchVariant, BlockRole, HEADERS_PARAM, METADATA_PARAM, TABLE_ENTRY_INDEX_FIELD};
use crate::asm::{
    AluOp, AsmAction, AsmEntry, AsmField, AsmProgram, AsmStmt, AsmStruct, AsmTable, CmpOp, Operand,
    RegArray, DEFAULT_TABLE_SIZE,
};
use crate::context::ProgramStructure;
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::error::Result;
use crate::ir::{
    Action, ActionRef, ActionScope, BinOp, Control, Declaration, Expr, ExprKind, ExternKind,
    KeySetValue, MethodCall, Parser, Program, Stmt, Table, Transition, Type, UnaryOp,
};
use crate::pass::{Convert, PassContext};
use crate::passes::lower::{is_condition, ACTION_ARGS_PARAM};
use std::collections::BTreeSet;

/// Target of every drop: reject transitions and the PSA drop flag
pub const DROP_LABEL: &str = "LABEL_DROP";

/// Action synthesized for tables without a default action
pub const NO_ACTION: &str = "NoAction";

/// Converts the lowered program into assembly
pub struct ConvertToDpdkProgram;

impl Convert<Program, AsmProgram> for ConvertToDpdkProgram {
    fn name(&self) -> &'static str {
        "ConvertToDpdkProgram"
    }

    fn convert(&mut self, program: Program, cx: &mut PassContext<'_>) -> Result<AsmProgram> {
        let structure: &ProgramStructure = &*cx.structure;
        let mut builder = Builder {
            structure,
            diagnostics: &mut *cx.diagnostics,
            labels: 0,
            block: None,
            drop_used: false,
        };
        let asm = builder.program(&program);
        tracing::debug!(
            actions = asm.actions.len(),
            tables = asm.tables.len(),
            instructions = asm.apply.len(),
            "program converted"
        );
        Ok(asm)
    }
}

/// Block roles whose code ends up in `apply`
pub fn emitted_roles(arch: ArchVariant) -> Vec<BlockRole> {
    match arch {
        ArchVariant::Psa => vec![
            BlockRole::IngressParser,
            BlockRole::Ingress,
            BlockRole::IngressDeparser,
        ],
        ArchVariant::Pna => arch.roles().to_vec(),
    }
}

struct Builder<'a> {
    structure: &'a ProgramStructure,
    diagnostics: &'a mut Diagnostics,
    labels: usize,
    block: Option<String>,
    drop_used: bool,
}

impl<'a> Builder<'a> {
    fn label(&mut self, prefix: &str) -> String {
        let label = format!("{}_{}", prefix, self.labels);
        self.labels += 1;
        label
    }

    fn leftover(&mut self, what: impl std::fmt::Display) {
        self.diagnostics.error(
            ErrorKind::Unsupported,
            format!("{} cannot be converted to an instruction", what),
        );
    }

    fn program(&mut self, program: &Program) -> AsmProgram {
        let arch = self.structure.arch();
        let mut asm = AsmProgram::default();

        for decl in &program.declarations {
            if let Declaration::Header(h) = decl {
                asm.header_types.push(AsmStruct {
                    name: h.name.clone(),
                    fields: h
                        .fields
                        .iter()
                        .filter_map(|f| f.ty.storage_width().map(|w| AsmField::new(f.name.clone(), w)))
                        .collect(),
                });
            }
        }
        asm.headers = self.structure.header_instances().to_vec();

        let blocks: Vec<(BlockRole, String)> = emitted_roles(arch)
            .into_iter()
            .filter_map(|role| self.structure.block(role).map(|b| (role, b.to_string())))
            .collect();
        let controls: Vec<&Control> = blocks
            .iter()
            .filter_map(|(_, b)| program.control(b))
            .collect();

        let mut actions: Vec<(Option<&str>, &Action)> = Vec::new();
        for control in controls.iter().copied() {
            let block = control.name.as_str();
            actions.extend(control.actions().map(move |a| (Some(block), a)));
        }
        actions.extend(program.actions().map(|a| (None, a)));

        let mut seen = BTreeSet::new();
        for (block, action) in actions {
            if !seen.insert(action.name.clone()) {
                self.diagnostics.error(
                    ErrorKind::Duplicate,
                    format!("action {} is declared in more than one block", action.name),
                );
                continue;
            }
            let fields: Vec<AsmField> = action
                .data_params()
                .filter_map(|p| p.ty.storage_width().map(|w| AsmField::new(p.name.clone(), w)))
                .collect();
            let args = if fields.is_empty() {
                None
            } else {
                let name = format!("{}_arg_t", action.name);
                asm.structs.push(AsmStruct {
                    name: name.clone(),
                    fields,
                });
                Some(name)
            };
            self.block = block.map(str::to_string);
            let mut body = Vec::new();
            self.stmts(&action.body, None, &mut body);
            body.push(AsmStmt::Return);
            asm.actions.push(AsmAction {
                name: action.name.clone(),
                args,
                body,
            });
        }

        for control in &controls {
            for table in control.tables() {
                let table = self.table(table, program, control);
                if !seen.contains(&table.default_action) && table.default_action == NO_ACTION {
                    seen.insert(NO_ACTION.to_string());
                    asm.actions.push(AsmAction {
                        name: NO_ACTION.to_string(),
                        args: None,
                        body: vec![AsmStmt::Return],
                    });
                }
                asm.tables.push(table);
            }
        }

        for info in self.structure.externs() {
            if !controls.iter().any(|c| c.name == info.block) {
                continue;
            }
            let size = match &info.instance.kind {
                ExternKind::Counter { size } | ExternKind::Register { size, .. } => *size,
                ExternKind::DirectCounter => self
                    .structure
                    .direct_resource_table(&info.instance.name)
                    .and_then(|t| self.structure.table(t))
                    .and_then(|t| t.size)
                    .unwrap_or(DEFAULT_TABLE_SIZE),
            };
            asm.regarrays.push(RegArray {
                name: info.instance.name.clone(),
                size,
                init: 0,
            });
        }

        asm.apply.push(AsmStmt::Rx(Operand::Meta(arch.rx_field().to_string())));
        for (role, block) in &blocks {
            self.block = Some(block.clone());
            if role.is_parser() {
                if let Some(parser) = program.parser(block) {
                    self.parser(parser, &mut asm.apply);
                }
            } else if let Some(control) = program.control(block) {
                let end = format!("{}_END", block.to_uppercase());
                self.stmts(&control.body, Some(&end), &mut asm.apply);
                asm.apply.push(AsmStmt::Label(end));
            }
        }
        if arch == ArchVariant::Psa {
            self.drop_used = true;
            asm.apply.push(AsmStmt::JmpCmp {
                op: CmpOp::Neq,
                target: DROP_LABEL.to_string(),
                left: Operand::Meta("psa_ingress_output_metadata_drop".to_string()),
                right: Operand::Imm(0),
            });
        }
        asm.apply.push(AsmStmt::Tx(Operand::Meta(arch.tx_field().to_string())));
        if self.drop_used {
            asm.apply.push(AsmStmt::Label(DROP_LABEL.to_string()));
            asm.apply.push(AsmStmt::Drop);
        }

        let metadata = self.metadata_struct(program);
        asm.metadata = Some(metadata.name.clone());
        asm.structs.insert(0, metadata);
        asm
    }

    fn metadata_struct(&mut self, program: &Program) -> AsmStruct {
        let name = self
            .structure
            .metadata_type()
            .unwrap_or(crate::passes::arch_convert::DEFAULT_METADATA_TYPE)
            .to_string();
        let mut fields: Vec<AsmField> = Vec::new();
        let declared = program.struct_type(&name).map(|s| s.fields.clone()).unwrap_or_default();
        for field in declared {
            match field.ty.storage_width() {
                Some(w) => fields.push(AsmField::new(field.name, w)),
                None => self.diagnostics.error(
                    ErrorKind::Type,
                    format!("metadata field {} of type {} is not a scalar", field.name, field.ty),
                ),
            }
        }
        for var in self.structure.local_vars() {
            if let Some(w) = var.ty.storage_width() {
                if !fields.iter().any(|f| f.name == var.mangled) {
                    fields.push(AsmField::new(var.mangled.clone(), w));
                }
            }
        }
        AsmStruct { name, fields }
    }

    fn table(&mut self, table: &Table, program: &Program, control: &Control) -> AsmTable {
        self.block = Some(control.name.clone());
        let keys = table
            .keys
            .iter()
            .filter_map(|k| self.operand(&k.expr).map(|o| (o, k.match_kind)))
            .collect();
        let (default_action, default_args) = match &table.default_action {
            Some(default) => {
                let args = self.bound_args(default, program, control, &table.name);
                (default.name.clone(), args)
            }
            None => (NO_ACTION.to_string(), Vec::new()),
        };
        let widths: Vec<u32> = table
            .keys
            .iter()
            .map(|k| k.expr.ty.width().unwrap_or(64))
            .collect();
        let entries = table
            .entries
            .iter()
            .map(|entry| AsmEntry {
                keys: entry
                    .keys
                    .iter()
                    .zip(&widths)
                    .map(|(value, width)| match_value(value, *width))
                    .collect(),
                action: entry.action.name.clone(),
                args: self.bound_args(&entry.action, program, control, &table.name),
                priority: entry.priority,
            })
            .collect();
        AsmTable {
            name: table.name.clone(),
            keys,
            actions: table
                .actions
                .iter()
                .map(|a| (a.name.clone(), a.scope == ActionScope::TableOnly))
                .collect(),
            default_action,
            default_args,
            const_default: table.const_default,
            size: table.size.unwrap_or(DEFAULT_TABLE_SIZE),
            learner: table.add_on_miss,
            entries,
        }
    }

    /// Constant arguments of an action reference, by parameter name
    fn bound_args(
        &mut self,
        action: &ActionRef,
        program: &Program,
        control: &Control,
        table: &str,
    ) -> Vec<(String, u64)> {
        let params: Vec<String> = program
            .action_in(Some(control.name.as_str()), &action.name)
            .map(|a| a.data_params().map(|p| p.name.clone()).collect())
            .unwrap_or_default();
        let mut args = Vec::new();
        for (param, arg) in params.into_iter().zip(&action.args) {
            match self.operand(arg) {
                Some(Operand::Imm(v)) => args.push((param, v)),
                _ => self.diagnostics.error(
                    ErrorKind::Expected,
                    format!(
                        "argument {} of action {} in table {} must be a constant",
                        arg, action.name, table
                    ),
                ),
            }
        }
        args
    }

    fn parser(&mut self, parser: &Parser, out: &mut Vec<AsmStmt>) {
        let prefix = parser.name.to_uppercase();
        let state_label = |state: &str| format!("{}_{}", prefix, state.to_uppercase());
        let accept = state_label("accept");
        let target = |builder: &mut Self, next: &str| match next {
            "accept" => accept.clone(),
            "reject" => {
                builder.drop_used = true;
                DROP_LABEL.to_string()
            }
            other => state_label(other),
        };

        let mut states: Vec<_> = parser.states.iter().collect();
        states.sort_by_key(|s| s.name != "start");
        for state in states {
            out.push(AsmStmt::Label(state_label(&state.name)));
            self.stmts(&state.body, None, out);
            match &state.transition {
                Transition::Accept => out.push(AsmStmt::Jmp(accept.clone())),
                Transition::Reject => {
                    self.drop_used = true;
                    out.push(AsmStmt::Jmp(DROP_LABEL.to_string()));
                }
                Transition::Goto(next) => {
                    let label = target(self, next);
                    out.push(AsmStmt::Jmp(label));
                }
                Transition::Select {
                    expr,
                    cases,
                    default,
                } => {
                    if let Some(selector) = self.operand(expr) {
                        for case in cases {
                            let label = target(self, &case.next);
                            out.push(AsmStmt::JmpCmp {
                                op: CmpOp::Eq,
                                target: label,
                                left: selector.clone(),
                                right: Operand::Imm(case.value),
                            });
                        }
                    }
                    let label = target(self, default);
                    out.push(AsmStmt::Jmp(label));
                }
            }
        }
        out.push(AsmStmt::Label(accept.clone()));
    }

    /// `end` is where `exit` jumps to; `None` inside actions
    fn stmts(&mut self, stmts: &[Stmt], end: Option<&str>, out: &mut Vec<AsmStmt>) {
        for stmt in stmts {
            self.stmt(stmt, end, out);
        }
    }

    fn stmt(&mut self, stmt: &Stmt, end: Option<&str>, out: &mut Vec<AsmStmt>) {
        match stmt {
            Stmt::Assign { lhs, rhs } => self.assign(lhs, rhs, out),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let false_label = self.label("LABEL_FALSE");
                self.branch_unless(cond, &false_label, out);
                self.stmts(then_branch, end, out);
                if else_branch.is_empty() {
                    out.push(AsmStmt::Label(false_label));
                } else {
                    let end_label = self.label("LABEL_END");
                    out.push(AsmStmt::Jmp(end_label.clone()));
                    out.push(AsmStmt::Label(false_label));
                    self.stmts(else_branch, end, out);
                    out.push(AsmStmt::Label(end_label));
                }
            }
            Stmt::Apply(table) => out.push(AsmStmt::Table(table.clone())),
            Stmt::Call(call) => self.call(call, out),
            Stmt::Block(stmts) => self.stmts(stmts, end, out),
            Stmt::Exit | Stmt::Return => match end {
                Some(label) => out.push(AsmStmt::Jmp(label.to_string())),
                None => out.push(AsmStmt::Return),
            },
            Stmt::VarDecl { .. } | Stmt::For { .. } => self.leftover(stmt),
        }
    }

    fn assign(&mut self, lhs: &Expr, rhs: &Expr, out: &mut Vec<AsmStmt>) {
        let Some(dst) = self.operand(lhs) else {
            return;
        };
        if is_condition(rhs) {
            let false_label = self.label("LABEL_FALSE");
            let end_label = self.label("LABEL_END");
            self.branch_unless(rhs, &false_label, out);
            out.push(AsmStmt::Mov {
                dst: dst.clone(),
                src: Operand::Imm(1),
            });
            out.push(AsmStmt::Jmp(end_label.clone()));
            out.push(AsmStmt::Label(false_label));
            out.push(AsmStmt::Mov {
                dst,
                src: Operand::Imm(0),
            });
            out.push(AsmStmt::Label(end_label));
            return;
        }
        match &rhs.kind {
            ExprKind::Binary { op, left, right } => {
                let Some(alu) = alu_op(*op) else {
                    self.leftover(rhs);
                    return;
                };
                let (Some(first), Some(second)) = (self.operand(left), self.operand(right)) else {
                    return;
                };
                if first != dst {
                    out.push(AsmStmt::Mov {
                        dst: dst.clone(),
                        src: first,
                    });
                }
                out.push(AsmStmt::Alu {
                    op: alu,
                    dst,
                    src: second,
                });
            }
            ExprKind::Call(call) if call.method == "read" => {
                let (Some(reg), Some(index)) = (
                    call.target_root().map(str::to_string),
                    call.args.first().and_then(|i| self.operand(i)),
                ) else {
                    self.leftover(rhs);
                    return;
                };
                out.push(AsmStmt::RegRead { dst, reg, index });
            }
            _ => {
                if let Some(src) = self.operand(rhs) {
                    out.push(AsmStmt::Mov { dst, src });
                }
            }
        }
    }

    fn call(&mut self, call: &MethodCall, out: &mut Vec<AsmStmt>) {
        let target_ty = call.target.as_ref().map(|t| &t.ty);
        match (target_ty, call.method.as_str()) {
            (Some(Type::Packet), "extract" | "emit") => {
                let Some(instance) = call.args.first().and_then(header_instance) else {
                    self.leftover(Expr::call(call.clone(), Type::Void));
                    return;
                };
                out.push(if call.method == "extract" {
                    AsmStmt::Extract(instance)
                } else {
                    AsmStmt::Emit(instance)
                });
            }
            (Some(Type::Header(_)), "setValid" | "setInvalid") => {
                let Some(instance) = call.target.as_ref().and_then(header_instance) else {
                    self.leftover(Expr::call(call.clone(), Type::Void));
                    return;
                };
                out.push(if call.method == "setValid" {
                    AsmStmt::Validate(instance)
                } else {
                    AsmStmt::Invalidate(instance)
                });
            }
            (Some(_), method) => self.extern_call(call, method, out),
            (None, "drop_packet") => out.push(AsmStmt::Drop),
            (None, "recirculate") => out.push(AsmStmt::Recirculate),
            (None, "mirror_packet") => {
                let slot = call.args.first().and_then(|a| self.operand(a));
                let session = call.args.get(1).and_then(|a| self.operand(a));
                if let (Some(slot), Some(session)) = (slot, session) {
                    out.push(AsmStmt::Mirror { slot, session });
                }
            }
            (None, "add_entry") => {
                let action = match call.args.first().map(|a| &a.kind) {
                    Some(ExprKind::Str(action)) => action.clone(),
                    _ => {
                        self.leftover(Expr::call(call.clone(), Type::Void));
                        return;
                    }
                };
                let arg = call.args.get(1).and_then(|a| self.operand(a));
                out.push(AsmStmt::Learn { action, arg });
            }
            _ => self.leftover(Expr::call(call.clone(), Type::Void)),
        }
    }

    fn extern_call(&mut self, call: &MethodCall, method: &str, out: &mut Vec<AsmStmt>) {
        let Some(name) = call.target_root().map(str::to_string) else {
            self.leftover(Expr::call(call.clone(), Type::Void));
            return;
        };
        let kind = self.structure.extern_named(&name).map(|e| e.instance.kind.clone());
        match (kind, method) {
            (Some(ExternKind::Register { .. }), "write") => {
                let index = call.args.first().and_then(|a| self.operand(a));
                let src = call.args.get(1).and_then(|a| self.operand(a));
                if let (Some(index), Some(src)) = (index, src) {
                    out.push(AsmStmt::RegWrite {
                        reg: name,
                        index,
                        src,
                    });
                }
            }
            (Some(ExternKind::Counter { .. }), "count") => {
                if let Some(index) = call.args.first().and_then(|a| self.operand(a)) {
                    out.push(AsmStmt::RegAdd {
                        reg: name,
                        index,
                        src: Operand::Imm(1),
                    });
                }
            }
            (Some(ExternKind::DirectCounter), "count") => {
                let index = Operand::Meta(TABLE_ENTRY_INDEX_FIELD.to_string());
                out.push(AsmStmt::EntryId(index.clone()));
                out.push(AsmStmt::RegAdd {
                    reg: name,
                    index,
                    src: Operand::Imm(1),
                });
            }
            _ => self.leftover(Expr::call(call.clone(), Type::Void)),
        }
    }

    fn operand(&mut self, expr: &Expr) -> Option<Operand> {
        let operand = match &expr.kind {
            ExprKind::Const(v) => Some(Operand::Imm(*v)),
            ExprKind::Bool(b) => Some(Operand::Imm(*b as u64)),
            ExprKind::ErrorMember(name) => self.structure.error_code(name).map(Operand::Imm),
            ExprKind::Cast(inner) => return self.operand(inner),
            ExprKind::Member { base, field } => match &base.kind {
                ExprKind::Path(root) if root == METADATA_PARAM => Some(Operand::Meta(field.clone())),
                ExprKind::Path(root) if root == ACTION_ARGS_PARAM => {
                    Some(Operand::ActionArg(field.clone()))
                }
                ExprKind::Member {
                    base: inner,
                    field: instance,
                } if matches!(&inner.kind, ExprKind::Path(root) if root == HEADERS_PARAM) => {
                    Some(Operand::Header {
                        instance: instance.clone(),
                        field: field.clone(),
                    })
                }
                _ => None,
            },
            ExprKind::Path(name) => self
                .block
                .as_deref()
                .and_then(|b| self.structure.local_var(b, name))
                .map(|v| Operand::Meta(v.mangled.clone())),
            _ => None,
        };
        if operand.is_none() {
            self.diagnostics.error(
                ErrorKind::Unsupported,
                format!("{} cannot be an instruction operand", expr),
            );
        }
        operand
    }

    /// Jump to `target` when `cond` holds; fall through otherwise
    fn branch_if(&mut self, cond: &Expr, target: &str, out: &mut Vec<AsmStmt>) {
        match &cond.kind {
            ExprKind::Bool(true) => out.push(AsmStmt::Jmp(target.to_string())),
            ExprKind::Bool(false) => {}
            ExprKind::Unary {
                op: UnaryOp::Not,
                expr,
            } => self.branch_unless(expr, target, out),
            ExprKind::Binary {
                op: BinOp::LAnd,
                left,
                right,
            } => {
                let skip = self.label("LABEL_FALSE");
                self.branch_unless(left, &skip, out);
                self.branch_if(right, target, out);
                out.push(AsmStmt::Label(skip));
            }
            ExprKind::Binary {
                op: BinOp::LOr,
                left,
                right,
            } => {
                self.branch_if(left, target, out);
                self.branch_if(right, target, out);
            }
            ExprKind::Binary { op, left, right } if op.is_comparison() => {
                self.compare(*op, left, right, target, out)
            }
            ExprKind::IsValid(header) => match header_instance(header) {
                Some(header) => out.push(AsmStmt::JmpValid {
                    target: target.to_string(),
                    header,
                }),
                None => self.leftover(cond),
            },
            ExprKind::TableHit { table, hit } => {
                out.push(AsmStmt::Table(table.clone()));
                out.push(if *hit {
                    AsmStmt::JmpHit(target.to_string())
                } else {
                    AsmStmt::JmpMiss(target.to_string())
                });
            }
            _ => {
                if let Some(value) = self.operand(cond) {
                    out.push(AsmStmt::JmpCmp {
                        op: CmpOp::Neq,
                        target: target.to_string(),
                        left: value,
                        right: Operand::Imm(0),
                    });
                }
            }
        }
    }

    /// Jump to `target` when `cond` fails; fall through otherwise
    fn branch_unless(&mut self, cond: &Expr, target: &str, out: &mut Vec<AsmStmt>) {
        match &cond.kind {
            ExprKind::Bool(true) => {}
            ExprKind::Bool(false) => out.push(AsmStmt::Jmp(target.to_string())),
            ExprKind::Unary {
                op: UnaryOp::Not,
                expr,
            } => self.branch_if(expr, target, out),
            ExprKind::Binary {
                op: BinOp::LAnd,
                left,
                right,
            } => {
                self.branch_unless(left, target, out);
                self.branch_unless(right, target, out);
            }
            ExprKind::Binary {
                op: BinOp::LOr,
                left,
                right,
            } => {
                let taken = self.label("LABEL_TRUE");
                self.branch_if(left, &taken, out);
                self.branch_unless(right, target, out);
                out.push(AsmStmt::Label(taken));
            }
            ExprKind::Binary { op, left, right } if op.is_comparison() => match op.negate() {
                Some(negated) => self.compare(negated, left, right, target, out),
                None => self.leftover(cond),
            },
            ExprKind::IsValid(header) => match header_instance(header) {
                Some(header) => out.push(AsmStmt::JmpInvalid {
                    target: target.to_string(),
                    header,
                }),
                None => self.leftover(cond),
            },
            ExprKind::TableHit { table, hit } => {
                out.push(AsmStmt::Table(table.clone()));
                out.push(if *hit {
                    AsmStmt::JmpMiss(target.to_string())
                } else {
                    AsmStmt::JmpHit(target.to_string())
                });
            }
            _ => {
                if let Some(value) = self.operand(cond) {
                    out.push(AsmStmt::JmpCmp {
                        op: CmpOp::Eq,
                        target: target.to_string(),
                        left: value,
                        right: Operand::Imm(0),
                    });
                }
            }
        }
    }

    // The target has no `<=` or `>=` jumps; those take two instructions.
    fn compare(&mut self, op: BinOp, left: &Expr, right: &Expr, target: &str, out: &mut Vec<AsmStmt>) {
        let (Some(mut a), Some(mut b)) = (self.operand(left), self.operand(right)) else {
            return;
        };
        let mut op = op;
        if a.is_imm() && !b.is_imm() {
            std::mem::swap(&mut a, &mut b);
            op = op.mirror();
        }
        let jump = |op: CmpOp| AsmStmt::JmpCmp {
            op,
            target: target.to_string(),
            left: a.clone(),
            right: b.clone(),
        };
        match op {
            BinOp::Eq => out.push(jump(CmpOp::Eq)),
            BinOp::Ne => out.push(jump(CmpOp::Neq)),
            BinOp::Lt => out.push(jump(CmpOp::Lt)),
            BinOp::Gt => out.push(jump(CmpOp::Gt)),
            BinOp::Le => {
                out.push(jump(CmpOp::Lt));
                out.push(jump(CmpOp::Eq));
            }
            BinOp::Ge => {
                out.push(jump(CmpOp::Gt));
                out.push(jump(CmpOp::Eq));
            }
            _ => {}
        }
    }
}

/// Control-plane spelling of a const entry key value
fn match_value(value: &KeySetValue, width: u32) -> String {
    match value {
        KeySetValue::Exact(v) => format!("0x{:x}", v),
        KeySetValue::Mask { value, mask } => format!("0x{:x}/0x{:x}", value, mask),
        KeySetValue::Prefix { value, len } => {
            let width = width.min(64);
            let len = (*len).min(width);
            let mask = if len == 0 {
                0
            } else {
                (u64::MAX >> (64 - len)) << (width - len)
            };
            format!("0x{:x}/0x{:x}", value, mask)
        }
        KeySetValue::Range { lo, hi } => format!("0x{:x}..0x{:x}", lo, hi),
        KeySetValue::Default => "0x0/0x0".to_string(),
    }
}

fn alu_op(op: BinOp) -> Option<AluOp> {
    Some(match op {
        BinOp::Add => AluOp::Add,
        BinOp::Sub => AluOp::Sub,
        BinOp::BitAnd => AluOp::And,
        BinOp::BitOr => AluOp::Or,
        BinOp::BitXor => AluOp::Xor,
        BinOp::Shl => AluOp::Shl,
        BinOp::Shr => AluOp::Shr,
        _ => return None,
    })
}

/// `h.<instance>` to `<instance>`
fn header_instance(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Member { base, field } => match &base.kind {
            ExprKind::Path(root) if root == HEADERS_PARAM => Some(field.clone()),
            _ => None,
        },
        _ => None,
    }
}
