//! Validator passes: read the tree and context, report diagnostics

use crate::arch::{ArchVariant, BlockRole};
use crate::context::ProgramStructure;
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::ir::{
    walk_exprs, walk_stmts, BinOp, BodyKind, Declaration, Direction, Expr, ExprKind, ExternKind,
    Local, MatchKind, Param, Program, Stmt, Transition, Type,
};
use crate::pass::Validator;
use std::collections::{HashMap, HashSet};

/// Widest operand the target ALU accepts
pub const MAX_OPERAND_WIDTH: u32 = 64;

/// Arithmetic and comparison operands must fit the target ALU
pub struct ValidateOperandSize;

impl Validator<Program> for ValidateOperandSize {
    fn name(&self) -> &'static str {
        "ValidateOperandSize"
    }

    fn validate(&self, program: &Program, _: &ProgramStructure, diagnostics: &mut Diagnostics) {
        program.exprs(&mut |root| {
            root.walk(&mut |e| {
                if let ExprKind::Binary { op, left, right } = &e.kind {
                    if *op == BinOp::Concat || op.is_logical() {
                        return;
                    }
                    for operand in [left, right] {
                        if let Some(width) = operand.ty.width() {
                            if width > MAX_OPERAND_WIDTH {
                                diagnostics.error(
                                    ErrorKind::Overlimit,
                                    format!(
                                        "operand {} of {} is {} bits wide; at most {} bits are supported",
                                        operand, e, width, MAX_OPERAND_WIDTH
                                    ),
                                );
                            }
                        }
                    }
                }
            });
        });
    }
}

/// Checks references and types after every structural change
pub struct TypeCheck;

struct Checker<'a, 'd> {
    program: &'a Program,
    owner: String,
    vars: HashMap<String, Type>,
    tables: HashSet<String>,
    diagnostics: &'d mut Diagnostics,
}

impl Checker<'_, '_> {
    fn report(&mut self, kind: ErrorKind, message: String) {
        self.diagnostics
            .error(kind, format!("{}: {}", self.owner, message));
    }

    fn check_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                self.check_expr(lhs);
                self.check_expr(rhs);
                let assignable = lhs.is_lvalue() || matches!(lhs.kind, ExprKind::Slice { .. });
                if !assignable {
                    self.report(ErrorKind::Type, format!("{} is not assignable", lhs));
                }
                if !compatible(&lhs.ty, &rhs.ty) {
                    self.report(
                        ErrorKind::Type,
                        format!("cannot assign {} ({}) to {} ({})", rhs, rhs.ty, lhs, lhs.ty),
                    );
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond);
                if cond.ty != Type::Bool {
                    self.report(
                        ErrorKind::Type,
                        format!("condition {} has type {}", cond, cond.ty),
                    );
                }
                self.check_stmts(then_branch);
                self.check_stmts(else_branch);
            }
            Stmt::Apply(table) => {
                if !self.tables.contains(table) {
                    self.report(ErrorKind::NotFound, format!("no table {}", table));
                }
            }
            Stmt::Call(call) => {
                call.target.iter().for_each(|t| self.check_expr(t));
                call.args.iter().for_each(|a| self.check_expr(a));
            }
            Stmt::VarDecl { name, ty, init } => {
                if let Some(init) = init {
                    self.check_expr(init);
                }
                self.vars.insert(name.clone(), ty.clone());
            }
            Stmt::For {
                var,
                ty,
                start,
                end,
                body,
            } => {
                self.check_expr(start);
                self.check_expr(end);
                self.vars.insert(var.clone(), ty.clone());
                self.check_stmts(body);
            }
            Stmt::Block(body) => self.check_stmts(body),
            Stmt::Exit | Stmt::Return => {}
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        for child in expr.children() {
            self.check_expr(child);
        }
        match &expr.kind {
            ExprKind::Path(name) => {
                if !self.vars.contains_key(name) {
                    self.report(ErrorKind::NotFound, format!("unknown variable {}", name));
                }
            }
            ExprKind::Member { base, field } => self.check_member(base, field, &expr.ty),
            ExprKind::Binary { op, left, right } => {
                let ok = match op {
                    BinOp::LAnd | BinOp::LOr => left.ty == Type::Bool && right.ty == Type::Bool,
                    BinOp::Shl | BinOp::Shr | BinOp::Concat => true,
                    _ => compatible(&left.ty, &right.ty),
                };
                if !ok {
                    self.report(
                        ErrorKind::Type,
                        format!("operands of {} have types {} and {}", expr, left.ty, right.ty),
                    );
                }
            }
            ExprKind::TableHit { table, .. } => {
                if !self.tables.contains(table) {
                    self.report(ErrorKind::NotFound, format!("no table {}", table));
                }
            }
            _ => {}
        }
    }

    fn check_member(&mut self, base: &Expr, field: &str, ty: &Type) {
        let declared = match &base.ty {
            Type::Header(name) => match self.program.header_type(name) {
                Some(h) => h.field(field).map(|f| f.ty.clone()),
                None => {
                    self.report(ErrorKind::NotFound, format!("no header type {}", name));
                    return;
                }
            },
            Type::Struct(name) => match self.program.struct_type(name) {
                Some(s) => s.field(field).map(|f| f.ty.clone()),
                // Built-in and action data structs are not declared.
                None => return,
            },
            _ => return,
        };
        match declared {
            Some(declared) if compatible(&declared, ty) => {}
            Some(declared) => self.report(
                ErrorKind::Type,
                format!("{}.{} is {} but used as {}", base, field, declared, ty),
            ),
            None => self.report(
                ErrorKind::NotFound,
                format!("{} has no field {}", base.ty, field),
            ),
        }
    }
}

/// Scalars are compatible at equal width; everything else by equality
fn compatible(a: &Type, b: &Type) -> bool {
    if a.is_scalar() && b.is_scalar() {
        a.width() == b.width()
    } else {
        a == b
    }
}

fn param_vars(params: &[Param]) -> impl Iterator<Item = (String, Type)> + '_ {
    params.iter().map(|p| (p.name.clone(), p.ty.clone()))
}

fn local_vars(locals: &[Local]) -> impl Iterator<Item = (String, Type)> + '_ {
    locals.iter().filter_map(|l| match l {
        Local::Var { name, ty } => Some((name.clone(), ty.clone())),
        Local::Extern(e) => Some((e.name.clone(), Type::Extern(e.kind.type_name().into()))),
        _ => None,
    })
}

impl Validator<Program> for TypeCheck {
    fn name(&self) -> &'static str {
        "TypeCheck"
    }

    fn validate(&self, program: &Program, _: &ProgramStructure, diagnostics: &mut Diagnostics) {
        for decl in &program.declarations {
            match decl {
                Declaration::Action(action) => {
                    let mut checker = Checker {
                        program,
                        owner: action.name.clone(),
                        vars: param_vars(&action.params).collect(),
                        tables: HashSet::new(),
                        diagnostics: &mut *diagnostics,
                    };
                    checker.vars.insert("t".into(), Type::Struct(format!("{}_arg_t", action.name)));
                    checker.check_stmts(&action.body);
                }
                Declaration::Parser(parser) => {
                    let mut checker = Checker {
                        program,
                        owner: parser.name.clone(),
                        vars: param_vars(&parser.params)
                            .chain(local_vars(&parser.locals))
                            .collect(),
                        tables: HashSet::new(),
                        diagnostics: &mut *diagnostics,
                    };
                    for state in &parser.states {
                        checker.check_stmts(&state.body);
                        if let Transition::Select { expr, .. } = &state.transition {
                            checker.check_expr(expr);
                        }
                    }
                }
                Declaration::Control(control) => {
                    let block_vars: HashMap<String, Type> = param_vars(&control.params)
                        .chain(local_vars(&control.locals))
                        .collect();
                    let tables: HashSet<String> =
                        control.tables().map(|t| t.name.clone()).collect();
                    for action in control.actions() {
                        let mut checker = Checker {
                            program,
                            owner: format!("{}.{}", control.name, action.name),
                            vars: block_vars.clone(),
                            tables: tables.clone(),
                            diagnostics: &mut *diagnostics,
                        };
                        checker.vars.extend(param_vars(&action.params));
                        checker
                            .vars
                            .insert("t".into(), Type::Struct(format!("{}_arg_t", action.name)));
                        checker.check_stmts(&action.body);
                    }
                    let mut checker = Checker {
                        program,
                        owner: control.name.clone(),
                        vars: block_vars,
                        tables,
                        diagnostics: &mut *diagnostics,
                    };
                    for table in control.tables() {
                        for key in &table.keys {
                            checker.check_expr(&key.expr);
                        }
                        for action in &table.actions {
                            if program.action_in(Some(control.name.as_str()), &action.name).is_none() {
                                checker.report(
                                    ErrorKind::NotFound,
                                    format!("table {} lists unknown action {}", table.name, action.name),
                                );
                            }
                        }
                    }
                    checker.check_stmts(&control.body);
                }
                _ => {}
            }
        }
    }
}

/// `add_entry` is only legal in the default action of a learner table
pub struct ValidateAddOnMissExterns;

impl Validator<Program> for ValidateAddOnMissExterns {
    fn name(&self) -> &'static str {
        "ValidateAddOnMissExterns"
    }

    fn validate(&self, program: &Program, structure: &ProgramStructure, diagnostics: &mut Diagnostics) {
        program.bodies(&mut |scope, body| {
            walk_stmts(body, &mut |stmt| {
                if let Stmt::Call(call) = stmt {
                    if call.target.is_none() && call.method == "add_entry" {
                        let allowed = scope.kind == BodyKind::Action
                            && structure.is_learner_action(&scope.name);
                        if !allowed {
                            diagnostics.error(
                                ErrorKind::Unsupported,
                                format!(
                                    "add_entry in {} may only be called from the default action of an add_on_miss table",
                                    scope.name
                                ),
                            );
                        }
                    }
                }
            });
        });
        for table in structure.learner_tables() {
            if table.default_action.is_none() {
                diagnostics.error(
                    ErrorKind::Expected,
                    format!("add_on_miss table {} needs a default action", table.name),
                );
            }
            for key in &table.keys {
                if key.match_kind != MatchKind::Exact {
                    diagnostics.error(
                        ErrorKind::Invalid,
                        format!(
                            "add_on_miss table {} only supports exact keys; {} is {}",
                            table.name, key.name, key.match_kind
                        ),
                    );
                }
            }
        }
    }
}

/// Direct counters are attached to one table and counted from its actions
pub struct ValidateDirectCounterMeter;

impl Validator<Program> for ValidateDirectCounterMeter {
    fn name(&self) -> &'static str {
        "ValidateDirectCounterMeter"
    }

    fn validate(&self, program: &Program, structure: &ProgramStructure, diagnostics: &mut Diagnostics) {
        for info in structure.externs() {
            if info.instance.kind == ExternKind::DirectCounter
                && structure.direct_resource_table(&info.instance.name).is_none()
            {
                diagnostics.error(
                    ErrorKind::Expected,
                    format!(
                        "direct counter {} is not attached to any table",
                        info.instance.name
                    ),
                );
            }
        }
        program.bodies(&mut |scope, body| {
            walk_stmts(body, &mut |stmt| {
                let Stmt::Call(call) = stmt else { return };
                let Some(counter) = call.target_root() else { return };
                let is_direct = structure
                    .extern_named(counter)
                    .map(|e| e.instance.kind == ExternKind::DirectCounter)
                    .unwrap_or(false);
                if !is_direct {
                    return;
                }
                let owner = structure
                    .direct_resource_table(counter)
                    .and_then(|t| structure.table(t));
                let allowed = scope.kind == BodyKind::Action
                    && owner.map(|t| t.actions.iter().any(|a| a.name == scope.name)).unwrap_or(false);
                if !allowed {
                    diagnostics.error(
                        ErrorKind::Invalid,
                        format!(
                            "direct counter {} may only be counted from an action of its table, not from {}",
                            counter, scope.name
                        ),
                    );
                }
            });
        });
    }
}

/// Constructs the target cannot express
pub struct InspectDpdkProgram;

impl Validator<Program> for InspectDpdkProgram {
    fn name(&self) -> &'static str {
        "InspectDpdkProgram"
    }

    fn validate(&self, program: &Program, structure: &ProgramStructure, diagnostics: &mut Diagnostics) {
        for control in program.controls() {
            for table in control.tables() {
                let mut lpm = 0;
                for key in &table.keys {
                    match key.match_kind {
                        MatchKind::Range | MatchKind::Selector => diagnostics.error(
                            ErrorKind::Unsupported,
                            format!(
                                "{} match on key {} of table {} is not supported",
                                key.match_kind, key.name, table.name
                            ),
                        ),
                        MatchKind::Lpm => lpm += 1,
                        _ => {}
                    }
                }
                if lpm > 1 {
                    diagnostics.error(
                        ErrorKind::Unsupported,
                        format!("table {} has {} lpm keys; at most one is supported", table.name, lpm),
                    );
                }
            }
            for local in &control.locals {
                if let Local::Var { name, ty: Type::Header(_) | Type::Struct(_) } = local {
                    diagnostics.error(
                        ErrorKind::Unsupported,
                        format!("{}: header or struct variable {} is not supported", control.name, name),
                    );
                }
            }
            if structure.is_pipeline_control(&control.name) {
                for action in control.actions() {
                    if action.params.iter().any(|p| p.direction != Direction::None) {
                        diagnostics.error(
                            ErrorKind::Unsupported,
                            format!("action {} has directional parameters", action.name),
                        );
                    }
                }
            }
        }

        if structure.arch() == ArchVariant::Psa {
            let egress = structure.block(BlockRole::Egress);
            if let Some(control) = egress.and_then(|name| program.control(name)) {
                if !control.body.is_empty() {
                    diagnostics.warning(
                        ErrorKind::Unsupported,
                        format!("egress control {} is ignored by the target", control.name),
                    );
                }
            }
        }

        program.bodies(&mut |scope, body| {
            walk_stmts(body, &mut |stmt| {
                if let Stmt::Assign { lhs, .. } = stmt {
                    if matches!(lhs.kind, ExprKind::Slice { .. }) {
                        diagnostics.error(
                            ErrorKind::Unsupported,
                            format!("assignment to a bit slice {} is not supported", lhs),
                        );
                    }
                }
                if scope.kind == BodyKind::Action && matches!(stmt, Stmt::Apply(_)) {
                    diagnostics.error(
                        ErrorKind::Unsupported,
                        format!("table applied inside action {}", scope.name),
                    );
                }
                if let Stmt::If { cond, .. } = stmt {
                    let mut hits = 0;
                    cond.walk(&mut |e| {
                        if matches!(e.kind, ExprKind::TableHit { .. }) {
                            hits += 1;
                        }
                    });
                    if hits > 1 {
                        diagnostics.error(
                            ErrorKind::Unsupported,
                            format!("condition {} applies more than one table", cond),
                        );
                    }
                }
            });
            walk_exprs(body, &mut |root| {
                root.walk(&mut |e| {
                    if let ExprKind::Binary { op: BinOp::Mul, .. } = e.kind {
                        diagnostics.error(
                            ErrorKind::Unsupported,
                            format!("multiplication {} is not supported", e),
                        );
                    }
                    if scope.kind == BodyKind::Action && matches!(e.kind, ExprKind::TableHit { .. }) {
                        diagnostics.error(
                            ErrorKind::Unsupported,
                            format!("table applied inside action {}", scope.name),
                        );
                    }
                });
            });
        });
    }
}

/// Extern functions available per architecture and block role
pub struct CheckExternInvocation;

const PNA_FREE_FUNCTIONS: &[&str] = &["drop_packet", "recirculate", "mirror_packet", "add_entry"];

impl Validator<Program> for CheckExternInvocation {
    fn name(&self) -> &'static str {
        "CheckExternInvocation"
    }

    fn validate(&self, program: &Program, structure: &ProgramStructure, diagnostics: &mut Diagnostics) {
        let arch = structure.arch();
        program.bodies(&mut |scope, body| {
            let role = scope.block.as_deref().and_then(|b| structure.role_of(b));
            walk_stmts(body, &mut |stmt| {
                let Stmt::Call(call) = stmt else { return };
                let target_ty = call.target.as_ref().map(|t| &t.ty);
                match target_ty {
                    Some(Type::Packet) => {
                        let allowed = match call.method.as_str() {
                            "extract" => role.map(|r| r.is_parser()).unwrap_or(false),
                            "emit" => role.map(|r| r.is_deparser()).unwrap_or(false),
                            _ => false,
                        };
                        if !allowed {
                            diagnostics.error(
                                ErrorKind::Unsupported,
                                format!("packet.{} is not allowed in {}", call.method, scope.name),
                            );
                        }
                    }
                    Some(Type::Header(_)) => {
                        if !matches!(call.method.as_str(), "setValid" | "setInvalid") {
                            diagnostics.error(
                                ErrorKind::Unsupported,
                                format!("unknown header method {}", call.method),
                            );
                        }
                    }
                    Some(Type::Extern(kind)) => {
                        if !role.map(|r| r.is_pipeline()).unwrap_or(scope.block.is_none()) {
                            diagnostics.error(
                                ErrorKind::Unsupported,
                                format!("{}.{} may only be called from a control", kind, call.method),
                            );
                        }
                    }
                    Some(other) => diagnostics.error(
                        ErrorKind::Unsupported,
                        format!("method {} on a value of type {}", call.method, other),
                    ),
                    None => {
                        let method = call.method.as_str();
                        if !PNA_FREE_FUNCTIONS.contains(&method) {
                            diagnostics.error(
                                ErrorKind::Unsupported,
                                format!("unknown extern function {}", method),
                            );
                        } else if arch != ArchVariant::Pna {
                            diagnostics.error(
                                ErrorKind::Unsupported,
                                format!("{} is not available for {}", method, arch),
                            );
                        } else if role.map(|r| !r.is_pipeline()).unwrap_or(false) {
                            diagnostics.error(
                                ErrorKind::Unsupported,
                                format!("{} may only be called from a control", method),
                            );
                        }
                    }
                }
            });
        });
    }
}

/// Field widths the target can store
pub struct TypeWidthValidator;

impl Validator<Program> for TypeWidthValidator {
    fn name(&self) -> &'static str {
        "TypeWidthValidator"
    }

    fn validate(&self, program: &Program, structure: &ProgramStructure, diagnostics: &mut Diagnostics) {
        if let Some(meta) = structure.metadata_type().and_then(|m| program.struct_type(m)) {
            for field in &meta.fields {
                if let Some(width) = field.ty.width() {
                    if width > MAX_OPERAND_WIDTH {
                        diagnostics.error(
                            ErrorKind::Overlimit,
                            format!(
                                "metadata field {} is {} bits wide; at most {} bits are supported",
                                field.name, width, MAX_OPERAND_WIDTH
                            ),
                        );
                    }
                }
            }
        }
        for decl in &program.declarations {
            if let Declaration::Header(h) = decl {
                if h.width() % 8 != 0 {
                    diagnostics.error(
                        ErrorKind::Invalid,
                        format!("header {} is {} bits wide, not a whole number of bytes", h.name, h.width()),
                    );
                }
            }
        }
    }
}
