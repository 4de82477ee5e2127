//! # Architecture Context
//!
//! Facts accumulated by the collector passes and read by the lowering passes,
//! the converter and the context artifact generator. Every `record_*` method
//! is an upsert keyed by declaration name, so re-running a collector on an
//! unchanged tree leaves the structure equal to what it was.

use crate::arch::{ArchVariant, BlockRole};
use crate::ir::{
    ActionRef, Expr, ExternInstance, Field, HeaderType, MatchKind, PackageInstance, StructType,
    TableAction, TableEntry, Type,
};
use std::collections::{BTreeMap, BTreeSet};

/// Field of the consolidated key record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    /// Field name inside the metadata struct
    pub name: String,
    /// Field type
    pub ty: Type,
    /// Original key expression the field holds a copy of
    pub expr: Expr,
}

/// The single aggregate record all table keys are copied into
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyStruct {
    /// Fields in insertion order
    pub fields: Vec<KeyField>,
}

impl KeyStruct {
    /// Field holding `expr` at `ty`, if one exists
    pub fn find(&self, expr: &Expr, ty: &Type) -> Option<&KeyField> {
        self.fields.iter().find(|f| &f.expr == expr && &f.ty == ty)
    }

    /// Field by name
    pub fn field(&self, name: &str) -> Option<&KeyField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Bit offset of a field in the record
    pub fn offset_of(&self, name: &str) -> Option<u32> {
        let mut offset = 0;
        for f in &self.fields {
            if f.name == name {
                return Some(offset);
            }
            offset += f.ty.storage_width().unwrap_or(0);
        }
        None
    }
}

/// Match key as recorded for a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKeyInfo {
    /// Control-plane name
    pub name: String,
    /// Expression as declared
    pub expr: Expr,
    /// Key type
    pub ty: Type,
    /// Match kind
    pub match_kind: MatchKind,
    /// Key record field this key was consolidated into
    pub target: Option<String>,
}

/// Table facts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Enclosing control
    pub control: String,
    /// Table name
    pub name: String,
    /// Keys in declared order
    pub keys: Vec<TableKeyInfo>,
    /// Permitted actions
    pub actions: Vec<TableAction>,
    /// Default action
    pub default_action: Option<ActionRef>,
    /// Default action cannot be changed at run time
    pub const_default: bool,
    /// Declared size
    pub size: Option<u64>,
    /// Const entries
    pub entries: Vec<TableEntry>,
    /// Learner table (`add_on_miss`)
    pub learner: bool,
    /// Attached direct counter
    pub direct_counter: Option<String>,
}

/// Block-local variable flattened into the metadata struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    /// Declaring block
    pub block: String,
    /// Name in the block
    pub name: String,
    /// Name of the metadata field
    pub mangled: String,
    /// Type
    pub ty: Type,
}

/// Extern instance and where it is declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternInfo {
    /// Declaring block
    pub block: String,
    /// The instance
    pub instance: ExternInstance,
}

/// Action data layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionArgs {
    /// Action name
    pub action: String,
    /// Data parameters in declared order
    pub params: Vec<Field>,
}

impl ActionArgs {
    /// Name of the argument struct in assembly
    pub fn struct_name(&self) -> String {
        format!("{}_arg_t", self.action)
    }
}

/// Cross-pass architecture facts for one compilation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramStructure {
    arch: ArchVariant,
    package: Option<PackageInstance>,
    blocks: BTreeMap<BlockRole, String>,
    pipeline_controls: BTreeSet<String>,
    header_types: BTreeMap<String, HeaderType>,
    struct_types: BTreeMap<String, StructType>,
    header_instances: Vec<(String, String)>,
    headers_type: Option<String>,
    metadata_type: Option<String>,
    compiler_added_fields: Vec<Field>,
    key_struct: KeyStruct,
    consolidated_tables: BTreeSet<String>,
    tables: Vec<TableInfo>,
    learner_actions: BTreeSet<String>,
    local_vars: Vec<LocalVar>,
    error_codes: Vec<String>,
    externs: Vec<ExternInfo>,
    direct_resources: BTreeMap<String, String>,
    action_args: Vec<ActionArgs>,
}

impl ProgramStructure {
    /// Empty structure for a variant
    pub fn new(arch: ArchVariant) -> Self {
        Self {
            arch,
            ..Self::default()
        }
    }

    /// Active architecture
    pub fn arch(&self) -> ArchVariant {
        self.arch
    }

    // Package and blocks

    /// Record the main package instance
    pub fn record_package(&mut self, package: PackageInstance) {
        self.package = Some(package);
    }

    /// Main package instance
    pub fn package(&self) -> Option<&PackageInstance> {
        self.package.as_ref()
    }

    /// Bind a block to a role
    pub fn record_block(&mut self, role: BlockRole, name: impl Into<String>) {
        let name = name.into();
        if role.is_pipeline() {
            self.pipeline_controls.insert(name.clone());
        }
        self.blocks.insert(role, name);
    }

    /// Block bound to a role
    pub fn block(&self, role: BlockRole) -> Option<&str> {
        self.blocks.get(&role).map(String::as_str)
    }

    /// Bound blocks in package order
    pub fn blocks(&self) -> impl Iterator<Item = (BlockRole, &str)> {
        self.arch
            .roles()
            .iter()
            .filter_map(|role| self.block(*role).map(|name| (*role, name)))
    }

    /// Role of a block
    pub fn role_of(&self, name: &str) -> Option<BlockRole> {
        self.blocks
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(r, _)| *r)
    }

    /// Whether `name` is a match-action stage
    pub fn is_pipeline_control(&self, name: &str) -> bool {
        self.pipeline_controls.contains(name)
    }

    /// Match-action stages
    pub fn pipeline_controls(&self) -> impl Iterator<Item = &str> {
        self.pipeline_controls.iter().map(String::as_str)
    }

    // Types and instances

    /// Record a header type
    pub fn record_header_type(&mut self, header: HeaderType) {
        self.header_types.insert(header.name.clone(), header);
    }

    /// Header type by name
    pub fn header_type(&self, name: &str) -> Option<&HeaderType> {
        self.header_types.get(name)
    }

    /// Header types by name
    pub fn header_types(&self) -> impl Iterator<Item = &HeaderType> {
        self.header_types.values()
    }

    /// Record a struct type
    pub fn record_struct_type(&mut self, st: StructType) {
        self.struct_types.insert(st.name.clone(), st);
    }

    /// Struct type by name
    pub fn struct_type(&self, name: &str) -> Option<&StructType> {
        self.struct_types.get(name)
    }

    /// Record a header instance of the headers struct
    pub fn record_header_instance(&mut self, name: impl Into<String>, ty: impl Into<String>) {
        let name = name.into();
        let ty = ty.into();
        match self.header_instances.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = ty,
            None => self.header_instances.push((name, ty)),
        }
    }

    /// Header instances `(name, header type)` in declaration order
    pub fn header_instances(&self) -> &[(String, String)] {
        &self.header_instances
    }

    /// Record the headers struct type
    pub fn record_headers_type(&mut self, name: impl Into<String>) {
        self.headers_type = Some(name.into());
    }

    /// Headers struct type
    pub fn headers_type(&self) -> Option<&str> {
        self.headers_type.as_deref()
    }

    /// Record the user metadata struct type
    pub fn record_metadata_type(&mut self, name: impl Into<String>) {
        self.metadata_type = Some(name.into());
    }

    /// User metadata struct type
    pub fn metadata_type(&self) -> Option<&str> {
        self.metadata_type.as_deref()
    }

    /// Record a field the compiler adds to the metadata struct
    pub fn record_compiler_added_field(&mut self, field: Field) {
        if !self.compiler_added_fields.iter().any(|f| f.name == field.name) {
            self.compiler_added_fields.push(field);
        }
    }

    /// Fields added to the metadata struct by the compiler
    pub fn compiler_added_fields(&self) -> &[Field] {
        &self.compiler_added_fields
    }

    // Key consolidation

    /// The consolidated key record
    pub fn key_struct(&self) -> &KeyStruct {
        &self.key_struct
    }

    pub(crate) fn key_struct_mut(&mut self) -> &mut KeyStruct {
        &mut self.key_struct
    }

    /// Mark a table consolidated; false if it already was
    pub fn mark_consolidated(&mut self, table: &str) -> bool {
        self.consolidated_tables.insert(table.to_string())
    }

    /// Whether a table's keys were consolidated
    pub fn is_consolidated(&self, table: &str) -> bool {
        self.consolidated_tables.contains(table)
    }

    // Tables

    /// Record a table; consolidation targets already set on its keys survive
    pub fn record_table(&mut self, mut info: TableInfo) {
        match self.tables.iter_mut().find(|t| t.name == info.name) {
            Some(existing) => {
                for (new_key, old_key) in info.keys.iter_mut().zip(&existing.keys) {
                    if new_key.target.is_none() {
                        new_key.target = old_key.target.clone();
                    }
                }
                if info.direct_counter.is_none() {
                    info.direct_counter = existing.direct_counter.clone();
                }
                *existing = info;
            }
            None => self.tables.push(info),
        }
    }

    /// Tables in declaration order
    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    /// Table by name
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Option<&mut TableInfo> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    /// Mark a table as a learner
    pub fn record_learner_table(&mut self, name: &str) {
        if let Some(t) = self.table_mut(name) {
            t.learner = true;
        }
    }

    /// Record an action that may call `add_entry`
    pub fn record_learner_action(&mut self, name: impl Into<String>) {
        self.learner_actions.insert(name.into());
    }

    /// Whether an action is the default action of a learner table
    pub fn is_learner_action(&self, name: &str) -> bool {
        self.learner_actions.contains(name)
    }

    /// Learner tables
    pub fn learner_tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.iter().filter(|t| t.learner)
    }

    // Variables, errors, externs

    /// Record a block-local variable
    pub fn record_local_var(&mut self, var: LocalVar) {
        match self
            .local_vars
            .iter_mut()
            .find(|v| v.block == var.block && v.name == var.name)
        {
            Some(existing) => *existing = var,
            None => self.local_vars.push(var),
        }
    }

    /// Local variable of a block
    pub fn local_var(&self, block: &str, name: &str) -> Option<&LocalVar> {
        self.local_vars
            .iter()
            .find(|v| v.block == block && v.name == name)
    }

    /// All local variables
    pub fn local_vars(&self) -> &[LocalVar] {
        &self.local_vars
    }

    /// Record an error name; returns its code
    pub fn record_error(&mut self, name: &str) -> u64 {
        match self.error_code(name) {
            Some(code) => code,
            None => {
                self.error_codes.push(name.to_string());
                (self.error_codes.len() - 1) as u64
            }
        }
    }

    /// Code of an error name
    pub fn error_code(&self, name: &str) -> Option<u64> {
        self.error_codes
            .iter()
            .position(|e| e == name)
            .map(|p| p as u64)
    }

    /// Error names in code order
    pub fn errors(&self) -> &[String] {
        &self.error_codes
    }

    /// Record an extern instance
    pub fn record_extern(&mut self, info: ExternInfo) {
        match self
            .externs
            .iter_mut()
            .find(|e| e.instance.name == info.instance.name)
        {
            Some(existing) => *existing = info,
            None => self.externs.push(info),
        }
    }

    /// Extern instances in declaration order
    pub fn externs(&self) -> &[ExternInfo] {
        &self.externs
    }

    /// Extern instance by name
    pub fn extern_named(&self, name: &str) -> Option<&ExternInfo> {
        self.externs.iter().find(|e| e.instance.name == name)
    }

    /// Attach a direct resource to its table
    pub fn record_direct_resource(&mut self, resource: &str, table: &str) {
        self.direct_resources
            .insert(resource.to_string(), table.to_string());
        if let Some(t) = self.table_mut(table) {
            t.direct_counter = Some(resource.to_string());
        }
    }

    /// Table owning a direct resource
    pub fn direct_resource_table(&self, resource: &str) -> Option<&str> {
        self.direct_resources.get(resource).map(String::as_str)
    }

    /// Whether the program uses any direct resource
    pub fn has_direct_resources(&self) -> bool {
        !self.direct_resources.is_empty()
    }

    /// Record an action's data layout
    pub fn record_action_args(&mut self, args: ActionArgs) {
        match self
            .action_args
            .iter_mut()
            .find(|a| a.action == args.action)
        {
            Some(existing) => *existing = args,
            None => self.action_args.push(args),
        }
    }

    /// Data layout of an action
    pub fn action_args(&self, action: &str) -> Option<&ActionArgs> {
        self.action_args.iter().find(|a| a.action == action)
    }
}
