//! Context artifact
//!
//! The control plane needs to know, per table, how its keys are laid out in
//! the key record, which actions it accepts and how their parameters are
//! packed. [`ContextGenerator`] derives that document from a snapshot of the
//! [`ProgramStructure`].
//!
//! ## Format
//! ```json
//! {
//!   "schema_version": "0.1",
//!   "target": "DPDK",
//!   "program_name": "l2fwd",
//!   "build_date": "Sat Oct 17 12:00:00 2026",
//!   "tables": [ { "name": "ingress.fwd", "handle": 65536, ... } ],
//!   "externs": [ { "name": "cnt", "type": "Counter", "size": 1024 } ]
//! }
//! ```
//!
//! Names are the ones in effect when the snapshot is taken. The artifact is
//! produced before identifier shortening, so it keeps the long names even
//! when the assembly and table configuration use shortened ones.

use crate::backend::BackendOptions;
use crate::context::{ProgramStructure, TableInfo};
use crate::error::Result;
use crate::ir::{ActionScope, ExternKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the document layout
pub const SCHEMA_VERSION: &str = "0.1";

/// First table handle
pub const TABLE_HANDLE_BASE: u32 = 0x0001_0000;

/// First action handle
pub const ACTION_HANDLE_BASE: u32 = 0x0002_0000;

/// Top-level document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextJson {
    /// Layout version
    pub schema_version: String,
    /// Always `DPDK`
    pub target: String,
    /// Program name
    pub program_name: String,
    /// Generation time
    pub build_date: String,
    /// Command line that produced the artifact
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compile_command: String,
    /// Backend version
    pub compiler_version: String,
    /// Tables in declaration order
    pub tables: Vec<ContextTable>,
    /// Extern instances
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub externs: Vec<ContextExtern>,
}

/// One table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTable {
    /// `<control>.<table>`
    pub name: String,
    /// Name in the assembly
    pub target_name: String,
    /// Control-plane handle
    pub handle: u32,
    /// `match` or `learner`
    pub table_type: String,
    /// Entry capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Keys in declared order
    pub match_key_fields: Vec<MatchKeyField>,
    /// Permitted actions
    pub actions: Vec<ContextAction>,
    /// Default action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_action: Option<DefaultAction>,
    /// Default action cannot be changed
    pub is_const_default: bool,
}

/// Key position in the key record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchKeyField {
    /// Control-plane key name
    pub name: String,
    /// Field of the key record
    pub field_name: String,
    /// `exact`, `lpm`, `ternary`, ...
    pub match_type: String,
    /// Offset in the key record
    pub start_bit: u32,
    /// Width in bits
    pub bit_width: u32,
    /// Position among the table's keys
    pub position: usize,
}

/// Action as seen by one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAction {
    /// Action name
    pub name: String,
    /// Control-plane handle
    pub handle: u32,
    /// May be installed as an entry action
    pub allowed_as_hit_action: bool,
    /// May be installed as the default action
    pub allowed_as_default_action: bool,
    /// Data parameters packed in declared order
    pub p4_parameters: Vec<ActionParameter>,
}

/// Packed action parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParameter {
    /// Parameter name
    pub name: String,
    /// Offset in the argument struct
    pub start_bit: u32,
    /// Width in bits
    pub bit_width: u32,
    /// Position in the parameter list
    pub position: usize,
}

/// Default action and its bound arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultAction {
    /// Action name
    pub name: String,
    /// Action handle
    pub handle: u32,
    /// Constant argument values by parameter name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, u64>,
}

/// Extern instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextExtern {
    /// Instance name
    pub name: String,
    /// Extern type
    #[serde(rename = "type")]
    pub type_name: String,
    /// Array size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Owning table of a direct resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl ContextJson {
    /// Pretty-printed JSON text
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds [`ContextJson`] documents
pub struct ContextGenerator<'a> {
    program_name: &'a str,
    compile_command: &'a str,
}

impl<'a> ContextGenerator<'a> {
    /// Generator for the configured program
    pub fn new(options: &'a BackendOptions) -> Self {
        Self {
            program_name: &options.program_name,
            compile_command: &options.compile_command,
        }
    }

    /// Document for the current state of `structure`
    pub fn generate(&self, structure: &ProgramStructure, build_date: DateTime<Utc>) -> ContextJson {
        let mut action_handles: BTreeMap<String, u32> = BTreeMap::new();
        let tables = structure
            .tables()
            .iter()
            .enumerate()
            .map(|(n, table)| table_entry(structure, table, n as u32, &mut action_handles))
            .collect();

        let externs = structure
            .externs()
            .iter()
            .map(|info| ContextExtern {
                name: info.instance.name.clone(),
                type_name: info.instance.kind.type_name().to_string(),
                size: match &info.instance.kind {
                    ExternKind::Counter { size } | ExternKind::Register { size, .. } => Some(*size),
                    ExternKind::DirectCounter => None,
                },
                table: structure
                    .direct_resource_table(&info.instance.name)
                    .map(str::to_string),
            })
            .collect();

        ContextJson {
            schema_version: SCHEMA_VERSION.to_string(),
            target: "DPDK".to_string(),
            program_name: self.program_name.to_string(),
            build_date: build_date.format("%a %b %e %H:%M:%S %Y").to_string(),
            compile_command: self.compile_command.to_string(),
            compiler_version: env!("CARGO_PKG_VERSION").to_string(),
            tables,
            externs,
        }
    }
}

fn action_handle(handles: &mut BTreeMap<String, u32>, action: &str) -> u32 {
    let next = ACTION_HANDLE_BASE + handles.len() as u32;
    *handles.entry(action.to_string()).or_insert(next)
}

fn table_entry(
    structure: &ProgramStructure,
    table: &TableInfo,
    n: u32,
    handles: &mut BTreeMap<String, u32>,
) -> ContextTable {
    let key_struct = structure.key_struct();
    let match_key_fields = table
        .keys
        .iter()
        .enumerate()
        .map(|(position, key)| {
            let field_name = key.target.clone().unwrap_or_else(|| key.name.clone());
            MatchKeyField {
                name: key.name.clone(),
                start_bit: key_struct.offset_of(&field_name).unwrap_or(0),
                field_name,
                match_type: key.match_kind.to_string(),
                bit_width: key.ty.storage_width().unwrap_or(0),
                position,
            }
        })
        .collect();

    let actions = table
        .actions
        .iter()
        .map(|action| {
            let mut start_bit = 0;
            let p4_parameters = structure
                .action_args(&action.name)
                .map(|args| {
                    args.params
                        .iter()
                        .enumerate()
                        .map(|(position, p)| {
                            let bit_width = p.ty.storage_width().unwrap_or(0);
                            let param = ActionParameter {
                                name: p.name.clone(),
                                start_bit,
                                bit_width,
                                position,
                            };
                            start_bit += bit_width;
                            param
                        })
                        .collect()
                })
                .unwrap_or_default();
            ContextAction {
                name: action.name.clone(),
                handle: action_handle(handles, &action.name),
                allowed_as_hit_action: action.scope != ActionScope::DefaultOnly,
                allowed_as_default_action: action.scope != ActionScope::TableOnly,
                p4_parameters,
            }
        })
        .collect();

    let default_action = table.default_action.as_ref().map(|default| {
        let names = structure
            .action_args(&default.name)
            .map(|a| a.params.iter().map(|p| p.name.clone()).collect::<Vec<_>>())
            .unwrap_or_default();
        DefaultAction {
            handle: action_handle(handles, &default.name),
            name: default.name.clone(),
            arguments: names
                .into_iter()
                .zip(&default.args)
                .filter_map(|(name, arg)| arg.as_const().map(|v| (name, v)))
                .collect(),
        }
    });

    ContextTable {
        name: format!("{}.{}", table.control, table.name),
        target_name: table.name.clone(),
        handle: TABLE_HANDLE_BASE + n,
        table_type: if table.learner { "learner" } else { "match" }.to_string(),
        size: table.size,
        match_key_fields,
        actions,
        default_action,
        is_const_default: table.const_default,
    }
}
