//! # Target Assembly
//!
//! The flat vocabulary the converter produces and the post-codegen passes
//! rewrite: structs, header and metadata instances, register arrays,
//! actions, tables and the `apply` instruction list. [`display`] renders it
//! as the text the target's pipeline loader reads.

pub mod display;

use crate::ir::MatchKind;

/// Default `size` of a table without a size property
pub const DEFAULT_TABLE_SIZE: u64 = 0x10000;

/// Learner entry timeouts in seconds
pub const DEFAULT_LEARNER_TIMEOUTS: &[u32] = &[60, 120, 180];

/// `bit<W> name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsmField {
    /// Field name
    pub name: String,
    /// Storage width in bits
    pub width: u32,
}

impl AsmField {
    /// Create a field
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }
}

/// `struct name { .. }`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsmStruct {
    /// Struct name
    pub name: String,
    /// Fields in layout order
    pub fields: Vec<AsmField>,
}

/// `regarray name size N initval V`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegArray {
    /// Array name
    pub name: String,
    /// Number of cells
    pub size: u64,
    /// Initial cell value
    pub init: u64,
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operand {
    /// `m.field`
    Meta(String),
    /// `h.instance.field`
    Header {
        /// Header instance
        instance: String,
        /// Field
        field: String,
    },
    /// `t.param`
    ActionArg(String),
    /// Immediate
    Imm(u64),
}

impl Operand {
    /// Metadata field name, if this is one
    pub fn meta_field(&self) -> Option<&str> {
        match self {
            Operand::Meta(name) => Some(name),
            _ => None,
        }
    }

    /// Whether this operand is an immediate
    pub fn is_imm(&self) -> bool {
        matches!(self, Operand::Imm(_))
    }
}

/// Conditional jump comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `jmpeq`
    Eq,
    /// `jmpneq`
    Neq,
    /// `jmplt`
    Lt,
    /// `jmpgt`
    Gt,
}

/// Two-operand ALU instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    /// `add`
    Add,
    /// `sub`
    Sub,
    /// `and`
    And,
    /// `or`
    Or,
    /// `xor`
    Xor,
    /// `shl`
    Shl,
    /// `shr`
    Shr,
}

/// One instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AsmStmt {
    /// Jump target
    Label(String),
    /// Unconditional jump
    Jmp(String),
    /// Compare and jump
    JmpCmp {
        /// Comparison
        op: CmpOp,
        /// Target label
        target: String,
        /// Left operand
        left: Operand,
        /// Right operand
        right: Operand,
    },
    /// Jump if the header instance is valid
    JmpValid {
        /// Target label
        target: String,
        /// Header instance
        header: String,
    },
    /// Jump if the header instance is invalid
    JmpInvalid {
        /// Target label
        target: String,
        /// Header instance
        header: String,
    },
    /// Jump if the last table lookup hit
    JmpHit(String),
    /// Jump if the last table lookup missed
    JmpMiss(String),
    /// `mov dst src`
    Mov {
        /// Destination
        dst: Operand,
        /// Source
        src: Operand,
    },
    /// `op dst src`
    Alu {
        /// Operation
        op: AluOp,
        /// Destination and first operand
        dst: Operand,
        /// Second operand
        src: Operand,
    },
    /// Table lookup
    Table(String),
    /// Parse a header instance
    Extract(String),
    /// Deparse a header instance
    Emit(String),
    /// Mark a header instance valid
    Validate(String),
    /// Mark a header instance invalid
    Invalidate(String),
    /// Receive; stores the input port
    Rx(Operand),
    /// Transmit to the port held by the operand
    Tx(Operand),
    /// Drop the packet
    Drop,
    /// End of action
    Return,
    /// `regrd dst reg index`
    RegRead {
        /// Destination
        dst: Operand,
        /// Register array
        reg: String,
        /// Cell index
        index: Operand,
    },
    /// `regwr reg index src`
    RegWrite {
        /// Register array
        reg: String,
        /// Cell index
        index: Operand,
        /// Value
        src: Operand,
    },
    /// `regadd reg index src`
    RegAdd {
        /// Register array
        reg: String,
        /// Cell index
        index: Operand,
        /// Increment
        src: Operand,
    },
    /// Store the index of the matched entry
    EntryId(Operand),
    /// Add an entry to the current learner table
    Learn {
        /// Action of the new entry
        action: String,
        /// First field of the action data, if any
        arg: Option<Operand>,
    },
    /// Store the recirculation pass number
    RecircId(Operand),
    /// Recirculate the packet
    Recirculate,
    /// Mirror the packet
    Mirror {
        /// Mirror slot
        slot: Operand,
        /// Session
        session: Operand,
    },
}

impl AsmStmt {
    /// Operands read by the instruction
    pub fn reads(&self) -> Vec<&Operand> {
        match self {
            AsmStmt::JmpCmp { left, right, .. } => vec![left, right],
            AsmStmt::Mov { src, .. } => vec![src],
            AsmStmt::Alu { dst, src, .. } => vec![dst, src],
            AsmStmt::Tx(o) => vec![o],
            AsmStmt::RegRead { index, .. } => vec![index],
            AsmStmt::RegWrite { index, src, .. } | AsmStmt::RegAdd { index, src, .. } => {
                vec![index, src]
            }
            AsmStmt::Learn { arg, .. } => arg.iter().collect(),
            AsmStmt::Mirror { slot, session } => vec![slot, session],
            _ => Vec::new(),
        }
    }

    /// Operand written by the instruction
    pub fn writes(&self) -> Option<&Operand> {
        match self {
            AsmStmt::Mov { dst, .. } | AsmStmt::Alu { dst, .. } | AsmStmt::RegRead { dst, .. } => {
                Some(dst)
            }
            AsmStmt::Rx(o) | AsmStmt::EntryId(o) | AsmStmt::RecircId(o) => Some(o),
            _ => None,
        }
    }

    /// Every operand, in the order of [`AsmStmt::operands_mut`]
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            AsmStmt::JmpCmp { left, right, .. } => vec![left, right],
            AsmStmt::Mov { dst, src } | AsmStmt::Alu { dst, src, .. } => vec![dst, src],
            AsmStmt::Rx(o) | AsmStmt::Tx(o) | AsmStmt::EntryId(o) | AsmStmt::RecircId(o) => {
                vec![o]
            }
            AsmStmt::RegRead { dst, index, .. } => vec![dst, index],
            AsmStmt::RegWrite { index, src, .. } | AsmStmt::RegAdd { index, src, .. } => {
                vec![index, src]
            }
            AsmStmt::Learn { arg, .. } => arg.iter().collect(),
            AsmStmt::Mirror { slot, session } => vec![slot, session],
            _ => Vec::new(),
        }
    }

    /// Every operand, mutably
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            AsmStmt::JmpCmp { left, right, .. } => vec![left, right],
            AsmStmt::Mov { dst, src } | AsmStmt::Alu { dst, src, .. } => vec![dst, src],
            AsmStmt::Rx(o) | AsmStmt::Tx(o) | AsmStmt::EntryId(o) | AsmStmt::RecircId(o) => {
                vec![o]
            }
            AsmStmt::RegRead { dst, index, .. } => vec![dst, index],
            AsmStmt::RegWrite { index, src, .. } | AsmStmt::RegAdd { index, src, .. } => {
                vec![index, src]
            }
            AsmStmt::Learn { arg, .. } => arg.iter_mut().collect(),
            AsmStmt::Mirror { slot, session } => vec![slot, session],
            _ => Vec::new(),
        }
    }

    /// Label this instruction may transfer control to
    pub fn jump_target(&self) -> Option<&str> {
        match self {
            AsmStmt::Jmp(t)
            | AsmStmt::JmpHit(t)
            | AsmStmt::JmpMiss(t)
            | AsmStmt::JmpCmp { target: t, .. }
            | AsmStmt::JmpValid { target: t, .. }
            | AsmStmt::JmpInvalid { target: t, .. } => Some(t),
            _ => None,
        }
    }

    /// Jump target, mutably
    pub fn jump_target_mut(&mut self) -> Option<&mut String> {
        match self {
            AsmStmt::Jmp(t)
            | AsmStmt::JmpHit(t)
            | AsmStmt::JmpMiss(t)
            | AsmStmt::JmpCmp { target: t, .. }
            | AsmStmt::JmpValid { target: t, .. }
            | AsmStmt::JmpInvalid { target: t, .. } => Some(t),
            _ => None,
        }
    }

    /// Table, register array, learned action or header instance the
    /// instruction names outside its operands
    pub fn referenced_name(&self) -> Option<&str> {
        match self {
            AsmStmt::Table(name)
            | AsmStmt::Extract(name)
            | AsmStmt::Emit(name)
            | AsmStmt::Validate(name)
            | AsmStmt::Invalidate(name)
            | AsmStmt::JmpValid { header: name, .. }
            | AsmStmt::JmpInvalid { header: name, .. }
            | AsmStmt::Learn { action: name, .. }
            | AsmStmt::RegRead { reg: name, .. }
            | AsmStmt::RegWrite { reg: name, .. }
            | AsmStmt::RegAdd { reg: name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// [`AsmStmt::referenced_name`], mutably
    pub fn referenced_name_mut(&mut self) -> Option<&mut String> {
        match self {
            AsmStmt::Table(name)
            | AsmStmt::Extract(name)
            | AsmStmt::Emit(name)
            | AsmStmt::Validate(name)
            | AsmStmt::Invalidate(name)
            | AsmStmt::JmpValid { header: name, .. }
            | AsmStmt::JmpInvalid { header: name, .. }
            | AsmStmt::Learn { action: name, .. }
            | AsmStmt::RegRead { reg: name, .. }
            | AsmStmt::RegWrite { reg: name, .. }
            | AsmStmt::RegAdd { reg: name, .. } => Some(name),
            _ => None,
        }
    }

    /// Control never falls through to the next instruction
    pub fn is_unconditional_exit(&self) -> bool {
        matches!(self, AsmStmt::Jmp(_) | AsmStmt::Return | AsmStmt::Drop)
    }
}

/// `action name args instanceof S { .. }`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsmAction {
    /// Action name
    pub name: String,
    /// Argument struct, `None` for `args none`
    pub args: Option<String>,
    /// Instructions, ending in `return`
    pub body: Vec<AsmStmt>,
}

/// Table or learner declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsmTable {
    /// Table name
    pub name: String,
    /// Keys with match kinds
    pub keys: Vec<(Operand, MatchKind)>,
    /// Permitted actions; `true` marks `@tableonly`
    pub actions: Vec<(String, bool)>,
    /// Default action
    pub default_action: String,
    /// Default action arguments by parameter name
    pub default_args: Vec<(String, u64)>,
    /// Default action is `const`
    pub const_default: bool,
    /// Entry capacity
    pub size: u64,
    /// Learner table
    pub learner: bool,
    /// Const entries
    pub entries: Vec<AsmEntry>,
}

/// Const table entry, key values already rendered
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsmEntry {
    /// One match value per key (`0x..`, `0x../0x..`)
    pub keys: Vec<String>,
    /// Action
    pub action: String,
    /// Action arguments by parameter name
    pub args: Vec<(String, u64)>,
    /// Explicit priority
    pub priority: Option<u32>,
}

/// Complete assembly program
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AsmProgram {
    /// Header layouts
    pub header_types: Vec<AsmStruct>,
    /// Metadata and action argument layouts
    pub structs: Vec<AsmStruct>,
    /// Header instances `(instance, type)`
    pub headers: Vec<(String, String)>,
    /// Metadata struct type
    pub metadata: Option<String>,
    /// Register arrays
    pub regarrays: Vec<RegArray>,
    /// Actions
    pub actions: Vec<AsmAction>,
    /// Tables and learners
    pub tables: Vec<AsmTable>,
    /// `apply` instructions
    pub apply: Vec<AsmStmt>,
}

impl AsmProgram {
    /// Struct by name
    pub fn struct_named(&self, name: &str) -> Option<&AsmStruct> {
        self.structs.iter().find(|s| s.name == name)
    }

    /// The metadata struct
    pub fn metadata_struct(&self) -> Option<&AsmStruct> {
        self.metadata.as_deref().and_then(|m| self.struct_named(m))
    }

    /// The metadata struct, mutably
    pub fn metadata_struct_mut(&mut self) -> Option<&mut AsmStruct> {
        let name = self.metadata.clone()?;
        self.structs.iter_mut().find(|s| s.name == name)
    }

    /// Every instruction list: the `apply` block, then each action body
    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut Vec<AsmStmt>> {
        std::iter::once(&mut self.apply).chain(self.actions.iter_mut().map(|a| &mut a.body))
    }

    /// Every instruction list, read-only
    pub fn bodies(&self) -> impl Iterator<Item = &Vec<AsmStmt>> {
        std::iter::once(&self.apply).chain(self.actions.iter().map(|a| &a.body))
    }

    /// Visit every renameable identifier: struct, field, header instance,
    /// action, table, register array and argument names
    pub fn for_each_name_mut(&mut self, f: &mut dyn FnMut(&mut String)) {
        for st in self.header_types.iter_mut().chain(self.structs.iter_mut()) {
            f(&mut st.name);
            for field in &mut st.fields {
                f(&mut field.name);
            }
        }
        for (instance, ty) in &mut self.headers {
            f(instance);
            f(ty);
        }
        if let Some(m) = &mut self.metadata {
            f(m);
        }
        for reg in &mut self.regarrays {
            f(&mut reg.name);
        }
        for action in &mut self.actions {
            f(&mut action.name);
            if let Some(args) = &mut action.args {
                f(args);
            }
        }
        for table in &mut self.tables {
            f(&mut table.name);
            for (key, _) in &mut table.keys {
                operand_names_mut(key, f);
            }
            for (action, _) in &mut table.actions {
                f(action);
            }
            f(&mut table.default_action);
            for (param, _) in &mut table.default_args {
                f(param);
            }
            for entry in &mut table.entries {
                f(&mut entry.action);
                for (param, _) in &mut entry.args {
                    f(param);
                }
            }
        }
        for body in self.bodies_mut() {
            for stmt in body.iter_mut() {
                if let Some(name) = stmt.referenced_name_mut() {
                    f(name);
                }
                for operand in stmt.operands_mut() {
                    operand_names_mut(operand, f);
                }
            }
        }
    }

    /// Visit every renameable identifier, read-only, in the same order as
    /// [`AsmProgram::for_each_name_mut`]
    pub fn for_each_name(&self, f: &mut dyn FnMut(&str)) {
        for st in self.header_types.iter().chain(self.structs.iter()) {
            f(&st.name);
            for field in &st.fields {
                f(&field.name);
            }
        }
        for (instance, ty) in &self.headers {
            f(instance);
            f(ty);
        }
        if let Some(m) = &self.metadata {
            f(m);
        }
        for reg in &self.regarrays {
            f(&reg.name);
        }
        for action in &self.actions {
            f(&action.name);
            if let Some(args) = &action.args {
                f(args);
            }
        }
        for table in &self.tables {
            f(&table.name);
            for (key, _) in &table.keys {
                operand_names(key, f);
            }
            for (action, _) in &table.actions {
                f(action);
            }
            f(&table.default_action);
            for (param, _) in &table.default_args {
                f(param);
            }
            for entry in &table.entries {
                f(&entry.action);
                for (param, _) in &entry.args {
                    f(param);
                }
            }
        }
        for body in self.bodies() {
            for stmt in body {
                if let Some(name) = stmt.referenced_name() {
                    f(name);
                }
                for operand in stmt.operands() {
                    operand_names(operand, f);
                }
            }
        }
    }
}

fn operand_names_mut(operand: &mut Operand, f: &mut dyn FnMut(&mut String)) {
    match operand {
        Operand::Meta(name) | Operand::ActionArg(name) => f(name),
        Operand::Header { instance, field } => {
            f(instance);
            f(field);
        }
        Operand::Imm(_) => {}
    }
}

fn operand_names(operand: &Operand, f: &mut dyn FnMut(&str)) {
    match operand {
        Operand::Meta(name) | Operand::ActionArg(name) => f(name),
        Operand::Header { instance, field } => {
            f(instance);
            f(field);
        }
        Operand::Imm(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_and_writes() {
        let alu = AsmStmt::Alu {
            op: AluOp::Add,
            dst: Operand::Meta("x".into()),
            src: Operand::Imm(1),
        };
        assert_eq!(alu.writes(), Some(&Operand::Meta("x".into())));
        assert_eq!(alu.reads().len(), 2);
        assert!(AsmStmt::Return.is_unconditional_exit());
    }

    #[test]
    fn test_names_cover_operands_and_tables() {
        let mut program = AsmProgram {
            apply: vec![
                AsmStmt::Mov {
                    dst: Operand::Meta("long".into()),
                    src: Operand::Imm(0),
                },
                AsmStmt::Table("long".into()),
            ],
            ..AsmProgram::default()
        };
        let mut seen = 0;
        program.for_each_name_mut(&mut |n| {
            if n == "long" {
                *n = "short".into();
                seen += 1;
            }
        });
        assert_eq!(seen, 2);
        assert_eq!(program.apply[1], AsmStmt::Table("short".into()));
    }

    #[test]
    fn test_names_cover_header_instances() {
        let mut program = AsmProgram {
            headers: vec![("outer".into(), "ipv4_t".into())],
            apply: vec![
                AsmStmt::Extract("outer".into()),
                AsmStmt::JmpInvalid {
                    target: "L".into(),
                    header: "outer".into(),
                },
                AsmStmt::Mov {
                    dst: Operand::Meta("x".into()),
                    src: Operand::Header {
                        instance: "outer".into(),
                        field: "ttl".into(),
                    },
                },
                AsmStmt::Invalidate("outer".into()),
            ],
            ..AsmProgram::default()
        };
        let mut read = Vec::new();
        program.for_each_name(&mut |n| read.push(n.to_string()));
        assert_eq!(read.iter().filter(|n| *n == "outer").count(), 5);

        let mut written = Vec::new();
        program.for_each_name_mut(&mut |n| {
            written.push(n.clone());
            if n == "outer" {
                *n = "o".into();
            }
        });
        assert_eq!(read, written);
        assert_eq!(program.headers[0].0, "o");
        assert_eq!(program.apply[0], AsmStmt::Extract("o".into()));
        assert_eq!(program.apply[3], AsmStmt::Invalidate("o".into()));
        assert!(matches!(
            &program.apply[2],
            AsmStmt::Mov { src: Operand::Header { instance, .. }, .. } if instance == "o"
        ));
    }
}
