//! Declarations: actions, tables, externs, parsers and controls

use super::expr::Expr;
use super::stmt::Stmt;
use super::types::{HeaderType, StructType, Type};
use std::fmt;

/// Parameter direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Directionless (action data supplied by the control plane)
    None,
    /// `in`
    In,
    /// `out`
    Out,
    /// `inout`
    InOut,
}

/// Parameter of an action, parser or control
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: Type,
    /// Direction
    pub direction: Direction,
}

impl Param {
    /// Create a parameter
    pub fn new(name: impl Into<String>, ty: Type, direction: Direction) -> Self {
        Self {
            name: name.into(),
            ty,
            direction,
        }
    }
}

/// Action declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Action {
    /// Action name
    pub name: String,
    /// Parameters; directionless ones are action data
    pub params: Vec<Param>,
    /// Body
    pub body: Vec<Stmt>,
}

impl Action {
    /// Parameters supplied by the control plane
    pub fn data_params(&self) -> impl Iterator<Item = &Param> {
        self.params
            .iter()
            .filter(|p| p.direction == Direction::None)
    }
}

/// Table key match kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// `exact`
    Exact,
    /// `lpm`
    Lpm,
    /// `ternary`
    Ternary,
    /// `range`
    Range,
    /// `optional`
    Optional,
    /// `selector` (action selector member)
    Selector,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchKind::Exact => "exact",
            MatchKind::Lpm => "lpm",
            MatchKind::Ternary => "ternary",
            MatchKind::Range => "range",
            MatchKind::Optional => "optional",
            MatchKind::Selector => "selector",
        })
    }
}

/// Table key element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    /// Control-plane name (`@name` annotation or the source text)
    pub name: String,
    /// Matched expression
    pub expr: Expr,
    /// Match kind
    pub match_kind: MatchKind,
}

/// Reference to an action with bound arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionRef {
    /// Action name
    pub name: String,
    /// Arguments for the data parameters
    pub args: Vec<Expr>,
}

impl ActionRef {
    /// Reference without arguments
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }
}

/// Where an action may be used in a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionScope {
    /// Entries and default
    TableAndDefault,
    /// `@tableonly`
    TableOnly,
    /// `@defaultonly`
    DefaultOnly,
}

/// Action listed in a table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableAction {
    /// Action name
    pub name: String,
    /// Usage restriction
    pub scope: ActionScope,
}

/// Key value of a const entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySetValue {
    /// Exact value
    Exact(u64),
    /// `value &&& mask`
    Mask {
        /// Value
        value: u64,
        /// Mask
        mask: u64,
    },
    /// `value / prefix_len`
    Prefix {
        /// Value
        value: u64,
        /// Prefix length
        len: u32,
    },
    /// `lo .. hi`
    Range {
        /// Low bound
        lo: u64,
        /// High bound
        hi: u64,
    },
    /// `_`
    Default,
}

/// Const table entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableEntry {
    /// One value per key
    pub keys: Vec<KeySetValue>,
    /// Action to run on match
    pub action: ActionRef,
    /// Explicit priority
    pub priority: Option<u32>,
}

/// Table declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Match keys in declared order
    pub keys: Vec<Key>,
    /// Permitted actions
    pub actions: Vec<TableAction>,
    /// Default action
    pub default_action: Option<ActionRef>,
    /// Default action is `const`
    pub const_default: bool,
    /// `size` property
    pub size: Option<u64>,
    /// `const entries`
    pub entries: Vec<TableEntry>,
    /// `add_on_miss = true` (learner table)
    pub add_on_miss: bool,
    /// `pna_direct_counter` / `psa_direct_counter` property
    pub direct_counter: Option<String>,
}

impl Table {
    /// A table with only a name; properties are filled in by the caller
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
            actions: Vec::new(),
            default_action: None,
            const_default: false,
            size: None,
            entries: Vec::new(),
            add_on_miss: false,
            direct_counter: None,
        }
    }

    /// Whether `action` is listed
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a.name == action)
    }
}

/// Extern object kinds supported by the target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternKind {
    /// Indexed counter array
    Counter {
        /// Number of counters
        size: u64,
    },
    /// Counter attached to a table
    DirectCounter,
    /// Indexed register array
    Register {
        /// Number of cells
        size: u64,
        /// Cell type
        value_ty: Type,
    },
}

impl ExternKind {
    /// Source type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ExternKind::Counter { .. } => "Counter",
            ExternKind::DirectCounter => "DirectCounter",
            ExternKind::Register { .. } => "Register",
        }
    }
}

/// Extern object instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternInstance {
    /// Instance name
    pub name: String,
    /// Object kind
    pub kind: ExternKind,
}

/// Declaration local to a parser or control
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Local {
    /// Variable
    Var {
        /// Name
        name: String,
        /// Type
        ty: Type,
    },
    /// Action
    Action(Action),
    /// Table
    Table(Table),
    /// Extern instance
    Extern(ExternInstance),
}

impl Local {
    /// Declared name
    pub fn name(&self) -> &str {
        match self {
            Local::Var { name, .. } => name,
            Local::Action(a) => &a.name,
            Local::Table(t) => &t.name,
            Local::Extern(e) => &e.name,
        }
    }
}

/// Control block (pipeline stage or deparser)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Control {
    /// Control type name
    pub name: String,
    /// Parameters
    pub params: Vec<Param>,
    /// Local declarations
    pub locals: Vec<Local>,
    /// `apply` body
    pub body: Vec<Stmt>,
}

impl Control {
    /// Local table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables().find(|t| t.name == name)
    }

    /// Local tables in declaration order
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.locals.iter().filter_map(|l| match l {
            Local::Table(t) => Some(t),
            _ => None,
        })
    }

    /// Local actions in declaration order
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.locals.iter().filter_map(|l| match l {
            Local::Action(a) => Some(a),
            _ => None,
        })
    }

    /// Local action by name
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions().find(|a| a.name == name)
    }

    /// Local extern instances
    pub fn externs(&self) -> impl Iterator<Item = &ExternInstance> {
        self.locals.iter().filter_map(|l| match l {
            Local::Extern(e) => Some(e),
            _ => None,
        })
    }

    /// Local variables
    pub fn vars(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.locals.iter().filter_map(|l| match l {
            Local::Var { name, ty } => Some((name.as_str(), ty)),
            _ => None,
        })
    }
}

/// Select case `value: next`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectCase {
    /// Matched value
    pub value: u64,
    /// Next state
    pub next: String,
}

/// Parser state transition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transition {
    /// `transition accept`
    Accept,
    /// `transition reject`
    Reject,
    /// `transition <state>`
    Goto(String),
    /// `transition select(expr) { .. }`
    Select {
        /// Selector expression
        expr: Expr,
        /// Cases in order
        cases: Vec<SelectCase>,
        /// Target of the `default` case
        default: String,
    },
}

/// Parser state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParserState {
    /// State name (`start` is the entry state)
    pub name: String,
    /// Statements (mostly `packet.extract(..)`)
    pub body: Vec<Stmt>,
    /// Outgoing transition
    pub transition: Transition,
}

/// Parser block
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parser {
    /// Parser type name
    pub name: String,
    /// Parameters
    pub params: Vec<Param>,
    /// Local declarations
    pub locals: Vec<Local>,
    /// States; the first one named `start` is the entry
    pub states: Vec<ParserState>,
}

/// Top-level declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Declaration {
    /// `header`
    Header(HeaderType),
    /// `struct`
    Struct(StructType),
    /// `error { .. }`
    Errors(Vec<String>),
    /// Top-level action
    Action(Action),
    /// Parser
    Parser(Parser),
    /// Control
    Control(Control),
}

impl Declaration {
    /// Declared name (`error` for error declarations)
    pub fn name(&self) -> &str {
        match self {
            Declaration::Header(h) => &h.name,
            Declaration::Struct(s) => &s.name,
            Declaration::Errors(_) => "error",
            Declaration::Action(a) => &a.name,
            Declaration::Parser(p) => &p.name,
            Declaration::Control(c) => &c.name,
        }
    }
}
