//! Typed expressions

use super::types::Type;
use std::fmt;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    LAnd,
    /// `||`
    LOr,
    /// `++` (bit concatenation)
    Concat,
}

impl BinOp {
    /// Comparison operators produce `bool`
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    /// `&&` and `||`
    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::LAnd | BinOp::LOr)
    }

    /// Operators that map to a single two-operand ALU instruction
    pub fn is_arithmetic(self) -> bool {
        !self.is_comparison() && !self.is_logical() && self != BinOp::Concat
    }

    /// `a op b == b op a`
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor
        )
    }

    /// Logical negation of a comparison
    pub fn negate(self) -> Option<BinOp> {
        Some(match self {
            BinOp::Eq => BinOp::Ne,
            BinOp::Ne => BinOp::Eq,
            BinOp::Lt => BinOp::Ge,
            BinOp::Ge => BinOp::Lt,
            BinOp::Gt => BinOp::Le,
            BinOp::Le => BinOp::Gt,
            _ => return None,
        })
    }

    /// Comparison with operands swapped
    pub fn mirror(self) -> BinOp {
        match self {
            BinOp::Lt => BinOp::Gt,
            BinOp::Gt => BinOp::Lt,
            BinOp::Le => BinOp::Ge,
            BinOp::Ge => BinOp::Le,
            other => other,
        }
    }

    /// Source-level spelling
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::LAnd => "&&",
            BinOp::LOr => "||",
            BinOp::Concat => "++",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnaryOp {
    /// Logical `!`
    Not,
    /// Bitwise `~`
    Complement,
    /// Arithmetic `-`
    Neg,
}

/// Method or extern function call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodCall {
    /// Receiver (`None` for free extern functions such as `drop_packet()`)
    pub target: Option<Expr>,
    /// Method name
    pub method: String,
    /// Arguments
    pub args: Vec<Expr>,
}

impl MethodCall {
    /// Call a method on a receiver
    pub fn new(target: Expr, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            target: Some(target),
            method: method.into(),
            args,
        }
    }

    /// Call a free extern function
    pub fn free(method: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            target: None,
            method: method.into(),
            args,
        }
    }

    /// Name of the root path of the receiver (`packet`, `reg`, `h`, ...)
    pub fn target_root(&self) -> Option<&str> {
        self.target.as_ref().and_then(|t| t.root_path())
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    /// Integer literal
    Const(u64),
    /// Boolean literal
    Bool(bool),
    /// String literal
    Str(String),
    /// Reference to a parameter, local or loop variable
    Path(String),
    /// Field access
    Member {
        /// Accessed value
        base: Box<Expr>,
        /// Field name
        field: String,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        expr: Box<Expr>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `cond ? then_expr : else_expr`
    Mux {
        /// Selector
        cond: Box<Expr>,
        /// Value when true
        then_expr: Box<Expr>,
        /// Value when false
        else_expr: Box<Expr>,
    },
    /// Bit slice `expr[hi:lo]`
    Slice {
        /// Sliced value
        expr: Box<Expr>,
        /// High bit (inclusive)
        hi: u32,
        /// Low bit (inclusive)
        lo: u32,
    },
    /// Cast to the node's type
    Cast(Box<Expr>),
    /// `hdr.isValid()`
    IsValid(Box<Expr>),
    /// `table.apply().hit` (or `.miss` when `hit` is false)
    TableHit {
        /// Applied table
        table: String,
        /// `true` for `.hit`, `false` for `.miss`
        hit: bool,
    },
    /// `error.Name`
    ErrorMember(String),
    /// Value-returning extern call (`reg.read(idx)`)
    Call(Box<MethodCall>),
}

/// Expression with its type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expr {
    /// Node
    pub kind: ExprKind,
    /// Type computed by the type checker
    pub ty: Type,
}

impl Expr {
    /// Build from parts
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    /// Unsigned integer literal of `width` bits
    pub fn constant(value: u64, width: u32) -> Self {
        let ty = Type::bits(width);
        Self::new(ExprKind::Const(value & ty.mask()), ty)
    }

    /// Integer literal of a given type
    pub fn constant_of(value: u64, ty: Type) -> Self {
        let masked = value & ty.mask();
        match ty {
            Type::Bool => Self::boolean(masked != 0),
            ty => Self::new(ExprKind::Const(masked), ty),
        }
    }

    /// Boolean literal
    pub fn boolean(value: bool) -> Self {
        Self::new(ExprKind::Bool(value), Type::Bool)
    }

    /// String literal
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Str(value.into()), Type::String)
    }

    /// Variable or parameter reference
    pub fn path(name: impl Into<String>, ty: Type) -> Self {
        Self::new(ExprKind::Path(name.into()), ty)
    }

    /// Field access
    pub fn member(base: Expr, field: impl Into<String>, ty: Type) -> Self {
        Self::new(
            ExprKind::Member {
                base: Box::new(base),
                field: field.into(),
            },
            ty,
        )
    }

    /// Binary operation; the result type follows the operator
    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        let ty = if op.is_comparison() || op.is_logical() {
            Type::Bool
        } else if op == BinOp::Concat {
            let width = left.ty.width().unwrap_or(0) + right.ty.width().unwrap_or(0);
            Type::bits(width)
        } else {
            left.ty.clone()
        };
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    /// Unary operation
    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        let ty = if op == UnaryOp::Not {
            Type::Bool
        } else {
            expr.ty.clone()
        };
        Self::new(
            ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
            ty,
        )
    }

    /// Logical negation
    pub fn not(expr: Expr) -> Self {
        Self::unary(UnaryOp::Not, expr)
    }

    /// Conditional selection
    pub fn mux(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        let ty = then_expr.ty.clone();
        Self::new(
            ExprKind::Mux {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            ty,
        )
    }

    /// Bit slice
    pub fn slice(expr: Expr, hi: u32, lo: u32) -> Self {
        Self::new(
            ExprKind::Slice {
                expr: Box::new(expr),
                hi,
                lo,
            },
            Type::bits(hi.saturating_sub(lo) + 1),
        )
    }

    /// Cast to `ty`
    pub fn cast(expr: Expr, ty: Type) -> Self {
        Self::new(ExprKind::Cast(Box::new(expr)), ty)
    }

    /// Header validity test
    pub fn is_valid(header: Expr) -> Self {
        Self::new(ExprKind::IsValid(Box::new(header)), Type::Bool)
    }

    /// `table.apply().hit` / `.miss`
    pub fn table_hit(table: impl Into<String>, hit: bool) -> Self {
        Self::new(
            ExprKind::TableHit {
                table: table.into(),
                hit,
            },
            Type::Bool,
        )
    }

    /// `error.Name`
    pub fn error_member(name: impl Into<String>) -> Self {
        Self::new(ExprKind::ErrorMember(name.into()), Type::Error)
    }

    /// Value-returning call
    pub fn call(call: MethodCall, ty: Type) -> Self {
        Self::new(ExprKind::Call(Box::new(call)), ty)
    }

    /// Can appear on the left of an assignment
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExprKind::Path(_) => true,
            ExprKind::Member { base, .. } => base.is_lvalue(),
            _ => false,
        }
    }

    /// Directly expressible as an assembly operand
    pub fn is_simple(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Const(_) | ExprKind::Bool(_) | ExprKind::ErrorMember(_) | ExprKind::Str(_)
        ) || self.is_lvalue()
    }

    /// Literal value, if any
    pub fn as_const(&self) -> Option<u64> {
        match self.kind {
            ExprKind::Const(v) => Some(v),
            ExprKind::Bool(b) => Some(b as u64),
            _ => None,
        }
    }

    /// Literal or not
    pub fn is_const(&self) -> bool {
        self.as_const().is_some()
    }

    /// Root variable of an lvalue (`h` for `h.ipv4.ttl`)
    pub fn root_path(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Path(name) => Some(name),
            ExprKind::Member { base, .. } => base.root_path(),
            _ => None,
        }
    }

    /// Immediate sub-expressions
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Member { base, .. } => vec![base],
            ExprKind::Unary { expr, .. } | ExprKind::Cast(expr) | ExprKind::IsValid(expr) => {
                vec![expr]
            }
            ExprKind::Slice { expr, .. } => vec![expr],
            ExprKind::Binary { left, right, .. } => vec![left, right],
            ExprKind::Mux {
                cond,
                then_expr,
                else_expr,
            } => vec![cond, then_expr, else_expr],
            ExprKind::Call(call) => call.target.iter().chain(call.args.iter()).collect(),
            _ => Vec::new(),
        }
    }

    /// Immediate sub-expressions, mutably
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Member { base, .. } => vec![base.as_mut()],
            ExprKind::Unary { expr, .. } | ExprKind::Cast(expr) | ExprKind::IsValid(expr) => {
                vec![expr.as_mut()]
            }
            ExprKind::Slice { expr, .. } => vec![expr.as_mut()],
            ExprKind::Binary { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            ExprKind::Mux {
                cond,
                then_expr,
                else_expr,
            } => vec![cond.as_mut(), then_expr.as_mut(), else_expr.as_mut()],
            ExprKind::Call(call) => {
                let MethodCall { target, args, .. } = call.as_mut();
                target.iter_mut().chain(args.iter_mut()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Pre-order traversal
    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Post-order rewrite: children are rewritten before their parent
    pub fn rewrite_post(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        for child in self.children_mut() {
            child.rewrite_post(f);
        }
        f(self);
    }

    /// Whether any node satisfies `pred`
    pub fn any(&self, pred: &mut dyn FnMut(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        self.children().into_iter().any(|c| c.any(pred))
    }

    /// Whether the expression mentions variable `name`
    pub fn mentions(&self, name: &str) -> bool {
        self.any(&mut |e| matches!(&e.kind, ExprKind::Path(p) if p == name))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Const(v) => write!(f, "{}", v),
            ExprKind::Bool(b) => write!(f, "{}", b),
            ExprKind::Str(s) => write!(f, "\"{}\"", s),
            ExprKind::Path(name) => f.write_str(name),
            ExprKind::Member { base, field } => write!(f, "{}.{}", base, field),
            ExprKind::Unary { op, expr } => {
                let sym = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Complement => "~",
                    UnaryOp::Neg => "-",
                };
                write!(f, "{}{}", sym, expr)
            }
            ExprKind::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            ExprKind::Mux {
                cond,
                then_expr,
                else_expr,
            } => write!(f, "({} ? {} : {})", cond, then_expr, else_expr),
            ExprKind::Slice { expr, hi, lo } => write!(f, "{}[{}:{}]", expr, hi, lo),
            ExprKind::Cast(expr) => write!(f, "({}){}", self.ty, expr),
            ExprKind::IsValid(expr) => write!(f, "{}.isValid()", expr),
            ExprKind::TableHit { table, hit } => {
                write!(f, "{}.apply().{}", table, if *hit { "hit" } else { "miss" })
            }
            ExprKind::ErrorMember(name) => write!(f, "error.{}", name),
            ExprKind::Call(call) => {
                if let Some(target) = &call.target {
                    write!(f, "{}.", target)?;
                }
                write!(f, "{}(", call.method)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}
