//! Abstract Syntax Tree
//!
//! Trees are serializable so a parsed program can be stored and handed back
//! to the evaluator later as a tree input. Shared subtrees use `Arc` so a
//! tree can be evaluated on another thread.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Line/column of the first token of a node (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default)]
    pub pos: Pos,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Var(String),
    SelfRef,
    /// `$`, the outermost enclosing object
    Dollar,
    /// `super.f` / `super[e]`
    SuperIndex(Box<Expr>),
    /// `e in super`
    InSuper(Box<Expr>),
    Array(Vec<Expr>),
    ArrayComp(Box<Expr>, Vec<CompSpec>),
    Object(Vec<Member>),
    ObjectComp(Box<ObjectComp>),
    Local(Vec<Bind>, Box<Expr>),
    Function(Vec<Param>, Arc<Expr>),
    Apply(Box<Expr>, Vec<Arg>),
    Index(Box<Expr>, Box<Expr>),
    Slice(Box<Slice>),
    If(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Assert(Box<Assert>, Box<Expr>),
    Error(Box<Expr>),
    Import(String),
    ImportStr(String),
}

/// `local name = body` or `local name(params) = body`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bind {
    pub name: String,
    pub body: Arc<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Arc<Expr>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

/// `assert cond : message`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assert {
    pub cond: Arc<Expr>,
    pub message: Option<Arc<Expr>>,
}

/// `target[start:end:step]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slice {
    pub target: Expr,
    pub start: Option<Expr>,
    pub end: Option<Expr>,
    pub step: Option<Expr>,
}

/// `for x in e` and `if e` clauses of a comprehension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompSpec {
    For(String, Expr),
    If(Expr),
}

/// `{ local a = 1, [key]: value for x in xs }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectComp {
    pub locals: Vec<Bind>,
    pub key: Expr,
    pub plus: bool,
    pub visibility: Visibility,
    pub value: Arc<Expr>,
    pub specs: Vec<CompSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Member {
    Local(Bind),
    Field(Field),
    Assert(Assert),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub key: FieldKey,
    pub visibility: Visibility,
    /// `field+: value` adds to the inherited field
    #[serde(default)]
    pub plus: bool,
    pub value: Arc<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldKey {
    Fixed(String),
    Computed(Expr),
}

/// `:`, `::` and `:::`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Inherit,
    Hidden,
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::In => "in",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::BitAnd => "&",
            BinOp::BitXor => "^",
            BinOp::BitOr => "|",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    /// Binding power, higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Mod => 10,
            BinOp::Add | BinOp::Sub => 9,
            BinOp::Shl | BinOp::Shr => 8,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::In => 7,
            BinOp::Eq | BinOp::Ne => 6,
            BinOp::BitAnd => 5,
            BinOp::BitXor => 4,
            BinOp::BitOr => 3,
            BinOp::And => 2,
            BinOp::Or => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}
