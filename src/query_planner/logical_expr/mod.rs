use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    entity_catalog::{EntityModel, ScalarKind},
    query_planner::{
        analyzer::navigation_expansion::navigation_tree::{CustomRootId, NodeId},
        logical_plan::QueryOperator,
        types::{ElementType, INNER, OUTER},
    },
};

pub mod combinators;
pub mod expression_rewriter;
pub mod visitors;

/// A named correlation variable, e.g. the `o` in `o => o.Id`.
///
/// Symbols are compared by name; the type is carried along for inference
/// and defaults to `Unknown` when a query omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    #[serde(default)]
    pub ty: ElementType,
}

impl Symbol {
    pub fn new(name: impl Into<String>, ty: ElementType) -> Self {
        Symbol {
            name: name.into(),
            ty,
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Symbol::new(name, ElementType::Unknown)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(fl) => write!(f, "{}", fl),
            Literal::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Coalesce,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Coalesce => "??",
        };
        f.write_str(op)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a lambda parameter.
    Parameter(Symbol),

    Literal(Literal),

    /// Field or relationship access, e.g. `o.Customer`.
    Member { target: Box<Expr>, member: String },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Unary { op: UnaryOp, operand: Box<Expr> },

    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },

    /// Anonymous record construction: `new { Name = c.Name }`.
    Record(Vec<RecordField>),

    /// The two-slot record built by joins.
    Composite { outer: Box<Expr>, inner: Box<Expr> },

    /// Widens a scalar to its nullable form.
    Convert(Box<Expr>),

    /// Scalar function call, passed through untouched.
    Call { function: String, args: Vec<Expr> },

    /// Correlated subquery over an embedded operator tree.
    Subquery(#[serde(with = "crate::utils::serde_arc")] Arc<QueryOperator>),

    /// Transient: a reference bound to a navigation tree node. Never emitted.
    NavigationBinding { node: NodeId, entity: String },

    /// Transient: a reference to a non-entity row shape. Never emitted.
    CustomRoot(CustomRootId),
}

impl Expr {
    pub fn param(symbol: &Symbol) -> Expr {
        Expr::Parameter(symbol.clone())
    }

    pub fn member(self, member: impl Into<String>) -> Expr {
        Expr::Member {
            target: Box::new(self),
            member: member.into(),
        }
    }

    /// Applies a chain of member accesses, e.g. `["Outer", "Inner"]`.
    pub fn member_path<S: AsRef<str>>(self, path: &[S]) -> Expr {
        path.iter()
            .fold(self, |expr, segment| expr.member(segment.as_ref()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Expr::Literal(Literal::Null))
    }

    /// True for the variants that only exist while navigations are rewritten.
    pub fn is_transient(&self) -> bool {
        matches!(self, Expr::NavigationBinding { .. } | Expr::CustomRoot(_))
    }

    /// Infers the type of an expression whose parameters carry their types.
    pub fn element_type(&self, model: &EntityModel) -> ElementType {
        match self {
            Expr::Parameter(symbol) => symbol.ty.clone(),
            Expr::Literal(literal) => match literal {
                Literal::Null => ElementType::Unknown,
                Literal::Bool(_) => ElementType::scalar(ScalarKind::Bool),
                Literal::Int(_) => ElementType::scalar(ScalarKind::Int),
                Literal::Float(_) => ElementType::scalar(ScalarKind::Float),
                Literal::String(_) => ElementType::scalar(ScalarKind::String),
            },
            Expr::Member { target, member } => target
                .element_type(model)
                .member_type(model, member)
                .unwrap_or_default(),
            Expr::Binary { op, left, right } => {
                if op.is_comparison() || op.is_logical() {
                    ElementType::scalar(ScalarKind::Bool)
                } else if *op == BinaryOp::Coalesce {
                    right.element_type(model)
                } else {
                    let left = left.element_type(model);
                    if right.element_type(model).is_nullable() {
                        left.as_nullable()
                    } else {
                        left
                    }
                }
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => ElementType::scalar(ScalarKind::Bool),
                UnaryOp::Negate => operand.element_type(model),
            },
            Expr::Conditional {
                if_true, if_false, ..
            } => {
                let ty = if_true.element_type(model);
                if ty == ElementType::Unknown {
                    if_false.element_type(model).as_nullable()
                } else if if_false.is_null() || if_false.element_type(model).is_nullable() {
                    ty.as_nullable()
                } else {
                    ty
                }
            }
            Expr::Record(fields) => ElementType::Record(
                fields
                    .iter()
                    .map(|f| (f.name.clone(), f.value.element_type(model)))
                    .collect(),
            ),
            Expr::Composite { outer, inner } => {
                ElementType::composite(outer.element_type(model), inner.element_type(model))
            }
            Expr::Convert(operand) => operand.element_type(model).as_nullable(),
            Expr::Call { .. } => ElementType::Unknown,
            Expr::Subquery(op) => op.result_type(model),
            Expr::NavigationBinding { entity, .. } => ElementType::Entity(entity.clone()),
            Expr::CustomRoot(_) => ElementType::Unknown,
        }
    }

    fn needs_parens(&self) -> bool {
        matches!(self, Expr::Binary { .. } | Expr::Conditional { .. })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Parameter(symbol) => write!(f, "{}", symbol),
            Expr::Literal(literal) => write!(f, "{}", literal),
            Expr::Member { target, member } => {
                if target.needs_parens() {
                    write!(f, "({}).{}", target, member)
                } else {
                    write!(f, "{}.{}", target, member)
                }
            }
            Expr::Binary { op, left, right } => {
                let operand = |e: &Expr| {
                    if e.needs_parens() {
                        format!("({})", e)
                    } else {
                        e.to_string()
                    }
                };
                write!(f, "{} {} {}", operand(left), op, operand(right))
            }
            Expr::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Negate => "-",
                };
                if operand.needs_parens() {
                    write!(f, "{}({})", symbol, operand)
                } else {
                    write!(f, "{}{}", symbol, operand)
                }
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "{} ? {} : {}", test, if_true, if_false),
            Expr::Record(fields) => {
                write!(f, "new {{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", field.name, field.value)?;
                }
                write!(f, " }}")
            }
            Expr::Composite { outer, inner } => {
                write!(f, "{{ {} = {}, {} = {} }}", OUTER, outer, INNER, inner)
            }
            Expr::Convert(operand) => write!(f, "nullable({})", operand),
            Expr::Call { function, args } => {
                write!(f, "{}(", function)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Subquery(op) => write!(f, "{}", op.compact()),
            Expr::NavigationBinding { node, entity } => write!(f, "nav#{}<{}>", node.0, entity),
            Expr::CustomRoot(root) => write!(f, "root#{}", root.0),
        }
    }
}

/// An anonymous function with positional parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<Symbol>,
    pub body: Expr,
}

impl Lambda {
    pub fn new(params: Vec<Symbol>, body: Expr) -> Self {
        Lambda { params, body }
    }

    pub fn unary(param: Symbol, body: Expr) -> Self {
        Lambda::new(vec![param], body)
    }

    /// `x => x`
    pub fn identity(param: Symbol) -> Self {
        let body = Expr::param(&param);
        Lambda::unary(param, body)
    }

    pub fn param(&self, index: usize) -> Option<&Symbol> {
        self.params.get(index)
    }

    pub fn is_identity(&self) -> bool {
        matches!((&self.body, self.params.as_slice()), (Expr::Parameter(body), [param]) if body == param)
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params.as_slice() {
            [single] => write!(f, "{} => {}", single, self.body),
            params => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") => {}", self.body)
            }
        }
    }
}
