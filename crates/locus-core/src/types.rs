//! Scalar literals and the minimal expression model the planner inspects.
//!
//! The expression/type system proper belongs to the front end. The planner
//! only needs to recognise column references, literals and equalities so it
//! can follow column identity; anything else is an opaque call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::{DataType, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Utf8,
            Scalar::Bool(_) => DataType::Boolean,
            Scalar::I32(_) => DataType::Int32,
            Scalar::I64(_) => DataType::Int64,
            Scalar::F32(_) => DataType::Float32,
            Scalar::F64(_) => DataType::Float64,
            Scalar::Str(_) => DataType::Utf8,
            Scalar::Bin(_) => DataType::Binary,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::I32(v) => write!(f, "{v}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::F32(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
            Scalar::Str(s) => write!(f, "'{s}'"),
            Scalar::Bin(b) => write!(f, "x'{}'", b.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        }
    }

    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(String),
    Literal(Scalar),
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Any function the planner does not look into.
    Call {
        func: String,
        args: Vec<Expr>,
        return_type: DataType,
    },
}

/// One side of an equality conjunct.
#[derive(Debug, Clone, PartialEq)]
pub enum EqualityOperand<'a> {
    Column(&'a str),
    Literal(&'a Scalar),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn lit(value: Scalar) -> Self {
        Expr::Literal(value)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::And, left, right)
    }

    pub fn as_column(&self) -> Option<&str> {
        match self {
            Expr::Column(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Scalar> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Split a predicate on top-level ANDs.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            match e {
                Expr::BinaryOp {
                    op: BinaryOp::And,
                    left,
                    right,
                } => {
                    stack.push(right);
                    stack.push(left);
                }
                other => out.push(other),
            }
        }
        out
    }

    /// `a = b`, `a = 5` or `5 = a` conjuncts of this predicate. Equalities
    /// with a NULL literal never hold and are skipped.
    pub fn equalities(&self) -> Vec<(EqualityOperand<'_>, EqualityOperand<'_>)> {
        self.conjuncts()
            .into_iter()
            .filter_map(|c| match c {
                Expr::BinaryOp {
                    op: BinaryOp::Eq,
                    left,
                    right,
                } => Some((operand(left)?, operand(right)?)),
                _ => None,
            })
            .collect()
    }

    /// Every column name referenced by this expression.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column(name) => out.push(name),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_columns(out)),
        }
    }

    /// Result type of this expression evaluated against `input`.
    pub fn data_type(&self, input: &Schema) -> Result<DataType> {
        match self {
            Expr::Column(name) => {
                let idx = input.require(name)?;
                Ok(input.fields[idx].data_type.clone())
            }
            Expr::Literal(v) => Ok(v.data_type()),
            Expr::BinaryOp { op, left, .. } => {
                if op.is_comparison() {
                    Ok(DataType::Boolean)
                } else {
                    left.data_type(input)
                }
            }
            Expr::Call { return_type, .. } => Ok(return_type.clone()),
        }
    }
}

fn operand(e: &Expr) -> Option<EqualityOperand<'_>> {
    match e {
        Expr::Column(name) => Some(EqualityOperand::Column(name)),
        Expr::Literal(v) if !v.is_null() => Some(EqualityOperand::Literal(v)),
        _ => None,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{name}"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::BinaryOp { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expr::Call { func, args, .. } => {
                write!(f, "{func}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}
