//! Symbolic trip-count expressions.
//!
//! Loop extents are not always compile-time constants: a loop may iterate over
//! a runtime dimension size, a product of two merged dimensions, or a
//! non-divisible split (`ceilDiv(rows * cols, chunk)`). [`Extent`] captures
//! exactly the shapes the scheduler produces, and evaluates against a
//! [`DimEnv`] binding of dimension names to concrete sizes.

use std::collections::HashMap;
use std::fmt;

use snafu::OptionExt;

use crate::error::{Result, UnboundDimensionSnafu};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extent {
    /// A compile-time constant trip count.
    Const(i64),
    /// A runtime dimension size, identified by name.
    Dim(String),
    /// A merged domain, e.g. `rows * cols`.
    Mul(Box<Extent>, Box<Extent>),
    /// A non-divisible split: `ceilDiv(inner, chunk)` with `chunk > 0`.
    CeilDiv(Box<Extent>, i64),
}

impl Extent {
    pub fn dim(name: impl Into<String>) -> Self {
        Self::Dim(name.into())
    }

    pub fn mul(lhs: Extent, rhs: Extent) -> Self {
        Self::Mul(Box::new(lhs), Box::new(rhs))
    }

    pub fn ceil_div(inner: Extent, chunk: i64) -> Self {
        debug_assert!(chunk > 0, "split chunk must be positive");
        Self::CeilDiv(Box::new(inner), chunk)
    }

    /// Evaluate to a concrete trip count.
    pub fn eval(&self, env: &DimEnv) -> Result<i64> {
        match self {
            Self::Const(v) => Ok(*v),
            Self::Dim(name) => env.get(name).context(UnboundDimensionSnafu { name }),
            Self::Mul(lhs, rhs) => Ok(lhs.eval(env)? * rhs.eval(env)?),
            Self::CeilDiv(inner, chunk) => Ok((inner.eval(env)? + chunk - 1).div_euclid(*chunk)),
        }
    }

    /// True if this extent came from a non-divisible split, i.e. the last
    /// chunk of the iteration domain may be ragged.
    pub fn is_ragged(&self) -> bool {
        match self {
            Self::Const(_) | Self::Dim(_) => false,
            Self::Mul(lhs, rhs) => lhs.is_ragged() || rhs.is_ragged(),
            Self::CeilDiv(..) => true,
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(v) => write!(f, "{v}"),
            Self::Dim(name) => write!(f, "{name}"),
            Self::Mul(lhs, rhs) => write!(f, "{lhs} * {rhs}"),
            Self::CeilDiv(inner, chunk) => write!(f, "ceilDiv({inner}, {chunk})"),
        }
    }
}

/// Concrete bindings for the runtime dimensions of a model.
#[derive(Debug, Clone, Default)]
pub struct DimEnv {
    dims: HashMap<String, i64>,
}

impl DimEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a dimension, consuming and returning the environment so bindings chain.
    pub fn bind(mut self, name: impl Into<String>, size: i64) -> Self {
        self.dims.insert(name.into(), size);
        self
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.dims.get(name).copied()
    }
}
