//! Index expressions, modulo slot selectors, and boundary predicates.
//!
//! Everything here is a pure function of loop index variables: rotated code
//! never carries mutable phase counters across iterations. A slot selector is
//! `(i + k) mod D`, a boundary predicate is `(i + k) < extent` (or its
//! element-granular form for ragged splits), both expressed in the rotated
//! loop's own index variable.

use std::collections::HashMap;
use std::fmt;

use snafu::OptionExt;

use crate::error::{LoopVarOutOfScopeSnafu, Result};
use crate::extent::{DimEnv, Extent};
use crate::model::LoopId;

/// Concrete values of the loop variables currently in scope.
pub type LoopEnv = HashMap<LoopId, i64>;

/// An affine index in a single loop variable: `i + offset`, or the bare
/// constant `offset` when no variable is in scope (peeled prologue steps).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexExpr {
    pub var: Option<LoopId>,
    pub offset: i64,
}

impl IndexExpr {
    pub fn at(var: LoopId, offset: i64) -> Self {
        Self { var: Some(var), offset }
    }

    pub fn constant(offset: i64) -> Self {
        Self { var: None, offset }
    }

    pub fn eval(&self, env: &LoopEnv) -> Result<i64> {
        match self.var {
            None => Ok(self.offset),
            Some(var) => {
                let i =
                    env.get(&var).copied().context(LoopVarOutOfScopeSnafu { name: format!("i{}", var.0) })?;
                Ok(i + self.offset)
            }
        }
    }
}

impl fmt::Display for IndexExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.var, self.offset) {
            (None, k) => write!(f, "{k}"),
            (Some(var), 0) => write!(f, "i{}", var.0),
            (Some(var), k) => write!(f, "i{} + {k}", var.0),
        }
    }
}

/// A modulo slot selector: `(i + k) mod modulus`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotIndex {
    pub index: IndexExpr,
    pub modulus: u32,
}

impl SlotIndex {
    pub fn new(index: IndexExpr, modulus: u32) -> Self {
        debug_assert!(modulus > 0);
        Self { index, modulus }
    }

    pub fn eval(&self, env: &LoopEnv) -> Result<u32> {
        Ok(self.index.eval(env)?.rem_euclid(self.modulus as i64) as u32)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) % {}", self.index, self.modulus)
    }
}

/// A boundary guard for a shifted memory access.
///
/// `Row` guards the loop coordinate itself; `Element` guards the flat element
/// position of a ragged split, where the final chunk is only partially valid.
/// Both are exact: for any logical index `j` the predicate holds iff `j` lies
/// inside the pre-rotation domain, and negative warm-up indices are always
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// `0 <= index < extent`.
    Row { index: IndexExpr, extent: Extent },
    /// `0 <= index * stride + e < bound` for element `e` of the step.
    Element { index: IndexExpr, stride: i64, bound: Extent },
}

impl Predicate {
    pub fn eval(&self, env: &LoopEnv, elem: i64, dims: &DimEnv) -> Result<bool> {
        match self {
            Self::Row { index, extent } => {
                let j = index.eval(env)?;
                Ok(j >= 0 && j < extent.eval(dims)?)
            }
            Self::Element { index, stride, bound } => {
                let flat = index.eval(env)? * stride + elem;
                Ok(flat >= 0 && flat < bound.eval(dims)?)
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row { index, extent } => write!(f, "({}) < {}", index, extent),
            Self::Element { index, stride, bound } => write!(f, "({}) * {} + e < {}", index, stride, bound),
        }
    }
}
