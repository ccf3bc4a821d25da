//! Core loop-nest representation for the tessel pipelining passes.
//!
//! The crate provides the structural vocabulary the transforms operate on:
//! symbolic [`Extent`]s over runtime dimensions, affine [`IndexExpr`]s with
//! modulo [`SlotIndex`] selectors and boundary [`Predicate`]s, the arena-based
//! [`LoopNestModel`] with its [`NestBuilder`], and a literal reference
//! interpreter ([`eval::run`]) used to check that rewritten nests still
//! compute what the canonical nest computes.

pub mod error;
pub mod eval;
pub mod extent;
pub mod index;
pub mod model;

pub use error::{Error, Result};
pub use extent::{DimEnv, Extent};
pub use index::{IndexExpr, LoopEnv, Predicate, SlotIndex};
pub use model::{
    AsyncPipeline, BodyItem, BufferingPolicy, CopyMechanism, ElemOp, Loop, LoopId, LoopNestModel, NestBuilder,
    SlotArray, SlotBinding, SlotId, Stage, StageId, StageKind, Step, TensorDecl, TensorId,
};
