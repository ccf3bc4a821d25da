//! Synthesis of the index expressions, slot selectors and boundary guards the
//! rewritten body carries.
//!
//! Every derived quantity is a pure function of the axis variable: a slot is
//! `(i + k) mod D`, a guard is `(i + k) < extent` or its element-granular form
//! over a ragged merged domain. No phase counter survives an iteration.

use tessel_ir::{IndexExpr, LoopNestModel, Predicate, SlotIndex, Stage, StageKind, TensorId};

use crate::planner::{RotationPlan, TensorPlan};

pub(crate) struct Synthesizer<'m> {
    model: &'m LoopNestModel,
    plan: &'m RotationPlan,
}

impl<'m> Synthesizer<'m> {
    pub fn new(model: &'m LoopNestModel, plan: &'m RotationPlan) -> Self {
        Self { model, plan }
    }

    /// `i + shift` in the axis variable.
    pub fn shifted(&self, shift: i64) -> IndexExpr {
        IndexExpr::at(self.plan.axis, shift)
    }

    /// Absolute instance `k`, for peeled steps with no axis variable in scope.
    pub fn peeled(&self, k: i64) -> IndexExpr {
        IndexExpr::constant(k)
    }

    pub fn write_slot(&self, plan: &TensorPlan, index: IndexExpr) -> SlotIndex {
        SlotIndex::new(index, plan.phys_depth)
    }

    /// Slot a consumer addresses `tensor` with: modulo the producer's physical
    /// depth, in the consumer's own instance index.
    pub fn read_slot(&self, tensor: TensorId, index: IndexExpr) -> SlotIndex {
        SlotIndex::new(index, self.plan.read_depth(tensor))
    }

    /// Boundary guard for a memory stage issued at `index`. Loads are always
    /// guarded once shifted or peeled; compute stages run unguarded because an
    /// over-read of a zero-filled slot never reaches an output.
    pub fn memory_guard(&self, stage: &Stage, index: IndexExpr) -> Option<Predicate> {
        match stage.kind {
            StageKind::Map { .. } => None,
            StageKind::Load { .. } | StageKind::Store { .. } => Some(self.bound_check(stage, index)),
        }
    }

    fn bound_check(&self, stage: &Stage, index: IndexExpr) -> Predicate {
        let axis_extent = &self.model.loop_(self.plan.axis).extent;
        if axis_extent.is_ragged() {
            Predicate::Element { index, stride: stage.elems, bound: stage.domain.clone() }
        } else {
            Predicate::Row { index, extent: axis_extent.clone() }
        }
    }
}
