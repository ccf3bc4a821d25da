//! Warm-up peeling: the steps executed once, ahead of the axis loop.
//!
//! Each pipelined tensor replays its first `warmup` producer instances with
//! absolute indices, so the steady-state loop starts with every look-ahead
//! value already resident. The peeled steps keep their guards, which is what
//! makes degenerate extents (0 or 1) safe: the steps still exist, their
//! guards just evaluate false and the loads become zero-fills.

use smallvec::SmallVec;
use tessel_ir::{BodyItem, LoopNestModel, Step};

use crate::indexing::Synthesizer;
use crate::planner::RotationPlan;

pub(crate) fn build(model: &LoopNestModel, plan: &RotationPlan, syn: &Synthesizer<'_>) -> SmallVec<[BodyItem; 4]> {
    let mut items = SmallVec::new();
    for p in &plan.pipelined {
        let stage = model.stage(p.stage);
        for k in 0..p.warmup {
            let index = syn.peeled(k);
            let step = Step {
                stage: p.stage,
                index: index.clone(),
                guard: syn.memory_guard(stage, index.clone()),
                slot: Some(syn.write_slot(p, index.clone())),
                read_slot: stage.kind.src_tensor().map(|src| syn.read_slot(src, index)),
            };
            items.push(BodyItem::Step(step));
        }
    }
    items
}
