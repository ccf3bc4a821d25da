//! Physical storage assignment for the rewritten model.
//!
//! Storage stays an indirection table from logical tensor to a tensor-scoped
//! slot array; pipelining only widens the arrays. A rotated single-slot
//! tensor's "current" and "next" phases alias the same two-slot array through
//! parity, rather than each getting fresh storage. Asynchronous-copy
//! pipelines additionally record the in-flight count the downstream barrier
//! emission must wait on.

use std::collections::HashMap;

use tessel_ir::{AsyncPipeline, CopyMechanism, LoopNestModel, SlotArray, SlotBinding, SlotId, StageKind, TensorId};

use crate::planner::RotationPlan;

pub(crate) fn assign_storage(
    model: &LoopNestModel,
    plan: &RotationPlan,
) -> (Vec<SlotArray>, HashMap<TensorId, SlotBinding>, Vec<AsyncPipeline>) {
    let mut slots = Vec::with_capacity(model.slots().len());
    let mut bindings = HashMap::new();
    for array in model.slots() {
        let depth = plan.of_tensor(array.tensor).map_or(array.depth, |p| p.phys_depth);
        let id = SlotId(slots.len() as u32);
        slots.push(SlotArray { tensor: array.tensor, elems: array.elems, depth });
        bindings.insert(array.tensor, SlotBinding { array: id });
    }

    // At steady state a depth-D async pipeline has D - 1 copies issued and
    // not yet waited on.
    let mut pipelines = Vec::new();
    for p in &plan.pipelined {
        if matches!(model.stage(p.stage).kind, StageKind::Load { mechanism: CopyMechanism::Async, .. }) {
            pipelines.push(AsyncPipeline { tensor: p.tensor, depth: p.phys_depth, steady_in_flight: p.phys_depth - 1 });
        }
    }
    (slots, bindings, pipelines)
}
