//! Steady-state body rewriting: consume first, produce ahead last.
//!
//! The rewritten axis body has three sections:
//!
//! 1. **head** — prefetch issues for multi-slot tensors outside the rotation
//!    set, `depth - 1` iterations ahead, keeping their circular buffers full;
//! 2. **middle** — the untouched remainder of the body at phase `i`, with
//!    reads of pipelined tensors re-addressed modulo their physical depth;
//! 3. **tail** — the rotated stages, each producing for iteration
//!    `i + shift(t)` into slot `(i + shift(t)) mod depth`.
//!
//! Consumes precede the produces that will eventually reoccupy their slots,
//! so a slot is never clobbered while the current iteration still reads it.

use smallvec::SmallVec;
use tessel_ir::{BodyItem, LoopNestModel, Step};

use crate::indexing::Synthesizer;
use crate::planner::{Role, RotationPlan, TensorPlan};

pub(crate) fn rewrite_axis_body(
    model: &LoopNestModel,
    plan: &RotationPlan,
    syn: &Synthesizer<'_>,
) -> SmallVec<[BodyItem; 4]> {
    let mut head = SmallVec::<[BodyItem; 4]>::new();
    let mut tail = SmallVec::<[BodyItem; 4]>::new();
    for p in &plan.pipelined {
        match p.role {
            Role::HeadPrefetch => head.push(shifted_step(model, syn, p)),
            Role::Rotated => tail.push(shifted_step(model, syn, p)),
        }
    }

    let mut body = head;
    for item in &model.loop_(plan.axis).body {
        match item {
            BodyItem::Loop(inner) => body.push(BodyItem::Loop(*inner)),
            BodyItem::Step(step) => {
                if plan.of_stage(step.stage).is_some() {
                    continue;
                }
                body.push(BodyItem::Step(readdressed(model, syn, step)));
            }
        }
    }
    body.extend(tail);
    body
}

fn shifted_step(model: &LoopNestModel, syn: &Synthesizer<'_>, p: &TensorPlan) -> BodyItem {
    let stage = model.stage(p.stage);
    let index = syn.shifted(p.shift);
    BodyItem::Step(Step {
        stage: p.stage,
        index: index.clone(),
        guard: syn.memory_guard(stage, index.clone()),
        slot: Some(syn.write_slot(p, index.clone())),
        read_slot: stage.kind.src_tensor().map(|src| syn.read_slot(src, index)),
    })
}

/// A stage that stays in place keeps its phase and guards; only its operand
/// slot changes, to follow the operand's widened storage.
fn readdressed(model: &LoopNestModel, syn: &Synthesizer<'_>, step: &Step) -> Step {
    let mut step = step.clone();
    if let Some(src) = model.stage(step.stage).kind.src_tensor() {
        step.read_slot = Some(syn.read_slot(src, step.index.clone()));
    }
    step
}
