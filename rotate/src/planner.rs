//! Legality checking and per-tensor look-ahead planning.
//!
//! Planning decides, for every tensor the rotation touches, how many
//! iterations ahead of the axis its producer will run and how many physical
//! slots its storage needs. Two producer roles come out of a plan:
//!
//! * **rotated** — the stage is in the target set. It moves to the tail of the
//!   rewritten body and runs `depth(t)` iterations ahead (one iteration for
//!   single-slot tensors).
//! * **head prefetch** — the stage is not a target but produces a multi-slot
//!   tensor at the axis. It stays at the head of the body and runs
//!   `depth(t) - 1` iterations ahead, which is what keeps a circular buffer
//!   full without reordering the stage past its consumers.
//!
//! Everything downstream (prologue, steady-state rewrite, storage assignment)
//! is a mechanical consequence of the plan.

use std::collections::HashMap;

use itertools::Itertools;
use tessel_ir::{LoopId, LoopNestModel, StageId, StageKind, TensorId};

use crate::error::{InvalidRotationSpecSnafu, NonRotatableStageSnafu, Result, UnsupportedBufferingCombinationSnafu};

/// A rotation request: the serial axis to pipeline and the ordered set of
/// stages to issue ahead of it.
#[derive(Debug, Clone)]
pub struct RotationSpec {
    pub axis: LoopId,
    pub targets: Vec<StageId>,
}

impl RotationSpec {
    pub fn new(axis: LoopId, targets: impl IntoIterator<Item = StageId>) -> Self {
        Self { axis, targets: targets.into_iter().collect() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Rotated,
    HeadPrefetch,
}

/// Placement decision for one pipelined tensor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TensorPlan {
    pub tensor: TensorId,
    pub stage: StageId,
    pub role: Role,
    /// Iterations the producer runs ahead of the axis variable.
    pub shift: i64,
    /// Physical slots the tensor's storage cycles through.
    pub phys_depth: u32,
    /// Producer instances peeled into the prologue.
    pub warmup: i64,
}

/// The validated plan: pipelined tensors in program order, plus the axis they
/// pipeline over.
#[derive(Debug, Clone)]
pub(crate) struct RotationPlan {
    pub axis: LoopId,
    pub axis_depth: usize,
    pub pipelined: Vec<TensorPlan>,
    by_tensor: HashMap<TensorId, usize>,
    by_stage: HashMap<StageId, usize>,
}

impl RotationPlan {
    pub fn of_tensor(&self, tensor: TensorId) -> Option<&TensorPlan> {
        self.by_tensor.get(&tensor).map(|&i| &self.pipelined[i])
    }

    pub fn of_stage(&self, stage: StageId) -> Option<&TensorPlan> {
        self.by_stage.get(&stage).map(|&i| &self.pipelined[i])
    }

    /// Physical slot count a consumer must address `tensor` with.
    pub fn read_depth(&self, tensor: TensorId) -> u32 {
        self.of_tensor(tensor).map_or(1, |p| p.phys_depth)
    }
}

/// Validate `spec` against `model` and compute the per-tensor plan.
pub(crate) fn plan(model: &LoopNestModel, spec: &RotationSpec) -> Result<RotationPlan> {
    let axis_depth = model.nest_depth(spec.axis).ok_or_else(|| {
        InvalidRotationSpecSnafu { reason: format!("axis loop #{} is not part of the nest", spec.axis.0) }.build()
    })?;

    check_targets(model, spec, axis_depth)?;

    // Pipelined producers in program order: rotated targets plus every
    // multi-slot tensor produced right at the axis. Program order already
    // respects dependence, so prologue and steady-state emission can follow it
    // directly.
    let mut pipelined = Vec::new();
    for (id, stage) in model.stage_entries() {
        let declared = model.buffering(stage.tensor).depth();
        let p = if spec.targets.contains(&id) {
            let depth = declared.max(1) as i64;
            TensorPlan {
                tensor: stage.tensor,
                stage: id,
                role: Role::Rotated,
                shift: depth,
                // Single-slot rotated tensors get a second slot so the value
                // consumed at parity p survives the produce that will occupy
                // parity 1 - p.
                phys_depth: if declared > 1 { declared } else { 2 },
                warmup: depth,
            }
        } else if declared > 1 && stage.depth == axis_depth && !matches!(stage.kind, StageKind::Store { .. }) {
            TensorPlan {
                tensor: stage.tensor,
                stage: id,
                role: Role::HeadPrefetch,
                shift: declared as i64 - 1,
                phys_depth: declared,
                warmup: declared as i64 - 1,
            }
        } else {
            continue;
        };
        pipelined.push(p);
    }

    let by_tensor = pipelined.iter().enumerate().map(|(i, p)| (p.tensor, i)).collect();
    let by_stage = pipelined.iter().enumerate().map(|(i, p)| (p.stage, i)).collect();
    let plan = RotationPlan { axis: spec.axis, axis_depth, pipelined, by_tensor, by_stage };

    check_lookahead(model, &plan)?;
    check_consumers(model, &plan)?;
    Ok(plan)
}

fn check_targets(model: &LoopNestModel, spec: &RotationSpec, axis_depth: usize) -> Result<()> {
    for (pos, &id) in spec.targets.iter().enumerate() {
        if id.0 as usize >= model.stages().len() {
            return InvalidRotationSpecSnafu { reason: format!("target stage #{} does not exist", id.0) }.fail();
        }
        let stage = model.stage(id);
        let name = model.tensor_name(stage.tensor);

        if stage.depth != axis_depth {
            return InvalidRotationSpecSnafu {
                reason: format!("stage producing {name} is not scheduled at the axis loop"),
            }
            .fail();
        }
        if matches!(stage.kind, StageKind::Store { .. }) {
            return NonRotatableStageSnafu {
                tensor: name.to_owned(),
                reason: "it stores to an external output".to_owned(),
            }
            .fail();
        }
        if stage.side_effecting {
            return NonRotatableStageSnafu {
                tensor: name.to_owned(),
                reason: "its side effect would be replayed".to_owned(),
            }
            .fail();
        }
        if !stage.idempotent {
            return NonRotatableStageSnafu { tensor: name.to_owned(), reason: "it is not idempotent".to_owned() }.fail();
        }

        // Targets must arrive producer-first, matching the order the prologue
        // replays them in.
        if let Some(src) = stage.kind.src_tensor()
            && let Some(producer) = model.producer_of(src)
            && let Some(producer_pos) = spec.targets.iter().position(|&t| t == producer)
            && producer_pos > pos
        {
            return InvalidRotationSpecSnafu {
                reason: format!("targets are not in dependency order: {name} is listed before its operand"),
            }
            .fail();
        }
    }

    if let Some(dup) = spec.targets.iter().duplicates().next() {
        let name = model.tensor_name(model.stage(*dup).tensor);
        return InvalidRotationSpecSnafu { reason: format!("stage producing {name} is targeted twice") }.fail();
    }
    Ok(())
}

/// Every pipelined stage reads its operand `shift` iterations ahead; the
/// operand's own producer must run at least that far ahead itself.
fn check_lookahead(model: &LoopNestModel, plan: &RotationPlan) -> Result<()> {
    for p in &plan.pipelined {
        let stage = model.stage(p.stage);
        let Some(src) = stage.kind.src_tensor() else { continue };
        let src_name = model.tensor_name(src);
        // Producer existence is validated when the model is built.
        let Some(producer) = model.producer_of(src) else { continue };
        let producer_depth = model.stage(producer).depth;

        if producer_depth < plan.axis_depth {
            // Invariant across the axis; always resident.
            continue;
        }
        if producer_depth > plan.axis_depth {
            return InvalidRotationSpecSnafu {
                reason: format!("operand {src_name} is produced inside a loop nested below the axis"),
            }
            .fail();
        }

        let available = plan.of_stage(producer).map_or(0, |sp| sp.shift);
        if available >= p.shift {
            continue;
        }
        let declared = model.buffering(src).depth();
        if declared <= 1 && plan.of_stage(producer).is_none() {
            return InvalidRotationSpecSnafu {
                reason: format!(
                    "stage producing {} reads {src_name}, which is produced in the same iteration outside the \
                     rotation set",
                    model.tensor_name(stage.tensor)
                ),
            }
            .fail();
        }
        let required = if plan.of_stage(producer).is_some_and(|sp| sp.role == Role::Rotated) {
            p.shift as u32
        } else {
            p.shift as u32 + 1
        };
        return UnsupportedBufferingCombinationSnafu { tensor: src_name.to_owned(), declared, required }.fail();
    }
    Ok(())
}

/// Consumers of a pipelined tensor must sit at the axis so their slot reads
/// can be phrased in the axis variable alone.
fn check_consumers(model: &LoopNestModel, plan: &RotationPlan) -> Result<()> {
    for p in &plan.pipelined {
        for consumer in model.consumers_of(p.tensor) {
            if model.stage(consumer).depth != plan.axis_depth {
                let name = model.tensor_name(p.tensor);
                return InvalidRotationSpecSnafu {
                    reason: format!("a consumer of pipelined tensor {name} is not scheduled at the axis loop"),
                }
                .fail();
            }
        }
    }
    Ok(())
}
