//! Loop rotation: software pipelining of a serial loop-nest axis.
//!
//! Given a nest, an axis, and an ordered set of producer stages, the pass
//! peels warm-up instances of those stages ahead of the axis loop and
//! rewrites the loop body into consume-then-produce-ahead order, so loads for
//! future iterations overlap the compute and store of the current one. The
//! trip count of the axis never changes; only the phase of work inside each
//! iteration does.
//!
//! The pass is a pure function from model to model. Failures are synchronous
//! diagnostics ([`Error`]) raised before anything is rewritten.

pub mod error;
pub mod planner;

mod alias;
mod indexing;
mod prologue;
mod steady;


pub use error::{Error, Result};
pub use planner::RotationSpec;

use smallvec::SmallVec;
use tessel_ir::{BodyItem, LoopId, LoopNestModel};

use crate::indexing::Synthesizer;

/// Rotate `spec.targets` around `spec.axis`, returning the rewritten model.
///
/// An empty target set is the identity transformation.
#[tracing::instrument(skip_all, fields(axis = spec.axis.0, targets = spec.targets.len()))]
pub fn rotate_loop(model: &LoopNestModel, spec: &RotationSpec) -> Result<LoopNestModel> {
    if spec.targets.is_empty() {
        return Ok(model.clone());
    }

    let plan = planner::plan(model, spec)?;
    tracing::debug!(pipelined = plan.pipelined.len(), axis_depth = plan.axis_depth, "rotation plan validated");

    let syn = Synthesizer::new(model, &plan);
    let peeled = prologue::build(model, &plan, &syn);

    let mut loops = model.loops().to_vec();
    loops[plan.axis.0 as usize].body = steady::rewrite_axis_body(model, &plan, &syn);

    let mut roots: SmallVec<[BodyItem; 4]> = model.roots().iter().cloned().collect();
    match plan.axis_depth {
        1 => splice_before(&mut roots, plan.axis, peeled),
        d => splice_before(&mut loops[d - 2].body, plan.axis, peeled),
    }

    let (slots, bindings, pipelines) = alias::assign_storage(model, &plan);
    Ok(model.rebuilt(loops, slots, bindings, pipelines, roots))
}

/// Insert the peeled steps directly ahead of the axis loop in its parent body.
fn splice_before(items: &mut SmallVec<[BodyItem; 4]>, axis: LoopId, peeled: SmallVec<[BodyItem; 4]>) {
    let at = items.iter().position(|item| matches!(item, BodyItem::Loop(l) if *l == axis)).unwrap_or(items.len());
    for (k, item) in peeled.into_iter().enumerate() {
        items.insert(at + k, item);
    }
}
