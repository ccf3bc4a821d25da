use tessel_ir::{BodyItem, BufferingPolicy, Predicate, StageId, Step};

use crate::test::helpers::*;

fn axis_steps(model: &tessel_ir::LoopNestModel, axis: tessel_ir::LoopId) -> Vec<Step> {
    model
        .loop_(axis)
        .body
        .iter()
        .filter_map(|item| match item {
            BodyItem::Step(step) => Some(step.clone()),
            BodyItem::Loop(_) => None,
        })
        .collect()
}

fn stage_order(steps: &[Step]) -> Vec<StageId> {
    steps.iter().map(|s| s.stage).collect()
}

#[test]
fn rotated_stages_move_to_the_tail() {
    let chain = outer_chain([BufferingPolicy::unbuffered(); 3]);
    let rotated = chain.rotate(&[0, 1]).unwrap();

    let steps = axis_steps(&rotated, chain.axis);
    // t3 and the store keep phase i up front; t1 and t2 produce i + 1 behind.
    assert_eq!(stage_order(&steps), vec![chain.stages[2], chain.stages[3], chain.stages[0], chain.stages[1]]);
    assert_eq!(steps[0].index.offset, 0);
    assert_eq!(steps[2].index.offset, 1);
    assert_eq!(steps[3].index.offset, 1);
}

#[test]
fn shifted_load_is_guarded_by_the_axis_extent() {
    let chain = outer_chain([BufferingPolicy::unbuffered(); 3]);
    let rotated = chain.rotate(&[0, 1]).unwrap();

    let steps = axis_steps(&rotated, chain.axis);
    let load = &steps[2];
    let Some(Predicate::Row { index, extent }) = &load.guard else { panic!("shifted load must carry a row guard") };
    assert_eq!(index.offset, 1);
    assert_eq!(*extent, tessel_ir::Extent::dim("n"));
    // The compute that follows it is unguarded.
    assert!(steps[3].guard.is_none());
}

#[test]
fn prefetch_stays_at_the_head() {
    let chain =
        outer_chain([BufferingPolicy::circular(5), BufferingPolicy::unbuffered(), BufferingPolicy::unbuffered()]);
    let rotated = chain.rotate(&[1]).unwrap();

    let steps = axis_steps(&rotated, chain.axis);
    assert_eq!(stage_order(&steps), vec![chain.stages[0], chain.stages[2], chain.stages[3], chain.stages[1]]);
    // Prefetch runs depth - 1 ahead into slot (i + 4) mod 5.
    assert_eq!(steps[0].index.offset, 4);
    let slot = steps[0].slot.as_ref().unwrap();
    assert_eq!((slot.index.offset, slot.modulus), (4, 5));
    // The rotated compute reads its operand one ahead, modulo the full depth.
    let read = steps[3].read_slot.as_ref().unwrap();
    assert_eq!((read.index.offset, read.modulus), (1, 5));
}

#[test]
fn circular_target_produces_depth_ahead() {
    let chain =
        outer_chain([BufferingPolicy::circular(5), BufferingPolicy::unbuffered(), BufferingPolicy::unbuffered()]);
    let rotated = chain.rotate(&[0, 1]).unwrap();

    let steps = axis_steps(&rotated, chain.axis);
    let load = steps.iter().find(|s| s.stage == chain.stages[0]).unwrap();
    assert_eq!(load.index.offset, 5);
    assert_eq!(load.slot.as_ref().unwrap().modulus, 5);
    // t2 still runs one ahead, reading t1's slot (i + 1) mod 5.
    let compute = steps.iter().find(|s| s.stage == chain.stages[1]).unwrap();
    assert_eq!(compute.index.offset, 1);
    assert_eq!((compute.read_slot.as_ref().unwrap().index.offset, compute.read_slot.as_ref().unwrap().modulus), (1, 5));
}

#[test]
fn stationary_consumers_follow_widened_storage() {
    let chain = outer_chain([BufferingPolicy::unbuffered(); 3]);
    let rotated = chain.rotate(&[0, 1]).unwrap();

    let steps = axis_steps(&rotated, chain.axis);
    // t3 consumes rotated t2 at phase i through the two-slot parity array.
    let t3 = steps.iter().find(|s| s.stage == chain.stages[2]).unwrap();
    let read = t3.read_slot.as_ref().unwrap();
    assert_eq!((read.index.offset, read.modulus), (0, 2));
    // The store consumes un-pipelined t3 exactly as before.
    let store = steps.iter().find(|s| s.stage == chain.stages[3]).unwrap();
    assert_eq!(store.read_slot.as_ref().unwrap().modulus, 1);
}

#[test]
fn ragged_axis_guards_per_element() {
    let chain = ragged_chain();
    let rotated = chain.rotate(&[0, 1]).unwrap();

    let steps = axis_steps(&rotated, chain.axis);
    let load = steps.iter().find(|s| s.stage == chain.stages[0]).unwrap();
    let Some(Predicate::Element { index, stride, .. }) = &load.guard else {
        panic!("ragged shifted load must carry an element guard")
    };
    assert_eq!((index.offset, *stride), (1, 5));
    // The store keeps its original per-element guard at phase i.
    let store = steps.iter().find(|s| s.stage == chain.stages[3]).unwrap();
    assert!(matches!(store.guard, Some(Predicate::Element { .. })));
}

#[test]
fn trip_count_is_never_altered() {
    let chain = outer_chain([BufferingPolicy::unbuffered(); 3]);
    let rotated = chain.rotate(&[0, 1]).unwrap();
    assert_eq!(rotated.loop_(chain.axis).extent, chain.model.loop_(chain.axis).extent);
}
