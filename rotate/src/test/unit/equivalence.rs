//! Output equivalence of rotated nests against the canonical interpreter.

use proptest::prelude::*;
use test_case::test_case;
use tessel_ir::{BufferingPolicy, CopyMechanism, DimEnv, eval};

use crate::test::helpers::*;

#[test_case(0)]
#[test_case(1)]
#[test_case(99)]
fn inner_axis_rotation(n: usize) {
    let chain = inner_chain();
    let rotated = chain.rotate(&[0, 1]).unwrap();
    let dims = DimEnv::new().bind("n", n as i64);
    assert_equivalent(&chain.model, &rotated, &[input_for(n * 3)], &dims);
}

#[test_case(0)]
#[test_case(1)]
#[test_case(99)]
fn outer_axis_rotation(n: usize) {
    let chain = outer_chain([BufferingPolicy::unbuffered(); 3]);
    let rotated = chain.rotate(&[0, 1]).unwrap();
    let dims = DimEnv::new().bind("n", n as i64);
    assert_equivalent(&chain.model, &rotated, &[input_for(n * 3)], &dims);
}

#[test_case(0, 3)]
#[test_case(1, 1)]
#[test_case(99, 3)]
#[test_case(7, 2 ; "ragged final chunk")]
fn non_divisible_split_rotation(rows: usize, cols: usize) {
    let chain = ragged_chain();
    let rotated = chain.rotate(&[0, 1]).unwrap();
    let dims = DimEnv::new().bind("rows", rows as i64).bind("cols", cols as i64);
    assert_equivalent(&chain.model, &rotated, &[input_for(rows * cols)], &dims);
}

#[test_case(0)]
#[test_case(1)]
#[test_case(99)]
fn circular_buffer_beside_a_rotated_stage(n: usize) {
    let chain =
        outer_chain([BufferingPolicy::circular(5), BufferingPolicy::unbuffered(), BufferingPolicy::unbuffered()]);
    let rotated = chain.rotate(&[1]).unwrap();
    assert_eq!(rotated.storage_of(chain.tensors[0]).unwrap().depth, 5);
    let dims = DimEnv::new().bind("n", n as i64);
    assert_equivalent(&chain.model, &rotated, &[input_for(n * 3)], &dims);
}

#[test_case(0)]
#[test_case(1)]
#[test_case(99)]
fn async_copy_feeding_a_rotated_stage(n: usize) {
    let chain = outer_chain_with(
        [BufferingPolicy::circular(5), BufferingPolicy::unbuffered(), BufferingPolicy::unbuffered()],
        CopyMechanism::Async,
    );
    let rotated = chain.rotate(&[1]).unwrap();
    assert_eq!(rotated.pipelines()[0].steady_in_flight, 4);
    let dims = DimEnv::new().bind("n", n as i64);
    assert_equivalent(&chain.model, &rotated, &[input_for(n * 3)], &dims);
}

#[test_case(0)]
#[test_case(1)]
#[test_case(99)]
fn circular_target_rotation(n: usize) {
    let chain =
        outer_chain([BufferingPolicy::circular(5), BufferingPolicy::unbuffered(), BufferingPolicy::unbuffered()]);
    let rotated = chain.rotate(&[0, 1]).unwrap();
    let dims = DimEnv::new().bind("n", n as i64);
    assert_equivalent(&chain.model, &rotated, &[input_for(n * 3)], &dims);
}

#[test]
fn empty_target_set_is_identity() {
    let chain = outer_chain([BufferingPolicy::unbuffered(); 3]);
    let rotated = chain.rotate(&[]).unwrap();

    let dims = DimEnv::new().bind("n", 9);
    let input = input_for(27);
    assert_eq!(
        eval::run(&chain.model, &[input.clone()], &dims).unwrap(),
        eval::run(&rotated, &[input], &dims).unwrap()
    );
    assert_eq!(rotated.loops().len(), chain.model.loops().len());
    assert_eq!(rotated.slots(), chain.model.slots());
}

proptest! {
    #[test]
    fn outer_rotation_matches_for_all_extents(n in 0usize..40, values in proptest::collection::vec(-1e3f64..1e3, 120)) {
        let chain = outer_chain([BufferingPolicy::unbuffered(); 3]);
        let rotated = chain.rotate(&[0, 1]).unwrap();
        let dims = DimEnv::new().bind("n", n as i64);
        let input = values[..n * 3].to_vec();
        prop_assert_eq!(
            eval::run(&chain.model, &[input.clone()], &dims).unwrap(),
            eval::run(&rotated, &[input], &dims).unwrap()
        );
    }

    #[test]
    fn circular_reuse_matches_for_all_extents(n in 0usize..40, values in proptest::collection::vec(-1e3f64..1e3, 120)) {
        let chain =
            outer_chain([BufferingPolicy::circular(5), BufferingPolicy::unbuffered(), BufferingPolicy::unbuffered()]);
        let rotated = chain.rotate(&[0, 1]).unwrap();
        let dims = DimEnv::new().bind("n", n as i64);
        let input = values[..n * 3].to_vec();
        prop_assert_eq!(
            eval::run(&chain.model, &[input.clone()], &dims).unwrap(),
            eval::run(&rotated, &[input], &dims).unwrap()
        );
    }

    #[test]
    fn ragged_rotation_matches_for_all_merged_sizes(rows in 0usize..12, cols in 0usize..12, seed in any::<u32>()) {
        let chain = ragged_chain();
        let rotated = chain.rotate(&[0, 1]).unwrap();
        let dims = DimEnv::new().bind("rows", rows as i64).bind("cols", cols as i64);
        let input: Vec<f64> = (0..rows * cols).map(|i| f64::from(seed % 1000) + i as f64).collect();
        prop_assert_eq!(
            eval::run(&chain.model, &[input.clone()], &dims).unwrap(),
            eval::run(&rotated, &[input], &dims).unwrap()
        );
    }
}
