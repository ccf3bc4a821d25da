use tessel_ir::{BufferingPolicy, CopyMechanism};

use crate::test::helpers::*;

#[test]
fn rotated_single_slot_tensors_get_parity_storage() {
    let chain = outer_chain([BufferingPolicy::unbuffered(); 3]);
    let rotated = chain.rotate(&[0, 1]).unwrap();

    let [t1, t2, t3, _] = chain.tensors[..] else { unreachable!() };
    assert_eq!(rotated.storage_of(t1).unwrap().depth, 2);
    assert_eq!(rotated.storage_of(t2).unwrap().depth, 2);
    // Untouched tensors keep their single slot.
    assert_eq!(rotated.storage_of(t3).unwrap().depth, 1);
}

#[test]
fn circular_storage_is_sized_for_the_declared_depth() {
    let chain =
        outer_chain([BufferingPolicy::circular(5), BufferingPolicy::unbuffered(), BufferingPolicy::unbuffered()]);
    let rotated = chain.rotate(&[1]).unwrap();

    let t1 = chain.tensors[0];
    let array = rotated.storage_of(t1).unwrap();
    assert_eq!(array.depth, 5);
    assert_eq!(array.len(), 15);
}

#[test]
fn storage_stays_tensor_scoped() {
    let chain = outer_chain([BufferingPolicy::unbuffered(); 3]);
    let rotated = chain.rotate(&[0, 1]).unwrap();

    // One array per buffered tensor, and every binding resolves to an array
    // recorded for exactly that tensor.
    for &tensor in &chain.tensors[..3] {
        assert_eq!(rotated.storage_of(tensor).unwrap().tensor, tensor);
    }
}

#[test]
fn async_pipeline_reports_steady_in_flight_count() {
    let chain = outer_chain_with(
        [BufferingPolicy::circular(5), BufferingPolicy::unbuffered(), BufferingPolicy::unbuffered()],
        CopyMechanism::Async,
    );
    let rotated = chain.rotate(&[1]).unwrap();

    let [pipeline] = rotated.pipelines() else { panic!("expected one async pipeline") };
    assert_eq!(pipeline.tensor, chain.tensors[0]);
    assert_eq!(pipeline.depth, 5);
    assert_eq!(pipeline.steady_in_flight, 4);
}

#[test]
fn sync_buffers_record_no_pipeline() {
    let chain =
        outer_chain([BufferingPolicy::circular(5), BufferingPolicy::unbuffered(), BufferingPolicy::unbuffered()]);
    let rotated = chain.rotate(&[1]).unwrap();
    assert!(rotated.pipelines().is_empty());
}
