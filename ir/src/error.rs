use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A symbolic dimension was evaluated without a concrete binding.
    #[snafu(display("dimension {name} is not bound in the evaluation environment"))]
    UnboundDimension { name: String },

    /// An extent evaluated to a negative trip count.
    #[snafu(display("extent {extent} evaluated to negative value {value}"))]
    NegativeExtent { extent: String, value: i64 },

    /// A loop index variable was referenced outside its loop.
    #[snafu(display("loop variable {name} referenced outside its loop"))]
    LoopVarOutOfScope { name: String },

    /// Stages are single-assignment: one producer per tensor.
    #[snafu(display("tensor {tensor} has more than one producing stage"))]
    MultipleProducers { tensor: String },

    /// A tensor is consumed but no stage produces it.
    #[snafu(display("tensor {tensor} is consumed but never produced"))]
    MissingProducer { tensor: String },

    /// Operand element counts must match the consuming stage.
    #[snafu(display(
        "stage producing {tensor} has {elems} elements per instance but its operand {src} has {src_elems}"
    ))]
    ElemCountMismatch { tensor: String, elems: i64, src: String, src_elems: i64 },

    /// A stage was declared deeper than the loop nest.
    #[snafu(display("stage producing {tensor} is declared at depth {depth} but the nest has {nesting} loops"))]
    DepthOutOfRange { tensor: String, depth: usize, nesting: usize },

    /// A buffered tensor has no entry in the storage indirection table.
    #[snafu(display("tensor {tensor} has no storage binding"))]
    MissingBinding { tensor: String },

    /// An external input buffer referenced by a load stage was not supplied.
    #[snafu(display("input buffer {index} was not supplied to the interpreter"))]
    MissingInput { index: usize },

    /// A predicated access escaped its declared bounds.
    #[snafu(display("out-of-bounds access through {tensor}: element {index} of a buffer of {len}"))]
    OutOfBoundsAccess { tensor: String, index: i64, len: usize },
}
