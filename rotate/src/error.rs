use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Diagnostics for a rejected rotation request. The pass either transforms the
/// whole nest or refuses up front; it never emits a partially rotated model.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The axis/target selection itself is malformed, or honouring it would
    /// reorder a dependence the rotation set does not cover.
    #[snafu(display("invalid rotation selection: {reason}"))]
    InvalidRotationSpec { reason: String },

    /// A declared buffering depth is too shallow for the look-ahead the
    /// selection needs.
    #[snafu(display(
        "tensor {tensor}: buffering depth {declared} cannot cover the required look-ahead (needs depth {required})"
    ))]
    UnsupportedBufferingCombination { tensor: String, declared: u32, required: u32 },

    /// The target stage cannot be replayed ahead of its loop.
    #[snafu(display("stage producing {tensor} cannot be issued early: {reason}"))]
    NonRotatableStage { tensor: String, reason: String },
}
