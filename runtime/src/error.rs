//! Error taxonomy and the coarse caller-facing status surface.

use std::path::PathBuf;

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Caller referenced a slot the stack does not have.
    #[snafu(display("argument slot {index} out of range (stack holds {len})"))]
    SlotOutOfRange { index: usize, len: usize },

    /// Caller tried to replace a non-address slot.
    #[snafu(display("argument slot {index} holds a {kind} value, not an address"))]
    SlotKindMismatch { index: usize, kind: &'static str },

    /// Launch range dimension count outside 1..=3, or mismatched hint length.
    #[snafu(display("launch range has {dims} dimensions, supported range is 1..=3"))]
    InvalidDimensionCount { dims: usize },

    #[snafu(display("global size is zero in dimension {dim}"))]
    ZeroGlobalSize { dim: usize },

    #[snafu(display("launch attributes not set before dispatch"))]
    LaunchNotSet,

    /// Operation on a kernel handle after `dispose`.
    #[snafu(display("kernel handle used after dispose"))]
    Disposed,

    #[snafu(display("failed to spawn assembler '{assembler}': {source}"))]
    AssemblerSpawn { assembler: String, source: std::io::Error },

    #[snafu(display("assembler '{assembler}' exited with {code:?}:\n{stderr}"))]
    AssemblerFailed { assembler: String, code: Option<i32>, stderr: String },

    #[snafu(display("cannot read compiled artifact {}: {source}", path.display()))]
    ArtifactUnreadable { path: PathBuf, source: std::io::Error },

    #[snafu(display("cannot stage kernel source for assembly: {source}"))]
    SourceStaging { source: std::io::Error },

    /// Device backend refused the binary or the entry point.
    #[snafu(display("kernel creation failed: {source}"))]
    ProgramBuild { source: capstan_device::Error },

    /// Array argument lookup failed at push time (stale handle).
    #[snafu(display("array argument rejected: {source}"))]
    ArrayLookup { source: capstan_heap::Error },

    /// Object argument lookup failed at push time (stale handle).
    #[snafu(display("object argument rejected: {source}"))]
    ObjectLookup { source: capstan_heap::Error },

    /// Could not acquire a stability window for an array argument; the
    /// dispatch was aborted before any device call.
    #[snafu(display("failed to pin array argument in slot {slot}: {source}"))]
    PinAcquire { slot: usize, source: capstan_heap::Error },

    #[snafu(display("failed to resolve object argument in slot {slot}: {source}"))]
    ObjectResolve { slot: usize, source: capstan_heap::Error },

    #[snafu(display("dispatch failed: {source}"))]
    Dispatch { source: capstan_device::Error },
}

/// Coarse classification returned across the caller boundary.
///
/// Callers treat any non-success value as fatal to that call; the detailed
/// [`Error`] is for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    InvalidArgument,
    KernelCreateFailed,
    RangeInvalidDims,
    OtherError,
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::SlotOutOfRange { .. }
            | Error::SlotKindMismatch { .. }
            | Error::ZeroGlobalSize { .. }
            | Error::LaunchNotSet
            | Error::Disposed
            | Error::ArrayLookup { .. }
            | Error::ObjectLookup { .. } => Status::InvalidArgument,
            Error::InvalidDimensionCount { .. } => Status::RangeInvalidDims,
            Error::AssemblerSpawn { .. }
            | Error::AssemblerFailed { .. }
            | Error::ArtifactUnreadable { .. }
            | Error::SourceStaging { .. }
            | Error::ProgramBuild { .. } => Status::KernelCreateFailed,
            Error::PinAcquire { .. } | Error::ObjectResolve { .. } | Error::Dispatch { .. } => Status::OtherError,
        }
    }
}
