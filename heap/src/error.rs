use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Handle refers to a cell that was freed or whose slot was reused.
    #[snafu(display("stale handle: slot {index} generation {generation}"))]
    StaleHandle { index: usize, generation: u32 },

    /// The cell still has live pins and cannot be freed.
    #[snafu(display("cell {index} is pinned ({pins} live pins)"))]
    PinnedLive { index: usize, pins: u32 },

    #[snafu(display("size mismatch: cell holds {expected} bytes, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },
}
