//! Launch geometry: the (grid, group) decomposition of a dispatch.

/// Highest dimension count the dispatch interface supports.
pub const MAX_DIMS: usize = 3;

/// Per-dimension (grid, group) pair for 1–3 dimensions.
///
/// Invariant, maintained by the resolver that builds these:
/// `grid * group` reproduces the caller's requested global extent in every
/// dimension, and `group <= global`. Unused dimensions read as extent 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    dims: usize,
    grid: [u32; MAX_DIMS],
    group: [u32; MAX_DIMS],
}

impl LaunchGeometry {
    pub fn new(dims: usize, grid: [u32; MAX_DIMS], group: [u32; MAX_DIMS]) -> Self {
        debug_assert!((1..=MAX_DIMS).contains(&dims));
        Self { dims, grid, group }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn grid(&self, dim: usize) -> u32 {
        self.grid[dim]
    }

    pub fn group(&self, dim: usize) -> u32 {
        self.group[dim]
    }

    /// Global extent of one dimension (`grid * group`).
    pub fn global(&self, dim: usize) -> u32 {
        self.grid[dim] * self.group[dim]
    }

    /// Total number of work-items across all dimensions.
    pub fn work_items(&self) -> u64 {
        (0..MAX_DIMS).map(|dim| u64::from(self.global(dim))).product()
    }
}

/// Absolute id of one work-item within a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub id: [u32; MAX_DIMS],
}

impl WorkItem {
    pub fn x(&self) -> usize {
        self.id[0] as usize
    }

    pub fn y(&self) -> usize {
        self.id[1] as usize
    }

    pub fn z(&self) -> usize {
        self.id[2] as usize
    }
}
