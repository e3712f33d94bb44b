//! Launch geometry resolution.

use capstan_device::{LaunchGeometry, MAX_DIMS};
use snafu::ensure;

use crate::error::{InvalidDimensionCountSnafu, Result, ZeroGlobalSizeSnafu};

/// Resolve a legal (grid, group) decomposition from a requested global
/// work size and a group-size hint per dimension.
///
/// A hint of 0 means "no preference" and resolves to a group of 1 — the
/// backend may still exploit parallelism internally. A configured ceiling
/// clamps the candidate before divisibility is considered. When the
/// candidate does not divide the global extent, the group shrinks to the
/// largest divisor below it rather than rounding the global extent down:
/// `grid * group` must reproduce the requested extent exactly, or the
/// kernel would cover fewer work-items than the caller asked for.
pub fn resolve_geometry(global: &[u32], group_hint: &[u32], ceiling: Option<u32>) -> Result<LaunchGeometry> {
    let dims = global.len();
    ensure!((1..=MAX_DIMS).contains(&dims), InvalidDimensionCountSnafu { dims });
    ensure!(group_hint.len() == dims, InvalidDimensionCountSnafu { dims: group_hint.len() });

    let mut grid = [1u32; MAX_DIMS];
    let mut group = [1u32; MAX_DIMS];
    for (dim, (&extent, &hint)) in global.iter().zip(group_hint).enumerate() {
        ensure!(extent > 0, ZeroGlobalSizeSnafu { dim });

        let mut candidate = if hint == 0 { 1 } else { hint };
        if let Some(ceiling) = ceiling {
            candidate = candidate.min(ceiling);
        }

        let legal = largest_divisor_at_most(extent, candidate);
        if legal != candidate {
            tracing::warn!(dim, requested = candidate, group = legal, "group size reduced to divide global size");
        }
        grid[dim] = extent / legal;
        group[dim] = legal;
    }

    Ok(LaunchGeometry::new(dims, grid, group))
}

/// Largest divisor of `n` not exceeding `start`, scanning downward; 1
/// divides everything, so the scan always terminates.
fn largest_divisor_at_most(n: u32, start: u32) -> u32 {
    // No divisor exceeds n itself, so the scan can begin there.
    for div in (1..=start.clamp(1, n)).rev() {
        if n % div == 0 {
            return div;
        }
    }
    1
}
