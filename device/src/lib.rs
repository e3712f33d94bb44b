//! Accelerator seam for kernel dispatch.
//!
//! The accelerator is an opaque device: it accepts a compiled binary
//! artifact plus an entry name, and later a flat argument list and a launch
//! geometry, and runs the kernel to completion on the calling thread. This
//! crate defines that seam ([`Accelerator`], [`DeviceProgram`]) together
//! with the wire types crossing it ([`KernelArg`], [`LaunchGeometry`]), and
//! a host (software) backend that executes registered native routines over
//! every work-item of a geometry — the role a simulator plays for real
//! hardware, and what the test suite dispatches against.

pub mod arg;
pub mod backend;
pub mod error;
pub mod geometry;
pub mod host;

pub use arg::KernelArg;
pub use backend::{Accelerator, DeviceProgram};
pub use error::{Error, Result};
pub use geometry::{LaunchGeometry, WorkItem, MAX_DIMS};
pub use host::{HostAccelerator, HostRoutine};
