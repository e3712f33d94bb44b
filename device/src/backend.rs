//! Device backend traits.

use crate::arg::KernelArg;
use crate::error::Result;
use crate::geometry::LaunchGeometry;

/// A loaded, executable kernel program.
pub trait DeviceProgram {
    /// Run the kernel over `geometry`, blocking the calling thread until
    /// the device reports completion. No timeout and no cancellation: a
    /// hung device hangs the caller.
    ///
    /// # Safety
    ///
    /// Every `Address` argument must point to memory that is valid, and
    /// stays at that address, for the whole dispatch, with a length
    /// matching what the kernel expects for that parameter.
    unsafe fn dispatch(&self, args: &[KernelArg], geometry: &LaunchGeometry) -> Result<()>;

    /// Entry point name (for diagnostics).
    fn entry(&self) -> &str;
}

/// An opaque accelerator (or its software simulator).
///
/// Program creation is not reentrant on real backends; callers serialize
/// [`load_program`](Self::load_program) themselves.
pub trait Accelerator: Send + Sync {
    /// Build an executable program from a compiled binary artifact. The
    /// artifact is opaque: it is handed over byte-for-byte, never parsed
    /// by the marshaling layer.
    fn load_program(&self, binary: &[u8], entry: &str) -> Result<Box<dyn DeviceProgram>>;

    /// Make an address range visible to the device's memory map. Needed
    /// until the device can walk the caller's heap directly.
    fn register_memory(&self, addr: *mut u8, len: usize);

    fn name(&self) -> &str;

    fn is_simulator(&self) -> bool {
        false
    }
}
