//! Host software backend.
//!
//! Executes kernels as registered native routines, one call per work-item,
//! sequentially on the calling thread. Entry names are bound to routines up
//! front with [`HostAccelerator::define_entry`]; `load_program` then
//! resolves an entry against that table the way a real backend resolves a
//! symbol inside a compiled program.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::arg::KernelArg;
use crate::backend::{Accelerator, DeviceProgram};
use crate::error::{EntryPointNotFoundSnafu, ProgramRejectedSnafu, Result};
use crate::geometry::{LaunchGeometry, WorkItem};

/// A native kernel routine: invoked once per work-item.
pub type HostRoutine = Arc<dyn Fn(&[KernelArg], WorkItem) -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct HostAccelerator {
    routines: RwLock<HashMap<String, HostRoutine>>,
    memory_map: RwLock<Vec<(usize, usize)>>,
}

impl HostAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an entry name to a routine.
    pub fn define_entry<F>(&self, entry: &str, routine: F)
    where
        F: Fn(&[KernelArg], WorkItem) -> Result<()> + Send + Sync + 'static,
    {
        self.routines.write().insert(entry.to_string(), Arc::new(routine));
    }

    /// Whether `addr` falls inside any registered memory range.
    pub fn is_registered(&self, addr: *const u8) -> bool {
        let addr = addr as usize;
        self.memory_map.read().iter().any(|&(base, len)| addr >= base && addr < base + len)
    }

    /// Number of ranges registered so far.
    pub fn registered_ranges(&self) -> usize {
        self.memory_map.read().len()
    }
}

impl Accelerator for HostAccelerator {
    fn load_program(&self, binary: &[u8], entry: &str) -> Result<Box<dyn DeviceProgram>> {
        if binary.is_empty() {
            return ProgramRejectedSnafu { reason: "empty binary artifact" }.fail();
        }
        let routine = self
            .routines
            .read()
            .get(entry)
            .cloned()
            .ok_or_else(|| EntryPointNotFoundSnafu { entry }.build())?;
        tracing::debug!(program.entry = %entry, program.bytes = binary.len(), "host program loaded");
        Ok(Box::new(HostProgram { routine, entry: entry.to_string() }))
    }

    fn register_memory(&self, addr: *mut u8, len: usize) {
        tracing::trace!(addr = ?addr, len, "memory range registered");
        self.memory_map.write().push((addr as usize, len));
    }

    fn name(&self) -> &str {
        "host"
    }

    fn is_simulator(&self) -> bool {
        true
    }
}

struct HostProgram {
    routine: HostRoutine,
    entry: String,
}

impl DeviceProgram for HostProgram {
    unsafe fn dispatch(&self, args: &[KernelArg], geometry: &LaunchGeometry) -> Result<()> {
        tracing::debug!(
            program.entry = %self.entry,
            work_items = geometry.work_items(),
            "host dispatch"
        );
        for z in 0..geometry.global(2) {
            for y in 0..geometry.global(1) {
                for x in 0..geometry.global(0) {
                    (self.routine)(args, WorkItem { id: [x, y, z] })?;
                }
            }
        }
        Ok(())
    }

    fn entry(&self) -> &str {
        &self.entry
    }
}
