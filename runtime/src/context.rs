//! Device context: owns the accelerator connection and builds kernels.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use capstan_device::Accelerator;
use capstan_heap::ManagedHeap;
use parking_lot::Mutex;
use snafu::ResultExt;

use crate::assemble;
use crate::config::Config;
use crate::error::{ProgramBuildSnafu, Result};
use crate::kernel::Kernel;
use crate::normalize;

/// Connection to one accelerator (or its simulator).
///
/// Explicitly constructed and explicitly owned; every kernel handle keeps
/// the shared state alive, so dropping the context does not cascade into
/// its kernels. Constructing the accelerator itself is the fallible
/// boundary — there is no fallback backend, so callers should treat a
/// backend constructor failure as fatal.
pub struct Context {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) accelerator: Arc<dyn Accelerator>,
    pub(crate) heap: Arc<ManagedHeap>,
    pub(crate) config: Config,
    verbose: AtomicBool,
    /// Serializes kernel creation: the backend's program compilation is
    /// not reentrant.
    build_lock: Mutex<()>,
    pub(crate) live_kernels: AtomicUsize,
}

impl Shared {
    pub(crate) fn verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }
}

impl Context {
    /// Create a context with configuration read from the environment.
    pub fn new(accelerator: Arc<dyn Accelerator>, heap: Arc<ManagedHeap>) -> Self {
        Self::with_config(accelerator, heap, Config::from_env())
    }

    pub fn with_config(accelerator: Arc<dyn Accelerator>, heap: Arc<ManagedHeap>, config: Config) -> Self {
        tracing::debug!(device = accelerator.name(), simulator = accelerator.is_simulator(), "context created");
        let verbose = AtomicBool::new(config.verbose);
        Self {
            shared: Arc::new(Shared {
                accelerator,
                heap,
                config,
                verbose,
                build_lock: Mutex::new(()),
                live_kernels: AtomicUsize::new(0),
            }),
        }
    }

    /// Build a kernel from textual source.
    ///
    /// The source is version-normalized, handed to the external assembler,
    /// and the resulting binary artifact goes through the same load step as
    /// [`create_kernel_from_binary`](Self::create_kernel_from_binary).
    pub fn create_kernel(&self, source: &str, entry: &str) -> Result<Kernel> {
        let normalized = normalize::normalize_module(source);
        let binary = assemble::assemble(&normalized, &self.shared.config)?;
        self.create_kernel_from_binary(&binary, entry)
    }

    /// Build a kernel from a pre-assembled binary artifact.
    pub fn create_kernel_from_binary(&self, binary: &[u8], entry: &str) -> Result<Kernel> {
        let program = {
            let _build = self.shared.build_lock.lock();
            self.shared.accelerator.load_program(binary, entry).context(ProgramBuildSnafu)?
        };
        self.shared.live_kernels.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(kernel.entry = %entry, "kernel created");
        Ok(Kernel::new(Arc::clone(&self.shared), program))
    }

    /// Release the context. Outstanding kernel handles are treated as
    /// leaked — they keep working against the shared state, but the leak is
    /// reported.
    pub fn dispose(self) {
        let live = self.shared.live_kernels.load(Ordering::Acquire);
        if live > 0 {
            tracing::warn!(live, "context disposed with outstanding kernel handles; treating them as leaked");
        }
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.shared.verbose.store(verbose, Ordering::Relaxed);
    }

    pub fn verbose(&self) -> bool {
        self.shared.verbose()
    }

    pub fn is_simulator(&self) -> bool {
        self.shared.accelerator.is_simulator()
    }

    pub fn device_name(&self) -> &str {
        self.shared.accelerator.name()
    }

    pub fn heap(&self) -> &Arc<ManagedHeap> {
        &self.shared.heap
    }

    /// Number of kernel handles created and not yet disposed.
    pub fn live_kernels(&self) -> usize {
        self.shared.live_kernels.load(Ordering::Acquire)
    }
}
