//! Kernel handle: argument stack, tracked buffers, and dispatch.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use capstan_device::{DeviceProgram, KernelArg, LaunchGeometry};
use capstan_heap::{ArrayRef, ObjectRef};
use snafu::{ensure, OptionExt, ResultExt};

use crate::args::ArgStack;
use crate::context::Shared;
use crate::error::{
    ArrayLookupSnafu, DisposedSnafu, DispatchSnafu, LaunchNotSetSnafu, ObjectLookupSnafu,
    ObjectResolveSnafu, PinAcquireSnafu, Result,
};
use crate::geometry::resolve_geometry;
use crate::pin::{TrackedBuffer, TrackedObject};

/// A caller-facing argument value, for pushing a whole argument list at
/// once with [`Kernel::dispatch_with_args`].
#[derive(Debug, Clone, Copy)]
pub enum ArgValue {
    Bool(bool),
    Byte(i8),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Array(ArrayRef),
    Object(ObjectRef),
}

/// Handle to one loaded kernel and its current argument set.
///
/// Push order must match the kernel's declared parameter order. None of the
/// push/clear/dispatch operations are internally synchronized; a handle
/// belongs to one caller at a time. `dispose` releases the loaded program,
/// after which every operation fails.
pub struct Kernel {
    shared: Arc<Shared>,
    program: Option<Box<dyn DeviceProgram>>,
    args: ArgStack,
    buffers: Vec<TrackedBuffer>,
    objects: Vec<TrackedObject>,
    geometry: Option<LaunchGeometry>,
}

impl Kernel {
    pub(crate) fn new(shared: Arc<Shared>, program: Box<dyn DeviceProgram>) -> Self {
        Self { shared, program: Some(program), args: ArgStack::new(), buffers: Vec::new(), objects: Vec::new(), geometry: None }
    }

    pub fn entry(&self) -> Result<&str> {
        Ok(self.program.as_deref().context(DisposedSnafu)?.entry())
    }

    pub fn is_disposed(&self) -> bool {
        self.program.is_none()
    }

    /// Tracked buffer bookkeeping for the current argument set.
    pub fn tracked_buffers(&self) -> &[TrackedBuffer] {
        &self.buffers
    }

    pub fn push_bool(&mut self, value: bool) -> Result<usize> {
        self.push_scalar(KernelArg::Bool(value))
    }

    pub fn push_byte(&mut self, value: i8) -> Result<usize> {
        self.push_scalar(KernelArg::Byte(value))
    }

    pub fn push_int(&mut self, value: i32) -> Result<usize> {
        self.push_scalar(KernelArg::Int(value))
    }

    pub fn push_long(&mut self, value: i64) -> Result<usize> {
        self.push_scalar(KernelArg::Long(value))
    }

    pub fn push_float(&mut self, value: f32) -> Result<usize> {
        self.push_scalar(KernelArg::Float(value))
    }

    pub fn push_double(&mut self, value: f64) -> Result<usize> {
        self.push_scalar(KernelArg::Double(value))
    }

    fn push_scalar(&mut self, arg: KernelArg) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.args.push(arg))
    }

    /// Push a managed array argument. A placeholder address goes on the
    /// stack now; the real address is pinned and patched in at dispatch
    /// time.
    pub fn push_array(&mut self, array: ArrayRef) -> Result<usize> {
        self.ensure_live()?;
        let (elem_size, len) = self.shared.heap.array_info(array).context(ArrayLookupSnafu)?;
        let slot = self.args.len();
        let count = self.args.push(KernelArg::Address(std::ptr::null_mut()));
        self.buffers.push(TrackedBuffer::new(array, elem_size, len, slot));
        Ok(count)
    }

    /// Push a managed object argument. Like arrays, the slot holds a
    /// placeholder until dispatch, but the object is never pinned — its
    /// current address is simply re-read every time.
    pub fn push_object(&mut self, object: ObjectRef) -> Result<usize> {
        self.ensure_live()?;
        self.shared.heap.object_size(object).context(ObjectLookupSnafu)?;
        let slot = self.args.len();
        let count = self.args.push(KernelArg::Address(std::ptr::null_mut()));
        self.objects.push(TrackedObject::new(object, slot));
        Ok(count)
    }

    /// Reset the argument stack and drop all pin bookkeeping.
    pub fn clear_args(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.args.clear();
        self.buffers.clear();
        self.objects.clear();
        Ok(())
    }

    /// Resolve and store the launch geometry for subsequent dispatches.
    pub fn set_launch(&mut self, global: &[u32], group_hint: &[u32]) -> Result<()> {
        self.ensure_live()?;
        let geometry = resolve_geometry(global, group_hint, self.shared.config.max_group_size)?;
        self.geometry = Some(geometry);
        Ok(())
    }

    /// 1-D launch with no group-size preference.
    pub fn set_launch_1d(&mut self, work_items: u32) -> Result<()> {
        self.set_launch(&[work_items], &[0])
    }

    /// Geometry the next dispatch will use, if launch attributes are set.
    pub fn launch_geometry(&self) -> Option<LaunchGeometry> {
        self.geometry
    }

    /// Run the kernel and wait for completion.
    ///
    /// Pins every array argument, patches the address slots, re-reads
    /// object addresses, issues the blocking device call, then releases
    /// every pin — unconditionally, on every exit path.
    pub fn dispatch(&mut self) -> Result<()> {
        self.ensure_live()?;
        let result = self.dispatch_pinned();
        for buffer in &mut self.buffers {
            buffer.mark_unpinned();
        }
        result
    }

    fn dispatch_pinned(&mut self) -> Result<()> {
        let geometry = self.geometry.context(LaunchNotSetSnafu)?;
        let heap = Arc::clone(&self.shared.heap);

        let mut pins = Vec::with_capacity(self.buffers.len());
        for buffer in &mut self.buffers {
            let slot = buffer.slot();
            let pin = heap.pin(buffer.array()).context(PinAcquireSnafu { slot })?;
            buffer.mark_pinned(pin.addr());
            self.args.replace_address(slot, pin.addr())?;
            self.shared.accelerator.register_memory(pin.addr(), buffer.len_bytes());
            if self.shared.verbose() {
                tracing::info!(slot, addr = ?pin.addr(), bytes = buffer.len_bytes(), "pinned array argument");
            }
            pins.push(pin);
        }

        for object in &self.objects {
            let slot = object.slot();
            let addr = heap.resolve(object.object()).context(ObjectResolveSnafu { slot })?;
            self.args.replace_address(slot, addr)?;
            if self.shared.verbose() {
                tracing::info!(slot, addr = ?addr, "resolved object argument");
            }
        }

        let program = self.program.as_deref().context(DisposedSnafu)?;
        tracing::debug!(kernel.entry = %program.entry(), slots = self.args.len(), "dispatching");
        // SAFETY: every address slot was just patched — arrays are held in
        // place by the pin guards for the whole device call, and object
        // addresses were re-read above. Lengths come from the heap cells
        // the addresses belong to.
        let status = unsafe { program.dispatch(self.args.slots(), &geometry) }.context(DispatchSnafu);
        drop(pins);
        status
    }

    /// Clear the argument set, then push and dispatch `values` in order.
    /// Launch attributes must already be set.
    pub fn dispatch_with_args(&mut self, values: &[ArgValue]) -> Result<()> {
        self.clear_args()?;
        for value in values {
            match *value {
                ArgValue::Bool(v) => self.push_bool(v)?,
                ArgValue::Byte(v) => self.push_byte(v)?,
                ArgValue::Int(v) => self.push_int(v)?,
                ArgValue::Long(v) => self.push_long(v)?,
                ArgValue::Float(v) => self.push_float(v)?,
                ArgValue::Double(v) => self.push_double(v)?,
                ArgValue::Array(array) => self.push_array(array)?,
                ArgValue::Object(object) => self.push_object(object)?,
            };
        }
        self.dispatch()
    }

    /// Release the loaded program and all tracked state. Further operations
    /// on this handle fail with a disposed error.
    pub fn dispose(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.program = None;
        self.args.clear();
        self.buffers.clear();
        self.objects.clear();
        self.shared.live_kernels.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        ensure!(self.program.is_some(), DisposedSnafu);
        Ok(())
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        if self.program.is_some() {
            self.shared.live_kernels.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
