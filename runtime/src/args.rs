//! Ordered kernel argument slots.

use capstan_device::KernelArg;
use smallvec::SmallVec;
use snafu::ensure;

use crate::error::{Result, SlotKindMismatchSnafu, SlotOutOfRangeSnafu};

/// Append-only-until-cleared sequence of argument slots.
///
/// Slot indices are dense and zero-based and must line up with the
/// compiled kernel's positional parameter order. That ordering is a caller
/// contract: it is not validated here, and a mismatch surfaces as a device
/// dispatch fault.
#[derive(Debug, Clone, Default)]
pub struct ArgStack {
    slots: SmallVec<[KernelArg; 8]>,
}

impl ArgStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one slot; returns the slot count after the push.
    pub fn push(&mut self, arg: KernelArg) -> usize {
        self.slots.push(arg);
        self.slots.len()
    }

    /// Drop every slot.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[KernelArg] {
        &self.slots
    }

    /// Overwrite a previously pushed address slot in place. Fails without
    /// touching the stack when `index` is out of range or the slot does not
    /// hold an address.
    pub fn replace_address(&mut self, index: usize, addr: *mut u8) -> Result<()> {
        let len = self.slots.len();
        ensure!(index < len, SlotOutOfRangeSnafu { index, len });
        let slot = &mut self.slots[index];
        ensure!(slot.is_address(), SlotKindMismatchSnafu { index, kind: slot.kind() });
        *slot = KernelArg::Address(addr);
        Ok(())
    }
}
