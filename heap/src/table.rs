//! Handle table: slot array plus generation counters.
//!
//! Cell payloads live behind a `Box`, so growing the slot vector never moves
//! them; only [`ManagedHeap::compact`] relocates payloads, and it skips every
//! pinned cell. That is what makes a [`PinGuard`]'s address stable for its
//! whole lifetime.

use parking_lot::RwLock;
use snafu::ensure;

use crate::error::{PinnedLiveSnafu, Result, SizeMismatchSnafu, StaleHandleSnafu};

/// Handle to an array cell: slot index plus the generation observed at
/// allocation time. Resolution fails once the cell is freed, even if the
/// slot was reused for a new allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRef {
    index: usize,
    generation: u32,
}

/// Handle to an opaque object cell. Unlike arrays, objects are never pinned;
/// their current address is re-read immediately before each use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct Cell {
    data: Box<[u8]>,
    pins: u32,
    elem_size: usize,
    len: usize,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    cell: Option<Cell>,
}

#[derive(Debug, Default)]
struct Table {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Table {
    fn insert(&mut self, cell: Cell) -> (usize, u32) {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.cell = Some(cell);
                (index, slot.generation)
            }
            None => {
                let index = self.slots.len();
                self.slots.push(Slot { generation: 0, cell: Some(cell) });
                (index, 0)
            }
        }
    }

    fn cell(&self, index: usize, generation: u32) -> Result<&Cell> {
        let live = self
            .slots
            .get(index)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.cell.as_ref());
        match live {
            Some(cell) => Ok(cell),
            None => StaleHandleSnafu { index, generation }.fail(),
        }
    }

    fn cell_mut(&mut self, index: usize, generation: u32) -> Result<&mut Cell> {
        let live = self
            .slots
            .get_mut(index)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.cell.as_mut());
        match live {
            Some(cell) => Ok(cell),
            None => StaleHandleSnafu { index, generation }.fail(),
        }
    }
}

/// The handle table. `Send + Sync`; all access goes through one `RwLock`.
#[derive(Debug, Default)]
pub struct ManagedHeap {
    table: RwLock<Table>,
}

impl ManagedHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled array of `len` elements of `elem_size` bytes.
    pub fn alloc_array(&self, elem_size: usize, len: usize) -> ArrayRef {
        let data = vec![0u8; elem_size * len].into_boxed_slice();
        let (index, generation) = self.table.write().insert(Cell { data, pins: 0, elem_size, len });
        ArrayRef { index, generation }
    }

    /// Allocate an opaque object cell holding a copy of `bytes`.
    pub fn alloc_object(&self, bytes: &[u8]) -> ObjectRef {
        let cell = Cell { data: bytes.into(), pins: 0, elem_size: 1, len: bytes.len() };
        let (index, generation) = self.table.write().insert(cell);
        ObjectRef { index, generation }
    }

    /// Element size and element count of an array cell.
    pub fn array_info(&self, array: ArrayRef) -> Result<(usize, usize)> {
        let table = self.table.read();
        let cell = table.cell(array.index, array.generation)?;
        Ok((cell.elem_size, cell.len))
    }

    /// Byte size of an object cell.
    pub fn object_size(&self, object: ObjectRef) -> Result<usize> {
        let table = self.table.read();
        Ok(table.cell(object.index, object.generation)?.data.len())
    }

    /// Copy `src` into the array cell. `src` must cover the whole cell.
    pub fn copy_in(&self, array: ArrayRef, src: &[u8]) -> Result<()> {
        let mut table = self.table.write();
        let cell = table.cell_mut(array.index, array.generation)?;
        let expected = cell.data.len();
        ensure!(expected == src.len(), SizeMismatchSnafu { expected, actual: src.len() });
        cell.data.copy_from_slice(src);
        Ok(())
    }

    /// Copy the whole array cell into `dst`.
    pub fn copy_out(&self, array: ArrayRef, dst: &mut [u8]) -> Result<()> {
        let table = self.table.read();
        let cell = table.cell(array.index, array.generation)?;
        let expected = cell.data.len();
        ensure!(expected == dst.len(), SizeMismatchSnafu { expected, actual: dst.len() });
        dst.copy_from_slice(&cell.data);
        Ok(())
    }

    /// Open a stability window for an array cell.
    ///
    /// The returned guard's address stays valid until the guard drops: a
    /// pinned cell is never relocated by [`compact`](Self::compact) and
    /// never freed. A cell may carry several guards at once.
    pub fn pin(&self, array: ArrayRef) -> Result<PinGuard<'_>> {
        let mut table = self.table.write();
        let cell = table.cell_mut(array.index, array.generation)?;
        cell.pins += 1;
        Ok(PinGuard {
            heap: self,
            index: array.index,
            addr: cell.data.as_mut_ptr(),
            len_bytes: cell.data.len(),
        })
    }

    /// Current address of an object cell. No stability guarantee: the next
    /// [`compact`](Self::compact) may move it, so the address must be
    /// re-read before every use.
    pub fn resolve(&self, object: ObjectRef) -> Result<*mut u8> {
        let mut table = self.table.write();
        let cell = table.cell_mut(object.index, object.generation)?;
        Ok(cell.data.as_mut_ptr())
    }

    /// Free an array cell and retire its handle.
    pub fn free_array(&self, array: ArrayRef) -> Result<()> {
        self.free(array.index, array.generation)
    }

    /// Free an object cell and retire its handle.
    pub fn free_object(&self, object: ObjectRef) -> Result<()> {
        self.free(object.index, object.generation)
    }

    fn free(&self, index: usize, generation: u32) -> Result<()> {
        let mut table = self.table.write();
        let cell = table.cell(index, generation)?;
        ensure!(cell.pins == 0, PinnedLiveSnafu { index, pins: cell.pins });
        let slot = &mut table.slots[index];
        slot.cell = None;
        slot.generation = slot.generation.wrapping_add(1);
        table.free.push(index);
        Ok(())
    }

    /// Relocate every live, unpinned cell to a fresh allocation, preserving
    /// contents. Stands in for a moving collector running between
    /// dispatches. Returns how many cells moved.
    pub fn compact(&self) -> usize {
        let mut table = self.table.write();
        let mut moved = 0;
        for slot in &mut table.slots {
            let Some(cell) = slot.cell.as_mut() else { continue };
            if cell.pins > 0 {
                continue;
            }
            // Fresh box allocated while the old one is still live, so the
            // address is guaranteed to change.
            let relocated: Box<[u8]> = cell.data.as_ref().into();
            cell.data = relocated;
            moved += 1;
        }
        moved
    }

    /// Number of live cells (arrays and objects).
    pub fn live_count(&self) -> usize {
        self.table.read().slots.iter().filter(|slot| slot.cell.is_some()).count()
    }

    fn unpin(&self, index: usize) {
        let mut table = self.table.write();
        let cell = table.slots[index].cell.as_mut();
        debug_assert!(cell.as_ref().is_some_and(|cell| cell.pins > 0), "unpin without pin");
        if let Some(cell) = cell {
            cell.pins = cell.pins.saturating_sub(1);
        }
    }
}

/// Scoped stability window for one array cell.
///
/// [`addr`](Self::addr) is valid exactly as long as the guard lives; holding
/// the address past the guard's drop is undefined behavior as far as this
/// crate is concerned (the cell may relocate or be freed).
pub struct PinGuard<'h> {
    heap: &'h ManagedHeap,
    index: usize,
    addr: *mut u8,
    len_bytes: usize,
}

impl PinGuard<'_> {
    /// Stable native address of the cell's first byte.
    pub fn addr(&self) -> *mut u8 {
        self.addr
    }

    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        self.heap.unpin(self.index);
    }
}
