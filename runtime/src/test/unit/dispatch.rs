//! End-to-end dispatch tests against the host backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use capstan_device::error::DispatchFaultSnafu;
use capstan_device::{HostAccelerator, KernelArg, WorkItem};
use capstan_heap::ManagedHeap;

use crate::error::{Error, Status};
use crate::kernel::ArgValue;
use crate::{Config, Context};

const BINARY: &[u8] = b"\x7fBRIG";

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

fn f32_values(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|chunk| f32::from_ne_bytes(chunk.try_into().unwrap())).collect()
}

fn context(accel: &Arc<HostAccelerator>, heap: &Arc<ManagedHeap>) -> Context {
    Context::with_config(accel.clone(), heap.clone(), Config::default())
}

/// `out[i] = in[i] * in[i]`, reading the in/out addresses from slots 0/1.
fn define_squares(accel: &HostAccelerator, entry: &str) {
    accel.define_entry(entry, |args: &[KernelArg], item: WorkItem| {
        let input = args[0].address().unwrap() as *const f32;
        let output = args[1].address().unwrap() as *mut f32;
        // Heap cells are plain byte buffers; no alignment assumption.
        unsafe {
            let x = input.add(item.x()).read_unaligned();
            output.add(item.x()).write_unaligned(x * x);
        }
        Ok(())
    });
}

#[test]
fn squares_kernel_end_to_end() {
    let accel = Arc::new(HostAccelerator::new());
    define_squares(&accel, "run_squares");
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "run_squares").unwrap();

    let input = heap.alloc_array(4, 40);
    let output = heap.alloc_array(4, 40);
    let values: Vec<f32> = (0..40).map(|i| i as f32).collect();
    heap.copy_in(input, &f32_bytes(&values)).unwrap();

    kernel.push_array(input).unwrap();
    kernel.push_array(output).unwrap();
    kernel.set_launch(&[40], &[40]).unwrap();
    kernel.dispatch().unwrap();

    let mut out = vec![0u8; 160];
    heap.copy_out(output, &mut out).unwrap();
    for (i, v) in f32_values(&out).into_iter().enumerate() {
        assert_eq!(v, (i * i) as f32);
    }

    // Unpinned again after the dispatch, and both ranges were registered
    // with the device memory map.
    assert!(kernel.tracked_buffers().iter().all(|b| !b.pinned()));
    assert_eq!(accel.registered_ranges(), 2);
}

#[test]
fn same_array_pushed_twice_squares_in_place() {
    let accel = Arc::new(HostAccelerator::new());
    define_squares(&accel, "run_squares");
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "run_squares").unwrap();

    let array = heap.alloc_array(4, 40);
    let values: Vec<f32> = (0..40).map(|i| i as f32).collect();
    heap.copy_in(array, &f32_bytes(&values)).unwrap();

    kernel.push_array(array).unwrap();
    kernel.push_array(array).unwrap();
    kernel.set_launch(&[40], &[40]).unwrap();
    kernel.dispatch().unwrap();

    let mut out = vec![0u8; 160];
    heap.copy_out(array, &mut out).unwrap();
    for (i, v) in f32_values(&out).into_iter().enumerate() {
        assert_eq!(v, (i * i) as f32);
    }
    assert!(kernel.tracked_buffers().iter().all(|b| !b.pinned()));
}

#[test]
fn repinning_follows_relocation_between_dispatches() {
    let accel = Arc::new(HostAccelerator::new());
    let observed: Arc<Mutex<Vec<usize>>> = Arc::default();
    let sink = Arc::clone(&observed);
    accel.define_entry("observe", move |args: &[KernelArg], item: WorkItem| {
        if item.x() == 0 {
            sink.lock().unwrap().push(args[0].address().unwrap() as usize);
        }
        Ok(())
    });
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "observe").unwrap();

    let array = heap.alloc_array(4, 16);
    kernel.push_array(array).unwrap();
    kernel.set_launch_1d(16).unwrap();

    kernel.dispatch().unwrap();
    assert_eq!(heap.compact(), 1);
    kernel.dispatch().unwrap();

    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), 2);
    assert_ne!(observed[0], observed[1], "second dispatch must see the relocated address");
}

#[test]
fn object_addresses_are_reread_every_dispatch() {
    let accel = Arc::new(HostAccelerator::new());
    let observed: Arc<Mutex<Vec<usize>>> = Arc::default();
    let sink = Arc::clone(&observed);
    accel.define_entry("scale", move |args: &[KernelArg], item: WorkItem| {
        let data = args[0].address().unwrap() as *mut f32;
        let factor_addr = args[1].address().unwrap();
        if item.x() == 0 {
            sink.lock().unwrap().push(factor_addr as usize);
        }
        unsafe {
            let factor = (factor_addr as *const f32).read_unaligned();
            let x = data.add(item.x()).read_unaligned();
            data.add(item.x()).write_unaligned(x * factor);
        }
        Ok(())
    });
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "scale").unwrap();

    let data = heap.alloc_array(4, 8);
    heap.copy_in(data, &f32_bytes(&[1.0; 8])).unwrap();
    let factor = heap.alloc_object(&2f32.to_ne_bytes());

    kernel.push_array(data).unwrap();
    kernel.push_object(factor).unwrap();
    kernel.set_launch_1d(8).unwrap();

    kernel.dispatch().unwrap();
    assert_eq!(heap.compact(), 2);
    kernel.dispatch().unwrap();

    let mut out = vec![0u8; 32];
    heap.copy_out(data, &mut out).unwrap();
    assert_eq!(f32_values(&out), vec![4.0; 8]);

    let observed = observed.lock().unwrap();
    assert_ne!(observed[0], observed[1], "object address must be re-read after relocation");
}

#[test]
fn pin_failure_aborts_before_device_call() {
    let accel = Arc::new(HostAccelerator::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    accel.define_entry("never", move |_, _| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "never").unwrap();

    let array = heap.alloc_array(4, 4);
    kernel.push_array(array).unwrap();
    kernel.set_launch_1d(4).unwrap();

    // The handle goes stale underneath the tracked buffer.
    heap.free_array(array).unwrap();

    let err = kernel.dispatch().err().unwrap();
    assert!(matches!(err, Error::PinAcquire { slot: 0, .. }));
    assert_eq!(err.status(), Status::OtherError);
    assert_eq!(calls.load(Ordering::Relaxed), 0, "device call must not happen");
    assert!(kernel.tracked_buffers().iter().all(|b| !b.pinned()));
}

#[test]
fn dispatch_fault_still_unpins_buffers() {
    let accel = Arc::new(HostAccelerator::new());
    accel.define_entry("fault", |_, item: WorkItem| {
        if item.x() == 3 {
            return DispatchFaultSnafu { reason: "simulated fault" }.fail();
        }
        Ok(())
    });
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "fault").unwrap();

    let array = heap.alloc_array(4, 8);
    kernel.push_array(array).unwrap();
    kernel.set_launch_1d(8).unwrap();

    let err = kernel.dispatch().err().unwrap();
    assert!(matches!(err, Error::Dispatch { .. }));
    assert_eq!(err.status(), Status::OtherError);
    assert!(kernel.tracked_buffers().iter().all(|b| !b.pinned()));

    // The pin really is released: the cell can be freed again.
    heap.free_array(array).unwrap();
}

#[test]
fn scalar_only_dispatch_pins_nothing() {
    let accel = Arc::new(HostAccelerator::new());
    let seen: Arc<Mutex<Vec<(i32, f64)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    accel.define_entry("scalars", move |args: &[KernelArg], _| {
        let (KernelArg::Int(a), KernelArg::Double(b)) = (args[0], args[1]) else {
            return DispatchFaultSnafu { reason: "unexpected argument kinds" }.fail();
        };
        sink.lock().unwrap().push((a, b));
        Ok(())
    });
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "scalars").unwrap();

    kernel.push_int(7).unwrap();
    kernel.push_double(0.25).unwrap();
    kernel.set_launch_1d(3).unwrap();
    kernel.dispatch().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(7, 0.25); 3]);
    assert!(kernel.tracked_buffers().is_empty());
    assert_eq!(accel.registered_ranges(), 0);
}

#[test]
fn dispatch_with_args_convenience() {
    let accel = Arc::new(HostAccelerator::new());
    accel.define_entry("saxpy", |args: &[KernelArg], item: WorkItem| {
        let KernelArg::Float(a) = args[0] else {
            return DispatchFaultSnafu { reason: "slot 0 must be float" }.fail();
        };
        let x = args[1].address().unwrap() as *const f32;
        let y = args[2].address().unwrap() as *mut f32;
        unsafe {
            let v = a * x.add(item.x()).read_unaligned() + y.add(item.x()).read_unaligned();
            y.add(item.x()).write_unaligned(v);
        }
        Ok(())
    });
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "saxpy").unwrap();

    let x = heap.alloc_array(4, 8);
    let y = heap.alloc_array(4, 8);
    heap.copy_in(x, &f32_bytes(&[1.0; 8])).unwrap();
    heap.copy_in(y, &f32_bytes(&[0.5; 8])).unwrap();

    kernel.set_launch_1d(8).unwrap();
    kernel.dispatch_with_args(&[ArgValue::Float(2.0), ArgValue::Array(x), ArgValue::Array(y)]).unwrap();

    let mut out = vec![0u8; 32];
    heap.copy_out(y, &mut out).unwrap();
    assert_eq!(f32_values(&out), vec![2.5; 8]);
}

#[test]
fn dispatch_without_launch_attributes_fails() {
    let accel = Arc::new(HostAccelerator::new());
    accel.define_entry("noop", |_, _| Ok(()));
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "noop").unwrap();

    let err = kernel.dispatch().err().unwrap();
    assert!(matches!(err, Error::LaunchNotSet));
    assert_eq!(err.status(), Status::InvalidArgument);
}

#[test]
fn config_ceiling_limits_resolved_group() {
    let accel = Arc::new(HostAccelerator::new());
    accel.define_entry("noop", |_, _| Ok(()));
    let heap = Arc::new(ManagedHeap::new());
    let config = Config { max_group_size: Some(8), ..Config::default() };
    let ctx = Context::with_config(accel.clone(), heap.clone(), config);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "noop").unwrap();

    kernel.set_launch(&[80], &[79]).unwrap();
    let geometry = kernel.launch_geometry().unwrap();
    assert_eq!(geometry.group(0), 8);
    assert_eq!(geometry.grid(0), 10);
}

#[test]
fn disposed_kernel_rejects_every_operation() {
    let accel = Arc::new(HostAccelerator::new());
    accel.define_entry("noop", |_, _| Ok(()));
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "noop").unwrap();
    assert_eq!(ctx.live_kernels(), 1);

    kernel.dispose().unwrap();
    assert!(kernel.is_disposed());
    assert_eq!(ctx.live_kernels(), 0);

    for err in [
        kernel.push_int(1).err().unwrap(),
        kernel.clear_args().err().unwrap(),
        kernel.set_launch_1d(4).err().unwrap(),
        kernel.dispatch().err().unwrap(),
        kernel.dispose().err().unwrap(),
    ] {
        assert!(matches!(err, Error::Disposed));
        assert_eq!(err.status(), Status::InvalidArgument);
    }
}

#[test]
fn context_dispose_treats_outstanding_kernels_as_leaked() {
    let accel = Arc::new(HostAccelerator::new());
    accel.define_entry("noop", |_, _| Ok(()));
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "noop").unwrap();

    // No cascade: the leaked handle keeps working after the context goes.
    ctx.dispose();
    kernel.push_int(1).unwrap();
    kernel.set_launch_1d(1).unwrap();
    kernel.dispatch().unwrap();
}

#[test]
fn clear_args_resets_tracked_state() {
    let accel = Arc::new(HostAccelerator::new());
    accel.define_entry("noop", |_, _| Ok(()));
    let heap = Arc::new(ManagedHeap::new());
    let ctx = context(&accel, &heap);
    let mut kernel = ctx.create_kernel_from_binary(BINARY, "noop").unwrap();

    let array = heap.alloc_array(4, 4);
    kernel.push_int(1).unwrap();
    kernel.push_array(array).unwrap();
    assert_eq!(kernel.tracked_buffers().len(), 1);

    kernel.clear_args().unwrap();
    assert!(kernel.tracked_buffers().is_empty());

    // Re-pushing after clear reproduces the same slot layout.
    assert_eq!(kernel.push_int(1).unwrap(), 1);
    assert_eq!(kernel.push_array(array).unwrap(), 2);
    assert_eq!(kernel.tracked_buffers()[0].slot(), 1);
}
