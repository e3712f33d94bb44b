//! Kernel argument marshaling and dispatch.
//!
//! Converts managed array/object handles into stable native addresses for
//! the duration of one dispatch, resolves legal launch geometry from
//! caller-supplied hints, and owns the kernel/context lifecycle around an
//! opaque accelerator backend.
//!
//! The flow for one dispatch: arguments are pushed onto a kernel's
//! [`ArgStack`]; at dispatch time the pinning protocol acquires a stability
//! window for every array argument, patches the recorded slots with the
//! pinned addresses, re-reads object addresses, issues the blocking device
//! call, and unconditionally releases every pin — on success and on every
//! failure path alike.

pub mod args;
pub mod assemble;
pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod normalize;
pub mod pin;

#[cfg(test)]
mod test;

pub use args::ArgStack;
pub use config::Config;
pub use context::Context;
pub use error::{Error, Result, Status};
pub use geometry::resolve_geometry;
pub use kernel::{ArgValue, Kernel};
pub use pin::{TrackedBuffer, TrackedObject};
