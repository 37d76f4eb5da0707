#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Resource management utilities for paygen
//!
//! This crate owns the process-wide limit on concurrent payload generator
//! invocations. The diff generator is memory and CPU heavy, so every run in
//! the process shares one semaphore regardless of how many payload tasks
//! are active.

pub mod limits;
pub mod manager;
pub mod semaphore;

pub use limits::{IntoResourceLimits, ResourceLimits};
pub use manager::ResourceManager;
pub use semaphore::{acquire_semaphore_permit, create_semaphore, try_acquire_semaphore_permit};
