#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Platform abstraction for running the external payload tools.
//!
//! This crate provides:
//! - Process execution with combined output capture, timeouts and event emission
//! - Filesystem helpers returning `paygen_errors::Error`
//!
//! Everything that shells out (the diff generator, the payload checker, tar,
//! openssl, gsutil) goes through [`ProcessOperations`] so tests can substitute
//! a scripted implementation.

pub mod core;
pub mod fs;
pub mod implementations;
pub mod process;

pub use core::PlatformContext;
pub use implementations::native::NativeProcessOperations;
pub use process::{run_checked, CommandOutput, PlatformCommand, ProcessOperations};
