//! Host process execution via `tokio::process`

pub mod process;

pub use process::NativeProcessOperations;
