//! Process execution backends

pub mod native;
