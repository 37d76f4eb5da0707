#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for paygen
//!
//! This crate provides the value types passed between the pipeline stages:
//! release coordinates, image references, payload descriptions and build
//! versions.

pub mod build;
pub mod image;
pub mod payload;
pub mod version;

pub use build::Build;
pub use image::{Image, ImageKind, ImageType};
pub use payload::Payload;
pub use version::{version_greater, BuildVersion};
