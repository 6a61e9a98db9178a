//! Vortex Core - Foundation types shared by the isolation pipeline
//!
//! This crate provides the error taxonomy and the catalogue of annotations
//! the runtime understands.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod annotations;
pub mod error;

pub use error::{Error, Result};
