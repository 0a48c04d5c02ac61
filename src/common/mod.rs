//! Common utilities shared by the container and document layers.

pub mod binary;

pub use binary::{BinaryError, BinaryResult};
