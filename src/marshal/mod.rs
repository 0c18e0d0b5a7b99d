//! Instance marshalling subsystem
//!
//! Bidirectional, pure transforms between application instances and
//! storage rows, plus explicit reference population.

mod json_box;
mod marshaller;
mod populate;

pub use json_box::JsonBox;
pub use marshaller::Marshaller;
pub use populate::ReferenceLoader;
