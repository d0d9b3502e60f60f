//! Core value types shared across the crate

pub mod handle;
pub mod vector;

pub use handle::EntityHandle;
pub use vector::Vector3;
