//! Map Functions
//!
//! The user-supplied per-line transform is a plain Rust function looked up by
//! name in a [`MapRegistry`]. `word_count` ships as the built-in instance.

pub mod registry;
pub mod word_count;

pub use registry::{MapFn, MapRegistry};

#[cfg(test)]
mod tests;
