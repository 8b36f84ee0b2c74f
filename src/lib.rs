//! Sequential (fully-connected) neural network engine.
//!
//! * [`sequential`] - the network itself: forward inference, backpropagation,
//! Adam optimization, a stabilization-based training loop, structural plasticity
//! and a plaintext persistence format.
//! * `python_ffi` - Python bindings, built with the `python` feature.

pub mod sequential;

#[cfg(feature = "python")]
pub mod python_ffi;
