//! # krl-motion
//!
//! An offline compiler that turns a geometric point stream (a 3-D path with optional
//! per-point process values) into a KUKA KRL motion program.
//!
//! It decouples the *path* (points exported from a modeling scene) from the *program*
//! (the text a controller executes), producing a [`Program`] that can be written to a
//! `.src` file or handed to any other persistence layer.

pub mod compiler;
pub mod error;
pub mod path;
pub mod program;
pub mod state;

pub use compiler::*;
pub use error::*;
pub use path::*;
pub use program::*;
pub use state::*;
