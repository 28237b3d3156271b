//! The Mach-O container format: raw on-disk structs, an
//! architecture-parametric reading view, and the section/segment
//! constants the rest of the engine branches on.

pub mod constants;
pub mod raw;
pub mod view;

pub use constants::*;
pub use raw::*;
pub use view::View;
