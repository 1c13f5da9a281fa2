//! Image processing: the resize engine.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Plan variants** | pure width/ratio rules, no I/O |
//! | **Resize → JPEG/PNG** | Lanczos3, re-encoded in the source codec |
//!
//! The module is split into:
//! - **Calculations**: Pure functions deciding which widths to produce (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: [`build_image`], combining calculations + backend

pub mod backend;
pub mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use operations::{BuildOutcome, BuildSettings, build_image};
pub use params::{Codec, Quality, ResizeParams, ResizeTarget};
pub use rust_backend::RustBackend;
