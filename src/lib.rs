//! # dssim-core
//!
//! Multi-scale structural similarity (DSSIM) between two images: a single
//! non-negative scalar, zero for identical inputs and growing with
//! perceived difference, computed on a Lab-like opponent color space at
//! several downsampled scales.
//!
//! ## Example
//!
//! ```rust
//! use dssim_core::{ColorType, Dssim};
//!
//! let mut attr = Dssim::new();
//! let white = vec![255u8; 8 * 8 * 3];
//! let black = vec![0u8; 8 * 8 * 3];
//!
//! let original = attr.create_image_bytes(ColorType::Rgb, &white, 8, 8, 0.45455).unwrap();
//! let modified = attr.create_image_bytes(ColorType::Rgb, &black, 8, 8, 0.45455).unwrap();
//!
//! let dssim = attr.compare(&original, modified);
//! assert!(dssim > 0.0);
//! ```
//!
//! This crate decodes nothing itself: callers already hold decoded pixel
//! rows, either as raw bytes in one of a handful of layouts
//! ([`ColorType`]) or pushed through a [`RowProducer`] one row at a time.
//! It does not spawn threads and has no async entry points; an
//! attribute bundle's mutating methods require `&mut self` and so cannot be
//! called concurrently, enforced by the borrow checker rather than
//! documented as a caller obligation.

mod attr;
mod blur;
mod color;
mod compare;
mod image;

pub use attr::Dssim;
pub use compare::SsimMap;
pub use image::{ColorType, DssimImage, RowProducer};
