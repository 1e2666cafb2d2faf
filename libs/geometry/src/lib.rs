//! 2-D floating point geometry for mask layout.
//!
//! # Examples
//!
//! Create a [rectangle](crate::rect::Rect):
//!
//! ```
//! # use geometry::prelude::*;
//! let rect = Rect::from_sides(10., 20., 30., 40.);
//! assert_eq!(rect.width(), 20.);
//! ```
#![warn(missing_docs)]

extern crate self as geometry;

pub mod bbox;
pub mod point;
pub mod polygon;
pub mod prelude;
pub mod rect;
pub mod transform;
