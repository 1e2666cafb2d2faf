//! Mask composition for the MEGA-PC MEMS stage.
//!
//! Device geometry is drawn as a hierarchy of cached [`layir::Cell`]s built by
//! [`CellFactory`] implementations. The build pipeline then derives mask layers
//! with [boolean operations](boolean), reconstructs the handle wafer mask from
//! its [depth partitions](handle) and writes flat GDS files and reticles.
//!
//! # Examples
//!
//! ```
//! # use geometry::prelude::*;
//! # use layir::Cell;
//! use masks::boolean::{boolean, layer_region, BoolOp};
//! use masks::layers::LayerId;
//!
//! let layer = LayerId::new(1, 0);
//! let mut a = Cell::new("a");
//! a.add_shape(layer, Rect::from_sides(0., 0., 10., 10.));
//! let mut b = Cell::new("b");
//! b.add_shape(layer, Rect::from_sides(5., 5., 15., 15.));
//!
//! let out = boolean(&a, &b, BoolOp::Union, layer, layer, layer);
//! assert!((layer_region(&out, layer).area() - 175.).abs() < 1e-9);
//! ```

pub mod boolean;
pub mod build;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod gds;
pub mod handle;
pub mod layers;
pub mod offset;
pub mod primitives;
pub mod reticle;

pub use config::BuildConfig;
pub use context::{BuildContext, CellFactory};
pub use error::{MaskError, Result};
pub use layers::{LayerId, LayerRegistry, MegaPcLayers};
