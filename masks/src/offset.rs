//! Isotropic region offsetting by Minkowski sums.

use geo::{ConvexHull, Coord, MultiPoint, MultiPolygon};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::boolean::{merge, Region};
use crate::error::{MaskError, Result};

/// The fewest segments allowed when approximating a disk.
pub const MIN_SEGMENTS: usize = 3;

/// The structuring element used when offsetting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetStyle {
    /// A disk approximated by a regular polygon with the given number of vertices.
    Round {
        /// The number of vertices of the polygon.
        segments: usize,
    },
    /// An axis-aligned square with half-width equal to the distance.
    Square,
}

impl Default for OffsetStyle {
    fn default() -> Self {
        Self::Round { segments: 32 }
    }
}

/// Grows (`distance > 0`) or shrinks (`distance < 0`) `region` by `distance`.
///
/// Growth is the Minkowski sum of the region with the structuring element.
/// Shrinking removes the Minkowski sum of the region's boundary.
/// A zero distance returns the region unchanged.
///
/// # Examples
///
/// ```
/// # use geometry::prelude::*;
/// # use masks::boolean::Region;
/// # use masks::offset::{offset, OffsetStyle};
/// let region = Region::from_rect(Rect::from_sides(0., 0., 10., 4.));
/// let grown = offset(&region, 1., OffsetStyle::Square).unwrap();
/// assert!((grown.area() - 72.).abs() < 1e-9);
/// ```
pub fn offset(region: &Region, distance: f64, style: OffsetStyle) -> Result<Region> {
    if !distance.is_finite() {
        return Err(MaskError::InvalidOffset(distance));
    }
    if distance == 0. || region.is_empty() {
        return Ok(region.clone());
    }

    let kernel = kernel(distance.abs(), style);
    let sweep = boundary_sweep(region, &kernel);
    let result = if distance > 0. {
        region.union(&sweep)
    } else {
        region.difference(&sweep)
    };
    debug!(
        distance,
        before = region.area(),
        after = result.area(),
        "offset region"
    );
    Ok(result)
}

/// The vertices of the structuring element, centered on the origin.
fn kernel(radius: f64, style: OffsetStyle) -> Vec<Coord<f64>> {
    match style {
        OffsetStyle::Square => vec![
            Coord {
                x: -radius,
                y: -radius,
            },
            Coord {
                x: radius,
                y: -radius,
            },
            Coord {
                x: radius,
                y: radius,
            },
            Coord {
                x: -radius,
                y: radius,
            },
        ],
        OffsetStyle::Round { segments } => {
            let segments = if segments < MIN_SEGMENTS {
                warn!(segments, "too few offset segments, using {}", MIN_SEGMENTS);
                MIN_SEGMENTS
            } else {
                segments
            };
            (0..segments)
                .map(|i| {
                    let theta = std::f64::consts::TAU * i as f64 / segments as f64;
                    Coord {
                        x: radius * theta.cos(),
                        y: radius * theta.sin(),
                    }
                })
                .collect()
        }
    }
}

/// The Minkowski sum of the region's boundary (outer and hole rings) with `kernel`.
fn boundary_sweep(region: &Region, kernel: &[Coord<f64>]) -> Region {
    let mut parts = Vec::new();
    for polygon in &region.as_multi_polygon().0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for line in ring.lines() {
                let points = kernel
                    .iter()
                    .flat_map(|k| [line.start + *k, line.end + *k])
                    .collect::<Vec<_>>();
                let hull = MultiPoint::from(points).convex_hull();
                parts.push(MultiPolygon::new(vec![hull]));
            }
        }
    }
    Region::from_multi_polygon(merge(parts))
}
