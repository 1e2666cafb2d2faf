//! Layer boolean algebra.
//!
//! Polygons on a layer are merged into a [`Region`] before any operation, so
//! overlapping shapes never count twice. Results are converted back to
//! hole-free polygons by cutting every hole open along a vertical line.

use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use geo::{Area, BooleanOps, BoundingRect, Contains, Coord, LineString, MultiPolygon};
use geometry::prelude::{Point, Polygon, Rect};
use layir::Cell;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{MaskError, Result};
use crate::layers::LayerId;

/// A boolean operation between two layers.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOp {
    /// Area covered by either operand.
    Union,
    /// Area covered by the first operand but not the second.
    Difference,
    /// Area covered by both operands.
    Intersection,
}

impl Display for BoolOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Union => "or",
            Self::Difference => "not",
            Self::Intersection => "and",
        })
    }
}

/// A merged set of polygons, possibly with holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    shape: MultiPolygon<f64>,
}

impl Default for Region {
    fn default() -> Self {
        Self::empty()
    }
}

impl Region {
    /// The empty region.
    pub fn empty() -> Self {
        Self {
            shape: MultiPolygon::new(Vec::new()),
        }
    }

    /// Merges `polygons` into a single region.
    ///
    /// Polygons with fewer than three vertices are ignored.
    pub fn from_polygons<'a>(polygons: impl IntoIterator<Item = &'a Polygon>) -> Self {
        let parts = polygons
            .into_iter()
            .filter(|p| p.len() >= 3)
            .map(|p| MultiPolygon::new(vec![to_geo(p)]))
            .collect::<Vec<_>>();
        Self {
            shape: merge(parts),
        }
    }

    /// The region covered by an axis-aligned rectangle.
    pub fn from_rect(rect: Rect) -> Self {
        Self::from_polygons([&rect.to_polygon()])
    }

    pub(crate) fn from_multi_polygon(shape: MultiPolygon<f64>) -> Self {
        Self { shape }
    }

    pub(crate) fn as_multi_polygon(&self) -> &MultiPolygon<f64> {
        &self.shape
    }

    /// The area covered by `self`, `other` or both.
    pub fn union(&self, other: &Region) -> Region {
        Self::from_multi_polygon(self.shape.union(&other.shape))
    }

    /// The area covered by `self` but not by `other`.
    pub fn difference(&self, other: &Region) -> Region {
        Self::from_multi_polygon(self.shape.difference(&other.shape))
    }

    /// The area covered by both `self` and `other`.
    pub fn intersection(&self, other: &Region) -> Region {
        Self::from_multi_polygon(self.shape.intersection(&other.shape))
    }

    /// Applies `op` with `self` as the first operand.
    pub fn apply(&self, op: BoolOp, other: &Region) -> Region {
        match op {
            BoolOp::Union => self.union(other),
            BoolOp::Difference => self.difference(other),
            BoolOp::Intersection => self.intersection(other),
        }
    }

    /// The enclosed area.
    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    /// Returns `true` if the region has no polygons.
    pub fn is_empty(&self) -> bool {
        self.shape.0.is_empty()
    }

    /// The number of connected pieces, counting holes as part of their piece.
    pub fn num_pieces(&self) -> usize {
        self.shape.0.len()
    }

    /// The total number of holes.
    pub fn num_holes(&self) -> usize {
        self.shape.0.iter().map(|p| p.interiors().len()).sum()
    }

    /// Returns `true` if `p` lies strictly inside the region.
    pub fn contains(&self, p: Point) -> bool {
        self.shape.contains(&Coord { x: p.x, y: p.y })
    }

    pub fn bbox(&self) -> Option<Rect> {
        let r = self.shape.bounding_rect()?;
        Some(Rect::new(
            Point::new(r.min().x, r.min().y),
            Point::new(r.max().x, r.max().y),
        ))
    }

    /// Converts the region into hole-free, counterclockwise polygons.
    pub fn to_polygons(&self) -> Vec<Polygon> {
        split_holes(self.shape.0.iter().cloned())
    }

    /// Creates a cell named `name` holding the region on `layer`.
    pub fn to_cell(&self, name: impl Into<ArcStr>, layer: LayerId) -> Cell<LayerId> {
        let mut cell = Cell::new(name);
        for polygon in self.to_polygons() {
            cell.add_shape(layer, polygon);
        }
        cell
    }
}

/// Merges the polygons of `cell` on `layer` into a region.
pub fn layer_region(cell: &Cell<LayerId>, layer: LayerId) -> Region {
    Region::from_polygons(cell.extract([layer]).get(&layer))
}

/// Computes `a[layer_a] op b[layer_b]` and places the result on `out_layer` of a new cell.
///
/// Both operands are flattened in their own root frames.
pub fn boolean(
    a: &Cell<LayerId>,
    b: &Cell<LayerId>,
    op: BoolOp,
    out_layer: LayerId,
    layer_a: LayerId,
    layer_b: LayerId,
) -> Cell<LayerId> {
    let ra = layer_region(a, layer_a);
    let rb = layer_region(b, layer_b);
    let result = ra.apply(op, &rb);
    debug!(
        a = %a.name(),
        b = %b.name(),
        %op,
        %layer_a,
        %layer_b,
        %out_layer,
        pieces = result.num_pieces(),
        "boolean"
    );
    result.to_cell(
        arcstr::format!("{}_{}_{}", a.name(), op, b.name()),
        out_layer,
    )
}

/// Unions all `parts` pairwise until a single multipolygon remains.
pub(crate) fn merge(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    match parts.len() {
        0 => return MultiPolygon::new(Vec::new()),
        // Normalizes self-overlapping input.
        1 => return parts[0].union(&MultiPolygon::new(Vec::new())),
        _ => {}
    }
    while parts.len() > 1 {
        trace!(parts = parts.len(), "merge pass");
        let mut next = Vec::with_capacity(parts.len() / 2 + 1);
        let mut iter = parts.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        parts = next;
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

pub(crate) fn to_geo(polygon: &Polygon) -> geo::Polygon<f64> {
    let coords = polygon
        .points()
        .iter()
        .map(|p| Coord { x: p.x, y: p.y })
        .collect::<Vec<_>>();
    geo::Polygon::new(LineString::new(coords), Vec::new())
}

fn from_ring(ring: &LineString<f64>) -> Polygon {
    let mut points = ring
        .coords()
        .map(|c| Point::new(c.x, c.y))
        .collect::<Vec<_>>();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    let polygon = Polygon::from_verts(points);
    if polygon.signed_area() < 0. {
        polygon.reversed()
    } else {
        polygon
    }
}

/// A rectangle covering everything left or right of `x = cut` within `bbox`.
fn half_plane(bbox: &geo::Rect<f64>, cut: f64, left: bool) -> MultiPolygon<f64> {
    let margin = 1. + bbox.width() + bbox.height();
    let (lo, hi) = (bbox.min(), bbox.max());
    let (x0, x1) = if left {
        (lo.x - margin, cut)
    } else {
        (cut, hi.x + margin)
    };
    let rect = geo::Rect::new(
        Coord {
            x: x0,
            y: lo.y - margin,
        },
        Coord {
            x: x1,
            y: hi.y + margin,
        },
    );
    MultiPolygon::new(vec![rect.to_polygon()])
}

/// Cuts `polygon` along vertical lines until no piece has more than
/// `max_vertices` vertices.
pub(crate) fn split_vertices(polygon: &Polygon, max_vertices: usize) -> Result<Vec<Polygon>> {
    let mut out = Vec::new();
    let mut pending = vec![to_geo(polygon)];
    while let Some(poly) = pending.pop() {
        let vertices = poly.exterior().0.len().saturating_sub(1);
        if vertices <= max_vertices {
            out.push(from_ring(poly.exterior()));
            continue;
        }
        let Some(bbox) = poly.bounding_rect() else {
            continue;
        };
        let mut xs = poly.exterior().coords().map(|c| c.x).collect::<Vec<_>>();
        xs.sort_by(f64::total_cmp);
        let cut = xs[xs.len() / 2];

        let poly = MultiPolygon::new(vec![poly]);
        for left in [true, false] {
            for piece in poly.intersection(&half_plane(&bbox, cut, left)).0 {
                if piece.exterior().0.len().saturating_sub(1) >= vertices {
                    return Err(MaskError::Gds(format!(
                        "cannot split a polygon of {vertices} vertices below {max_vertices}"
                    )));
                }
                pending.push(piece);
            }
        }
    }
    Ok(out)
}

/// Cuts every polygon with holes into hole-free pieces.
///
/// Each cut runs through the center of the median hole, so the hole it crosses
/// is opened and the others are divided between the two sides.
fn split_holes(polygons: impl IntoIterator<Item = geo::Polygon<f64>>) -> Vec<Polygon> {
    let mut out = Vec::new();
    let mut pending = polygons.into_iter().collect::<Vec<_>>();
    while let Some(poly) = pending.pop() {
        let mut centers = poly
            .interiors()
            .iter()
            .filter_map(|hole| hole.bounding_rect())
            .map(|r| 0.5 * (r.min().x + r.max().x))
            .collect::<Vec<_>>();
        let Some(bbox) = poly.bounding_rect().filter(|_| !centers.is_empty()) else {
            out.push(from_ring(poly.exterior()));
            continue;
        };
        centers.sort_by(f64::total_cmp);
        let cut = centers[centers.len() / 2];
        trace!(holes = centers.len(), cut, "cutting holes open");

        let poly = MultiPolygon::new(vec![poly]);
        for left in [true, false] {
            pending.extend(poly.intersection(&half_plane(&bbox, cut, left)).0);
        }
    }
    out
}
