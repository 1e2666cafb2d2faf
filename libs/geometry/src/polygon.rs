//! Floating point polygons.

use serde::{Deserialize, Serialize};

use crate::bbox::Bbox;
use crate::point::Point;
use crate::rect::Rect;
use crate::transform::{TransformMut, Transformation};

/// A polygon, given by its vertices.
///
/// The polygon is implicitly closed: the last vertex connects back to the first.
/// No simplicity invariant is enforced.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct Polygon {
    /// Vector of points that make up the polygon.
    points: Vec<Point>,
}

impl Polygon {
    /// Creates a polygon with given vertices.
    pub fn from_verts(vec: Vec<Point>) -> Self {
        Self { points: vec }
    }

    /// Returns the vertices of the polygon.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the polygon has no vertices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterates over the edges of the polygon, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// The signed area enclosed by the polygon (shoelace formula).
    ///
    /// Positive for counterclockwise vertex order.
    ///
    /// # Example
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let polygon = Polygon::from_verts(vec![
    ///     Point::new(0., 0.),
    ///     Point::new(4., 0.),
    ///     Point::new(0., 3.),
    /// ]);
    /// assert_eq!(polygon.signed_area(), 6.);
    /// ```
    pub fn signed_area(&self) -> f64 {
        self.edges()
            .map(|(p, q)| p.x * q.y - q.x * p.y)
            .sum::<f64>()
            / 2.
    }

    /// The unsigned area enclosed by the polygon.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Returns the polygon with its vertex order reversed.
    pub fn reversed(mut self) -> Self {
        self.points.reverse();
        self
    }

    /// Returns the leftmost x-coordinate in the polygon.
    pub fn left(&self) -> Option<f64> {
        self.points.iter().map(|p| p.x).reduce(f64::min)
    }

    /// Returns the bottom y-coordinate in the polygon.
    pub fn bot(&self) -> Option<f64> {
        self.points.iter().map(|p| p.y).reduce(f64::min)
    }

    /// Returns the rightmost x-coordinate in the polygon.
    pub fn right(&self) -> Option<f64> {
        self.points.iter().map(|p| p.x).reduce(f64::max)
    }

    /// Returns the top y-coordinate in the polygon.
    pub fn top(&self) -> Option<f64> {
        self.points.iter().map(|p| p.y).reduce(f64::max)
    }
}

impl Bbox for Polygon {
    fn bbox(&self) -> Option<Rect> {
        Rect::from_sides_option(self.left()?, self.bot()?, self.right()?, self.top()?)
    }
}

impl TransformMut for Polygon {
    fn transform_mut(&mut self, trans: Transformation) {
        self.points.transform_mut(trans);
        // Keep counterclockwise polygons counterclockwise under reflection.
        if trans.is_reflection() {
            self.points.reverse();
        }
    }
}

impl FromIterator<Point> for Polygon {
    fn from_iter<T: IntoIterator<Item = Point>>(iter: T) -> Self {
        Self::from_verts(iter.into_iter().collect())
    }
}
