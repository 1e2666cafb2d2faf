//! Axis-aligned rectangular bounding boxes.

use crate::{point::Point, rect::Rect};

/// A geometric shape that has a bounding box.
///
/// # Examples
///
/// ```
/// # use geometry::prelude::*;
/// let rect = Rect::from_sides(0., 0., 100., 200.);
/// assert_eq!(rect.bbox(), Some(Rect::from_sides(0., 0., 100., 200.)));
/// ```
pub trait Bbox {
    /// Computes the axis-aligned rectangular bounding box.
    ///
    /// If empty, this method should return `None`.
    /// Note that points and zero-area rectangles are not empty:
    /// these shapes contain a single point, and their bounding box
    /// implementations will return `Some(_)`.
    fn bbox(&self) -> Option<Rect>;
}

impl<T> Bbox for &T
where
    T: Bbox,
{
    fn bbox(&self) -> Option<Rect> {
        T::bbox(*self)
    }
}

impl Bbox for Point {
    fn bbox(&self) -> Option<Rect> {
        Some(Rect::from_point(*self))
    }
}

impl<T: Bbox> Bbox for [T] {
    fn bbox(&self) -> Option<Rect> {
        self.iter()
            .filter_map(|item| item.bbox())
            .reduce(|acc, rect| acc.union(rect))
    }
}

impl<T: Bbox> Bbox for Vec<T> {
    fn bbox(&self) -> Option<Rect> {
        self.as_slice().bbox()
    }
}

impl Bbox for Option<Rect> {
    fn bbox(&self) -> Option<Rect> {
        *self
    }
}

#[cfg(test)]
mod tests {
    use crate::{bbox::Bbox, point::Point, polygon::Polygon, rect::Rect};

    #[test]
    fn bbox_works_for_vecs() {
        let v = vec![
            Rect::from_sides(0., 0., 100., 200.),
            Rect::from_sides(-50., 20., 90., 250.),
        ];
        assert_eq!(v.bbox(), Some(Rect::from_sides(-50., 0., 100., 250.)));
    }

    #[test]
    fn bbox_works_for_polygon() {
        let points = vec![
            Point::new(-10., 25.),
            Point::new(0., 16.),
            Point::new(40., -20.),
        ];
        let polygon = Polygon::from_verts(points);
        assert_eq!(polygon.bbox(), Some(Rect::from_sides(-10., -20., 40., 25.)));
    }

    #[test]
    fn empty_vec_has_no_bbox() {
        let v: Vec<Polygon> = Vec::new();
        assert_eq!(v.bbox(), None);
    }
}
