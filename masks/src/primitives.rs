//! Elementary shapes on a single layer.
//!
//! Every primitive is a [`CellFactory`], so identical shapes requested from a
//! [`BuildContext`] share one cached cell. Degenerate parameters (non-positive
//! radii, sizes or angle resolutions) are clamped to a safe minimum and
//! reported with a warning instead of failing.

use geometry::prelude::*;
use layir::Cell;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::{BuildContext, CellFactory};
use crate::error::Result;
use crate::layers::LayerId;

/// The smallest length a primitive may have, in microns.
pub const MIN_FEATURE: f64 = 1e-3;

/// The finest angle resolution, in degrees.
pub const MIN_ANGLE_RESOLUTION: f64 = 1e-3;

/// The coarsest angle resolution, in degrees. Circles keep at least three vertices.
pub const MAX_ANGLE_RESOLUTION: f64 = 120.;

/// Places a lattice of release holes inside a shape.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSpec {
    /// The radius of each hole.
    pub hole_radius: f64,
    /// The spacing between neighboring holes, and twice the margin to the shape edge.
    pub distance: f64,
    /// The angle resolution of each hole, in degrees.
    pub angle_resolution: f64,
    /// The layer the holes are drawn on.
    pub layer: LayerId,
}

impl ReleaseSpec {
    /// The center-to-center spacing of holes.
    pub fn pitch(&self) -> f64 {
        2. * self.hole_radius() + self.distance.max(0.)
    }

    fn hole_radius(&self) -> f64 {
        clamp_length("release hole radius", self.hole_radius)
    }

    fn hole(&self, center: Point) -> Polygon {
        circle_polygon(center, self.hole_radius(), self.angle_resolution)
    }

    /// The holes that fit in `rect`.
    pub fn rect_holes(&self, rect: Rect) -> Vec<Polygon> {
        let pitch = self.pitch();
        let (nx, x0) = lattice(rect.left(), rect.width(), pitch);
        let (ny, y0) = lattice(rect.bot(), rect.height(), pitch);
        let mut holes = Vec::with_capacity(nx * ny);
        for i in 0..nx {
            for j in 0..ny {
                let center = Point::new(x0 + pitch * i as f64, y0 + pitch * j as f64);
                holes.push(self.hole(center));
            }
        }
        holes
    }

    /// The holes that fit in the ring sector between `radius_inner` and
    /// `radius_outer` spanning `angles`.
    pub fn ring_holes(&self, radius_inner: f64, radius_outer: f64, angles: (f64, f64)) -> Vec<Polygon> {
        let pitch = self.pitch();
        let span = angles.1 - angles.0;
        let (rows, r0) = lattice(radius_inner, radius_outer - radius_inner, pitch);
        let mut holes = Vec::new();
        for row in 0..rows {
            let radius = r0 + pitch * row as f64;
            let pitch_deg = (pitch / radius).to_degrees();
            let (count, a0) = lattice(angles.0, span, pitch_deg);
            for k in 0..count {
                holes.push(self.hole(Point::polar(radius, a0 + pitch_deg * k as f64)));
            }
        }
        holes
    }
}

/// The number of lattice sites of `pitch` fitting in `[start, start + length]`,
/// and the position of the first one. Sites are centered in the interval.
fn lattice(start: f64, length: f64, pitch: f64) -> (usize, f64) {
    if length <= 0. || pitch <= 0. {
        return (0, start);
    }
    let n = (length / pitch).floor() as usize;
    let first = start + 0.5 * (length - n as f64 * pitch) + 0.5 * pitch;
    (n, first)
}

fn clamp_length(what: &'static str, value: f64) -> f64 {
    if value.is_finite() && value >= MIN_FEATURE {
        value
    } else {
        warn!(value, "degenerate {what}, clamping to {MIN_FEATURE}");
        MIN_FEATURE
    }
}

fn clamp_resolution(angle_resolution: f64) -> f64 {
    if !angle_resolution.is_finite() || angle_resolution < MIN_ANGLE_RESOLUTION {
        warn!(angle_resolution, "angle resolution too fine, clamping to {MIN_ANGLE_RESOLUTION}");
        MIN_ANGLE_RESOLUTION
    } else if angle_resolution > MAX_ANGLE_RESOLUTION {
        warn!(angle_resolution, "angle resolution too coarse, clamping to {MAX_ANGLE_RESOLUTION}");
        MAX_ANGLE_RESOLUTION
    } else {
        angle_resolution
    }
}

/// The largest radial distance between an arc of `radius` and its polygonal
/// approximation at `angle_resolution` degrees, plus the sagitta of `chord`.
///
/// Shapes that must touch a curved edge are extended by this amount so that no
/// gap opens between the true arc and its vertices.
///
/// # Examples
///
/// ```
/// # use masks::primitives::sagitta_offset_safe;
/// let s = sagitta_offset_safe(100., 0., 1.);
/// assert!((s - 100. * (1. - 0.5f64.to_radians().cos())).abs() < 1e-12);
/// ```
pub fn sagitta_offset_safe(radius: f64, chord: f64, angle_resolution: f64) -> f64 {
    let radius = radius.abs();
    let half_chord = (0.5 * chord.abs()).min(radius);
    let chord_sagitta = radius - (radius * radius - half_chord * half_chord).sqrt();
    let step = clamp_resolution(angle_resolution).to_radians();
    chord_sagitta + radius * (1. - (0.5 * step).cos())
}

/// Vertices of the arc of `radius` about the origin from `start` to `end` degrees, both included.
pub fn arc(radius: f64, start: f64, end: f64, angle_resolution: f64) -> Vec<Point> {
    let span = end - start;
    let segments = ((span.abs() / clamp_resolution(angle_resolution)).ceil() as usize).max(1);
    (0..=segments)
        .map(|i| Point::polar(radius, start + span * i as f64 / segments as f64))
        .collect()
}

/// A regular polygon approximating the circle of `radius` about `center`.
pub fn circle_polygon(center: Point, radius: f64, angle_resolution: f64) -> Polygon {
    let mut points = arc(radius, 0., 360., angle_resolution);
    points.pop();
    points.into_iter().map(|p| p + center).collect()
}

/// Single-ring polygons covering a ring sector.
///
/// Sectors of a full turn or more are split in two halves.
pub fn ring_polygons(
    radius_inner: f64,
    radius_outer: f64,
    angles: (f64, f64),
    angle_resolution: f64,
) -> Vec<Polygon> {
    let (mut start, mut end) = angles;
    if end < start {
        std::mem::swap(&mut start, &mut end);
    }
    if end - start < MIN_ANGLE_RESOLUTION {
        warn!(start, end, "ring sector has no angular extent");
        return Vec::new();
    }
    let end = end.min(start + 360.);
    let radius_inner = if radius_inner < 0. {
        warn!(radius_inner, "negative inner ring radius, clamping to 0");
        0.
    } else {
        radius_inner
    };
    let radius_outer = if radius_outer < radius_inner + MIN_FEATURE {
        warn!(
            radius_inner,
            radius_outer, "ring outer radius does not exceed inner radius"
        );
        radius_inner + MIN_FEATURE
    } else {
        radius_outer
    };

    let sector = |a: f64, b: f64| {
        let mut points = arc(radius_outer, a, b, angle_resolution);
        if radius_inner > 0. {
            points.extend(arc(radius_inner, b, a, angle_resolution));
        } else {
            points.push(Point::zero());
        }
        Polygon::from_verts(points)
    };

    if end - start >= 360. - MIN_ANGLE_RESOLUTION {
        let mid = start + 180.;
        vec![sector(start, mid), sector(mid, start + 360.)]
    } else {
        vec![sector(start, end)]
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rectangle {
    pub layer: LayerId,
    /// Width and height.
    pub size: (f64, f64),
    /// Centers the rectangle on the origin instead of placing its lower left corner there.
    pub centered: bool,
    pub release: Option<ReleaseSpec>,
}

impl Rectangle {
    /// A rectangle with its lower left corner on the origin.
    pub fn new(layer: LayerId, size: (f64, f64)) -> Self {
        Self {
            layer,
            size,
            centered: false,
            release: None,
        }
    }

    pub fn centered(mut self) -> Self {
        self.centered = true;
        self
    }

    pub fn with_release(mut self, release: Option<ReleaseSpec>) -> Self {
        self.release = release;
        self
    }

    /// The rectangle geometry.
    pub fn rect(&self) -> Rect {
        let w = clamp_length("rectangle width", self.size.0);
        let h = clamp_length("rectangle height", self.size.1);
        if self.centered {
            Rect::from_center_dims(Point::zero(), w, h)
        } else {
            Rect::from_sides(0., 0., w, h)
        }
    }
}

impl CellFactory for Rectangle {
    const NAME: &'static str = "rectangle";

    fn build(&self, _ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let rect = self.rect();
        let mut cell = Cell::new(Self::NAME);
        cell.add_shape(self.layer, rect);
        if let Some(release) = &self.release {
            for hole in release.rect_holes(rect) {
                cell.add_shape(release.layer, hole);
            }
        }
        Ok(cell)
    }
}

/// A disk centered on the origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Circle {
    pub layer: LayerId,
    pub radius: f64,
    pub angle_resolution: f64,
}

impl CellFactory for Circle {
    const NAME: &'static str = "circle";

    fn build(&self, _ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let radius = clamp_length("circle radius", self.radius);
        let mut cell = Cell::new(Self::NAME);
        cell.add_shape(
            self.layer,
            circle_polygon(Point::zero(), radius, self.angle_resolution),
        );
        Ok(cell)
    }
}

/// A ring sector centered on the origin, spanning `angles` in degrees counterclockwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ring {
    pub layer: LayerId,
    pub radius_inner: f64,
    pub radius_outer: f64,
    pub angles: (f64, f64),
    pub angle_resolution: f64,
    pub release: Option<ReleaseSpec>,
}

impl Ring {
    pub fn new(
        layer: LayerId,
        radius_inner: f64,
        radius_outer: f64,
        angles: (f64, f64),
        angle_resolution: f64,
    ) -> Self {
        Self {
            layer,
            radius_inner,
            radius_outer,
            angles,
            angle_resolution,
            release: None,
        }
    }

    pub fn with_release(mut self, release: Option<ReleaseSpec>) -> Self {
        self.release = release;
        self
    }
}

impl CellFactory for Ring {
    const NAME: &'static str = "ring";

    fn build(&self, _ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let mut cell = Cell::new(Self::NAME);
        for polygon in ring_polygons(
            self.radius_inner,
            self.radius_outer,
            self.angles,
            self.angle_resolution,
        ) {
            cell.add_shape(self.layer, polygon);
        }
        if let Some(release) = &self.release {
            let (start, end) = if self.angles.0 <= self.angles.1 {
                self.angles
            } else {
                (self.angles.1, self.angles.0)
            };
            for hole in release.ring_holes(
                self.radius_inner.max(0.),
                self.radius_outer,
                (start, end.min(start + 360.)),
            ) {
                cell.add_shape(release.layer, hole);
            }
        }
        Ok(cell)
    }
}

/// An arbitrary polygon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolygonShape {
    pub layer: LayerId,
    pub points: Vec<Point>,
}

impl CellFactory for PolygonShape {
    const NAME: &'static str = "polygon";

    fn build(&self, _ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let mut cell = Cell::new(Self::NAME);
        if self.points.len() < 3 {
            warn!(points = self.points.len(), "polygon has fewer than 3 points");
        } else {
            cell.add_shape(self.layer, Polygon::from_verts(self.points.clone()));
        }
        Ok(cell)
    }
}

/// Concentric disks, one per layer, with radii interpolated linearly from
/// `radius_first` on the first layer to `radius_last` on the last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Via {
    pub radius_first: f64,
    pub radius_last: f64,
    pub layers: Vec<LayerId>,
    pub angle_resolution: f64,
}

impl Via {
    /// The disk radius on each layer.
    pub fn radii(&self) -> impl Iterator<Item = (LayerId, f64)> + '_ {
        let steps = self.layers.len().saturating_sub(1).max(1) as f64;
        self.layers.iter().enumerate().map(move |(i, layer)| {
            let t = i as f64 / steps;
            (
                *layer,
                self.radius_first + t * (self.radius_last - self.radius_first),
            )
        })
    }
}

impl CellFactory for Via {
    const NAME: &'static str = "via";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let mut cell = Cell::new(Self::NAME);
        for (layer, radius) in self.radii() {
            let disk = ctx.cell(Circle {
                layer,
                radius,
                angle_resolution: self.angle_resolution,
            })?;
            cell.add_instance(disk);
        }
        Ok(cell)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use std::f64::consts::PI;
    use test_log::test;

    use super::*;
    use crate::boolean::Region;

    const L: LayerId = LayerId::new(1, 0);
    const HOLES: LayerId = LayerId::new(1, 1);

    fn area(cell: &Cell<LayerId>, layer: LayerId) -> f64 {
        Region::from_polygons(cell.flatten().get(&layer)).area()
    }

    fn release() -> ReleaseSpec {
        ReleaseSpec {
            hole_radius: 1.,
            distance: 2.,
            angle_resolution: 30.,
            layer: HOLES,
        }
    }

    #[test]
    fn rectangles_are_placed_by_corner_or_center() {
        let mut ctx = BuildContext::mega_pc().unwrap();
        let corner = ctx.cell(Rectangle::new(L, (4., 2.))).unwrap();
        let center = ctx.cell(Rectangle::new(L, (4., 2.)).centered()).unwrap();
        assert_eq!(corner.bbox(), Some(Rect::from_sides(0., 0., 4., 2.)));
        assert_eq!(center.bbox(), Some(Rect::from_sides(-2., -1., 2., 1.)));
    }

    #[test]
    fn circle_area_converges() {
        let mut ctx = BuildContext::mega_pc().unwrap();
        let coarse = ctx
            .cell(Circle {
                layer: L,
                radius: 10.,
                angle_resolution: 10.,
            })
            .unwrap();
        let fine = ctx
            .cell(Circle {
                layer: L,
                radius: 10.,
                angle_resolution: 0.5,
            })
            .unwrap();
        let exact = PI * 100.;
        assert!(area(&coarse, L) < area(&fine, L));
        assert_relative_eq!(area(&fine, L), exact, max_relative = 1e-4);
        assert_eq!(coarse.flatten().get(&L)[0].len(), 36);
    }

    #[test]
    fn ring_sectors_have_expected_area() {
        let half = ring_polygons(1., 2., (-90., 90.), 0.1);
        assert_eq!(half.len(), 1);
        let area: f64 = half.iter().map(Polygon::area).sum();
        assert_relative_eq!(area, 0.5 * PI * 3., max_relative = 1e-5);

        let full = ring_polygons(1., 2., (0., 360.), 0.1);
        assert_eq!(full.len(), 2);
        let region = Region::from_polygons(&full);
        assert_relative_eq!(region.area(), PI * 3., max_relative = 1e-5);
        assert!(!region.contains(Point::zero()));

        // Reversed angles describe the same sector.
        let reversed = ring_polygons(1., 2., (90., -90.), 0.1);
        assert_relative_eq!(reversed[0].area(), half[0].area(), epsilon = 1e-9);
    }

    #[test]
    fn degenerate_parameters_are_clamped() {
        let mut ctx = BuildContext::mega_pc().unwrap();
        let circle = ctx
            .cell(Circle {
                layer: L,
                radius: -5.,
                angle_resolution: 1000.,
            })
            .unwrap();
        assert_eq!(circle.flatten().get(&L).len(), 1);

        let rect = ctx.cell(Rectangle::new(L, (0., 3.))).unwrap();
        assert_relative_eq!(rect.bbox().unwrap().width(), MIN_FEATURE);

        let ring = ring_polygons(5., 4., (0., 90.), 1.);
        assert_eq!(ring.len(), 1);
        assert!(ring_polygons(4., 5., (10., 10.), 1.).is_empty());
        assert_eq!(circle_polygon(Point::zero(), 1., 1000.).len(), 3);
    }

    #[test]
    fn release_holes_fill_rectangles() {
        let mut ctx = BuildContext::mega_pc().unwrap();
        let rect = ctx
            .cell(Rectangle::new(L, (20., 9.)).with_release(Some(release())))
            .unwrap();
        let holes = rect.flatten();
        // A pitch of 4 fits 5 columns and 2 rows.
        assert_eq!(holes.get(&HOLES).len(), 10);
        let outline = Region::from_rect(Rect::from_sides(0., 0., 20., 9.));
        let holes = Region::from_polygons(holes.get(&HOLES));
        assert_relative_eq!(
            holes.difference(&outline).area(),
            0.,
            epsilon = 1e-9
        );

        let narrow = ctx
            .cell(Rectangle::new(L, (3., 30.)).with_release(Some(release())))
            .unwrap();
        assert!(narrow.flatten().get(&HOLES).is_empty());
    }

    #[test]
    fn release_holes_follow_rings() {
        let spec = release();
        let holes = spec.ring_holes(10., 18., (0., 90.));
        assert!(!holes.is_empty());
        let sector = Region::from_polygons(&ring_polygons(10., 18., (0., 90.), 0.1));
        let covered = Region::from_polygons(&holes);
        assert_relative_eq!(covered.difference(&sector).area(), 0., epsilon = 1e-6);
        // Two rows, each with as many holes as fit along its arc.
        let rows = [12.0f64, 16.];
        let expected: usize = rows
            .iter()
            .map(|r| (r * PI / 2. / spec.pitch()).floor() as usize)
            .sum();
        assert_eq!(holes.len(), expected);
    }

    #[test]
    fn via_radii_are_interpolated() {
        let layers = vec![
            LayerId::new(10, 0),
            LayerId::new(11, 0),
            LayerId::new(12, 0),
        ];
        let via = Via {
            radius_first: 20.,
            radius_last: 100.,
            layers: layers.clone(),
            angle_resolution: 1.,
        };
        let radii = via.radii().map(|(_, r)| r).collect::<Vec<_>>();
        assert_eq!(radii, vec![20., 60., 100.]);

        let mut ctx = BuildContext::mega_pc().unwrap();
        let cell = ctx.cell(via).unwrap();
        let flat = cell.flatten();
        for (layer, radius) in layers.iter().zip(radii) {
            let bbox = flat.get(layer).bbox().unwrap();
            assert_relative_eq!(bbox.right(), radius, epsilon = 1e-9);
        }
    }

    #[test]
    fn sagitta_grows_with_chord() {
        let base = sagitta_offset_safe(100., 0., 1.);
        assert!(base > 0.);
        assert!(sagitta_offset_safe(100., 50., 1.) > base);
        // Chords longer than the diameter saturate.
        assert_relative_eq!(
            sagitta_offset_safe(100., 500., 1.),
            100. + base,
            epsilon = 1e-9
        );
    }
}
