//! Flat GDS export.
//!
//! Cells are flattened into a single structure. Coordinates are in microns and
//! rounded to a 1 nm database grid.

use std::path::Path;

use gds21::{GdsBoundary, GdsElement, GdsLibrary, GdsPoint, GdsStruct, GdsTextElem, GdsUnits};
use geometry::prelude::{Point, Polygon};
use layir::Cell;
use tracing::{debug, trace};

use crate::boolean::split_vertices;
use crate::error::{MaskError, Result};
use crate::layers::LayerId;

/// The most vertices written in one boundary.
///
/// An XY record holds at most 8191 points including the closing point.
pub const MAX_GDS_VERTICES: usize = 8000;

/// Database units per user unit (micron).
pub const DB_PER_USER: f64 = 1000.;

/// The library units: 1 nm database unit, 1 µm user unit.
pub fn units() -> GdsUnits {
    GdsUnits::new(1. / DB_PER_USER, 1e-9)
}

fn export_coord(v: f64) -> Result<i32> {
    let scaled = (v * DB_PER_USER).round();
    if scaled.is_finite() && scaled >= i32::MIN as f64 && scaled <= i32::MAX as f64 {
        Ok(scaled as i32)
    } else {
        Err(MaskError::CoordinateOutOfRange(v))
    }
}

fn export_point(p: Point) -> Result<GdsPoint> {
    Ok(GdsPoint::new(export_coord(p.x)?, export_coord(p.y)?))
}

fn export_layer(layer: LayerId) -> Result<(i16, i16)> {
    match (i16::try_from(layer.number), i16::try_from(layer.datatype)) {
        (Ok(number), Ok(datatype)) => Ok((number, datatype)),
        _ => Err(MaskError::Gds(format!("layer {layer} exceeds the GDS range"))),
    }
}

/// Converts a polygon into a closed boundary.
///
/// Returns `None` if fewer than three distinct vertices survive grid snapping.
fn export_polygon(layer: LayerId, polygon: &Polygon) -> Result<Option<GdsBoundary>> {
    let (number, datatype) = export_layer(layer)?;
    let mut xy: Vec<GdsPoint> = Vec::with_capacity(polygon.len() + 1);
    for p in polygon.points() {
        let p = export_point(*p)?;
        if xy.last() != Some(&p) {
            xy.push(p);
        }
    }
    while xy.len() > 1 && xy.first() == xy.last() {
        xy.pop();
    }
    if xy.len() < 3 {
        trace!(%layer, vertices = polygon.len(), "dropping degenerate polygon");
        return Ok(None);
    }
    xy.push(xy[0].clone());
    Ok(Some(GdsBoundary {
        layer: number,
        datatype,
        xy,
        ..Default::default()
    }))
}

/// Flattens `cell` into a GDS library named `name` with one structure.
pub fn export_cell(cell: &Cell<LayerId>, name: &str) -> Result<GdsLibrary> {
    let mut strukt = GdsStruct::new(cell.name().as_str());
    for (layer, polygons) in cell.flatten().iter() {
        for polygon in polygons {
            if polygon.len() > MAX_GDS_VERTICES {
                let pieces = split_vertices(polygon, MAX_GDS_VERTICES)?;
                debug!(%layer, vertices = polygon.len(), pieces = pieces.len(), "split large polygon");
                for piece in &pieces {
                    if let Some(boundary) = export_polygon(*layer, piece)? {
                        strukt.elems.push(GdsElement::GdsBoundary(boundary));
                    }
                }
            } else if let Some(boundary) = export_polygon(*layer, polygon)? {
                strukt.elems.push(GdsElement::GdsBoundary(boundary));
            }
        }
    }
    for text in cell.flatten_texts() {
        let (layer, texttype) = export_layer(*text.layer())?;
        strukt.elems.push(GdsElement::GdsTextElem(GdsTextElem {
            string: text.text().to_string(),
            layer,
            texttype,
            xy: export_point(text.position())?,
            ..Default::default()
        }));
    }

    let mut lib = GdsLibrary::new(name);
    lib.units = units();
    debug!(
        library = name,
        cell = %cell.name(),
        elements = strukt.elems.len(),
        "exported GDS library"
    );
    lib.structs.push(strukt);
    Ok(lib)
}

/// Writes `lib` to `path`, creating parent directories as needed.
pub fn save(lib: &GdsLibrary, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    lib.save(path)?;
    debug!(path = %path.display(), "wrote GDS file");
    Ok(())
}
