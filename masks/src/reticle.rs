//! Reticle step-and-repeat for a four-image stepper reticle.
//!
//! Each image holds the geometry of one mask layer inside a window centered
//! on the origin. Four images share a reticle on a 2x2 grid.

use std::io::Write;
use std::sync::Arc;

use arcstr::ArcStr;
use geometry::prelude::*;
use indexmap::IndexMap;
use layir::Cell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::boolean::Region;
use crate::error::{MaskError, Result};
use crate::layers::{LayerId, LayerRegistry};

/// The number of images on one reticle.
pub const IMAGES_PER_RETICLE: usize = 4;

/// The gap between neighboring images, in microns.
pub const IMAGE_STREET: f64 = 1000.;

/// Where an image sits on its reticle.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// The index of the reticle holding the image.
    pub reticle: usize,
    /// Counterclockwise rotation of the image, in degrees.
    pub rotation: f64,
    pub center_x: f64,
    pub center_y: f64,
}

/// The reticles of a build.
#[derive(Debug, Clone)]
pub struct Reticles {
    /// One cell per reticle.
    pub fields: Vec<Arc<Cell<LayerId>>>,
    /// The placement of each image layer, in image order.
    pub placements: IndexMap<LayerId, Placement>,
}

/// The offset of image slot `slot` from the reticle center.
///
/// Slots run left to right, then top to bottom.
fn slot_center(slot: usize, image_size: (f64, f64)) -> Point {
    let dx = 0.5 * (image_size.0 + IMAGE_STREET);
    let dy = 0.5 * (image_size.1 + IMAGE_STREET);
    let x = if slot % 2 == 0 { -dx } else { dx };
    let y = if slot < 2 { dy } else { -dy };
    Point::new(x, y)
}

/// Places the `image_layers` of `component` on reticles, four images per reticle.
///
/// Every reticle is labeled with `id` and `text` on the `label` layer.
pub fn reticle(
    component: &Cell<LayerId>,
    image_size: (f64, f64),
    image_layers: &[LayerId],
    label: LayerId,
    id: &str,
    text: &str,
) -> Result<Reticles> {
    if image_layers.is_empty() {
        return Err(MaskError::EmptyReticle(id.into()));
    }
    let (w, h) = image_size;
    if !(w.is_finite() && h.is_finite() && w > 0. && h > 0.) {
        return Err(MaskError::Config(format!(
            "reticle image size must be positive, got {w} x {h}"
        )));
    }

    let window = Region::from_rect(Rect::from_center_dims(Point::zero(), w, h));
    let flat = component.extract(image_layers.iter().copied());

    let mut fields = Vec::new();
    let mut placements = IndexMap::new();
    for (index, images) in image_layers.chunks(IMAGES_PER_RETICLE).enumerate() {
        let mut field = Cell::new(arcstr::format!("{id}_ASML_{index}"));
        for (slot, layer) in images.iter().enumerate() {
            let image = Region::from_polygons(flat.get(layer)).intersection(&window);
            if image.is_empty() {
                warn!(%layer, reticle = index, "reticle image is empty");
            }
            let center = slot_center(slot, image_size);
            let image = image.to_cell(arcstr::format!("{id}_IMAGE_{}_{}", layer.number, layer.datatype), *layer);
            field
                .add_instance(Arc::new(image))
                .translate(center.x, center.y);
            placements.insert(
                *layer,
                Placement {
                    reticle: index,
                    rotation: 0.,
                    center_x: center.x,
                    center_y: center.y,
                },
            );
        }
        let margin = h + IMAGE_STREET;
        field.add_text(label, id, Point::new(0., margin));
        field.add_text(label, text, Point::new(0., -margin));
        fields.push(Arc::new(field));
    }

    info!(id, reticles = fields.len(), images = placements.len(), "placed reticle images");
    Ok(Reticles { fields, placements })
}

/// A copy of `field` mirrored across `x = 0`.
pub fn mirrored(field: &Arc<Cell<LayerId>>) -> Cell<LayerId> {
    let mut cell = Cell::new(ArcStr::from(format!("{}_MIRROR", field.name())));
    cell.add_instance(field.clone()).mirror(Mirror::X(0.));
    cell
}

/// Writes one line per image layer: `<name>: R <rotation>, CX <x>, CY <y>`.
pub fn write_placements(
    mut writer: impl Write,
    placements: &IndexMap<LayerId, Placement>,
    registry: &LayerRegistry,
) -> Result<()> {
    for (layer, placement) in placements {
        let name = registry
            .name_of(*layer)
            .ok_or(MaskError::UnregisteredLayer(*layer))?;
        writeln!(
            writer,
            "{}: R {}, CX {:.2}, CY {:.2}",
            name, placement.rotation, placement.center_x, placement.center_y
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use test_log::test;

    use super::*;

    const LABEL: LayerId = LayerId::new(100, 0);

    fn layers(n: u16) -> Vec<LayerId> {
        (0..n).map(|i| LayerId::new(10 + i, 0)).collect()
    }

    fn component(layers: &[LayerId]) -> Cell<LayerId> {
        let mut cell = Cell::new("chip");
        for layer in layers {
            cell.add_shape(*layer, Rect::from_sides(-10., -10., 10., 10.));
        }
        cell
    }

    #[test]
    fn four_images_per_reticle() {
        let layers = layers(6);
        let reticles = reticle(&component(&layers), (100., 100.), &layers, LABEL, "MPC-1", "today").unwrap();
        assert_eq!(reticles.fields.len(), 2);
        assert_eq!(reticles.fields[0].instances().count(), 4);
        assert_eq!(reticles.fields[1].instances().count(), 2);
        assert_eq!(reticles.fields[1].name(), "MPC-1_ASML_1");

        let order = reticles.placements.keys().copied().collect::<Vec<_>>();
        assert_eq!(order, layers);
        let fifth = reticles.placements[&layers[4]];
        assert_eq!(fifth.reticle, 1);
        assert_relative_eq!(fifth.center_x, -550.);
        assert_relative_eq!(fifth.center_y, 550.);
        let fourth = reticles.placements[&layers[3]];
        assert_relative_eq!(fourth.center_x, 550.);
        assert_relative_eq!(fourth.center_y, -550.);

        // The image moves with its slot.
        let flat = reticles.fields[0].flatten();
        let bbox = flat.get(&layers[1]).bbox().unwrap();
        assert_relative_eq!(bbox.center(), Point::new(550., 550.), epsilon = 1e-9);

        let texts = reticles.fields[0].flatten_texts();
        assert!(texts.iter().any(|t| t.text() == "MPC-1"));
        assert!(texts.iter().any(|t| t.text() == "today"));
    }

    #[test]
    fn images_are_clipped_to_the_window() {
        let layer = LayerId::new(11, 0);
        let mut cell = Cell::new("big");
        cell.add_shape(layer, Rect::from_sides(-500., -20., 500., 20.));
        let reticles = reticle(&cell, (100., 100.), &[layer], LABEL, "id", "text").unwrap();
        let image = Region::from_polygons(reticles.fields[0].flatten().get(&layer));
        assert_relative_eq!(image.area(), 100. * 40., epsilon = 1e-9);
    }

    #[test]
    fn empty_layer_lists_are_rejected() {
        let cell = Cell::new("chip");
        assert!(matches!(
            reticle(&cell, (100., 100.), &[], LABEL, "MPC-1", ""),
            Err(MaskError::EmptyReticle(id)) if id.as_str() == "MPC-1"
        ));
        assert!(matches!(
            reticle(&cell, (0., 100.), &[LABEL], LABEL, "MPC-1", ""),
            Err(MaskError::Config(_))
        ));
    }

    #[test]
    fn mirrored_reticles_flip_x() {
        let layer = LayerId::new(11, 0);
        let mut cell = Cell::new("chip");
        cell.add_shape(layer, Rect::from_sides(10., 0., 20., 5.));
        let reticles = reticle(&cell, (100., 100.), &[layer], LABEL, "id", "text").unwrap();
        let mirror = mirrored(&reticles.fields[0]);
        assert_eq!(mirror.name(), "id_ASML_0_MIRROR");
        let original = reticles.fields[0].flatten().get(&layer).bbox().unwrap();
        let flipped = mirror.flatten().get(&layer).bbox().unwrap();
        assert_relative_eq!(flipped.left(), -original.right(), epsilon = 1e-9);
        assert_relative_eq!(flipped.bot(), original.bot(), epsilon = 1e-9);
    }

    #[test]
    fn placements_use_two_decimals() {
        let registry = LayerRegistry::mega_pc().unwrap();
        let mut placements = IndexMap::new();
        placements.insert(
            registry.get("POLY").unwrap(),
            Placement {
                reticle: 0,
                rotation: 0.,
                center_x: -4500.,
                center_y: 4500.126,
            },
        );
        placements.insert(
            registry.get("CAP_TRENCH_ETCH").unwrap(),
            Placement {
                reticle: 1,
                rotation: 90.,
                center_x: 1. / 3.,
                center_y: -0.25,
            },
        );
        let mut out = Vec::new();
        write_placements(&mut out, &placements, &registry).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "POLY: R 0, CX -4500.00, CY 4500.13\nCAP_TRENCH_ETCH: R 90, CX 0.33, CY -0.25\n"
        );

        placements.insert(LayerId::new(7, 7), placements[0]);
        assert!(matches!(
            write_placements(Vec::new(), &placements, &registry),
            Err(MaskError::UnregisteredLayer(_))
        ));
    }
}
