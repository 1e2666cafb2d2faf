//! Handle wafer mask reconstruction from graduated depth partitions.
//!
//! The handle layer is drawn as `N` partition layers `P(0)..P(N-1)`, shallowest
//! first. Each partition protects its own area and opens a cavity of fixed width
//! around it. Deeper partitions are processed first so that shallower ones can
//! reclaim the cavities of deeper ones.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use layir::Cell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::boolean::{layer_region, Region};
use crate::error::{MaskError, Result};
use crate::layers::LayerId;
use crate::offset::{offset, OffsetStyle};

/// The regions produced by [`reconstruct_handle`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandleRegions {
    /// The area etched from the handle wafer.
    pub handle: Region,
    /// Cavity borders later reclaimed by shallower partitions.
    pub release: Region,
}

/// How the reconstructed handle combines with explicitly drawn HANDLE_REMOVE shapes.
#[derive(Debug, Copy, Clone, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlePolicy {
    /// Drawn shapes are removed in addition to the reconstructed handle.
    #[default]
    Union,
    /// Drawn shapes are protected from the reconstructed handle.
    Difference,
}

impl Display for HandlePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Union => "union",
            Self::Difference => "difference",
        })
    }
}

impl FromStr for HandlePolicy {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "union" => Ok(Self::Union),
            "difference" => Ok(Self::Difference),
            other => Err(MaskError::Config(format!(
                "unknown handle policy `{other}`, expected `union` or `difference`"
            ))),
        }
    }
}

/// Reconstructs the handle region from the depth partitions of `device`.
///
/// Starting from `seed`, for each partition from the deepest to the shallowest,
/// the partition is removed from the handle and the ring of width `cavity_width`
/// around it is added back.
pub fn reconstruct_handle(
    device: &Cell<LayerId>,
    partitions: &[LayerId],
    cavity_width: f64,
    style: OffsetStyle,
    seed: Region,
) -> Result<HandleRegions> {
    let layers = device.extract(partitions.iter().copied());
    let mut handle = seed;
    let mut borders = Region::empty();

    for (depth, layer) in partitions.iter().enumerate().rev() {
        let partition = Region::from_polygons(layers.get(layer));
        handle = handle.difference(&partition);

        let border = offset(&partition, cavity_width, style)?.difference(&partition);
        handle = handle.union(&border);
        borders = borders.union(&border);
        debug!(
            depth,
            %layer,
            partition = partition.area(),
            border = border.area(),
            handle = handle.area(),
            "peeled handle partition"
        );
    }

    let release = borders.difference(&handle);
    info!(
        partitions = partitions.len(),
        handle = handle.area(),
        release = release.area(),
        "reconstructed handle"
    );
    Ok(HandleRegions { handle, release })
}

/// Combines the reconstructed handle with the shapes drawn on `remove_layer`.
pub fn handle_remove_layer(
    handle: &Region,
    device: &Cell<LayerId>,
    policy: HandlePolicy,
    remove_layer: LayerId,
) -> Region {
    let drawn = layer_region(device, remove_layer);
    match policy {
        HandlePolicy::Union => handle.union(&drawn),
        HandlePolicy::Difference => handle.difference(&drawn),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geometry::prelude::*;
    use test_log::test;

    use super::*;

    const PARTITIONS: [LayerId; 8] = [
        LayerId::new(2, 0),
        LayerId::new(2, 1),
        LayerId::new(2, 2),
        LayerId::new(2, 3),
        LayerId::new(2, 4),
        LayerId::new(2, 5),
        LayerId::new(2, 6),
        LayerId::new(2, 7),
    ];
    const REMOVE: LayerId = LayerId::new(3, 0);

    fn device(shapes: &[(usize, Rect)]) -> Cell<LayerId> {
        let mut cell = Cell::new("device");
        for (depth, rect) in shapes {
            cell.add_shape(PARTITIONS[*depth], *rect);
        }
        cell
    }

    #[test]
    fn single_partition_gives_cavity_ring() {
        let d = device(&[(0, Rect::from_sides(0., 0., 10., 10.))]);
        let regions =
            reconstruct_handle(&d, &PARTITIONS, 2., OffsetStyle::Square, Region::empty())
                .unwrap();
        assert_relative_eq!(regions.handle.area(), 14. * 14. - 100., epsilon = 1e-9);
        assert!(regions.release.area() < 1e-9);
        assert!(!regions.handle.contains(Point::new(5., 5.)));
        assert!(regions.handle.contains(Point::new(-1., 5.)));
    }

    #[test]
    fn shallower_partitions_reclaim_deeper_cavities() {
        let d = device(&[
            (7, Rect::from_sides(0., 0., 10., 10.)),
            (0, Rect::from_sides(10., 0., 20., 10.)),
        ]);
        let regions =
            reconstruct_handle(&d, &PARTITIONS, 2., OffsetStyle::Square, Region::empty())
                .unwrap();

        // The right border of the deep partition lies in the shallow one.
        assert!(!regions.handle.contains(Point::new(11., 5.)));
        assert!(regions.release.contains(Point::new(11., 5.)));
        assert_relative_eq!(regions.release.area(), 2. * 10., epsilon = 1e-9);
        // Both partitions stay protected.
        assert!(!regions.handle.contains(Point::new(5., 5.)));
        assert!(!regions.handle.contains(Point::new(15., 5.)));
    }

    #[test]
    fn zero_cavity_width_subtracts_all_partitions() {
        let seed = Region::from_rect(Rect::from_sides(-50., -50., 50., 50.));
        let shapes = (0..8)
            .map(|i| {
                let x = -40. + 10. * i as f64;
                (i, Rect::from_sides(x, -5., x + 5., 5.))
            })
            .collect::<Vec<_>>();
        let d = device(&shapes);
        let regions =
            reconstruct_handle(&d, &PARTITIONS, 0., OffsetStyle::default(), seed.clone())
                .unwrap();

        let all = Region::from_polygons(d.flatten().iter().flat_map(|(_, p)| p));
        assert_relative_eq!(
            regions.handle.area(),
            seed.difference(&all).area(),
            epsilon = 1e-6
        );
        assert_relative_eq!(regions.handle.area(), 10000. - 8. * 50., epsilon = 1e-6);
        assert!(regions.release.area() < 1e-9);
    }

    #[test]
    fn empty_partitions_leave_seed_unchanged() {
        let seed = Region::from_rect(Rect::from_sides(0., 0., 4., 4.));
        let d = Cell::new("empty");
        let regions =
            reconstruct_handle(&d, &PARTITIONS, 3., OffsetStyle::default(), seed)
                .unwrap();
        assert_relative_eq!(regions.handle.area(), 16., epsilon = 1e-9);
    }

    #[test]
    fn handle_policy_selects_operator() {
        let handle = Region::from_rect(Rect::from_sides(0., 0., 10., 10.));
        let mut d = Cell::new("device");
        d.add_shape(REMOVE, Rect::from_sides(5., 0., 15., 10.));

        let union = handle_remove_layer(&handle, &d, HandlePolicy::Union, REMOVE);
        assert_relative_eq!(union.area(), 150., epsilon = 1e-9);
        let difference = handle_remove_layer(&handle, &d, HandlePolicy::Difference, REMOVE);
        assert_relative_eq!(difference.area(), 50., epsilon = 1e-9);
    }

    #[test]
    fn handle_policy_parses() {
        assert_eq!("union".parse::<HandlePolicy>().unwrap(), HandlePolicy::Union);
        assert_eq!(
            "difference".parse::<HandlePolicy>().unwrap(),
            HandlePolicy::Difference
        );
        assert!("xor".parse::<HandlePolicy>().is_err());
        assert_eq!(HandlePolicy::default().to_string(), "union");
    }
}
