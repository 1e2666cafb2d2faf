//! Mask layer identifiers and the closed layer registry.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{MaskError, Result};

/// A GDS layer number and datatype pair.
#[derive(
    Default, Debug, Copy, Clone, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct LayerId {
    /// The GDS layer number.
    pub number: u16,
    /// The GDS datatype.
    pub datatype: u16,
}

impl LayerId {
    /// Creates a new [`LayerId`].
    pub const fn new(number: u16, datatype: u16) -> Self {
        Self { number, datatype }
    }
}

impl From<(u16, u16)> for LayerId {
    fn from((number, datatype): (u16, u16)) -> Self {
        Self::new(number, datatype)
    }
}

impl Display for LayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.number, self.datatype)
    }
}

/// The number of graduated handle depth partitions.
pub const HANDLE_PARTITIONS: usize = 8;

/// The MEGA-PC layer table.
pub const MEGA_PC_LAYERS: [(&str, LayerId); 21] = [
    ("DEVICE", LayerId::new(1, 0)),
    ("DEVICE_REMOVE", LayerId::new(1, 1)),
    ("HANDLE_P0", LayerId::new(2, 0)),
    ("HANDLE_P1", LayerId::new(2, 1)),
    ("HANDLE_P2", LayerId::new(2, 2)),
    ("HANDLE_P3", LayerId::new(2, 3)),
    ("HANDLE_P4", LayerId::new(2, 4)),
    ("HANDLE_P5", LayerId::new(2, 5)),
    ("HANDLE_P6", LayerId::new(2, 6)),
    ("HANDLE_P7", LayerId::new(2, 7)),
    ("HANDLE_REMOVE", LayerId::new(3, 0)),
    ("VIAS_ETCH", LayerId::new(10, 0)),
    ("POLY", LayerId::new(11, 0)),
    ("OXIDE", LayerId::new(12, 0)),
    ("NITRIDE", LayerId::new(13, 0)),
    ("CAP_OXIDE", LayerId::new(20, 0)),
    ("CAP_NITRIDE", LayerId::new(21, 0)),
    ("CAP_TRENCH_ETCH", LayerId::new(22, 0)),
    ("CAP_BACKSIDE", LayerId::new(23, 0)),
    ("DUMMY", LayerId::new(99, 0)),
    ("LABEL", LayerId::new(100, 0)),
];

/// A closed registry mapping layer names to identifiers.
///
/// Names and identifiers are both unique. The registry cannot change once built.
#[derive(Debug, Clone, Default)]
pub struct LayerRegistry {
    by_name: IndexMap<ArcStr, LayerId>,
    by_id: HashMap<LayerId, ArcStr>,
}

impl LayerRegistry {
    /// Builds a registry from `(name, id)` pairs.
    ///
    /// Fails with [`MaskError::DuplicateLayer`] if a name or an identifier repeats.
    pub fn new<N: Into<ArcStr>>(entries: impl IntoIterator<Item = (N, LayerId)>) -> Result<Self> {
        let mut registry = Self::default();
        for (name, id) in entries {
            let name = name.into();
            if registry.by_name.contains_key(&name) || registry.by_id.contains_key(&id) {
                tracing::event!(Level::ERROR, "duplicate layer `{}` {}", name, id);
                return Err(MaskError::DuplicateLayer { name, id });
            }
            registry.by_id.insert(id, name.clone());
            registry.by_name.insert(name, id);
        }
        Ok(registry)
    }

    /// The registry of the MEGA-PC process.
    pub fn mega_pc() -> Result<Self> {
        Self::new(MEGA_PC_LAYERS)
    }

    /// Looks up a layer by name.
    pub fn get(&self, name: &str) -> Result<LayerId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| MaskError::UnknownLayer(name.into()))
    }

    /// The name of a registered layer.
    pub fn name_of(&self, id: LayerId) -> Option<&ArcStr> {
        self.by_id.get(&id)
    }

    /// Iterates over `(name, id)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, LayerId)> {
        self.by_name.iter().map(|(name, id)| (name, *id))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Typed access to the MEGA-PC layers of a registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct MegaPcLayers {
    pub device: LayerId,
    pub device_remove: LayerId,
    /// Handle depth partitions, shallowest first.
    pub handle: [LayerId; HANDLE_PARTITIONS],
    pub handle_remove: LayerId,
    pub vias_etch: LayerId,
    pub poly: LayerId,
    pub oxide: LayerId,
    pub nitride: LayerId,
    pub cap_oxide: LayerId,
    pub cap_nitride: LayerId,
    pub cap_trench_etch: LayerId,
    pub cap_backside: LayerId,
    pub dummy: LayerId,
    pub label: LayerId,
}

impl MegaPcLayers {
    /// Resolves every MEGA-PC layer in `registry`.
    ///
    /// Fails with [`MaskError::UnknownLayer`] on the first missing name.
    pub fn new(registry: &LayerRegistry) -> Result<Self> {
        let mut handle = [LayerId::default(); HANDLE_PARTITIONS];
        for (i, layer) in handle.iter_mut().enumerate() {
            *layer = registry.get(&format!("HANDLE_P{i}"))?;
        }
        Ok(Self {
            device: registry.get("DEVICE")?,
            device_remove: registry.get("DEVICE_REMOVE")?,
            handle,
            handle_remove: registry.get("HANDLE_REMOVE")?,
            vias_etch: registry.get("VIAS_ETCH")?,
            poly: registry.get("POLY")?,
            oxide: registry.get("OXIDE")?,
            nitride: registry.get("NITRIDE")?,
            cap_oxide: registry.get("CAP_OXIDE")?,
            cap_nitride: registry.get("CAP_NITRIDE")?,
            cap_trench_etch: registry.get("CAP_TRENCH_ETCH")?,
            cap_backside: registry.get("CAP_BACKSIDE")?,
            dummy: registry.get("DUMMY")?,
            label: registry.get("LABEL")?,
        })
    }

    /// Layers etched where drawn, clipped to the chip.
    pub fn positive(&self) -> [LayerId; 3] {
        [self.vias_etch, self.cap_trench_etch, self.cap_backside]
    }

    /// Layers etched where not drawn, inverted within the chip.
    pub fn negative(&self) -> [LayerId; 5] {
        [
            self.poly,
            self.oxide,
            self.nitride,
            self.cap_oxide,
            self.cap_nitride,
        ]
    }

    /// Layers exposed through reticle images, in reticle order.
    pub fn reticle_images(&self) -> [LayerId; 8] {
        [
            self.vias_etch,
            self.poly,
            self.oxide,
            self.nitride,
            self.device_remove,
            self.cap_oxide,
            self.cap_nitride,
            self.cap_trench_etch,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mega_pc_registry_is_valid() {
        let registry = LayerRegistry::mega_pc().unwrap();
        assert_eq!(registry.len(), MEGA_PC_LAYERS.len());
        assert_eq!(registry.get("HANDLE_P5").unwrap(), LayerId::new(2, 5));
        assert_eq!(
            registry.name_of(LayerId::new(99, 0)).map(|n| n.as_str()),
            Some("DUMMY")
        );

        let layers = MegaPcLayers::new(&registry).unwrap();
        assert_eq!(layers.handle[7], LayerId::new(2, 7));
        assert_eq!(layers.device_remove, LayerId::new(1, 1));
    }

    #[test]
    fn unknown_layers_are_rejected() {
        let registry = LayerRegistry::mega_pc().unwrap();
        assert!(matches!(
            registry.get("HANDLE_P8"),
            Err(MaskError::UnknownLayer(name)) if name.as_str() == "HANDLE_P8"
        ));
        assert!(registry.name_of(LayerId::new(2, 8)).is_none());

        let partial = LayerRegistry::new([("DEVICE", LayerId::new(1, 0))]).unwrap();
        assert!(matches!(
            MegaPcLayers::new(&partial),
            Err(MaskError::UnknownLayer(_))
        ));
    }

    #[test]
    fn duplicates_are_rejected() {
        let by_name = LayerRegistry::new([("A", LayerId::new(1, 0)), ("A", LayerId::new(2, 0))]);
        assert!(matches!(by_name, Err(MaskError::DuplicateLayer { .. })));

        let by_id = LayerRegistry::new([("A", LayerId::new(1, 0)), ("B", LayerId::new(1, 0))]);
        assert!(matches!(by_id, Err(MaskError::DuplicateLayer { id, .. }) if id == LayerId::new(1, 0)));
    }

    #[test]
    fn layer_ids_display_as_pairs() {
        assert_eq!(LayerId::new(2, 3).to_string(), "(2, 3)");
    }
}
