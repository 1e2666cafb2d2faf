//! The build context and cached cell factories.

use std::any::Any;
use std::sync::Arc;

use arcstr::ArcStr;
use cache::mem::generate_with_state;
use cache::{CacheState, NamespaceCache};
use layir::Cell;
use serde::Serialize;
use tracing::debug;

use crate::error::{MaskError, Result};
use crate::layers::{LayerId, LayerRegistry, MegaPcLayers};

/// A parameterized cell generator.
///
/// The parameters themselves are the cache key: two calls with equal
/// parameters return the same [`Arc`].
pub trait CellFactory: Serialize + Any {
    /// The factory name, used as the cache namespace and the default cell name.
    ///
    /// Must be a valid identifier.
    const NAME: &'static str;

    /// Builds the cell.
    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>>;
}

/// Owns the cell cache and the layer registry for one build.
#[derive(Debug)]
pub struct BuildContext {
    cache: NamespaceCache,
    registry: LayerRegistry,
    layers: MegaPcLayers,
}

impl CacheState for BuildContext {
    fn cache(&mut self) -> &mut NamespaceCache {
        &mut self.cache
    }
}

impl BuildContext {
    /// Creates a context for `registry`, which must contain every MEGA-PC layer.
    pub fn new(registry: LayerRegistry) -> Result<Self> {
        let layers = MegaPcLayers::new(&registry)?;
        Ok(Self {
            cache: NamespaceCache::new(),
            registry,
            layers,
        })
    }

    /// Creates a context with the MEGA-PC layer registry.
    pub fn mega_pc() -> Result<Self> {
        Self::new(LayerRegistry::mega_pc()?)
    }

    #[inline]
    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    #[inline]
    pub fn layers(&self) -> &MegaPcLayers {
        &self.layers
    }

    /// The number of cached cells.
    pub fn cached_cells(&self) -> usize {
        self.cache.len()
    }

    /// Drops every cached cell.
    pub fn reset(&mut self) {
        debug!("resetting build context");
        self.cache.clear();
    }

    /// Returns the cell built by `params`, building it if necessary.
    ///
    /// If the factory fails, the error is wrapped in [`MaskError::Factory`] and
    /// nothing is cached.
    pub fn cell<F: CellFactory>(&mut self, params: F) -> Result<Arc<Cell<LayerId>>> {
        generate_with_state(self, F::NAME, params, |params, ctx| {
            params.build(ctx).map_err(|source| {
                tracing::error!(cell = F::NAME, error = %source, "cell factory failed");
                MaskError::Factory {
                    cell: ArcStr::from(F::NAME),
                    source: Arc::new(source),
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell as Counter;
    use std::sync::Arc;

    use geometry::prelude::*;
    use serde::Serialize;
    use test_log::test;

    use super::*;

    thread_local! {
        static BUILDS: Counter<usize> = const { Counter::new(0) };
    }

    fn builds() -> usize {
        BUILDS.with(|b| b.get())
    }

    #[derive(Serialize)]
    struct Square {
        size: f64,
    }

    impl CellFactory for Square {
        const NAME: &'static str = "square";

        fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
            BUILDS.with(|b| b.set(b.get() + 1));
            if self.size <= 0. {
                return Err(MaskError::Config("size must be positive".into()));
            }
            let mut cell = Cell::new(Self::NAME);
            cell.add_shape(ctx.layers().device, Rect::from_sides(0., 0., self.size, self.size));
            Ok(cell)
        }
    }

    #[derive(Serialize)]
    struct Pair {
        size: f64,
    }

    impl CellFactory for Pair {
        const NAME: &'static str = "pair";

        fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
            let square = ctx.cell(Square { size: self.size })?;
            let mut cell = Cell::new(Self::NAME);
            cell.add_instance(square.clone());
            cell.add_instance(square).translate(2. * self.size, 0.);
            Ok(cell)
        }
    }

    #[test]
    fn equal_parameters_share_cells() {
        let mut ctx = BuildContext::mega_pc().unwrap();
        let before = builds();
        let a = ctx.cell(Square { size: 2.5 }).unwrap();
        let b = ctx.cell(Square { size: 2.5 }).unwrap();
        let c = ctx.cell(Square { size: 3. }).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(builds() - before, 2);
        assert_eq!(ctx.cached_cells(), 2);
    }

    #[test]
    fn nested_factories_reuse_cached_children() {
        let mut ctx = BuildContext::mega_pc().unwrap();
        let square = ctx.cell(Square { size: 1. }).unwrap();
        let pair = ctx.cell(Pair { size: 1. }).unwrap();
        assert!(pair
            .instances()
            .all(|inst| Arc::ptr_eq(inst.child(), &square)));
        assert_eq!(ctx.cached_cells(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let mut ctx = BuildContext::mega_pc().unwrap();
        let before = builds();
        let err = ctx.cell(Pair { size: -1. }).unwrap_err();
        match err {
            MaskError::Factory { cell, source } => {
                assert_eq!(cell.as_str(), "pair");
                assert!(matches!(&*source, MaskError::Factory { cell, .. } if cell.as_str() == "square"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.cached_cells(), 0);

        assert!(ctx.cell(Square { size: -1. }).is_err());
        assert_eq!(builds() - before, 2);
    }

    #[test]
    fn reset_clears_the_cache() {
        let mut ctx = BuildContext::mega_pc().unwrap();
        let a = ctx.cell(Square { size: 1. }).unwrap();
        ctx.reset();
        assert_eq!(ctx.cached_cells(), 0);
        let b = ctx.cell(Square { size: 1. }).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }
}
