//! The mask build pipeline.
//!
//! A build turns the drawn device into fabrication masks:
//!
//! 1. DEVICE_REMOVE is the chip area not covered by DEVICE, plus anything drawn
//!    on DEVICE_REMOVE.
//! 2. HANDLE_REMOVE is reconstructed from the handle depth partitions.
//! 3. Positive layers are clipped to the chip. Negative layers are inverted
//!    within the chip.
//! 4. The result is flattened and stepped onto reticles.
//!
//! Every output is converted in memory before the first file is written, so a
//! failing build leaves the output directory untouched.

use std::path::PathBuf;
use std::sync::Arc;

use gds21::GdsLibrary;
use geometry::prelude::*;
use layir::Cell;
use tracing::{debug, info};

use crate::boolean::{boolean, BoolOp, Region};
use crate::config::BuildConfig;
use crate::context::BuildContext;
use crate::device::Device;
use crate::error::Result;
use crate::gds::{export_cell, save};
use crate::handle::{handle_remove_layer, reconstruct_handle};
use crate::layers::LayerId;
use crate::reticle::{mirrored, reticle, write_placements, Reticles};

/// The products of a build, before anything is written.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// The device as drawn.
    pub source: Arc<Cell<LayerId>>,
    /// The flat mask layers.
    pub build: Cell<LayerId>,
    pub reticles: Reticles,
}

/// Derives the mask layers of `device`.
///
/// The returned cell is flat.
pub fn build_masks(
    ctx: &BuildContext,
    device: &Cell<LayerId>,
    config: &BuildConfig,
) -> Result<Cell<LayerId>> {
    let l = *ctx.layers();
    let mut chip = Cell::new("chip_area");
    chip.add_shape(
        l.dummy,
        Rect::from_center_dims(Point::zero(), config.chip_size, config.chip_size),
    );

    let mut masks = Cell::new("masks");

    if config.no_merge {
        debug!("skipping DEVICE_REMOVE merge");
        masks.add_layer_set(device.extract([l.device, l.device_remove]));
    } else {
        let open = boolean(&chip, device, BoolOp::Difference, l.dummy, l.dummy, l.device);
        let remove = boolean(
            &open,
            device,
            BoolOp::Union,
            l.device_remove,
            l.dummy,
            l.device_remove,
        );
        masks.add_instance(Arc::new(remove));
    }
    info!("derived DEVICE_REMOVE");

    let regions = reconstruct_handle(
        device,
        &l.handle,
        config.cavity_width,
        config.offset_style(),
        Region::empty(),
    )?;
    let handle = handle_remove_layer(&regions.handle, device, config.handle_policy, l.handle_remove);
    info!(policy = %config.handle_policy, area = handle.area(), "derived HANDLE_REMOVE");
    masks.add_instance(Arc::new(handle.to_cell("handle_remove", l.handle_remove)));

    for layer in l.positive() {
        let clipped = boolean(&chip, device, BoolOp::Intersection, layer, l.dummy, layer);
        masks.add_instance(Arc::new(clipped));
    }
    for layer in l.negative() {
        let inverted = boolean(&chip, device, BoolOp::Difference, layer, l.dummy, layer);
        masks.add_instance(Arc::new(inverted));
    }
    info!(
        positive = l.positive().len(),
        negative = l.negative().len(),
        "derived etch layers"
    );

    Ok(masks.flattened(format!("{}_BUILD", config.prefix())))
}

/// Builds the device described by `config` and derives its masks and reticles.
///
/// `label` is written on every reticle next to the build identifier.
pub fn compose(ctx: &mut BuildContext, config: &BuildConfig, label: &str) -> Result<BuildOutput> {
    config.validate()?;
    ctx.reset();

    let process = config.process(ctx.layers());
    let source = ctx.cell(Device {
        version: config.version.clone(),
        hash: config.hash.clone(),
        process,
    })?;
    info!(cached = ctx.cached_cells(), "built source");

    let build = build_masks(ctx, &source, config)?;
    let l = ctx.layers();
    let reticles = reticle(
        &build,
        (config.chip_size, config.chip_size),
        &l.reticle_images(),
        l.label,
        &config.reticle_id(),
        label,
    )?;

    Ok(BuildOutput {
        source,
        build,
        reticles,
    })
}

/// Writes the GDS files and the placements file of `output`.
///
/// Returns the written paths.
pub fn write_outputs(
    ctx: &BuildContext,
    output: &BuildOutput,
    config: &BuildConfig,
) -> Result<Vec<PathBuf>> {
    let prefix = config.prefix();
    let mut libraries: Vec<(PathBuf, GdsLibrary)> = vec![
        (
            config.output("SOURCE.gds"),
            export_cell(&output.source, &prefix)?,
        ),
        (config.output("BUILD.gds"), export_cell(&output.build, &prefix)?),
    ];
    for (i, field) in output.reticles.fields.iter().enumerate() {
        libraries.push((
            config.output(&format!("BUILD_ASML_{i}.gds")),
            export_cell(field, &prefix)?,
        ));
        if config.mirror {
            libraries.push((
                config.output(&format!("BUILD_ASML_{i}_MIRROR.gds")),
                export_cell(&mirrored(field), &prefix)?,
            ));
        }
    }
    let mut placements = Vec::new();
    write_placements(&mut placements, &output.reticles.placements, ctx.registry())?;

    let mut written = Vec::with_capacity(libraries.len() + 1);
    for (path, lib) in libraries {
        save(&lib, &path)?;
        info!(path = %path.display(), "wrote mask");
        written.push(path);
    }
    let path = config.output("BUILD_ASML_PLACEMENTS.txt");
    std::fs::write(&path, placements)?;
    info!(path = %path.display(), "wrote reticle placements");
    written.push(path);
    Ok(written)
}

/// Runs a complete build and writes its outputs.
pub fn run(ctx: &mut BuildContext, config: &BuildConfig, label: &str) -> Result<Vec<PathBuf>> {
    let output = compose(ctx, config, label)?;
    write_outputs(ctx, &output, config)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use test_log::test;

    use super::*;
    use crate::boolean::layer_region;
    use crate::handle::HandlePolicy;
    use crate::layers::MegaPcLayers;

    fn config() -> BuildConfig {
        BuildConfig {
            version: "test".into(),
            chip_size: 100.,
            cavity_width: 5.,
            ..Default::default()
        }
    }

    fn device(l: &MegaPcLayers) -> Cell<LayerId> {
        let mut cell = Cell::new("device");
        cell.add_shape(l.device, Rect::from_sides(-10., -10., 10., 10.));
        cell.add_shape(l.device_remove, Rect::from_sides(0., -5., 20., 5.));
        cell.add_shape(l.handle[0], Rect::from_sides(-10., -10., 10., 10.));
        cell.add_shape(l.handle_remove, Rect::from_sides(30., 30., 40., 40.));
        cell.add_shape(l.vias_etch, Rect::from_sides(40., 40., 60., 60.));
        cell.add_shape(l.poly, Rect::from_sides(-20., -20., 0., 0.));
        cell
    }

    #[test]
    fn device_remove_covers_the_open_chip_area() {
        let ctx = BuildContext::mega_pc().unwrap();
        let l = *ctx.layers();
        let build = build_masks(&ctx, &device(&l), &config()).unwrap();

        assert!(!build.has_instances());
        assert_relative_eq!(
            layer_region(&build, l.device_remove).area(),
            10_000. - 400. + 100.,
            epsilon = 1e-6
        );
        assert!(build.flatten().get(&l.dummy).is_empty());
    }

    #[test]
    fn etch_layers_are_clipped_or_inverted() {
        let ctx = BuildContext::mega_pc().unwrap();
        let l = *ctx.layers();
        let build = build_masks(&ctx, &device(&l), &config()).unwrap();

        assert_relative_eq!(layer_region(&build, l.vias_etch).area(), 100., epsilon = 1e-6);
        assert_relative_eq!(
            layer_region(&build, l.poly).area(),
            10_000. - 400.,
            epsilon = 1e-6
        );
        // Undrawn negative layers open the whole chip.
        assert_relative_eq!(layer_region(&build, l.oxide).area(), 10_000., epsilon = 1e-6);
        assert!(layer_region(&build, l.cap_backside).is_empty());
    }

    #[test]
    fn handle_remove_follows_the_policy() {
        let ctx = BuildContext::mega_pc().unwrap();
        let l = *ctx.layers();
        let device = device(&l);

        let union = build_masks(&ctx, &device, &config()).unwrap();
        let border = layer_region(&union, l.handle_remove).area() - 100.;
        assert_relative_eq!(border, 400. + 78.5, epsilon = 0.5);

        let difference = build_masks(
            &ctx,
            &device,
            &BuildConfig {
                handle_policy: HandlePolicy::Difference,
                ..config()
            },
        )
        .unwrap();
        assert_relative_eq!(
            layer_region(&difference, l.handle_remove).area(),
            border,
            epsilon = 1e-6
        );
    }

    #[test]
    fn no_merge_keeps_raw_layers() {
        let ctx = BuildContext::mega_pc().unwrap();
        let l = *ctx.layers();
        let build = build_masks(
            &ctx,
            &device(&l),
            &BuildConfig {
                no_merge: true,
                ..config()
            },
        )
        .unwrap();
        let flat = build.flatten();
        assert_eq!(flat.get(&l.device).len(), 1);
        assert_eq!(flat.get(&l.device_remove).len(), 1);
    }

    #[test]
    fn outputs_carry_the_build_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BuildContext::mega_pc().unwrap();
        let l = *ctx.layers();
        let config = BuildConfig {
            out_dir: dir.path().to_path_buf(),
            mirror: true,
            ..config()
        };
        let source = Arc::new(device(&l));
        let build = build_masks(&ctx, &source, &config).unwrap();
        let reticles = reticle(
            &build,
            (100., 100.),
            &l.reticle_images(),
            l.label,
            "test",
            "today",
        )
        .unwrap();
        let output = BuildOutput {
            source,
            build,
            reticles,
        };

        let written = write_outputs(&ctx, &output, &config).unwrap();
        let names = written
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "mega_pc_test_SOURCE.gds",
                "mega_pc_test_BUILD.gds",
                "mega_pc_test_BUILD_ASML_0.gds",
                "mega_pc_test_BUILD_ASML_0_MIRROR.gds",
                "mega_pc_test_BUILD_ASML_1.gds",
                "mega_pc_test_BUILD_ASML_1_MIRROR.gds",
                "mega_pc_test_BUILD_ASML_PLACEMENTS.txt",
            ]
        );
        assert!(written.iter().all(|p| p.is_file()));

        let placements = std::fs::read_to_string(dir.path().join(names[6])).unwrap();
        assert_eq!(placements.lines().count(), 8);
        assert!(placements.starts_with("VIAS_ETCH: R 0, CX -550.00, CY 550.00\n"));
    }

    #[test]
    fn export_failures_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BuildContext::mega_pc().unwrap();
        let l = *ctx.layers();
        let config = BuildConfig {
            out_dir: dir.path().join("out"),
            ..config()
        };
        let source = Arc::new(device(&l));
        let mut build = build_masks(&ctx, &source, &config).unwrap();
        let reticles = reticle(
            &build,
            (100., 100.),
            &l.reticle_images(),
            l.label,
            "MPC-test",
            "today",
        )
        .unwrap();
        // SOURCE converts cleanly before BUILD fails.
        build.add_shape(l.poly, Rect::from_sides(0., 0., 1e7, 1.));
        let output = BuildOutput {
            source,
            build,
            reticles,
        };

        assert!(matches!(
            write_outputs(&ctx, &output, &config),
            Err(crate::error::MaskError::CoordinateOutOfRange(_))
        ));
        assert!(!config.out_dir.exists());
    }

    #[test]
    fn failed_builds_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = BuildContext::mega_pc().unwrap();
        let config = BuildConfig {
            out_dir: dir.path().join("out"),
            ..Default::default()
        };
        assert!(run(&mut ctx, &config, "today").is_err());
        assert!(!config.out_dir.exists());
    }
}
