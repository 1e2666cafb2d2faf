//! The MEGA-PC rotary and z stage.
//!
//! Every sub-assembly is a cached [`CellFactory`] parameterized by the
//! [`Process`] it is drawn for. The top level [`Device`] instances the
//! sub-assemblies with rotations about the origin and mirrors, so most of its
//! geometry is shared.

use std::sync::Arc;

use geometry::prelude::*;
use layir::Cell;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::boolean::{boolean, BoolOp};
use crate::context::{BuildContext, CellFactory};
use crate::error::Result;
use crate::layers::{LayerId, MegaPcLayers};
use crate::primitives::{
    sagitta_offset_safe, Circle, PolygonShape, Rectangle, ReleaseSpec, Ring, Via,
};

pub const CHIP_SIZE: f64 = 8000.;
pub const CHIP_BORDER_WIDTH: f64 = 200.;

pub const ANGLE_RESOLUTION: f64 = 0.1;
pub const CAVITY_WIDTH: f64 = 40.;

pub const RELEASE_HOLE_RADIUS: f64 = 3.;
pub const RELEASE_DISTANCE: f64 = 6.;
pub const RELEASE_ANGLE_RESOLUTION: f64 = 18.;

pub const CENTER_CARRIAGE_RADIUS: f64 = 375.;
pub const CENTER_CARRIAGE_NITRIDE_RADIUS: f64 = 350.;
pub const CENTER_CARRIAGE_OXIDE_RADIUS: f64 = 300.;
pub const CENTER_CARRIAGE_CAVITY_RADIUS: f64 = 250.;

pub const RFLEX_INNER_RADIUS0: f64 = 400.;
pub const RFLEX_INNER_RADIUS1: f64 = 425.;
pub const RFLEX_ANCHOR_RADIUS0: f64 = 1600.;
pub const RFLEX_ANCHOR_RADIUS1: f64 = 1680.;
pub const RFLEX_BEAM_WIDTH: f64 = 3.5;
/// Fraction of each flexure beam that is stiffened, centered on the beam.
pub const RFLEX_BEAM_THICK_LENGTH: f64 = 0.8;
pub const RFLEX_BEAM_THICK_WIDTH: f64 = 40.;
pub const RFLEX_BEAM_ANGLES: [f64; 2] = [35., 60.];

pub const RDRIVE_INNER_RADIUS: f64 = 1700.;
pub const RDRIVE_MID_RADIUS: f64 = 1900.;
pub const RDRIVE_OUTER_RADIUS: f64 = 2150.;
pub const RDRIVE_TEETH_PITCH: f64 = 0.5;
pub const RDRIVE_TEETH_WIDTH: f64 = 7.;
pub const RDRIVE_TEETH_HEIGHT: f64 = 6.5;
pub const RDRIVE_TEETH_CLEARANCE: f64 = 2.5;
pub const RDRIVE_TEETH_PHASE: [f64; 3] = [-120., 0., 120.];
pub const RDRIVE_TEETH_COUNT: usize = 90;
pub const RDRIVE_ROTOR_SPAN: f64 = 160.;

pub const ZDRIVE_CLEARANCE: f64 = 8.;
pub const ZDRIVE_INNER_RADIUS: f64 = 2250.;
pub const ZDRIVE_OUTER_RADIUS: f64 = 2500.;
pub const ZDRIVE_RING_SPAN: f64 = 60.;
pub const ZDRIVE_ANCHOR_SIZE: f64 = 120.;

pub const ZCANT_WIDTH: f64 = 600.;
pub const ZCANT_LENGTH1: f64 = 600.;
pub const ZCANT_LENGTH2: f64 = 100.;
pub const ZCANT_BEAM1_WIDTH: f64 = 5.;
pub const ZCANT_BEAM1_LENGTH: f64 = 100.;
pub const ZCANT_BEAM2_WIDTH: f64 = 5.;
pub const ZCANT_BEAM2_LENGTH: f64 = 100.;
pub const ZCANT_STUB_WIDTH: f64 = 40.;
pub const ZCANT_STUB_INSET: f64 = 70.;
pub const ZCANT_STUB_ANCHOR_SIZE: f64 = 250.;

pub const ZACTUATOR_WIDTH: f64 = 2800.;
pub const ZACTUATOR_LENGTH: f64 = 700.;
pub const ZACTUATOR_LENGTH_STEP: usize = 5;
pub const ZACTUATOR_BEAM1_WIDTH: f64 = 4.;
pub const ZACTUATOR_BEAM1_LENGTH: f64 = 150.;
pub const ZACTUATOR_BEAM2_WIDTH: f64 = 4.;
pub const ZACTUATOR_BEAM2_LENGTH: f64 = 40.;

pub const ZR_CONNECTOR_SPANS: [(f64, f64); 3] = [(-30., -25.), (15., 20.), (60., 65.)];

pub const WIRE_BOND_SIZE: f64 = 300.;
pub const WIRE_BOND_OFFSET: f64 = 2200.;

pub const CHIP_BOND_RADIUS: f64 = 2600.;
pub const CHIP_BOND_MARKER_SIZE: f64 = 100.;

pub const CAP_CHIP_SIZE: f64 = 5000.;
pub const CAP_TRENCH_INNER_RADIUS: f64 = 450.;
pub const CAP_TRENCH_OUTER_RADIUS: f64 = 2600.;

pub const VIA_RADIUS_FIRST: f64 = 20.;
pub const VIA_RADIUS_LAST: f64 = 100.;

/// The smallest chip that leaves room for the corner pads.
pub fn min_chip_size(cavity_width: f64) -> f64 {
    2. * (CHIP_BORDER_WIDTH + 2. * WIRE_BOND_SIZE + WIRE_BOND_OFFSET + 2. * cavity_width)
}

/// Drawing parameters shared by every sub-assembly.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    /// The edge length of the square chip.
    pub chip_size: f64,
    /// Width of the handle cavity around each depth partition.
    pub cavity_width: f64,
    /// The angle resolution of curved edges, in degrees.
    pub angle_resolution: f64,
    /// Release holes drawn in wide device areas, if any.
    pub release: Option<ReleaseSpec>,
}

impl Process {
    /// The production process, with release holes on DEVICE_REMOVE.
    pub fn mega_pc(layers: &MegaPcLayers) -> Self {
        Self {
            chip_size: CHIP_SIZE,
            cavity_width: CAVITY_WIDTH,
            angle_resolution: ANGLE_RESOLUTION,
            release: Some(ReleaseSpec {
                hole_radius: RELEASE_HOLE_RADIUS,
                distance: RELEASE_DISTANCE,
                angle_resolution: RELEASE_ANGLE_RESOLUTION,
                layer: layers.device_remove,
            }),
        }
    }

    /// Coarse curves and no release holes, for previews.
    pub fn draft() -> Self {
        Self {
            chip_size: CHIP_SIZE,
            cavity_width: CAVITY_WIDTH,
            angle_resolution: 5.,
            release: None,
        }
    }

    fn ring(&self, layer: LayerId, radius_inner: f64, radius_outer: f64, angles: (f64, f64)) -> Ring {
        Ring::new(layer, radius_inner, radius_outer, angles, self.angle_resolution)
    }

    fn sagitta(&self, radius: f64) -> f64 {
        sagitta_offset_safe(radius, 0., self.angle_resolution)
    }

    fn via(&self, layers: &MegaPcLayers) -> Via {
        Via {
            radius_first: VIA_RADIUS_FIRST,
            radius_last: VIA_RADIUS_LAST,
            layers: vec![layers.vias_etch, layers.poly, layers.oxide, layers.nitride],
            angle_resolution: self.angle_resolution,
        }
    }
}

/// Instances the rectangle of `size` with its lower left corner at `at`.
fn place_rect(
    ctx: &mut BuildContext,
    cell: &mut Cell<LayerId>,
    layer: LayerId,
    size: (f64, f64),
    at: (f64, f64),
    release: Option<ReleaseSpec>,
) -> Result<()> {
    let rect = ctx.cell(Rectangle::new(layer, size).with_release(release))?;
    cell.add_instance(rect).translate(at.0, at.1);
    Ok(())
}

/// Instances the cell built by `factory` without any transformation.
fn place<F: CellFactory>(ctx: &mut BuildContext, cell: &mut Cell<LayerId>, factory: F) -> Result<()> {
    let child = ctx.cell(factory)?;
    cell.add_instance(child);
    Ok(())
}

/// The chip frame with its corner pads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChipBorder {
    pub process: Process,
}

impl CellFactory for ChipBorder {
    const NAME: &'static str = "chip_border";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let layers = *ctx.layers();
        let mut cell = Cell::new(Self::NAME);

        let half = 0.5 * self.process.chip_size;
        let w = CHIP_BORDER_WIDTH;
        for (layer, release) in [
            (layers.device, self.process.release),
            (layers.handle[7], None),
        ] {
            for y in [-half, half - w] {
                place_rect(ctx, &mut cell, layer, (self.process.chip_size, w), (-half, y), release)?;
            }
            for x in [-half, half - w] {
                place_rect(
                    ctx,
                    &mut cell,
                    layer,
                    (w, self.process.chip_size - 2. * w),
                    (x, -half + w),
                    release,
                )?;
            }
        }

        let pos = 2. * WIRE_BOND_SIZE + WIRE_BOND_OFFSET + self.process.cavity_width;
        let size = half - CHIP_BORDER_WIDTH - pos - self.process.cavity_width;
        let pad = ctx.cell(Rectangle::new(layers.device, (size, size)))?;
        for r in [0., 90., 180., 270.] {
            cell.add_instance(pad.clone()).translate(pos, pos).rotate(r);
        }

        Ok(cell)
    }
}

/// The central disk carried by the flexures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CenterCarriage {
    pub process: Process,
}

impl CellFactory for CenterCarriage {
    const NAME: &'static str = "center_carriage";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let mut cell = Cell::new(Self::NAME);
        for (layer, radius) in [
            (l.device, CENTER_CARRIAGE_RADIUS),
            (l.handle[0], CENTER_CARRIAGE_RADIUS),
            (l.nitride, CENTER_CARRIAGE_NITRIDE_RADIUS),
            (l.cap_nitride, CENTER_CARRIAGE_NITRIDE_RADIUS),
            (l.oxide, CENTER_CARRIAGE_OXIDE_RADIUS),
            (l.cap_oxide, CENTER_CARRIAGE_OXIDE_RADIUS),
            (l.handle_remove, CENTER_CARRIAGE_CAVITY_RADIUS),
            (l.cap_backside, CENTER_CARRIAGE_CAVITY_RADIUS),
        ] {
            place(
                ctx,
                &mut cell,
                Circle {
                    layer,
                    radius,
                    angle_resolution: self.process.angle_resolution,
                },
            )?;
        }
        place(
            ctx,
            &mut cell,
            self.process.ring(
                l.cap_trench_etch,
                CAP_TRENCH_INNER_RADIUS,
                CAP_TRENCH_OUTER_RADIUS,
                (0., 360.),
            ),
        )?;
        Ok(cell)
    }
}

/// One half of the rotary butterfly flexure, centered on the positive x axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RFlexureHalf {
    pub process: Process,
}

impl RFlexureHalf {
    /// Instances a radial beam from `r0` to `r1` at `angle` degrees.
    fn beam(
        &self,
        ctx: &mut BuildContext,
        cell: &mut Cell<LayerId>,
        layer: LayerId,
        (r0, r1): (f64, f64),
        angle: f64,
    ) -> Result<()> {
        let length = r1 - r0;
        let thin = ctx.cell(Rectangle::new(layer, (length, RFLEX_BEAM_WIDTH)))?;
        cell.add_instance(thin)
            .translate(r0, -0.5 * RFLEX_BEAM_WIDTH)
            .rotate(angle);

        let thick_width = RFLEX_BEAM_WIDTH + RFLEX_BEAM_THICK_WIDTH;
        let thick = ctx.cell(
            Rectangle::new(layer, (RFLEX_BEAM_THICK_LENGTH * length, thick_width))
                .with_release(self.process.release),
        )?;
        cell.add_instance(thick)
            .translate(
                r0 + 0.5 * (1. - RFLEX_BEAM_THICK_LENGTH) * length,
                -0.5 * thick_width,
            )
            .rotate(angle);
        Ok(())
    }
}

impl CellFactory for RFlexureHalf {
    const NAME: &'static str = "r_flexure_half";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let p = self.process;
        let mut cell = Cell::new(Self::NAME);

        let inner_angle = RFLEX_BEAM_ANGLES[1] + (0.5 * RFLEX_BEAM_WIDTH / RFLEX_INNER_RADIUS1).to_degrees();
        place(
            ctx,
            &mut cell,
            p.ring(
                l.device,
                RFLEX_INNER_RADIUS0,
                RFLEX_INNER_RADIUS1,
                (-inner_angle, inner_angle),
            )
            .with_release(p.release),
        )?;

        let span = (
            RFLEX_INNER_RADIUS1 - p.sagitta(RFLEX_INNER_RADIUS1),
            RFLEX_ANCHOR_RADIUS0 + p.sagitta(RFLEX_ANCHOR_RADIUS0),
        );
        for angle in RFLEX_BEAM_ANGLES {
            self.beam(ctx, &mut cell, l.device, span, angle)?;
            self.beam(ctx, &mut cell, l.device, span, -angle)?;
        }

        let anchor_angle = RFLEX_BEAM_ANGLES[0] + (0.5 * RFLEX_BEAM_WIDTH / RFLEX_ANCHOR_RADIUS0).to_degrees();
        for layer in [l.device, l.handle[1]] {
            place(
                ctx,
                &mut cell,
                p.ring(
                    layer,
                    RFLEX_ANCHOR_RADIUS0,
                    RFLEX_ANCHOR_RADIUS1,
                    (-anchor_angle, anchor_angle),
                ),
            )?;
        }

        Ok(cell)
    }
}

/// One half of the rotary comb drive, centered on the positive x axis.
///
/// The rotor carries a uniform tooth row. The stator carries three tooth
/// groups shifted by their electrical phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RDriveHalf {
    pub process: Process,
}

impl RDriveHalf {
    fn gear(&self, ctx: &mut BuildContext, cell: &mut Cell<LayerId>, layer: LayerId) -> Result<()> {
        let p = self.process;
        let rotor_tip = RDRIVE_MID_RADIUS - 0.5 * RDRIVE_TEETH_CLEARANCE;
        let stator_tip = RDRIVE_MID_RADIUS + 0.5 * RDRIVE_TEETH_CLEARANCE;
        let half_span = 0.5 * RDRIVE_ROTOR_SPAN;

        place(
            ctx,
            cell,
            p.ring(
                layer,
                RDRIVE_INNER_RADIUS,
                rotor_tip - RDRIVE_TEETH_HEIGHT,
                (-half_span, half_span),
            )
            .with_release(p.release),
        )?;
        place(
            ctx,
            cell,
            p.ring(
                layer,
                stator_tip + RDRIVE_TEETH_HEIGHT,
                RDRIVE_OUTER_RADIUS,
                (-90., 90.),
            )
            .with_release(p.release),
        )?;

        let root = p.sagitta(rotor_tip);
        let rotor_tooth = ctx.cell(
            Rectangle::new(layer, (RDRIVE_TEETH_HEIGHT + root, RDRIVE_TEETH_WIDTH)),
        )?;
        let rotor_teeth = (RDRIVE_ROTOR_SPAN / RDRIVE_TEETH_PITCH).floor() as usize;
        for i in 0..rotor_teeth {
            let angle = -half_span + RDRIVE_TEETH_PITCH * (i as f64 + 0.5);
            cell.add_instance(rotor_tooth.clone())
                .translate(rotor_tip - RDRIVE_TEETH_HEIGHT - root, -0.5 * RDRIVE_TEETH_WIDTH)
                .rotate(angle);
        }

        let root = p.sagitta(stator_tip + RDRIVE_TEETH_HEIGHT);
        let stator_tooth = ctx.cell(
            Rectangle::new(layer, (RDRIVE_TEETH_HEIGHT + root, RDRIVE_TEETH_WIDTH)),
        )?;
        let group_span = RDRIVE_TEETH_COUNT as f64 * RDRIVE_TEETH_PITCH;
        let group_pitch = RDRIVE_ROTOR_SPAN / RDRIVE_TEETH_PHASE.len() as f64;
        for (g, phase) in RDRIVE_TEETH_PHASE.iter().enumerate() {
            let center = group_pitch * (g as f64 - 0.5 * (RDRIVE_TEETH_PHASE.len() - 1) as f64);
            let start = center - 0.5 * group_span + phase / 360. * RDRIVE_TEETH_PITCH;
            for i in 0..RDRIVE_TEETH_COUNT {
                let angle = start + RDRIVE_TEETH_PITCH * (i as f64 + 0.5);
                cell.add_instance(stator_tooth.clone())
                    .translate(stator_tip, -0.5 * RDRIVE_TEETH_WIDTH)
                    .rotate(angle);
            }
        }
        Ok(())
    }
}

impl CellFactory for RDriveHalf {
    const NAME: &'static str = "r_drive_half";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let p = self.process;
        let mut cell = Cell::new(Self::NAME);

        self.gear(ctx, &mut cell, l.device)?;

        let beam_angle = 90. - RFLEX_BEAM_ANGLES[1];
        let connector0 = beam_angle + (0.5 * RFLEX_BEAM_WIDTH / RFLEX_ANCHOR_RADIUS1).to_degrees();
        place(
            ctx,
            &mut cell,
            p.ring(
                l.device,
                RFLEX_ANCHOR_RADIUS0,
                RDRIVE_INNER_RADIUS + p.sagitta(RDRIVE_INNER_RADIUS),
                (-connector0, connector0),
            )
            .with_release(p.release),
        )?;

        let connector1 = 0.5 * beam_angle;
        place(
            ctx,
            &mut cell,
            p.ring(
                l.device,
                CENTER_CARRIAGE_RADIUS - p.sagitta(CENTER_CARRIAGE_RADIUS),
                RFLEX_ANCHOR_RADIUS0 + p.sagitta(RFLEX_ANCHOR_RADIUS0),
                (-connector1, connector1),
            )
            .with_release(p.release),
        )?;

        let handle_mid = RDRIVE_MID_RADIUS + 0.5 * p.cavity_width;
        place(
            ctx,
            &mut cell,
            p.ring(l.handle[1], handle_mid, ZDRIVE_OUTER_RADIUS, (-90., 90.)),
        )?;

        let inner = RFLEX_ANCHOR_RADIUS1 - p.sagitta(RFLEX_ANCHOR_RADIUS1);
        let outer = handle_mid + p.sagitta(handle_mid);
        let half_span = 0.5 * RDRIVE_ROTOR_SPAN;
        for angles in [(-90., -half_span), (half_span, 90.)] {
            place(ctx, &mut cell, p.ring(l.handle[1], inner, outer, angles))?;
        }

        Ok(cell)
    }
}

/// One half of a z cantilever and its stepped actuator, above the x axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZCantHalf {
    pub process: Process,
}

impl CellFactory for ZCantHalf {
    const NAME: &'static str = "z_cant_half";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let release = self.process.release;
        let d = l.device;
        let clr = ZDRIVE_CLEARANCE;
        let mut c = Cell::new(Self::NAME);

        let x0 = ZCANT_BEAM1_WIDTH - 0.5 * ZDRIVE_ANCHOR_SIZE;
        let x1 = 0.5 * (ZCANT_LENGTH1 + ZCANT_LENGTH2);
        let x2 = x1 + clr + 0.5 * ZCANT_STUB_WIDTH - 0.5 * ZCANT_STUB_ANCHOR_SIZE;
        let x3 = x1 + 2. * clr + ZCANT_STUB_WIDTH;
        let x4 = ZCANT_LENGTH1;
        let x5 = x4 + ZCANT_LENGTH2;
        let x6 = x5 + 0.5 * ZDRIVE_ANCHOR_SIZE - ZACTUATOR_BEAM1_WIDTH;
        let x7 = x6 + ZACTUATOR_LENGTH - ZDRIVE_ANCHOR_SIZE - clr;
        let x8 = x6 + ZACTUATOR_LENGTH - 0.5 * ZDRIVE_ANCHOR_SIZE - 0.5 * ZACTUATOR_BEAM2_WIDTH;

        let y0 = 0.5 * clr;
        let y1 = 0.5 * ZCANT_WIDTH + ZCANT_BEAM2_LENGTH
            - 1.5 * ZDRIVE_ANCHOR_SIZE
            - ZACTUATOR_BEAM1_LENGTH;
        let y2 = 0.5 * ZCANT_WIDTH - ZCANT_STUB_INSET;
        let y3 = 0.5 * ZCANT_WIDTH;
        let y4 = y3 + clr;
        let y5 = y3 + ZCANT_BEAM1_LENGTH;
        let y6 = ZDRIVE_ANCHOR_SIZE;
        let y7 = y6 + ZACTUATOR_BEAM2_LENGTH;
        let y8 = 0.5 * ZACTUATOR_WIDTH;
        let y9 = 0.5 * ZACTUATOR_WIDTH + ZACTUATOR_BEAM2_LENGTH;

        // Cantilever body.
        place_rect(ctx, &mut c, d, (x1, y3 - y0), (0., y0), None)?;
        place_rect(ctx, &mut c, d, (x3 - x1, y2 - y1 - clr), (x1, y1 + clr), None)?;
        place_rect(ctx, &mut c, d, (x4 - x3, y3 - y1 - clr), (x3, y1 + clr), None)?;
        place_rect(ctx, &mut c, d, (x5 - x1 - clr, y1), (x1 + clr, 0.), None)?;

        // Stub and its bonded anchor.
        place_rect(
            ctx,
            &mut c,
            d,
            (ZCANT_STUB_WIDTH, ZCANT_STUB_INSET),
            (x1 + clr, y2 + clr),
            release,
        )?;
        place_rect(
            ctx,
            &mut c,
            d,
            (ZCANT_STUB_ANCHOR_SIZE, ZCANT_STUB_ANCHOR_SIZE),
            (x2, y4),
            None,
        )?;
        let via = ctx.cell(self.process.via(&l))?;
        c.add_instance(via).translate(
            x2 + 0.5 * ZCANT_STUB_ANCHOR_SIZE,
            y4 + 0.5 * ZCANT_STUB_ANCHOR_SIZE,
        );

        // Cantilever suspension.
        place_rect(ctx, &mut c, d, (ZCANT_BEAM1_WIDTH, ZCANT_BEAM1_LENGTH), (0., y3), None)?;
        place_rect(
            ctx,
            &mut c,
            d,
            (ZCANT_BEAM2_WIDTH, ZCANT_BEAM2_LENGTH),
            (x4 - ZCANT_BEAM2_WIDTH, y3),
            None,
        )?;
        place_rect(
            ctx,
            &mut c,
            d,
            (0.5 * ZDRIVE_ANCHOR_SIZE, ZDRIVE_ANCHOR_SIZE),
            (x0, y5),
            None,
        )?;
        place_rect(
            ctx,
            &mut c,
            d,
            (ZDRIVE_ANCHOR_SIZE, WIRE_BOND_OFFSET - y5),
            (x4 - ZCANT_BEAM2_WIDTH, y5),
            None,
        )?;

        // Actuator.
        place_rect(
            ctx,
            &mut c,
            d,
            (ZACTUATOR_BEAM1_WIDTH, ZACTUATOR_BEAM1_LENGTH),
            (x5 - ZACTUATOR_BEAM1_WIDTH, y1),
            None,
        )?;
        place_rect(
            ctx,
            &mut c,
            d,
            (0.5 * ZDRIVE_ANCHOR_SIZE, ZDRIVE_ANCHOR_SIZE),
            (x5 - ZACTUATOR_BEAM1_WIDTH, y1 + ZACTUATOR_BEAM1_LENGTH),
            release,
        )?;

        let steps = ZACTUATOR_LENGTH_STEP;
        let x_size = (x7 - x6) / steps as f64;
        for k in 0..steps {
            let t = k as f64 / (steps - 1) as f64;
            let x = x6 + t * (x7 - x_size - x6);
            let y = y5 + t * (y8 - y5);
            place_rect(ctx, &mut c, d, (x_size, y), (x, 0.), release)?;
        }

        place_rect(
            ctx,
            &mut c,
            d,
            (ZDRIVE_ANCHOR_SIZE, ZDRIVE_ANCHOR_SIZE),
            (x7 + clr, 0.),
            None,
        )?;
        place_rect(
            ctx,
            &mut c,
            d,
            (ZACTUATOR_BEAM2_WIDTH, ZACTUATOR_BEAM2_LENGTH),
            (x8, y6),
            None,
        )?;
        place_rect(
            ctx,
            &mut c,
            d,
            (ZDRIVE_ANCHOR_SIZE + clr, y8 - y7),
            (x7, y7),
            release,
        )?;
        place_rect(
            ctx,
            &mut c,
            d,
            (ZACTUATOR_BEAM2_WIDTH, ZACTUATOR_BEAM2_LENGTH),
            (x8, y8),
            None,
        )?;
        place_rect(
            ctx,
            &mut c,
            d,
            (ZDRIVE_ANCHOR_SIZE, WIRE_BOND_OFFSET - y9),
            (x7 + clr, y9),
            None,
        )?;

        // Wire bond pads.
        let pad = (WIRE_BOND_SIZE, WIRE_BOND_SIZE);
        place_rect(
            ctx,
            &mut c,
            d,
            pad,
            (
                x4 - ZCANT_BEAM2_WIDTH - 0.5 * WIRE_BOND_SIZE + 0.5 * ZDRIVE_ANCHOR_SIZE,
                WIRE_BOND_OFFSET,
            ),
            None,
        )?;
        place_rect(
            ctx,
            &mut c,
            d,
            pad,
            (
                x7 + clr - WIRE_BOND_SIZE + ZDRIVE_ANCHOR_SIZE,
                WIRE_BOND_OFFSET,
            ),
            None,
        )?;

        Ok(c)
    }
}

/// The outer ring segment and one cantilever half of a z drive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZDriveHalf {
    pub process: Process,
}

impl CellFactory for ZDriveHalf {
    const NAME: &'static str = "z_drive_half";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let mut cell = Cell::new(Self::NAME);

        let ring_angle = ((0.5 * ZCANT_WIDTH + ZCANT_BEAM1_LENGTH) / ZDRIVE_INNER_RADIUS).to_degrees();
        place(
            ctx,
            &mut cell,
            self.process.ring(
                l.device,
                ZDRIVE_INNER_RADIUS,
                ZDRIVE_OUTER_RADIUS,
                (ring_angle, 0.5 * ZDRIVE_RING_SPAN),
            ),
        )?;

        let cant = ctx.cell(ZCantHalf {
            process: self.process,
        })?;
        cell.add_instance(cant).translate(ZDRIVE_INNER_RADIUS, 0.);

        Ok(cell)
    }
}

/// A complete z drive, symmetric about the x axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZDrive {
    pub process: Process,
}

impl CellFactory for ZDrive {
    const NAME: &'static str = "z_drive";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let mut cell = Cell::new(Self::NAME);

        let half = ctx.cell(ZDriveHalf {
            process: self.process,
        })?;
        cell.add_instance(half.clone());
        cell.add_instance(half).mirror(Mirror::Y(0.));

        place_rect(
            ctx,
            &mut cell,
            l.handle[0],
            (ZCANT_LENGTH1 + ZCANT_LENGTH2, ZCANT_WIDTH),
            (ZDRIVE_INNER_RADIUS, -0.5 * ZCANT_WIDTH),
            None,
        )?;

        Ok(cell)
    }
}

/// The spokes between the rotary drive and one side of the z drive ring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZrConnectorHalf {
    pub process: Process,
}

impl CellFactory for ZrConnectorHalf {
    const NAME: &'static str = "zr_connector_half";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let p = self.process;
        let mut cell = Cell::new(Self::NAME);
        for span in ZR_CONNECTOR_SPANS {
            place(
                ctx,
                &mut cell,
                p.ring(
                    l.device,
                    RDRIVE_OUTER_RADIUS - p.sagitta(RDRIVE_OUTER_RADIUS),
                    ZDRIVE_INNER_RADIUS + p.sagitta(ZDRIVE_INNER_RADIUS),
                    span,
                ),
            )?;
        }
        Ok(cell)
    }
}

/// Both connector halves plus the electrical feedthrough to the rotor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZrConnector {
    pub process: Process,
}

impl CellFactory for ZrConnector {
    const NAME: &'static str = "zr_connector";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let p = self.process;
        let mut cell = Cell::new(Self::NAME);

        let half = ctx.cell(ZrConnectorHalf { process: p })?;
        cell.add_instance(half.clone());
        cell.add_instance(half).mirror(Mirror::X(0.));

        let drive_outer = RDRIVE_OUTER_RADIUS - p.sagitta(RDRIVE_OUTER_RADIUS);
        let z_inner = ZDRIVE_INNER_RADIUS + p.sagitta(ZDRIVE_INNER_RADIUS);
        for ring in [
            p.ring(
                l.device,
                RFLEX_ANCHOR_RADIUS1 - p.sagitta(RFLEX_ANCHOR_RADIUS1),
                RDRIVE_OUTER_RADIUS,
                (268., 272.),
            ),
            p.ring(
                l.device,
                0.5 * (RDRIVE_MID_RADIUS + RDRIVE_OUTER_RADIUS),
                RDRIVE_OUTER_RADIUS,
                (250., 268.),
            ),
            p.ring(l.device, drive_outer, z_inner, (250., 255.)),
        ] {
            place(ctx, &mut cell, ring)?;
        }

        let via = ctx.cell(p.via(&l))?;
        let via_radius = 0.5 * (ZDRIVE_INNER_RADIUS + ZDRIVE_OUTER_RADIUS);
        for angle in [285., 295.] {
            let at = Point::polar(via_radius, angle);
            cell.add_instance(via.clone()).translate(at.x, at.y);
        }

        Ok(cell)
    }
}

/// The released lock between two z drives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZReleaseLock {
    pub process: Process,
}

impl CellFactory for ZReleaseLock {
    const NAME: &'static str = "z_release_lock";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let p = self.process;
        let mut cell = Cell::new(Self::NAME);

        let angle = 0.5 * ZDRIVE_RING_SPAN + (p.cavity_width / ZDRIVE_INNER_RADIUS).to_degrees();
        let outer = CHIP_BOND_RADIUS - p.cavity_width;
        let middle = 0.5 * (ZDRIVE_INNER_RADIUS + outer);
        let angles = (angle, 90. - angle);
        place(ctx, &mut cell, p.ring(l.device, ZDRIVE_INNER_RADIUS, middle, angles))?;
        place(
            ctx,
            &mut cell,
            p.ring(l.device, middle, outer, angles).with_release(p.release),
        )?;

        Ok(cell)
    }
}

/// A quarter of the cap bonding frame, with alignment markers at its corner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChipBondPad {
    pub process: Process,
}

impl CellFactory for ChipBondPad {
    const NAME: &'static str = "CHIP_BOND_PAD";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let half = 0.5 * CAP_CHIP_SIZE;
        let square = ctx.cell(Rectangle::new(l.device, (half, half)))?;
        let disk = ctx.cell(Circle {
            layer: l.device,
            radius: CHIP_BOND_RADIUS,
            angle_resolution: self.process.angle_resolution,
        })?;
        let pad = boolean(&square, &disk, BoolOp::Difference, l.device, l.device, l.device);

        let mut cell = Cell::new(Self::NAME);
        cell.add_instance(Arc::new(pad));

        let marker = ctx.cell(Rectangle::new(
            l.device,
            (CHIP_BOND_MARKER_SIZE, 0.1 * CHIP_BOND_MARKER_SIZE),
        ))?;
        cell.add_instance(marker.clone()).translate(half, half);
        cell.add_instance(marker)
            .rotate(90.)
            .translate(half + 0.1 * CHIP_BOND_MARKER_SIZE, half);

        Ok(cell)
    }
}

/// A quarter of the cap backside frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapBorderQuarter {
    pub process: Process,
}

impl CapBorderQuarter {
    /// The L-shaped outline grown by `grow` on its outer edges.
    fn outline(grow: f64) -> Vec<Point> {
        let mid = RDRIVE_MID_RADIUS + grow;
        let arm = ZCANT_WIDTH - grow;
        let edge = 0.5 * CAP_CHIP_SIZE + grow;
        [
            (0., 0.),
            (0., mid),
            (arm, mid),
            (arm, edge),
            (edge, edge),
            (edge, arm),
            (mid, arm),
            (mid, 0.),
        ]
        .into_iter()
        .map(Point::from)
        .collect()
    }
}

impl CellFactory for CapBorderQuarter {
    const NAME: &'static str = "CAP_BORDER_QUARTER";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let outer = ctx.cell(PolygonShape {
            layer: l.cap_backside,
            points: Self::outline(self.process.cavity_width),
        })?;
        let inner = ctx.cell(PolygonShape {
            layer: l.cap_backside,
            points: Self::outline(0.),
        })?;
        let frame = boolean(
            &outer,
            &inner,
            BoolOp::Difference,
            l.cap_backside,
            l.cap_backside,
            l.cap_backside,
        );

        let mut cell = Cell::new(Self::NAME);
        cell.add_instance(Arc::new(frame));
        place(
            ctx,
            &mut cell,
            self.process.ring(
                l.cap_oxide,
                1.1 * CAP_TRENCH_OUTER_RADIUS,
                0.5 * self.process.chip_size,
                (15., 75.),
            ),
        )?;
        Ok(cell)
    }
}

/// The complete MEGA-PC device with its version labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub version: String,
    pub hash: String,
    pub process: Process,
}

impl CellFactory for Device {
    const NAME: &'static str = "device";

    fn build(&self, ctx: &mut BuildContext) -> Result<Cell<LayerId>> {
        let l = *ctx.layers();
        let p = self.process;
        let mut cell = Cell::new(Self::NAME);

        place(ctx, &mut cell, ChipBorder { process: p })?;
        place(ctx, &mut cell, CenterCarriage { process: p })?;

        let flexure = ctx.cell(RFlexureHalf { process: p })?;
        cell.add_instance(flexure.clone()).rotate(90.);
        cell.add_instance(flexure)
            .rotate(90.)
            .mirror(Mirror::Y(0.));

        let drive = ctx.cell(RDriveHalf { process: p })?;
        cell.add_instance(drive.clone());
        cell.add_instance(drive).mirror(Mirror::X(0.));

        let z_drive = ctx.cell(ZDrive { process: p })?;
        let chip_bond = ctx.cell(ChipBondPad { process: p })?;
        let lock = ctx.cell(ZReleaseLock { process: p })?;
        let cap = ctx.cell(CapBorderQuarter { process: p })?;
        for r in [0., 90., 180., 270.] {
            for child in [&z_drive, &chip_bond, &lock, &cap] {
                cell.add_instance(child.clone()).rotate(r);
            }
        }

        place(ctx, &mut cell, ZrConnector { process: p })?;

        let y = -0.5 * p.chip_size + CHIP_BORDER_WIDTH + 0.5 * WIRE_BOND_SIZE;
        cell.add_text(l.label, format!("MEGA-PC {}", self.version), Point::new(0., y));
        if !self.hash.is_empty() {
            cell.add_text(l.label, self.hash.clone(), Point::new(0., y - 0.5 * CHIP_BORDER_WIDTH));
        }

        info!(version = %self.version, instances = cell.instances().count(), "built device");
        Ok(cell)
    }
}
