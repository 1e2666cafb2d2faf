use std::sync::Arc;

use approx::assert_relative_eq;
use geometry::prelude::*;
use layir::Cell;
use masks::boolean::{boolean, layer_region, BoolOp, Region};
use masks::handle::reconstruct_handle;
use masks::offset::{offset, OffsetStyle};
use masks::{BuildContext, LayerId};
use test_log::test;

const X: LayerId = LayerId::new(11, 0);
const Y: LayerId = LayerId::new(12, 0);

fn square(name: &str, layer: LayerId, rect: Rect) -> Cell<LayerId> {
    let mut cell = Cell::new(name);
    cell.add_shape(layer, rect);
    cell
}

#[test]
fn overlapping_squares() {
    let a = square("a", X, Rect::from_sides(0., 0., 10., 10.));
    let b = square("b", X, Rect::from_sides(5., 5., 15., 15.));

    for (op, area) in [
        (BoolOp::Union, 175.),
        (BoolOp::Intersection, 25.),
        (BoolOp::Difference, 75.),
    ] {
        let out = boolean(&a, &b, op, Y, X, X);
        assert_eq!(out.name(), &format!("a_{op}_b"));
        assert!(out.flatten().get(&X).is_empty());
        assert_relative_eq!(layer_region(&out, Y).area(), area, epsilon = 1e-9);
    }
}

#[test]
fn single_partition_handle() {
    let ctx = BuildContext::mega_pc().unwrap();
    let partitions = ctx.layers().handle;
    let rect = Rect::from_sides(-30., -20., 30., 20.);
    let device = square("device", partitions[0], rect);
    let style = OffsetStyle::Round { segments: 32 };

    let regions = reconstruct_handle(&device, &partitions, 5., style, Region::empty()).unwrap();

    let footprint = Region::from_rect(rect);
    let border = offset(&footprint, 5., style).unwrap().difference(&footprint);
    assert_relative_eq!(
        regions.handle.difference(&border).area(),
        0.,
        epsilon = 1e-6
    );
    assert_relative_eq!(
        border.difference(&regions.handle).area(),
        0.,
        epsilon = 1e-6
    );
    assert!(!regions.handle.contains(Point::zero()));
    assert!(regions.handle.contains(Point::new(32.5, 0.)));
    assert_relative_eq!(regions.release.area(), 0., epsilon = 1e-6);
}

#[test]
fn extract_returns_transformed_requested_layers() {
    let mut leaf = Cell::new("leaf");
    leaf.add_shape(X, Rect::from_sides(0., 0., 2., 1.));
    leaf.add_shape(Y, Rect::from_sides(5., 5., 6., 6.));
    let leaf = Arc::new(leaf);

    let mut top = Cell::new("top");
    top.add_instance(leaf)
        .rotate(90.)
        .translate(10., 0.);

    let extracted = top.extract([X]);
    assert_eq!(extracted.num_layers(), 1);
    assert!(!extracted.contains_layer(&Y));
    let bbox = extracted.get(&X).bbox().unwrap();
    assert_relative_eq!(bbox.left(), 9., epsilon = 1e-9);
    assert_relative_eq!(bbox.right(), 10., epsilon = 1e-9);
    assert_relative_eq!(bbox.bot(), 0., epsilon = 1e-9);
    assert_relative_eq!(bbox.top(), 2., epsilon = 1e-9);
}
