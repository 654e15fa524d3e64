//!
//! # Unit Tests
//!
//! Cross-module checks: hierarchy queries, occurrence transforms, and
//! flattening.
//!

// Local imports
use crate::cell::Cell;
use crate::entity::Pad;
use crate::error::DbResult;
use crate::geom::{BoundBox, Orient, Point, Transform};
use crate::layer::Technology;
use crate::occurrence::{path_transform, Occurrence, Path};
use crate::query;
use crate::utils::Ptr;

fn pad_tech() -> DbResult<(Technology, crate::layer::LayerKey)> {
    let mut tech = Technology::new("unit");
    let m1 = tech.add_basic("METAL1")?;
    Ok((tech, m1))
}

/// A two-level hierarchy: a leaf with one pad, instantiated twice
fn two_level() -> DbResult<(Technology, Ptr<Cell>, crate::entity::EntityId)> {
    let (tech, m1) = pad_tech()?;
    let mut leaf = Cell::new("leaf")?;
    let n = leaf.add_net("n")?;
    leaf.add_component(
        n,
        m1,
        Pad {
            bbox: BoundBox::new(0, 0, 10, 10),
        },
    )?;
    let leaf = Ptr::new(leaf);

    let mut top = Cell::new("top")?;
    let tn = top.add_net("t")?;
    top.add_component(
        tn,
        m1,
        Pad {
            bbox: BoundBox::new(0, 50, 10, 60),
        },
    )?;
    let i0 = top.add_instance("i0", leaf.clone(), Transform::shift(Point::new(100, 0)))?;
    top.add_instance("i1", leaf.clone(), Transform::shift(Point::new(200, 0)))?;
    Ok((tech, Ptr::new(top), i0))
}

/// Occurrences are equal iff both path and entity are equal
#[test]
fn occurrence_equality() {
    use crate::entity::EntityId;
    let a = Occurrence::new(Path(vec![EntityId(1)]), EntityId(9));
    let b = Occurrence::new(Path(vec![EntityId(1)]), EntityId(9));
    let c = Occurrence::new(Path(vec![EntityId(2)]), EntityId(9));
    let d = Occurrence::flat(EntityId(9));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, d);
    assert!(d.path.is_empty());
}

/// Transforms compose along the instance path
#[test]
fn path_transforms_compose() -> DbResult<()> {
    let (_tech, top, i0) = two_level()?;
    let guard = top.read()?;
    let t = path_transform(&guard, &Path(vec![i0]))?;
    assert_eq!(t.apply(Point::new(3, 4)), Point::new(103, 4));
    // Empty path is the identity
    let t = path_transform(&guard, &Path::empty())?;
    assert_eq!(t, Transform::identity());
    Ok(())
}

/// Deep queries visit every level, with transformed boxes
#[test]
fn occurrences_under_area() -> DbResult<()> {
    let (_tech, top, _) = two_level()?;
    let guard = top.read()?;
    let everything = query::occurrences_under(&guard, &BoundBox::new(0, 0, 300, 100))?;
    // One top pad plus one pad per instance
    assert_eq!(everything.len(), 3);
    assert_eq!(
        everything.iter().filter(|o| o.path.is_empty()).count(),
        1
    );
    // A window over the first instance only
    let window = query::occurrences_under(&guard, &BoundBox::new(100, 0, 110, 10))?;
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].path.0.len(), 1);
    Ok(())
}

/// Layer-mask filtering drops non-intersecting components
#[test]
fn components_under_mask() -> DbResult<()> {
    let (mut tech, m1) = pad_tech()?;
    let m2 = tech.add_basic("METAL2")?;
    let mut cell = Cell::new("both")?;
    let n = cell.add_net("n")?;
    cell.add_component(
        n,
        m1,
        Pad {
            bbox: BoundBox::new(0, 0, 10, 10),
        },
    )?;
    cell.add_component(
        n,
        m2,
        Pad {
            bbox: BoundBox::new(0, 0, 10, 10),
        },
    )?;
    let area = BoundBox::new(0, 0, 100, 100);
    let m2_mask = tech.layers.get(m2).unwrap().mask;
    let hits = query::components_under(&cell, &area, &tech, m2_mask)?;
    assert_eq!(hits.len(), 1);
    Ok(())
}

/// Flattening materialises deep components onto path-named nets
#[test]
fn flatten_materialises_deep_nets() -> DbResult<()> {
    let (_tech, top, _) = two_level()?;
    let mut guard = top.write()?;
    query::flatten(&mut guard)?;

    // The flattened copies land on "<instance>.<net>" nets
    let flat = guard.net_named("i0.n").expect("flattened net");
    assert_eq!(flat.components.len(), 1);
    let comp = guard.components.get(flat.components.iter().next().unwrap());
    assert_eq!(
        comp.unwrap().bounding_box(),
        BoundBox::new(100, 0, 110, 10)
    );
    assert!(guard.net_named("i1.n").is_some());
    Ok(())
}

/// Rotation composes with reflection in the dihedral group
#[test]
fn orientation_group() {
    let r1 = Orient {
        quarters: 1,
        mirrored: false,
    };
    let mx = Orient {
        quarters: 0,
        mirrored: true,
    };
    let pt = Point::new(5, 2);
    // Mirror-then-rotate versus the composed orientation
    let composed = r1.compose(&mx);
    assert_eq!(composed.apply(pt), r1.apply(mx.apply(pt)));
    // Four quarter turns are the identity
    let mut o = Orient::identity();
    for _ in 0..4 {
        o = r1.compose(&o);
    }
    assert_eq!(o, Orient::identity());
}
