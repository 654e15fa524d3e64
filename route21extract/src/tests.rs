//!
//! # Unit Tests
//!
//! End-to-end extraction scenarios over a three-layer unit technology:
//! two metals joined by a via layer.
//!

// Local imports
use crate::engine::Extractor;
use crate::error::ExtractResult;
use route21db::entity::{Contact, Pad};
use route21db::utils::Ptr;
use route21db::{
    BoundBox, Cell, DbUnits, EntityId, LayerKey, NetType, Point, Technology, Transform,
};

/// Three-layer unit technology: METAL1, CUT12, METAL2 plus the VIA12
/// symbolic layer, all with zero enclosures for exact-box scenarios.
struct UnitTech {
    tech: Technology,
    metal1: LayerKey,
    cut12: LayerKey,
    metal2: LayerKey,
    via12: LayerKey,
}
fn unit_tech() -> ExtractResult<UnitTech> {
    let mut tech = Technology::new("unit");
    let metal1 = tech.add_basic("METAL1")?;
    let cut12 = tech.add_basic("CUT12")?;
    let metal2 = tech.add_basic("METAL2")?;
    let via12 = tech.add_via("VIA12", metal1, cut12, metal2, DbUnits(2), DbUnits(0))?;
    Ok(UnitTech {
        tech,
        metal1,
        cut12,
        metal2,
        via12,
    })
}
fn extractor(t: &UnitTech) -> Extractor {
    Extractor::new(vec![t.metal1, t.cut12, t.metal2])
}
/// Shorthand: a rectangle component on `layer`, owned by `net`
fn rect(
    cell: &mut Cell,
    net: EntityId,
    layer: LayerKey,
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
) -> ExtractResult<EntityId> {
    Ok(cell.add_component(
        net,
        layer,
        Pad {
            bbox: BoundBox::new(x0, y0, x1, y1),
        },
    )?)
}

/// Two touching rectangles in an L arrangement fuse into one equipotential
#[test]
fn ell_shape_single_layer() -> ExtractResult<()> {
    let t = unit_tech()?;
    let mut cell = Cell::new("ell")?;
    let net = cell.add_net("n")?;
    let r1 = rect(&mut cell, net, t.metal1, 0, 0, 100, 20)?;
    let r2 = rect(&mut cell, net, t.metal1, 80, 0, 100, 60)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.equipotentials.len(), 1);
    let equi = &report.equipotentials[0];
    assert_eq!(equi.components.len(), 2);
    let members: Vec<EntityId> = equi.components.iter().map(|o| o.entity).collect();
    assert!(members.contains(&r1) && members.contains(&r2));
    assert_eq!(equi.bbox, BoundBox::new(0, 0, 100, 60));
    assert_eq!(equi.ntype, NetType::Logical);
    assert!(report.is_clean());
    Ok(())
}

/// Two disjoint wires stay apart: two equipotentials, no shorts, no opens
#[test]
fn disjoint_wires_stay_apart() -> ExtractResult<()> {
    let t = unit_tech()?;
    let mut cell = Cell::new("disjoint")?;
    let n1 = cell.add_net("n1")?;
    let n2 = cell.add_net("n2")?;
    rect(&mut cell, n1, t.metal1, 0, 0, 100, 20)?;
    rect(&mut cell, n2, t.metal1, 200, 0, 300, 20)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.equipotentials.len(), 2);
    assert!(report.is_clean());
    let (a, b) = (&report.equipotentials[0], &report.equipotentials[1]);
    assert!(a.bbox.intersection(&b.bbox).is_empty());
    Ok(())
}

/// A via stitches metal1 to metal2 through the shared cut layer
#[test]
fn cross_layer_via() -> ExtractResult<()> {
    let t = unit_tech()?;
    let mut cell = Cell::new("via")?;
    let net = cell.add_net("n")?;
    let r1 = rect(&mut cell, net, t.metal1, 0, 0, 100, 20)?;
    let v1 = cell.add_component(
        net,
        t.via12,
        Contact {
            at: Point::new(50, 10),
            width: DbUnits(20),
            height: DbUnits(20),
        },
    )?;
    let r2 = rect(&mut cell, net, t.metal2, 40, 0, 60, 80)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.equipotentials.len(), 1);
    let members: Vec<EntityId> = report.equipotentials[0]
        .components
        .iter()
        .map(|o| o.entity)
        .collect();
    for id in [r1, v1, r2] {
        assert!(members.contains(&id));
    }
    Ok(())
}

/// Metal1 and metal2 shapes without a via do *not* connect, even stacked
#[test]
fn stacked_metals_without_via_stay_apart() -> ExtractResult<()> {
    let t = unit_tech()?;
    let mut cell = Cell::new("stack")?;
    let n1 = cell.add_net("n1")?;
    let n2 = cell.add_net("n2")?;
    rect(&mut cell, n1, t.metal1, 0, 0, 100, 20)?;
    rect(&mut cell, n2, t.metal2, 0, 0, 100, 20)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.equipotentials.len(), 2);
    Ok(())
}

/// Two overlapping external nets short; the report names the lex-smaller
/// and records witnessed evidence
#[test]
fn shorted_external_nets() -> ExtractResult<()> {
    let t = unit_tech()?;
    let mut cell = Cell::new("shorted")?;
    let a = cell.add_net("A")?;
    let b = cell.add_net("B")?;
    cell.net_mut(a).unwrap().external = true;
    cell.net_mut(b).unwrap().external = true;
    rect(&mut cell, a, t.metal1, 0, 0, 100, 20)?;
    rect(&mut cell, b, t.metal1, 50, 0, 150, 20)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.equipotentials.len(), 1);
    let equi = &report.equipotentials[0];
    assert_eq!(equi.name, "A");
    assert_eq!(equi.nets.len(), 2);
    assert_eq!(equi.nets[&a], (1, 0));
    assert_eq!(equi.nets[&b], (1, 0));

    assert_eq!(report.short_circuits.len(), 1);
    let short = &report.short_circuits[0];
    assert_eq!((short.net_a, short.net_b), (a.min(b), a.max(b)));
    assert!(short.witness.intersects(&BoundBox::new(0, 0, 100, 20)));
    assert!(short.witness.intersects(&BoundBox::new(50, 0, 150, 20)));
    Ok(())
}

/// A net split across two islands is reported open
#[test]
fn open_net() -> ExtractResult<()> {
    let t = unit_tech()?;
    let mut cell = Cell::new("open")?;
    let c = cell.add_net("C")?;
    rect(&mut cell, c, t.metal1, 0, 0, 10, 10)?;
    rect(&mut cell, c, t.metal1, 100, 100, 110, 110)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.open_nets, vec![c]);
    assert_eq!(report.per_net[&c].len(), 2);
    Ok(())
}

/// Power fused with ground classifies Power, raises HasFused, and shorts
#[test]
fn supply_conflict_sets_fused() -> ExtractResult<()> {
    let t = unit_tech()?;
    let mut cell = Cell::new("fused")?;
    let vdd = cell.add_net("vdd")?;
    let vss = cell.add_net("vss")?;
    {
        let net = cell.net_mut(vdd).unwrap();
        net.ntype = NetType::Power;
        net.external = true;
    }
    {
        let net = cell.net_mut(vss).unwrap();
        net.ntype = NetType::Ground;
        net.external = true;
    }
    rect(&mut cell, vdd, t.metal1, 0, 0, 60, 10)?;
    rect(&mut cell, vss, t.metal1, 40, 0, 100, 10)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.equipotentials.len(), 1);
    let equi = &report.equipotentials[0];
    assert_eq!(equi.ntype, NetType::Power);
    assert!(equi.flags.contains(crate::EquiFlags::HAS_FUSED));
    assert_eq!(report.short_circuits.len(), 1);
    Ok(())
}

/// Shorts are symmetric and transitive: two external nets joined only
/// through an internal bridge still land in one equipotential, and both
/// directions of the membership test agree.
#[test]
fn transitive_short_through_internal_bridge() -> ExtractResult<()> {
    let t = unit_tech()?;
    let mut cell = Cell::new("bridge")?;
    let a = cell.add_net("A")?;
    let b = cell.add_net("B")?;
    let m = cell.add_net("mid")?;
    cell.net_mut(a).unwrap().external = true;
    cell.net_mut(b).unwrap().external = true;
    rect(&mut cell, a, t.metal1, 0, 0, 100, 20)?;
    rect(&mut cell, m, t.metal1, 90, 0, 210, 20)?;
    rect(&mut cell, b, t.metal1, 200, 0, 300, 20)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.equipotentials.len(), 1);
    let equi = &report.equipotentials[0];
    // Both external nets appear together in the surviving equipotential
    assert!(equi.nets.contains_key(&a) && equi.nets.contains_key(&b));
    // And the short list records exactly the (A, B) pair, once
    let pairs: Vec<_> = report
        .short_circuits
        .iter()
        .map(|s| (s.net_a, s.net_b))
        .collect();
    assert_eq!(pairs, vec![(a.min(b), a.max(b))]);
    // The un-bridged counterpart stays short-free
    let mut apart = Cell::new("apart")?;
    let a2 = apart.add_net("A")?;
    let b2 = apart.add_net("B")?;
    apart.net_mut(a2).unwrap().external = true;
    apart.net_mut(b2).unwrap().external = true;
    rect(&mut apart, a2, t.metal1, 0, 0, 100, 20)?;
    rect(&mut apart, b2, t.metal1, 200, 0, 300, 20)?;
    let report = extractor(&t).extract(&t.tech, &mut apart)?;
    assert_eq!(report.equipotentials.len(), 2);
    assert!(report.short_circuits.is_empty());
    Ok(())
}

/// Extraction is a partition: every component lands in exactly one equi
#[test]
fn partition_property() -> ExtractResult<()> {
    let t = unit_tech()?;
    let mut cell = Cell::new("partition")?;
    let mut all = Vec::new();
    for i in 0..6i64 {
        let net = cell.add_net(format!("n{}", i))?;
        // Chains of two touching rects, chain-to-chain disjoint
        all.push(rect(&mut cell, net, t.metal1, i * 100, 0, i * 100 + 40, 10)?);
        all.push(rect(&mut cell, net, t.metal1, i * 100 + 40, 0, i * 100 + 80, 10)?);
    }
    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.equipotentials.len(), 6);

    let mut seen = std::collections::BTreeSet::new();
    for equi in &report.equipotentials {
        for occ in &equi.components {
            // Pairwise-empty intersections: no component twice
            assert!(seen.insert(occ.entity));
        }
    }
    for id in all {
        assert!(seen.contains(&id));
    }
    Ok(())
}

/// Identical inputs give identical outputs, id for id
#[test]
fn determinism() -> ExtractResult<()> {
    fn build_and_extract() -> ExtractResult<(Vec<u32>, Vec<String>, Vec<usize>)> {
        let t = unit_tech()?;
        let mut cell = Cell::new("det")?;
        let a = cell.add_net("A")?;
        let b = cell.add_net("B")?;
        cell.net_mut(a).unwrap().external = true;
        cell.net_mut(b).unwrap().external = true;
        rect(&mut cell, a, t.metal1, 0, 0, 100, 20)?;
        rect(&mut cell, a, t.metal1, 80, 0, 100, 60)?;
        rect(&mut cell, b, t.metal1, 200, 0, 300, 20)?;
        rect(&mut cell, b, t.metal2, 0, 0, 300, 20)?;
        let report = extractor(&t).extract(&t.tech, &mut cell)?;
        Ok((
            report.equipotentials.iter().map(|e| e.id).collect(),
            report.equipotentials.iter().map(|e| e.name.clone()).collect(),
            report
                .equipotentials
                .iter()
                .map(|e| e.components.len())
                .collect(),
        ))
    }
    assert_eq!(build_and_extract()?, build_and_extract()?);
    Ok(())
}

/// A rectilinear outline connects through every slab it decomposes into
#[test]
fn rectilinear_decomposition_connects() -> ExtractResult<()> {
    use route21db::entity::Rectilinear;
    let t = unit_tech()?;
    let mut cell = Cell::new("recti")?;
    let net = cell.add_net("n")?;
    // A U shape, plus a bar closing its two arms at the top
    cell.add_component(
        net,
        t.metal1,
        Rectilinear {
            points: vec![
                Point::new(0, 0),
                Point::new(100, 0),
                Point::new(100, 50),
                Point::new(80, 50),
                Point::new(80, 10),
                Point::new(20, 10),
                Point::new(20, 50),
                Point::new(0, 50),
            ],
        },
    )?;
    let bar = rect(&mut cell, net, t.metal1, 0, 50, 100, 60)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    assert_eq!(report.equipotentials.len(), 1);
    assert!(report.is_clean());
    let members: Vec<EntityId> = report.equipotentials[0]
        .components
        .iter()
        .map(|o| o.entity)
        .collect();
    assert!(members.contains(&bar));
    Ok(())
}

/// A non-Manhattan outline is skipped with a diagnostic; the run completes
#[test]
fn diagonal_shape_is_skipped() -> ExtractResult<()> {
    use route21db::entity::Rectilinear;
    let t = unit_tech()?;
    let mut cell = Cell::new("diag")?;
    let net = cell.add_net("n")?;
    cell.add_component(
        net,
        t.metal1,
        Rectilinear {
            points: vec![
                Point::new(0, 0),
                Point::new(10, 10),
                Point::new(10, 20),
                Point::new(0, 20),
            ],
        },
    )?;
    rect(&mut cell, net, t.metal1, 200, 0, 300, 20)?;

    let report = extractor(&t).extract(&t.tech, &mut cell)?;
    // The good rectangle still extracts
    assert_eq!(report.equipotentials.len(), 1);
    assert_eq!(report.equipotentials[0].components.len(), 1);
    Ok(())
}

/// Child cells extract first; the parent merges against their
/// equipotential representatives
#[test]
fn hierarchical_child_equi() -> ExtractResult<()> {
    let t = unit_tech()?;

    let mut child = Cell::new("leaf")?;
    let cn = child.add_net("cn")?;
    rect(&mut child, cn, t.metal1, 0, 0, 50, 10)?;
    let child = Ptr::new(child);

    let mut top = Cell::new("top")?;
    let tn = top.add_net("tn")?;
    // The instance lands its rect at (100..150, 0..10)
    top.add_instance(
        "i0",
        child.clone(),
        Transform::shift(Point::new(100, 0)),
    )?;
    // A top-level wire overlapping the instance's shape
    rect(&mut top, tn, t.metal1, 140, 0, 200, 10)?;
    let top = Ptr::new(top);

    let mut extractor = extractor(&t);
    let report = extractor.extract_hierarchy(&t.tech, &top)?;
    assert_eq!(report.equipotentials.len(), 1);
    let equi = &report.equipotentials[0];
    // One top component, one child-equi reference
    assert_eq!(equi.components.len(), 1);
    assert_eq!(equi.childs.len(), 1);
    assert!(!equi.childs.iter().next().unwrap().path.is_empty());
    Ok(())
}
