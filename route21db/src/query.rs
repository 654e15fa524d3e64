//!
//! # Hierarchy Queries
//!
//! The facade the extractor consumes: enumerate the occurrences of
//! components under an area, optionally filtered by layer mask, walking
//! the instance tree with composed transforms. Iteration order is fixed by
//! the entity-id ordering of the underlying maps.
//!

// Local Imports
use crate::cell::Cell;
use crate::entity::{Component, Footprint};
use crate::error::{DbError, DbResult};
use crate::geom::{BoundBox, Transform};
use crate::layer::{LayerMask, Technology};
use crate::occurrence::{Occurrence, Path};

/// Enumerate every component occurrence under `area`, at any depth.
pub fn occurrences_under(cell: &Cell, area: &BoundBox) -> DbResult<Vec<Occurrence>> {
    let mut out = Vec::new();
    walk(cell, &Path::empty(), &Transform::identity(), area, None, &mut out)?;
    Ok(out)
}

/// Enumerate every component occurrence under `area` whose layer mask
/// intersects `mask`, at any depth.
pub fn components_under(
    cell: &Cell,
    area: &BoundBox,
    tech: &Technology,
    mask: LayerMask,
) -> DbResult<Vec<Occurrence>> {
    let mut out = Vec::new();
    walk(
        cell,
        &Path::empty(),
        &Transform::identity(),
        area,
        Some((tech, mask)),
        &mut out,
    )?;
    Ok(out)
}

fn walk(
    cell: &Cell,
    path: &Path,
    transform: &Transform,
    area: &BoundBox,
    filter: Option<(&Technology, LayerMask)>,
    out: &mut Vec<Occurrence>,
) -> DbResult<()> {
    for (id, comp) in &cell.components {
        if let Some((tech, mask)) = filter {
            let layer = tech
                .layers
                .get(comp.layer)
                .ok_or_else(|| DbError::msg("Component on unknown layer"))?;
            if !layer.mask.intersects(&mask) {
                continue;
            }
        }
        let bb = transform.apply_box(&comp.bounding_box());
        if bb.intersects(area) {
            out.push(Occurrence::new(path.clone(), *id));
        }
    }
    for (iid, inst) in &cell.instances {
        let guard = inst.cell.read()?;
        walk(
            &guard,
            &path.descend(*iid),
            &transform.compose(&inst.transform),
            area,
            filter,
            out,
        )?;
    }
    Ok(())
}

/// Resolve an [Occurrence] to its [Component] (cloned) and the transform
/// mapping its coordinates into the top cell's.
pub fn resolve_component(cell: &Cell, occ: &Occurrence) -> DbResult<(Component, Transform)> {
    let transform = crate::occurrence::path_transform(cell, &occ.path)?;
    if occ.path.is_empty() {
        let comp = cell
            .components
            .get(&occ.entity)
            .ok_or_else(|| DbError::msg("Occurrence of unknown component"))?;
        return Ok((comp.clone(), transform));
    }
    // Walk down to the deepest cell, then fetch
    let mut current = cell
        .instances
        .get(&occ.path.0[0])
        .ok_or_else(|| DbError::msg("Invalid instance id on path"))?
        .cell
        .clone();
    for inst_id in &occ.path.0[1..] {
        let next = {
            let guard = current.read()?;
            guard
                .instances
                .get(inst_id)
                .ok_or_else(|| DbError::msg("Invalid instance id on path"))?
                .cell
                .clone()
        };
        current = next;
    }
    let guard = current.read()?;
    let comp = guard
        .components
        .get(&occ.entity)
        .ok_or_else(|| DbError::msg("Occurrence of unknown component"))?;
    Ok((comp.clone(), transform))
}

/// Materialise deep nets: copy every sub-instance component into the top
/// cell, onto nets named `<instance-path>.<net-name>`, leaving the instance
/// tree itself untouched. The copies land at their transformed positions.
pub fn flatten(cell: &mut Cell) -> DbResult<()> {
    let area = cell.bounding_box()?;
    let deep: Vec<Occurrence> = occurrences_under(cell, &area)?
        .into_iter()
        .filter(|occ| !occ.path.is_empty())
        .collect();

    for occ in deep {
        let (comp, transform) = resolve_component(cell, &occ)?;
        // Name the flattened net by its path
        let mut name = String::new();
        let mut walk_cell = None;
        for inst_id in &occ.path.0 {
            let inst = match &walk_cell {
                None => cell.instances.get(inst_id).unwrap().clone(),
                Some(ptr) => {
                    let p: &crate::utils::Ptr<Cell> = ptr;
                    let guard = p.read()?;
                    guard.instances.get(inst_id).unwrap().clone()
                }
            };
            name.push_str(&inst.inst_name);
            name.push('.');
            walk_cell = Some(inst.cell.clone());
        }
        let leaf_net = {
            let ptr = walk_cell.as_ref().unwrap();
            let guard = ptr.read()?;
            let net_id = guard
                .components
                .get(&occ.entity)
                .ok_or_else(|| DbError::msg("Occurrence of unknown component"))?
                .net;
            guard
                .net(net_id)
                .ok_or_else(|| DbError::msg("Component on unknown net"))?
                .name
                .clone()
        };
        name.push_str(&leaf_net);

        let net_id = match cell.net_named(&name) {
            Some(net) => net.id,
            None => cell.add_net(name)?,
        };
        let mut flat = comp.shape.clone();
        relocate(&mut flat, &transform);
        cell.add_component(net_id, comp.layer, flat)?;
    }
    Ok(())
}

/// Apply `transform` to a shape in place.
fn relocate(shape: &mut crate::entity::ComponentShape, transform: &Transform) {
    use crate::entity::ComponentShape::*;
    match shape {
        Horizontal(h) => {
            let bb = transform.apply_box(&h.bounding_box());
            h.y = bb.center().y;
            h.x_source = bb.p0.x;
            h.x_target = bb.p1.x;
            h.width = bb.p1.y - bb.p0.y;
        }
        Vertical(v) => {
            let bb = transform.apply_box(&v.bounding_box());
            v.x = bb.center().x;
            v.y_source = bb.p0.y;
            v.y_target = bb.p1.y;
            v.width = bb.p1.x - bb.p0.x;
        }
        Contact(c) => {
            let bb = transform.apply_box(&c.bounding_box());
            c.at = bb.center();
            c.width = bb.p1.x - bb.p0.x;
            c.height = bb.p1.y - bb.p0.y;
        }
        Pad(p) => p.bbox = transform.apply_box(&p.bbox),
        Rectilinear(r) => {
            for pt in r.points.iter_mut() {
                *pt = transform.apply(*pt);
            }
        }
        Pin(p) => {
            let bb = transform.apply_box(&p.bounding_box());
            p.at = bb.center();
            p.width = bb.p1.x - bb.p0.x;
            p.height = bb.p1.y - bb.p0.y;
        }
        RoutingPad(rp) => rp.bbox = transform.apply_box(&rp.bbox),
    }
}
