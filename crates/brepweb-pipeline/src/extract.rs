//! Shape Extractor: split a model into meshable parts.

use brepweb_core::GeometryKernel;
use indexmap::IndexMap;

use crate::record::{ShapeClass, ShapeRecord};

/// Decompose `shape` into parts, in a stable order:
/// solids, then shells no solid owns, and only when there are neither,
/// faces. A shape with none of these becomes one `Unknown` part.
pub fn extract<K: GeometryKernel>(kernel: &K, shape: &K::Shape) -> Vec<ShapeRecord<K::Shape>> {
    let topology = kernel.classify(shape);

    let owned: Vec<K::Shape> = topology
        .solids
        .iter()
        .flat_map(|solid| kernel.solid_shells(solid))
        .collect();

    let mut parts: Vec<(K::Shape, ShapeClass)> = topology
        .solids
        .into_iter()
        .map(|solid| (solid, ShapeClass::Solid))
        .collect();
    parts.extend(
        topology
            .shells
            .into_iter()
            .filter(|shell| !owned.contains(shell))
            .map(|shell| (shell, ShapeClass::Shell)),
    );

    if parts.is_empty() {
        parts.extend(topology.faces.into_iter().map(|face| (face, ShapeClass::Face)));
    }
    if parts.is_empty() {
        tracing::warn!(kernel = kernel.name(), "no solids, shells or faces; meshing the whole shape");
        parts.push((shape.clone(), ShapeClass::Unknown));
    }

    parts
        .into_iter()
        .enumerate()
        .map(|(index, (shape, class))| ShapeRecord::new(index, shape, class))
        .collect()
}

/// Part count per class, in order of first appearance.
pub fn class_breakdown<S>(records: &[ShapeRecord<S>]) -> IndexMap<ShapeClass, usize> {
    let mut counts = IndexMap::new();
    for record in records {
        *counts.entry(record.class).or_insert(0) += 1;
    }
    counts
}
