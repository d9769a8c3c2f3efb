//! Containment resolution for diagram nodes.
//!
//! A node's container is either its explicit structural parent (a grouped
//! child whose coordinates are relative to that parent) or, when it sits on a
//! layer, the smallest other node whose absolute bounds fully enclose it.

use crate::error::{Result, ThreatDiffError};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Axis-aligned bounds of a diagram node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Whether `other` lies entirely within `self` (edges may touch).
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Geometry input for one node.
#[derive(Debug, Clone)]
pub struct NodeGeometry {
    pub id: String,
    /// Bounds relative to the explicit parent (or the canvas on a layer)
    pub rect: Option<Rect>,
    /// Structural parent when the node is grouped inside another node
    pub explicit_parent: Option<String>,
}

/// Resolve the immediate container of every node.
///
/// Returns a map from node id to its container id (`None` for top-level
/// nodes). Fails when explicit parents form a cycle.
pub fn resolve_containment(nodes: &[NodeGeometry]) -> Result<BTreeMap<String, Option<String>>> {
    let by_id: HashMap<&str, &NodeGeometry> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut absolute: HashMap<&str, Option<Rect>> = HashMap::new();
    for node in nodes {
        let rect = absolute_rect(node, &by_id, &mut absolute)?;
        absolute.insert(node.id.as_str(), rect);
    }

    let mut containers = BTreeMap::new();
    for node in nodes {
        let container = match &node.explicit_parent {
            Some(parent) if by_id.contains_key(parent.as_str()) => Some(parent.clone()),
            _ => geometric_container(node, nodes, &by_id, &absolute),
        };
        containers.insert(node.id.clone(), container);
    }
    Ok(containers)
}

/// Absolute bounds, accumulating offsets through explicit parents.
fn absolute_rect<'a>(
    node: &'a NodeGeometry,
    by_id: &HashMap<&'a str, &'a NodeGeometry>,
    cache: &mut HashMap<&'a str, Option<Rect>>,
) -> Result<Option<Rect>> {
    if let Some(cached) = cache.get(node.id.as_str()) {
        return Ok(*cached);
    }

    let mut chain: Vec<&NodeGeometry> = vec![node];
    let mut seen: HashSet<&str> = HashSet::from([node.id.as_str()]);
    let mut cursor = node;
    while let Some(parent) = cursor
        .explicit_parent
        .as_deref()
        .and_then(|p| by_id.get(p).copied())
    {
        if !seen.insert(parent.id.as_str()) {
            return Err(ThreatDiffError::malformed_diagram(
                node.id.clone(),
                format!("containment cycle through '{}'", parent.id),
            ));
        }
        chain.push(parent);
        cursor = parent;
    }

    let Some(rect) = node.rect else {
        return Ok(None);
    };
    let (dx, dy) = chain[1..]
        .iter()
        .filter_map(|ancestor| ancestor.rect)
        .fold((0.0, 0.0), |(dx, dy), r| (dx + r.x, dy + r.y));
    Ok(Some(rect.translated(dx, dy)))
}

/// Smallest strictly larger node whose bounds enclose `node`.
fn geometric_container(
    node: &NodeGeometry,
    nodes: &[NodeGeometry],
    by_id: &HashMap<&str, &NodeGeometry>,
    absolute: &HashMap<&str, Option<Rect>>,
) -> Option<String> {
    let own = (*absolute.get(node.id.as_str())?)?;

    nodes
        .iter()
        .filter(|candidate| candidate.id != node.id)
        .filter(|candidate| !is_explicit_descendant(candidate, &node.id, by_id))
        .filter_map(|candidate| {
            let rect = (*absolute.get(candidate.id.as_str())?)?;
            (rect.area() > own.area() && rect.contains(&own)).then_some((candidate, rect.area()))
        })
        .min_by(|(a, area_a), (b, area_b)| {
            area_a
                .partial_cmp(area_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|(candidate, _)| candidate.id.clone())
}

/// Whether `candidate` is structurally nested under `ancestor_id`.
fn is_explicit_descendant(
    candidate: &NodeGeometry,
    ancestor_id: &str,
    by_id: &HashMap<&str, &NodeGeometry>,
) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = candidate.explicit_parent.as_deref();
    while let Some(parent) = cursor {
        if parent == ancestor_id {
            return true;
        }
        if !seen.insert(parent) {
            return false;
        }
        cursor = by_id.get(parent).and_then(|p| p.explicit_parent.as_deref());
    }
    false
}
