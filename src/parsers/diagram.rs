//! Diagram exchange document parser.
//!
//! Reads the mxGraph XML used by draw.io-style editors and extracts
//! components, trust zones and dataflows. Presentation attributes (colours,
//! fonts, waypoints) are ignored; only the semantic attributes the platform
//! writes survive normalization.
//!
//! Cells come in three shapes:
//! - plain `<mxCell>` elements carrying `value` and `style`
//! - `<object>`/`<UserObject>` wrappers holding the semantic attributes, with
//!   the `<mxCell>` nested inside for layout
//! - layer cells (`id="0"`, `id="1"`) that are neither vertex nor edge

use super::geometry::{resolve_containment, NodeGeometry, Rect};
use crate::error::{DanglingReference, Result, ThreatDiffError};
use crate::model::{normalize_labels, Component, Dataflow, TrustZone, ZoneType};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Wrapper attributes that belong to the editor, not the threat model.
const PRESENTATION_ATTRIBUTES: &[&str] = &["id", "label", "placeholders", "tooltip", "link"];

/// Attribute names that select the node kind.
const KIND_KEYS: &[&str] = &["ir.type", "nodeType", "kind"];
const REFERENCE_KEYS: &[&str] = &["referenceId", "ir.ref", "ref"];
const COMPONENT_TYPE_KEYS: &[&str] = &["componentType", "ir.componentDefinition", "type"];
const RATING_KEYS: &[&str] = &["trustRating", "ir.trustRating", "rating"];
const ZONE_TYPE_KEYS: &[&str] = &["zoneType", "trustType"];
const DATA_TYPE_KEYS: &[&str] = &["dataTypes", "dataType", "data"];
const PROTOCOL_KEYS: &[&str] = &["protocol"];

/// Records extracted from one diagram document.
#[derive(Debug, Clone, Default)]
pub struct ParsedDiagram {
    pub components: Vec<Component>,
    pub dataflows: Vec<Dataflow>,
    pub trust_zones: Vec<TrustZone>,
    /// Unresolved edge endpoints and parents; never fatal
    pub warnings: Vec<DanglingReference>,
}

/// Parser for diagram exchange documents.
#[derive(Debug, Clone, Default)]
pub struct DiagramParser {
    _private: (),
}

impl DiagramParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse raw document bytes.
    pub fn parse(&self, document: &[u8]) -> Result<ParsedDiagram> {
        let text = std::str::from_utf8(document).map_err(|e| {
            ThreatDiffError::malformed_diagram("document", format!("not valid UTF-8: {e}"))
        })?;
        self.parse_str(text)
    }

    /// Parse a document already held as text.
    pub fn parse_str(&self, document: &str) -> Result<ParsedDiagram> {
        let cells = read_cells(document)?;
        let parsed = build_records(cells)?;
        tracing::debug!(
            components = parsed.components.len(),
            dataflows = parsed.dataflows.len(),
            trust_zones = parsed.trust_zones.len(),
            warnings = parsed.warnings.len(),
            "Parsed diagram"
        );
        Ok(parsed)
    }
}

// ============================================================================
// Style strings
// ============================================================================

/// A parsed `key=value;flag;` style string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Style {
    entries: BTreeMap<String, String>,
}

impl Style {
    pub(crate) fn parse(raw: &str) -> Self {
        let entries = raw
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
                None => (part.to_string(), String::new()),
            })
            .collect();
        Self { entries }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Whether the style carries `flag` as a bare token.
    pub(crate) fn has_flag(&self, flag: &str) -> bool {
        self.entries.get(flag).is_some_and(String::is_empty)
    }
}

// ============================================================================
// Raw cells
// ============================================================================

#[derive(Debug, Clone, Default)]
struct RawCell {
    id: Option<String>,
    label: String,
    style: Style,
    vertex: bool,
    edge: bool,
    parent: Option<String>,
    source: Option<String>,
    target: Option<String>,
    geometry: Option<Rect>,
    /// Semantic attributes from an `<object>` wrapper
    attributes: BTreeMap<String, String>,
}

impl RawCell {
    fn from_attributes(cell: BTreeMap<String, String>, wrapper: Option<&BTreeMap<String, String>>) -> Self {
        let mut raw = Self {
            id: cell.get("id").cloned(),
            label: cell.get("value").cloned().unwrap_or_default(),
            style: cell.get("style").map(|s| Style::parse(s)).unwrap_or_default(),
            vertex: cell.get("vertex").is_some_and(|v| v == "1"),
            edge: cell.get("edge").is_some_and(|v| v == "1"),
            parent: cell.get("parent").cloned(),
            source: cell.get("source").cloned(),
            target: cell.get("target").cloned(),
            ..Self::default()
        };

        if let Some(wrapper) = wrapper {
            if let Some(id) = wrapper.get("id") {
                raw.id = Some(id.clone());
            }
            if let Some(label) = wrapper.get("label") {
                raw.label = label.clone();
            }
            raw.attributes = wrapper
                .iter()
                .filter(|(key, _)| !PRESENTATION_ATTRIBUTES.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
        }
        raw
    }

    fn node_label(&self) -> String {
        self.id.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }

    /// First semantic value found under any of `keys`, checking wrapper
    /// attributes before style entries.
    fn semantic(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.attributes.get(*key).map(String::as_str))
            .or_else(|| keys.iter().find_map(|key| self.style.get(key)))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn name(&self) -> String {
        let cleaned = strip_markup(&self.label);
        if cleaned.is_empty() {
            self.attributes
                .get("name")
                .cloned()
                .unwrap_or_else(|| self.node_label())
        } else {
            cleaned
        }
    }

    fn properties(&self, consumed: &[&[&str]]) -> BTreeMap<String, String> {
        self.attributes
            .iter()
            .filter(|(key, _)| key.as_str() != "name")
            .filter(|(key, _)| !consumed.iter().any(|keys| keys.contains(&key.as_str())))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Pull every cell out of the first diagram page.
fn read_cells(document: &str) -> Result<Vec<RawCell>> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut cells: Vec<RawCell> = Vec::new();
    let mut wrapper: Option<BTreeMap<String, String>> = None;
    let mut current: Option<RawCell> = None;
    let mut saw_model = false;
    let mut saw_compressed = false;
    let mut in_diagram = false;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            let node = current
                .as_ref()
                .map_or_else(|| "document".to_string(), RawCell::node_label);
            ThreatDiffError::malformed_diagram(
                node,
                format!("XML error at byte {}: {e}", reader.buffer_position()),
            )
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let hint = current
                    .as_ref()
                    .map_or_else(|| "document".to_string(), RawCell::node_label);
                match e.name().as_ref() {
                    b"diagram" => in_diagram = true,
                    b"mxGraphModel" => saw_model = true,
                    b"object" | b"UserObject" => {
                        if !is_empty {
                            wrapper = Some(attributes(e, &hint)?);
                        }
                    }
                    b"mxCell" => {
                        let cell = RawCell::from_attributes(attributes(e, &hint)?, wrapper.as_ref());
                        if is_empty {
                            cells.push(cell);
                        } else {
                            current = Some(cell);
                        }
                    }
                    b"mxGeometry" => {
                        if let Some(cell) = current.as_mut() {
                            if cell.vertex {
                                let attrs = attributes(e, &hint)?;
                                cell.geometry = Some(parse_rect(&attrs, &cell.node_label())?);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref t) => {
                if in_diagram && !saw_model && t.iter().any(|b| !b.is_ascii_whitespace()) {
                    saw_compressed = true;
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"mxCell" => {
                    if let Some(cell) = current.take() {
                        cells.push(cell);
                    }
                }
                b"object" | b"UserObject" => wrapper = None,
                b"diagram" => {
                    // Only the first page is compared.
                    if saw_model || saw_compressed {
                        break;
                    }
                    in_diagram = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_model {
        let message = if saw_compressed {
            "compressed diagram content is not supported; export uncompressed XML"
        } else {
            "no mxGraphModel element found"
        };
        return Err(ThreatDiffError::malformed_diagram("document", message));
    }
    Ok(cells)
}

fn attributes(element: &BytesStart<'_>, node: &str) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| {
            ThreatDiffError::malformed_diagram(node, format!("invalid attribute: {e}"))
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| {
                ThreatDiffError::malformed_diagram(node, format!("invalid value for '{key}': {e}"))
            })?
            .into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

fn parse_rect(attrs: &BTreeMap<String, String>, node: &str) -> Result<Rect> {
    let number = |key: &str| -> Result<f64> {
        match attrs.get(key) {
            None => Ok(0.0),
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    ThreatDiffError::malformed_diagram(
                        node,
                        format!("geometry '{key}' is not a number: '{raw}'"),
                    )
                }),
        }
    };
    let rect = Rect::new(number("x")?, number("y")?, number("width")?, number("height")?);
    if rect.width < 0.0 || rect.height < 0.0 {
        return Err(ThreatDiffError::malformed_diagram(node, "negative geometry size"));
    }
    Ok(rect)
}

/// Reduce an HTML label to plain text.
fn strip_markup(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut in_tag = false;
    for c in label.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Record assembly
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Zone,
    Component,
}

fn classify(cell: &RawCell) -> Option<NodeKind> {
    if let Some(kind) = cell.semantic(KIND_KEYS) {
        let normalized: String = kind
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_lowercase();
        return match normalized.as_str() {
            "trustzone" | "zone" | "boundary" => Some(NodeKind::Zone),
            _ => Some(NodeKind::Component),
        };
    }
    let shape_is_zone = cell
        .style
        .get("shape")
        .is_some_and(|shape| shape.to_ascii_lowercase().ends_with("trustzone"));
    if shape_is_zone || cell.style.has_flag("trustZone") {
        return Some(NodeKind::Zone);
    }
    // Free-floating text and edge labels carry no semantics.
    if cell.style.has_flag("text") || cell.style.has_flag("edgeLabel") {
        return None;
    }
    Some(NodeKind::Component)
}

fn build_records(cells: Vec<RawCell>) -> Result<ParsedDiagram> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut layers: HashSet<String> = HashSet::new();
    let mut edge_ids: HashSet<String> = HashSet::new();
    let mut vertices: Vec<(String, RawCell)> = Vec::new();
    let mut edges: Vec<(String, RawCell)> = Vec::new();

    for (index, cell) in cells.into_iter().enumerate() {
        let Some(id) = cell.id.clone().filter(|id| !id.trim().is_empty()) else {
            if cell.vertex || cell.edge {
                return Err(ThreatDiffError::malformed_diagram(
                    format!("cell #{index}"),
                    "cell has no id",
                ));
            }
            continue;
        };
        if !seen.insert(id.clone()) {
            return Err(ThreatDiffError::malformed_diagram(id, "duplicate cell id"));
        }
        if cell.edge {
            edge_ids.insert(id.clone());
            edges.push((id, cell));
        } else if cell.vertex {
            vertices.push((id, cell));
        } else {
            layers.insert(id);
        }
    }

    let mut warnings = Vec::new();
    let mut kinds: HashMap<String, NodeKind> = HashMap::new();
    let mut nodes: Vec<(String, NodeKind, RawCell)> = Vec::new();
    for (id, cell) in vertices {
        // Labels attached to an edge are edge decorations.
        if cell.parent.as_ref().is_some_and(|p| edge_ids.contains(p)) {
            continue;
        }
        if let Some(kind) = classify(&cell) {
            kinds.insert(id.clone(), kind);
            nodes.push((id, kind, cell));
        }
    }

    let mut geometry = Vec::with_capacity(nodes.len());
    for (id, kind, cell) in &nodes {
        let explicit_parent = match cell.parent.as_deref() {
            Some(parent) if kinds.contains_key(parent) => Some(parent.to_string()),
            Some(parent) if layers.contains(parent) || seen.contains(parent) => None,
            Some(parent) => {
                warnings.push(DanglingReference::new(
                    kind_name(*kind),
                    id.clone(),
                    "parent",
                    parent,
                    "diagram",
                ));
                None
            }
            None => None,
        };
        geometry.push(NodeGeometry {
            id: id.clone(),
            rect: cell.geometry,
            explicit_parent,
        });
    }
    let containers = resolve_containment(&geometry)?;

    let zone_of = |start: &str| -> Option<String> {
        let mut visited = HashSet::new();
        let mut cursor = Some(start.to_string());
        while let Some(id) = cursor {
            if !visited.insert(id.clone()) {
                return None;
            }
            if kinds.get(&id) == Some(&NodeKind::Zone) {
                return Some(id);
            }
            cursor = containers.get(&id).cloned().flatten();
        }
        None
    };

    let mut parsed = ParsedDiagram::default();
    for (id, kind, cell) in &nodes {
        match kind {
            NodeKind::Zone => parsed.trust_zones.push(build_zone(id, cell)),
            NodeKind::Component => {
                let container = containers.get(id).cloned().flatten();
                let parent_component =
                    container.filter(|c| kinds.get(c) == Some(&NodeKind::Component));
                let mut component = build_component(id, cell);
                component.parent_component = parent_component;
                component.trust_zone = zone_of(id);
                parsed.components.push(component);
            }
        }
    }

    for (id, cell) in edges {
        let endpoints = [("source", cell.source.as_deref()), ("target", cell.target.as_deref())];
        let mut resolved = true;
        for (role, endpoint) in endpoints {
            match endpoint {
                Some(node) if kinds.contains_key(node) => {}
                other => {
                    resolved = false;
                    warnings.push(DanglingReference::new(
                        "dataflow",
                        id.clone(),
                        role,
                        other.unwrap_or("<missing>"),
                        "diagram",
                    ));
                }
            }
        }
        if !resolved {
            continue;
        }
        let (Some(source), Some(target)) = (cell.source.clone(), cell.target.clone()) else {
            continue;
        };
        let crosses = zone_of(&source) != zone_of(&target);
        parsed
            .dataflows
            .push(build_dataflow(&id, &cell, source, target, crosses));
    }

    parsed.warnings = warnings;
    Ok(parsed)
}

const fn kind_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Zone => "trustZone",
        NodeKind::Component => "component",
    }
}

fn build_zone(id: &str, cell: &RawCell) -> TrustZone {
    let rating = cell
        .semantic(RATING_KEYS)
        .and_then(|r| r.parse::<f64>().ok())
        .filter(|r| r.is_finite() && *r >= 0.0)
        .map(|r| r.round().min(f64::from(u8::MAX)) as u8);
    let zone_type = cell
        .semantic(ZONE_TYPE_KEYS)
        .and_then(ZoneType::from_label)
        .or_else(|| rating.map(ZoneType::from_rating))
        .unwrap_or(ZoneType::Internal);

    let mut zone = TrustZone::new(id, cell.name(), zone_type);
    zone.trust_rating = rating;
    zone.properties = cell.properties(&[KIND_KEYS, RATING_KEYS, ZONE_TYPE_KEYS, REFERENCE_KEYS]);
    zone
}

fn build_component(id: &str, cell: &RawCell) -> Component {
    let mut component = Component::new(id, cell.name());
    if let Some(reference) = cell.semantic(REFERENCE_KEYS) {
        component = component.with_reference_id(reference);
    }
    if let Some(component_type) = cell.semantic(COMPONENT_TYPE_KEYS) {
        component = component.with_type(component_type);
    }
    component.properties = cell.properties(&[KIND_KEYS, REFERENCE_KEYS, COMPONENT_TYPE_KEYS]);
    component
}

fn build_dataflow(
    id: &str,
    cell: &RawCell,
    source: String,
    target: String,
    crosses: bool,
) -> Dataflow {
    let data_types = cell
        .semantic(DATA_TYPE_KEYS)
        .map(|raw| normalize_labels(raw.split([',', ';'])))
        .unwrap_or_default();
    let mut flow = Dataflow::new(id, source, target)
        .with_data_types(data_types)
        .crossing_boundary(crosses);
    flow.name = strip_markup(&cell.label);
    if let Some(protocol) = cell.semantic(PROTOCOL_KEYS) {
        flow = flow.with_protocol(protocol);
    }
    flow.properties = cell.properties(&[KIND_KEYS, DATA_TYPE_KEYS, PROTOCOL_KEYS]);
    flow
}
