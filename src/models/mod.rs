//! Core data model for textual MOCs.
//!
//! A [`Document`] is exactly what gets persisted to disk: the coverage map's own
//! serialized cells plus the annotation, content, metadata and embedding fields
//! layered on top of them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cell labels keyed by stringified order, then by stringified pixel id.
pub type CellAnnotations = BTreeMap<String, BTreeMap<String, String>>;

/// The persisted textual MOC.
///
/// Application fields are typed and omitted from the JSON output while unset.
/// Every other top-level key is treated as geometry and kept verbatim, so
/// keys written by other tools survive a load/save cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Coverage cells as produced by the coverage map engine
    /// (stringified order -> array of pixel ids).
    #[serde(flatten)]
    pub geometry: Map<String, Value>,

    /// Free-form text attached to the region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_text: Option<String>,

    /// Link to related multimedia content (http/https only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multimedia: Option<String>,

    /// Link to a hips2fits cutout of the region (http/https only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hips2fits_image: Option<String>,

    /// Per-cell labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_cells: Option<CellAnnotations>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Calendar date, `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Local timestamp of the last append to `custom_text`, `YYYY-MM-DD HH:MM:SS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_text_update: Option<String>,

    /// Embedding of `custom_text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,

    /// Model that produced `embedding`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl Document {
    /// Create an empty document with no geometry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document whose geometry fields come from a serialized coverage map.
    pub fn from_geometry(geometry: Map<String, Value>) -> Self {
        Self {
            geometry,
            ..Self::default()
        }
    }

    /// Whether any geometry keys are present.
    pub fn has_geometry(&self) -> bool {
        !self.geometry.is_empty()
    }

    /// Check that `pixel` is listed under `order` in the geometry fields.
    pub fn contains_cell(&self, order: u8, pixel: u64) -> bool {
        self.geometry
            .get(&order.to_string())
            .and_then(Value::as_array)
            .map_or(false, |pixels| {
                pixels.iter().any(|p| p.as_u64() == Some(pixel))
            })
    }

    /// Look up the label attached to a cell.
    pub fn annotation(&self, order: u8, pixel: u64) -> Option<&str> {
        self.annotated_cells
            .as_ref()?
            .get(&order.to_string())?
            .get(&pixel.to_string())
            .map(String::as_str)
    }

    /// Number of labelled cells across all orders.
    pub fn annotation_count(&self) -> usize {
        self.annotated_cells
            .as_ref()
            .map_or(0, |orders| orders.values().map(BTreeMap::len).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_geometry() -> Map<String, Value> {
        match json!({ "3": [120, 121, 122], "5": [2048] }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_contains_cell() {
        let doc = Document::from_geometry(sample_geometry());
        assert!(doc.has_geometry());
        assert!(doc.contains_cell(3, 121));
        assert!(doc.contains_cell(5, 2048));
        assert!(!doc.contains_cell(3, 2048));
        assert!(!doc.contains_cell(4, 121));
    }

    #[test]
    fn test_empty_document_serializes_to_empty_object() {
        let doc = Document::new();
        assert_eq!(serde_json::to_string(&doc).unwrap(), "{}");
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let raw = json!({
            "3": [1, 2],
            "custom_text": "hello",
            "x_viewer_hint": { "fov": 5 }
        });
        let doc: Document = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.custom_text.as_deref(), Some("hello"));
        assert!(doc.geometry.contains_key("x_viewer_hint"));
        assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
    }

    #[test]
    fn test_ill_typed_field_is_rejected() {
        let raw = json!({ "custom_text": 42 });
        assert!(serde_json::from_value::<Document>(raw).is_err());

        let raw = json!({ "embedding": ["a", "b"] });
        assert!(serde_json::from_value::<Document>(raw).is_err());
    }

    #[test]
    fn test_annotation_lookup() {
        let mut doc = Document::from_geometry(sample_geometry());
        assert_eq!(doc.annotation(3, 120), None);
        assert_eq!(doc.annotation_count(), 0);

        let mut cells = CellAnnotations::new();
        cells
            .entry("3".to_string())
            .or_default()
            .insert("120".to_string(), "Galactic centre".to_string());
        doc.annotated_cells = Some(cells);

        assert_eq!(doc.annotation(3, 120), Some("Galactic centre"));
        assert_eq!(doc.annotation_count(), 1);
    }
}
