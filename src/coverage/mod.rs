//! Coverage map abstraction.
//!
//! The geometry of a textual MOC is owned by a coverage map engine. This crate
//! only needs three things from it: a JSON serialization to seed a document,
//! reconstruction from a loaded document, and per-order pixel membership.
//!
//! [`HealpixMoc`] implements the plain MOC JSON layout
//! (`{"<order>": [<nested pixel ids>], ...}`) so the crate is usable without an
//! external engine; region algebra is deliberately absent.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::models::Document;

/// Deepest HEALPix order representable in a MOC.
pub const MAX_ORDER: u8 = 29;

/// Errors raised while building or decoding a coverage map.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Order deeper than [`MAX_ORDER`]
    #[error("Order {0} exceeds the maximum depth of 29")]
    OrderTooDeep(u32),

    /// Pixel id outside `0..12 * 4^order`
    #[error("Pixel {pixel} is out of range for order {order}")]
    PixelOutOfRange { order: u8, pixel: u64 },

    /// An order key whose value is not an array of pixel ids
    #[error("Invalid cell list for order {order}: {reason}")]
    InvalidCells { order: String, reason: String },

    /// The JSON text could not be parsed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for coverage operations.
pub type CoverageResult<T> = Result<T, CoverageError>;

/// A constructed coverage map.
pub trait CoverageMap: Send + Sync + fmt::Debug {
    /// Serialize the cells into document geometry fields.
    fn serialize(&self) -> Map<String, Value>;

    /// Pixel ids present at `order` (empty when the order is absent).
    fn members(&self, order: u8) -> BTreeSet<u64>;

    /// Orders that hold at least one pixel, ascending.
    fn orders(&self) -> Vec<u8>;
}

/// Rebuilds coverage maps from persisted documents.
pub trait CoverageMapEngine: Send + Sync {
    /// Reconstruct the coverage map described by the document's geometry fields.
    fn from_document(&self, document: &Document) -> CoverageResult<Arc<dyn CoverageMap>>;
}

/// Number of HEALPix cells at `order` (`order` must not exceed [`MAX_ORDER`]).
pub fn npix(order: u8) -> u64 {
    12u64 << (2 * u32::from(order))
}

/// A MOC held as explicit per-order pixel sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealpixMoc {
    cells: BTreeMap<u8, BTreeSet<u64>>,
}

impl HealpixMoc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a MOC from `(order, pixel)` pairs, validating each one.
    pub fn from_cells<I>(cells: I) -> CoverageResult<Self>
    where
        I: IntoIterator<Item = (u8, u64)>,
    {
        let mut moc = Self::new();
        for (order, pixel) in cells {
            moc.insert(order, pixel)?;
        }
        Ok(moc)
    }

    /// Parse MOC JSON text.
    pub fn from_json_str(json: &str) -> CoverageResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| CoverageError::SerializationError(e.to_string()))?;
        match value {
            Value::Object(map) => Self::from_json_map(&map),
            other => Err(CoverageError::SerializationError(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Decode cells from a JSON object.
    ///
    /// Keys that are not numeric orders are skipped so that application fields
    /// or foreign keys sharing the object do not block reconstruction.
    pub fn from_json_map(map: &Map<String, Value>) -> CoverageResult<Self> {
        let mut moc = Self::new();
        for (key, value) in map {
            let Ok(order) = key.parse::<u32>() else {
                debug!("Skipping non-order key '{}' while decoding MOC", key);
                continue;
            };
            let order = u8::try_from(order)
                .ok()
                .filter(|&o| o <= MAX_ORDER)
                .ok_or(CoverageError::OrderTooDeep(order))?;
            let pixels = value.as_array().ok_or_else(|| CoverageError::InvalidCells {
                order: key.clone(),
                reason: format!("expected an array, found {}", json_kind(value)),
            })?;
            // An empty list still records the depth of the MOC.
            if pixels.is_empty() {
                moc.cells.entry(order).or_default();
            }
            for pixel in pixels {
                let pixel = pixel.as_u64().ok_or_else(|| CoverageError::InvalidCells {
                    order: key.clone(),
                    reason: format!("pixel id {} is not a non-negative integer", pixel),
                })?;
                moc.insert(order, pixel)?;
            }
        }
        Ok(moc)
    }

    /// Add a single cell.
    pub fn insert(&mut self, order: u8, pixel: u64) -> CoverageResult<()> {
        if order > MAX_ORDER {
            return Err(CoverageError::OrderTooDeep(order.into()));
        }
        if pixel >= npix(order) {
            return Err(CoverageError::PixelOutOfRange { order, pixel });
        }
        self.cells.entry(order).or_default().insert(pixel);
        Ok(())
    }

    /// Whether the cell is part of this MOC.
    pub fn contains(&self, order: u8, pixel: u64) -> bool {
        self.cells
            .get(&order)
            .map_or(false, |pixels| pixels.contains(&pixel))
    }

    /// Total number of cells across orders.
    pub fn cell_count(&self) -> usize {
        self.cells.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }
}

impl CoverageMap for HealpixMoc {
    fn serialize(&self) -> Map<String, Value> {
        self.cells
            .iter()
            .map(|(order, pixels)| {
                let ids = pixels.iter().map(|&p| Value::from(p)).collect();
                (order.to_string(), Value::Array(ids))
            })
            .collect()
    }

    fn members(&self, order: u8) -> BTreeSet<u64> {
        self.cells.get(&order).cloned().unwrap_or_default()
    }

    fn orders(&self) -> Vec<u8> {
        self.cells
            .iter()
            .filter(|(_, pixels)| !pixels.is_empty())
            .map(|(&order, _)| order)
            .collect()
    }
}

/// Engine that reads the plain MOC JSON layout back into a [`HealpixMoc`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMocEngine;

impl CoverageMapEngine for JsonMocEngine {
    fn from_document(&self, document: &Document) -> CoverageResult<Arc<dyn CoverageMap>> {
        let moc = HealpixMoc::from_json_map(&document.geometry)?;
        Ok(Arc::new(moc))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_npix() {
        assert_eq!(npix(0), 12);
        assert_eq!(npix(1), 48);
        assert_eq!(npix(29), 12 * (1u64 << 58));
    }

    #[test]
    fn test_insert_validates_cells() {
        let mut moc = HealpixMoc::new();
        assert!(moc.insert(0, 11).is_ok());
        assert!(matches!(
            moc.insert(0, 12),
            Err(CoverageError::PixelOutOfRange { order: 0, pixel: 12 })
        ));
        assert!(matches!(moc.insert(30, 0), Err(CoverageError::OrderTooDeep(30))));
        assert_eq!(moc.cell_count(), 1);
    }

    #[test]
    fn test_serialize_and_members() {
        let moc = HealpixMoc::from_cells([(3, 122), (3, 120), (5, 2048)]).unwrap();
        assert_eq!(moc.orders(), vec![3, 5]);
        assert_eq!(moc.members(3).into_iter().collect::<Vec<_>>(), vec![120, 122]);
        assert!(moc.members(4).is_empty());

        let serialized = Value::Object(moc.serialize());
        assert_eq!(serialized, json!({ "3": [120, 122], "5": [2048] }));
    }

    #[test]
    fn test_from_json_str() {
        let moc = HealpixMoc::from_json_str(r#"{"1": [0, 5], "9": []}"#).unwrap();
        assert!(moc.contains(1, 5));
        assert_eq!(moc.cell_count(), 2);
        // depth marker survives but does not count as an order with pixels
        assert_eq!(moc.orders(), vec![1]);
        assert!(moc.serialize().contains_key("9"));
    }

    #[test]
    fn test_from_json_str_rejects_bad_input() {
        assert!(matches!(
            HealpixMoc::from_json_str("[1, 2]"),
            Err(CoverageError::SerializationError(_))
        ));
        assert!(matches!(
            HealpixMoc::from_json_str(r#"{"2": "all"}"#),
            Err(CoverageError::InvalidCells { .. })
        ));
        assert!(matches!(
            HealpixMoc::from_json_str(r#"{"2": [-1]}"#),
            Err(CoverageError::InvalidCells { .. })
        ));
        assert!(matches!(
            HealpixMoc::from_json_str(r#"{"1": [48]}"#),
            Err(CoverageError::PixelOutOfRange { .. })
        ));
    }

    #[test]
    fn test_from_json_str_rejects_deep_orders() {
        assert!(matches!(
            HealpixMoc::from_json_str(r#"{"30": []}"#),
            Err(CoverageError::OrderTooDeep(30))
        ));
        // wider than u8, still a numeric order
        assert!(matches!(
            HealpixMoc::from_json_str(r#"{"3": [1], "300": [0]}"#),
            Err(CoverageError::OrderTooDeep(300))
        ));
    }

    #[test]
    fn test_is_empty() {
        assert!(HealpixMoc::new().is_empty());
        assert!(HealpixMoc::from_json_str(r#"{"7": []}"#).unwrap().is_empty());
        assert!(!HealpixMoc::from_cells([(0, 3)]).unwrap().is_empty());
    }

    #[test]
    fn test_engine_skips_application_and_foreign_keys() {
        let doc: Document = serde_json::from_value(json!({
            "4": [10, 11],
            "custom_text": "Orion",
            "viewer": { "fov": 5 }
        }))
        .unwrap();

        let map = JsonMocEngine.from_document(&doc).unwrap();
        assert_eq!(map.orders(), vec![4]);
        assert_eq!(map.members(4).len(), 2);
    }
}
