//! Target catalog - the static list of objects anchored in the world.
//!
//! Loaded once at startup, never mutated afterwards. Share it behind an
//! `Arc`; readers need no locking.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::CatalogError;
use crate::geodesy::GeoPoint;

/// Opaque handle the renderer uses to find the model for a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(pub String);

impl AssetRef {
    pub fn new(r: impl Into<String>) -> Self {
        Self(r.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A virtual object anchored at a fixed coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetObject {
    /// Unique identifier
    pub id: String,

    /// Human-readable name shown in the UI
    pub display_name: String,

    /// Where the object sits in the world
    pub anchor: GeoPoint,

    /// Within this distance the object counts as caught (meters, >= 0)
    pub catch_radius_m: f64,

    /// Within this distance the object is shown (meters, >= catch radius)
    pub visibility_radius_m: f64,

    /// Model handle for the renderer
    pub asset_ref: AssetRef,
}

impl TargetObject {
    /// Creates a target, enforcing `0 <= catch_radius <= visibility_radius`.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        anchor: GeoPoint,
        catch_radius_m: f64,
        visibility_radius_m: f64,
        asset_ref: AssetRef,
    ) -> Result<Self, CatalogError> {
        let id = id.into();
        if !(catch_radius_m >= 0.0 && catch_radius_m.is_finite()) {
            return Err(CatalogError::InvalidTarget {
                id,
                reason: format!("catch radius {} must be a non-negative number", catch_radius_m),
            });
        }
        if !(visibility_radius_m >= catch_radius_m && visibility_radius_m.is_finite()) {
            return Err(CatalogError::InvalidTarget {
                id,
                reason: format!(
                    "visibility radius {} must be at least the catch radius {}",
                    visibility_radius_m, catch_radius_m
                ),
            });
        }
        Ok(Self {
            id,
            display_name: display_name.into(),
            anchor,
            catch_radius_m,
            visibility_radius_m,
            asset_ref,
        })
    }
}

/// Wire form of a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub id: String,
    pub display_name: String,
    pub lat: f64,
    pub lon: f64,
    pub catch_radius_meters: f64,
    pub visibility_radius_meters: f64,
    pub asset_ref: String,
}

impl TryFrom<TargetRecord> for TargetObject {
    type Error = CatalogError;

    fn try_from(record: TargetRecord) -> Result<Self, Self::Error> {
        let anchor = GeoPoint::new(record.lat, record.lon).map_err(|source| {
            CatalogError::InvalidAnchor {
                id: record.id.clone(),
                source,
            }
        })?;
        TargetObject::new(
            record.id,
            record.display_name,
            anchor,
            record.catch_radius_meters,
            record.visibility_radius_meters,
            AssetRef(record.asset_ref),
        )
    }
}

impl From<&TargetObject> for TargetRecord {
    fn from(t: &TargetObject) -> Self {
        Self {
            id: t.id.clone(),
            display_name: t.display_name.clone(),
            lat: t.anchor.lat(),
            lon: t.anchor.lon(),
            catch_radius_meters: t.catch_radius_m,
            visibility_radius_meters: t.visibility_radius_m,
            asset_ref: t.asset_ref.0.clone(),
        }
    }
}

/// Ordered, validated list of targets with unique ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetCatalog {
    targets: Vec<TargetObject>,
}

impl TargetCatalog {
    /// Builds a catalog, rejecting duplicate ids.
    pub fn new(targets: Vec<TargetObject>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.id.as_str()) {
                return Err(CatalogError::DuplicateId(target.id.clone()));
            }
        }
        Ok(Self { targets })
    }

    /// Parses a JSON array of `TargetRecord`s.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let records: Vec<TargetRecord> = serde_json::from_str(json)?;
        let targets = records
            .into_iter()
            .map(TargetObject::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(targets)
    }

    /// Loads a JSON catalog file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Serializes back to the record format.
    pub fn to_json_string(&self) -> Result<String, CatalogError> {
        let records: Vec<TargetRecord> = self.targets.iter().map(TargetRecord::from).collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }

    /// Demo field: a cube and a cottage
    /// about 4.9 m north of it.
    pub fn demo() -> Self {
        let entries = [
            ("cube", "Cube", 10.767406, 78.813385, "/models/cube.glb"),
            (
                "cottage-blender",
                "Cottage Blender",
                10.767450,
                78.813385,
                "/models/cottage-blender.glb",
            ),
        ];

        let targets = entries
            .iter()
            .filter_map(|(id, name, lat, lon, model)| {
                let anchor = GeoPoint::new(*lat, *lon).ok()?;
                TargetObject::new(*id, *name, anchor, 1.0, 15.0, AssetRef::new(*model)).ok()
            })
            .collect();

        Self { targets }
    }

    pub fn targets(&self) -> &[TargetObject] {
        &self.targets
    }

    pub fn get(&self, id: &str) -> Option<&TargetObject> {
        self.targets.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_JSON: &str = r#"[
        {
            "id": "cube",
            "displayName": "Cube",
            "lat": 10.767406,
            "lon": 78.813385,
            "catchRadiusMeters": 1.0,
            "visibilityRadiusMeters": 15.0,
            "assetRef": "/models/cube.glb"
        },
        {
            "id": "lamp",
            "displayName": "Lamp",
            "lat": 10.767500,
            "lon": 78.813400,
            "catchRadiusMeters": 2.0,
            "visibilityRadiusMeters": 30.0,
            "assetRef": "/models/lamp.glb"
        }
    ]"#;

    #[test]
    fn test_catalog_from_json_keeps_order() {
        let catalog = TargetCatalog::from_json_str(CATALOG_JSON).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.targets()[0].id, "cube");
        assert_eq!(catalog.targets()[1].display_name, "Lamp");
        assert_eq!(catalog.get("lamp").unwrap().catch_radius_m, 2.0);
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_catalog_json_round_trip() {
        let catalog = TargetCatalog::from_json_str(CATALOG_JSON).unwrap();
        let json = catalog.to_json_string().unwrap();
        assert_eq!(TargetCatalog::from_json_str(&json).unwrap(), catalog);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = CATALOG_JSON.replace("\"lamp\"", "\"cube\"");
        let err = TargetCatalog::from_json_str(&json).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(id) if id == "cube"));
    }

    #[test]
    fn test_visibility_below_catch_rejected() {
        let json = CATALOG_JSON.replace("\"visibilityRadiusMeters\": 30.0", "\"visibilityRadiusMeters\": 1.0");
        let err = TargetCatalog::from_json_str(&json).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTarget { id, .. } if id == "lamp"));
    }

    #[test]
    fn test_negative_catch_radius_rejected() {
        let anchor = GeoPoint::new(0.0, 0.0).unwrap();
        let err = TargetObject::new("x", "X", anchor, -1.0, 5.0, AssetRef::new("x.glb")).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTarget { .. }));
    }

    #[test]
    fn test_bad_anchor_rejected() {
        let json = CATALOG_JSON.replace("10.767500", "95.0");
        let err = TargetCatalog::from_json_str(&json).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidAnchor { id, .. } if id == "lamp"));
    }

    #[test]
    fn test_demo_catalog() {
        let demo = TargetCatalog::demo();
        assert_eq!(demo.len(), 2);
        let cottage = demo.get("cottage-blender").unwrap();
        assert_eq!(cottage.catch_radius_m, 1.0);
        assert_eq!(cottage.visibility_radius_m, 15.0);
        assert_eq!(cottage.asset_ref.as_str(), "/models/cottage-blender.glb");
    }
}
