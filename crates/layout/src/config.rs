//! Layout configuration.

use crate::error::{Error, Result};
use crate::ring::aggregate::AGGREGATION_THRESHOLD;
use crate::ring::position::Point;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Canvas size, radii and animation hints for [`crate::RingLayout`].
///
/// Every field has a default, so a config document only needs the fields it
/// changes:
///
/// ```json
/// { "width": 1280, "height": 720, "key_transition_ms": 0 }
/// ```
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Drawing surface width.
    pub width: f64,
    /// Drawing surface height.
    pub height: f64,
    /// Node ring radius as a fraction of the shorter side.
    pub radius_ratio: f64,
    /// Distance from the node ring out to the key ring.
    pub key_ring_offset: f64,
    /// Radius of a node marker.
    pub node_radius: f64,
    /// Keys drawn individually up to this count, bucketed above it.
    pub aggregation_threshold: usize,
    /// How long a key takes to move to its new position.
    pub key_transition_ms: u64,
    /// How long a capacity bar takes to fill.
    pub capacity_transition_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            radius_ratio: 0.32,
            key_ring_offset: 35.0,
            node_radius: 24.0,
            aggregation_threshold: AGGREGATION_THRESHOLD,
            key_transition_ms: 800,
            capacity_transition_ms: 500,
        }
    }
}

impl LayoutConfig {
    /// Default config for a given surface size.
    pub fn with_size(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Parses a JSON config document and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!(
                    "{} must be > 0, got {}",
                    name, value
                )))
            }
        };
        positive("width", self.width)?;
        positive("height", self.height)?;
        positive("radius_ratio", self.radius_ratio)?;
        if !self.key_ring_offset.is_finite() || self.key_ring_offset < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "key_ring_offset must be >= 0, got {}",
                self.key_ring_offset
            )));
        }
        Ok(())
    }

    /// Center of the drawing surface.
    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// Radius of the node ring.
    pub fn radius(&self) -> f64 {
        self.width.min(self.height) * self.radius_ratio
    }

    /// Radius of the key ring.
    pub fn key_radius(&self) -> f64 {
        self.radius() + self.key_ring_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LayoutConfig::default();
        assert_eq!(config.center(), Point::new(400.0, 300.0));
        assert!((config.radius() - 192.0).abs() < 1e-9);
        assert!((config.key_radius() - 227.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_json() {
        let config = LayoutConfig::from_json(r#"{ "width": 1000, "key_transition_ms": 0 }"#).unwrap();
        assert_eq!(config.width, 1000.0);
        assert_eq!(config.height, 600.0);
        assert_eq!(config.key_transition_ms, 0);
        assert_eq!(config.aggregation_threshold, 50);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(LayoutConfig::from_json(r#"{ "width": 0 }"#).is_err());
        assert!(LayoutConfig::from_json(r#"{ "key_ring_offset": -1 }"#).is_err());
        assert!(LayoutConfig::from_json("not json").is_err());
    }
}
