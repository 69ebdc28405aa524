//! Maps: the creep path and where towers may stand
//!
//! Maps are JSON documents. Path bounds are the areas towers target inside;
//! they double as no-build zones.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::consts::{MAP_HEIGHT, MAP_WIDTH};
use crate::error::PersistenceError;
use crate::sim::geometry::{Circle, Rect, Shape};
use crate::sim::tower::Tower;

/// Half the width of the generated path strip
pub const PATH_HALF_WIDTH: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMap {
    pub name: String,
    waypoints: Vec<DVec2>,
    /// Leave empty to build strips around the waypoint legs
    #[serde(default)]
    path_bounds: Vec<Shape>,
}

impl Default for GameMap {
    /// A serpentine path across the play area
    fn default() -> Self {
        let waypoints = vec![
            DVec2::new(0.0, 100.0),
            DVec2::new(500.0, 100.0),
            DVec2::new(500.0, 300.0),
            DVec2::new(100.0, 300.0),
            DVec2::new(100.0, 500.0),
            DVec2::new(MAP_WIDTH, 500.0),
        ];
        Self {
            name: "Serpent".to_string(),
            path_bounds: strips(&waypoints),
            waypoints,
        }
    }
}

/// One rectangle per leg, `PATH_HALF_WIDTH` either side of it
fn strips(waypoints: &[DVec2]) -> Vec<Shape> {
    let pad = DVec2::splat(PATH_HALF_WIDTH);
    waypoints
        .windows(2)
        .map(|leg| {
            let rect = Rect::from_corners(leg[0], leg[1]);
            Shape::Rect(Rect::from_corners(rect.min - pad, rect.max + pad))
        })
        .collect()
}

impl GameMap {
    pub fn new(name: impl Into<String>, waypoints: Vec<DVec2>) -> Result<Self, PersistenceError> {
        let mut map = Self {
            name: name.into(),
            waypoints,
            path_bounds: Vec::new(),
        };
        map.validate()?;
        Ok(map)
    }

    fn validate(&mut self) -> Result<(), PersistenceError> {
        if self.waypoints.len() < 2 {
            return Err(PersistenceError::InvalidMap(format!(
                "{} needs at least two waypoints, has {}",
                self.name,
                self.waypoints.len()
            )));
        }
        if self.waypoints.iter().any(|w| !w.is_finite()) {
            return Err(PersistenceError::InvalidMap(format!(
                "{} has a non-finite waypoint",
                self.name
            )));
        }
        if self.path_bounds.is_empty() {
            self.path_bounds = strips(&self.waypoints);
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let mut map: Self = serde_json::from_str(json)?;
        map.validate()?;
        Ok(map)
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let map = Self::from_json(&fs::read_to_string(path)?)?;
        log::info!("Loaded map '{}' from {}", map.name, path.display());
        Ok(map)
    }

    pub fn waypoints(&self) -> &[DVec2] {
        &self.waypoints
    }

    /// Waypoints in the shared form creeps hold
    pub fn path(&self) -> Arc<[DVec2]> {
        Arc::from(self.waypoints.as_slice())
    }

    pub fn path_bounds(&self) -> &[Shape] {
        &self.path_bounds
    }

    /// Whether a tower of `width` fits at `pos`: fully on the map, clear of
    /// the path and not overlapping another tower.
    pub fn can_place(&self, pos: DVec2, width: f64, towers: &[Arc<Tower>]) -> bool {
        let half = width / 2.0;
        let area = Rect::from_corners(DVec2::splat(half), DVec2::new(MAP_WIDTH - half, MAP_HEIGHT - half));
        if !area.contains(pos) {
            return false;
        }
        let footprint = Circle::from_parts(pos, half);
        let blocked = self.path_bounds.iter().any(|bound| {
            // A bound the kernel cannot test counts as blocking
            footprint.intersects(bound).unwrap_or(true)
        });
        !blocked && !towers.iter().any(|t| footprint.intersects_circle(&t.footprint()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::tower::{TowerKind, TowerSpec};

    #[test]
    fn test_default_map_is_valid() {
        let map = GameMap::default();
        assert_eq!(map.path_bounds().len(), map.waypoints().len() - 1);
        // Every waypoint lies on the path
        for w in map.waypoints() {
            assert!(map.path_bounds().iter().any(|b| b.contains(*w)));
        }
    }

    #[test]
    fn test_placement_rules() {
        let map = GameMap::default();
        let width = 50.0;
        assert!(map.can_place(DVec2::new(300.0, 200.0), width, &[]));
        // On the path
        assert!(!map.can_place(DVec2::new(300.0, 100.0), width, &[]));
        // Touching the strip edge
        assert!(!map.can_place(DVec2::new(300.0, 140.0), width, &[]));
        // Hanging off the map
        assert!(!map.can_place(DVec2::new(10.0, 200.0), width, &[]));

        let spec = TowerSpec::for_kind(TowerKind::Basic);
        let tower = Arc::new(Tower::new(1, DVec2::new(300.0, 200.0), &spec, 0).unwrap());
        assert!(!map.can_place(DVec2::new(330.0, 200.0), width, &[tower.clone()]));
        assert!(map.can_place(DVec2::new(360.0, 200.0), width, &[tower]));
    }

    #[test]
    fn test_json_round_trip_fills_bounds() {
        let json = r#"{"name": "Line", "waypoints": [[0.0, 50.0], [600.0, 50.0]]}"#;
        let map = GameMap::from_json(json).unwrap();
        assert_eq!(map.name, "Line");
        assert_eq!(map.path_bounds().len(), 1);
        assert!(map.path_bounds()[0].contains(DVec2::new(300.0, 65.0)));
    }

    #[test]
    fn test_rejects_short_path() {
        let json = r#"{"name": "Dot", "waypoints": [[0.0, 50.0]]}"#;
        assert!(matches!(
            GameMap::from_json(json),
            Err(PersistenceError::InvalidMap(_))
        ));
        assert!(GameMap::new("Empty", Vec::new()).is_err());
    }

    #[test]
    fn test_rejects_negative_radius_bound() {
        let json = r#"{
            "name": "Pond",
            "waypoints": [[0.0, 50.0], [600.0, 50.0]],
            "path_bounds": [{"Circle": {"center": [300.0, 300.0], "radius": -40.0}}]
        }"#;
        assert!(matches!(GameMap::from_json(json), Err(PersistenceError::Json(_))));

        let valid = json.replace("-40.0", "40.0");
        let map = GameMap::from_json(&valid).unwrap();
        assert!(map.path_bounds()[0].contains(DVec2::new(310.0, 300.0)));
    }
}
