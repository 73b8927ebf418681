use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};

use crate::NavigationEngine;
use route_narrator_model::ResolvedPath;

impl NavigationEngine {
    /// Everything the map should show: the resolved path, then one point per waypoint. The caller
    /// should redraw after any action or completed resolution.
    pub fn render_geojson(&self) -> String {
        let mut features = Vec::new();

        if let Some(f) = self.state().path().and_then(path_feature) {
            features.push(f);
        }
        for (idx, waypt) in self.state().waypoints().iter().enumerate() {
            let mut f = Feature::from(Geometry::new(Value::Point(vec![waypt.lng, waypt.lat])));
            f.set_property("type", "waypoint");
            f.set_property("index", idx);
            features.push(f);
        }

        let gj = GeoJson::from(features.into_iter().collect::<FeatureCollection>());
        serde_json::to_string_pretty(&gj).unwrap()
    }

    /// Just the resolved path, if there is one.
    pub fn to_final_feature(&self) -> Option<String> {
        let f = path_feature(self.state().path()?)?;
        Some(serde_json::to_string_pretty(&f).unwrap())
    }
}

fn path_feature(path: &ResolvedPath) -> Option<Feature> {
    if path.geometry.len() < 2 {
        return None;
    }
    let coords = path
        .geometry
        .iter()
        .map(|pt| vec![pt.lng, pt.lat])
        .collect();
    let mut f = Feature::from(Geometry::new(Value::LineString(coords)));
    f.set_property("type", "route");
    f.set_property("length_meters", path.length_meters());
    f.set_property("steps", path.instructions.len());
    Some(f)
}
