use serde::Deserialize;

/// Host settings. Anything omitted falls back to the defaults.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct NavConfig {
    /// Base URL of an OSRM-compatible routing service, up to but not including `/driving`
    pub route_api: String,
    /// Tile URL template with `{s}`, `{z}`, `{x}` and `{y}` placeholders
    pub tile_api: String,
    /// Initial map view as [lat, lng]
    pub map_center: [f64; 2],
    pub map_zoom: u8,
    pub speech_lang: String,
}

impl Default for NavConfig {
    fn default() -> NavConfig {
        NavConfig {
            route_api: "https://router.project-osrm.org/route/v1".to_string(),
            tile_api: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            map_center: [21.8853, -102.2916],
            map_zoom: 13,
            speech_lang: "en-US".to_string(),
        }
    }
}

impl NavConfig {
    pub fn from_json(raw: &str) -> Result<NavConfig, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config = NavConfig::from_json(r#"{"route_api": "http://localhost:5000/route/v1"}"#)
            .unwrap();
        assert_eq!(config.route_api, "http://localhost:5000/route/v1");
        assert_eq!(config.map_zoom, 13);
        assert_eq!(config.speech_lang, "en-US");
    }
}
