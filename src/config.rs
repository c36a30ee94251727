// src/config.rs
use crate::utils::resource_url;
use gloo_net::http::Request;
use serde::{Deserialize, Serialize};

/// Runtime knobs for the editor and viewer. Every field has a default so a
/// partial `topo_config.json` is still valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopoConfig {
    /// Cap for the working (base) canvas, in pixels per side.
    pub max_dimension: u32,
    pub history_limit: usize,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    /// Viewports narrower than this (css px) get touch-sized markers.
    pub mobile_breakpoint: f64,
    pub mouse_hit_tolerance: f64,
    pub touch_hit_tolerance: f64,
    pub mobile_marker_scale: f64,
    pub stroke: StrokeStyle,
    pub marker: MarkerStyle,
    pub crop: CropSettings,
    pub object_url_ttl_ms: u32,
    /// Pointer travel (css px) below which a press/release counts as a click.
    pub click_slop: f64,
    pub offline_key_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeStyle {
    pub color: String,
    pub width: f64,
    pub endpoint_radius: f64,
    pub endpoint_fill: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerStyle {
    pub radius: f64,
    pub fill: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropSettings {
    pub max_dimension: u32,
    pub quality: f64,
    pub mime_type: String,
}

impl Default for TopoConfig {
    fn default() -> Self {
        Self {
            max_dimension: 2000,
            history_limit: 100,
            min_zoom: 1.0,
            max_zoom: 6.0,
            zoom_step: 1.2,
            mobile_breakpoint: 768.0,
            mouse_hit_tolerance: 6.0,
            touch_hit_tolerance: 18.0,
            mobile_marker_scale: 2.0,
            stroke: StrokeStyle::default(),
            marker: MarkerStyle::default(),
            crop: CropSettings::default(),
            object_url_ttl_ms: 10_000,
            click_slop: 4.0,
            offline_key_prefix: String::from("topo-offline:"),
        }
    }
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: String::from("#e53935"),
            width: 4.0,
            endpoint_radius: 6.0,
            endpoint_fill: String::from("#ffffff"),
        }
    }
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            radius: 14.0,
            fill: String::from("#1e88e5"),
            label: String::from("i"),
        }
    }
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            max_dimension: 2000,
            quality: 0.9,
            mime_type: String::from("image/jpeg"),
        }
    }
}

impl TopoConfig {
    /// Hit tolerance in css pixels for the current device class.
    pub fn hit_tolerance(&self, mobile: bool) -> f64 {
        if mobile {
            self.touch_hit_tolerance
        } else {
            self.mouse_hit_tolerance
        }
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}

/// Fetch `public/topo_config.json`, falling back to defaults on any failure.
pub async fn load_config() -> TopoConfig {
    let url = resource_url("public/topo_config.json");
    match Request::get(&url).send().await {
        Ok(resp) if resp.ok() => match resp.json::<TopoConfig>().await {
            Ok(config) => {
                log::info!("Loaded topo config from {}", url);
                config
            }
            Err(e) => {
                log::warn!("Failed to parse topo config: {:?}", e);
                TopoConfig::default()
            }
        },
        Ok(resp) => {
            log::warn!("Topo config not found ({}), using defaults", resp.status());
            TopoConfig::default()
        }
        Err(e) => {
            log::warn!("Failed to fetch topo config: {:?}", e);
            TopoConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: TopoConfig =
            serde_json::from_str(r#"{"max_dimension": 1600, "stroke": {"width": 6}}"#).unwrap();
        assert_eq!(config.max_dimension, 1600);
        assert_eq!(config.stroke.width, 6.0);
        assert_eq!(config.stroke.color, "#e53935");
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.crop.quality, 0.9);
    }

    #[test]
    fn test_zoom_clamp() {
        let config = TopoConfig::default();
        assert_eq!(config.clamp_zoom(0.2), 1.0);
        assert_eq!(config.clamp_zoom(40.0), 6.0);
        assert_eq!(config.clamp_zoom(2.5), 2.5);
    }

    #[test]
    fn test_hit_tolerance_widens_on_mobile() {
        let config = TopoConfig::default();
        assert!(config.hit_tolerance(true) > config.hit_tolerance(false));
    }
}
