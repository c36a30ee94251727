// src/utils.rs
use web_sys::window;

const DEPLOY_PREFIX: &str = "/topo-annotator";

/// Get the base URL for the application
/// This handles both local development and a sub-path deployment
pub fn get_base_url() -> String {
    if let Some(window) = window() {
        if let Ok(location) = window.location().pathname() {
            return base_for_path(&location).to_string();
        }
    }
    String::new()
}

fn base_for_path(pathname: &str) -> &'static str {
    if pathname.starts_with(&format!("{}/", DEPLOY_PREFIX)) {
        DEPLOY_PREFIX
    } else {
        ""
    }
}

/// Build a resource URL with the correct base path
pub fn resource_url(path: &str) -> String {
    join_url(&get_base_url(), path)
}

fn join_url(base: &str, path: &str) -> String {
    let clean_path = path.trim_start_matches('/');
    if base.is_empty() {
        format!("/{}", clean_path)
    } else {
        format!("{}/{}", base, clean_path)
    }
}

/// CSS width of the layout viewport, used for the mobile breakpoint.
pub fn viewport_width() -> f64 {
    window()
        .and_then(|w| w.inner_width().ok())
        .and_then(|v| v.as_f64())
        .unwrap_or(1024.0)
}

pub fn now_iso() -> String {
    String::from(js_sys::Date::new_0().to_iso_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("", "/public/topo_config.json"), "/public/topo_config.json");
        assert_eq!(join_url("", "public/topo_config.json"), "/public/topo_config.json");
        assert_eq!(
            join_url(DEPLOY_PREFIX, "public/topo_config.json"),
            "/topo-annotator/public/topo_config.json"
        );
    }

    #[test]
    fn test_deploy_prefix_detection() {
        assert_eq!(base_for_path("/topo-annotator/routes/12"), DEPLOY_PREFIX);
        assert_eq!(base_for_path("/routes/12"), "");
        assert_eq!(base_for_path("/topo-annotatorx/"), "");
    }
}
