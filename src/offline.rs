// src/offline.rs
//
// Offline bundles: the annotation document plus the photo bytes for one
// route, kept in local storage so the viewer can render without a network.

use crate::annotation::AnnotationDocument;
use crate::error::TopoError;
use crate::utils::now_iso;
use gloo::file::{Blob, ObjectUrl};
use gloo::storage::{LocalStorage, Storage};
use gloo_net::http::Request;
use serde::{Deserialize, Serialize};

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlob {
    pub mime: String,
    /// Stored as standard base64 so a photo costs 4 chars per 3 bytes of quota.
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSnapshot {
    pub route_id: String,
    pub saved_at: String,
    pub topo_url: Option<String>,
    pub topo_data: Option<AnnotationDocument>,
    pub image_blob: Option<ImageBlob>,
}

/// Outcome shown next to the offline buttons.
#[derive(Debug, Clone, PartialEq)]
pub enum OfflineStatus {
    Saved,
    Loaded,
    Missing,
    Failed(String),
}

impl std::fmt::Display for OfflineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfflineStatus::Saved => write!(f, "Saved for offline use"),
            OfflineStatus::Loaded => write!(f, "Loaded offline copy"),
            OfflineStatus::Missing => write!(f, "No offline copy for this route"),
            OfflineStatus::Failed(msg) => write!(f, "Offline save failed: {}", msg),
        }
    }
}

pub trait SnapshotStore {
    fn load(&self, route_id: &str) -> Option<OfflineSnapshot>;
    fn store(&mut self, snapshot: &OfflineSnapshot) -> Result<(), TopoError>;
}

pub fn snapshot_key(prefix: &str, route_id: &str) -> String {
    format!("{}{}", prefix, route_id)
}

/// Browser local storage, one JSON entry per route.
pub struct LocalSnapshotStore {
    prefix: String,
}

impl LocalSnapshotStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl SnapshotStore for LocalSnapshotStore {
    fn load(&self, route_id: &str) -> Option<OfflineSnapshot> {
        let key = snapshot_key(&self.prefix, route_id);
        match LocalStorage::get::<OfflineSnapshot>(&key) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::debug!("No usable offline snapshot at {}: {}", key, e);
                None
            }
        }
    }

    fn store(&mut self, snapshot: &OfflineSnapshot) -> Result<(), TopoError> {
        let key = snapshot_key(&self.prefix, &snapshot.route_id);
        LocalStorage::set(&key, snapshot).map_err(|e| TopoError::Storage(e.to_string()))
    }
}

/// Build the bundle from an already-finished image fetch. Nothing is built
/// when the fetch failed.
pub fn assemble_snapshot(
    route_id: &str,
    topo_url: Option<String>,
    topo_data: Option<AnnotationDocument>,
    image: Option<Result<ImageBlob, TopoError>>,
    saved_at: String,
) -> Result<OfflineSnapshot, TopoError> {
    let image_blob = image.transpose()?;
    Ok(OfflineSnapshot {
        route_id: route_id.to_string(),
        saved_at,
        topo_url,
        topo_data,
        image_blob,
    })
}

/// Assemble and store in one step. The store is only touched once the
/// bundle is complete, so a failure keeps the previous snapshot.
pub fn commit_snapshot<S: SnapshotStore>(
    store: &mut S,
    route_id: &str,
    topo_url: Option<String>,
    topo_data: Option<AnnotationDocument>,
    image: Option<Result<ImageBlob, TopoError>>,
    saved_at: String,
) -> Result<OfflineSnapshot, TopoError> {
    let snapshot = assemble_snapshot(route_id, topo_url, topo_data, image, saved_at)?;
    store.store(&snapshot)?;
    log::info!("Stored offline snapshot for route {}", route_id);
    Ok(snapshot)
}

pub async fn fetch_image_blob(url: &str) -> Result<ImageBlob, TopoError> {
    let resp = Request::get(url)
        .send()
        .await
        .map_err(|e| TopoError::OfflineFetchFailed(e.to_string()))?;
    if !resp.ok() {
        return Err(TopoError::OfflineFetchFailed(format!(
            "{} returned HTTP {}",
            url,
            resp.status()
        )));
    }
    let mime = resp
        .headers()
        .get("content-type")
        .unwrap_or_else(|| FALLBACK_MIME.to_string());
    let bytes = resp
        .binary()
        .await
        .map_err(|e| TopoError::OfflineFetchFailed(e.to_string()))?;
    Ok(ImageBlob { mime, bytes })
}

/// Parse the hidden-field value for a snapshot. A corrupt document is an
/// error here: saving it as "no annotations" would replace a good copy.
pub fn snapshot_document(field: &str) -> Result<Option<AnnotationDocument>, TopoError> {
    AnnotationDocument::from_field(Some(field))
}

/// Fetch the photo and store the complete bundle for `route_id`. Nothing
/// is fetched or stored when `field` does not parse.
pub async fn save_snapshot<S: SnapshotStore>(
    store: &mut S,
    route_id: &str,
    topo_url: Option<String>,
    field: &str,
) -> Result<OfflineSnapshot, TopoError> {
    let topo_data = match snapshot_document(field) {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("Offline save for route {} aborted: {}", route_id, e);
            return Err(e);
        }
    };
    let image = match &topo_url {
        Some(url) => Some(fetch_image_blob(url).await),
        None => None,
    };
    if let Some(Err(e)) = &image {
        log::warn!("Offline save for route {} aborted: {}", route_id, e);
    }
    commit_snapshot(store, route_id, topo_url, topo_data, image, now_iso())
}

pub fn load_snapshot<S: SnapshotStore>(store: &S, route_id: &str) -> Option<OfflineSnapshot> {
    store.load(route_id)
}

/// A snapshot turned back into what the editor and viewer consume: an image
/// URL and the hidden-field string.
pub struct HydratedTopo {
    pub image_url: Option<String>,
    pub field_value: String,
    /// Keeps the `blob:` URL alive; dropping it revokes the URL.
    pub object_url: Option<ObjectUrl>,
}

pub fn hydrate(snapshot: &OfflineSnapshot) -> HydratedTopo {
    let object_url = snapshot.image_blob.as_ref().map(|blob| {
        let blob = Blob::new_with_options(blob.bytes.as_slice(), Some(blob.mime.as_str()));
        ObjectUrl::from(blob)
    });
    let image_url = match &object_url {
        Some(url) => Some(url.to_string()),
        None => snapshot.topo_url.clone(),
    };
    HydratedTopo {
        image_url,
        field_value: field_value_of(snapshot),
        object_url,
    }
}

pub fn field_value_of(snapshot: &OfflineSnapshot) -> String {
    AnnotationDocument::to_field(snapshot.topo_data.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ImageSize, ABSENT_FIELD};
    use std::collections::HashMap;
    use std::future::Future;

    #[derive(Default)]
    struct MemoryStore {
        entries: HashMap<String, OfflineSnapshot>,
    }

    impl SnapshotStore for MemoryStore {
        fn load(&self, route_id: &str) -> Option<OfflineSnapshot> {
            self.entries.get(route_id).cloned()
        }

        fn store(&mut self, snapshot: &OfflineSnapshot) -> Result<(), TopoError> {
            self.entries
                .insert(snapshot.route_id.clone(), snapshot.clone());
            Ok(())
        }
    }

    fn document() -> AnnotationDocument {
        let raw = r#"{"version":1,"image":{"width":800,"height":600},"base":{"width":800,"height":600,"scale":1.0},"fabric":{"objects":[]}}"#;
        AnnotationDocument::from_field(Some(raw)).unwrap().unwrap()
    }

    fn jpeg() -> ImageBlob {
        ImageBlob {
            mime: "image/jpeg".to_string(),
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
        }
    }

    /// Poll a future that never waits on I/O to completion.
    fn run_ready<F: Future>(future: F) -> F::Output {
        let mut future = std::pin::pin!(future);
        let mut cx = std::task::Context::from_waker(std::task::Waker::noop());
        match future.as_mut().poll(&mut cx) {
            std::task::Poll::Ready(out) => out,
            std::task::Poll::Pending => panic!("future was not ready"),
        }
    }

    #[test]
    fn test_successful_save_round_trips_through_the_store() {
        let mut store = MemoryStore::default();
        let saved = commit_snapshot(
            &mut store,
            "route-7",
            Some("https://cdn.test/7.jpg".to_string()),
            Some(document()),
            Some(Ok(jpeg())),
            "2026-01-01T00:00:00.000Z".to_string(),
        )
        .unwrap();

        let loaded = load_snapshot(&store, "route-7").unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.image_blob.unwrap().bytes.len(), 4);
        assert!(load_snapshot(&store, "route-8").is_none());
    }

    #[test]
    fn test_failed_fetch_keeps_the_previous_snapshot() {
        let mut store = MemoryStore::default();
        let first = commit_snapshot(
            &mut store,
            "route-7",
            Some("https://cdn.test/7.jpg".to_string()),
            Some(document()),
            Some(Ok(jpeg())),
            "first".to_string(),
        )
        .unwrap();

        let err = commit_snapshot(
            &mut store,
            "route-7",
            Some("https://cdn.test/7-new.jpg".to_string()),
            None,
            Some(Err(TopoError::OfflineFetchFailed("network down".to_string()))),
            "second".to_string(),
        )
        .unwrap_err();

        assert!(matches!(err, TopoError::OfflineFetchFailed(_)));
        assert_eq!(load_snapshot(&store, "route-7"), Some(first));
    }

    #[test]
    fn test_snapshot_without_image_or_document() {
        let snapshot = assemble_snapshot("r", None, None, None, "now".to_string()).unwrap();
        assert!(snapshot.image_blob.is_none());
        assert_eq!(field_value_of(&snapshot), ABSENT_FIELD);
    }

    #[test]
    fn test_field_value_matches_a_fresh_serialization() {
        let doc = document();
        let snapshot =
            assemble_snapshot("r", None, Some(doc.clone()), None, "now".to_string()).unwrap();
        let field = field_value_of(&snapshot);
        let parsed = AnnotationDocument::from_field(Some(field.as_str())).unwrap().unwrap();
        assert_eq!(parsed, doc);
        assert_eq!(parsed.image, ImageSize { width: 800, height: 600 });
    }

    #[test]
    fn test_wire_keys_are_camel_case() {
        let snapshot = assemble_snapshot(
            "route-7",
            Some("u".to_string()),
            None,
            Some(Ok(jpeg())),
            "now".to_string(),
        )
        .unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["routeId"], "route-7");
        assert_eq!(json["savedAt"], "now");
        assert_eq!(json["topoData"], serde_json::Value::Null);
        assert_eq!(json["imageBlob"]["mime"], "image/jpeg");
        assert_eq!(json["imageBlob"]["bytes"], "/9j/4A==");
    }

    #[test]
    fn test_photo_bytes_fit_local_storage_quota() {
        let bytes: Vec<u8> = (0..1_500_000u32).map(|i| (i % 251) as u8).collect();
        let blob = ImageBlob {
            mime: "image/jpeg".to_string(),
            bytes,
        };
        let snapshot =
            assemble_snapshot("r", None, None, Some(Ok(blob.clone())), "now".to_string()).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        // base64 is 4/3 of the input; a few hundred chars of envelope on top.
        assert!(json.len() < 1_500_000 * 4 / 3 + 512, "{} chars", json.len());
        assert!(json.len() < 5_000_000);

        let back: OfflineSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.image_blob, Some(blob));
    }

    #[test]
    fn test_corrupt_field_keeps_the_previous_snapshot() {
        let mut store = MemoryStore::default();
        let first = commit_snapshot(
            &mut store,
            "route-7",
            None,
            Some(document()),
            None,
            "first".to_string(),
        )
        .unwrap();

        let err = run_ready(save_snapshot(&mut store, "route-7", None, "{bad")).unwrap_err();
        assert!(matches!(err, TopoError::DocumentCorrupt(_)));
        assert_eq!(load_snapshot(&store, "route-7"), Some(first));
    }

    #[test]
    fn test_absent_field_is_a_valid_snapshot_document() {
        assert_eq!(snapshot_document("null").unwrap(), None);
        assert_eq!(snapshot_document("").unwrap(), None);
        assert!(snapshot_document("{bad").is_err());
    }

    #[test]
    fn test_keys_are_prefixed_per_route() {
        assert_eq!(snapshot_key("topo-offline:", "42"), "topo-offline:42");
    }
}
