// src/annotation.rs
use crate::config::{MarkerStyle, StrokeStyle};
use crate::error::TopoError;
use crate::geometry::{first_point_of_path, last_point_of_path, PathCommand, Point};
use serde::{Deserialize, Serialize};

pub const DOCUMENT_VERSION: u32 = 1;

/// Value the host form field holds when a route has no topo document.
pub const ABSENT_FIELD: &str = "null";

/// The persisted unit: one per route topo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDocument {
    pub version: u32,
    pub image: ImageSize,
    /// Missing on legacy documents; viewers recompute it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<BaseSpace>,
    #[serde(rename = "fabric", alias = "scene", default)]
    pub scene: SceneData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// An image whose natural size is known, ready to become a background.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub url: String,
    pub natural: ImageSize,
}

impl DecodedImage {
    pub fn ensure_valid(&self) -> Result<(), TopoError> {
        if self.natural.width == 0 || self.natural.height == 0 {
            return Err(TopoError::InvalidImage(format!(
                "{} reports {}x{} pixels",
                self.url, self.natural.width, self.natural.height
            )));
        }
        Ok(())
    }
}

/// Capped working coordinate system. `scale = width / image.width`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseSpace {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

/// Serialized scene graph, background excluded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneData {
    #[serde(default)]
    pub objects: Vec<SceneObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneObject {
    /// A bare freehand path; only exists until the scene promotes it.
    Stroke(FreehandStroke),
    StrokeGroup(StrokeGroup),
    InfoMarker(InfoMarker),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Stroke,
    StrokeGroup,
    InfoMarker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreehandStroke {
    pub path: Vec<PathCommand>,
    pub color: String,
    pub width: f64,
}

/// A freehand line and its two endpoint circles, moved and deleted as one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeGroup {
    pub path: Vec<PathCommand>,
    pub color: String,
    pub width: f64,
    pub start: EndpointMarker,
    pub end: EndpointMarker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointMarker {
    pub center: Point,
    pub radius: f64,
    pub fill: String,
}

/// Tappable hotspot carrying a tooltip payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoMarker {
    pub position: Point,
    pub radius: f64,
    pub fill: String,
    pub label: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Presentation-only magnification for touch screens.
    #[serde(skip, default = "unit_scale")]
    pub display_scale: f64,
    #[serde(skip)]
    pub mobile_scaled: bool,
}

fn unit_scale() -> f64 {
    1.0
}

/// What a tooltip shows. An empty description is omitted, not rendered blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooltipContent {
    pub title: String,
    pub description: Option<String>,
}

impl AnnotationDocument {
    pub fn new(image: ImageSize, base: BaseSpace, scene: SceneData) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            image,
            base: Some(base),
            scene,
        }
    }

    /// Read the host field. `""`, `"null"` and a missing field all mean
    /// "no document".
    pub fn from_field(raw: Option<&str>) -> Result<Option<Self>, TopoError> {
        match raw.map(str::trim) {
            None | Some("") | Some(ABSENT_FIELD) => Ok(None),
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
        }
    }

    pub fn to_field(doc: Option<&Self>) -> String {
        match doc {
            None => ABSENT_FIELD.to_string(),
            Some(doc) => match serde_json::to_string(doc) {
                Ok(json) => json,
                Err(e) => {
                    log::error!("Failed to serialize topo document: {}", e);
                    ABSENT_FIELD.to_string()
                }
            },
        }
    }
}

impl SceneObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            SceneObject::Stroke(_) => ObjectKind::Stroke,
            SceneObject::StrokeGroup(_) => ObjectKind::StrokeGroup,
            SceneObject::InfoMarker(_) => ObjectKind::InfoMarker,
        }
    }

    pub fn as_info_marker(&self) -> Option<&InfoMarker> {
        match self {
            SceneObject::InfoMarker(marker) => Some(marker),
            _ => None,
        }
    }

    pub fn as_info_marker_mut(&mut self) -> Option<&mut InfoMarker> {
        match self {
            SceneObject::InfoMarker(marker) => Some(marker),
            _ => None,
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        match self {
            SceneObject::Stroke(stroke) => {
                stroke.path = stroke.path.iter().map(|c| c.translated(dx, dy)).collect();
            }
            SceneObject::StrokeGroup(group) => {
                group.path = group.path.iter().map(|c| c.translated(dx, dy)).collect();
                group.start.center = group.start.center.offset(dx, dy);
                group.end.center = group.end.center.offset(dx, dy);
            }
            SceneObject::InfoMarker(marker) => {
                marker.position = marker.position.offset(dx, dy);
            }
        }
    }
}

impl FreehandStroke {
    pub fn new(path: Vec<PathCommand>, style: &StrokeStyle) -> Self {
        Self {
            path,
            color: style.color.clone(),
            width: style.width,
        }
    }
}

impl StrokeGroup {
    /// Group a finished stroke with circles on both ends. `None` for an
    /// empty path.
    pub fn from_stroke(stroke: FreehandStroke, style: &StrokeStyle) -> Option<Self> {
        let start = first_point_of_path(&stroke.path)?;
        let end = last_point_of_path(&stroke.path)?;
        let endpoint = |center| EndpointMarker {
            center,
            radius: style.endpoint_radius,
            fill: style.endpoint_fill.clone(),
        };
        Some(Self {
            start: endpoint(start),
            end: endpoint(end),
            path: stroke.path,
            color: stroke.color,
            width: stroke.width,
        })
    }
}

impl InfoMarker {
    /// A fresh, unconfirmed marker with an empty payload.
    pub fn pending(position: Point, style: &MarkerStyle) -> Self {
        Self {
            position,
            radius: style.radius,
            fill: style.fill.clone(),
            label: style.label.clone(),
            title: String::new(),
            description: String::new(),
            display_scale: 1.0,
            mobile_scaled: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.description.trim().is_empty()
    }

    pub fn effective_radius(&self) -> f64 {
        self.radius * self.display_scale
    }

    pub fn tooltip(&self) -> TooltipContent {
        let description = self.description.trim();
        TooltipContent {
            title: self.title.trim().to_string(),
            description: if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> AnnotationDocument {
        let style = StrokeStyle::default();
        let stroke = FreehandStroke::new(
            vec![
                PathCommand::MoveTo { x: 100.0, y: 100.0 },
                PathCommand::LineTo { x: 300.0, y: 100.0 },
            ],
            &style,
        );
        let mut marker = InfoMarker::pending(Point::new(50.0, 60.0), &MarkerStyle::default());
        marker.title = "Crux".to_string();
        AnnotationDocument::new(
            ImageSize { width: 4000, height: 3000 },
            BaseSpace { width: 2000, height: 1500, scale: 0.5 },
            SceneData {
                objects: vec![
                    SceneObject::StrokeGroup(StrokeGroup::from_stroke(stroke, &style).unwrap()),
                    SceneObject::InfoMarker(marker),
                ],
            },
        )
    }

    #[test]
    fn test_absent_field_values() {
        assert_eq!(AnnotationDocument::from_field(None), Ok(None));
        assert_eq!(AnnotationDocument::from_field(Some("")), Ok(None));
        assert_eq!(AnnotationDocument::from_field(Some("null")), Ok(None));
        assert_eq!(AnnotationDocument::to_field(None), "null");
    }

    #[test]
    fn test_field_round_trip() {
        let doc = sample_document();
        let field = AnnotationDocument::to_field(Some(&doc));
        assert_eq!(AnnotationDocument::from_field(Some(field.as_str())), Ok(Some(doc)));
    }

    #[test]
    fn test_wire_shape() {
        let field = AnnotationDocument::to_field(Some(&sample_document()));
        let value: serde_json::Value = serde_json::from_str(&field).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["image"]["width"], 4000);
        assert_eq!(value["base"]["scale"], 0.5);
        assert_eq!(value["fabric"]["objects"][0]["type"], "stroke_group");
        assert_eq!(value["fabric"]["objects"][0]["path"][0]["op"], "M");
        assert_eq!(value["fabric"]["objects"][1]["type"], "info_marker");
        assert_eq!(value["fabric"]["objects"][1]["title"], "Crux");
        assert!(value["fabric"]["objects"][1].get("display_scale").is_none());
    }

    #[test]
    fn test_legacy_document_without_base() {
        let raw = r#"{"version":1,"image":{"width":640,"height":480},"scene":{"objects":[]}}"#;
        let doc = AnnotationDocument::from_field(Some(raw)).unwrap().unwrap();
        assert_eq!(doc.base, None);
        assert!(doc.scene.objects.is_empty());
    }

    #[test]
    fn test_corrupt_field_is_reported() {
        let err = AnnotationDocument::from_field(Some("{\"version\": 1, \"image\":")).unwrap_err();
        assert!(matches!(err, TopoError::DocumentCorrupt(_)));
    }

    #[test]
    fn test_stroke_group_endpoints() {
        let doc = sample_document();
        match &doc.scene.objects[0] {
            SceneObject::StrokeGroup(group) => {
                assert_eq!(group.start.center, Point::new(100.0, 100.0));
                assert_eq!(group.end.center, Point::new(300.0, 100.0));
            }
            other => panic!("unexpected object {:?}", other),
        }
    }

    #[test]
    fn test_title_only_tooltip() {
        let mut marker = InfoMarker::pending(Point::ZERO, &MarkerStyle::default());
        marker.title = "Crux".to_string();
        let tooltip = marker.tooltip();
        assert_eq!(tooltip.title, "Crux");
        assert_eq!(tooltip.description, None);

        marker.description = "  Hard move left  ".to_string();
        assert_eq!(marker.tooltip().description.as_deref(), Some("Hard move left"));
    }

    #[test]
    fn test_translate_group_moves_markers() {
        let mut doc = sample_document();
        doc.scene.objects[0].translate(10.0, -5.0);
        match &doc.scene.objects[0] {
            SceneObject::StrokeGroup(group) => {
                assert_eq!(group.start.center, Point::new(110.0, 95.0));
                assert_eq!(group.end.center, Point::new(310.0, 95.0));
                assert_eq!(group.path[1].end_point(), Point::new(310.0, 95.0));
            }
            other => panic!("unexpected object {:?}", other),
        }
    }
}
