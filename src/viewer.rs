// src/viewer.rs
//
// Read-only topo display. Gesture math runs in canvas-pixel space, through a
// `ScreenMapping` the component rebuilds from the live element rect on every
// event.

use crate::access::{AccessPolicy, TopoAction};
use crate::annotation::{AnnotationDocument, BaseSpace, DecodedImage, TooltipContent};
use crate::config::TopoConfig;
use crate::error::TopoError;
use crate::geometry::{base_space_for, Point, ScreenMapping, ViewportTransform};
use crate::scene::{Background, InteractionMode, ObjectId, Scene};

/// Wheel delta is turned into a zoom factor of `WHEEL_BASE ^ delta_y`.
const WHEEL_BASE: f64 = 0.999;

/// `WheelEvent.deltaMode` values.
pub const DELTA_PIXEL: u32 = 0;
pub const DELTA_LINE: u32 = 1;
pub const DELTA_PAGE: u32 = 2;

/// Pixels per wheel "line"; three lines (one Firefox notch) match a
/// typical 100px pixel-mode notch.
const LINE_HEIGHT_PX: f64 = 100.0 / 3.0;

/// Normalise a wheel delta to pixels. Page deltas scroll one `page_height`.
pub fn wheel_delta_pixels(delta: f64, delta_mode: u32, page_height: f64) -> f64 {
    match delta_mode {
        DELTA_LINE => delta * LINE_HEIGHT_PX,
        DELTA_PAGE => delta * page_height,
        _ => delta,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerKind {
    /// Small inline preview: no pan or zoom, a click opens the lightbox.
    Thumbnail,
    Lightbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TooltipState {
    Idle,
    Hover(ObjectId),
    Pinned(ObjectId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub marker: ObjectId,
    pub content: TooltipContent,
    pub pinned: bool,
}

/// Result of a press/release pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerClick {
    None,
    TooltipChanged,
    /// Thumbnail was clicked; the host should open the lightbox.
    Activate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub objects: usize,
    pub degraded: bool,
    pub recomputed_base: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    Pressed { start: Point, last: Point, moved: bool },
    Pinching { distance: f64, centroid: Point },
}

pub struct ViewerCore {
    kind: ViewerKind,
    config: TopoConfig,
    access: Box<dyn AccessPolicy>,
    scene: Scene,
    viewport: ViewportTransform,
    tooltip: TooltipState,
    gesture: Gesture,
    mobile: bool,
}

impl ViewerCore {
    pub fn new(kind: ViewerKind, config: TopoConfig, access: Box<dyn AccessPolicy>) -> Self {
        Self {
            kind,
            config,
            access,
            scene: Scene::new(InteractionMode::ReadOnly),
            viewport: ViewportTransform::default(),
            tooltip: TooltipState::Idle,
            gesture: Gesture::Idle,
            mobile: false,
        }
    }

    /// Show `image` with the document in `field` on top. A document that
    /// fails to parse is logged and skipped: the photo still shows.
    pub fn load(&mut self, image: DecodedImage, field: &str) -> Result<LoadReport, TopoError> {
        if !self.access.allows(TopoAction::View) {
            return Err(TopoError::CapabilityDenied(TopoAction::View));
        }
        image.ensure_valid()?;

        let (doc, degraded) = match AnnotationDocument::from_field(Some(field)) {
            Ok(doc) => (doc, false),
            Err(e) => {
                log::warn!("Showing topo without annotations: {}", e);
                (None, true)
            }
        };
        let stored: Option<BaseSpace> = doc.as_ref().and_then(|d| d.base);
        let recomputed_base = stored.is_none();
        let base = match stored {
            Some(base) => base,
            None => {
                if doc.is_some() {
                    log::warn!("Topo document has no base block, recomputing from the image");
                }
                base_space_for(image.natural, self.config.max_dimension)?
            }
        };

        self.scene.reset(Some(Background {
            url: image.url,
            image: image.natural,
            base,
        }));
        if let Some(doc) = &doc {
            self.scene.load_document(&doc.scene);
        }
        self.scene.set_interaction_mode(InteractionMode::ReadOnly);
        self.scene
            .set_marker_display_scale(self.mobile, self.config.mobile_marker_scale);
        self.viewport.reset();
        self.tooltip = TooltipState::Idle;
        self.gesture = Gesture::Idle;

        Ok(LoadReport {
            objects: self.scene.len(),
            degraded,
            recomputed_base,
        })
    }

    pub fn kind(&self) -> ViewerKind {
        self.kind
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn viewport(&self) -> &ViewportTransform {
        &self.viewport
    }

    pub fn base(&self) -> Option<BaseSpace> {
        self.scene.background().map(|bg| bg.base)
    }

    pub fn is_mobile(&self) -> bool {
        self.mobile
    }

    pub fn is_panning(&self) -> bool {
        matches!(self.gesture, Gesture::Pressed { moved: true, .. })
    }

    fn zoomable(&self) -> bool {
        self.kind == ViewerKind::Lightbox && self.scene.background().is_some()
    }

    /// Apply the mobile breakpoint. Returns whether a redraw is needed.
    pub fn set_viewport_width(&mut self, css_width: f64) -> bool {
        let mobile = css_width < self.config.mobile_breakpoint;
        let changed = mobile != self.mobile;
        self.mobile = mobile;
        let rescaled = self
            .scene
            .set_marker_display_scale(mobile, self.config.mobile_marker_scale);
        changed || rescaled > 0
    }

    pub fn wheel(&mut self, client: Point, delta_y: f64, mapping: &ScreenMapping) -> bool {
        if !self.zoomable() {
            return false;
        }
        let anchor = mapping.screen_to_canvas(client);
        self.zoom_to(anchor, self.viewport.zoom * WHEEL_BASE.powf(delta_y))
    }

    /// Zoom around the centre of the canvas (buttons and keyboard).
    pub fn zoom_by(&mut self, factor: f64) -> bool {
        if !self.zoomable() {
            return false;
        }
        let Some(base) = self.base() else {
            return false;
        };
        let center = Point::new(base.width as f64 / 2.0, base.height as f64 / 2.0);
        self.zoom_to(center, self.viewport.zoom * factor)
    }

    pub fn reset_view(&mut self) -> bool {
        if self.viewport.is_identity() {
            return false;
        }
        self.viewport.reset();
        true
    }

    pub fn double_click(&mut self) -> bool {
        self.kind == ViewerKind::Lightbox && self.reset_view()
    }

    pub fn pointer_down(&mut self, client: Point, mapping: &ScreenMapping) {
        if matches!(self.gesture, Gesture::Pinching { .. }) {
            return;
        }
        let canvas = mapping.screen_to_canvas(client);
        self.gesture = Gesture::Pressed {
            start: canvas,
            last: canvas,
            moved: false,
        };
    }

    /// Pan while pressed, otherwise update hover. `hover_capable` is false
    /// for touch pointers. Returns whether a redraw is needed.
    pub fn pointer_move(&mut self, client: Point, mapping: &ScreenMapping, hover_capable: bool) -> bool {
        let canvas = mapping.screen_to_canvas(client);
        let slop = mapping.css_to_canvas_len(self.config.click_slop);
        let zoomable = self.zoomable();
        match &mut self.gesture {
            Gesture::Pressed { start, last, moved } => {
                if !*moved && start.distance(canvas) <= slop {
                    return false;
                }
                *moved = true;
                if !zoomable {
                    return false;
                }
                let (dx, dy) = (canvas.x - last.x, canvas.y - last.y);
                *last = canvas;
                self.viewport.pan_by(dx, dy);
                self.constrain();
                true
            }
            Gesture::Pinching { .. } => false,
            Gesture::Idle => {
                if !hover_capable || matches!(self.tooltip, TooltipState::Pinned(_)) {
                    return false;
                }
                let next = match self.marker_at(canvas, mapping) {
                    Some(id) => TooltipState::Hover(id),
                    None => TooltipState::Idle,
                };
                self.set_tooltip(next)
            }
        }
    }

    pub fn pointer_up(&mut self, client: Point, mapping: &ScreenMapping) -> ViewerClick {
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        match gesture {
            Gesture::Pressed { moved: false, .. } => self.click(mapping.screen_to_canvas(client), mapping),
            _ => ViewerClick::None,
        }
    }

    /// Pointer left the canvas: end any pan and drop a hover tooltip.
    pub fn pointer_leave(&mut self) -> bool {
        if matches!(self.gesture, Gesture::Pressed { .. }) {
            self.gesture = Gesture::Idle;
        }
        match self.tooltip {
            TooltipState::Hover(_) => self.set_tooltip(TooltipState::Idle),
            _ => false,
        }
    }

    pub fn pinch_start(&mut self, a: Point, b: Point, mapping: &ScreenMapping) {
        if !self.zoomable() {
            return;
        }
        let (a, b) = (mapping.screen_to_canvas(a), mapping.screen_to_canvas(b));
        self.gesture = Gesture::Pinching {
            distance: a.distance(b),
            centroid: a.midpoint(b),
        };
    }

    /// Zoom by the change in finger distance around the pinch centroid, and
    /// pan by the centroid's movement.
    pub fn pinch_move(&mut self, a: Point, b: Point, mapping: &ScreenMapping) -> bool {
        let Gesture::Pinching { distance, centroid } = self.gesture else {
            return false;
        };
        let (a, b) = (mapping.screen_to_canvas(a), mapping.screen_to_canvas(b));
        let (new_distance, new_centroid) = (a.distance(b), a.midpoint(b));
        self.viewport
            .pan_by(new_centroid.x - centroid.x, new_centroid.y - centroid.y);
        if distance > 0.0 && new_distance > 0.0 {
            let zoom = self
                .config
                .clamp_zoom(self.viewport.zoom * new_distance / distance);
            self.viewport.zoom_at(new_centroid, zoom);
        }
        self.constrain();
        self.gesture = Gesture::Pinching {
            distance: new_distance,
            centroid: new_centroid,
        };
        true
    }

    pub fn pinch_end(&mut self) {
        if matches!(self.gesture, Gesture::Pinching { .. }) {
            self.gesture = Gesture::Idle;
        }
    }

    pub fn tooltip_state(&self) -> TooltipState {
        self.tooltip
    }

    pub fn tooltip(&self) -> Option<Tooltip> {
        let (marker, pinned) = match self.tooltip {
            TooltipState::Idle => return None,
            TooltipState::Hover(id) => (id, false),
            TooltipState::Pinned(id) => (id, true),
        };
        let content = self.scene.get(marker)?.object.as_info_marker()?.tooltip();
        Some(Tooltip {
            marker,
            content,
            pinned,
        })
    }

    /// Where the active tooltip's marker currently sits, in CSS pixels
    /// relative to the canvas corner. Re-evaluated for every frame.
    pub fn tooltip_anchor(&self, mapping: &ScreenMapping) -> Option<Point> {
        let id = match self.tooltip {
            TooltipState::Idle => return None,
            TooltipState::Hover(id) | TooltipState::Pinned(id) => id,
        };
        let marker = self.scene.get(id)?.object.as_info_marker()?;
        let top = marker
            .position
            .offset(0.0, -marker.effective_radius());
        Some(mapping.canvas_to_local(self.viewport.apply(top)))
    }

    pub fn dismiss_tooltip(&mut self) -> bool {
        self.set_tooltip(TooltipState::Idle)
    }

    fn click(&mut self, canvas: Point, mapping: &ScreenMapping) -> ViewerClick {
        if self.kind == ViewerKind::Thumbnail {
            return ViewerClick::Activate;
        }
        let next = match (self.marker_at(canvas, mapping), self.tooltip) {
            (Some(hit), TooltipState::Pinned(pinned)) if hit == pinned => TooltipState::Idle,
            (Some(hit), _) => TooltipState::Pinned(hit),
            (None, _) => TooltipState::Idle,
        };
        if self.set_tooltip(next) {
            ViewerClick::TooltipChanged
        } else {
            ViewerClick::None
        }
    }

    fn marker_at(&self, canvas: Point, mapping: &ScreenMapping) -> Option<ObjectId> {
        let tolerance = mapping.css_to_canvas_len(self.config.hit_tolerance(self.mobile))
            / self.viewport.zoom;
        self.scene
            .hit_test_info_marker(self.viewport.invert(canvas), tolerance)
    }

    fn zoom_to(&mut self, anchor: Point, zoom: f64) -> bool {
        let zoom = self.config.clamp_zoom(zoom);
        let before = self.viewport;
        self.viewport.zoom_at(anchor, zoom);
        self.constrain();
        self.viewport != before
    }

    fn constrain(&mut self) {
        if let Some(base) = self.base() {
            self.viewport
                .constrain(base.width as f64, base.height as f64);
        }
    }

    fn set_tooltip(&mut self, next: TooltipState) -> bool {
        if self.tooltip == next {
            return false;
        }
        self.tooltip = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ImageSize, ObjectKind};
    use crate::editor::{EditorCore, PointerOutcome, Tool};
    use crate::geometry::{base_point_to_screen_point, ScreenRect};

    fn allow_all() -> Box<dyn AccessPolicy> {
        Box::new(|_: TopoAction| true)
    }

    fn photo() -> DecodedImage {
        DecodedImage {
            url: "https://example.test/topo.jpg".to_string(),
            natural: ImageSize { width: 4000, height: 3000 },
        }
    }

    /// A 2000x1500 base document with one stroke (100,100)→(300,100) and an
    /// info marker titled "Crux" at (1000, 750).
    fn authored_field() -> String {
        let mut editor = EditorCore::new(TopoConfig::default(), allow_all());
        editor.ingest_image(photo()).unwrap();
        editor.pointer_down(Point::new(100.0, 100.0), 2.0).unwrap();
        editor.pointer_move(Point::new(200.0, 100.0));
        editor.pointer_up(Point::new(300.0, 100.0)).unwrap();
        editor.set_tool(Tool::Info);
        assert!(matches!(
            editor.pointer_down(Point::new(1000.0, 750.0), 2.0).unwrap(),
            PointerOutcome::ModalOpened(_)
        ));
        editor.update_draft(Some("Crux".to_string()), Some(String::new()));
        editor.save_marker().unwrap();
        editor.persisted_field().to_string()
    }

    fn mapping(width: f64) -> ScreenMapping {
        let rect = ScreenRect {
            left: 20.0,
            top: 40.0,
            width,
            height: width * 0.75,
        };
        ScreenMapping::new(rect, 2000.0, 1500.0)
    }

    fn lightbox() -> ViewerCore {
        let mut viewer = ViewerCore::new(ViewerKind::Lightbox, TopoConfig::default(), allow_all());
        viewer.load(photo(), &authored_field()).unwrap();
        viewer
    }

    fn marker_id(viewer: &ViewerCore) -> ObjectId {
        viewer
            .scene()
            .objects()
            .find(|e| e.object.kind() == ObjectKind::InfoMarker)
            .map(|e| e.id)
            .unwrap()
    }

    /// Client position of the marker at base (1000, 750) for `mapping(500)`.
    fn marker_client() -> Point {
        Point::new(20.0 + 250.0, 40.0 + 187.5)
    }

    #[test]
    fn test_viewer_freezes_everything_but_markers() {
        let viewer = lightbox();
        assert_eq!(viewer.scene().len(), 2);
        for entry in viewer.scene().objects() {
            assert!(!entry.flags.movable && !entry.flags.selectable);
            assert_eq!(entry.flags.evented, entry.object.kind() == ObjectKind::InfoMarker);
        }
    }

    #[test]
    fn test_endpoints_project_proportionally_at_any_size() {
        let viewer = lightbox();
        assert_eq!(
            viewer.base(),
            Some(BaseSpace { width: 2000, height: 1500, scale: 0.5 })
        );
        let group = viewer
            .scene()
            .objects()
            .find_map(|e| match &e.object {
                crate::annotation::SceneObject::StrokeGroup(g) => Some(g.clone()),
                _ => None,
            })
            .unwrap();
        for width in [500.0, 1000.0, 320.0] {
            let m = mapping(width);
            let k = width / 2000.0;
            let start = base_point_to_screen_point(group.start.center, viewer.viewport(), &m);
            let end = base_point_to_screen_point(group.end.center, viewer.viewport(), &m);
            assert!((start.x - (20.0 + 100.0 * k)).abs() < 1e-9);
            assert!((end.x - (20.0 + 300.0 * k)).abs() < 1e-9);
            assert!((start.y - (40.0 + 100.0 * k)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_corrupt_document_still_shows_background() {
        let mut viewer = ViewerCore::new(ViewerKind::Lightbox, TopoConfig::default(), allow_all());
        let report = viewer.load(photo(), "{not json").unwrap();
        assert!(report.degraded);
        assert!(viewer.scene().is_empty());
        assert!(viewer.scene().background().is_some());
        assert_eq!(viewer.base().unwrap().width, 2000);
    }

    #[test]
    fn test_legacy_document_recomputes_base() {
        let mut viewer = ViewerCore::new(ViewerKind::Thumbnail, TopoConfig::default(), allow_all());
        let raw = r#"{"version":1,"image":{"width":4000,"height":3000},"fabric":{"objects":[]}}"#;
        let report = viewer.load(photo(), raw).unwrap();
        assert!(report.recomputed_base && !report.degraded);
        assert_eq!(
            viewer.base(),
            Some(BaseSpace { width: 2000, height: 1500, scale: 0.5 })
        );
    }

    #[test]
    fn test_view_capability_and_invalid_image() {
        let mut denied = ViewerCore::new(
            ViewerKind::Lightbox,
            TopoConfig::default(),
            Box::new(|_: TopoAction| false),
        );
        assert_eq!(
            denied.load(photo(), "null"),
            Err(TopoError::CapabilityDenied(TopoAction::View))
        );

        let mut viewer = ViewerCore::new(ViewerKind::Lightbox, TopoConfig::default(), allow_all());
        let broken = DecodedImage {
            url: "x".to_string(),
            natural: ImageSize { width: 0, height: 0 },
        };
        assert!(matches!(viewer.load(broken, "null"), Err(TopoError::InvalidImage(_))));
    }

    #[test]
    fn test_wheel_zoom_is_clamped_and_anchored() {
        let mut viewer = lightbox();
        let m = mapping(500.0);
        let cursor = Point::new(120.0, 90.0);
        let under_cursor = viewer.viewport().invert(m.screen_to_canvas(cursor));

        assert!(viewer.wheel(cursor, -300.0, &m));
        assert!(viewer.viewport().zoom > 1.0);
        let after = viewer.viewport().invert(m.screen_to_canvas(cursor));
        assert!(under_cursor.distance(after) < 1e-6);

        for _ in 0..50 {
            viewer.wheel(cursor, -500.0, &m);
        }
        assert_eq!(viewer.viewport().zoom, 6.0);
        for _ in 0..50 {
            viewer.wheel(cursor, 500.0, &m);
        }
        assert_eq!(viewer.viewport().zoom, 1.0);
        assert!(viewer.viewport().is_identity());
    }

    #[test]
    fn test_drag_pans_and_double_click_resets() {
        let mut viewer = lightbox();
        let m = mapping(500.0);
        viewer.zoom_by(2.0);
        let pan_before = viewer.viewport().pan;

        viewer.pointer_down(Point::new(200.0, 200.0), &m);
        assert!(viewer.pointer_move(Point::new(230.0, 210.0), &m, true));
        assert!(viewer.is_panning());
        assert_eq!(viewer.pointer_up(Point::new(230.0, 210.0), &m), ViewerClick::None);
        let pan_after = viewer.viewport().pan;
        // 30 css px at 4 canvas px per css px.
        assert!((pan_after.x - pan_before.x - 120.0).abs() < 1e-9);

        assert!(viewer.double_click());
        assert!(viewer.viewport().is_identity());
        assert!(!viewer.double_click());
    }

    #[test]
    fn test_tooltip_state_machine() {
        let mut viewer = lightbox();
        let m = mapping(500.0);
        let id = marker_id(&viewer);

        assert!(viewer.pointer_move(marker_client(), &m, true));
        assert_eq!(viewer.tooltip_state(), TooltipState::Hover(id));
        assert!(viewer.pointer_move(Point::new(30.0, 50.0), &m, true));
        assert_eq!(viewer.tooltip_state(), TooltipState::Idle);

        viewer.pointer_down(marker_client(), &m);
        assert_eq!(viewer.pointer_up(marker_client(), &m), ViewerClick::TooltipChanged);
        assert_eq!(viewer.tooltip_state(), TooltipState::Pinned(id));
        let tooltip = viewer.tooltip().unwrap();
        assert!(tooltip.pinned);
        assert_eq!(tooltip.content.title, "Crux");
        assert_eq!(tooltip.content.description, None);

        // Hover has no effect while pinned.
        assert!(!viewer.pointer_move(Point::new(30.0, 50.0), &m, true));
        assert_eq!(viewer.tooltip_state(), TooltipState::Pinned(id));

        // Clicking the pinned marker again unpins it.
        viewer.pointer_down(marker_client(), &m);
        viewer.pointer_up(marker_client(), &m);
        assert_eq!(viewer.tooltip_state(), TooltipState::Idle);

        // Clicking elsewhere unpins too.
        viewer.pointer_down(marker_client(), &m);
        viewer.pointer_up(marker_client(), &m);
        viewer.pointer_down(Point::new(30.0, 50.0), &m);
        viewer.pointer_up(Point::new(30.0, 50.0), &m);
        assert_eq!(viewer.tooltip_state(), TooltipState::Idle);
    }

    #[test]
    fn test_no_hover_for_touch_or_during_pan() {
        let mut viewer = lightbox();
        let m = mapping(500.0);
        assert!(!viewer.pointer_move(marker_client(), &m, false));
        assert_eq!(viewer.tooltip_state(), TooltipState::Idle);

        viewer.zoom_by(2.0);
        viewer.pointer_down(Point::new(100.0, 100.0), &m);
        viewer.pointer_move(Point::new(140.0, 100.0), &m, true);
        assert_eq!(viewer.tooltip_state(), TooltipState::Idle);
    }

    #[test]
    fn test_wheel_line_and_page_deltas_become_pixels() {
        assert_eq!(wheel_delta_pixels(-120.0, DELTA_PIXEL, 900.0), -120.0);
        assert!((wheel_delta_pixels(3.0, DELTA_LINE, 900.0) - 100.0).abs() < 1e-9);
        assert_eq!(wheel_delta_pixels(-1.0, DELTA_PAGE, 900.0), -900.0);

        // One Firefox notch zooms as much as one pixel-mode notch.
        let m = mapping(500.0);
        let mut by_lines = lightbox();
        let mut by_pixels = lightbox();
        by_lines.wheel(marker_client(), wheel_delta_pixels(-3.0, DELTA_LINE, 375.0), &m);
        by_pixels.wheel(marker_client(), -100.0, &m);
        assert!((by_lines.viewport().zoom - by_pixels.viewport().zoom).abs() < 1e-9);
        assert!(by_lines.viewport().zoom > 1.05);
    }

    #[test]
    fn test_letterboxed_lightbox_hits_marker() {
        let mut viewer = lightbox();
        let id = marker_id(&viewer);
        let rect = ScreenRect {
            left: 60.0,
            top: 80.0,
            width: 1800.0,
            height: 918.0,
        };
        let m = ScreenMapping::new(rect, 2000.0, 1500.0);
        let scale = 918.0 / 1500.0;
        let click = Point::new(60.0 + 288.0 + 1000.0 * scale, 80.0 + 750.0 * scale);

        viewer.pointer_down(click, &m);
        assert_eq!(viewer.pointer_up(click, &m), ViewerClick::TooltipChanged);
        assert_eq!(viewer.tooltip_state(), TooltipState::Pinned(id));

        // Anchor sits above the marker, inside the content area.
        let anchor = viewer.tooltip_anchor(&m).unwrap();
        assert!((anchor.x - (288.0 + 1000.0 * scale)).abs() < 1e-6);
        assert!(anchor.y < 750.0 * scale);
    }

    #[test]
    fn test_pinned_tooltip_follows_zoom() {
        let mut viewer = lightbox();
        let m = mapping(500.0);
        viewer.pointer_down(marker_client(), &m);
        viewer.pointer_up(marker_client(), &m);
        let before = viewer.tooltip_anchor(&m).unwrap();

        viewer.wheel(Point::new(40.0, 60.0), -400.0, &m);
        let after = viewer.tooltip_anchor(&m).unwrap();
        assert!(before.distance(after) > 1.0);

        let marker = viewer
            .scene()
            .get(marker_id(&viewer))
            .unwrap()
            .object
            .as_info_marker()
            .unwrap()
            .clone();
        let expected = m.canvas_to_local(
            viewer
                .viewport()
                .apply(marker.position.offset(0.0, -marker.effective_radius())),
        );
        assert!(after.distance(expected) < 1e-9);
    }

    #[test]
    fn test_pinch_zooms_around_centroid() {
        let mut viewer = lightbox();
        let m = mapping(500.0);
        let (a, b) = (Point::new(200.0, 200.0), Point::new(300.0, 200.0));
        viewer.pinch_start(a, b, &m);
        let centroid_base = viewer.viewport().invert(m.screen_to_canvas(a.midpoint(b)));

        assert!(viewer.pinch_move(Point::new(175.0, 200.0), Point::new(325.0, 200.0), &m));
        assert!((viewer.viewport().zoom - 1.5).abs() < 1e-9);
        let still = viewer.viewport().invert(m.screen_to_canvas(a.midpoint(b)));
        assert!(centroid_base.distance(still) < 1e-6);
        viewer.pinch_end();

        // Pinching in past the minimum clamps at identity.
        viewer.pinch_start(Point::new(100.0, 100.0), Point::new(400.0, 100.0), &m);
        viewer.pinch_move(Point::new(240.0, 100.0), Point::new(260.0, 100.0), &m);
        assert_eq!(viewer.viewport().zoom, 1.0);
    }

    #[test]
    fn test_thumbnail_does_not_zoom_and_activates_on_click() {
        let mut viewer = ViewerCore::new(ViewerKind::Thumbnail, TopoConfig::default(), allow_all());
        viewer.load(photo(), &authored_field()).unwrap();
        let m = mapping(300.0);
        assert!(!viewer.wheel(Point::new(50.0, 50.0), -300.0, &m));
        assert!(!viewer.zoom_by(2.0));
        viewer.pointer_down(Point::new(60.0, 60.0), &m);
        assert_eq!(viewer.pointer_up(Point::new(61.0, 60.0), &m), ViewerClick::Activate);
        assert!(viewer.viewport().is_identity());
    }

    #[test]
    fn test_mobile_breakpoint_scales_markers_once() {
        let mut viewer = lightbox();
        let id = marker_id(&viewer);
        let radius = |v: &ViewerCore| {
            v.scene().get(id).unwrap().object.as_info_marker().unwrap().effective_radius()
        };
        let desktop = radius(&viewer);

        assert!(viewer.set_viewport_width(400.0));
        assert!(viewer.is_mobile());
        assert_eq!(radius(&viewer), desktop * 2.0);
        assert!(!viewer.set_viewport_width(390.0));
        assert_eq!(radius(&viewer), desktop * 2.0);

        // Reloading on a phone keeps the scaling without compounding it.
        viewer.load(photo(), &authored_field()).unwrap();
        let id = marker_id(&viewer);
        assert_eq!(
            viewer.scene().get(id).unwrap().object.as_info_marker().unwrap().effective_radius(),
            desktop * 2.0
        );

        assert!(viewer.set_viewport_width(1280.0));
        assert_eq!(
            viewer.scene().get(id).unwrap().object.as_info_marker().unwrap().effective_radius(),
            desktop
        );
    }
}
