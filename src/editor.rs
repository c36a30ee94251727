// src/editor.rs
//
// Browser-independent editor state machine. The yew component feeds it
// base-space pointer positions and decoded images; everything it decides is
// observable through accessors so it can be tested natively.

use crate::access::{AccessPolicy, TopoAction};
use crate::annotation::{
    AnnotationDocument, DecodedImage, FreehandStroke, InfoMarker, SceneData, SceneObject,
};
use crate::config::TopoConfig;
use crate::error::TopoError;
use crate::geometry::{base_space_for, smooth_freehand, Point};
use crate::history::UndoHistory;
use crate::scene::{Background, InteractionMode, ObjectId, Scene};

/// Pointer samples closer than this (base px) to the previous one are dropped.
const MIN_SAMPLE_DISTANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Draw,
    Info,
}

impl Tool {
    pub fn interaction_mode(self) -> InteractionMode {
        match self {
            Tool::Draw => InteractionMode::Draw,
            Tool::Info => InteractionMode::Annotate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDraft {
    pub marker: ObjectId,
    pub is_new: bool,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerModal {
    Closed,
    Open(MarkerDraft),
}

/// A selected file waiting for the crop step.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingImage {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CropState {
    Idle,
    Cropping(PendingImage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropToolState {
    Unloaded,
    Loading,
    Ready,
    Unavailable,
}

/// What the host has to do next with a selected file.
#[derive(Debug, Clone, PartialEq)]
pub enum CropRequest {
    /// Start loading the crop tool; report back through `crop_tool_loaded`.
    LoadTool,
    /// A load is already in flight; its result will drive the next step.
    Wait,
    Show(PendingImage),
    /// No crop tool: ingest the original file as is.
    Fallback(PendingImage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOutcome {
    Ignored,
    StrokeStarted,
    DragStarted(ObjectId),
    ModalOpened(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    pub objects: usize,
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    id: ObjectId,
    last: Point,
    moved: bool,
}

pub struct EditorCore {
    config: TopoConfig,
    access: Box<dyn AccessPolicy>,
    scene: Scene,
    history: UndoHistory<SceneData>,
    tool: Tool,
    modal: MarkerModal,
    crop: CropState,
    crop_tool: CropToolState,
    stroke: Option<Vec<Point>>,
    drag: Option<DragState>,
    selected: Option<ObjectId>,
    field_value: String,
    revision: u64,
}

impl EditorCore {
    pub fn new(config: TopoConfig, access: Box<dyn AccessPolicy>) -> Self {
        let history = UndoHistory::new(SceneData::default(), config.history_limit);
        Self {
            config,
            access,
            scene: Scene::new(Tool::Draw.interaction_mode()),
            history,
            tool: Tool::Draw,
            modal: MarkerModal::Closed,
            crop: CropState::Idle,
            crop_tool: CropToolState::Unloaded,
            stroke: None,
            drag: None,
            selected: None,
            field_value: AnnotationDocument::to_field(None),
            revision: 0,
        }
    }

    /// Drop the session state for a new set of host props. Crop tool
    /// readiness survives since it is not tied to a document.
    pub fn reinitialize(&mut self, config: TopoConfig, access: Box<dyn AccessPolicy>) {
        let crop_tool = self.crop_tool;
        let revision = self.revision;
        *self = Self::new(config, access);
        self.crop_tool = crop_tool;
        self.revision = revision;
    }

    /// Re-open an existing topo. A corrupt document degrades to the
    /// background alone; the stored field is left untouched until the next
    /// mutation.
    pub fn restore(&mut self, image: DecodedImage, field: &str) -> Result<RestoreReport, TopoError> {
        self.require(TopoAction::View)?;
        image.ensure_valid()?;
        let (doc, degraded) = match AnnotationDocument::from_field(Some(field)) {
            Ok(doc) => (doc, false),
            Err(e) => {
                log::warn!("Editor starting without annotations: {}", e);
                (None, true)
            }
        };
        let base = match doc.as_ref().and_then(|d| d.base) {
            Some(base) => base,
            None => base_space_for(image.natural, self.config.max_dimension)?,
        };

        self.clear_transient();
        self.scene.reset(Some(Background {
            url: image.url,
            image: image.natural,
            base,
        }));
        if let Some(doc) = &doc {
            self.scene.load_document(&doc.scene);
        }
        self.history.clear_with(self.scene.to_document());
        self.field_value = field.to_string();
        self.revision += 1;
        Ok(RestoreReport {
            objects: self.scene.len(),
            degraded,
        })
    }

    pub fn select_file(&mut self, file: PendingImage) -> Result<CropRequest, TopoError> {
        self.require(TopoAction::Edit)?;
        self.crop = CropState::Cropping(file.clone());
        Ok(match self.crop_tool {
            CropToolState::Unloaded => {
                self.crop_tool = CropToolState::Loading;
                CropRequest::LoadTool
            }
            CropToolState::Loading => CropRequest::Wait,
            CropToolState::Ready => CropRequest::Show(file),
            CropToolState::Unavailable => CropRequest::Fallback(file),
        })
    }

    /// Result of a crop tool load. Returns the next step for a file that was
    /// waiting on it.
    pub fn crop_tool_loaded(&mut self, result: Result<(), TopoError>) -> Option<CropRequest> {
        self.crop_tool = match result {
            Ok(()) => CropToolState::Ready,
            Err(e) => {
                log::warn!("{}; using uncropped images", e);
                CropToolState::Unavailable
            }
        };
        match &self.crop {
            CropState::Cropping(file) if self.crop_tool == CropToolState::Ready => {
                Some(CropRequest::Show(file.clone()))
            }
            CropState::Cropping(file) => Some(CropRequest::Fallback(file.clone())),
            CropState::Idle => None,
        }
    }

    /// Leave the crop step, handing back the file that was being cropped.
    pub fn finish_crop(&mut self) -> Option<PendingImage> {
        match std::mem::replace(&mut self.crop, CropState::Idle) {
            CropState::Cropping(file) => Some(file),
            CropState::Idle => None,
        }
    }

    /// Make `image` the new background. The previous scene and its history
    /// are discarded: their coordinates belong to the old base space.
    pub fn ingest_image(&mut self, image: DecodedImage) -> Result<(), TopoError> {
        self.require(TopoAction::Edit)?;
        let base = base_space_for(image.natural, self.config.max_dimension)?;
        log::info!(
            "Ingesting {}x{} image as {}x{} base (scale {:.3})",
            image.natural.width,
            image.natural.height,
            base.width,
            base.height,
            base.scale
        );
        self.clear_transient();
        self.crop = CropState::Idle;
        self.scene.reset(Some(Background {
            url: image.url,
            image: image.natural,
            base,
        }));
        self.history.clear_with(self.scene.to_document());
        self.persist();
        Ok(())
    }

    pub fn set_tool(&mut self, tool: Tool) {
        if self.tool == tool {
            return;
        }
        self.cancel_marker();
        self.stroke = None;
        self.drag = None;
        self.selected = None;
        self.tool = tool;
        self.scene.set_interaction_mode(tool.interaction_mode());
    }

    /// Pointer pressed at `p` (base space). `tolerance` is in base units.
    pub fn pointer_down(&mut self, p: Point, tolerance: f64) -> Result<PointerOutcome, TopoError> {
        if !self.has_image() || self.modal_open() {
            return Ok(PointerOutcome::Ignored);
        }
        self.require(TopoAction::Edit)?;
        match self.tool {
            Tool::Draw => {
                let hit = self
                    .scene
                    .hit_test(p, tolerance)
                    .filter(|id| self.scene.get(*id).is_some_and(|e| e.flags.selectable));
                match hit {
                    Some(id) => {
                        self.selected = Some(id);
                        self.drag = Some(DragState {
                            id,
                            last: p,
                            moved: false,
                        });
                        Ok(PointerOutcome::DragStarted(id))
                    }
                    None => {
                        self.selected = None;
                        self.stroke = Some(vec![p]);
                        Ok(PointerOutcome::StrokeStarted)
                    }
                }
            }
            Tool::Info => {
                if let Some(id) = self.scene.hit_test_info_marker(p, tolerance) {
                    let marker = self.scene.get(id).and_then(|e| e.object.as_info_marker());
                    if let Some(marker) = marker {
                        self.modal = MarkerModal::Open(MarkerDraft {
                            marker: id,
                            is_new: false,
                            title: marker.title.clone(),
                            description: marker.description.clone(),
                        });
                        return Ok(PointerOutcome::ModalOpened(id));
                    }
                }
                let marker = InfoMarker::pending(p, &self.config.marker);
                let id = self.scene.add_object(SceneObject::InfoMarker(marker));
                self.modal = MarkerModal::Open(MarkerDraft {
                    marker: id,
                    is_new: true,
                    title: String::new(),
                    description: String::new(),
                });
                Ok(PointerOutcome::ModalOpened(id))
            }
        }
    }

    /// Returns whether anything visible changed.
    pub fn pointer_move(&mut self, p: Point) -> bool {
        if let Some(samples) = self.stroke.as_mut() {
            let far_enough = samples
                .last()
                .map_or(true, |last| last.distance(p) >= MIN_SAMPLE_DISTANCE);
            if far_enough {
                samples.push(p);
            }
            return far_enough;
        }
        if let Some(drag) = self.drag.as_mut() {
            let (dx, dy) = (p.x - drag.last.x, p.y - drag.last.y);
            if dx == 0.0 && dy == 0.0 {
                return false;
            }
            drag.last = p;
            drag.moved |= self.scene.translate_object(drag.id, dx, dy);
            return true;
        }
        false
    }

    /// Finish a stroke or a drag. Returns whether the scene was mutated.
    pub fn pointer_up(&mut self, p: Point) -> Result<bool, TopoError> {
        if let Some(mut samples) = self.stroke.take() {
            if samples
                .last()
                .map_or(true, |last| last.distance(p) >= MIN_SAMPLE_DISTANCE)
            {
                samples.push(p);
            }
            if samples.len() < 2 {
                return Ok(false);
            }
            self.require(TopoAction::Edit)?;
            let stroke = FreehandStroke::new(smooth_freehand(&samples), &self.config.stroke);
            let raw = self.scene.add_object(SceneObject::Stroke(stroke));
            self.selected = self.scene.promote_stroke(raw, &self.config.stroke);
            self.commit();
            return Ok(true);
        }
        if let Some(drag) = self.drag.take() {
            if drag.moved {
                self.commit();
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn delete_selected(&mut self) -> Result<bool, TopoError> {
        let Some(id) = self.selected else {
            return Ok(false);
        };
        self.require(TopoAction::Edit)?;
        self.selected = None;
        if self.scene.remove_object(id).is_none() {
            return Ok(false);
        }
        self.commit();
        Ok(true)
    }

    /// Remove every annotation, keeping the background.
    pub fn clear(&mut self) -> Result<bool, TopoError> {
        if self.scene.is_empty() {
            return Ok(false);
        }
        self.require(TopoAction::Edit)?;
        self.clear_transient();
        self.scene.clear_objects();
        self.commit();
        Ok(true)
    }

    pub fn update_draft(&mut self, title: Option<String>, description: Option<String>) {
        if let MarkerModal::Open(draft) = &mut self.modal {
            if let Some(title) = title {
                draft.title = title;
            }
            if let Some(description) = description {
                draft.description = description;
            }
        }
    }

    /// Write the draft onto its marker and close the modal. Saving a new
    /// marker with nothing in it discards the marker, like cancel.
    pub fn save_marker(&mut self) -> Result<bool, TopoError> {
        if !self.modal_open() {
            return Ok(false);
        }
        self.require(TopoAction::Edit)?;
        let MarkerModal::Open(draft) = std::mem::replace(&mut self.modal, MarkerModal::Closed)
        else {
            return Ok(false);
        };
        if draft.is_new && draft.title.trim().is_empty() && draft.description.trim().is_empty() {
            return Ok(self.scene.remove_object(draft.marker).is_some());
        }
        let marker = self
            .scene
            .get_mut(draft.marker)
            .and_then(|e| e.object.as_info_marker_mut());
        match marker {
            Some(marker) => {
                marker.title = draft.title.trim().to_string();
                marker.description = draft.description.trim().to_string();
                self.commit();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close the modal. A new marker that never got any content is removed.
    /// Returns whether the scene changed.
    pub fn cancel_marker(&mut self) -> bool {
        let MarkerModal::Open(draft) = std::mem::replace(&mut self.modal, MarkerModal::Closed)
        else {
            return false;
        };
        let empty = self
            .scene
            .get(draft.marker)
            .and_then(|e| e.object.as_info_marker())
            .is_some_and(InfoMarker::is_empty);
        if draft.is_new && empty {
            self.scene.remove_object(draft.marker);
            return true;
        }
        false
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.restore_snapshot(&snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.restore_snapshot(&snapshot);
                true
            }
            None => false,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn modal(&self) -> &MarkerModal {
        &self.modal
    }

    pub fn modal_open(&self) -> bool {
        matches!(self.modal, MarkerModal::Open(_))
    }

    pub fn crop_state(&self) -> &CropState {
        &self.crop
    }

    pub fn crop_tool_state(&self) -> CropToolState {
        self.crop_tool
    }

    pub fn has_image(&self) -> bool {
        self.scene.background().is_some()
    }

    pub fn selected(&self) -> Option<ObjectId> {
        self.selected
    }

    /// Raw samples of the stroke being drawn, for live preview.
    pub fn stroke_preview(&self) -> Option<&[Point]> {
        self.stroke.as_deref()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn document(&self) -> Option<AnnotationDocument> {
        self.scene.annotation_document()
    }

    /// Current value of the host's hidden document field.
    pub fn persisted_field(&self) -> &str {
        &self.field_value
    }

    /// Bumped every time the persisted field is rewritten.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn config(&self) -> &TopoConfig {
        &self.config
    }

    fn require(&self, action: TopoAction) -> Result<(), TopoError> {
        if self.access.allows(action) {
            Ok(())
        } else {
            Err(TopoError::CapabilityDenied(action))
        }
    }

    fn restore_snapshot(&mut self, snapshot: &SceneData) {
        self.clear_transient();
        self.scene.load_document(snapshot);
        self.persist();
    }

    fn clear_transient(&mut self) {
        self.modal = MarkerModal::Closed;
        self.stroke = None;
        self.drag = None;
        self.selected = None;
    }

    fn commit(&mut self) {
        self.history.push_snapshot(self.scene.to_document());
        self.persist();
    }

    fn persist(&mut self) {
        self.field_value = AnnotationDocument::to_field(self.scene.annotation_document().as_ref());
        self.revision += 1;
    }
}
