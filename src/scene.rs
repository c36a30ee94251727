// src/scene.rs
use crate::annotation::{
    AnnotationDocument, BaseSpace, ImageSize, ObjectKind, SceneData, SceneObject, StrokeGroup,
};
use crate::config::StrokeStyle;
use crate::geometry::{distance_to_polyline, flatten_path, PathCommand, Point};

pub type ObjectId = u64;

/// Curve sampling used for stroke hit-testing.
const HIT_CURVE_STEPS: usize = 8;

/// How objects respond to the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    /// Editor, draw tool: everything can be selected and dragged.
    Draw,
    /// Editor, info tool: nothing moves, info markers stay clickable.
    Annotate,
    /// Viewer: frozen except info markers, which stay clickable for tooltips.
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interactivity {
    pub selectable: bool,
    pub movable: bool,
    /// Receives clicks / hover at all.
    pub evented: bool,
}

impl InteractionMode {
    pub fn flags_for(self, kind: ObjectKind) -> Interactivity {
        match (self, kind) {
            (InteractionMode::Draw, _) => Interactivity {
                selectable: true,
                movable: true,
                evented: true,
            },
            (_, ObjectKind::InfoMarker) => Interactivity {
                selectable: false,
                movable: false,
                evented: true,
            },
            _ => Interactivity::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneEntry {
    pub id: ObjectId,
    pub object: SceneObject,
    pub flags: Interactivity,
}

/// The background layer. Never part of the serialized scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub url: String,
    pub image: ImageSize,
    pub base: BaseSpace,
}

/// Mutable, serializable object collection shared by editor and viewer.
#[derive(Debug, Clone)]
pub struct Scene {
    entries: Vec<SceneEntry>,
    next_id: ObjectId,
    mode: InteractionMode,
    background: Option<Background>,
}

impl Scene {
    pub fn new(mode: InteractionMode) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            mode,
            background: None,
        }
    }

    pub fn add_object(&mut self, object: SceneObject) -> ObjectId {
        let id = self.allocate_id();
        let flags = self.mode.flags_for(object.kind());
        self.entries.push(SceneEntry { id, object, flags });
        id
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<SceneObject> {
        let index = self.index_of(id)?;
        Some(self.entries.remove(index).object)
    }

    /// Objects in insertion (z) order, bottom first.
    pub fn objects(&self) -> impl Iterator<Item = &SceneEntry> + '_ {
        self.entries.iter()
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_kind(&self, kind: ObjectKind) -> usize {
        self.entries.iter().filter(|e| e.object.kind() == kind).count()
    }

    /// Remove every object, keeping the background.
    pub fn clear_objects(&mut self) {
        self.entries.clear();
    }

    /// Drop the whole scene and start over on a new background.
    pub fn reset(&mut self, background: Option<Background>) {
        self.entries.clear();
        self.background = background;
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    pub fn set_background(&mut self, background: Background) {
        self.background = Some(background);
    }

    pub fn to_document(&self) -> SceneData {
        SceneData {
            objects: self.entries.iter().map(|e| e.object.clone()).collect(),
        }
    }

    /// Replace all objects with the serialized ones. The background is left
    /// alone since it is never part of `SceneData`.
    pub fn load_document(&mut self, data: &SceneData) {
        self.entries.clear();
        for object in &data.objects {
            self.add_object(object.clone());
        }
    }

    /// Full persisted document, if there is a background to anchor it.
    pub fn annotation_document(&self) -> Option<AnnotationDocument> {
        self.background
            .as_ref()
            .map(|bg| AnnotationDocument::new(bg.image, bg.base, self.to_document()))
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn set_interaction_mode(&mut self, mode: InteractionMode) {
        self.mode = mode;
        for entry in &mut self.entries {
            entry.flags = mode.flags_for(entry.object.kind());
        }
    }

    /// Swap a bare stroke for a `StrokeGroup` in the same z position.
    /// Empty strokes are removed. Returns the id of the group.
    pub fn promote_stroke(&mut self, id: ObjectId, style: &StrokeStyle) -> Option<ObjectId> {
        let index = self.index_of(id)?;
        let stroke = match &self.entries[index].object {
            SceneObject::Stroke(stroke) => stroke.clone(),
            _ => return None,
        };
        match StrokeGroup::from_stroke(stroke, style) {
            Some(group) => {
                let object = SceneObject::StrokeGroup(group);
                let new_id = self.allocate_id();
                self.entries[index] = SceneEntry {
                    id: new_id,
                    flags: self.mode.flags_for(object.kind()),
                    object,
                };
                Some(new_id)
            }
            None => {
                self.entries.remove(index);
                None
            }
        }
    }

    pub fn translate_object(&mut self, id: ObjectId, dx: f64, dy: f64) -> bool {
        match self.get_mut(id) {
            Some(entry) if entry.flags.movable => {
                entry.object.translate(dx, dy);
                true
            }
            _ => false,
        }
    }

    /// Topmost evented object under `point` (base space). `tolerance` is in
    /// base units.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> Option<ObjectId> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.flags.evented)
            .find(|e| hits(&e.object, point, tolerance))
            .map(|e| e.id)
    }

    pub fn hit_test_info_marker(&self, point: Point, tolerance: f64) -> Option<ObjectId> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.flags.evented && e.object.kind() == ObjectKind::InfoMarker)
            .find(|e| hits(&e.object, point, tolerance))
            .map(|e| e.id)
    }

    /// Apply or undo the touch-screen magnification of info markers. Safe to
    /// call repeatedly; returns how many markers changed.
    pub fn set_marker_display_scale(&mut self, mobile: bool, factor: f64) -> usize {
        let mut changed = 0;
        for entry in &mut self.entries {
            if let Some(marker) = entry.object.as_info_marker_mut() {
                if marker.mobile_scaled != mobile {
                    marker.mobile_scaled = mobile;
                    marker.display_scale = if mobile { factor } else { 1.0 };
                    changed += 1;
                }
            }
        }
        changed
    }

    fn allocate_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: ObjectId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

fn path_hit(path: &[PathCommand], width: f64, point: Point, tolerance: f64) -> bool {
    distance_to_polyline(point, &flatten_path(path, HIT_CURVE_STEPS)) <= tolerance + width / 2.0
}

fn hits(object: &SceneObject, point: Point, tolerance: f64) -> bool {
    match object {
        SceneObject::Stroke(stroke) => path_hit(&stroke.path, stroke.width, point, tolerance),
        SceneObject::StrokeGroup(group) => {
            path_hit(&group.path, group.width, point, tolerance)
                || point.distance(group.start.center) <= group.start.radius + tolerance
                || point.distance(group.end.center) <= group.end.radius + tolerance
        }
        SceneObject::InfoMarker(marker) => {
            point.distance(marker.position) <= marker.effective_radius() + tolerance
        }
    }
}
