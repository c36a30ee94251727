// src/geometry.rs
//
// Coordinate spaces used throughout the crate:
// - image space: natural pixels of the uploaded photo
// - base space: the capped working canvas every scene object is stored in
// - canvas space: pixels of a canvas buffer, i.e. base space after the
//   viewer's zoom/pan transform
// - screen space: CSS pixels as reported by pointer events

use crate::annotation::{BaseSpace, ImageSize};
use crate::error::TopoError;
use serde::{Deserialize, Serialize};

/// Crop selections smaller than this (image px) are treated as "no selection".
const MIN_CROP_SIDE: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn offset(self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    pub fn scale(self, k: f64) -> Point {
        Point::new(self.x * k, self.y * k)
    }
}

/// `min(1, max/w, max/h)`: the factor that fits an image inside a square of
/// `max_dim` without ever upscaling.
pub fn scale_for_max_dimension(natural_w: f64, natural_h: f64, max_dim: f64) -> f64 {
    1f64.min(max_dim / natural_w).min(max_dim / natural_h)
}

/// Working coordinate system for an image of the given natural size.
pub fn base_space_for(image: ImageSize, max_dim: u32) -> Result<BaseSpace, TopoError> {
    if image.width == 0 || image.height == 0 {
        return Err(TopoError::InvalidImage(format!(
            "image reports {}x{} pixels",
            image.width, image.height
        )));
    }
    let scale = scale_for_max_dimension(image.width as f64, image.height as f64, max_dim as f64);
    Ok(BaseSpace {
        width: scaled_side(image.width, scale, max_dim),
        height: scaled_side(image.height, scale, max_dim),
        scale,
    })
}

fn scaled_side(side: u32, scale: f64, max_dim: u32) -> u32 {
    ((side as f64 * scale).round() as u32).clamp(1, max_dim.max(1))
}

pub fn image_point_to_base_point(p: Point, base: &BaseSpace) -> Point {
    p.scale(base.scale)
}

pub fn base_point_to_image_point(p: Point, base: &BaseSpace) -> Point {
    p.scale(1.0 / base.scale)
}

/// Client rectangle of a canvas element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Live mapping between a canvas element's on-screen rectangle and its
/// internal pixel buffer. Rebuilt from a fresh rect for every gesture, since
/// the CSS size changes independently of the buffer across breakpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenMapping {
    rect: ScreenRect,
    buffer_width: f64,
    buffer_height: f64,
}

impl ScreenMapping {
    pub fn new(rect: ScreenRect, buffer_width: f64, buffer_height: f64) -> Self {
        Self {
            rect,
            buffer_width,
            buffer_height,
        }
    }

    pub fn rect(&self) -> ScreenRect {
        self.rect
    }

    /// Canvas pixels per CSS pixel. The buffer is fitted into the rect
    /// with `contain` semantics, so one factor serves both axes.
    pub fn ratio(&self) -> f64 {
        if self.rect.width <= 0.0 || self.rect.height <= 0.0 {
            return 1.0;
        }
        let css_per_px = (self.rect.width / self.buffer_width).min(self.rect.height / self.buffer_height);
        if css_per_px > 0.0 {
            1.0 / css_per_px
        } else {
            1.0
        }
    }

    /// Size of the letterbox bars, in CSS pixels, when the rect does not
    /// share the buffer's aspect ratio.
    pub fn content_offset(&self) -> Point {
        let r = self.ratio();
        Point::new(
            ((self.rect.width - self.buffer_width / r) / 2.0).max(0.0),
            ((self.rect.height - self.buffer_height / r) / 2.0).max(0.0),
        )
    }

    pub fn screen_to_canvas(&self, client: Point) -> Point {
        let r = self.ratio();
        let bars = self.content_offset();
        Point::new(
            (client.x - self.rect.left - bars.x) * r,
            (client.y - self.rect.top - bars.y) * r,
        )
    }

    pub fn canvas_to_screen(&self, canvas: Point) -> Point {
        let local = self.canvas_to_local(canvas);
        local.offset(self.rect.left, self.rect.top)
    }

    /// Canvas point expressed in CSS pixels relative to the element's corner.
    pub fn canvas_to_local(&self, canvas: Point) -> Point {
        let r = self.ratio();
        let bars = self.content_offset();
        Point::new(canvas.x / r + bars.x, canvas.y / r + bars.y)
    }

    /// Convert a CSS length (e.g. a hit tolerance) to canvas pixels.
    pub fn css_to_canvas_len(&self, len: f64) -> f64 {
        len * self.ratio()
    }
}

/// Viewer zoom/pan: `canvas = base * zoom + pan`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub zoom: f64,
    pub pan: Point,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Point::ZERO,
        }
    }
}

impl ViewportTransform {
    pub fn apply(&self, base: Point) -> Point {
        Point::new(base.x * self.zoom + self.pan.x, base.y * self.zoom + self.pan.y)
    }

    pub fn invert(&self, canvas: Point) -> Point {
        Point::new(
            (canvas.x - self.pan.x) / self.zoom,
            (canvas.y - self.pan.y) / self.zoom,
        )
    }

    /// Change zoom while keeping the base point under `anchor` fixed.
    pub fn zoom_at(&mut self, anchor: Point, zoom: f64) {
        let fixed = self.invert(anchor);
        self.zoom = zoom;
        self.pan = Point::new(anchor.x - fixed.x * zoom, anchor.y - fixed.y * zoom);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan = self.pan.offset(dx, dy);
    }

    /// Keep the zoomed content covering the whole buffer.
    pub fn constrain(&mut self, buffer_width: f64, buffer_height: f64) {
        let min_x = (buffer_width - buffer_width * self.zoom).min(0.0);
        let min_y = (buffer_height - buffer_height * self.zoom).min(0.0);
        self.pan.x = self.pan.x.clamp(min_x, 0.0);
        self.pan.y = self.pan.y.clamp(min_y, 0.0);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_identity(&self) -> bool {
        (self.zoom - 1.0).abs() < 1e-9 && self.pan.x.abs() < 1e-9 && self.pan.y.abs() < 1e-9
    }
}

pub fn base_point_to_screen_point(
    p: Point,
    viewport: &ViewportTransform,
    mapping: &ScreenMapping,
) -> Point {
    mapping.canvas_to_screen(viewport.apply(p))
}

pub fn screen_point_to_base_point(
    client: Point,
    viewport: &ViewportTransform,
    mapping: &ScreenMapping,
) -> Point {
    viewport.invert(mapping.screen_to_canvas(client))
}

/// One segment of a vector path, in base space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum PathCommand {
    #[serde(rename = "M")]
    MoveTo { x: f64, y: f64 },
    #[serde(rename = "L")]
    LineTo { x: f64, y: f64 },
    #[serde(rename = "Q")]
    QuadTo { cx: f64, cy: f64, x: f64, y: f64 },
    #[serde(rename = "C")]
    CubicTo {
        c1x: f64,
        c1y: f64,
        c2x: f64,
        c2y: f64,
        x: f64,
        y: f64,
    },
}

impl PathCommand {
    pub fn end_point(&self) -> Point {
        match *self {
            PathCommand::MoveTo { x, y }
            | PathCommand::LineTo { x, y }
            | PathCommand::QuadTo { x, y, .. }
            | PathCommand::CubicTo { x, y, .. } => Point::new(x, y),
        }
    }

    pub fn translated(&self, dx: f64, dy: f64) -> PathCommand {
        match *self {
            PathCommand::MoveTo { x, y } => PathCommand::MoveTo { x: x + dx, y: y + dy },
            PathCommand::LineTo { x, y } => PathCommand::LineTo { x: x + dx, y: y + dy },
            PathCommand::QuadTo { cx, cy, x, y } => PathCommand::QuadTo {
                cx: cx + dx,
                cy: cy + dy,
                x: x + dx,
                y: y + dy,
            },
            PathCommand::CubicTo {
                c1x,
                c1y,
                c2x,
                c2y,
                x,
                y,
            } => PathCommand::CubicTo {
                c1x: c1x + dx,
                c1y: c1y + dy,
                c2x: c2x + dx,
                c2y: c2y + dy,
                x: x + dx,
                y: y + dy,
            },
        }
    }
}

/// Terminal coordinate of a path, whatever the last segment type.
pub fn last_point_of_path(commands: &[PathCommand]) -> Option<Point> {
    commands.last().map(PathCommand::end_point)
}

pub fn first_point_of_path(commands: &[PathCommand]) -> Option<Point> {
    commands.first().map(PathCommand::end_point)
}

/// Approximate a path by a polyline, sampling each curve `steps` times.
pub fn flatten_path(commands: &[PathCommand], steps: usize) -> Vec<Point> {
    let steps = steps.max(1);
    let mut points = Vec::with_capacity(commands.len() * steps);
    let mut current = Point::ZERO;
    for cmd in commands {
        match *cmd {
            PathCommand::MoveTo { x, y } | PathCommand::LineTo { x, y } => {
                current = Point::new(x, y);
                points.push(current);
            }
            PathCommand::QuadTo { cx, cy, x, y } => {
                let (p0, c, p1) = (current, Point::new(cx, cy), Point::new(x, y));
                for i in 1..=steps {
                    let t = i as f64 / steps as f64;
                    let u = 1.0 - t;
                    points.push(Point::new(
                        u * u * p0.x + 2.0 * u * t * c.x + t * t * p1.x,
                        u * u * p0.y + 2.0 * u * t * c.y + t * t * p1.y,
                    ));
                }
                current = p1;
            }
            PathCommand::CubicTo {
                c1x,
                c1y,
                c2x,
                c2y,
                x,
                y,
            } => {
                let p0 = current;
                let (c1, c2, p1) = (Point::new(c1x, c1y), Point::new(c2x, c2y), Point::new(x, y));
                for i in 1..=steps {
                    let t = i as f64 / steps as f64;
                    let u = 1.0 - t;
                    let a = u * u * u;
                    let b = 3.0 * u * u * t;
                    let c = 3.0 * u * t * t;
                    let d = t * t * t;
                    points.push(Point::new(
                        a * p0.x + b * c1.x + c * c2.x + d * p1.x,
                        a * p0.y + b * c1.y + c * c2.y + d * p1.y,
                    ));
                }
                current = p1;
            }
        }
    }
    points
}

pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq < f64::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + dx * t, a.y + dy * t))
}

pub fn distance_to_polyline(p: Point, points: &[Point]) -> f64 {
    match points {
        [] => f64::INFINITY,
        [only] => p.distance(*only),
        _ => points
            .windows(2)
            .map(|w| distance_to_segment(p, w[0], w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Turn raw pointer samples into a smoothed path: quadratic segments through
/// the midpoints of consecutive samples, anchored at the first and last sample.
pub fn smooth_freehand(points: &[Point]) -> Vec<PathCommand> {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec::new(),
    };
    let mut commands = vec![PathCommand::MoveTo {
        x: first.x,
        y: first.y,
    }];
    if points.len() > 2 {
        for pair in points[1..].windows(2) {
            let mid = pair[0].midpoint(pair[1]);
            commands.push(PathCommand::QuadTo {
                cx: pair[0].x,
                cy: pair[0].y,
                x: mid.x,
                y: mid.y,
            });
        }
    }
    commands.push(PathCommand::LineTo {
        x: last.x,
        y: last.y,
    });
    commands
}

/// Pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn full(image: ImageSize) -> Self {
        Self {
            x: 0,
            y: 0,
            width: image.width,
            height: image.height,
        }
    }

    /// Normalise a drag between two image-space points, clamped to the image.
    pub fn from_drag(a: Point, b: Point, image: ImageSize) -> Option<Self> {
        let (w, h) = (image.width as f64, image.height as f64);
        let x0 = a.x.min(b.x).clamp(0.0, w).floor();
        let y0 = a.y.min(b.y).clamp(0.0, h).floor();
        let x1 = a.x.max(b.x).clamp(0.0, w).ceil();
        let y1 = a.y.max(b.y).clamp(0.0, h).ceil();
        if x1 - x0 < MIN_CROP_SIDE || y1 - y0 < MIN_CROP_SIDE {
            return None;
        }
        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    /// Encoded size of this crop, never larger than `max_dim` per side.
    pub fn output_size(&self, max_dim: u32) -> ImageSize {
        let scale =
            scale_for_max_dimension(self.width as f64, self.height as f64, max_dim as f64);
        ImageSize {
            width: scaled_side(self.width, scale, max_dim),
            height: scaled_side(self.height, scale, max_dim),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(width: u32, height: u32) -> ImageSize {
        ImageSize { width, height }
    }

    #[test]
    fn test_large_image_is_capped() {
        let base = base_space_for(image(4000, 3000), 2000).unwrap();
        assert_eq!(base.width, 2000);
        assert_eq!(base.height, 1500);
        assert_eq!(base.scale, 0.5);
    }

    #[test]
    fn test_small_image_is_never_upscaled() {
        let base = base_space_for(image(800, 600), 2000).unwrap();
        assert_eq!((base.width, base.height), (800, 600));
        assert_eq!(base.scale, 1.0);
    }

    #[test]
    fn test_base_space_respects_cap_for_awkward_ratios() {
        for (w, h) in [(2001, 3), (3, 2001), (7777, 4444), (2000, 2000), (1, 1), (12345, 6789)] {
            let base = base_space_for(image(w, h), 2000).unwrap();
            assert!(base.width <= 2000 && base.height <= 2000, "{}x{}", w, h);
            assert!(base.scale <= 1.0);
        }
    }

    #[test]
    fn test_zero_sized_image_is_rejected() {
        assert!(matches!(
            base_space_for(image(0, 300), 2000),
            Err(TopoError::InvalidImage(_))
        ));
        assert!(matches!(
            base_space_for(image(300, 0), 2000),
            Err(TopoError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_image_base_conversion() {
        let base = base_space_for(image(4000, 3000), 2000).unwrap();
        let p = image_point_to_base_point(Point::new(400.0, 200.0), &base);
        assert_eq!(p, Point::new(200.0, 100.0));
        assert_eq!(base_point_to_image_point(p, &base), Point::new(400.0, 200.0));
    }

    #[test]
    fn test_screen_mapping_uses_live_rect() {
        let rect = ScreenRect {
            left: 10.0,
            top: 20.0,
            width: 500.0,
            height: 375.0,
        };
        let mapping = ScreenMapping::new(rect, 2000.0, 1500.0);
        assert_eq!(mapping.ratio(), 4.0);
        assert_eq!(mapping.content_offset(), Point::new(0.0, 0.0));
        let canvas = mapping.screen_to_canvas(Point::new(35.0, 45.0));
        assert_eq!(canvas, Point::new(100.0, 100.0));
        assert_eq!(mapping.canvas_to_screen(canvas), Point::new(35.0, 45.0));
        assert_eq!(mapping.css_to_canvas_len(6.0), 24.0);
    }

    #[test]
    fn test_screen_mapping_skips_letterbox_bars() {
        // 4:3 buffer shown in a wider box: content is 1224 css px wide,
        // centred with 288 px bars on each side.
        let rect = ScreenRect {
            left: 0.0,
            top: 0.0,
            width: 1800.0,
            height: 918.0,
        };
        let mapping = ScreenMapping::new(rect, 2000.0, 1500.0);
        let bars = mapping.content_offset();
        assert!((bars.x - 288.0).abs() < 1e-9);
        assert_eq!(bars.y, 0.0);

        let scale = 918.0 / 1500.0;
        let click = Point::new(288.0 + 100.0 * scale, 100.0 * scale);
        let canvas = mapping.screen_to_canvas(click);
        assert!((canvas.x - 100.0).abs() < 1e-9);
        assert!((canvas.y - 100.0).abs() < 1e-9);

        let back = mapping.canvas_to_screen(Point::new(100.0, 100.0));
        assert!((back.x - click.x).abs() < 1e-9);
        assert!((back.y - click.y).abs() < 1e-9);
        assert!((mapping.css_to_canvas_len(6.0) - 6.0 / scale).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_at_keeps_anchor_fixed() {
        let mut vp = ViewportTransform::default();
        let anchor = Point::new(300.0, 200.0);
        let before = vp.invert(anchor);
        vp.zoom_at(anchor, 2.5);
        let after = vp.invert(anchor);
        assert!(before.distance(after) < 1e-9);
        assert_eq!(vp.zoom, 2.5);
    }

    #[test]
    fn test_constrain_keeps_content_covering_buffer() {
        let mut vp = ViewportTransform {
            zoom: 2.0,
            pan: Point::new(50.0, -5000.0),
        };
        vp.constrain(1000.0, 800.0);
        assert_eq!(vp.pan, Point::new(0.0, -800.0));

        vp.zoom = 1.0;
        vp.constrain(1000.0, 800.0);
        assert!(vp.is_identity());
    }

    #[test]
    fn test_last_point_for_each_segment_type() {
        let line = [PathCommand::MoveTo { x: 0.0, y: 0.0 }, PathCommand::LineTo { x: 5.0, y: 6.0 }];
        assert_eq!(last_point_of_path(&line), Some(Point::new(5.0, 6.0)));

        let quad = [
            PathCommand::MoveTo { x: 0.0, y: 0.0 },
            PathCommand::QuadTo { cx: 1.0, cy: 1.0, x: 2.0, y: 3.0 },
        ];
        assert_eq!(last_point_of_path(&quad), Some(Point::new(2.0, 3.0)));

        let cubic = [
            PathCommand::MoveTo { x: 0.0, y: 0.0 },
            PathCommand::CubicTo { c1x: 1.0, c1y: 1.0, c2x: 2.0, c2y: 2.0, x: 9.0, y: 8.0 },
        ];
        assert_eq!(last_point_of_path(&cubic), Some(Point::new(9.0, 8.0)));
        assert_eq!(last_point_of_path(&[]), None);
    }

    #[test]
    fn test_smooth_freehand_keeps_endpoints() {
        let samples = [
            Point::new(100.0, 100.0),
            Point::new(150.0, 110.0),
            Point::new(250.0, 90.0),
            Point::new(300.0, 100.0),
        ];
        let path = smooth_freehand(&samples);
        assert_eq!(first_point_of_path(&path), Some(Point::new(100.0, 100.0)));
        assert_eq!(last_point_of_path(&path), Some(Point::new(300.0, 100.0)));
        assert!(path.iter().any(|c| matches!(c, PathCommand::QuadTo { .. })));
        assert!(smooth_freehand(&[]).is_empty());
    }

    #[test]
    fn test_flattened_curve_passes_near_samples() {
        let path = smooth_freehand(&[
            Point::new(0.0, 0.0),
            Point::new(50.0, 50.0),
            Point::new(100.0, 0.0),
        ]);
        let flat = flatten_path(&path, 8);
        assert!(distance_to_polyline(Point::new(0.0, 0.0), &flat) < 1e-9);
        assert!(distance_to_polyline(Point::new(100.0, 0.0), &flat) < 1e-9);
        assert!(distance_to_polyline(Point::new(50.0, -40.0), &flat) > 30.0);
    }

    #[test]
    fn test_distance_to_segment() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert_eq!(distance_to_segment(Point::new(5.0, 3.0), a, b), 3.0);
        assert_eq!(distance_to_segment(Point::new(-4.0, 3.0), a, b), 5.0);
        assert_eq!(distance_to_segment(Point::new(1.0, 1.0), a, a), 2f64.sqrt());
    }

    #[test]
    fn test_crop_rect_from_drag() {
        let img = image(1000, 800);
        let rect = CropRect::from_drag(Point::new(900.0, 50.2), Point::new(100.0, 1200.0), img).unwrap();
        assert_eq!(rect, CropRect { x: 100, y: 50, width: 800, height: 750 });
        assert!(CropRect::from_drag(Point::new(10.0, 10.0), Point::new(12.0, 300.0), img).is_none());
    }

    #[test]
    fn test_crop_output_is_capped() {
        let rect = CropRect::full(image(5000, 2500));
        assert_eq!(rect.output_size(2000), image(2000, 1000));
        let small = CropRect::full(image(640, 480));
        assert_eq!(small.output_size(2000), image(640, 480));
    }
}
