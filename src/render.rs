// src/render.rs
//
// Paints a scene onto a 2D canvas whose buffer is the size of the base
// space. Nothing in here mutates state.

use std::f64::consts::PI;

use wasm_bindgen::JsValue;
use web_sys::{CanvasRenderingContext2d, HtmlImageElement};

use crate::annotation::{EndpointMarker, InfoMarker, SceneObject};
use crate::config::StrokeStyle;
use crate::geometry::{PathCommand, Point, ViewportTransform};
use crate::scene::{ObjectId, Scene};

const SELECTION_COLOR: &str = "#ffd54f";
const MARKER_OUTLINE: &str = "#ffffff";
const MARKER_TEXT: &str = "#ffffff";

/// Editor-only overlays drawn above the scene.
#[derive(Default)]
pub struct Overlay<'a> {
    pub selected: Option<ObjectId>,
    pub stroke_preview: Option<&'a [Point]>,
    pub preview_style: Option<&'a StrokeStyle>,
}

pub fn draw(
    ctx: &CanvasRenderingContext2d,
    scene: &Scene,
    photo: Option<&HtmlImageElement>,
    viewport: &ViewportTransform,
    overlay: &Overlay<'_>,
) -> Result<(), JsValue> {
    let Some(bg) = scene.background() else {
        ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)?;
        let canvas = ctx.canvas();
        if let Some(canvas) = canvas {
            ctx.clear_rect(0.0, 0.0, canvas.width() as f64, canvas.height() as f64);
        }
        return Ok(());
    };
    let (w, h) = (bg.base.width as f64, bg.base.height as f64);

    ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)?;
    ctx.clear_rect(0.0, 0.0, w, h);
    ctx.set_transform(viewport.zoom, 0.0, 0.0, viewport.zoom, viewport.pan.x, viewport.pan.y)?;

    if let Some(img) = photo {
        ctx.draw_image_with_html_image_element_and_dw_and_dh(img, 0.0, 0.0, w, h)?;
    }

    for entry in scene.objects() {
        draw_object(ctx, &entry.object)?;
        if overlay.selected == Some(entry.id) {
            draw_selection(ctx, &entry.object, viewport.zoom)?;
        }
    }

    if let (Some(points), Some(style)) = (overlay.stroke_preview, overlay.preview_style) {
        draw_preview(ctx, points, style);
    }
    Ok(())
}

fn draw_object(ctx: &CanvasRenderingContext2d, object: &SceneObject) -> Result<(), JsValue> {
    match object {
        SceneObject::Stroke(stroke) => {
            stroke_path(ctx, &stroke.path, &stroke.color, stroke.width);
            Ok(())
        }
        SceneObject::StrokeGroup(group) => {
            stroke_path(ctx, &group.path, &group.color, group.width);
            draw_endpoint(ctx, &group.start, &group.color, group.width)?;
            draw_endpoint(ctx, &group.end, &group.color, group.width)
        }
        SceneObject::InfoMarker(marker) => draw_marker(ctx, marker),
    }
}

fn trace(ctx: &CanvasRenderingContext2d, path: &[PathCommand]) {
    ctx.begin_path();
    for cmd in path {
        match *cmd {
            PathCommand::MoveTo { x, y } => ctx.move_to(x, y),
            PathCommand::LineTo { x, y } => ctx.line_to(x, y),
            PathCommand::QuadTo { cx, cy, x, y } => ctx.quadratic_curve_to(cx, cy, x, y),
            PathCommand::CubicTo {
                c1x,
                c1y,
                c2x,
                c2y,
                x,
                y,
            } => ctx.bezier_curve_to(c1x, c1y, c2x, c2y, x, y),
        }
    }
}

fn stroke_path(ctx: &CanvasRenderingContext2d, path: &[PathCommand], color: &str, width: f64) {
    trace(ctx, path);
    ctx.set_line_cap("round");
    ctx.set_line_join("round");
    ctx.set_line_width(width);
    ctx.set_stroke_style_str(color);
    ctx.stroke();
}

fn draw_endpoint(
    ctx: &CanvasRenderingContext2d,
    endpoint: &EndpointMarker,
    outline: &str,
    width: f64,
) -> Result<(), JsValue> {
    ctx.begin_path();
    ctx.arc(endpoint.center.x, endpoint.center.y, endpoint.radius, 0.0, 2.0 * PI)?;
    ctx.set_fill_style_str(&endpoint.fill);
    ctx.fill();
    ctx.set_line_width(width / 2.0);
    ctx.set_stroke_style_str(outline);
    ctx.stroke();
    Ok(())
}

fn draw_marker(ctx: &CanvasRenderingContext2d, marker: &InfoMarker) -> Result<(), JsValue> {
    let r = marker.effective_radius();
    let Point { x, y } = marker.position;
    ctx.begin_path();
    ctx.arc(x, y, r, 0.0, 2.0 * PI)?;
    ctx.set_fill_style_str(&marker.fill);
    ctx.fill();
    ctx.set_line_width((r / 7.0).max(1.0));
    ctx.set_stroke_style_str(MARKER_OUTLINE);
    ctx.stroke();

    ctx.set_fill_style_str(MARKER_TEXT);
    ctx.set_font(&format!("bold {}px sans-serif", (r * 1.2).round()));
    ctx.set_text_align("center");
    ctx.set_text_baseline("middle");
    ctx.fill_text(&marker.label, x, y)?;
    Ok(())
}

fn draw_selection(ctx: &CanvasRenderingContext2d, object: &SceneObject, zoom: f64) -> Result<(), JsValue> {
    ctx.save();
    ctx.set_stroke_style_str(SELECTION_COLOR);
    ctx.set_line_width(2.0 / zoom);
    let dash = js_sys::Array::of2(&JsValue::from_f64(6.0 / zoom), &JsValue::from_f64(4.0 / zoom));
    ctx.set_line_dash(&dash)?;
    match object {
        SceneObject::Stroke(stroke) => {
            trace(ctx, &stroke.path);
            ctx.stroke();
        }
        SceneObject::StrokeGroup(group) => {
            trace(ctx, &group.path);
            ctx.stroke();
            for end in [&group.start, &group.end] {
                ctx.begin_path();
                ctx.arc(end.center.x, end.center.y, end.radius + 3.0 / zoom, 0.0, 2.0 * PI)?;
                ctx.stroke();
            }
        }
        SceneObject::InfoMarker(marker) => {
            ctx.begin_path();
            ctx.arc(
                marker.position.x,
                marker.position.y,
                marker.effective_radius() + 4.0 / zoom,
                0.0,
                2.0 * PI,
            )?;
            ctx.stroke();
        }
    }
    ctx.restore();
    Ok(())
}

fn draw_preview(ctx: &CanvasRenderingContext2d, points: &[Point], style: &StrokeStyle) {
    let Some((first, rest)) = points.split_first() else {
        return;
    };
    ctx.begin_path();
    ctx.move_to(first.x, first.y);
    for p in rest {
        ctx.line_to(p.x, p.y);
    }
    ctx.set_line_cap("round");
    ctx.set_line_join("round");
    ctx.set_line_width(style.width);
    ctx.set_stroke_style_str(&style.color);
    ctx.stroke();
}
