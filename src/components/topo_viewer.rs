// src/components/topo_viewer.rs
//
// Inline thumbnail plus a lightbox that is only built the first time it is
// opened. Both draw the same document through their own `ViewerCore`.

use crate::access::{AccessPolicy, TopoAction};
use crate::annotation::{DecodedImage, ImageSize};
use crate::config::TopoConfig;
use crate::error::TopoError;
use crate::geometry::{Point, ScreenMapping};
use crate::media::{context_2d, decode_image, rect_of};
use crate::render::{self, Overlay};
use crate::utils::viewport_width;
use crate::viewer::{wheel_delta_pixels, ViewerClick, ViewerCore, ViewerKind};
use gloo::events::EventListener;
use gloo::utils::{document, window};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, HtmlCanvasElement, HtmlImageElement, KeyboardEvent, PointerEvent, Touch, TouchEvent};
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct TopoViewerProps {
    pub image_url: Option<String>,
    pub field_value: String,
    pub config: TopoConfig,
    pub access: Callback<TopoAction, bool>,
    #[prop_or_default]
    pub generation: u64,
}

pub enum TopoViewerMsg {
    Load,
    Decoded(u64, String, Result<(HtmlImageElement, ImageSize), TopoError>),
    Open,
    Close,
    Resized,
    Wheel(ViewerKind, WheelEvent),
    PointerDown(ViewerKind, PointerEvent),
    PointerMove(ViewerKind, PointerEvent),
    PointerUp(ViewerKind, PointerEvent),
    PointerLeave(ViewerKind),
    TouchStart(TouchEvent),
    TouchMove(TouchEvent),
    TouchEnd(TouchEvent),
    DoubleClick,
    Zoom(f64),
    ResetView,
    Key(KeyboardEvent),
}

pub struct TopoViewer {
    thumbnail: ViewerCore,
    lightbox: Option<ViewerCore>,
    open: bool,
    photo: Option<HtmlImageElement>,
    decoded: Option<DecodedImage>,
    thumb_ref: NodeRef,
    lightbox_ref: NodeRef,
    token: u64,
    loading: bool,
    error: Option<String>,
    _resize: Option<EventListener>,
    _keydown: Option<EventListener>,
}

fn access_policy(props: &TopoViewerProps) -> Box<dyn AccessPolicy> {
    let access = props.access.clone();
    Box::new(move |action: TopoAction| access.emit(action))
}

fn client_point(x: i32, y: i32) -> Point {
    Point::new(x as f64, y as f64)
}

fn touch_point(t: &Touch) -> Point {
    client_point(t.client_x(), t.client_y())
}

fn two_touches(e: &TouchEvent) -> Option<(Point, Point)> {
    let touches = e.touches();
    if touches.length() != 2 {
        return None;
    }
    Some((touch_point(&touches.get(0)?), touch_point(&touches.get(1)?)))
}

impl Component for TopoViewer {
    type Message = TopoViewerMsg;
    type Properties = TopoViewerProps;

    fn create(ctx: &Context<Self>) -> Self {
        let props = ctx.props();
        let mut thumbnail = ViewerCore::new(ViewerKind::Thumbnail, props.config.clone(), access_policy(props));
        thumbnail.set_viewport_width(viewport_width());
        ctx.link().send_message(TopoViewerMsg::Load);
        Self {
            thumbnail,
            lightbox: None,
            open: false,
            photo: None,
            decoded: None,
            thumb_ref: NodeRef::default(),
            lightbox_ref: NodeRef::default(),
            token: 0,
            loading: false,
            error: None,
            _resize: None,
            _keydown: None,
        }
    }

    fn changed(&mut self, ctx: &Context<Self>, old: &Self::Properties) -> bool {
        let props = ctx.props();
        if props.image_url != old.image_url
            || props.field_value != old.field_value
            || props.generation != old.generation
            || props.config != old.config
        {
            self.thumbnail = ViewerCore::new(ViewerKind::Thumbnail, props.config.clone(), access_policy(props));
            self.thumbnail.set_viewport_width(viewport_width());
            self.lightbox = None;
            self.open = false;
            self.photo = None;
            self.decoded = None;
            self.error = None;
            self.loading = false;
            ctx.link().send_message(TopoViewerMsg::Load);
        }
        true
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        match msg {
            TopoViewerMsg::Load => {
                let Some(url) = ctx.props().image_url.clone() else {
                    return true;
                };
                if self.loading {
                    return false;
                }
                self.loading = true;
                self.token += 1;
                let token = self.token;
                let link = ctx.link().clone();
                spawn_local(async move {
                    let result = decode_image(&url).await;
                    link.send_message(TopoViewerMsg::Decoded(token, url, result));
                });
                false
            }
            TopoViewerMsg::Decoded(token, url, result) => {
                if token != self.token {
                    return false;
                }
                self.loading = false;
                match result {
                    Ok((img, natural)) => {
                        let decoded = DecodedImage { url, natural };
                        match self.thumbnail.load(decoded.clone(), &ctx.props().field_value) {
                            Ok(report) => {
                                if report.degraded {
                                    log::warn!("Topo shown without its annotations");
                                }
                                self.photo = Some(img);
                                self.decoded = Some(decoded);
                            }
                            Err(e) => self.error = Some(e.to_string()),
                        }
                    }
                    Err(e) => {
                        log::error!("Topo photo failed to load: {}", e);
                        self.error = Some(e.to_string());
                    }
                }
                true
            }
            TopoViewerMsg::Open => {
                let Some(decoded) = self.decoded.clone() else {
                    return false;
                };
                if self.lightbox.is_none() {
                    let props = ctx.props();
                    let mut lightbox = ViewerCore::new(ViewerKind::Lightbox, props.config.clone(), access_policy(props));
                    lightbox.set_viewport_width(viewport_width());
                    if let Err(e) = lightbox.load(decoded, &props.field_value) {
                        self.error = Some(e.to_string());
                        return true;
                    }
                    self.lightbox = Some(lightbox);
                }
                self.open = true;
                true
            }
            TopoViewerMsg::Close => {
                self.open = false;
                if let Some(lightbox) = self.lightbox.as_mut() {
                    lightbox.dismiss_tooltip();
                    lightbox.reset_view();
                }
                true
            }
            TopoViewerMsg::Resized => {
                let width = viewport_width();
                let thumb = self.thumbnail.set_viewport_width(width);
                let light = self
                    .lightbox
                    .as_mut()
                    .is_some_and(|l| l.set_viewport_width(width));
                thumb || light || self.open
            }
            TopoViewerMsg::Wheel(kind, e) => {
                let Some((core, mapping)) = self.target(kind) else {
                    return false;
                };
                e.prevent_default();
                let delta = wheel_delta_pixels(e.delta_y(), e.delta_mode(), mapping.rect().height);
                core.wheel(client_point(e.client_x(), e.client_y()), delta, &mapping)
            }
            TopoViewerMsg::PointerDown(kind, e) => {
                let Some((core, mapping)) = self.target(kind) else {
                    return false;
                };
                core.pointer_down(client_point(e.client_x(), e.client_y()), &mapping);
                // Touch pinches need every finger on the canvas, so only mice capture.
                if e.pointer_type() != "touch" {
                    if let Some(target) = e.target().and_then(|t| t.dyn_into::<Element>().ok()) {
                        let _ = target.set_pointer_capture(e.pointer_id());
                    }
                }
                false
            }
            TopoViewerMsg::PointerMove(kind, e) => {
                let hover = e.pointer_type() != "touch";
                let Some((core, mapping)) = self.target(kind) else {
                    return false;
                };
                core.pointer_move(client_point(e.client_x(), e.client_y()), &mapping, hover)
            }
            TopoViewerMsg::PointerUp(kind, e) => {
                let Some((core, mapping)) = self.target(kind) else {
                    return false;
                };
                match core.pointer_up(client_point(e.client_x(), e.client_y()), &mapping) {
                    ViewerClick::Activate => {
                        ctx.link().send_message(TopoViewerMsg::Open);
                        false
                    }
                    ViewerClick::TooltipChanged => true,
                    ViewerClick::None => false,
                }
            }
            TopoViewerMsg::PointerLeave(kind) => match self.core_mut(kind) {
                Some(core) => core.pointer_leave(),
                None => false,
            },
            TopoViewerMsg::TouchStart(e) => {
                let Some((a, b)) = two_touches(&e) else {
                    return false;
                };
                e.prevent_default();
                if let Some((core, mapping)) = self.target(ViewerKind::Lightbox) {
                    core.pinch_start(a, b, &mapping);
                }
                false
            }
            TopoViewerMsg::TouchMove(e) => {
                let Some((a, b)) = two_touches(&e) else {
                    return false;
                };
                e.prevent_default();
                match self.target(ViewerKind::Lightbox) {
                    Some((core, mapping)) => core.pinch_move(a, b, &mapping),
                    None => false,
                }
            }
            TopoViewerMsg::TouchEnd(e) => {
                if e.touches().length() < 2 {
                    if let Some(core) = self.lightbox.as_mut() {
                        core.pinch_end();
                    }
                }
                false
            }
            TopoViewerMsg::DoubleClick => self.lightbox.as_mut().is_some_and(|l| l.double_click()),
            TopoViewerMsg::Zoom(factor) => self.lightbox.as_mut().is_some_and(|l| l.zoom_by(factor)),
            TopoViewerMsg::ResetView => self.lightbox.as_mut().is_some_and(|l| l.reset_view()),
            TopoViewerMsg::Key(e) => {
                if !self.open {
                    return false;
                }
                let step = ctx.props().config.zoom_step;
                let msg = match e.key().as_str() {
                    "+" | "=" => TopoViewerMsg::Zoom(step),
                    "-" | "_" => TopoViewerMsg::Zoom(1.0 / step),
                    "0" | "r" | "R" => TopoViewerMsg::ResetView,
                    "Escape" => TopoViewerMsg::Close,
                    _ => return false,
                };
                e.prevent_default();
                ctx.link().send_message(msg);
                false
            }
        }
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        html! {
            <div class="topo-viewer">
                { self.render_thumbnail(ctx) }
                { self.render_lightbox(ctx) }
            </div>
        }
    }

    fn rendered(&mut self, ctx: &Context<Self>, first_render: bool) {
        if first_render {
            let link = ctx.link().clone();
            self._resize = Some(EventListener::new(&window(), "resize", move |_| {
                link.send_message(TopoViewerMsg::Resized);
            }));
            let link = ctx.link().clone();
            self._keydown = Some(EventListener::new(&document(), "keydown", move |event| {
                if let Some(e) = event.dyn_ref::<KeyboardEvent>() {
                    link.send_message(TopoViewerMsg::Key(e.clone()));
                }
            }));
        }
        draw_into(&self.thumb_ref, &self.thumbnail, self.photo.as_ref());
        if self.open {
            if let Some(lightbox) = &self.lightbox {
                draw_into(&self.lightbox_ref, lightbox, self.photo.as_ref());
            }
        }
    }
}

fn draw_into(canvas: &NodeRef, core: &ViewerCore, photo: Option<&HtmlImageElement>) {
    let Some(canvas) = canvas.cast::<HtmlCanvasElement>() else {
        return;
    };
    let Some(ctx) = context_2d(&canvas) else {
        return;
    };
    if let Err(e) = render::draw(&ctx, core.scene(), photo, core.viewport(), &Overlay::default()) {
        log::error!("Viewer render failed: {:?}", e);
    }
}

impl TopoViewer {
    fn core_mut(&mut self, kind: ViewerKind) -> Option<&mut ViewerCore> {
        match kind {
            ViewerKind::Thumbnail => Some(&mut self.thumbnail),
            ViewerKind::Lightbox => self.lightbox.as_mut(),
        }
    }

    /// The core for `kind` together with a mapping from the canvas's live
    /// rect, measured now.
    fn target(&mut self, kind: ViewerKind) -> Option<(&mut ViewerCore, ScreenMapping)> {
        let node = match kind {
            ViewerKind::Thumbnail => &self.thumb_ref,
            ViewerKind::Lightbox => &self.lightbox_ref,
        };
        let rect = rect_of(&node.cast::<Element>()?);
        let core = self.core_mut(kind)?;
        let base = core.base()?;
        let mapping = ScreenMapping::new(rect, base.width as f64, base.height as f64);
        Some((core, mapping))
    }

    fn canvas(&self, ctx: &Context<Self>, kind: ViewerKind, core: &ViewerCore, node: &NodeRef) -> Html {
        let Some(base) = core.base() else {
            return html! {};
        };
        let link = ctx.link();
        let class = match kind {
            ViewerKind::Thumbnail => "topo-canvas thumbnail",
            ViewerKind::Lightbox => "topo-canvas lightbox-canvas",
        };
        let style = match kind {
            ViewerKind::Thumbnail => "width:100%; height:auto; cursor:zoom-in;",
            ViewerKind::Lightbox => "display:block; width:auto; height:auto; max-width:100%; max-height:85vh; margin:0 auto; touch-action:none; cursor:grab;",
        };
        html! {
            <canvas
                ref={node.clone()}
                {class}
                {style}
                width={base.width.to_string()}
                height={base.height.to_string()}
                onwheel={link.callback(move |e| TopoViewerMsg::Wheel(kind, e))}
                onpointerdown={link.callback(move |e| TopoViewerMsg::PointerDown(kind, e))}
                onpointermove={link.callback(move |e| TopoViewerMsg::PointerMove(kind, e))}
                onpointerup={link.callback(move |e| TopoViewerMsg::PointerUp(kind, e))}
                onpointerleave={link.callback(move |_| TopoViewerMsg::PointerLeave(kind))}
                ontouchstart={link.callback(TopoViewerMsg::TouchStart)}
                ontouchmove={link.callback(TopoViewerMsg::TouchMove)}
                ontouchend={link.callback(TopoViewerMsg::TouchEnd)}
                ondblclick={link.callback(|_| TopoViewerMsg::DoubleClick)}
            />
        }
    }

    fn render_thumbnail(&self, ctx: &Context<Self>) -> Html {
        if ctx.props().image_url.is_none() {
            return html! { <p class="topo-empty">{"No topo for this route yet."}</p> };
        }
        if let Some(error) = &self.error {
            return html! { <p class="inline-error">{ error }</p> };
        }
        if self.thumbnail.base().is_none() {
            return html! { <p class="loading">{"Loading topo…"}</p> };
        }
        html! {
            <div class="topo-thumbnail">
                { self.canvas(ctx, ViewerKind::Thumbnail, &self.thumbnail, &self.thumb_ref) }
            </div>
        }
    }

    fn render_lightbox(&self, ctx: &Context<Self>) -> Html {
        if !self.open {
            return html! {};
        }
        let Some(lightbox) = &self.lightbox else {
            return html! {};
        };
        let link = ctx.link();
        let step = ctx.props().config.zoom_step;
        let zoom_pct = (lightbox.viewport().zoom * 100.0).round();
        html! {
            <div class="lightbox-backdrop">
                <div class="lightbox">
                    <div class="lightbox-controls">
                        <button onclick={link.callback(move |_| TopoViewerMsg::Zoom(1.0 / step))} title="Zoom out (-)">{"−"}</button>
                        <span class="zoom-readout">{ format!("{}%", zoom_pct) }</span>
                        <button onclick={link.callback(move |_| TopoViewerMsg::Zoom(step))} title="Zoom in (+)">{"+"}</button>
                        <button onclick={link.callback(|_| TopoViewerMsg::ResetView)} title="Reset (0)">{"Reset"}</button>
                        <button onclick={link.callback(|_| TopoViewerMsg::Close)} title="Close (Esc)">{"Close"}</button>
                    </div>
                    <div class="lightbox-stage" style="position:relative;">
                        { self.canvas(ctx, ViewerKind::Lightbox, lightbox, &self.lightbox_ref) }
                        { self.render_tooltip(lightbox) }
                    </div>
                </div>
            </div>
        }
    }

    fn render_tooltip(&self, lightbox: &ViewerCore) -> Html {
        let Some(tooltip) = lightbox.tooltip() else {
            return html! {};
        };
        let Some(canvas) = self.lightbox_ref.cast::<Element>() else {
            return html! {};
        };
        let base = match lightbox.base() {
            Some(base) => base,
            None => return html! {},
        };
        let mapping = ScreenMapping::new(rect_of(&canvas), base.width as f64, base.height as f64);
        let Some(anchor) = lightbox.tooltip_anchor(&mapping) else {
            return html! {};
        };
        // The canvas is centred inside the stage, which positions the tooltip.
        let anchor = match canvas.parent_element() {
            Some(stage) => {
                let (inner, outer) = (rect_of(&canvas), rect_of(&stage));
                anchor.offset(inner.left - outer.left, inner.top - outer.top)
            }
            None => anchor,
        };
        let style = format!(
            "position:absolute; left:{:.1}px; top:{:.1}px; transform:translate(-50%, calc(-100% - 8px));",
            anchor.x, anchor.y
        );
        let class = if tooltip.pinned { "topo-tooltip pinned" } else { "topo-tooltip" };
        html! {
            <div {class} {style} role="tooltip">
                <strong>{ tooltip.content.title }</strong>
                {
                    match tooltip.content.description {
                        Some(text) => html! { <p>{ text }</p> },
                        None => html! {},
                    }
                }
            </div>
        }
    }
}
