// src/components/topo_editor.rs
use crate::access::{AccessPolicy, TopoAction};
use crate::annotation::{DecodedImage, ImageSize};
use crate::components::crop_dialog::CropDialog;
use crate::components::marker_modal::MarkerModal as MarkerModalView;
use crate::config::TopoConfig;
use crate::editor::{CropRequest, CropState, CropToolState, EditorCore, MarkerModal, PendingImage, PointerOutcome, Tool};
use crate::error::TopoError;
use crate::geometry::{screen_point_to_base_point, CropRect, Point, ScreenMapping, ViewportTransform};
use crate::media::{context_2d, crop_to_file, cropped_file_name, decode_image, object_url_for, prepare_crop_tool, rect_of, release_later, PendingReleases};
use crate::render::{self, Overlay};
use gloo::events::EventListener;
use gloo::file::ObjectUrl;
use gloo::timers::callback::Timeout;
use gloo::utils::document;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, File, HtmlCanvasElement, HtmlImageElement, HtmlInputElement, HtmlTextAreaElement, KeyboardEvent, PointerEvent};
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct TopoEditorProps {
    pub route_id: String,
    #[prop_or_default]
    pub image_url: Option<String>,
    /// Hidden form field holding the serialized document.
    pub field_value: String,
    pub config: TopoConfig,
    pub access: Callback<TopoAction, bool>,
    pub on_document_change: Callback<String>,
    /// Receives the final (possibly cropped) file so the host can store it.
    #[prop_or_default]
    pub on_image_ingested: Callback<File>,
    /// Bump to force a reload from `image_url` and `field_value`.
    #[prop_or_default]
    pub generation: u64,
}

pub enum TopoEditorMsg {
    Restore,
    RestoreDecoded(u64, String, Result<(HtmlImageElement, ImageSize), TopoError>),
    FileSelected(File),
    CropToolLoaded(Result<(), TopoError>),
    CropConfirmed(Option<CropRect>),
    CropCancelled,
    Cropped(Result<File, TopoError>),
    IngestDecoded(u64, File, Result<(HtmlImageElement, ImageSize), TopoError>),
    SetTool(Tool),
    PointerDown(PointerEvent),
    PointerMove(PointerEvent),
    PointerUp(PointerEvent),
    DraftTitle(String),
    DraftDescription(String),
    SaveMarker,
    CancelMarker,
    Undo,
    Redo,
    DeleteSelected,
    Clear,
    Key(KeyboardEvent),
    DismissError,
    Released(u64),
}

pub struct TopoEditor {
    core: EditorCore,
    canvas_ref: NodeRef,
    photo: Option<HtmlImageElement>,
    /// Object URL backing the current background, when it came from a file.
    photo_url: Option<ObjectUrl>,
    /// Object URL of the ingest in flight.
    incoming_url: Option<ObjectUrl>,
    pending_file: Option<File>,
    pending_url: Option<ObjectUrl>,
    crop_in_flight: bool,
    decode_token: u64,
    restoring_url: Option<String>,
    emitted_revision: u64,
    emitted_field: String,
    error: Option<String>,
    releases: PendingReleases<Timeout>,
    _keydown: Option<EventListener>,
}

fn access_policy(props: &TopoEditorProps) -> Box<dyn AccessPolicy> {
    let access = props.access.clone();
    Box::new(move |action: TopoAction| access.emit(action))
}

fn client_point(e: &PointerEvent) -> Point {
    Point::new(e.client_x() as f64, e.client_y() as f64)
}

fn typing_into_field(e: &KeyboardEvent) -> bool {
    e.target().is_some_and(|t| {
        t.dyn_ref::<HtmlInputElement>().is_some() || t.dyn_ref::<HtmlTextAreaElement>().is_some()
    })
}

impl Component for TopoEditor {
    type Message = TopoEditorMsg;
    type Properties = TopoEditorProps;

    fn create(ctx: &Context<Self>) -> Self {
        let props = ctx.props();
        ctx.link().send_message(TopoEditorMsg::Restore);
        Self {
            core: EditorCore::new(props.config.clone(), access_policy(props)),
            canvas_ref: NodeRef::default(),
            photo: None,
            photo_url: None,
            incoming_url: None,
            pending_file: None,
            pending_url: None,
            crop_in_flight: false,
            decode_token: 0,
            restoring_url: None,
            emitted_revision: 0,
            emitted_field: props.field_value.clone(),
            error: None,
            releases: PendingReleases::default(),
            _keydown: None,
        }
    }

    fn changed(&mut self, ctx: &Context<Self>, old: &Self::Properties) -> bool {
        let props = ctx.props();
        let external_edit =
            props.field_value != old.field_value && props.field_value != self.core.persisted_field();
        if props.route_id != old.route_id
            || props.generation != old.generation
            || props.config != old.config
            || external_edit
        {
            log::info!("Reinitializing topo editor for route {}", props.route_id);
            self.core
                .reinitialize(props.config.clone(), access_policy(props));
            self.photo = None;
            if let Some(url) = self.photo_url.take() {
                self.release(ctx, url);
            }
            self.decode_token += 1;
            self.restoring_url = None;
            self.emitted_revision = self.core.revision();
            self.emitted_field = props.field_value.clone();
            self.error = None;
            ctx.link().send_message(TopoEditorMsg::Restore);
        }
        true
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        let redraw = match msg {
            TopoEditorMsg::Restore => {
                let Some(url) = ctx.props().image_url.clone() else {
                    return false;
                };
                if self.restoring_url.as_deref() == Some(url.as_str()) {
                    return false;
                }
                self.decode_token += 1;
                let token = self.decode_token;
                self.restoring_url = Some(url.clone());
                let link = ctx.link().clone();
                spawn_local(async move {
                    let result = decode_image(&url).await;
                    link.send_message(TopoEditorMsg::RestoreDecoded(token, url, result));
                });
                false
            }
            TopoEditorMsg::RestoreDecoded(token, url, result) => {
                if token != self.decode_token {
                    return false;
                }
                self.restoring_url = None;
                let restored = result.and_then(|(img, natural)| {
                    let report = self
                        .core
                        .restore(DecodedImage { url, natural }, &ctx.props().field_value)?;
                    Ok((img, report))
                });
                match restored {
                    Ok((img, report)) => {
                        log::info!("Restored topo with {} objects", report.objects);
                        self.photo = Some(img);
                        if report.degraded {
                            self.error = Some(
                                "The saved annotations could not be read. Editing starts from the photo alone."
                                    .to_string(),
                            );
                        }
                        self.emitted_revision = self.core.revision();
                    }
                    Err(e) => {
                        log::error!("Could not open topo: {}", e);
                        self.error = Some(e.to_string());
                    }
                }
                true
            }
            TopoEditorMsg::FileSelected(file) => {
                let url = object_url_for(file.clone());
                let pending = PendingImage {
                    name: file.name(),
                    url: url.to_string(),
                };
                match self.core.select_file(pending) {
                    Ok(request) => {
                        if let Some(old) = self.pending_url.replace(url) {
                            self.release(ctx, old);
                        }
                        self.pending_file = Some(file);
                        self.error = None;
                        self.follow_crop_request(ctx, request);
                    }
                    Err(e) => {
                        self.release(ctx, url);
                        self.error = Some(e.to_string());
                    }
                }
                true
            }
            TopoEditorMsg::CropToolLoaded(result) => {
                if let Some(request) = self.core.crop_tool_loaded(result) {
                    self.follow_crop_request(ctx, request);
                }
                true
            }
            TopoEditorMsg::CropConfirmed(None) => {
                self.core.finish_crop();
                self.ingest_pending(ctx);
                true
            }
            TopoEditorMsg::CropConfirmed(Some(rect)) => {
                let (Some(file), Some(url)) = (self.pending_file.clone(), self.pending_url.as_ref()) else {
                    return false;
                };
                self.crop_in_flight = true;
                let url = url.to_string();
                let settings = self.core.config().crop.clone();
                let name = cropped_file_name(&file.name(), &settings.mime_type);
                let link = ctx.link().clone();
                spawn_local(async move {
                    let result = match decode_image(&url).await {
                        Ok((img, _)) => crop_to_file(&img, rect, &settings, &name).await,
                        Err(e) => Err(TopoError::CropUnavailable(e.to_string())),
                    };
                    link.send_message(TopoEditorMsg::Cropped(result));
                });
                true
            }
            TopoEditorMsg::Cropped(result) => {
                self.crop_in_flight = false;
                self.core.finish_crop();
                match result {
                    Ok(file) => {
                        self.pending_file = Some(file);
                    }
                    Err(e) => log::warn!("{}; using the original file", e),
                }
                self.ingest_pending(ctx);
                true
            }
            TopoEditorMsg::CropCancelled => {
                self.core.finish_crop();
                self.pending_file = None;
                if let Some(url) = self.pending_url.take() {
                    self.release(ctx, url);
                }
                true
            }
            TopoEditorMsg::IngestDecoded(token, file, result) => {
                if token != self.decode_token {
                    return false;
                }
                let Some(url) = self.incoming_url.take() else {
                    return false;
                };
                let ingested = result.and_then(|(img, natural)| {
                    self.core.ingest_image(DecodedImage {
                        url: url.to_string(),
                        natural,
                    })?;
                    Ok(img)
                });
                match ingested {
                    Ok(img) => {
                        self.photo = Some(img);
                        if let Some(old) = self.photo_url.replace(url) {
                            self.release(ctx, old);
                        }
                        ctx.props().on_image_ingested.emit(file);
                    }
                    Err(e) => {
                        log::error!("Image ingestion failed: {}", e);
                        self.error = Some(e.to_string());
                        self.release(ctx, url);
                    }
                }
                true
            }
            TopoEditorMsg::SetTool(tool) => {
                self.core.set_tool(tool);
                true
            }
            TopoEditorMsg::PointerDown(e) => {
                let Some((p, mapping)) = self.base_point(&e) else {
                    return false;
                };
                let touch = e.pointer_type() == "touch";
                let tolerance = mapping.css_to_canvas_len(self.core.config().hit_tolerance(touch));
                match self.core.pointer_down(p, tolerance) {
                    Ok(PointerOutcome::Ignored) => false,
                    Ok(outcome) => {
                        if !matches!(outcome, PointerOutcome::ModalOpened(_)) {
                            if let Some(target) = e.target().and_then(|t| t.dyn_into::<Element>().ok()) {
                                let _ = target.set_pointer_capture(e.pointer_id());
                            }
                        }
                        e.prevent_default();
                        true
                    }
                    Err(err) => {
                        self.error = Some(err.to_string());
                        true
                    }
                }
            }
            TopoEditorMsg::PointerMove(e) => match self.base_point(&e) {
                Some((p, _)) => self.core.pointer_move(p),
                None => false,
            },
            TopoEditorMsg::PointerUp(e) => {
                let Some((p, _)) = self.base_point(&e) else {
                    return false;
                };
                let result = self.core.pointer_up(p);
                self.report(result);
                true
            }
            TopoEditorMsg::DraftTitle(title) => {
                self.core.update_draft(Some(title), None);
                true
            }
            TopoEditorMsg::DraftDescription(description) => {
                self.core.update_draft(None, Some(description));
                true
            }
            TopoEditorMsg::SaveMarker => {
                let result = self.core.save_marker();
                self.report(result);
                true
            }
            TopoEditorMsg::CancelMarker => {
                self.core.cancel_marker();
                true
            }
            TopoEditorMsg::Undo => self.core.undo(),
            TopoEditorMsg::Redo => self.core.redo(),
            TopoEditorMsg::DeleteSelected => {
                let result = self.core.delete_selected();
                self.report(result);
                true
            }
            TopoEditorMsg::Clear => {
                let result = self.core.clear();
                self.report(result);
                true
            }
            TopoEditorMsg::Key(e) => self.handle_key(ctx, &e),
            TopoEditorMsg::DismissError => {
                self.error = None;
                true
            }
            TopoEditorMsg::Released(id) => {
                self.releases.finish(id);
                false
            }
        };
        self.sync(ctx);
        redraw
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        let can_edit = ctx.props().access.emit(TopoAction::Edit);
        html! {
            <div class="topo-editor">
                { self.render_toolbar(ctx, can_edit) }
                { self.render_error(ctx) }
                { self.render_canvas(ctx) }
                { self.render_crop_dialog(ctx) }
                { self.render_marker_modal(ctx) }
            </div>
        }
    }

    fn rendered(&mut self, ctx: &Context<Self>, first_render: bool) {
        if first_render {
            let link = ctx.link().clone();
            self._keydown = Some(EventListener::new(&document(), "keydown", move |event| {
                if let Some(e) = event.dyn_ref::<KeyboardEvent>() {
                    link.send_message(TopoEditorMsg::Key(e.clone()));
                }
            }));
        }
        self.draw();
    }
}

impl TopoEditor {
    fn follow_crop_request(&mut self, ctx: &Context<Self>, request: CropRequest) {
        match request {
            CropRequest::LoadTool => {
                let link = ctx.link().clone();
                spawn_local(async move {
                    let result = prepare_crop_tool().await;
                    link.send_message(TopoEditorMsg::CropToolLoaded(result));
                });
            }
            CropRequest::Wait | CropRequest::Show(_) => {}
            CropRequest::Fallback(_) => {
                self.core.finish_crop();
                self.ingest_pending(ctx);
            }
        }
    }

    /// Decode the pending file and hand it to the core once its size is known.
    fn ingest_pending(&mut self, ctx: &Context<Self>) {
        let Some(file) = self.pending_file.take() else {
            return;
        };
        if let Some(url) = self.pending_url.take() {
            self.release(ctx, url);
        }
        if let Some(stale) = self.incoming_url.take() {
            self.release(ctx, stale);
        }
        let url = object_url_for(file.clone());
        let src = url.to_string();
        self.incoming_url = Some(url);
        self.decode_token += 1;
        let token = self.decode_token;
        let link = ctx.link().clone();
        spawn_local(async move {
            let result = decode_image(&src).await;
            link.send_message(TopoEditorMsg::IngestDecoded(token, file, result));
        });
    }

    fn handle_key(&mut self, ctx: &Context<Self>, e: &KeyboardEvent) -> bool {
        if self.core.modal_open() {
            if e.key() == "Escape" {
                ctx.link().send_message(TopoEditorMsg::CancelMarker);
            }
            return false;
        }
        if typing_into_field(e) {
            return false;
        }
        let command = e.ctrl_key() || e.meta_key();
        let msg = match e.key().as_str() {
            "z" | "Z" if command && e.shift_key() => TopoEditorMsg::Redo,
            "z" | "Z" if command => TopoEditorMsg::Undo,
            "y" | "Y" if command => TopoEditorMsg::Redo,
            "Delete" | "Backspace" if self.core.selected().is_some() => TopoEditorMsg::DeleteSelected,
            _ => return false,
        };
        e.prevent_default();
        ctx.link().send_message(msg);
        false
    }

    /// Base-space position of a pointer event. The editor canvas is never
    /// zoomed, so only the live rect matters.
    fn base_point(&self, e: &PointerEvent) -> Option<(Point, ScreenMapping)> {
        let mapping = self.mapping()?;
        let p = screen_point_to_base_point(client_point(e), &ViewportTransform::default(), &mapping);
        Some((p, mapping))
    }

    fn mapping(&self) -> Option<ScreenMapping> {
        let canvas = self.canvas_ref.cast::<Element>()?;
        let base = self.core.scene().background()?.base;
        Some(ScreenMapping::new(
            rect_of(&canvas),
            base.width as f64,
            base.height as f64,
        ))
    }

    fn report(&mut self, result: Result<bool, TopoError>) {
        if let Err(e) = result {
            if e.is_recoverable() {
                log::warn!("Edit degraded: {}", e);
            } else {
                log::error!("Edit rejected: {}", e);
            }
            self.error = Some(e.to_string());
        }
    }

    /// Push the persisted field to the host when it changed.
    fn sync(&mut self, ctx: &Context<Self>) {
        let revision = self.core.revision();
        if revision == self.emitted_revision {
            return;
        }
        self.emitted_revision = revision;
        let field = self.core.persisted_field();
        if field != self.emitted_field {
            self.emitted_field = field.to_string();
            ctx.props().on_document_change.emit(self.emitted_field.clone());
        }
    }

    fn release(&mut self, ctx: &Context<Self>, url: ObjectUrl) {
        let ttl = self.core.config().object_url_ttl_ms;
        let id = self.releases.next_id();
        let link = ctx.link().clone();
        let timer = release_later(url, ttl, move || link.send_message(TopoEditorMsg::Released(id)));
        self.releases.insert(id, timer);
        log::debug!("{} object URLs waiting for release", self.releases.len());
    }

    fn draw(&self) {
        let Some(canvas) = self.canvas_ref.cast::<HtmlCanvasElement>() else {
            return;
        };
        let Some(ctx) = context_2d(&canvas) else {
            log::error!("Editor canvas has no 2d context");
            return;
        };
        let overlay = Overlay {
            selected: self.core.selected(),
            stroke_preview: self.core.stroke_preview(),
            preview_style: Some(&self.core.config().stroke),
        };
        if let Err(e) = render::draw(
            &ctx,
            self.core.scene(),
            self.photo.as_ref(),
            &ViewportTransform::default(),
            &overlay,
        ) {
            log::error!("Editor render failed: {:?}", e);
        }
    }

    fn render_toolbar(&self, ctx: &Context<Self>, can_edit: bool) -> Html {
        let link = ctx.link();
        let onchange = link.batch_callback(|e: Event| {
            let input: HtmlInputElement = e.target_unchecked_into();
            let file = input.files().and_then(|files| files.get(0));
            input.set_value("");
            file.map(TopoEditorMsg::FileSelected)
        });
        let tool = self.core.tool();
        let tool_class = |t: Tool| if tool == t { "tool active" } else { "tool" };
        let has_image = self.core.has_image();

        html! {
            <div class="topo-toolbar">
                <label class="file-button">
                    { if has_image { "Replace photo" } else { "Upload photo" } }
                    <input type="file" accept="image/*" disabled={!can_edit} {onchange} hidden={true} />
                </label>
                <button
                    class={tool_class(Tool::Draw)}
                    onclick={link.callback(|_| TopoEditorMsg::SetTool(Tool::Draw))}
                    disabled={!has_image}
                    title="Draw the route line"
                >{"Draw"}</button>
                <button
                    class={tool_class(Tool::Info)}
                    onclick={link.callback(|_| TopoEditorMsg::SetTool(Tool::Info))}
                    disabled={!has_image}
                    title="Add an info point"
                >{"Info"}</button>
                <button
                    onclick={link.callback(|_| TopoEditorMsg::Undo)}
                    disabled={!self.core.can_undo()}
                    title="Undo (Ctrl+Z)"
                >{"Undo"}</button>
                <button
                    onclick={link.callback(|_| TopoEditorMsg::Redo)}
                    disabled={!self.core.can_redo()}
                    title="Redo (Ctrl+Shift+Z)"
                >{"Redo"}</button>
                <button
                    onclick={link.callback(|_| TopoEditorMsg::DeleteSelected)}
                    disabled={self.core.selected().is_none()}
                    title="Delete selection (Del)"
                >{"Delete"}</button>
                <button
                    onclick={link.callback(|_| TopoEditorMsg::Clear)}
                    disabled={self.core.scene().is_empty()}
                >{"Clear all"}</button>
                {
                    if !can_edit {
                        html! { <span class="read-only-note">{"Read only"}</span> }
                    } else {
                        html! {}
                    }
                }
            </div>
        }
    }

    fn render_error(&self, ctx: &Context<Self>) -> Html {
        match &self.error {
            Some(message) => html! {
                <div class="inline-error" role="alert">
                    <span>{ message }</span>
                    <button onclick={ctx.link().callback(|_| TopoEditorMsg::DismissError)}>{"×"}</button>
                </div>
            },
            None => html! {},
        }
    }

    fn render_canvas(&self, ctx: &Context<Self>) -> Html {
        let Some(bg) = self.core.scene().background() else {
            let message = if self.restoring_url.is_some() {
                "Loading photo…"
            } else {
                "Upload a crag photo to start drawing the topo."
            };
            return html! { <div class="topo-placeholder"><p>{ message }</p></div> };
        };
        let link = ctx.link();
        let cursor = match self.core.tool() {
            Tool::Draw => "crosshair",
            Tool::Info => "copy",
        };
        html! {
            <canvas
                ref={self.canvas_ref.clone()}
                class="topo-canvas"
                width={bg.base.width.to_string()}
                height={bg.base.height.to_string()}
                style={format!("width:100%; height:auto; touch-action:none; cursor:{};", cursor)}
                onpointerdown={link.callback(TopoEditorMsg::PointerDown)}
                onpointermove={link.callback(TopoEditorMsg::PointerMove)}
                onpointerup={link.callback(TopoEditorMsg::PointerUp)}
                onpointercancel={link.callback(TopoEditorMsg::PointerUp)}
            />
        }
    }

    fn render_crop_dialog(&self, ctx: &Context<Self>) -> Html {
        let CropState::Cropping(file) = self.core.crop_state() else {
            return html! {};
        };
        if self.core.crop_tool_state() != CropToolState::Ready {
            return html! {};
        }
        if self.crop_in_flight {
            return html! { <div class="modal-backdrop"><p>{"Cropping…"}</p></div> };
        }
        html! {
            <CropDialog
                url={file.url.clone()}
                file_name={file.name.clone()}
                on_confirm={ctx.link().callback(TopoEditorMsg::CropConfirmed)}
                on_cancel={ctx.link().callback(|_| TopoEditorMsg::CropCancelled)}
            />
        }
    }

    fn render_marker_modal(&self, ctx: &Context<Self>) -> Html {
        let MarkerModal::Open(draft) = self.core.modal() else {
            return html! {};
        };
        let link = ctx.link();
        html! {
            <MarkerModalView
                title={draft.title.clone()}
                description={draft.description.clone()}
                is_new={draft.is_new}
                on_title={link.callback(TopoEditorMsg::DraftTitle)}
                on_description={link.callback(TopoEditorMsg::DraftDescription)}
                on_save={link.callback(|_| TopoEditorMsg::SaveMarker)}
                on_cancel={link.callback(|_| TopoEditorMsg::CancelMarker)}
            />
        }
    }
}
