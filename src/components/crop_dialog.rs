// src/components/crop_dialog.rs
use crate::annotation::ImageSize;
use crate::geometry::{CropRect, Point, ScreenMapping};
use crate::media::rect_of;
use wasm_bindgen::JsCast;
use web_sys::{Element, Event, HtmlImageElement, PointerEvent};
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct CropDialogProps {
    pub url: String,
    pub file_name: String,
    /// `None` means "use the original file".
    pub on_confirm: Callback<Option<CropRect>>,
    pub on_cancel: Callback<()>,
}

fn image_point(img: &NodeRef, natural: ImageSize, e: &PointerEvent) -> Option<Point> {
    let element = img.cast::<Element>()?;
    let mapping = ScreenMapping::new(rect_of(&element), natural.width as f64, natural.height as f64);
    Some(mapping.screen_to_canvas(Point::new(e.client_x() as f64, e.client_y() as f64)))
}

#[function_component(CropDialog)]
pub fn crop_dialog(props: &CropDialogProps) -> Html {
    let natural = use_state(|| None::<ImageSize>);
    let anchor = use_state(|| None::<Point>);
    let selection = use_state(|| None::<CropRect>);
    let img_ref = use_node_ref();

    let onload = {
        let natural = natural.clone();
        Callback::from(move |e: Event| {
            if let Some(img) = e.target().and_then(|t| t.dyn_into::<HtmlImageElement>().ok()) {
                natural.set(Some(ImageSize {
                    width: img.natural_width(),
                    height: img.natural_height(),
                }));
            }
        })
    };

    let onpointerdown = {
        let natural = natural.clone();
        let anchor = anchor.clone();
        let selection = selection.clone();
        let img_ref = img_ref.clone();
        Callback::from(move |e: PointerEvent| {
            let Some(size) = *natural else {
                return;
            };
            e.prevent_default();
            if let Some(target) = e.target().and_then(|t| t.dyn_into::<Element>().ok()) {
                let _ = target.set_pointer_capture(e.pointer_id());
            }
            anchor.set(image_point(&img_ref, size, &e));
            selection.set(None);
        })
    };

    let onpointermove = {
        let natural = natural.clone();
        let anchor = anchor.clone();
        let selection = selection.clone();
        let img_ref = img_ref.clone();
        Callback::from(move |e: PointerEvent| {
            let (Some(size), Some(start)) = (*natural, *anchor) else {
                return;
            };
            if let Some(p) = image_point(&img_ref, size, &e) {
                selection.set(CropRect::from_drag(start, p, size));
            }
        })
    };

    let onpointerup = {
        let anchor = anchor.clone();
        Callback::from(move |_: PointerEvent| anchor.set(None))
    };

    let on_crop = {
        let selection = selection.clone();
        let on_confirm = props.on_confirm.clone();
        Callback::from(move |_: MouseEvent| {
            if let Some(rect) = *selection {
                on_confirm.emit(Some(rect));
            }
        })
    };
    let on_original = {
        let on_confirm = props.on_confirm.clone();
        Callback::from(move |_: MouseEvent| on_confirm.emit(None))
    };
    let on_cancel = {
        let on_cancel = props.on_cancel.clone();
        Callback::from(move |_: MouseEvent| on_cancel.emit(()))
    };

    let overlay = match (*natural, *selection) {
        (Some(size), Some(rect)) => {
            let pct = |v: u32, total: u32| v as f64 / total as f64 * 100.0;
            let style = format!(
                "position:absolute; left:{:.3}%; top:{:.3}%; width:{:.3}%; height:{:.3}%; \
                 border:2px dashed #ffd54f; box-shadow:0 0 0 9999px rgba(0,0,0,0.45); pointer-events:none;",
                pct(rect.x, size.width),
                pct(rect.y, size.height),
                pct(rect.width, size.width),
                pct(rect.height, size.height),
            );
            html! { <div class="crop-selection" {style}></div> }
        }
        _ => html! {},
    };

    let summary = match *selection {
        Some(rect) => format!("{} × {} px", rect.width, rect.height),
        None => "Drag over the photo to choose the area to keep".to_string(),
    };

    html! {
        <div class="modal-backdrop">
            <div class="crop-dialog" role="dialog" aria-label="Crop photo">
                <h3>{ format!("Crop {}", props.file_name) }</h3>
                <div
                    class="crop-stage"
                    style="position:relative; display:inline-block; touch-action:none; user-select:none;"
                    {onpointerdown}
                    {onpointermove}
                    {onpointerup}
                >
                    <img
                        ref={img_ref}
                        src={props.url.clone()}
                        {onload}
                        draggable="false"
                        style="display:block; max-width:100%; max-height:70vh;"
                    />
                    { overlay }
                </div>
                <p class="crop-summary">{ summary }</p>
                <div class="dialog-actions">
                    <button onclick={on_crop} disabled={selection.is_none()}>{"Crop"}</button>
                    <button onclick={on_original}>{"Use original"}</button>
                    <button onclick={on_cancel}>{"Cancel"}</button>
                </div>
            </div>
        </div>
    }
}
