// src/media.rs
//
// Browser glue for images: decoding, element geometry, cropping to a file
// and short-lived object URLs.

use crate::annotation::ImageSize;
use crate::config::CropSettings;
use crate::error::TopoError;
use crate::geometry::{CropRect, ScreenRect};
use std::collections::HashMap;

use gloo::file::ObjectUrl;
use gloo::timers::callback::Timeout;
use gloo::utils::document;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, Element, File, FilePropertyBag, HtmlCanvasElement, HtmlImageElement};

fn describe(err: JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

/// Load `url` into an image element and wait until it can be drawn.
pub async fn decode_image(url: &str) -> Result<(HtmlImageElement, ImageSize), TopoError> {
    let img = HtmlImageElement::new().map_err(|e| TopoError::InvalidImage(describe(e)))?;
    img.set_src(url);
    JsFuture::from(img.decode())
        .await
        .map_err(|e| TopoError::InvalidImage(format!("{} could not be decoded: {}", url, describe(e))))?;
    let natural = ImageSize {
        width: img.natural_width(),
        height: img.natural_height(),
    };
    if natural.width == 0 || natural.height == 0 {
        return Err(TopoError::InvalidImage(format!("{} has no pixels", url)));
    }
    Ok((img, natural))
}

pub fn rect_of(element: &Element) -> ScreenRect {
    let rect = element.get_bounding_client_rect();
    ScreenRect {
        left: rect.left(),
        top: rect.top(),
        width: rect.width(),
        height: rect.height(),
    }
}

pub fn context_2d(canvas: &HtmlCanvasElement) -> Option<CanvasRenderingContext2d> {
    canvas
        .get_context("2d")
        .ok()
        .flatten()
        .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
}

fn scratch_canvas(width: u32, height: u32) -> Result<(HtmlCanvasElement, CanvasRenderingContext2d), TopoError> {
    let canvas = document()
        .create_element("canvas")
        .map_err(|e| TopoError::CropUnavailable(describe(e)))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| TopoError::CropUnavailable("not a canvas element".to_string()))?;
    canvas.set_width(width);
    canvas.set_height(height);
    let ctx = context_2d(&canvas)
        .ok_or_else(|| TopoError::CropUnavailable("2d context unavailable".to_string()))?;
    Ok((canvas, ctx))
}

/// Check that an offscreen canvas with blob export is usable. Anything else
/// means the upload skips cropping.
pub async fn prepare_crop_tool() -> Result<(), TopoError> {
    let (canvas, _ctx) = scratch_canvas(1, 1)?;
    if js_sys::Reflect::has(canvas.as_ref(), &JsValue::from_str("toBlob")).unwrap_or(false) {
        Ok(())
    } else {
        Err(TopoError::CropUnavailable("canvas export is not supported".to_string()))
    }
}

/// Cut `rect` (image pixels) out of `img` and encode it as a new file,
/// downscaled so neither side exceeds the crop limit.
pub async fn crop_to_file(
    img: &HtmlImageElement,
    rect: CropRect,
    settings: &CropSettings,
    name: &str,
) -> Result<File, TopoError> {
    let out = rect.output_size(settings.max_dimension);
    let (canvas, ctx) = scratch_canvas(out.width, out.height)?;
    ctx.draw_image_with_html_image_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
        img,
        rect.x as f64,
        rect.y as f64,
        rect.width as f64,
        rect.height as f64,
        0.0,
        0.0,
        out.width as f64,
        out.height as f64,
    )
    .map_err(|e| TopoError::CropUnavailable(describe(e)))?;

    let mime = settings.mime_type.clone();
    let quality = JsValue::from_f64(settings.quality);
    let promise = js_sys::Promise::new(&mut |resolve, reject| {
        if let Err(e) = canvas.to_blob_with_type_and_encoder_options(&resolve, &mime, &quality) {
            let _ = reject.call1(&JsValue::NULL, &e);
        }
    });
    let blob = JsFuture::from(promise)
        .await
        .map_err(|e| TopoError::CropUnavailable(describe(e)))?
        .dyn_into::<web_sys::Blob>()
        .map_err(|_| TopoError::CropUnavailable("canvas produced no image".to_string()))?;

    let bag = FilePropertyBag::new();
    bag.set_type(&settings.mime_type);
    File::new_with_blob_sequence_and_options(&js_sys::Array::of1(&blob), name, &bag)
        .map_err(|e| TopoError::CropUnavailable(describe(e)))
}

/// Name for the cropped upload: the original stem plus an extension for `mime`.
pub fn cropped_file_name(original: &str, mime: &str) -> String {
    let stem = match original.rfind('.') {
        Some(dot) if dot > 0 => &original[..dot],
        _ => original,
    };
    let ext = match mime {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    };
    format!("{}-cropped.{}", stem, ext)
}

pub fn object_url_for(file: File) -> ObjectUrl {
    ObjectUrl::from(gloo::file::File::from(file))
}

/// Revoke `url` after `ttl_ms`, then run `on_fired`. Dropping the timer
/// early (page unload) also drops the URL.
pub fn release_later(url: ObjectUrl, ttl_ms: u32, on_fired: impl FnOnce() + 'static) -> Timeout {
    Timeout::new(ttl_ms, move || {
        log::debug!("Releasing object URL {}", &*url);
        drop(url);
        on_fired();
    })
}

/// Release timers that have not fired yet. Each timer removes its own
/// entry through the id it was given.
pub struct PendingReleases<T> {
    next: u64,
    entries: HashMap<u64, T>,
}

impl<T> Default for PendingReleases<T> {
    fn default() -> Self {
        Self {
            next: 0,
            entries: HashMap::new(),
        }
    }
}

impl<T> PendingReleases<T> {
    pub fn next_id(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    pub fn insert(&mut self, id: u64, timer: T) {
        self.entries.insert(id, timer);
    }

    /// Forget a fired timer. Returns false for unknown ids.
    pub fn finish(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
