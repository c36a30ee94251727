// src/components/marker_modal.rs
use web_sys::{HtmlInputElement, HtmlTextAreaElement};
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct MarkerModalProps {
    pub title: String,
    pub description: String,
    pub is_new: bool,
    pub on_title: Callback<String>,
    pub on_description: Callback<String>,
    pub on_save: Callback<()>,
    pub on_cancel: Callback<()>,
}

#[function_component(MarkerModal)]
pub fn marker_modal(props: &MarkerModalProps) -> Html {
    let oninput_title = {
        let on_title = props.on_title.clone();
        Callback::from(move |e: InputEvent| {
            let input: HtmlInputElement = e.target_unchecked_into();
            on_title.emit(input.value());
        })
    };
    let oninput_description = {
        let on_description = props.on_description.clone();
        Callback::from(move |e: InputEvent| {
            let area: HtmlTextAreaElement = e.target_unchecked_into();
            on_description.emit(area.value());
        })
    };
    let onsubmit = {
        let on_save = props.on_save.clone();
        Callback::from(move |e: SubmitEvent| {
            e.prevent_default();
            on_save.emit(());
        })
    };
    let oncancel = {
        let on_cancel = props.on_cancel.clone();
        Callback::from(move |_: MouseEvent| on_cancel.emit(()))
    };

    let blank = props.is_new && props.title.trim().is_empty() && props.description.trim().is_empty();
    let heading = if props.is_new { "New info point" } else { "Edit info point" };

    html! {
        <div class="modal-backdrop">
            <form class="marker-modal" role="dialog" aria-label={heading} {onsubmit}>
                <h3>{ heading }</h3>
                <label>
                    {"Title"}
                    <input
                        type="text"
                        value={props.title.clone()}
                        oninput={oninput_title}
                        placeholder="e.g. Crux, bolt 3"
                    />
                </label>
                <label>
                    {"Description"}
                    <textarea
                        rows="4"
                        value={props.description.clone()}
                        oninput={oninput_description}
                    />
                </label>
                <div class="dialog-actions">
                    <button type="submit" disabled={blank}>{"Save"}</button>
                    <button type="button" onclick={oncancel}>{"Cancel"}</button>
                </div>
            </form>
        </div>
    }
}
