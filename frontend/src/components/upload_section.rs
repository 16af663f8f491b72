use crate::components::handlers::files_from_list;
use crate::components::utils::debounce;
use crate::{Model, Msg};
use shared::AcceptedType;
use wasm_bindgen::JsCast;
use web_sys::{DragEvent, HtmlInputElement};
use yew::prelude::*;

pub fn render_upload_section(model: &Model, ctx: &Context<Model>) -> Html {
    html! {
        <form
            id="upload-form"
            class="upload-section"
            onsubmit={ctx.link().callback(|e: SubmitEvent| {
                e.prevent_default();
                Msg::Submit
            })}
        >
            { render_file_input_area(model, ctx) }
            { render_controls(model, ctx) }
        </form>
    }
}

fn render_file_input_area(model: &Model, ctx: &Context<Model>) -> Html {
    let busy = model.session.is_active();
    let link = ctx.link();

    let handle_change = link.callback(|e: Event| {
        let input: HtmlInputElement = e.target_unchecked_into();
        let files = input.files().as_ref().map(files_from_list).unwrap_or_default();

        input.set_value("");

        if !files.is_empty() {
            Msg::FilesSelected(files)
        } else {
            Msg::SetError(Some("No files selected.".into()))
        }
    });

    let handle_drag_over = link.callback(|e: DragEvent| {
        e.prevent_default();
        Msg::SetDragging(true)
    });

    let handle_drag_leave = link.callback(|e: DragEvent| {
        e.prevent_default();
        Msg::SetDragging(false)
    });

    let handle_drop = link.callback(Msg::HandleDrop);
    let trigger_file_input = Callback::from(|_| {
        if let Some(input) = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id("file-input"))
        {
            if let Ok(html_input) = input.dyn_into::<web_sys::HtmlElement>() {
                html_input.click();
            }
        }
    });

    let supported = AcceptedType::ALL
        .iter()
        .map(|t| t.label())
        .collect::<Vec<_>>()
        .join(", ");

    html! {
        <>
            <input
                type="file"
                id="file-input"
                multiple=true
                accept={AcceptedType::accept_attr()}
                style="display: none;"
                disabled={busy}
                onchange={handle_change}
            />

            <div
                id="drop-zone"
                class={classes!("upload-area", model.is_dragging.then_some("drag-over"), busy.then_some("disabled"))}
                ondragover={handle_drag_over}
                ondragleave={handle_drag_leave}
                ondrop={handle_drop}
                onclick={debounce(300, {
                    let trigger_file_input = trigger_file_input.clone();
                    move || if !busy { trigger_file_input.emit(()) }
                })}
            >
                <div class="upload-placeholder">
                    <i class="fa-solid fa-cloud-arrow-up"></i>
                    <p>{"Drag & drop invoices here, or click to browse"}</p>
                    <p class="file-types">{ format!("Supported formats: {}", supported) }</p>
                </div>
            </div>
        </>
    }
}

fn render_controls(model: &Model, ctx: &Context<Model>) -> Html {
    let link = ctx.link().clone();
    let can_submit = model.session.can_submit();

    html! {
        <div class="button-container">
            <button
                id="upload-button"
                type="submit"
                class="analyze-btn"
                disabled={!can_submit || model.files.is_empty()}
            >
                {
                    if can_submit {
                        html! { <><i class="fa-solid fa-upload"></i>{" Upload & Process"}</> }
                    } else {
                        html! { <><i class="fa-solid fa-spinner fa-spin"></i>{" Processing..."}</> }
                    }
                }
            </button>
            <button
                id="cancel-button"
                type="button"
                class="analyze-btn"
                style="background-color: var(--danger-color);"
                disabled={can_submit}
                onclick={debounce(300, {
                    let link = link.clone();
                    move || link.send_message(Msg::Cancel)
                })}
            >
                <i class="fa-solid fa-ban"></i>{" Cancel"}
            </button>
        </div>
    }
}
