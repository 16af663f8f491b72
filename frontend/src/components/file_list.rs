use crate::components::utils::debounce;
use crate::{Model, Msg, SelectedFile};
use shared::upload::format_size;
use yew::prelude::*;

pub fn render_file_list(model: &Model, ctx: &Context<Model>) -> Html {
    if model.files.is_empty() {
        return html! {};
    }

    let link = ctx.link().clone();
    let locked = model.session.is_active();

    html! {
        <div id="file-list-container">
            <h2>{ format!("Selected files: {}", model.files.len()) }</h2>
            <ul id="file-list">
                { for model.files.iter().map(|file| render_file_item(ctx, file, locked)) }
            </ul>
            <button
                id="clear-all-btn"
                type="button"
                class="analyze-btn"
                style="background-color: var(--clear-color);"
                disabled={locked}
                onclick={debounce(300, {
                    let link = link.clone();
                    move || link.send_message(Msg::ClearAllFiles)
                })}
            >
                <i class="fa-solid fa-trash"></i>{" Clear All"}
            </button>
        </div>
    }
}

fn render_file_item(ctx: &Context<Model>, file: &SelectedFile, locked: bool) -> Html {
    let file_id = file.id;
    let accepted = file.meta.accepted_type();
    let type_label = match accepted {
        Some(t) => t.label().to_string(),
        None if file.meta.mime.is_empty() => "unknown type".to_string(),
        None => file.meta.mime.clone(),
    };

    html! {
        <li
            class={classes!("file-item", accepted.is_none().then_some("unsupported"))}
            key={file_id.to_string()}
            title={file.meta.name.clone()}
        >
            <span class="file-name">{ &file.meta.name }</span>
            <span class="file-type">{ type_label }</span>
            <span class="file-size">{ format_size(file.meta.size) }</span>
            <button
                type="button"
                class="remove-btn"
                title="Remove this file"
                disabled={locked}
                onclick={ctx.link().callback(move |e: MouseEvent| {
                    e.stop_propagation();
                    Msg::RemoveFile(file_id)
                })}
            >
                <i class="fa-solid fa-times" style="font-size: 10px;"></i>
            </button>
        </li>
    }
}
