use crate::Model;
use yew::prelude::*;

pub fn render_progress(model: &Model) -> Html {
    if !model.session.is_active() && model.progress_text.is_empty() {
        return html! {};
    }

    html! {
        <div class="progress-container">
            <div class="meter">
                <div id="progress-bar" class="meter-fill" style={format!("width: {}%", model.progress)}></div>
            </div>
            <div id="progress-text" class="meter-value">{ &model.progress_text }</div>
        </div>
    }
}
