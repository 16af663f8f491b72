use yew::prelude::*;

/// Renders the application header
pub fn render_header() -> Html {
    html! {
        <header class="app-header">
            <h1><i class="fa-solid fa-file-invoice"></i> {" Invoice OCR"}</h1>
            <p class="subtitle">{"Upload invoices as PDF, JPEG, PNG or ZIP and download the extracted results"}</p>
        </header>
    }
}
