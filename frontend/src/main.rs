mod api;
mod components;

use api::{OcrClient, compiled_config};
use components::google_auth::GoogleAuth;
use shared::{
    AnomalyRecord, ApiError, CancelResponse, ClientConfig, DownloadFormat, FileMeta,
    StatusSnapshot, TaskId, UploadSession, ValidationReport,
};
use std::time::Duration;
use web_sys::DragEvent;
use yew::prelude::*;

/// Path the identity provider sends the browser back to.
const GOOGLE_AUTH_PATH: &str = "/google-auth";

// Models
#[derive(Clone)]
pub struct SelectedFile {
    pub id: u64,
    pub raw: web_sys::File,
    pub meta: FileMeta,
}

/// One block of the result area, rendered in arrival order.
pub enum ResultEntry {
    Line(String),
    Validation(ValidationReport),
    Anomalies(Vec<AnomalyRecord>),
}

// Yew msg components
pub enum Msg {
    // File operations
    FilesSelected(Vec<web_sys::File>),
    RemoveFile(u64),
    ClearAllFiles,

    // Task cycle
    Submit,
    UploadProgress(u8),
    Uploaded(Result<TaskId, ApiError>),
    Progress(TaskId, StatusSnapshot),
    PollFinished(TaskId, Result<StatusSnapshot, ApiError>),
    Downloaded(TaskId, DownloadFormat, Result<(), ApiError>),
    ValidationLoaded(TaskId, Result<ValidationReport, ApiError>),
    AnomaliesLoaded(TaskId, Result<Vec<AnomalyRecord>, ApiError>),
    ResultsDone(TaskId),
    Cancel,
    CancelAcknowledged(TaskId, Result<CancelResponse, ApiError>),

    // UI states
    SetError(Option<String>),
    SetDragging(bool),

    // Input events
    HandleDrop(DragEvent),
}

// Upload page component
pub struct Model {
    pub config: ClientConfig,
    pub client: OcrClient,
    pub files: Vec<SelectedFile>,
    pub session: UploadSession,
    pub started_at: Duration,
    pub progress: u8,
    pub progress_text: String,
    pub results: Vec<ResultEntry>,
    pub error: Option<String>,
    pub is_dragging: bool,
}

impl Component for Model {
    type Message = Msg;
    type Properties = ();

    fn create(_ctx: &Context<Self>) -> Self {
        let config = compiled_config();
        if config.api_key_missing() {
            log::warn!("No OCR API key configured; requests will go out without one");
        }

        let model = Self {
            client: OcrClient::new(config.clone()),
            config,
            files: Vec::new(),
            session: UploadSession::new(),
            started_at: Duration::ZERO,
            progress: 0,
            progress_text: String::new(),
            results: Vec::new(),
            error: None,
            is_dragging: false,
        };

        components::handlers::check_health(&model.client);
        model
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        use components::handlers::*;

        match msg {
            // File operations
            Msg::FilesSelected(files) => handle_files_selected(self, files),
            Msg::RemoveFile(id) => handle_remove_file(self, id),
            Msg::ClearAllFiles => handle_clear_all_files(self),

            // Task cycle
            Msg::Submit => handle_submit(self, ctx),
            Msg::UploadProgress(percent) => handle_upload_progress(self, percent),
            Msg::Uploaded(result) => handle_uploaded(self, ctx, result),
            Msg::Progress(task, snapshot) => handle_progress(self, &task, snapshot),
            Msg::PollFinished(task, result) => handle_poll_finished(self, ctx, task, result),
            Msg::Downloaded(task, format, result) => handle_downloaded(self, &task, format, result),
            Msg::ValidationLoaded(task, result) => handle_validation_loaded(self, &task, result),
            Msg::AnomaliesLoaded(task, result) => handle_anomalies_loaded(self, &task, result),
            Msg::ResultsDone(task) => handle_results_done(self, &task),
            Msg::Cancel => handle_cancel(self, ctx),
            Msg::CancelAcknowledged(task, result) => handle_cancel_acknowledged(self, &task, result),

            // UI states
            Msg::SetError(error) => {
                self.error = error;
                true
            }
            Msg::SetDragging(is_dragging) => {
                self.is_dragging = is_dragging;
                true
            }

            // Input events
            Msg::HandleDrop(event) => handle_drop(self, ctx, event),
        }
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        html! {
            <div class="container">
                { components::header::render_header() }
                { components::utils::render_api_key_warning(self) }

                <main class="main-content">
                    { components::upload_section::render_upload_section(self, ctx) }
                    { components::file_list::render_file_list(self, ctx) }
                    { components::progress::render_progress(self) }
                    { components::utils::render_error_message(self) }
                    { components::results::render_results(self) }
                </main>

                <footer class="app-footer">
                    <p>{"Invoice OCR | Rust WASM client"}</p>
                </footer>
            </div>
        }
    }
}

#[function_component(App)]
fn app() -> Html {
    let path = web_sys::window()
        .and_then(|w| w.location().pathname().ok())
        .unwrap_or_default();

    if path.trim_end_matches('/') == GOOGLE_AUTH_PATH {
        html! { <GoogleAuth config={compiled_config()} /> }
    } else {
        html! { <Model /> }
    }
}

fn main() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("App starting...");
    yew::Renderer::<App>::new().render();
}
