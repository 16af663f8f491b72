use crate::api::{BrowserClock, OcrClient};
use crate::components::utils::{generate_id, save_bytes};
use crate::{Model, Msg, ResultEntry, SelectedFile};
use shared::poll::{Clock, poll_until_terminal};
use shared::upload::{uploading_label, validate_batch};
use shared::{
    AnomalyRecord, ApiError, CancelResponse, CancelToken, DownloadFormat, FileMeta, PollPolicy,
    StatusSnapshot, TaskId, ValidationReport,
};
use wasm_bindgen_futures::spawn_local;
use web_sys::{DragEvent, FileList};
use yew::prelude::*;

pub fn check_health(client: &OcrClient) {
    let client = client.clone();
    spawn_local(async move {
        match client.health().await {
            Ok(data) => log::info!("Health check successful: {}", data),
            Err(e) => log::error!("Health check failed: {}", e),
        }
    });
}

pub fn files_from_list(file_list: &FileList) -> Vec<web_sys::File> {
    (0..file_list.length())
        .filter_map(|i| file_list.item(i))
        .collect()
}

pub fn handle_files_selected(model: &mut Model, files: Vec<web_sys::File>) -> bool {
    if model.session.is_active() {
        model.error = Some("Files cannot be changed while a task is running.".into());
        return true;
    }

    model.error = None;
    for raw in files {
        let meta = FileMeta::new(raw.name(), raw.type_(), raw.size() as u64);
        model.files.push(SelectedFile {
            id: generate_id(),
            raw,
            meta,
        });
    }
    true
}

pub fn handle_remove_file(model: &mut Model, id: u64) -> bool {
    if model.session.is_active() {
        return false;
    }
    let before = model.files.len();
    model.files.retain(|f| f.id != id);
    if model.files.is_empty() {
        model.error = None;
    }
    model.files.len() != before
}

pub fn handle_clear_all_files(model: &mut Model) -> bool {
    if model.session.is_active() {
        return false;
    }
    model.files.clear();
    model.error = None;
    true
}

pub fn handle_drop(model: &mut Model, ctx: &Context<Model>, event: DragEvent) -> bool {
    event.prevent_default();
    model.is_dragging = false;

    if let Some(file_list) = event.data_transfer().and_then(|dt| dt.files()) {
        let files = files_from_list(&file_list);
        if !files.is_empty() {
            ctx.link().send_message(Msg::FilesSelected(files));
        }
    }

    true
}

pub fn handle_submit(model: &mut Model, ctx: &Context<Model>) -> bool {
    let metas: Vec<FileMeta> = model.files.iter().map(|f| f.meta.clone()).collect();
    if let Err(err) = validate_batch(&metas) {
        show_error(model, &err);
        return true;
    }

    let token = match model.session.begin_upload() {
        Ok(token) => token,
        Err(err) => {
            show_error(model, &err);
            return true;
        }
    };

    model.started_at = BrowserClock.now();
    model.results.clear();
    model.error = None;
    model.progress = 0;
    model.progress_text = uploading_label(0);

    let client = model.client.clone();
    let files: Vec<web_sys::File> = model.files.iter().map(|f| f.raw.clone()).collect();
    let link = ctx.link().clone();

    spawn_local(async move {
        let progress_link = link.clone();
        let result = client
            .upload(&files, None, &token, move |percent| {
                progress_link.send_message(Msg::UploadProgress(percent))
            })
            .await;
        link.send_message(Msg::Uploaded(result));
    });

    true
}

pub fn handle_upload_progress(model: &mut Model, percent: u8) -> bool {
    if !model.session.is_uploading() {
        return false;
    }
    model.progress = percent;
    model.progress_text = uploading_label(percent);
    true
}

pub fn handle_uploaded(model: &mut Model, ctx: &Context<Model>, result: Result<TaskId, ApiError>) -> bool {
    let task = match result {
        Ok(task) => task,
        Err(ApiError::Cancelled) => return false,
        Err(err) => {
            model.session.abort_upload();
            show_error(model, &err);
            return true;
        }
    };

    let token = match model.session.begin(task.clone()) {
        Ok(token) => token,
        Err(err) => {
            log::warn!("Discarding task {}: {}", task, err);
            return false;
        }
    };

    model.progress_text = "0% - Waiting for processing...".into();
    model
        .results
        .push(ResultEntry::Line(format!("Upload successful. Task ID: {}", task)));

    start_polling(model, ctx, task, token);
    true
}

fn start_polling(model: &Model, ctx: &Context<Model>, task: TaskId, token: CancelToken) {
    let client = model.client.clone();
    let started_at = model.started_at;
    let link = ctx.link().clone();

    spawn_local(async move {
        let source = client.tracked(&token);
        let progress_link = link.clone();
        let result = poll_until_terminal(
            &source,
            &BrowserClock,
            &task,
            &PollPolicy::default(),
            started_at,
            &token,
            |snapshot| progress_link.send_message(Msg::Progress(task.clone(), snapshot.clone())),
        )
        .await;
        link.send_message(Msg::PollFinished(task, result));
    });
}

pub fn handle_progress(model: &mut Model, task: &TaskId, snapshot: StatusSnapshot) -> bool {
    if !model.session.is_current(task) {
        return false;
    }
    model.progress = snapshot.progress;
    model.progress_text = snapshot.label();
    true
}

pub fn handle_poll_finished(
    model: &mut Model,
    ctx: &Context<Model>,
    task: TaskId,
    result: Result<StatusSnapshot, ApiError>,
) -> bool {
    if !model.session.is_current(&task) {
        return false;
    }

    match result {
        Ok(_) => {
            let Some(token) = model.session.token().cloned() else {
                return false;
            };
            model.results.push(ResultEntry::Line(
                "Processing complete. Downloading results...".into(),
            ));
            fetch_results(model, ctx, task, token);
        }
        Err(err) => {
            model.session.finish(&task);
            show_error(model, &err);
        }
    }
    true
}

// Each step reports on its own so one failure never stops the rest.
fn fetch_results(model: &Model, ctx: &Context<Model>, task: TaskId, token: CancelToken) {
    let client = model.client.clone();
    let link = ctx.link().clone();

    spawn_local(async move {
        for format in DownloadFormat::ALL {
            let result = match client.download(&task, format, &token).await {
                Ok(bytes) => save_bytes(&bytes, format.file_name(), format.mime()),
                Err(e) => Err(e),
            };
            if matches!(result, Err(ApiError::Cancelled)) {
                return;
            }
            link.send_message(Msg::Downloaded(task.clone(), format, result));
        }

        let validation = client.validation(&task, &token).await;
        if matches!(validation, Err(ApiError::Cancelled)) {
            return;
        }
        link.send_message(Msg::ValidationLoaded(task.clone(), validation));

        let anomalies = client.anomalies(&task, &token).await;
        if matches!(anomalies, Err(ApiError::Cancelled)) {
            return;
        }
        link.send_message(Msg::AnomaliesLoaded(task.clone(), anomalies));

        link.send_message(Msg::ResultsDone(task));
    });
}

pub fn handle_downloaded(
    model: &mut Model,
    task: &TaskId,
    format: DownloadFormat,
    result: Result<(), ApiError>,
) -> bool {
    if !model.session.is_current(task) {
        return false;
    }
    let line = match result {
        Ok(()) => format!("{} results downloaded.", format.label()),
        Err(err) => format!("Error downloading {}: {}", format.label(), err),
    };
    model.results.push(ResultEntry::Line(line));
    true
}

pub fn handle_validation_loaded(
    model: &mut Model,
    task: &TaskId,
    result: Result<ValidationReport, ApiError>,
) -> bool {
    if !model.session.is_current(task) {
        return false;
    }
    model.results.push(match result {
        Ok(report) => ResultEntry::Validation(report),
        Err(err) => ResultEntry::Line(format!("Error fetching validation results: {}", err)),
    });
    true
}

pub fn handle_anomalies_loaded(
    model: &mut Model,
    task: &TaskId,
    result: Result<Vec<AnomalyRecord>, ApiError>,
) -> bool {
    if !model.session.is_current(task) {
        return false;
    }
    model.results.push(match result {
        Ok(anomalies) => ResultEntry::Anomalies(anomalies),
        Err(err) => ResultEntry::Line(format!("Error fetching anomalies: {}", err)),
    });
    true
}

pub fn handle_results_done(model: &mut Model, task: &TaskId) -> bool {
    if !model.session.finish(task) {
        return false;
    }
    model
        .results
        .push(ResultEntry::Line("All processing complete.".into()));
    true
}

pub fn handle_cancel(model: &mut Model, ctx: &Context<Model>) -> bool {
    if !model.session.is_active() {
        return false;
    }

    model.progress = 0;
    model.progress_text = "Cancelled".into();
    model.error = None;

    match model.session.cancel() {
        Some(task) => {
            let client = model.client.clone();
            let link = ctx.link().clone();
            spawn_local(async move {
                let result = client.cancel(&task).await;
                link.send_message(Msg::CancelAcknowledged(task, result));
            });
        }
        None => {
            model.results.clear();
            model.results.push(ResultEntry::Line("Upload cancelled.".into()));
        }
    }
    true
}

pub fn handle_cancel_acknowledged(
    model: &mut Model,
    task: &TaskId,
    result: Result<CancelResponse, ApiError>,
) -> bool {
    // a new cycle may already be running; leave its display alone
    if model.session.is_active() {
        log::info!("Cancel of {} acknowledged after a new task started", task);
        return false;
    }

    match result {
        Ok(response) => {
            log::info!("Task {} cancel: {}", task, response.status);
            model.results.clear();
            model.results.push(ResultEntry::Line(response.status));
        }
        Err(err) => {
            model.error = Some(format!("Error cancelling task: {}", err));
        }
    }
    true
}

// A server-side cancel ends the cycle like a user cancel, without a banner.
fn show_error(model: &mut Model, err: &ApiError) {
    if err.is_cancelled() {
        log::info!("Task cycle cancelled by the server");
    } else {
        log::error!("Upload flow error: {}", err);
    }
    model.error = err.banner();
    model.progress = 0;
    model.progress_text = err.progress_text().into();
}
