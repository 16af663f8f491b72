use async_trait::async_trait;
use gloo_net::http::{Request, RequestBuilder, Response};
use shared::auth::{
    AuthEndpoints, GoogleLoginRequest, LoginOutcome, OtpOutcome, OtpRequest, RegisterOutcome,
    RegistrationPayload, ResendOtpRequest,
};
use shared::error::decode_json;
use shared::poll::{Clock, StatusSource};
use shared::upload::{
    API_KEY_HEADER, UPLOAD_FIELD, decode_anomalies, decode_validation, upload_percent,
};
use shared::{
    AnomalyRecord, ApiError, CancelResponse, CancelToken, ClientConfig, DownloadFormat,
    StatusResponse, StatusSnapshot, TaskId, UploadResponse, ValidationReport,
};
use futures::channel::oneshot;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::{Closure, JsValue};
use web_sys::{ProgressEvent, XmlHttpRequest};

/// Configuration baked in at build time, e.g. `OCR_API_KEY=... trunk build`.
pub fn compiled_config() -> ClientConfig {
    ClientConfig::from_values(
        option_env!("OCR_API_BASE"),
        option_env!("OCR_API_KEY"),
        option_env!("OCR_AUTH_BASE"),
    )
}

/// Client for the OCR service. Every request carries the API key header.
#[derive(Clone, PartialEq)]
pub struct OcrClient {
    config: ClientConfig,
}

impl OcrClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        Request::get(url).header(API_KEY_HEADER, self.config.api_key())
    }

    fn post(&self, url: &str) -> RequestBuilder {
        Request::post(url).header(API_KEY_HEADER, self.config.api_key())
    }

    /// Sends the batch as multipart form data. Runs over XHR so
    /// `on_progress` sees the upload percentage as bytes go out.
    pub async fn upload<P>(
        &self,
        files: &[web_sys::File],
        project_id: Option<i64>,
        token: &CancelToken,
        on_progress: P,
    ) -> Result<TaskId, ApiError>
    where
        P: Fn(u8) + 'static,
    {
        let form_data = web_sys::FormData::new()
            .map_err(|e| ApiError::Validation(format!("Could not build form data: {:?}", e)))?;
        for file in files {
            form_data
                .append_with_blob_and_filename(UPLOAD_FIELD, file, &file.name())
                .map_err(|e| ApiError::Validation(format!("Could not attach {}: {:?}", file.name(), e)))?;
        }

        let url = self.config.endpoints().upload(project_id);
        log::info!("Uploading {} file(s) to {}", files.len(), url);

        let xhr_error = |what: &str, e: JsValue| ApiError::Network(format!("{}: {:?}", what, e));
        let xhr = XmlHttpRequest::new().map_err(|e| xhr_error("XHR unavailable", e))?;
        xhr.open_with_async("POST", &url, true)
            .map_err(|e| xhr_error("Could not open upload", e))?;
        xhr.set_request_header(API_KEY_HEADER, self.config.api_key())
            .map_err(|e| xhr_error("Could not set API key header", e))?;

        let (sender, receiver) = oneshot::channel::<Result<(u16, String), ApiError>>();
        let sender = Rc::new(RefCell::new(Some(sender)));
        let settle = move |outcome: Result<(u16, String), ApiError>| {
            if let Some(sender) = sender.borrow_mut().take() {
                if sender.send(outcome).is_err() {
                    log::debug!("Upload settled after its caller went away");
                }
            }
        };

        let on_upload_progress = Closure::<dyn FnMut(ProgressEvent)>::new(move |e: ProgressEvent| {
            if e.length_computable() {
                if let Some(percent) = upload_percent(e.loaded(), e.total()) {
                    on_progress(percent);
                }
            }
        });
        let on_load = Closure::<dyn FnMut()>::new({
            let settle = settle.clone();
            let xhr = xhr.clone();
            move || {
                let status = xhr.status().unwrap_or_default();
                let body = xhr.response_text().ok().flatten().unwrap_or_default();
                settle(Ok((status, body)));
            }
        });
        let on_error = Closure::<dyn FnMut()>::new({
            let settle = settle.clone();
            move || settle(Err(ApiError::Network("Upload failed".into())))
        });
        let on_abort = Closure::<dyn FnMut()>::new(move || settle(Err(ApiError::Cancelled)));

        let upload_target = xhr.upload().map_err(|e| xhr_error("No upload target", e))?;
        upload_target.set_onprogress(Some(on_upload_progress.as_ref().unchecked_ref()));
        xhr.set_onload(Some(on_load.as_ref().unchecked_ref()));
        xhr.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        xhr.set_onabort(Some(on_abort.as_ref().unchecked_ref()));

        xhr.send_with_opt_form_data(Some(&form_data))
            .map_err(|e| xhr_error("Could not send upload", e))?;
        token.on_cancel({
            let xhr = xhr.clone();
            move || {
                if let Err(e) = xhr.abort() {
                    log::warn!("Upload abort failed: {:?}", e);
                }
            }
        });

        let outcome = token.run(receiver).await;

        // the closures are dropped below; detach them first
        upload_target.set_onprogress(None);
        xhr.set_onload(None);
        xhr.set_onerror(None);
        xhr.set_onabort(None);

        let (status, body) = outcome?
            .map_err(|_| ApiError::Network("Upload ended without a response".into()))??;
        if !(200..300).contains(&status) {
            log::error!("{} answered {}: {}", url, status, body);
            return Err(ApiError::from_status(status, &body));
        }

        let response: UploadResponse = decode_json(&body)?;
        Ok(response.task_id)
    }

    pub async fn status(&self, task: &TaskId, token: &CancelToken) -> Result<StatusSnapshot, ApiError> {
        let request = abortable(self.get(&self.config.endpoints().status(task)), token)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let body = send(request, Some(token)).await?;
        Ok(decode_json::<StatusResponse>(&body)?.status)
    }

    /// Tells the server to stop. Runs outside the cycle's token, which has
    /// already fired by the time this is called.
    pub async fn cancel(&self, task: &TaskId) -> Result<CancelResponse, ApiError> {
        let request = self
            .post(&self.config.endpoints().cancel(task))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let body = send(request, None).await?;
        decode_json(&body)
    }

    pub async fn download(
        &self,
        task: &TaskId,
        format: DownloadFormat,
        token: &CancelToken,
    ) -> Result<Vec<u8>, ApiError> {
        let request = abortable(self.get(&self.config.endpoints().download(task, format)), token)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let response = dispatch(request, Some(token)).await?;
        token
            .run(response.binary())
            .await?
            .map_err(|e| ApiError::Network(format!("while downloading {}: {}", format, e)))
    }

    pub async fn validation(&self, task: &TaskId, token: &CancelToken) -> Result<ValidationReport, ApiError> {
        let request = abortable(self.get(&self.config.endpoints().validation(task)), token)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        decode_validation(&send(request, Some(token)).await?)
    }

    pub async fn anomalies(&self, task: &TaskId, token: &CancelToken) -> Result<Vec<AnomalyRecord>, ApiError> {
        let request = abortable(self.get(&self.config.endpoints().anomalies(task)), token)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        decode_anomalies(&send(request, Some(token)).await?)
    }

    pub async fn health(&self) -> Result<serde_json::Value, ApiError> {
        let request = Request::get(&self.config.endpoints().health())
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        decode_json(&send(request, None).await?)
    }

    /// Binds the client to one cycle's token for the poll loop.
    pub fn tracked<'a>(&'a self, token: &'a CancelToken) -> TrackedClient<'a> {
        TrackedClient { client: self, token }
    }
}

pub struct TrackedClient<'a> {
    client: &'a OcrClient,
    token: &'a CancelToken,
}

#[async_trait(?Send)]
impl StatusSource for TrackedClient<'_> {
    async fn status(&self, task: &TaskId) -> Result<StatusSnapshot, ApiError> {
        self.client.status(task, self.token).await
    }
}

/// Wall-clock time from `Date.now()`; delays via `setTimeout`.
pub struct BrowserClock;

#[async_trait(?Send)]
impl Clock for BrowserClock {
    fn now(&self) -> Duration {
        Duration::from_millis(js_sys::Date::now() as u64)
    }

    async fn sleep(&self, duration: Duration) {
        gloo_timers::future::TimeoutFuture::new(duration.as_millis() as u32).await;
    }
}

// Aborts the underlying fetch when the token fires.
fn abortable(builder: RequestBuilder, token: &CancelToken) -> RequestBuilder {
    match web_sys::AbortController::new() {
        Ok(controller) => {
            let signal = controller.signal();
            token.on_cancel(move || controller.abort());
            builder.abort_signal(Some(&signal))
        }
        Err(e) => {
            log::warn!("AbortController unavailable: {:?}", e);
            builder
        }
    }
}

async fn dispatch(request: Request, token: Option<&CancelToken>) -> Result<Response, ApiError> {
    let sent = match token {
        Some(token) => token.run(request.send()).await?,
        None => request.send().await,
    };

    let response = sent.map_err(|e| {
        log::error!("Request failed: {}", e);
        ApiError::Network(e.to_string())
    })?;

    if response.ok() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        log::error!("{} answered {}: {}", response.url(), status, body);
        Err(ApiError::from_status(status, &body))
    }
}

async fn send(request: Request, token: Option<&CancelToken>) -> Result<String, ApiError> {
    let response = dispatch(request, token).await?;
    let body = match token {
        Some(token) => token.run(response.text()).await?,
        None => response.text().await,
    };
    body.map_err(|e| ApiError::Network(e.to_string()))
}

/// Calls against the accounts API. No API key: the user has no session yet.
#[derive(Clone, PartialEq)]
pub struct AuthClient {
    endpoints: AuthEndpoints,
}

impl AuthClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            endpoints: config.auth_endpoints(),
        }
    }

    pub async fn google_login(&self, id_token: &str) -> Result<LoginOutcome, ApiError> {
        let body = post_json(&self.endpoints.google_login(), &GoogleLoginRequest { token: id_token }).await?;
        LoginOutcome::from_body(&body)
    }

    pub async fn register(&self, payload: &RegistrationPayload<'_>) -> Result<RegisterOutcome, ApiError> {
        let body = post_json(&self.endpoints.register(), payload).await?;
        RegisterOutcome::from_body(&body)
    }

    pub async fn verify_otp(&self, code: &str) -> Result<OtpOutcome, ApiError> {
        let body = post_json(&self.endpoints.verify_otp(), &OtpRequest { otp: code }).await?;
        OtpOutcome::from_body(&body)
    }

    pub async fn resend_otp(&self, email: &str) -> Result<(), ApiError> {
        post_json(&self.endpoints.resend_otp(), &ResendOtpRequest { email }).await?;
        Ok(())
    }
}

async fn post_json<T: serde::Serialize>(url: &str, payload: &T) -> Result<String, ApiError> {
    let request = Request::post(url)
        .json(payload)
        .map_err(|e| ApiError::Validation(format!("Could not encode request: {}", e)))?;
    send(request, None).await
}
