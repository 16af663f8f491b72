use crate::Model;
use gloo_file::{Blob, ObjectUrl};
use gloo_timers::callback::Timeout;
use js_sys::Date;
use shared::ApiError;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use wasm_bindgen::JsCast;
use web_sys::HtmlAnchorElement;
use yew::prelude::*;

pub fn generate_id() -> u64 {
    static ID_COUNTER: AtomicU64 = AtomicU64::new(0);
    let now = Date::now() as u64;
    let count = ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    now * 1000 + (count % 1000)
}

// Debounce function to limit button events
pub fn debounce<F>(duration: i32, callback: F) -> Callback<MouseEvent>
where
    F: Fn() + Clone + 'static,
{
    let timeout = Rc::new(RefCell::new(None::<Timeout>));
    let timeout_clone = Rc::clone(&timeout);

    Callback::from(move |_| {
        let mut timeout_ref = timeout_clone.borrow_mut();

        if let Some(old_timeout) = timeout_ref.take() {
            old_timeout.cancel();
        }

        let inner_callback = callback.clone();
        let new_timeout = Timeout::new(duration as u32, move || {
            inner_callback();
        });

        *timeout_ref = Some(new_timeout);
    })
}

/// Hands `bytes` to the browser as a download named `file_name`, in the
/// current tab.
pub fn save_bytes(bytes: &[u8], file_name: &str, mime: &str) -> Result<(), ApiError> {
    let dom_error = |what: &str, e: wasm_bindgen::JsValue| {
        ApiError::Validation(format!("Could not save {}: {} ({:?})", file_name, what, e))
    };

    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| ApiError::Validation("No document available for download".into()))?;
    let body = document
        .body()
        .ok_or_else(|| ApiError::Validation("No document body available for download".into()))?;

    let url = ObjectUrl::from(Blob::new_with_options(bytes, Some(mime)));
    let anchor: HtmlAnchorElement = document
        .create_element("a")
        .map_err(|e| dom_error("create link", e))?
        .dyn_into()
        .map_err(|e: web_sys::Element| dom_error("cast link", e.into()))?;

    anchor.set_href(&url);
    anchor.set_download(file_name);
    anchor
        .style()
        .set_property("display", "none")
        .map_err(|e| dom_error("hide link", e))?;

    body.append_child(&anchor).map_err(|e| dom_error("attach link", e))?;
    anchor.click();
    body.remove_child(&anchor).map_err(|e| dom_error("detach link", e))?;

    // dropping `url` revokes it
    log::info!("Saved {} ({} bytes)", file_name, bytes.len());
    Ok(())
}

pub fn render_error_message(model: &Model) -> Html {
    if let Some(error_msg) = &model.error {
        html! {
            <div id="error-display" class="error-message">
                <i class="fa-solid fa-circle-exclamation"></i>
                <p>{ error_msg }</p>
            </div>
        }
    } else {
        html! {}
    }
}

pub fn render_api_key_warning(model: &Model) -> Html {
    if model.config.api_key_missing() {
        html! {
            <div id="api-key-status" class="warning-message">
                <i class="fa-solid fa-triangle-exclamation"></i>
                <p>{"Warning: API key not detected. Some features may be limited."}</p>
            </div>
        }
    } else {
        html! {}
    }
}
