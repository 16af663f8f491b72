use crate::api::AuthClient;
use gloo_storage::{LocalStorage, Storage};
use gloo_timers::callback::Timeout;
use shared::ClientConfig;
use shared::auth::{AuthEffect, AuthFlow, AuthStage, Redirect, Role, SESSION_TOKEN_KEY};
use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;
use wasm_bindgen_futures::spawn_local;
use web_sys::{HtmlInputElement, HtmlSelectElement};
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct GoogleAuthProps {
    pub config: ClientConfig,
}

type SharedFlow = Rc<RefCell<AuthFlow>>;

#[function_component(GoogleAuth)]
pub fn google_auth(props: &GoogleAuthProps) -> Html {
    let flow: SharedFlow = use_mut_ref(AuthFlow::new);
    let refresh = use_force_update();
    let client = use_memo(props.config.clone(), |config| AuthClient::new(config));

    {
        let flow = flow.clone();
        let refresh = refresh.clone();
        let client = client.clone();

        use_effect_with((), move |_| {
            let search = web_sys::window()
                .and_then(|w| w.location().search().ok())
                .unwrap_or_default();

            let started = flow.borrow_mut().start(&search);
            match started {
                Ok(id_token) => {
                    refresh.force_update();
                    spawn_local(async move {
                        let result = client.google_login(&id_token).await;
                        let effect = flow.borrow_mut().on_login(result);
                        apply_effect(effect);
                        refresh.force_update();
                    });
                }
                Err(effect) => {
                    apply_effect(effect);
                    refresh.force_update();
                }
            }
            || ()
        });
    }

    let view = flow.borrow();
    let body = match &view.stage {
        AuthStage::Registration { email, .. } => {
            render_registration(&flow, &refresh, &client, email, &view.form)
        }
        AuthStage::Otp { email } => render_otp(&flow, &refresh, &client, email, &view.otp_code),
        AuthStage::Verifying | AuthStage::Finished => html! {
            <div class="loading">
                <i class="fa-solid fa-spinner fa-spin"></i>
            </div>
        },
    };

    html! {
        <div class="container auth-container">
            <h1>{"Google Authentication"}</h1>
            <div id="status-message" class="alert">{ &view.status }</div>
            { body }
        </div>
    }
}

fn render_registration(
    flow: &SharedFlow,
    refresh: &UseForceUpdateHandle,
    client: &Rc<AuthClient>,
    email: &str,
    form: &shared::auth::RegistrationForm,
) -> Html {
    let text_input = |id: &'static str, kind: &'static str, value: &str, set: fn(&mut AuthFlow, String)| {
        let flow = flow.clone();
        let refresh = refresh.clone();
        let oninput = Callback::from(move |e: InputEvent| {
            let input: HtmlInputElement = e.target_unchecked_into();
            set(&mut flow.borrow_mut(), input.value());
            refresh.force_update();
        });
        html! { <input type={kind} id={id} value={value.to_string()} required=true {oninput} /> }
    };

    let on_role = {
        let flow = flow.clone();
        Callback::from(move |e: Event| {
            let select: HtmlSelectElement = e.target_unchecked_into();
            match Role::from_str(&select.value()) {
                Ok(role) => flow.borrow_mut().form.role = role,
                Err(_) => log::warn!("Ignoring unknown role {}", select.value()),
            }
        })
    };

    let onsubmit = {
        let flow = flow.clone();
        let refresh = refresh.clone();
        let client = client.clone();
        Callback::from(move |e: SubmitEvent| {
            e.prevent_default();
            let target = flow.borrow_mut().begin_register();
            refresh.force_update();
            let Ok((email, google_id)) = target else {
                return;
            };

            let flow = flow.clone();
            let refresh = refresh.clone();
            let client = client.clone();
            spawn_local(async move {
                let form = flow.borrow().form.clone();
                let payload = form.payload(&email, google_id.as_deref());
                let result = client.register(&payload).await;
                let effect = flow.borrow_mut().on_register(result);
                apply_effect(effect);
                refresh.force_update();
            });
        })
    };

    html! {
        <form id="registration-form" {onsubmit}>
            <div class="form-group">
                <label for="email">{"Email"}</label>
                <input type="email" id="email" value={email.to_string()} disabled=true />
            </div>
            <div class="form-group">
                <label for="username">{"Username"}</label>
                { text_input("username", "text", &form.username, |f, v| f.form.username = v) }
            </div>
            <div class="form-group">
                <label for="password1">{"Password"}</label>
                { text_input("password1", "password", &form.password1, |f, v| f.form.password1 = v) }
            </div>
            <div class="form-group">
                <label for="password2">{"Confirm Password"}</label>
                { text_input("password2", "password", &form.password2, |f, v| f.form.password2 = v) }
            </div>
            <div class="form-group">
                <label for="organization">{"Organization"}</label>
                { text_input("organization", "text", &form.organization, |f, v| f.form.organization = v) }
            </div>
            <div class="form-group">
                <label for="role">{"Role"}</label>
                <select id="role" onchange={on_role}>
                    { for Role::all().map(|role| html! {
                        <option value={role.as_ref().to_string()} selected={role == form.role}>
                            { role.label() }
                        </option>
                    }) }
                </select>
            </div>
            <button type="submit" class="analyze-btn">{"Complete Registration"}</button>
        </form>
    }
}

fn render_otp(
    flow: &SharedFlow,
    refresh: &UseForceUpdateHandle,
    client: &Rc<AuthClient>,
    email: &str,
    code: &str,
) -> Html {
    let oninput = {
        let flow = flow.clone();
        let refresh = refresh.clone();
        Callback::from(move |e: InputEvent| {
            let input: HtmlInputElement = e.target_unchecked_into();
            flow.borrow_mut().otp_code = input.value();
            refresh.force_update();
        })
    };

    let onsubmit = {
        let flow = flow.clone();
        let refresh = refresh.clone();
        let client = client.clone();
        Callback::from(move |e: SubmitEvent| {
            e.prevent_default();
            let code = flow.borrow_mut().begin_verify_otp();
            refresh.force_update();
            let Ok(code) = code else {
                return;
            };

            let flow = flow.clone();
            let refresh = refresh.clone();
            let client = client.clone();
            spawn_local(async move {
                let result = client.verify_otp(&code).await;
                let effect = flow.borrow_mut().on_otp(result);
                apply_effect(effect);
                refresh.force_update();
            });
        })
    };

    let on_resend = {
        let flow = flow.clone();
        let refresh = refresh.clone();
        let client = client.clone();
        Callback::from(move |_: MouseEvent| {
            let email = flow.borrow_mut().begin_resend();
            refresh.force_update();
            let Ok(email) = email else {
                return;
            };

            let flow = flow.clone();
            let refresh = refresh.clone();
            let client = client.clone();
            spawn_local(async move {
                let result = client.resend_otp(&email).await;
                flow.borrow_mut().on_resend(result);
                refresh.force_update();
            });
        })
    };

    html! {
        <form id="otp-form" {onsubmit}>
            <p>{ format!("Enter the 6-digit code sent to {}", email) }</p>
            <div class="form-group">
                <label for="otp-code">{"OTP Code"}</label>
                <input
                    type="text"
                    id="otp-code"
                    inputmode="numeric"
                    maxlength="6"
                    value={code.to_string()}
                    required=true
                    {oninput}
                />
            </div>
            <button type="submit" class="analyze-btn">{"Verify OTP"}</button>
            <button type="button" class="analyze-btn" onclick={on_resend}>{"Resend OTP"}</button>
        </form>
    }
}

fn apply_effect(effect: AuthEffect) {
    match effect {
        AuthEffect::None => {}
        AuthEffect::Redirect(redirect) => schedule_redirect(redirect),
        AuthEffect::StoreTokenAndRedirect { token, redirect } => {
            if let Err(e) = LocalStorage::raw().set_item(SESSION_TOKEN_KEY, &token) {
                gloo_console::error!(format!("Could not store session token: {:?}", e));
            }
            schedule_redirect(redirect);
        }
    }
}

fn schedule_redirect(redirect: Redirect) {
    let path = redirect.route.path();
    log::info!("Redirecting to {} in {:?}", path, redirect.delay);

    Timeout::new(redirect.delay.as_millis() as u32, move || {
        if let Some(window) = web_sys::window() {
            if let Err(e) = window.location().set_href(path) {
                log::error!("Redirect to {} failed: {:?}", path, e);
            }
        }
    })
    .forget();
}
