//! Google sign-in completion: the response shapes of the accounts API and the
//! state machine the callback view walks through.
//!
//! The view owns an [`AuthFlow`], feeds it the results of its requests and
//! applies the [`AuthEffect`] each transition returns. Everything here is
//! free of browser types so the flow can be exercised natively.

use crate::error::{ApiError, decode_json};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query parameter the identity provider redirects back with.
pub const ID_TOKEN_PARAM: &str = "id_token";

/// Local-storage key the session token is persisted under.
pub const SESSION_TOKEN_KEY: &str = "authToken";

pub const FAILURE_REDIRECT_DELAY: Duration = Duration::from_secs(3);
pub const SUCCESS_REDIRECT_DELAY: Duration = Duration::from_secs(1);

const ACCOUNTS_PATH: &str = "/api/accounts/";

/// Pulls the identity token out of a `location.search` string.
pub fn id_token_from_query(search: &str) -> Option<String> {
    url::form_urlencoded::parse(search.trim_start_matches('?').as_bytes())
        .find(|(key, _)| key == ID_TOKEN_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthEndpoints {
    base: String,
}

impl AuthEndpoints {
    pub fn new(base: &str) -> Self {
        Self {
            base: format!("{}{}", base.trim_end_matches('/'), ACCOUNTS_PATH),
        }
    }

    pub fn google_login(&self) -> String {
        format!("{}google/login/", self.base)
    }

    pub fn register(&self) -> String {
        format!("{}register/", self.base)
    }

    pub fn verify_otp(&self) -> String {
        format!("{}verify-otp/", self.base)
    }

    pub fn resend_otp(&self) -> String {
        format!("{}resend-otp/", self.base)
    }
}

#[derive(Debug, Serialize)]
pub struct GoogleLoginRequest<'a> {
    pub token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct OtpRequest<'a> {
    pub otp: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResendOtpRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Deserialize)]
struct RawLogin {
    #[serde(default)]
    needs_additional_info: bool,
    #[serde(default)]
    requires_otp: bool,
    email: Option<String>,
    suggested_username: Option<String>,
    google_id: Option<String>,
    token: Option<String>,
}

/// What the login endpoint wants to happen next.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    NeedsRegistration {
        email: String,
        suggested_username: String,
        google_id: Option<String>,
    },
    RequiresOtp {
        email: String,
    },
    Authenticated {
        token: String,
    },
}

impl LoginOutcome {
    pub fn from_body(body: &str) -> Result<Self, ApiError> {
        Self::try_from(decode_json::<RawLogin>(body)?)
    }
}

impl TryFrom<RawLogin> for LoginOutcome {
    type Error = ApiError;

    fn try_from(raw: RawLogin) -> Result<Self, Self::Error> {
        let email = raw.email.filter(|e| !e.is_empty());

        if raw.needs_additional_info {
            let email = email.ok_or_else(|| {
                ApiError::InvalidResponse("registration requested without an email".into())
            })?;
            let suggested_username = raw
                .suggested_username
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| local_part(&email).to_string());
            return Ok(LoginOutcome::NeedsRegistration {
                email,
                suggested_username,
                google_id: raw.google_id,
            });
        }

        if raw.requires_otp {
            let email = email.ok_or_else(|| {
                ApiError::InvalidResponse("OTP requested without an email".into())
            })?;
            return Ok(LoginOutcome::RequiresOtp { email });
        }

        match raw.token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(LoginOutcome::Authenticated { token }),
            None => Err(ApiError::InvalidResponse(
                "unrecognised login response".into(),
            )),
        }
    }
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    RequiresOtp,
    Registered,
}

impl RegisterOutcome {
    pub fn from_body(body: &str) -> Result<Self, ApiError> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            requires_otp: bool,
        }

        let raw: Raw = decode_json(body)?;
        Ok(if raw.requires_otp {
            RegisterOutcome::RequiresOtp
        } else {
            RegisterOutcome::Registered
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OtpOutcome {
    Verified { token: String },
    Rejected,
}

impl OtpOutcome {
    pub fn from_body(body: &str) -> Result<Self, ApiError> {
        #[derive(Deserialize)]
        struct Raw {
            token: Option<String>,
        }

        let raw: Raw = decode_json(body)?;
        Ok(match raw.token.filter(|t| !t.is_empty()) {
            Some(token) => OtpOutcome::Verified { token },
            None => OtpOutcome::Rejected,
        })
    }
}

pub fn validate_otp(code: &str) -> Result<(), ApiError> {
    let code = code.trim();
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ApiError::Validation("The OTP code must be 6 digits.".into()))
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Manager,
}

impl Role {
    pub fn all() -> impl Iterator<Item = Role> {
        <Role as strum::IntoEnumIterator>::iter()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
            Role::Manager => "Manager",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationForm {
    pub username: String,
    pub password1: String,
    pub password2: String,
    pub organization: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct RegistrationPayload<'a> {
    pub username: &'a str,
    pub password1: &'a str,
    pub password2: &'a str,
    pub organization: &'a str,
    pub role: Role,
    pub email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_id: Option<&'a str>,
}

impl RegistrationForm {
    pub fn prefilled(username: &str) -> Self {
        Self {
            username: username.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let required = [
            ("Username", &self.username),
            ("Password", &self.password1),
            ("Confirm Password", &self.password2),
            ("Organization", &self.organization),
        ];
        if let Some((label, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ApiError::Validation(format!("{} is required", label)));
        }
        if self.password1 != self.password2 {
            return Err(ApiError::Validation("Passwords do not match".into()));
        }
        Ok(())
    }

    pub fn payload<'a>(
        &'a self,
        email: &'a str,
        google_id: Option<&'a str>,
    ) -> RegistrationPayload<'a> {
        RegistrationPayload {
            username: self.username.trim(),
            password1: &self.password1,
            password2: &self.password2,
            organization: self.organization.trim(),
            role: self.role,
            email,
            google_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Workspace,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Workspace => "/workspace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    pub route: Route,
    pub delay: Duration,
}

impl Redirect {
    pub fn to_login() -> Self {
        Self {
            route: Route::Login,
            delay: FAILURE_REDIRECT_DELAY,
        }
    }

    pub fn to_workspace() -> Self {
        Self {
            route: Route::Workspace,
            delay: SUCCESS_REDIRECT_DELAY,
        }
    }
}

/// Side effect the view has to carry out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEffect {
    None,
    Redirect(Redirect),
    StoreTokenAndRedirect { token: String, redirect: Redirect },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthStage {
    Verifying,
    Registration {
        email: String,
        google_id: Option<String>,
    },
    Otp {
        email: String,
    },
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthFlow {
    pub stage: AuthStage,
    pub status: String,
    pub form: RegistrationForm,
    pub otp_code: String,
}

impl Default for AuthFlow {
    fn default() -> Self {
        Self {
            stage: AuthStage::Verifying,
            status: "Processing Google authentication...".into(),
            form: RegistrationForm::default(),
            otp_code: String::new(),
        }
    }
}

impl AuthFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// First step on mount. Yields the id token to exchange, or the effect to
    /// apply when there is nothing to exchange.
    pub fn start(&mut self, search: &str) -> Result<String, AuthEffect> {
        match id_token_from_query(search) {
            Some(token) => {
                self.status = "Verifying your Google account...".into();
                Ok(token)
            }
            None => {
                log::warn!("Google callback reached without an {}", ID_TOKEN_PARAM);
                self.stage = AuthStage::Finished;
                self.status = "No authentication token found. Please try again.".into();
                Err(AuthEffect::Redirect(Redirect::to_login()))
            }
        }
    }

    pub fn on_login(&mut self, result: Result<LoginOutcome, ApiError>) -> AuthEffect {
        match result {
            Ok(LoginOutcome::NeedsRegistration {
                email,
                suggested_username,
                google_id,
            }) => {
                log::info!("Google account {} needs registration", email);
                self.status = "Please complete your registration".into();
                self.form = RegistrationForm::prefilled(&suggested_username);
                self.stage = AuthStage::Registration { email, google_id };
                AuthEffect::None
            }
            Ok(LoginOutcome::RequiresOtp { email }) => {
                self.status = "OTP verification required".into();
                self.stage = AuthStage::Otp { email };
                AuthEffect::None
            }
            Ok(LoginOutcome::Authenticated { token }) => self.authenticated(token),
            Err(ApiError::InvalidResponse(reason)) => {
                log::error!("Unexpected Google login response: {}", reason);
                self.fail("Authentication failed. Please try again.".into())
            }
            Err(err) => {
                log::error!("Google login failed: {}", err);
                self.fail(format!("Authentication error: {}", display_reason(&err)))
            }
        }
    }

    /// Checks the registration form. On success returns the email and
    /// google id to submit with it.
    pub fn begin_register(&mut self) -> Result<(String, Option<String>), ApiError> {
        let AuthStage::Registration { email, google_id } = &self.stage else {
            return Err(ApiError::Validation("No registration in progress".into()));
        };
        if let Err(err) = self.form.validate() {
            self.status = err.to_string();
            return Err(err);
        }
        let target = (email.clone(), google_id.clone());
        self.status = "Creating your account...".into();
        Ok(target)
    }

    pub fn on_register(&mut self, result: Result<RegisterOutcome, ApiError>) -> AuthEffect {
        match result {
            Ok(RegisterOutcome::RequiresOtp) => {
                self.stage = match std::mem::replace(&mut self.stage, AuthStage::Finished) {
                    AuthStage::Registration { email, .. } => AuthStage::Otp { email },
                    other => other,
                };
                self.status = "OTP verification required".into();
                AuthEffect::None
            }
            Ok(RegisterOutcome::Registered) => {
                self.stage = AuthStage::Finished;
                self.status =
                    "Registration successful! Please check your email for activation.".into();
                AuthEffect::Redirect(Redirect::to_login())
            }
            Err(err) => {
                self.status = format!("Registration error: {}", display_reason(&err));
                AuthEffect::None
            }
        }
    }

    pub fn begin_verify_otp(&mut self) -> Result<String, ApiError> {
        if !matches!(self.stage, AuthStage::Otp { .. }) {
            return Err(ApiError::Validation("No OTP verification in progress".into()));
        }
        let code = self.otp_code.trim().to_string();
        if let Err(err) = validate_otp(&code) {
            self.status = err.to_string();
            return Err(err);
        }
        self.status = "Verifying OTP...".into();
        Ok(code)
    }

    pub fn on_otp(&mut self, result: Result<OtpOutcome, ApiError>) -> AuthEffect {
        match result {
            Ok(OtpOutcome::Verified { token }) => {
                self.status = "OTP verified! Redirecting...".into();
                self.stage = AuthStage::Finished;
                AuthEffect::StoreTokenAndRedirect {
                    token,
                    redirect: Redirect::to_workspace(),
                }
            }
            Ok(OtpOutcome::Rejected) => {
                self.status = "OTP verification failed. Please try again.".into();
                AuthEffect::None
            }
            Err(err) => {
                self.status = format!("OTP error: {}", display_reason(&err));
                AuthEffect::None
            }
        }
    }

    pub fn begin_resend(&mut self) -> Result<String, ApiError> {
        match &self.stage {
            AuthStage::Otp { email } => {
                let email = email.clone();
                self.status = "Resending OTP...".into();
                Ok(email)
            }
            _ => Err(ApiError::Validation("No OTP verification in progress".into())),
        }
    }

    pub fn on_resend(&mut self, result: Result<(), ApiError>) {
        self.status = match result {
            Ok(()) => "OTP has been resent to your email".into(),
            Err(err) => format!("Error resending OTP: {}", display_reason(&err)),
        };
    }

    pub fn is_verifying(&self) -> bool {
        matches!(self.stage, AuthStage::Verifying | AuthStage::Finished)
    }

    fn authenticated(&mut self, token: String) -> AuthEffect {
        self.stage = AuthStage::Finished;
        self.status = "Authentication successful! Redirecting...".into();
        AuthEffect::StoreTokenAndRedirect {
            token,
            redirect: Redirect::to_workspace(),
        }
    }

    fn fail(&mut self, status: String) -> AuthEffect {
        self.stage = AuthStage::Finished;
        self.status = status;
        AuthEffect::Redirect(Redirect::to_login())
    }
}

// Server errors already carry the body's message; the prefix only adds noise
// next to "Authentication error:" and friends.
fn display_reason(err: &ApiError) -> String {
    match err {
        ApiError::Server { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_redirects_to_login_without_request() {
        let mut flow = AuthFlow::new();
        let effect = flow.start("?state=xyz").unwrap_err();
        assert_eq!(
            effect,
            AuthEffect::Redirect(Redirect {
                route: Route::Login,
                delay: Duration::from_secs(3),
            })
        );
        assert_eq!(flow.status, "No authentication token found. Please try again.");
        assert_eq!(flow.stage, AuthStage::Finished);

        assert!(AuthFlow::new().start("").is_err());
        assert!(AuthFlow::new().start("?id_token=").is_err());
    }

    #[test]
    fn test_token_is_read_and_decoded() {
        let mut flow = AuthFlow::new();
        assert_eq!(flow.start("?foo=1&id_token=abc%2Edef"), Ok("abc.def".to_string()));
        assert_eq!(flow.status, "Verifying your Google account...");
    }

    #[test]
    fn test_needs_registration_prefills_username() {
        let outcome = LoginOutcome::from_body(
            r#"{"needs_additional_info": true, "email": "a@b.com", "suggested_username": "a"}"#,
        )
        .unwrap();

        let mut flow = AuthFlow::new();
        assert_eq!(flow.on_login(Ok(outcome)), AuthEffect::None);
        assert_eq!(flow.form.username, "a");
        assert_eq!(
            flow.stage,
            AuthStage::Registration {
                email: "a@b.com".into(),
                google_id: None,
            }
        );
    }

    #[test]
    fn test_suggested_username_falls_back_to_email() {
        let outcome = LoginOutcome::from_body(
            r#"{"needs_additional_info": true, "email": "jane.doe@example.org", "google_id": "g-1"}"#,
        )
        .unwrap();
        assert_eq!(
            outcome,
            LoginOutcome::NeedsRegistration {
                email: "jane.doe@example.org".into(),
                suggested_username: "jane.doe".into(),
                google_id: Some("g-1".into()),
            }
        );
    }

    #[test]
    fn test_direct_token_is_stored_and_redirects_after_one_second() {
        let outcome = LoginOutcome::from_body(r#"{"token": "T"}"#).unwrap();
        let mut flow = AuthFlow::new();
        assert_eq!(
            flow.on_login(Ok(outcome)),
            AuthEffect::StoreTokenAndRedirect {
                token: "T".into(),
                redirect: Redirect {
                    route: Route::Workspace,
                    delay: Duration::from_secs(1),
                },
            }
        );
    }

    #[test]
    fn test_otp_shape() {
        let outcome =
            LoginOutcome::from_body(r#"{"requires_otp": true, "email": "a@b.com", "message": "sent"}"#)
                .unwrap();
        let mut flow = AuthFlow::new();
        flow.on_login(Ok(outcome));
        assert_eq!(flow.stage, AuthStage::Otp { email: "a@b.com".into() });
        assert!(!flow.is_verifying());
    }

    #[test]
    fn test_unknown_shape_fails_to_login() {
        let result = LoginOutcome::from_body(r#"{"message": "hello"}"#);
        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));

        let mut flow = AuthFlow::new();
        assert_eq!(flow.on_login(result), AuthEffect::Redirect(Redirect::to_login()));
        assert_eq!(flow.status, "Authentication failed. Please try again.");
    }

    #[test]
    fn test_request_failure_fails_to_login() {
        let mut flow = AuthFlow::new();
        let effect = flow.on_login(Err(ApiError::from_status(
            400,
            r#"{"error": "Invalid Google token"}"#,
        )));
        assert_eq!(effect, AuthEffect::Redirect(Redirect::to_login()));
        assert_eq!(flow.status, "Authentication error: Invalid Google token");
    }

    fn registering() -> AuthFlow {
        let mut flow = AuthFlow::new();
        flow.on_login(Ok(LoginOutcome::NeedsRegistration {
            email: "a@b.com".into(),
            suggested_username: "a".into(),
            google_id: Some("g".into()),
        }));
        flow
    }

    #[test]
    fn test_password_mismatch_blocks_submit() {
        let mut flow = registering();
        flow.form.password1 = "hunter22".into();
        flow.form.password2 = "hunter23".into();
        flow.form.organization = "Acme".into();

        assert!(matches!(flow.begin_register(), Err(ApiError::Validation(_))));
        assert_eq!(flow.status, "Passwords do not match");
    }

    #[test]
    fn test_registration_then_otp_then_workspace() {
        let mut flow = registering();
        flow.form.password1 = "hunter22".into();
        flow.form.password2 = "hunter22".into();
        flow.form.organization = "Acme".into();
        flow.form.role = Role::Manager;

        let (email, google_id) = flow.begin_register().unwrap();
        let payload = serde_json::to_value(flow.form.payload(&email, google_id.as_deref())).unwrap();
        assert_eq!(payload["role"], "manager");
        assert_eq!(payload["email"], "a@b.com");
        assert_eq!(payload["google_id"], "g");

        let outcome = RegisterOutcome::from_body(r#"{"requires_otp": true}"#).unwrap();
        assert_eq!(flow.on_register(Ok(outcome)), AuthEffect::None);
        assert_eq!(flow.stage, AuthStage::Otp { email: "a@b.com".into() });

        flow.otp_code = "12ab56".into();
        assert!(flow.begin_verify_otp().is_err());
        assert_eq!(flow.status, "The OTP code must be 6 digits.");

        flow.otp_code = " 123456 ".into();
        assert_eq!(flow.begin_verify_otp().unwrap(), "123456");

        let otp = OtpOutcome::from_body(r#"{"success": true, "token": "S"}"#).unwrap();
        assert_eq!(
            flow.on_otp(Ok(otp)),
            AuthEffect::StoreTokenAndRedirect {
                token: "S".into(),
                redirect: Redirect::to_workspace(),
            }
        );
    }

    #[test]
    fn test_registration_without_otp_goes_to_login() {
        let mut flow = registering();
        let outcome = RegisterOutcome::from_body(r#"{"message": "created"}"#).unwrap();
        assert_eq!(flow.on_register(Ok(outcome)), AuthEffect::Redirect(Redirect::to_login()));
    }

    #[test]
    fn test_registration_error_keeps_form() {
        let mut flow = registering();
        let effect = flow.on_register(Err(ApiError::from_status(
            400,
            r#"{"username": ["A user with that username already exists."]}"#,
        )));
        assert_eq!(effect, AuthEffect::None);
        assert!(matches!(flow.stage, AuthStage::Registration { .. }));
        assert_eq!(
            flow.status,
            "Registration error: username: A user with that username already exists."
        );
    }

    #[test]
    fn test_otp_rejection_and_resend() {
        let mut flow = AuthFlow::new();
        flow.on_login(Ok(LoginOutcome::RequiresOtp { email: "a@b.com".into() }));

        let rejected = OtpOutcome::from_body(r#"{"success": false}"#).unwrap();
        assert_eq!(flow.on_otp(Ok(rejected)), AuthEffect::None);
        assert_eq!(flow.status, "OTP verification failed. Please try again.");

        assert_eq!(flow.begin_resend().unwrap(), "a@b.com");
        flow.on_resend(Ok(()));
        assert_eq!(flow.status, "OTP has been resent to your email");

        flow.on_resend(Err(ApiError::Network("offline".into())));
        assert_eq!(flow.status, "Error resending OTP: Network error: offline");
    }

    #[test]
    fn test_endpoints() {
        let ep = AuthEndpoints::new("https://auth.example.com/");
        assert_eq!(ep.google_login(), "https://auth.example.com/api/accounts/google/login/");
        assert_eq!(ep.resend_otp(), "https://auth.example.com/api/accounts/resend-otp/");
    }

    #[test]
    fn test_role_round_trip_from_select_value() {
        use std::str::FromStr;

        assert_eq!(Role::all().count(), 3);
        for role in Role::all() {
            assert_eq!(Role::from_str(role.as_ref()).unwrap(), role);
        }
        assert_eq!(Role::default(), Role::User);
    }
}
