use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::auth::{PortalCredentials, TotpGenerator};
use crate::broadcast::run_events::{RunEvent, Severity};
use crate::browser::BrowserDriver;
use crate::config::{Config, SelectorConfig};
use crate::pipeline::progress::ProgressReporter;

use super::state::SessionState;
use super::verify::{verify_login, LoginSnapshot, LoginVerdict, VerifyRules};
use super::SessionError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const PAGE_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the controller needs from the run configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub login_url: String,
    pub rules: VerifyRules,
    pub selectors: SelectorConfig,
    pub two_factor_timeout: Duration,
    pub manual_login_wait: Duration,
    pub manual_login: bool,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            login_url: join_path(&config.site.base_url, &config.site.login_path),
            rules: VerifyRules {
                login_path: config.site.login_path.clone(),
                login_markers: config.selectors.login_markers.clone(),
            },
            selectors: config.selectors.clone(),
            two_factor_timeout: config.download.two_factor_timeout(),
            manual_login_wait: config.download.manual_login_wait(),
            manual_login: config.credentials.manual_login,
        }
    }
}

pub(crate) fn join_path(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Drives the browser through login and an optional TOTP step.
pub struct SessionController {
    driver: Arc<dyn BrowserDriver>,
    settings: SessionSettings,
    credentials: Option<PortalCredentials>,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
    state: SessionState,
    history: Vec<SessionState>,
}

impl SessionController {
    /// `credentials` may be `None` only in manual-login mode.
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        settings: SessionSettings,
        credentials: Option<PortalCredentials>,
        progress: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            driver,
            settings,
            credentials,
            progress,
            cancel,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Runs the login flow to a terminal state.
    ///
    /// An indeterminate verification ends in [`SessionState::Failed`] but is
    /// returned as a verdict, not an error. Driver failures while navigating
    /// and cancellation are errors.
    pub async fn authenticate(&mut self) -> Result<LoginVerdict, SessionError> {
        let span = info_span!("session", manual = self.settings.manual_login);
        async {
            self.transition(SessionState::NavigatingToLogin)?;
            self.driver.navigate(&self.settings.login_url).await?;
            self.wait_until_ready().await;

            if self.settings.manual_login {
                return self.manual_login().await;
            }

            let credentials = self
                .credentials
                .take()
                .ok_or(SessionError::MissingCredentials)?;
            let totp = credentials
                .totp_secret
                .as_ref()
                .map(TotpGenerator::from_base32)
                .transpose()?;

            self.transition(SessionState::FillingCredentials)?;
            self.fill_credentials(&credentials).await;

            self.transition(SessionState::SubmittingCredentials)?;
            let submit = self.settings.selectors.submit.clone();
            if let Err(e) = self.driver.click(&submit).await {
                warn!("Could not click login submit '{}': {}", submit, e);
            }
            self.wait_until_ready().await;

            self.transition(SessionState::AwaitingTwoFactor)?;
            self.two_factor(totp.as_ref()).await?;

            self.verify().await
        }
        .instrument(span)
        .await
    }

    async fn fill_credentials(&self, credentials: &PortalCredentials) {
        let selectors = &self.settings.selectors;
        let fields = [
            ("username", selectors.username.as_str(), credentials.username.as_str()),
            (
                "company code",
                selectors.company_code.as_str(),
                credentials.company_code.as_str(),
            ),
            (
                "password",
                selectors.password.as_str(),
                credentials.password.expose_secret(),
            ),
        ];

        for (name, selector, value) in fields {
            if value.is_empty() {
                debug!("No {} configured, leaving field empty", name);
                continue;
            }
            if let Err(e) = self.driver.fill(selector, value).await {
                warn!("Could not fill {} field '{}': {}", name, selector, e);
            }
        }
    }

    async fn two_factor(&mut self, totp: Option<&TotpGenerator>) -> Result<(), SessionError> {
        let otp_selector = self.settings.selectors.otp_input.clone();
        let wait = self
            .driver
            .wait_for_selector(&otp_selector, self.settings.two_factor_timeout);
        let field = tokio::select! {
            _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
            found = wait => found,
        };

        let field = match field {
            Ok(field) => field,
            Err(e) => {
                warn!("Two-factor field check failed, assuming not required: {}", e);
                None
            }
        };
        if field.is_none() {
            debug!("No one-time code field, two-factor not required");
            return Ok(());
        }

        match totp {
            Some(totp) => {
                self.transition(SessionState::SubmittingTwoFactor)?;
                let code = totp.current_code()?;
                if let Err(e) = self.driver.fill(&otp_selector, &code).await {
                    warn!("Could not fill one-time code: {}", e);
                }
                let otp_submit = self.settings.selectors.otp_submit.clone();
                if let Err(e) = self.driver.click(&otp_submit).await {
                    warn!("Could not submit one-time code: {}", e);
                }
                self.wait_until_ready().await;
            }
            None => {
                info!("Waiting for the one-time code to be entered manually");
                self.progress.status(
                    "Two-factor",
                    "Enter the one-time code in the browser window",
                    Severity::Warning,
                );
                self.wait_for_field_gone(&otp_selector).await?;
            }
        }
        Ok(())
    }

    async fn manual_login(&mut self) -> Result<LoginVerdict, SessionError> {
        let wait = self.settings.manual_login_wait;
        info!("Manual login requested, waiting {}s", wait.as_secs());
        self.progress.report(RunEvent::ManualLoginRequested {
            wait_secs: wait.as_secs(),
        });
        self.progress.status(
            "Login",
            "Complete the login in the browser window",
            Severity::Warning,
        );
        self.sleep(wait).await?;
        self.verify().await
    }

    async fn verify(&mut self) -> Result<LoginVerdict, SessionError> {
        self.transition(SessionState::VerifyingSuccess)?;
        let snapshot = self.snapshot().await;
        let verdict = verify_login(&snapshot, &self.settings.rules);

        match &verdict {
            LoginVerdict::Authenticated(signal) => {
                info!("Login verified by {:?}", signal);
                self.transition(SessionState::Authenticated)?;
                self.progress
                    .status("Login", "Logged in", Severity::Success);
            }
            LoginVerdict::Indeterminate => {
                warn!("Could not confirm login, continuing anyway");
                self.transition(SessionState::Failed)?;
                self.progress.status(
                    "Login",
                    "Login could not be confirmed, continuing",
                    Severity::Warning,
                );
            }
        }
        Ok(verdict)
    }

    /// Driver errors here only make the snapshot less informative.
    async fn snapshot(&self) -> LoginSnapshot {
        let mut landmarks_found = Vec::new();
        for landmark in &self.settings.selectors.landmarks {
            if let Ok(Some(_)) = self.driver.query_selector(landmark).await {
                landmarks_found.push(landmark.clone());
            }
        }
        let current_url = self.driver.current_url().await.unwrap_or_default();
        let content = self.driver.content().await.unwrap_or_default();

        LoginSnapshot {
            landmarks_found,
            current_url,
            content,
        }
    }

    async fn wait_for_field_gone(&self, selector: &str) -> Result<(), SessionError> {
        let deadline = tokio::time::Instant::now() + self.settings.manual_login_wait;
        loop {
            match self.driver.query_selector(selector).await {
                Ok(None) => return Ok(()),
                Ok(Some(_)) => {}
                Err(e) => {
                    debug!("One-time code field check failed: {}", e);
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("One-time code field still present after waiting");
                return Ok(());
            }
            self.sleep(POLL_INTERVAL).await?;
        }
    }

    /// Polls `document.readyState` until the page settles or a short timeout.
    async fn wait_until_ready(&self) {
        let deadline = tokio::time::Instant::now() + PAGE_READY_TIMEOUT;
        loop {
            match self.driver.evaluate_script("document.readyState").await {
                Ok(serde_json::Value::String(s)) if s == "complete" => return,
                Ok(_) => {}
                Err(e) => {
                    debug!("readyState unavailable: {}", e);
                    return;
                }
            }
            if tokio::time::Instant::now() >= deadline || self.sleep(POLL_INTERVAL).await.is_err()
            {
                return;
            }
        }
    }

    async fn sleep(&self, duration: Duration) -> Result<(), SessionError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        debug!("Session {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}
