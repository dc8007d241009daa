//! In-memory stand-in for the approval portal as seen through a browser.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use approval_sync::browser::{BrowserDriver, Cookie, DriverError, Element};

use super::builders::{LANDMARK_SELECTOR, LIST_PATH, OTP_SELECTOR};

const LOGIN_PAGE: &str =
    r#"<html><form class="login-form"><input type="password" name="password"></form></html>"#;
const HOME_PAGE: &str = r#"<html><nav class="main-menu"></nav><div class="user-profile"></div></html>"#;

/// How the fake portal reacts.
#[derive(Debug, Clone, Default)]
pub struct PortalBehaviour {
    /// Show a one-time code field after the password is submitted.
    pub requires_otp: bool,
    /// Someone else completes the login (manual mode).
    pub logs_in_by_itself: bool,
    /// Accept the login but never show any sign of it.
    pub never_confirms: bool,
    pub rows: Vec<Element>,
    pub cookies: Vec<Cookie>,
}

#[derive(Debug, Default)]
pub struct PortalState {
    pub current_url: String,
    pub logged_in: bool,
    pub otp_visible: bool,
    pub navigations: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub row_queries: usize,
}

pub struct FakePortal {
    base_url: String,
    behaviour: PortalBehaviour,
    state: Mutex<PortalState>,
}

impl FakePortal {
    pub fn new(base_url: &str, behaviour: PortalBehaviour) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            behaviour,
            state: Mutex::new(PortalState::default()),
        }
    }

    pub fn with_rows(base_url: &str, rows: Vec<Element>) -> Self {
        Self::new(
            base_url,
            PortalBehaviour {
                rows,
                cookies: vec![Cookie::new("session", "s3cr3t")],
                ..PortalBehaviour::default()
            },
        )
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().fills.clone()
    }

    pub fn filled(&self, selector: &str) -> Option<String> {
        self.fills()
            .into_iter()
            .rev()
            .find(|(s, _)| s == selector)
            .map(|(_, v)| v)
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn logged_in(&self) -> bool {
        self.state.lock().unwrap().logged_in
    }

    fn land_on_home(&self, state: &mut PortalState) {
        if self.behaviour.never_confirms {
            return;
        }
        state.logged_in = true;
        state.current_url = format!("{}/home", self.base_url);
    }
}

#[async_trait]
impl BrowserDriver for FakePortal {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        state.current_url = url.to_string();
        if self.behaviour.logs_in_by_itself && url.contains("/login") {
            state.logged_in = true;
        }
        Ok(())
    }

    async fn query_selector(&self, css: &str) -> Result<Option<Element>, DriverError> {
        let state = self.state.lock().unwrap();
        let found = match css {
            OTP_SELECTOR if state.otp_visible => Some(Element::new("input").with_attr("name", "otp")),
            LANDMARK_SELECTOR if state.logged_in => Some(Element::new("div")),
            _ => None,
        };
        Ok(found)
    }

    async fn query_selector_all(&self, css: &str) -> Result<Vec<Element>, DriverError> {
        let mut state = self.state.lock().unwrap();
        if css == "tr" && state.current_url.ends_with(LIST_PATH) {
            state.row_queries += 1;
            return Ok(self.behaviour.rows.clone());
        }
        Ok(Vec::new())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if selector == OTP_SELECTOR && !state.otp_visible {
            return Err(DriverError::NoSuchElement(selector.to_string()));
        }
        state.fills.push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.clicks.push(selector.to_string());

        if state.otp_visible {
            let code_ok = state
                .fills
                .iter()
                .any(|(s, v)| s == OTP_SELECTOR && v.len() == 6 && v.chars().all(|c| c.is_ascii_digit()));
            if code_ok {
                state.otp_visible = false;
                self.land_on_home(&mut state);
            }
            return Ok(());
        }

        let has_password = state.fills.iter().any(|(s, _)| s.contains("password"));
        if has_password {
            if self.behaviour.requires_otp {
                state.otp_visible = true;
            } else {
                self.land_on_home(&mut state);
            }
        }
        Ok(())
    }

    async fn evaluate_script(&self, _script: &str) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::Value::String("complete".to_string()))
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError> {
        Ok(self.behaviour.cookies.clone())
    }

    /// The fake page never changes while waiting, so this answers at once.
    async fn wait_for_selector(
        &self,
        css: &str,
        _timeout: Duration,
    ) -> Result<Option<Element>, DriverError> {
        self.query_selector(css).await
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn content(&self) -> Result<String, DriverError> {
        let state = self.state.lock().unwrap();
        if state.logged_in {
            Ok(HOME_PAGE.to_string())
        } else {
            Ok(LOGIN_PAGE.to_string())
        }
    }
}
