use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub site: SiteConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub status: StatusKeywords,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Absolute base URL of the portal, e.g. `https://portal.example.com`.
    pub base_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_list_path")]
    pub list_path: String,
    /// Substring an `href` must contain to count as a download link.
    #[serde(default = "default_download_marker")]
    pub download_link_marker: String,
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_list_path() -> String {
    "/approvals".to_string()
}

fn default_download_marker() -> String {
    "download".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_username_selector")]
    pub username: String,
    #[serde(default = "default_company_selector")]
    pub company_code: String,
    #[serde(default = "default_password_selector")]
    pub password: String,
    #[serde(default = "default_submit_selector")]
    pub submit: String,
    #[serde(default = "default_otp_selector")]
    pub otp_input: String,
    #[serde(default = "default_otp_submit_selector")]
    pub otp_submit: String,
    /// Elements that only exist after a successful login.
    #[serde(default = "default_landmarks")]
    pub landmarks: Vec<String>,
    /// Page-content fragments that indicate the login form is still shown.
    #[serde(default = "default_login_markers")]
    pub login_markers: Vec<String>,
    #[serde(default = "default_row_selector")]
    pub rows: String,
}

fn default_username_selector() -> String {
    "input[name='username']".to_string()
}

fn default_company_selector() -> String {
    "input[name='companyCode']".to_string()
}

fn default_password_selector() -> String {
    "input[name='password']".to_string()
}

fn default_submit_selector() -> String {
    "button[type='submit']".to_string()
}

fn default_otp_selector() -> String {
    "input[name='otp']".to_string()
}

fn default_otp_submit_selector() -> String {
    "button[type='submit']".to_string()
}

fn default_landmarks() -> Vec<String> {
    vec![
        ".user-profile".to_string(),
        "#logout".to_string(),
        "nav.main-menu".to_string(),
    ]
}

fn default_login_markers() -> Vec<String> {
    vec!["type=\"password\"".to_string(), "login-form".to_string()]
}

fn default_row_selector() -> String {
    "tr".to_string()
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            username: default_username_selector(),
            company_code: default_company_selector(),
            password: default_password_selector(),
            submit: default_submit_selector(),
            otp_input: default_otp_selector(),
            otp_submit: default_otp_submit_selector(),
            landmarks: default_landmarks(),
            login_markers: default_login_markers(),
            rows: default_row_selector(),
        }
    }
}

/// Where the portal credentials come from. Each secret is resolved from a
/// direct value, a file, or an environment variable, in that order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub company_code: String,
    #[serde(default)]
    pub password_insecure: Option<String>,
    #[serde(default)]
    pub password_file: Option<String>,
    #[serde(default)]
    pub password_env_var: Option<String>,
    #[serde(default)]
    pub totp_secret_insecure: Option<String>,
    #[serde(default)]
    pub totp_secret_file: Option<String>,
    #[serde(default)]
    pub totp_secret_env_var: Option<String>,
    /// Skip automated entry and wait for a human to log in.
    #[serde(default)]
    pub manual_login: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_target_status")]
    pub target_status: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_retry_concurrency")]
    pub retry_concurrency: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_success_delay")]
    pub success_delay_ms: u64,
    #[serde(default = "default_failure_delay")]
    pub failure_delay_ms: u64,
    #[serde(default = "default_two_factor_timeout")]
    pub two_factor_timeout_secs: u64,
    #[serde(default = "default_manual_login_wait")]
    pub manual_login_wait_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_target_status() -> String {
    "approved".to_string()
}

fn default_concurrency() -> usize {
    3
}

fn default_retry_concurrency() -> usize {
    2
}

fn default_request_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_success_delay() -> u64 {
    500
}

fn default_failure_delay() -> u64 {
    2000
}

fn default_two_factor_timeout() -> u64 {
    5
}

fn default_manual_login_wait() -> u64 {
    60
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36"
        .to_string()
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            target_status: default_target_status(),
            concurrency: default_concurrency(),
            retry_concurrency: default_retry_concurrency(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            success_delay_ms: default_success_delay(),
            failure_delay_ms: default_failure_delay(),
            two_factor_timeout_secs: default_two_factor_timeout(),
            manual_login_wait_secs: default_manual_login_wait(),
            user_agent: default_user_agent(),
        }
    }
}

impl DownloadConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn success_delay(&self) -> Duration {
        Duration::from_millis(self.success_delay_ms)
    }

    pub fn failure_delay(&self) -> Duration {
        Duration::from_millis(self.failure_delay_ms)
    }

    pub fn two_factor_timeout(&self) -> Duration {
        Duration::from_secs(self.two_factor_timeout_secs)
    }

    pub fn manual_login_wait(&self) -> Duration {
        Duration::from_secs(self.manual_login_wait_secs)
    }
}

/// Keywords recognised in row cells, matched case-insensitively as substrings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusKeywords {
    #[serde(default = "default_approved")]
    pub approved: Vec<String>,
    #[serde(default = "default_pending")]
    pub pending: Vec<String>,
    #[serde(default = "default_rejected")]
    pub rejected: Vec<String>,
    #[serde(default = "default_in_progress")]
    pub in_progress: Vec<String>,
}

fn default_approved() -> Vec<String> {
    vec!["approved".to_string()]
}

fn default_pending() -> Vec<String> {
    vec!["pending".to_string()]
}

fn default_rejected() -> Vec<String> {
    vec!["rejected".to_string()]
}

fn default_in_progress() -> Vec<String> {
    vec!["in progress".to_string(), "in-progress".to_string()]
}

impl Default for StatusKeywords {
    fn default() -> Self {
        Self {
            approved: default_approved(),
            pending: default_pending(),
            rejected: default_rejected(),
            in_progress: default_in_progress(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
    /// Defaults to `{root}/downloaded.txt`.
    #[serde(default)]
    pub registry_file: Option<PathBuf>,
    /// Template handed to the companion-document generator, if any.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

fn default_output_root() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("approval-sync")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            registry_file: None,
            template_path: None,
        }
    }
}

impl OutputConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| self.root.join("downloaded.txt"))
    }
}
