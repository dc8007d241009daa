use serde::Serialize;

/// Login progress of the single browser session of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    NavigatingToLogin,
    FillingCredentials,
    SubmittingCredentials,
    AwaitingTwoFactor,
    SubmittingTwoFactor,
    VerifyingSuccess,
    Authenticated,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::NavigatingToLogin => "navigating_to_login",
            SessionState::FillingCredentials => "filling_credentials",
            SessionState::SubmittingCredentials => "submitting_credentials",
            SessionState::AwaitingTwoFactor => "awaiting_two_factor",
            SessionState::SubmittingTwoFactor => "submitting_two_factor",
            SessionState::VerifyingSuccess => "verifying_success",
            SessionState::Authenticated => "authenticated",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}
