//! Post-login verification as a pure function over an observed snapshot.
//!
//! The portal has no single reliable success indicator, so three independent
//! checks are evaluated in a fixed order and the first decisive one wins.

/// What the controller observed after submitting the login form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginSnapshot {
    /// Landmark selectors that matched an element.
    pub landmarks_found: Vec<String>,
    pub current_url: String,
    pub content: String,
}

/// Site facts the checks compare against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRules {
    pub login_path: String,
    pub login_markers: Vec<String>,
}

/// The check that decided a login succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginSignal {
    Landmark(String),
    LeftLoginPage,
    NoLoginMarkers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginVerdict {
    Authenticated(LoginSignal),
    /// No check was decisive. Not an error: discovery will show whether the
    /// session is usable.
    Indeterminate,
}

impl LoginVerdict {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginVerdict::Authenticated(_))
    }
}

type Check = fn(&LoginSnapshot, &VerifyRules) -> Option<LoginSignal>;

const CHECKS: &[Check] = &[landmark_present, left_login_page, no_login_markers];

pub fn verify_login(snapshot: &LoginSnapshot, rules: &VerifyRules) -> LoginVerdict {
    CHECKS
        .iter()
        .find_map(|check| check(snapshot, rules))
        .map(LoginVerdict::Authenticated)
        .unwrap_or(LoginVerdict::Indeterminate)
}

fn landmark_present(snapshot: &LoginSnapshot, _rules: &VerifyRules) -> Option<LoginSignal> {
    snapshot
        .landmarks_found
        .first()
        .map(|l| LoginSignal::Landmark(l.clone()))
}

fn left_login_page(snapshot: &LoginSnapshot, rules: &VerifyRules) -> Option<LoginSignal> {
    let url = snapshot.current_url.trim().to_lowercase();
    let login_path = rules.login_path.trim().to_lowercase();
    if url.is_empty() || login_path.is_empty() || url == "about:blank" {
        return None;
    }
    (!url.contains(&login_path)).then_some(LoginSignal::LeftLoginPage)
}

fn no_login_markers(snapshot: &LoginSnapshot, rules: &VerifyRules) -> Option<LoginSignal> {
    if snapshot.content.trim().is_empty() || rules.login_markers.is_empty() {
        return None;
    }
    let content = snapshot.content.to_lowercase();
    let marker_seen = rules
        .login_markers
        .iter()
        .any(|m| content.contains(&m.to_lowercase()));
    (!marker_seen).then_some(LoginSignal::NoLoginMarkers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> VerifyRules {
        VerifyRules {
            login_path: "/login".to_string(),
            login_markers: vec!["type=\"password\"".to_string(), "login-form".to_string()],
        }
    }

    fn on_login_page() -> LoginSnapshot {
        LoginSnapshot {
            landmarks_found: vec![],
            current_url: "https://portal.example.com/login?err=1".to_string(),
            content: "<form class=\"login-form\"><input type=\"password\"></form>".to_string(),
        }
    }

    #[test]
    fn test_landmark_decides_first() {
        let snapshot = LoginSnapshot {
            landmarks_found: vec!["#logout".to_string()],
            ..on_login_page()
        };
        assert_eq!(
            verify_login(&snapshot, &rules()),
            LoginVerdict::Authenticated(LoginSignal::Landmark("#logout".to_string()))
        );
    }

    #[test]
    fn test_url_change_is_enough() {
        let snapshot = LoginSnapshot {
            current_url: "https://portal.example.com/home".to_string(),
            ..on_login_page()
        };
        assert_eq!(
            verify_login(&snapshot, &rules()),
            LoginVerdict::Authenticated(LoginSignal::LeftLoginPage)
        );
    }

    #[test]
    fn test_missing_markers_is_enough() {
        let snapshot = LoginSnapshot {
            content: "<h1>Welcome</h1>".to_string(),
            ..on_login_page()
        };
        assert_eq!(
            verify_login(&snapshot, &rules()),
            LoginVerdict::Authenticated(LoginSignal::NoLoginMarkers)
        );
    }

    #[test]
    fn test_still_on_login_form_is_indeterminate() {
        let verdict = verify_login(&on_login_page(), &rules());
        assert_eq!(verdict, LoginVerdict::Indeterminate);
        assert!(!verdict.is_authenticated());
    }

    #[test]
    fn test_empty_observations_are_not_decisive() {
        let snapshot = LoginSnapshot {
            landmarks_found: vec![],
            current_url: "about:blank".to_string(),
            content: "   ".to_string(),
        };
        assert_eq!(verify_login(&snapshot, &rules()), LoginVerdict::Indeterminate);
    }

    #[test]
    fn test_markers_match_case_insensitively() {
        let snapshot = LoginSnapshot {
            content: "<FORM CLASS=\"LOGIN-FORM\"></FORM>".to_string(),
            ..on_login_page()
        };
        assert_eq!(verify_login(&snapshot, &rules()), LoginVerdict::Indeterminate);
    }
}
