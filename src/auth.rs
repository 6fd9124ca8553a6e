//! Sign-in state as seen by the claim board.
//!
//! The sign-in flow itself lives with an external provider; this module only
//! turns the profile it hands back into the gate the board checks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub sub: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub user_name: Option<String>,
    pub auth_error: Option<String>,
}

impl AuthState {
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Accepts `profile` unless its e-mail falls outside `allowed_domain`.
    pub fn from_profile(profile: &UserProfile, allowed_domain: Option<&str>) -> Self {
        if let Some(domain) = allowed_domain.map(normalize_domain).filter(|d| !d.is_empty()) {
            if !domain_allowed(&profile.email, &domain) {
                return Self {
                    auth_error: Some(format!(
                        "Access restricted to {domain} accounts only. Your email ({}) is not from the allowed organization.",
                        profile.email
                    )),
                    ..Self::default()
                };
            }
        }
        Self {
            is_authenticated: true,
            is_loading: false,
            user_name: Some(profile.name.clone()),
            auth_error: None,
        }
    }

    /// Name recorded against a claim, if selection is currently allowed.
    pub fn claimant(&self) -> Option<&str> {
        if self.is_authenticated && !self.is_loading {
            self.user_name.as_deref().filter(|name| !name.trim().is_empty())
        } else {
            None
        }
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('@').to_ascii_lowercase()
}

pub fn domain_allowed(email: &str, domain: &str) -> bool {
    let domain = normalize_domain(domain);
    email
        .rsplit_once('@')
        .is_some_and(|(_, host)| host.eq_ignore_ascii_case(&domain))
}
