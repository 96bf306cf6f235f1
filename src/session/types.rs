use serde::{Deserialize, Serialize};
use std::fmt;

/// Which identity a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Operator,
    Delegate,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Operator => write!(f, "operator"),
            Scope::Delegate => write!(f, "delegate"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub scope: Scope,
    pub token: String,
    pub subject_id: String,
}

impl Credential {
    pub fn new(scope: Scope, token: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            scope,
            token: token.into(),
            subject_id: subject_id.into(),
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// Tokens stay out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("scope", &self.scope)
            .field("token", &"<redacted>")
            .field("subject_id", &self.subject_id)
            .finish()
    }
}

/// User record returned by the backend alongside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}

impl Subject {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: email.into(),
        }
    }

    pub fn summary(&self) -> SubjectSummary {
        SubjectSummary {
            display_name: self.display_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Banner projection of a subject. Never used for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub display_name: String,
    pub email: String,
}

/// What one session slot holds: the credential and the user it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub credential: Credential,
    pub subject: Subject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationInfo {
    pub delegate: SubjectSummary,
    pub operator: SubjectSummary,
}

/// Published to session subscribers after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Scope of the credential outgoing requests would use, if any.
    pub scope: Option<Scope>,
    pub impersonating: bool,
    pub info: Option<ImpersonationInfo>,
}

/// Result of `SessionManager::end_impersonation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    Ended,
    /// Nothing to end: no flag, or the parked operator session is missing.
    NotImpersonating,
}
