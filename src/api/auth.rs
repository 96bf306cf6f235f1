use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::ApiClient;
use crate::error::ClientError;
use crate::session::Subject;

/// Response of `POST /api/auth/login`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginGrant {
    pub token: String,
    #[serde(alias = "subject")]
    pub user: Subject,
}

/// Response of `POST /api/auth/admin/impersonate/{subjectId}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImpersonationGrant {
    pub token: String,
    #[serde(alias = "user")]
    pub subject: Subject,
}

impl ApiClient {
    /// Exchange operator credentials for a token and install it as the
    /// current operator session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Subject, ClientError> {
        let grant: LoginGrant = self
            .post_public(
                &["api", "auth", "login"],
                &json!({ "email": email, "password": password }),
            )
            .await?;

        self.session().sign_in(grant.token, grant.user.clone())?;
        Ok(grant.user)
    }

    /// Ask the backend for a delegate token for `subject_id` without
    /// touching the session.
    pub async fn request_impersonation(
        &self,
        subject_id: &str,
    ) -> Result<ImpersonationGrant, ClientError> {
        self.post_json(
            &["api", "auth", "admin", "impersonate", subject_id],
            &json!({}),
        )
        .await
    }

    /// Obtain a delegate token and begin impersonating with it.
    pub async fn impersonate(&self, subject_id: &str) -> Result<Subject, ClientError> {
        let grant = self.request_impersonation(subject_id).await?;
        info!("Received delegate token for subject {}", grant.subject.id);
        self.session()
            .begin_impersonation(grant.token, grant.subject.clone())?;
        Ok(grant.subject)
    }
}
