use async_trait::async_trait;

use super::ApiClient;
use crate::error::ClientError;
use crate::types::{Account, DashboardPayload, Transaction, TransactionFilters};

/// Dashboard reads the sync engine depends on.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// `GET /api/client/dashboard`
    async fn dashboard(&self) -> Result<DashboardPayload, ClientError>;

    /// `GET /api/client/dashboard/transactions?<filters>`
    async fn transactions(
        &self,
        filters: &TransactionFilters,
    ) -> Result<Vec<Transaction>, ClientError>;

    /// `GET /api/client/dashboard/account/{id}`
    async fn account(&self, id: &str) -> Result<Account, ClientError>;
}

#[async_trait]
impl DashboardApi for ApiClient {
    async fn dashboard(&self) -> Result<DashboardPayload, ClientError> {
        self.get_data(&["api", "client", "dashboard"], &[]).await
    }

    async fn transactions(
        &self,
        filters: &TransactionFilters,
    ) -> Result<Vec<Transaction>, ClientError> {
        self.get_data(
            &["api", "client", "dashboard", "transactions"],
            &filters.query_pairs(),
        )
        .await
    }

    async fn account(&self, id: &str) -> Result<Account, ClientError> {
        self.get_data(&["api", "client", "dashboard", "account", id], &[])
            .await
    }
}
