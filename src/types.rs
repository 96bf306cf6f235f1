/// Dashboard data shapes shared by the API layer and the sync engine

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatBlock {
    pub total_balance: Decimal,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub total_profit: Decimal,
    pub active_accounts: u32,
    pub pending_transactions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
    Trade,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub equity: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<u32>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePoint {
    pub date: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub profit: Decimal,
}

/// `data` of `GET /api/client/dashboard`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardPayload {
    pub stats: StatBlock,
    pub recent_transactions: Vec<Transaction>,
    pub active_accounts: Vec<Account>,
    pub trading_performance: Vec<PerformancePoint>,
}

/// Immutable aggregate read. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub stats: StatBlock,
    pub recent_transactions: Vec<Transaction>,
    pub active_accounts: Vec<Account>,
    pub trading_performance: Vec<PerformancePoint>,
    pub fetched_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    pub fn from_payload(payload: DashboardPayload, fetched_at: DateTime<Utc>) -> Self {
        Self {
            stats: payload.stats,
            recent_transactions: payload.recent_transactions,
            active_accounts: payload.active_accounts,
            trading_performance: payload.trading_performance,
            fetched_at,
        }
    }
}

/// Query filters for `GET /api/client/dashboard/transactions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilters {
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl TransactionFilters {
    /// Query pairs in a fixed order, so equal filters give equal query strings.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(kind) = self.kind {
            pairs.push(("type", enum_label(&kind)));
        }
        if let Some(status) = self.status {
            pairs.push(("status", enum_label(&status)));
        }
        if let Some(from) = self.from {
            pairs.push(("from", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.to {
            pairs.push(("to", to.format("%Y-%m-%d").to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        pairs
    }

    /// Cache key for the transaction history slice.
    pub fn cache_key(&self) -> String {
        self.query_pairs()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn enum_label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

fn default_currency() -> String {
    "USD".to_string()
}
