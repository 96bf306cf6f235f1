use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::api::DashboardApi;
use crate::error::ClientError;
use crate::types::{
    Account, DashboardPayload, StatBlock, Transaction, TransactionFilters, TransactionKind,
    TransactionStatus,
};

type Reply = Result<DashboardPayload, ClientError>;

enum Scripted {
    Gated(oneshot::Receiver<Reply>),
    Now(Reply),
}

/// Payload whose `active_accounts` stat identifies which response it is.
pub fn payload(marker: u32) -> DashboardPayload {
    DashboardPayload {
        stats: StatBlock {
            total_balance: Decimal::new(1_000_00, 2),
            active_accounts: marker,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// In-memory dashboard backend whose dashboard replies can be held back and
/// released in any order.
#[derive(Default)]
pub struct ScriptedApi {
    dashboard_calls: AtomicUsize,
    script: Mutex<VecDeque<Scripted>>,
    account_failures: Mutex<VecDeque<ClientError>>,
    account_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next unscripted dashboard call waits for the returned sender.
    pub fn gate(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().push_back(Scripted::Gated(rx));
        tx
    }

    pub fn fail_next_dashboard(&self, err: ClientError) {
        self.script.lock().push_back(Scripted::Now(Err(err)));
    }

    pub fn fail_next_account(&self, err: ClientError) {
        self.account_failures.lock().push_back(err);
    }

    /// The next account read waits until the returned sender fires or drops.
    pub fn gate_account(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.account_gate.lock() = Some(rx);
        tx
    }

    pub fn dashboard_calls(&self) -> usize {
        self.dashboard_calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_dashboard_calls(&self, n: usize) {
        while self.dashboard_calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl DashboardApi for ScriptedApi {
    async fn dashboard(&self) -> Result<DashboardPayload, ClientError> {
        let call = self.dashboard_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Gated(rx)) => rx.await.unwrap_or_else(|_| {
                Err(ClientError::Api {
                    status: 599,
                    message: "gate dropped".into(),
                })
            }),
            Some(Scripted::Now(reply)) => reply,
            None => Ok(payload(call as u32)),
        }
    }

    async fn transactions(
        &self,
        filters: &TransactionFilters,
    ) -> Result<Vec<Transaction>, ClientError> {
        Ok(vec![Transaction {
            id: format!("tx-{}", filters.cache_key()),
            kind: filters.kind.unwrap_or(TransactionKind::Deposit),
            amount: Decimal::new(250, 0),
            currency: "USD".into(),
            status: filters.status.unwrap_or(TransactionStatus::Completed),
            description: None,
            created_at: None,
        }])
    }

    async fn account(&self, id: &str) -> Result<Account, ClientError> {
        let gate = self.account_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(err) = self.account_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(Account {
            id: id.to_string(),
            account_number: format!("MT-{id}"),
            account_type: "standard".into(),
            currency: "USD".into(),
            balance: Decimal::new(500, 0),
            equity: None,
            leverage: Some(100),
            status: "active".into(),
            created_at: None,
        })
    }
}
