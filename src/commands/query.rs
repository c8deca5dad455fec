//! Read-only queries: balance, reward catalog and ledger reconciliation.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::{Customer, Reward},
    ports::{
        catalog::CatalogPort, directory::DirectoryPort, ledger::LedgerPort,
        settings::SettingsPort,
    },
};
use tower::Service;
use tracing::warn;

use super::{DomainLogic, Error};

pub struct BalanceRequest {
    pub phone: String,
}

pub struct CatalogRequest;

/// Compare a customer aggregate with the ledger it is projected from
pub struct ReconcileRequest {
    pub phone: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ReconcileResponse {
    /// Sum of all the ledger deltas of the customer
    pub ledger_points: i64,
    /// Balance held by the customer aggregate
    pub aggregate_points: u64,
    /// Ledger entries not yet folded into the aggregate
    pub pending_entries: usize,
}

impl ReconcileResponse {
    pub fn is_consistent(&self) -> bool {
        self.ledger_points == self.aggregate_points as i64
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>;

impl<D, S, C> Service<BalanceRequest> for DomainLogic<D, S, C>
where
    D: DirectoryPort + LedgerPort + Send + Sync + 'static,
    S: SettingsPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = Customer;
    type Error = Error;
    type Future = BoxFuture<Customer>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: BalanceRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            let _guard = logic.locks.acquire(&req.phone).await;
            logic.sync_customer(&req.phone).await
        })
    }
}

impl<D, S, C> Service<CatalogRequest> for DomainLogic<D, S, C>
where
    D: DirectoryPort + LedgerPort + Send + Sync + 'static,
    S: SettingsPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = Vec<Reward>;
    type Error = Error;
    type Future = BoxFuture<Vec<Reward>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: CatalogRequest) -> Self::Future {
        let catalog = self.catalog.clone();
        Box::pin(async move { Ok(catalog.list_rewards().await?) })
    }
}

impl<D, S, C> Service<ReconcileRequest> for DomainLogic<D, S, C>
where
    D: DirectoryPort + LedgerPort + Send + Sync + 'static,
    S: SettingsPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = ReconcileResponse;
    type Error = Error;
    type Future = BoxFuture<ReconcileResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ReconcileRequest) -> Self::Future {
        let database = self.database.clone();
        let locks = self.locks.clone();
        Box::pin(async move {
            let _guard = locks.acquire(&req.phone).await;
            let customer = database.get_or_create(&req.phone, "").await?;
            let entries = database.entries_since(&req.phone, 0).await?;

            let response = ReconcileResponse {
                ledger_points: entries.iter().map(|entry| entry.delta_points).sum(),
                aggregate_points: customer.points,
                pending_entries: entries
                    .iter()
                    .filter(|entry| entry.seq > customer.applied_seq)
                    .count(),
            };
            if !response.is_consistent() {
                warn!(phone = %req.phone, ?response, "customer aggregate drifted from ledger");
            }

            Ok(response)
        })
    }
}
