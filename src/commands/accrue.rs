use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::{EntryKind, LedgerEntry, Tier},
    ports::{
        catalog::CatalogPort,
        directory::DirectoryPort,
        ledger::{self, LedgerPort},
        settings::SettingsPort,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tower::Service;
use tracing::{debug, info};

use super::{delta_for, DomainLogic, Error};

/// Points for a purchase, as reported by the customer
pub struct AccrueRequest {
    pub phone: String,
    /// Bill amount in EGP
    pub bill: Decimal,
    /// Daily code given by the staff at the till
    pub code: Option<String>,
    pub invoice: Option<String>,
    /// Identifier of the inbound message, used to suppress redeliveries
    pub message_id: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccrueResponse {
    pub phone: String,
    /// Points credited for this purchase
    pub granted_points: u64,
    /// New number of loyalty points
    pub points: u64,
    pub tier: Tier,
    /// The message had already been processed and its recorded result is returned
    pub replayed: bool,
}

impl<D, S, C> Service<AccrueRequest> for DomainLogic<D, S, C>
where
    D: DirectoryPort + LedgerPort + Send + Sync + 'static,
    S: SettingsPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = AccrueResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AccrueRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move { logic.accrue(req).await })
    }
}

impl<D, S, C> DomainLogic<D, S, C>
where
    D: DirectoryPort + LedgerPort + Send + Sync + 'static,
    S: SettingsPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    async fn accrue(&self, req: AccrueRequest) -> Result<AccrueResponse, Error> {
        if req.bill <= Decimal::ZERO {
            return Err(Error::InvalidInput("the amount must be more than 0 EGP".into()));
        }
        let code = match req.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code,
            _ => return Err(Error::InvalidInput("the daily code is missing".into())),
        };

        let _guard = self.locks.acquire(&req.phone).await;
        self.sync_customer(&req.phone).await?;

        // Redelivered message: the code may have rotated since, so replay before validating
        if let Some(existing) = self.database.find_by_message(&req.message_id).await? {
            return self.replay_accrual(&req, existing).await;
        }

        let settings = self.settings.fetch().await?;
        if !settings.accepts_code(code) {
            debug!(phone = %req.phone, "accrual rejected: invalid code");
            return Err(Error::InvalidCode);
        }
        if req.bill < settings.min_bill {
            debug!(phone = %req.phone, bill = %req.bill, "accrual rejected: below minimum");
            return Err(Error::BelowMinimum {
                bill: req.bill,
                minimum: settings.min_bill,
            });
        }
        let raw_points = settings.points_for(req.bill);

        let business_day = req.received_at.with_timezone(&self.timezone).date_naive();
        let today = self
            .database
            .sum_accrual_today(&req.phone, business_day, self.timezone)
            .await?;
        let remaining = settings.daily_cap.saturating_sub(today);
        if remaining == 0 {
            debug!(phone = %req.phone, cap = settings.daily_cap, "accrual rejected: daily cap reached");
            return Err(Error::DailyCapReached {
                cap: settings.daily_cap,
            });
        }
        let granted_points = raw_points.min(remaining);

        let entry = LedgerEntry::accrual(
            req.phone.clone(),
            req.received_at,
            granted_points,
            req.bill,
            req.invoice.clone(),
            req.message_id.clone(),
        );
        let entry = match self.database.append(entry).await {
            Ok(entry) => entry,
            Err(ledger::Error::DuplicateMessage { existing }) => {
                return self.replay_accrual(&req, *existing).await;
            }
            Err(err) => return Err(err.into()),
        };

        let customer = self
            .database
            .apply_delta(&req.phone, delta_for(&entry))
            .await?;
        info!(
            phone = %req.phone,
            raw_points,
            granted_points,
            points = customer.points,
            "points accrued"
        );

        Ok(AccrueResponse {
            phone: customer.phone,
            granted_points,
            points: customer.points,
            tier: customer.tier,
            replayed: false,
        })
    }

    async fn replay_accrual(
        &self,
        req: &AccrueRequest,
        existing: LedgerEntry,
    ) -> Result<AccrueResponse, Error> {
        if existing.kind != EntryKind::Accrual || existing.phone != req.phone {
            return Err(Error::InvalidState(
                format!("message {} was recorded for another operation", req.message_id).into(),
            ));
        }
        info!(phone = %req.phone, message_id = %req.message_id, "replaying accrual");

        let customer = self.sync_customer(&req.phone).await?;
        Ok(AccrueResponse {
            phone: customer.phone,
            granted_points: existing.delta_points.unsigned_abs(),
            points: customer.points,
            tier: customer.tier,
            replayed: true,
        })
    }
}
