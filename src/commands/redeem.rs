use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::{EntryKind, LedgerEntry, RedemptionCode, Tier},
    ports::{
        catalog::CatalogPort,
        directory::DirectoryPort,
        ledger::{self, LedgerPort},
        settings::SettingsPort,
    },
};
use chrono::{DateTime, Utc};
use tower::Service;
use tracing::{debug, info};

use super::{delta_for, DomainLogic, Error};

/// Exchange points for a reward from the catalog
pub struct RedeemRequest {
    pub phone: String,
    pub reward_id: String,
    /// Identifier of the inbound message, used to suppress redeliveries
    pub message_id: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedeemResponse {
    pub phone: String,
    pub reward_title: String,
    /// Code the customer shows to the staff
    pub code: RedemptionCode,
    /// Remaining number of loyalty points
    pub points: u64,
    pub tier: Tier,
    /// The message had already been processed and its recorded result is returned
    pub replayed: bool,
}

impl<D, S, C> Service<RedeemRequest> for DomainLogic<D, S, C>
where
    D: DirectoryPort + LedgerPort + Send + Sync + 'static,
    S: SettingsPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = RedeemResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RedeemRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move { logic.redeem(req).await })
    }
}

impl<D, S, C> DomainLogic<D, S, C>
where
    D: DirectoryPort + LedgerPort + Send + Sync + 'static,
    S: SettingsPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    async fn redeem(&self, req: RedeemRequest) -> Result<RedeemResponse, Error> {
        let _guard = self.locks.acquire(&req.phone).await;
        let customer = self.sync_customer(&req.phone).await?;

        if let Some(existing) = self.database.find_by_message(&req.message_id).await? {
            return self.replay_redemption(&req, existing).await;
        }

        let reward = self
            .catalog
            .find_reward(&req.reward_id)
            .await?
            .ok_or_else(|| Error::UnknownReward(req.reward_id.clone()))?;
        if customer.points < reward.cost {
            debug!(
                phone = %req.phone,
                points = customer.points,
                cost = reward.cost,
                "redemption rejected: insufficient balance"
            );
            return Err(Error::InsufficientBalance {
                balance: customer.points,
                cost: reward.cost,
            });
        }

        let code = RedemptionCode::generate();
        let entry = LedgerEntry::redemption(
            req.phone.clone(),
            req.received_at,
            reward.cost,
            &code,
            req.message_id.clone(),
        );
        let entry = match self.database.append(entry).await {
            Ok(entry) => entry,
            Err(ledger::Error::DuplicateMessage { existing }) => {
                return self.replay_redemption(&req, *existing).await;
            }
            Err(err) => return Err(err.into()),
        };

        let customer = self
            .database
            .apply_delta(&req.phone, delta_for(&entry))
            .await?;
        info!(
            phone = %req.phone,
            reward = %reward.id,
            cost = reward.cost,
            points = customer.points,
            "reward redeemed"
        );

        Ok(RedeemResponse {
            phone: customer.phone,
            reward_title: reward.title,
            code,
            points: customer.points,
            tier: customer.tier,
            replayed: false,
        })
    }

    async fn replay_redemption(
        &self,
        req: &RedeemRequest,
        existing: LedgerEntry,
    ) -> Result<RedeemResponse, Error> {
        let code = match (existing.kind, existing.reference) {
            (EntryKind::Redemption, Some(code)) if existing.phone == req.phone => {
                RedemptionCode::from(code)
            }
            _ => {
                return Err(Error::InvalidState(
                    format!("message {} was recorded for another operation", req.message_id)
                        .into(),
                ))
            }
        };
        info!(phone = %req.phone, message_id = %req.message_id, "replaying redemption");

        // The catalog may have changed since, fall back to the id the customer sent
        let reward_title = self
            .catalog
            .find_reward(&req.reward_id)
            .await?
            .map(|reward| reward.title)
            .unwrap_or_else(|| req.reward_id.clone());
        let customer = self.sync_customer(&req.phone).await?;

        Ok(RedeemResponse {
            phone: customer.phone,
            reward_title,
            code,
            points: customer.points,
            tier: customer.tier,
            replayed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::database::memory::MemoryDatabase,
        commands::{accrue::AccrueRequest, testing::*},
    };
    use rstest::*;
    use rust_decimal::Decimal;
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    fn request(reward_id: &str, message_id: &str) -> RedeemRequest {
        RedeemRequest {
            phone: PHONE.to_string(),
            reward_id: reward_id.to_string(),
            message_id: message_id.to_string(),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_call_exact_balance() -> Result<(), BoxError> {
        // GIVEN a customer with 30 points and a reward costing 30
        let database = MemoryDatabase::default();
        seed(&database, PHONE, 30).await;
        let domain = memory_logic(&database, &settings());

        // WHEN redeeming the reward
        let res = domain.clone().oneshot(request("R1", "m1")).await;

        // THEN
        // * the balance drops to 0
        // * a 6-digit code is issued and recorded on the ledger entry
        // * the visit count is unchanged
        assert_that!(res).is_ok().matches(|res| {
            res.points == 0
                && res.tier == Tier::Bronze
                && res.reward_title == "Free coffee"
                && res.code.as_str().len() == 6
        });
        let entries = database.entries_since(PHONE, 1).await?;
        assert_that!(entries).has_length(1);
        assert_that!(entries[0].delta_points).is_equal_to(-30_i64);
        assert_that!(entries[0].kind).is_equal_to(EntryKind::Redemption);
        let customer = database.get_or_create(PHONE, "").await?;
        assert_that!(customer.visits).is_equal_to(1_u32);

        Ok(())
    }

    #[tokio::test]
    async fn test_insufficient_balance() -> Result<(), BoxError> {
        // GIVEN a customer with 30 points and a reward costing 31
        let database = MemoryDatabase::default();
        seed(&database, PHONE, 30).await;
        let domain = memory_logic(&database, &settings());

        // WHEN redeeming the reward
        let res = domain.clone().oneshot(request("R2", "m1")).await;

        // THEN it fails and no ledger entry is written
        assert_that!(res).is_err().matches(|err| {
            matches!(
                err,
                Error::InsufficientBalance {
                    balance: 30,
                    cost: 31
                }
            )
        });
        assert_that!(database.entries_since(PHONE, 1).await?).is_empty();

        Ok(())
    }

    #[rstest]
    #[case("R9")]
    #[case("")]
    #[tokio::test]
    async fn test_unknown_reward(#[case] reward_id: &str) -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        seed(&database, PHONE, 100).await;
        let domain = memory_logic(&database, &settings());

        let res = domain.clone().oneshot(request(reward_id, "m1")).await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::UnknownReward(_)));

        Ok(())
    }

    #[tokio::test]
    async fn test_replay_returns_same_code() -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        seed(&database, PHONE, 70).await;
        let domain = memory_logic(&database, &settings());

        let first = domain.clone().oneshot(request("r1", "m1")).await?;
        let second = domain.clone().oneshot(request("r1", "m1")).await?;

        assert_that!(second).is_equal_to(RedeemResponse {
            replayed: true,
            ..first.clone()
        });
        assert_that!(first.points).is_equal_to(40_u64);
        assert_that!(ledger_balance(&database, PHONE).await).is_equal_to(40_i64);

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_keep_floor() -> Result<(), BoxError> {
        // GIVEN 30 points, enough for a single reward
        let database = MemoryDatabase::default();
        seed(&database, PHONE, 30).await;
        let domain = memory_logic(&database, &settings());

        // WHEN redeeming it twice at the same time
        let first = tokio::spawn(domain.clone().oneshot(request("R1", "m1")));
        let second = tokio::spawn(domain.clone().oneshot(request("R1", "m2")));
        let results = [first.await?, second.await?];

        // THEN only one succeeds
        assert_that!(results.iter().filter(|res| res.is_ok()).count()).is_equal_to(1_usize);
        assert_that!(ledger_balance(&database, PHONE).await).is_equal_to(0_i64);

        Ok(())
    }

    #[tokio::test]
    async fn test_ledger_reconciles_with_aggregate() -> Result<(), BoxError> {
        // GIVEN an interleaving of accruals and redemptions, some of them redelivered
        let database = MemoryDatabase::default();
        seed(&database, PHONE, 25).await;
        let domain = memory_logic(&database, &settings());
        let accrue = |bill: i64, message_id: &str| AccrueRequest {
            phone: PHONE.to_string(),
            bill: Decimal::from(bill),
            code: Some(CODE.to_string()),
            invoice: None,
            message_id: message_id.to_string(),
            received_at: Utc::now(),
        };

        let _ = domain.clone().oneshot(accrue(250, "a1")).await;
        let _ = domain.clone().oneshot(request("R1", "r1")).await;
        let _ = domain.clone().oneshot(accrue(250, "a1")).await;
        let _ = domain.clone().oneshot(accrue(400, "a2")).await;
        let _ = domain.clone().oneshot(request("R2", "r2")).await;
        let _ = domain.clone().oneshot(request("R1", "r1")).await;

        // THEN the aggregate balance is the sum of the ledger deltas
        let customer = database.get_or_create(PHONE, "").await?;
        assert_that!(customer.points as i64).is_equal_to(ledger_balance(&database, PHONE).await);

        Ok(())
    }
}
