//! Inbound message handling: interpret the text, run the engines, reply.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tower::ServiceExt;
use tracing::{error, info_span, warn, Instrument};

use crate::{
    commands::{
        accrue::{AccrueRequest, AccrueResponse},
        query::{BalanceRequest, CatalogRequest},
        redeem::{RedeemRequest, RedeemResponse},
        DomainLogic, Error,
    },
    domain::{Customer, Reward},
    interpreter::{self, Command, Usage},
    ports::{
        catalog::CatalogPort, directory::DirectoryPort, ledger::LedgerPort,
        messaging::MessagingPort, settings::SettingsPort,
    },
};

/// Message delivered by the messaging channel
///
/// The channel may deliver the same message more than once, with the same `message_id`.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub sender: String,
    pub text: String,
    pub message_id: String,
    pub display_name: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(
        sender: impl Into<String>,
        text: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            message_id: message_id.into(),
            display_name: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

pub struct Handler<D, S, C, M> {
    logic: DomainLogic<D, S, C>,
    settings: Arc<S>,
    messaging: Arc<M>,
    business_name: String,
    welcome_text: Option<String>,
}

impl<D, S, C, M> Handler<D, S, C, M>
where
    D: DirectoryPort + LedgerPort + Send + Sync + 'static,
    S: SettingsPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
    M: MessagingPort + Send + Sync + 'static,
{
    pub fn new(
        logic: DomainLogic<D, S, C>,
        settings: Arc<S>,
        messaging: Arc<M>,
        business_name: impl Into<String>,
    ) -> Self {
        Self {
            logic,
            settings,
            messaging,
            business_name: business_name.into(),
            welcome_text: None,
        }
    }

    /// Replace the generated welcome text
    pub fn with_welcome_text(mut self, welcome_text: Option<String>) -> Self {
        self.welcome_text = welcome_text;
        self
    }

    /// Handle one inbound message and send the reply back to the sender
    ///
    /// The reply is returned as well. Failing to deliver it doesn't undo anything recorded for
    /// the message.
    pub async fn handle_inbound(&self, message: InboundMessage) -> String {
        let span = info_span!("inbound", sender = %message.sender, message_id = %message.message_id);
        async {
            let reply = self.reply_to(&message).await;
            if let Err(err) = self.messaging.send(&message.sender, &reply).await {
                warn!(%err, "could not deliver reply");
            }
            reply
        }
        .instrument(span)
        .await
    }

    async fn reply_to(&self, message: &InboundMessage) -> String {
        let name = message.display_name.as_deref().unwrap_or_default();
        if let Err(err) = self.logic.register(&message.sender, name).await {
            return self.reply_error(err);
        }

        match interpreter::parse(&message.text) {
            Command::Start => self.welcome().await,
            Command::Points => self
                .logic
                .clone()
                .oneshot(BalanceRequest {
                    phone: message.sender.clone(),
                })
                .await
                .map(|customer| reply_points(&customer))
                .unwrap_or_else(|err| self.reply_error(err)),
            Command::Rewards => self
                .logic
                .clone()
                .oneshot(CatalogRequest)
                .await
                .map(|rewards| reply_rewards(&rewards))
                .unwrap_or_else(|err| self.reply_error(err)),
            Command::Redeem { reward_id } => self
                .logic
                .clone()
                .oneshot(RedeemRequest {
                    phone: message.sender.clone(),
                    reward_id,
                    message_id: message.message_id.clone(),
                    received_at: message.received_at,
                })
                .await
                .map(|res| reply_redeemed(&res))
                .unwrap_or_else(|err| self.reply_error(err)),
            Command::Add {
                bill,
                code,
                invoice,
            } => self
                .logic
                .clone()
                .oneshot(AccrueRequest {
                    phone: message.sender.clone(),
                    bill,
                    code: Some(code),
                    invoice,
                    message_id: message.message_id.clone(),
                    received_at: message.received_at,
                })
                .await
                .map(|res| reply_accrued(&res))
                .unwrap_or_else(|err| self.reply_error(err)),
            Command::Usage(usage) => reply_usage(usage).to_string(),
            Command::Unknown => "Send \"start\" to see the menu 👇".to_string(),
        }
    }

    async fn welcome(&self) -> String {
        if let Some(text) = &self.welcome_text {
            return text.clone();
        }
        // The earn rate is informative, fall back to the defaults if settings are unavailable
        let rate = match self.settings.fetch().await {
            Ok(settings) => settings.egp_per_point,
            Err(err) => {
                warn!(%err, "could not fetch settings for the welcome text");
                crate::domain::Settings::default().egp_per_point
            }
        };

        [
            format!("🎉 Welcome to {} 🎉", self.business_name),
            String::new(),
            "Glad to have you! From today you earn points on every purchase.".to_string(),
            format!("📌 Every {rate} EGP = 1 point"),
            "🎁 Collect points and swap them for rewards.".to_string(),
            String::new(),
            "Send: points (your balance) | rewards (the catalog) | add <amount> <code> [invoice] | redeem <id>".to_string(),
        ]
        .join("\n")
    }

    fn reply_error(&self, err: Error) -> String {
        match err {
            Error::InvalidInput(reason) => {
                format!("❌ Invalid request: {reason}.\n{}", reply_usage(Usage::Add))
            }
            Error::InvalidCode => {
                "❌ That code isn't valid today. Ask the staff for today's code.".to_string()
            }
            Error::BelowMinimum { minimum, .. } => {
                format!("Bills under {minimum} EGP don't earn points.")
            }
            Error::DailyCapReached { cap } => {
                format!("You've reached today's limit of {cap} points. See you tomorrow!")
            }
            Error::UnknownReward(reward_id) => {
                format!("There is no reward \"{reward_id}\". Send \"rewards\" to see the list.")
            }
            Error::InsufficientBalance { balance, cost } => {
                format!("This reward costs {cost} points and you have {balance}.")
            }
            err @ (Error::Misconfigured(_)
            | Error::StorageUnavailable(_)
            | Error::InvalidState(_)) => {
                error!(%err, "could not handle message");
                "⚠️ Something went wrong on our side, please try again in a moment.".to_string()
            }
        }
    }
}

fn reply_points(customer: &Customer) -> String {
    format!(
        "⭐ You have {} points ({} tier).",
        customer.points, customer.tier
    )
}

fn reply_rewards(rewards: &[Reward]) -> String {
    if rewards.is_empty() {
        return "No rewards are available right now.".to_string();
    }

    let mut lines = vec!["🎁 Rewards:".to_string()];
    lines.extend(
        rewards
            .iter()
            .map(|reward| format!("{} - {} ({} points)", reward.id, reward.title, reward.cost)),
    );
    lines.push("Send \"redeem <id>\" to get one.".to_string());
    lines.join("\n")
}

fn reply_accrued(res: &AccrueResponse) -> String {
    format!(
        "✅ {} points added. You now have {} points ({} tier).",
        res.granted_points, res.points, res.tier
    )
}

fn reply_redeemed(res: &RedeemResponse) -> String {
    format!(
        "🎁 {} redeemed! Show this code to the staff: {}\nRemaining balance: {} points.",
        res.reward_title, res.code, res.points
    )
}

fn reply_usage(usage: Usage) -> &'static str {
    match usage {
        Usage::Add => "Usage: add <amount> <code> [invoice], e.g. add 250 1234",
        Usage::Redeem => "Usage: redeem <id>. Send \"rewards\" to see the ids.",
    }
}
