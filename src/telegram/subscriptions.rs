//! The required-channel subscription gate.
//!
//! Re-architected from a module-level global into an injected store: one
//! `SubscriptionGate` per bot instance, shared by handlers through
//! `HandlerDeps`. Reads and updates go through a lock, the pass-through set
//! is concurrent, and the gate disables itself once the subscriber target
//! is reached.

use crate::core::AppResult;
use crate::storage::db::UserRecord;
use dashmap::DashSet;
use teloxide::prelude::*;
use teloxide::types::UserId;
use tokio::sync::RwLock;

/// Admin-provided gate configuration
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub active: bool,
    pub channel_id: i64,
    pub channel_name: String,
    pub channel_url: String,
    pub required_subscribers: i64,
    pub current_count: i64,
}

/// What the gate decided for one inbound event
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Let the event through
    Allow,
    /// Hold the event and prompt the user to subscribe
    Blocked(SubscriptionConfig),
}

/// Deployment-scoped subscription gate state
#[derive(Default)]
pub struct SubscriptionGate {
    config: RwLock<Option<SubscriptionConfig>>,
    processed_users: DashSet<i64>,
}

impl SubscriptionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new gate configuration (admin command)
    pub async fn set_config(&self, config: SubscriptionConfig) {
        log::info!(
            "Subscription gate enabled: channel {} ({}), target {}",
            config.channel_name,
            config.channel_id,
            config.required_subscribers
        );
        *self.config.write().await = Some(config);
    }

    /// Returns a snapshot of the current configuration
    pub async fn config(&self) -> Option<SubscriptionConfig> {
        self.config.read().await.clone()
    }

    /// Force-disables the gate. Returns false when it was not active.
    pub async fn disable(&self) -> bool {
        let mut config = self.config.write().await;
        match config.as_mut() {
            Some(cfg) if cfg.active => {
                cfg.active = false;
                log::info!("Subscription gate disabled");
                true
            }
            _ => false,
        }
    }

    /// Decides whether an event from this user may pass.
    ///
    /// Admins and users who already passed once are allowed without a
    /// Telegram round-trip. Everyone else is checked for channel
    /// membership; members are counted toward the target and remembered.
    pub async fn check(&self, bot: &Bot, user: &UserRecord) -> AppResult<GateDecision> {
        let config = match self.config().await {
            Some(cfg) if cfg.active => cfg,
            _ => return Ok(GateDecision::Allow),
        };

        if user.is_admin || self.processed_users.contains(&user.telegram_id) {
            return Ok(GateDecision::Allow);
        }

        if self.is_channel_member(bot, config.channel_id, user.telegram_id).await {
            self.record_passed_user(user.telegram_id).await;
            Ok(GateDecision::Allow)
        } else {
            Ok(GateDecision::Blocked(config))
        }
    }

    /// Re-checks membership after the user pressed "I subscribed".
    /// Returns true when the user now passes the gate.
    pub async fn confirm(&self, bot: &Bot, user: &UserRecord) -> bool {
        let config = match self.config().await {
            Some(cfg) if cfg.active => cfg,
            _ => return true,
        };

        if self.is_channel_member(bot, config.channel_id, user.telegram_id).await {
            self.record_passed_user(user.telegram_id).await;
            true
        } else {
            false
        }
    }

    async fn is_channel_member(&self, bot: &Bot, channel_id: i64, user_id: i64) -> bool {
        match bot.get_chat_member(ChatId(channel_id), UserId(user_id as u64)).await {
            Ok(member) => member.kind.is_present(),
            Err(e) => {
                log::warn!("Subscription check failed for user {}: {}", user_id, e);
                false
            }
        }
    }

    /// Remembers a passed user and advances the counter; the gate disables
    /// itself once the subscriber target is reached.
    async fn record_passed_user(&self, user_id: i64) {
        if !self.processed_users.insert(user_id) {
            return;
        }

        let mut config = self.config.write().await;
        if let Some(cfg) = config.as_mut() {
            cfg.current_count += 1;
            if cfg.current_count >= cfg.required_subscribers {
                cfg.active = false;
                log::info!(
                    "Subscription target reached ({}/{}), gate disabled",
                    cfg.current_count,
                    cfg.required_subscribers
                );
            }
        }
    }
}
