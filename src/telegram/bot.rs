//! Bot initialization, command enum and dispatcher schema.

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;
use teloxide::utils::command::BotCommands;

use crate::core::config;
use crate::download::{DownloadOrchestrator, VideoCatalog};
use crate::storage::DbPool;
use crate::telegram::admin;
use crate::telegram::handlers;
use crate::telegram::subscriptions::SubscriptionGate;

/// Error type flowing out of handler endpoints
pub type HandlerError = anyhow::Error;

/// Shared dependencies injected into every handler
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub catalog: Arc<VideoCatalog>,
    pub orchestrator: Arc<DownloadOrchestrator>,
    pub gate: Arc<SubscriptionGate>,
}

/// User-visible bot commands
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Я умею:")]
pub enum Command {
    #[command(description = "главное меню")]
    Start,
    #[command(description = "помощь и инструкции")]
    Help,
    #[command(description = "ваша статистика скачиваний")]
    Stats,
    #[command(description = "история загрузок")]
    History,
    #[command(description = "панель администратора")]
    Admin,
}

/// Creates a Bot instance from the configured token
pub fn create_bot() -> anyhow::Result<Bot> {
    let token = config::BOT_TOKEN.clone();
    if token.is_empty() {
        anyhow::bail!("BOT_TOKEN is not set");
    }
    Ok(Bot::new(token))
}

/// Creates the main dispatcher schema for the bot.
///
/// Returns a handler tree usable with teloxide's Dispatcher. Admin-only
/// commands that take free-form arguments are routed as hidden text
/// branches rather than through the `Command` enum.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_broadcast = deps.clone();
    let deps_ban = deps.clone();
    let deps_unban = deps.clone();
    let deps_set_subscription = deps.clone();
    let deps_subscription_status = deps.clone();
    let deps_disable_subscription = deps.clone();
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // Hidden admin commands (not in the Command enum)
        .branch(text_command_handler("/broadcast", move |bot, msg| {
            let deps = deps_broadcast.clone();
            async move { admin::handle_broadcast_command(&bot, &msg, deps).await }
        }))
        .branch(text_command_handler("/ban", move |bot, msg| {
            let deps = deps_ban.clone();
            async move { admin::handle_ban_command(&bot, &msg, deps, true).await }
        }))
        .branch(text_command_handler("/unban", move |bot, msg| {
            let deps = deps_unban.clone();
            async move { admin::handle_ban_command(&bot, &msg, deps, false).await }
        }))
        .branch(text_command_handler("/set_subscription", move |bot, msg| {
            let deps = deps_set_subscription.clone();
            async move { admin::handle_set_subscription_command(&bot, &msg, deps).await }
        }))
        .branch(text_command_handler("/subscription_status", move |bot, msg| {
            let deps = deps_subscription_status.clone();
            async move { admin::handle_subscription_status_command(&bot, &msg, deps).await }
        }))
        .branch(text_command_handler("/disable_subscription", move |bot, msg| {
            let deps = deps_disable_subscription.clone();
            async move { admin::handle_disable_subscription_command(&bot, &msg, deps).await }
        }))
        // Regular commands
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
                    let deps = deps_commands.clone();
                    async move { handlers::handle_command(&bot, &msg, cmd, deps).await }
                }),
        )
        // Plain messages carrying video URLs
        .branch(Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let deps = deps_messages.clone();
            async move { handlers::handle_message(&bot, &msg, deps).await }
        }))
        // Inline keyboard callbacks
        .branch(Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
            let deps = deps_callback.clone();
            async move { handlers::handle_callback(&bot, q, deps).await }
        }))
}

/// Branch matching a message whose text starts with the given command
fn text_command_handler<F, Fut>(command: &'static str, endpoint: F) -> UpdateHandler<HandlerError>
where
    F: Fn(Bot, Message) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Update::filter_message()
        .filter(move |msg: Message| {
            msg.text()
                .map(|text| {
                    text == command || text.starts_with(&format!("{} ", command)) || text.starts_with(&format!("{}@", command))
                })
                .unwrap_or(false)
        })
        .endpoint(move |bot: Bot, msg: Message| endpoint(bot, msg))
}
