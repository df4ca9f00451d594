//! Administrator surface: panel, cleanup, statistics export, broadcast,
//! user blocking and the subscription-gate commands.

use crate::core::utils::truncate_string_safe;
use crate::download::{cleanup, stats};
use crate::storage::db;
use crate::telegram::bot::{HandlerDeps, HandlerError};
use crate::telegram::broadcast::{broadcast_to_all, BroadcastPayload};
use crate::telegram::handlers::ensure_user;
use crate::telegram::subscriptions::SubscriptionConfig;
use crate::telegram::escape_html;
use chrono::Local;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Message, MessageId, ParseMode,
};

/// Sends the main admin panel with a fresh statistics summary
pub async fn show_admin_panel(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let text = admin_panel_text(deps)?;
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(admin_panel_keyboard())
        .await?;
    Ok(())
}

fn admin_panel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("📊 Подробная статистика", "admin:stats"),
            InlineKeyboardButton::callback("📹 Популярные видео", "admin:videos"),
        ],
        vec![
            InlineKeyboardButton::callback("🧹 Очистка файлов", "admin:cleanup"),
            InlineKeyboardButton::callback("📈 Экспорт статистики", "admin:export"),
        ],
        vec![InlineKeyboardButton::callback("🆔 Экспорт пользователей", "admin:users")],
    ])
}

fn admin_panel_text(deps: &HandlerDeps) -> Result<String, HandlerError> {
    let conn = db::get_connection(&deps.db_pool)?;
    let download_stats = stats::get_download_stats(&conn)?;
    let users_count = db::get_users_count(&conn)?;
    let active_users = db::get_active_users_count(&conn)?;

    Ok(format!(
        "👑 <b>Панель администратора</b>\n\n\
         📊 <b>Статистика:</b>\n\
         • 👥 Всего пользователей: {}\n\
         • 🟢 Активных за неделю: {}\n\
         • 📥 Всего скачиваний: {}\n\
         • ✅ Успешных: {}\n\
         • ❌ Ошибок: {}\n\
         • 📈 Успешность: {:.1}%\n\
         • 📅 Сегодня: {}\n\n\
         Выберите действие:",
        users_count,
        active_users,
        download_stats.total,
        download_stats.completed,
        download_stats.failed,
        download_stats.success_rate,
        download_stats.today,
    ))
}

/// Handles `admin:*` inline keyboard callbacks
pub async fn handle_admin_callback(
    bot: &Bot,
    callback_id: CallbackQueryId,
    chat_id: Option<ChatId>,
    message_id: Option<MessageId>,
    data: &str,
    user: &db::UserRecord,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    if !user.is_admin {
        bot.answer_callback_query(callback_id)
            .text("❌ Только для администраторов")
            .await?;
        return Ok(());
    }

    let (Some(chat_id), Some(message_id)) = (chat_id, message_id) else {
        bot.answer_callback_query(callback_id).await?;
        return Ok(());
    };

    match data {
        "admin:stats" => {
            bot.answer_callback_query(callback_id).await?;
            let text = detailed_stats_text(deps)?;
            edit_with_back_button(bot, chat_id, message_id, text).await?;
        }
        "admin:videos" => {
            bot.answer_callback_query(callback_id).await?;
            let text = popular_videos_text(deps)?;
            edit_with_back_button(bot, chat_id, message_id, text).await?;
        }
        "admin:cleanup" => {
            bot.answer_callback_query(callback_id).text("🧹 Очищаем старые файлы...").await?;

            let text = match cleanup::cleanup_all(&deps.db_pool).await {
                Ok(cleaned_count) => format!(
                    "🧹 <b>Очистка завершена</b>\n\n✅ Удалено файлов: {}\n💾 Место на диске освобождено",
                    cleaned_count
                ),
                Err(e) => {
                    log::error!("Cleanup failed: {}", e);
                    "❌ Ошибка при очистке файлов".to_string()
                }
            };
            edit_with_back_button(bot, chat_id, message_id, text).await?;
        }
        "admin:export" => {
            bot.answer_callback_query(callback_id).await?;
            send_stats_export(bot, chat_id, deps).await?;
        }
        "admin:users" => {
            bot.answer_callback_query(callback_id).await?;
            send_user_ids_export(bot, chat_id, deps).await?;
        }
        "admin:back" => {
            bot.answer_callback_query(callback_id).await?;
            let text = admin_panel_text(deps)?;
            bot.edit_message_text(chat_id, message_id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(admin_panel_keyboard())
                .await?;
        }
        _ => {
            bot.answer_callback_query(callback_id).text("Неизвестное действие").await?;
        }
    }

    Ok(())
}

async fn edit_with_back_button(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: String,
) -> Result<(), HandlerError> {
    let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback("◀️ Назад", "admin:back")]]);
    bot.edit_message_text(chat_id, message_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

fn detailed_stats_text(deps: &HandlerDeps) -> Result<String, HandlerError> {
    let conn = db::get_connection(&deps.db_pool)?;
    let download_stats = stats::get_download_stats(&conn)?;
    let popular = stats::get_popular_videos(&conn, 5)?;

    let mut text = format!(
        "📊 <b>Подробная статистика</b>\n\n\
         📥 <b>Скачивания:</b>\n\
         • Всего: {}\n\
         • Успешных: {}\n\
         • Ошибок: {}\n\
         • Успешность: {:.1}%\n\
         • Сегодня: {}\n\n\
         🎬 <b>Популярные видео:</b>\n",
        download_stats.total,
        download_stats.completed,
        download_stats.failed,
        download_stats.success_rate,
        download_stats.today,
    );

    for (idx, video) in popular.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} — {} скачиваний\n",
            idx + 1,
            escape_html(&truncate_string_safe(&video.title, 50)),
            video.download_count
        ));
    }
    if popular.is_empty() {
        text.push_str("Пока нет скачиваний\n");
    }

    Ok(text)
}

fn popular_videos_text(deps: &HandlerDeps) -> Result<String, HandlerError> {
    let conn = db::get_connection(&deps.db_pool)?;
    let popular = stats::get_popular_videos(&conn, 10)?;

    let mut text = "📹 <b>Популярные видео</b>\n\n".to_string();
    for (idx, video) in popular.iter().enumerate() {
        text.push_str(&format!(
            "{}. {}\n    Скачиваний: {} | {}\n\n",
            idx + 1,
            escape_html(&truncate_string_safe(&video.title, 50)),
            video.download_count,
            escape_html(&video.url),
        ));
    }
    if popular.is_empty() {
        text.push_str("Пока нет видео");
    }

    Ok(text)
}

/// Renders the trailing-30-day report and sends it as a text document
async fn send_stats_export(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let conn = db::get_connection(&deps.db_pool)?;
    let report = stats::build_window_report(&conn, 30)?;
    drop(conn);

    let filename = format!("stats_30days_{}.txt", Local::now().format("%Y%m%d_%H%M"));
    let document = InputFile::memory(report.render().into_bytes()).file_name(filename);

    bot.send_document(chat_id, document)
        .caption(format!(
            "📊 Статистика скачиваний за последние 30 дней\n👥 Пользователей: {}\n📥 Скачиваний: {}",
            report.buckets.len(),
            report.total
        ))
        .await?;
    Ok(())
}

/// Sends the full user-id list as a text document
async fn send_user_ids_export(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let conn = db::get_connection(&deps.db_pool)?;
    let user_ids = db::get_all_user_ids(&conn)?;
    drop(conn);

    let content = user_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join("\n");
    let filename = format!("user_ids_{}.txt", Local::now().format("%Y%m%d_%H%M"));
    let document = InputFile::memory(content.into_bytes()).file_name(filename);

    bot.send_document(chat_id, document)
        .caption("👥 Список пользователей бота")
        .await?;
    Ok(())
}

/// `/broadcast` — re-sends the replied-to message to every non-blocked user
pub async fn handle_broadcast_command(bot: &Bot, msg: &Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let Some(user) = ensure_user(&deps, msg.from.as_ref())? else {
        return Ok(());
    };
    if !user.is_admin {
        bot.send_message(msg.chat.id, "❌ Эта команда только для администраторов").await?;
        return Ok(());
    }

    let Some(source) = msg.reply_to_message() else {
        bot.send_message(
            msg.chat.id,
            "📢 <b>Рассылка</b>\n\n\
             Ответьте командой /broadcast на сообщение, которое нужно разослать.\n\
             Поддерживаются текст, фото, видео, документы и другие типы сообщений.",
        )
        .parse_mode(ParseMode::Html)
        .await?;
        return Ok(());
    };

    let payload = BroadcastPayload::from_message(source);
    let status_msg = bot.send_message(msg.chat.id, "📢 Начинаем рассылку...").await?;

    let outcome = broadcast_to_all(bot, &deps.db_pool, &payload).await?;

    bot.edit_message_text(
        msg.chat.id,
        status_msg.id,
        format!(
            "✅ <b>Рассылка завершена!</b>\n\n\
             • 👥 Всего пользователей: {}\n\
             • 📤 Успешно отправлено: {}\n\
             • 🚫 Пропущено (заблокированы): {}\n\
             • ❌ Ошибок отправки: {}",
            outcome.total, outcome.sent, outcome.skipped_blocked, outcome.failed
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

/// `/ban <id>` and `/unban <id>`
pub async fn handle_ban_command(bot: &Bot, msg: &Message, deps: HandlerDeps, block: bool) -> Result<(), HandlerError> {
    let Some(user) = ensure_user(&deps, msg.from.as_ref())? else {
        return Ok(());
    };
    if !user.is_admin {
        bot.send_message(msg.chat.id, "❌ Эта команда только для администраторов").await?;
        return Ok(());
    }

    let command = if block { "/ban" } else { "/unban" };
    let target_id = msg
        .text()
        .and_then(|text| text.split_whitespace().nth(1))
        .and_then(|raw| raw.parse::<i64>().ok());

    let Some(target_id) = target_id else {
        bot.send_message(
            msg.chat.id,
            format!("❌ Укажите ID пользователя:\n<code>{} user_id</code>", command),
        )
        .parse_mode(ParseMode::Html)
        .await?;
        return Ok(());
    };

    let conn = db::get_connection(&deps.db_pool)?;
    let found = db::set_user_blocked(&conn, target_id, block)?;

    let text = match (found, block) {
        (true, true) => format!("✅ Пользователь {} заблокирован", target_id),
        (true, false) => format!("✅ Пользователь {} разблокирован", target_id),
        (false, _) => format!("❌ Пользователь {} не найден", target_id),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// `/set_subscription <channel_id> "<name>" <url> <required_count>`
pub async fn handle_set_subscription_command(bot: &Bot, msg: &Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let Some(user) = ensure_user(&deps, msg.from.as_ref())? else {
        return Ok(());
    };
    if !user.is_admin {
        bot.send_message(msg.chat.id, "❌ Эта команда только для администраторов").await?;
        return Ok(());
    }

    let Some(args) = msg.text().and_then(parse_set_subscription_args) else {
        bot.send_message(
            msg.chat.id,
            "❌ Неверный формат команды.\n\n\
             Используйте:\n\
             <code>/set_subscription channel_id \"Название канала\" https://t.me/link количество</code>\n\n\
             Пример:\n\
             <code>/set_subscription -1001234567890 \"Мой канал\" https://t.me/mychannel 100</code>",
        )
        .parse_mode(ParseMode::Html)
        .await?;
        return Ok(());
    };

    let (channel_id, channel_name, channel_url, required_subscribers) = args;
    deps.gate
        .set_config(SubscriptionConfig {
            active: true,
            channel_id,
            channel_name: channel_name.clone(),
            channel_url: channel_url.clone(),
            required_subscribers,
            current_count: 0,
        })
        .await;

    bot.send_message(
        msg.chat.id,
        format!(
            "✅ Обязательная подписка установлена!\n\n\
             📢 Канал: {}\n\
             🔗 Ссылка: {}\n\
             🎯 Требуется подписчиков: {}\n\n\
             Теперь пользователи должны подписаться на канал.",
            channel_name, channel_url, required_subscribers
        ),
    )
    .await?;
    Ok(())
}

/// `/subscription_status`
pub async fn handle_subscription_status_command(
    bot: &Bot,
    msg: &Message,
    deps: HandlerDeps,
) -> Result<(), HandlerError> {
    let Some(user) = ensure_user(&deps, msg.from.as_ref())? else {
        return Ok(());
    };
    if !user.is_admin {
        bot.send_message(msg.chat.id, "❌ Эта команда только для администраторов").await?;
        return Ok(());
    }

    let Some(config) = deps.gate.config().await.filter(|cfg| cfg.active) else {
        bot.send_message(msg.chat.id, "📭 Обязательная подписка отключена.").await?;
        return Ok(());
    };

    let progress = if config.required_subscribers > 0 {
        config.current_count as f64 / config.required_subscribers as f64 * 100.0
    } else {
        0.0
    };

    bot.send_message(
        msg.chat.id,
        format!(
            "📢 <b>Статус обязательной подписки</b>\n\n\
             ✅ Активна: Да\n\
             📢 Канал: {}\n\
             🆔 ID: <code>{}</code>\n\
             🔗 Ссылка: {}\n\
             🎯 Требуется подписчиков: {}\n\
             📊 Текущее количество: {}\n\n\
             📈 Прогресс: {}/{} ({:.1}%)",
            escape_html(&config.channel_name),
            config.channel_id,
            escape_html(&config.channel_url),
            config.required_subscribers,
            config.current_count,
            config.current_count,
            config.required_subscribers,
            progress,
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

/// `/disable_subscription`
pub async fn handle_disable_subscription_command(
    bot: &Bot,
    msg: &Message,
    deps: HandlerDeps,
) -> Result<(), HandlerError> {
    let Some(user) = ensure_user(&deps, msg.from.as_ref())? else {
        return Ok(());
    };
    if !user.is_admin {
        bot.send_message(msg.chat.id, "❌ Эта команда только для администраторов").await?;
        return Ok(());
    }

    let text = if deps.gate.disable().await {
        "✅ Обязательная подписка принудительно отключена."
    } else {
        "❌ Обязательная подписка и так отключена."
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Parses `/set_subscription <id> "<name>" <url> <count>`. The channel name
/// may be quoted to contain spaces.
fn parse_set_subscription_args(text: &str) -> Option<(i64, String, String, i64)> {
    let tokens = tokenize_quoted(text);
    if tokens.len() != 5 {
        return None;
    }

    let channel_id = tokens[1].parse::<i64>().ok()?;
    let channel_name = tokens[2].clone();
    let channel_url = tokens[3].clone();
    let required_subscribers = tokens[4].parse::<i64>().ok()?;

    if channel_name.is_empty() || required_subscribers <= 0 {
        return None;
    }
    Some((channel_id, channel_name, channel_url, required_subscribers))
}

/// Splits on whitespace, treating double-quoted runs as single tokens
fn tokenize_quoted(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
