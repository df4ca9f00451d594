//! User-facing handlers: commands, the URL download flow and callbacks.

use crate::core::utils::format_file_size;
use crate::core::{config, resolver};
use crate::download::catalog::available_qualities;
use crate::download::stats;
use crate::storage::db::{self, DownloadStatus, FormatType, UserRecord, VideoRecord};
use crate::telegram::bot::{Command, HandlerDeps, HandlerError};
use crate::telegram::{admin, escape_html, GateDecision};
use chrono::NaiveDateTime;
use std::path::PathBuf;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Message, ParseMode,
};

/// Resolves the sending Telegram user into a stored user record, creating
/// it on first contact. Returns `None` for messages without a sender
/// (channel posts and the like).
pub fn ensure_user(deps: &HandlerDeps, from: Option<&teloxide::types::User>) -> anyhow::Result<Option<UserRecord>> {
    let Some(from) = from else {
        return Ok(None);
    };

    let conn = db::get_connection(&deps.db_pool)?;
    let user = db::get_or_create_user(
        &conn,
        from.id.0 as i64,
        &from.full_name(),
        from.username.as_deref(),
        config::is_admin_id(from.id.0 as i64),
    )?;
    Ok(Some(user))
}

/// Routes one recognized command
pub async fn handle_command(bot: &Bot, msg: &Message, cmd: Command, deps: HandlerDeps) -> Result<(), HandlerError> {
    let Some(user) = ensure_user(&deps, msg.from.as_ref())? else {
        return Ok(());
    };
    if user.is_blocked {
        return Ok(());
    }

    match cmd {
        Command::Start => handle_start(bot, msg, &user).await?,
        Command::Help => handle_help(bot, msg).await?,
        Command::Stats => handle_stats(bot, msg, &user, &deps).await?,
        Command::History => handle_history(bot, msg, &user, &deps).await?,
        Command::Admin => {
            if user.is_admin {
                admin::show_admin_panel(bot, msg.chat.id, &deps).await?;
            } else {
                bot.send_message(msg.chat.id, "❌ Эта команда только для администраторов").await?;
            }
        }
    }

    Ok(())
}

async fn handle_start(bot: &Bot, msg: &Message, user: &UserRecord) -> Result<(), HandlerError> {
    let welcome_text = format!(
        "🎬 Привет, {}! 👋\n\n\
         Я помогу скачать видео быстро и удобно.\n\n\
         <b>🌐 Откуда можно скачивать:</b>\n\
         ⚡ YouTube\n⚡ TikTok\n⚡ RuTube\n⚡ VK\n\n\
         <b>🚀 Как пользоваться:</b>\n\
         1. Отправьте мне ссылку на видео\n\
         2. Выберите качество и формат\n\
         3. Получите готовый файл\n\n\
         <b>📋 Команды:</b>\n\
         /help — помощь\n\
         /stats — ваша статистика\n\
         /history — история загрузок",
        escape_html(&user.full_name)
    );

    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("📋 Помощь", "help"),
        InlineKeyboardButton::callback("📊 Статистика", "stats"),
    ]]);

    bot.send_message(msg.chat.id, welcome_text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;

    log::info!("User {} started the bot", user.telegram_id);
    Ok(())
}

async fn handle_help(bot: &Bot, msg: &Message) -> Result<(), HandlerError> {
    let help_text = "📖 <b>Как скачать видео</b>\n\n\
         🎯 Отправьте ссылку на видео с YouTube, TikTok, RuTube или VK\n\
         🎯 Выберите качество (или MP3 для аудио)\n\n\
         <b>📱 Форматы:</b>\n\
         🎥 MP4 (видео)\n\
         🎵 MP3 (только аудио)\n\n\
         <b>🆘 Возникли проблемы?</b>\n\
         🔍 Убедитесь, что ссылка корректная\n\
         🔍 Проверьте, что видео доступно\n\
         🔍 Попробуйте другое качество";

    bot.send_message(msg.chat.id, help_text).parse_mode(ParseMode::Html).await?;
    Ok(())
}

async fn handle_stats(bot: &Bot, msg: &Message, user: &UserRecord, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let conn = db::get_connection(&deps.db_pool)?;
    let user_stats = match stats::get_user_stats(&conn, user) {
        Ok(user_stats) => user_stats,
        Err(e) => {
            log::error!("Failed to get user stats: {}", e);
            bot.send_message(msg.chat.id, "❌ Не удалось получить статистику").await?;
            return Ok(());
        }
    };

    let mut text = format!(
        "📊 <b>Ваша статистика</b>\n\n\
         👤 {}\n🆔 <code>{}</code>\n\n\
         📥 Всего скачиваний: {}\n\
         💾 Общий размер: {}\n\
         📅 Сегодня: {}\n\
         📈 За неделю: {}",
        escape_html(&user.full_name),
        user.telegram_id,
        user_stats.total_downloads,
        format_file_size(user_stats.total_download_size),
        user_stats.today,
        user_stats.week,
    );

    if let Some(last) = &user_stats.last_download_at {
        text.push_str(&format!("\n⏰ Последнее скачивание: {}", format_date(last)));
    }
    if user.is_admin {
        text.push_str("\n\n👑 <b>Администратор</b>");
    }

    bot.send_message(msg.chat.id, text).parse_mode(ParseMode::Html).await?;
    Ok(())
}

async fn handle_history(bot: &Bot, msg: &Message, user: &UserRecord, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let conn = db::get_connection(&deps.db_pool)?;
    let entries = match db::get_user_history(&conn, user.telegram_id, 10) {
        Ok(entries) => entries,
        Err(e) => {
            log::error!("Failed to get download history: {}", e);
            bot.send_message(msg.chat.id, "❌ Не удалось получить историю").await?;
            return Ok(());
        }
    };

    if entries.is_empty() {
        bot.send_message(msg.chat.id, "📭 У вас пока нет истории скачиваний").await?;
        return Ok(());
    }

    let mut text = "📋 <b>История скачиваний</b>\n\n".to_string();
    for entry in &entries {
        let status_emoji = match entry.status {
            DownloadStatus::Completed => "✅",
            DownloadStatus::Failed => "❌",
            DownloadStatus::Downloading => "⏳",
            DownloadStatus::Pending => "🕐",
            DownloadStatus::Cancelled => "🚫",
        };

        text.push_str(&format!(
            "{} <b>{}</b>\n    📅 {} | {} | {}\n\n",
            status_emoji,
            escape_html(&crate::core::utils::truncate_string_safe(&entry.title, 50)),
            format_date(&entry.created_at),
            entry.quality.as_deref().unwrap_or("авто"),
            entry.format_type,
        ));
    }

    bot.send_message(msg.chat.id, text).parse_mode(ParseMode::Html).await?;
    Ok(())
}

/// Handles a plain message: anything that resolves to a supported video URL
/// enters the download flow.
pub async fn handle_message(bot: &Bot, msg: &Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = ensure_user(&deps, msg.from.as_ref())? else {
        return Ok(());
    };
    if user.is_blocked {
        return Ok(());
    }

    // Subscription gate holds everything except admins
    if let GateDecision::Blocked(gate_config) = deps.gate.check(bot, &user).await? {
        send_subscription_prompt(bot, msg.chat.id, &gate_config).await?;
        return Ok(());
    }

    let url = text.trim();
    if !resolver::is_valid_url(url) {
        bot.send_message(
            msg.chat.id,
            "🤔 Я не узнаю эту ссылку. Отправьте ссылку на видео с YouTube, TikTok, RuTube или VK.",
        )
        .await?;
        return Ok(());
    }

    let video = match deps.catalog.get_or_create(url).await? {
        Some(video) => video,
        None => {
            bot.send_message(
                msg.chat.id,
                "😢 Не удалось получить информацию о видео. Проверьте, что оно доступно и не слишком длинное.",
            )
            .await?;
            return Ok(());
        }
    };

    send_quality_keyboard(bot, msg.chat.id, &video).await?;
    Ok(())
}

/// Presents the quality/format choice for a catalogued video
async fn send_quality_keyboard(bot: &Bot, chat_id: ChatId, video: &VideoRecord) -> Result<(), HandlerError> {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();

    for (name, descriptor) in available_qualities(video).into_iter().take(6) {
        let label = match descriptor.filesize {
            Some(size) => format!("🎥 {} (~{})", name, format_file_size(size)),
            None => format!("🎥 {}", name),
        };
        rows.push(vec![InlineKeyboardButton::callback(
            label,
            format!("dl:{}:{}:mp4", video.id, name),
        )]);
    }

    if rows.is_empty() {
        rows.push(vec![InlineKeyboardButton::callback(
            "🎥 Видео (авто)".to_string(),
            format!("dl:{}:auto:mp4", video.id),
        )]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "🎵 MP3 (аудио)".to_string(),
        format!("dl:{}:auto:mp3", video.id),
    )]);

    let mut text = format!("🎬 <b>{}</b>\n", escape_html(&video.title));
    if let Some(channel) = &video.channel_name {
        text.push_str(&format!("📺 {}\n", escape_html(channel)));
    }
    if video.duration > 0 {
        text.push_str(&format!("⏱ {}:{:02}\n", video.duration / 60, video.duration % 60));
    }
    text.push_str("\nВыберите качество:");

    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;
    Ok(())
}

async fn send_subscription_prompt(
    bot: &Bot,
    chat_id: ChatId,
    config: &crate::telegram::SubscriptionConfig,
) -> Result<(), HandlerError> {
    let text = format!(
        "🔔 <b>Обязательная подписка!</b>\n\n\
         Для использования бота подпишитесь на канал: {}\n\n\
         1. Нажмите «Подписаться на канал»\n\
         2. Подпишитесь\n\
         3. Вернитесь и нажмите «Я подписался»",
        escape_html(&config.channel_name)
    );

    let url = config
        .channel_url
        .parse()
        .unwrap_or_else(|_| "https://t.me".parse().expect("static url must parse"));
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::url("📢 Подписаться на канал", url)],
        vec![InlineKeyboardButton::callback("✅ Я подписался", "check_subscription")],
    ]);

    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

/// Routes inline keyboard callbacks
pub async fn handle_callback(bot: &Bot, q: CallbackQuery, deps: HandlerDeps) -> Result<(), HandlerError> {
    let callback_id = q.id.clone();
    let Some(data) = q.data.clone() else {
        bot.answer_callback_query(callback_id).await?;
        return Ok(());
    };

    let chat_id = q.message.as_ref().map(|m| m.chat().id);
    let message_id = q.message.as_ref().map(|m| m.id());
    let Some(user) = ensure_user(&deps, Some(&q.from))? else {
        bot.answer_callback_query(callback_id).await?;
        return Ok(());
    };

    match data.as_str() {
        "help" => {
            bot.answer_callback_query(callback_id).await?;
            if let Some(chat_id) = chat_id {
                bot.send_message(chat_id, "📖 Используйте команду /help").await?;
            }
        }
        "stats" => {
            bot.answer_callback_query(callback_id).await?;
            if let Some(chat_id) = chat_id {
                bot.send_message(chat_id, "📊 Используйте команду /stats").await?;
            }
        }
        "check_subscription" => {
            if deps.gate.confirm(bot, &user).await {
                bot.answer_callback_query(callback_id)
                    .text("✅ Спасибо за подписку!")
                    .show_alert(true)
                    .await?;
                if let (Some(chat_id), Some(message_id)) = (chat_id, message_id) {
                    if let Err(e) = bot.delete_message(chat_id, message_id).await {
                        log::warn!("Failed to delete subscription prompt: {}", e);
                    }
                }
            } else {
                bot.answer_callback_query(callback_id)
                    .text("❌ Вы все еще не подписаны на канал. Подпишитесь и попробуйте снова.")
                    .show_alert(true)
                    .await?;
            }
        }
        data if data.starts_with("admin:") => {
            admin::handle_admin_callback(bot, callback_id, chat_id, message_id, data, &user, &deps).await?;
        }
        data if data.starts_with("dl:") => {
            bot.answer_callback_query(callback_id).await?;
            if let Some(chat_id) = chat_id {
                handle_download_callback(bot, chat_id, data, &user, &deps).await?;
            }
        }
        _ => {
            bot.answer_callback_query(callback_id).text("Неизвестное действие").await?;
        }
    }

    Ok(())
}

/// Runs one requested download and delivers the result.
/// Callback format: `dl:<video row id>:<quality|auto>:<mp4|mp3>`
async fn handle_download_callback(
    bot: &Bot,
    chat_id: ChatId,
    data: &str,
    user: &UserRecord,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let parts: Vec<&str> = data.split(':').collect();
    if parts.len() != 4 {
        log::warn!("Malformed download callback: {}", data);
        return Ok(());
    }

    let Ok(video_id) = parts[1].parse::<i64>() else {
        log::warn!("Malformed video id in callback: {}", data);
        return Ok(());
    };
    let quality = (parts[2] != "auto").then(|| parts[2].to_string());
    let Ok(format_type) = parts[3].parse::<FormatType>() else {
        log::warn!("Malformed format in callback: {}", data);
        return Ok(());
    };

    let conn = db::get_connection(&deps.db_pool)?;
    let Some(video) = db::get_video(&conn, video_id)? else {
        bot.send_message(chat_id, "❌ Видео не найдено, отправьте ссылку еще раз").await?;
        return Ok(());
    };
    drop(conn);

    let status_msg = bot
        .send_message(chat_id, "⏳ Скачиваю, подождите немного...")
        .await?;

    let requested_size = estimated_size(&video, quality.as_deref(), format_type);
    let record = deps
        .orchestrator
        .download(&video, user, quality.as_deref(), format_type, requested_size)
        .await?;

    if record.status != DownloadStatus::Completed {
        bot.edit_message_text(
            chat_id,
            status_msg.id,
            "😢 Не получилось скачать видео. Попробуйте другое качество или другую ссылку.",
        )
        .await?;
        return Ok(());
    }

    if let Err(e) = send_download_file(bot, chat_id, &video, &record, format_type, deps).await {
        log::error!("Failed to send downloaded file: {}", e);
        bot.edit_message_text(chat_id, status_msg.id, "😢 Не получилось отправить файл. Попробуйте позже.")
            .await?;
        return Ok(());
    }

    if let Err(e) = bot.delete_message(chat_id, status_msg.id).await {
        log::warn!("Failed to delete status message: {}", e);
    }
    Ok(())
}

/// Estimated byte size of the requested stream, for the fail-fast check.
/// Falls back to 0 (no upfront rejection) when the catalog has no estimate.
fn estimated_size(video: &VideoRecord, quality: Option<&str>, format_type: FormatType) -> u64 {
    if format_type.is_audio() {
        return 0;
    }

    let height: Option<i64> = quality.and_then(|q| q.trim_end_matches('p').parse().ok());
    video
        .available_formats
        .iter()
        .filter(|fmt| match height {
            Some(h) => fmt.height == Some(h),
            None => true,
        })
        .filter_map(|fmt| fmt.filesize)
        .next()
        .map(|size| size as u64)
        .unwrap_or(0)
}

/// Delivers a completed download, preferring the cached remote file id over
/// re-uploading from disk. The file id from a first upload is stored back
/// onto the record so later dedup hits skip the upload entirely.
async fn send_download_file(
    bot: &Bot,
    chat_id: ChatId,
    video: &VideoRecord,
    record: &db::DownloadRecord,
    format_type: FormatType,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let caption = crate::core::utils::truncate_string_safe(&video.title, 900);

    let input = if let Some(file_id) = &record.telegram_file_id {
        InputFile::file_id(FileId(file_id.clone()))
    } else if let Some(path) = &record.file_path {
        InputFile::file(PathBuf::from(path))
    } else {
        anyhow::bail!("completed download {} has no durable pointer", record.id);
    };

    let sent = match format_type {
        FormatType::Mp3 => bot.send_audio(chat_id, input).caption(caption).await?,
        FormatType::Mp4 => bot.send_video(chat_id, input).caption(caption).await?,
    };

    // Remember the remote reference after the first real upload
    if record.telegram_file_id.is_none() {
        let new_file_id = match format_type {
            FormatType::Mp3 => sent.audio().map(|audio| audio.file.id.clone()),
            FormatType::Mp4 => sent.video().map(|video| video.file.id.clone()),
        }
        .or_else(|| sent.document().map(|doc| doc.file.id.clone()));

        if let Some(file_id) = new_file_id {
            let conn = db::get_connection(&deps.db_pool)?;
            db::set_telegram_file_id(&conn, record.id, &file_id.0)?;
        }
    }

    Ok(())
}

/// Formats a stored SQLite timestamp (YYYY-MM-DD HH:MM:SS) for display
fn format_date(raw: &str) -> String {
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        Ok(dt) => dt.format("%d.%m.%Y %H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::FormatDescriptor;

    fn video_with_formats(formats: Vec<FormatDescriptor>) -> VideoRecord {
        VideoRecord {
            id: 1,
            video_id: "x".to_string(),
            url: String::new(),
            title: String::new(),
            description: None,
            duration: 0,
            view_count: None,
            like_count: None,
            channel_name: None,
            channel_id: None,
            upload_date: None,
            thumbnail_url: None,
            available_formats: formats,
            file_size: None,
            quality: None,
            format_id: None,
            download_count: 0,
        }
    }

    fn fmt(height: i64, filesize: Option<i64>) -> FormatDescriptor {
        FormatDescriptor {
            format_id: None,
            ext: None,
            height: Some(height),
            width: None,
            fps: None,
            vcodec: Some("avc1".to_string()),
            acodec: None,
            filesize,
        }
    }

    #[test]
    fn test_estimated_size_matches_height() {
        let video = video_with_formats(vec![fmt(360, Some(1000)), fmt(720, Some(5000))]);
        assert_eq!(estimated_size(&video, Some("720p"), FormatType::Mp4), 5000);
        assert_eq!(estimated_size(&video, Some("360p"), FormatType::Mp4), 1000);
    }

    #[test]
    fn test_estimated_size_fallbacks() {
        let video = video_with_formats(vec![fmt(720, Some(5000))]);
        // Audio requests are never rejected upfront
        assert_eq!(estimated_size(&video, Some("720p"), FormatType::Mp3), 0);
        // Unknown height: first available estimate
        assert_eq!(estimated_size(&video, None, FormatType::Mp4), 5000);
        // No matching format: no estimate
        assert_eq!(estimated_size(&video, Some("1080p"), FormatType::Mp4), 0);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-03-01 15:04:05"), "01.03.2024 15:04");
        assert_eq!(format_date("garbage"), "garbage");
    }
}
