//! Admin broadcast: re-sending one message to every known user.
//!
//! The payload is classified once into a closed set of variants instead of
//! branching over raw message fields at every send. Unknown kinds degrade
//! to a plain-text fallback carrying whatever caption the message had.

use crate::core::{config, AppResult};
use crate::storage::db::{self, DbPool};
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, InputPollOption, Message};

/// A broadcastable message, reduced to its media kind
#[derive(Debug, Clone)]
pub enum BroadcastPayload {
    Text {
        text: String,
    },
    Photo {
        file_id: FileId,
        caption: String,
    },
    Video {
        file_id: FileId,
        caption: String,
    },
    Document {
        file_id: FileId,
        caption: String,
    },
    Audio {
        file_id: FileId,
        caption: String,
    },
    Voice {
        file_id: FileId,
        caption: String,
    },
    Animation {
        file_id: FileId,
        caption: String,
    },
    /// Stickers carry no caption; any text is sent as a separate message
    Sticker {
        file_id: FileId,
        text: String,
    },
    /// Video notes carry no caption either
    VideoNote {
        file_id: FileId,
        text: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Contact {
        phone_number: String,
        first_name: String,
        last_name: String,
    },
    Poll {
        question: String,
        options: Vec<String>,
        is_anonymous: bool,
    },
    /// Anything unrecognized: deliver the text we could extract
    Fallback {
        text: String,
    },
}

impl BroadcastPayload {
    /// Classifies a message into its broadcast variant
    pub fn from_message(msg: &Message) -> Self {
        let caption = msg.caption().unwrap_or_default().to_string();

        if let Some(photos) = msg.photo() {
            if let Some(photo) = photos.last() {
                return Self::Photo {
                    file_id: photo.file.id.clone(),
                    caption,
                };
            }
        }
        if let Some(video) = msg.video() {
            return Self::Video {
                file_id: video.file.id.clone(),
                caption,
            };
        }
        if let Some(document) = msg.document() {
            return Self::Document {
                file_id: document.file.id.clone(),
                caption,
            };
        }
        if let Some(audio) = msg.audio() {
            return Self::Audio {
                file_id: audio.file.id.clone(),
                caption,
            };
        }
        if let Some(voice) = msg.voice() {
            return Self::Voice {
                file_id: voice.file.id.clone(),
                caption,
            };
        }
        if let Some(animation) = msg.animation() {
            return Self::Animation {
                file_id: animation.file.id.clone(),
                caption,
            };
        }
        if let Some(sticker) = msg.sticker() {
            return Self::Sticker {
                file_id: sticker.file.id.clone(),
                text: caption,
            };
        }
        if let Some(video_note) = msg.video_note() {
            return Self::VideoNote {
                file_id: video_note.file.id.clone(),
                text: caption,
            };
        }
        if let Some(location) = msg.location() {
            return Self::Location {
                latitude: location.latitude,
                longitude: location.longitude,
            };
        }
        if let Some(contact) = msg.contact() {
            return Self::Contact {
                phone_number: contact.phone_number.clone(),
                first_name: contact.first_name.clone(),
                last_name: contact.last_name.clone().unwrap_or_default(),
            };
        }
        if let Some(poll) = msg.poll() {
            return Self::Poll {
                question: poll.question.clone(),
                options: poll.options.iter().map(|option| option.text.clone()).collect(),
                is_anonymous: poll.is_anonymous,
            };
        }
        if let Some(text) = msg.text() {
            return Self::Text {
                text: text.to_string(),
            };
        }

        Self::Fallback { text: caption }
    }

    /// Delivers this payload to one chat
    pub async fn send_to(&self, bot: &Bot, chat_id: ChatId) -> Result<(), teloxide::RequestError> {
        match self {
            Self::Text { text } => {
                bot.send_message(chat_id, text).await?;
            }
            Self::Photo { file_id, caption } => {
                let request = bot.send_photo(chat_id, InputFile::file_id(file_id.clone()));
                if caption.is_empty() {
                    request.await?;
                } else {
                    request.caption(caption).await?;
                }
            }
            Self::Video { file_id, caption } => {
                let request = bot.send_video(chat_id, InputFile::file_id(file_id.clone()));
                if caption.is_empty() {
                    request.await?;
                } else {
                    request.caption(caption).await?;
                }
            }
            Self::Document { file_id, caption } => {
                let request = bot.send_document(chat_id, InputFile::file_id(file_id.clone()));
                if caption.is_empty() {
                    request.await?;
                } else {
                    request.caption(caption).await?;
                }
            }
            Self::Audio { file_id, caption } => {
                let request = bot.send_audio(chat_id, InputFile::file_id(file_id.clone()));
                if caption.is_empty() {
                    request.await?;
                } else {
                    request.caption(caption).await?;
                }
            }
            Self::Voice { file_id, caption } => {
                let request = bot.send_voice(chat_id, InputFile::file_id(file_id.clone()));
                if caption.is_empty() {
                    request.await?;
                } else {
                    request.caption(caption).await?;
                }
            }
            Self::Animation { file_id, caption } => {
                let request = bot.send_animation(chat_id, InputFile::file_id(file_id.clone()));
                if caption.is_empty() {
                    request.await?;
                } else {
                    request.caption(caption).await?;
                }
            }
            Self::Sticker { file_id, text } => {
                if !text.is_empty() {
                    bot.send_message(chat_id, text).await?;
                }
                bot.send_sticker(chat_id, InputFile::file_id(file_id.clone())).await?;
            }
            Self::VideoNote { file_id, text } => {
                if !text.is_empty() {
                    bot.send_message(chat_id, text).await?;
                }
                bot.send_video_note(chat_id, InputFile::file_id(file_id.clone())).await?;
            }
            Self::Location { latitude, longitude } => {
                bot.send_location(chat_id, *latitude, *longitude).await?;
            }
            Self::Contact {
                phone_number,
                first_name,
                last_name,
            } => {
                bot.send_contact(chat_id, phone_number.clone(), first_name.clone())
                    .last_name(last_name.clone())
                    .await?;
            }
            Self::Poll {
                question,
                options,
                is_anonymous,
            } => {
                bot.send_poll(
                    chat_id,
                    question.clone(),
                    options.iter().cloned().map(InputPollOption::new),
                )
                .is_anonymous(*is_anonymous)
                .await?;
            }
            Self::Fallback { text } => {
                if !text.is_empty() {
                    bot.send_message(chat_id, text).await?;
                }
            }
        }

        Ok(())
    }
}

/// Result counters of one broadcast run
#[derive(Debug, Clone, Default)]
pub struct BroadcastOutcome {
    pub total: usize,
    pub sent: usize,
    pub skipped_blocked: usize,
    pub failed: usize,
}

/// Sends a payload to every known non-blocked user, with a fixed delay
/// between sends for outbound rate shaping. Per-user failures are logged
/// and counted, never fatal.
pub async fn broadcast_to_all(bot: &Bot, pool: &DbPool, payload: &BroadcastPayload) -> AppResult<BroadcastOutcome> {
    let conn = db::get_connection(pool)?;
    let users = db::get_all_users(&conn, 500_000)?;
    drop(conn);

    let mut outcome = BroadcastOutcome {
        total: users.len(),
        ..Default::default()
    };

    for user in &users {
        if user.is_blocked {
            outcome.skipped_blocked += 1;
            continue;
        }

        match payload.send_to(bot, ChatId(user.telegram_id)).await {
            Ok(()) => outcome.sent += 1,
            Err(e) => {
                log::error!("Broadcast to user {} failed: {}", user.telegram_id, e);
                outcome.failed += 1;
            }
        }

        tokio::time::sleep(config::broadcast::inter_send_delay()).await;
    }

    log::info!(
        "Broadcast finished: {} sent, {} failed, {} blocked of {}",
        outcome.sent,
        outcome.failed,
        outcome.skipped_blocked,
        outcome.total
    );
    Ok(outcome)
}
