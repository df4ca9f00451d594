//! Telegram integration: bot construction, dispatcher schema and handlers.

pub mod admin;
pub mod bot;
pub mod broadcast;
pub mod handlers;
pub mod subscriptions;

pub use bot::{create_bot, schema, Command, HandlerDeps, HandlerError};
pub use subscriptions::{GateDecision, SubscriptionConfig, SubscriptionGate};

/// Escapes the characters HTML parse mode treats specially
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
