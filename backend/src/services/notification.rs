//! Best-effort Telegram notifications for stock events
//!
//! Notifications are fire-and-forget: they run after the owning transaction
//! has committed, and every failure is logged and swallowed. A stock change
//! never succeeds or fails because of a message.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::TelegramConfig;

/// Notification service; inert when Telegram is not configured
#[derive(Clone)]
pub struct NotificationService {
    telegram: Option<TelegramClient>,
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    bot_token: String,
    chat_id: String,
    http_client: reqwest::Client,
}

/// Telegram sendMessage request
#[derive(Debug, Serialize)]
struct SendMessageRequest {
    chat_id: String,
    text: String,
    parse_mode: &'static str,
}

/// Telegram API response envelope
#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramClient {
    /// Create a new Telegram client with a short send timeout, so a slow
    /// Telegram API cannot hold up the caller
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Send an HTML-formatted message to the configured chat
    pub async fn send_message(&self, text: &str) -> Result<(), String> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token
        );
        let request = SendMessageRequest {
            chat_id: self.chat_id.clone(),
            text: text.to_string(),
            parse_mode: "HTML",
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Failed to reach Telegram: {}", e))?;

        if !response.status().is_success() {
            let error: TelegramApiResponse = response.json().await.unwrap_or(TelegramApiResponse {
                ok: false,
                description: Some("Unknown error".to_string()),
            });
            if !error.ok {
                return Err(error
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()));
            }
        }

        Ok(())
    }
}

impl NotificationService {
    /// Create a NotificationService from configuration; an incomplete
    /// Telegram config yields a no-op service
    pub fn new(config: &TelegramConfig) -> Self {
        let telegram = if config.is_configured() {
            Some(TelegramClient::new(
                config.bot_token.clone(),
                config.chat_id.clone(),
            ))
        } else {
            tracing::info!("Telegram not configured, notifications disabled");
            None
        };
        Self { telegram }
    }

    /// Whether messages will actually be sent
    pub fn is_enabled(&self) -> bool {
        self.telegram.is_some()
    }

    /// Announce a confirmed write-off
    pub async fn notify_writeoff_confirmed(
        &self,
        number: &str,
        department_name: &str,
        reason: &str,
        item_count: usize,
        total_cost: Decimal,
    ) {
        let text = format!(
            "🗑 <b>Write-off confirmed</b>\n\
             Document: {}\n\
             Department: {}\n\
             Reason: {}\n\
             Items: {}\n\
             Total cost: {:.2}",
            number, department_name, reason, item_count, total_cost
        );
        self.send(&text).await;
    }

    /// Warn that a product dropped below its minimum stock level
    pub async fn notify_low_stock(
        &self,
        product_name: &str,
        department_name: &str,
        quantity: Decimal,
        min_level: Decimal,
    ) {
        let text = format!(
            "⚠️ <b>Low stock</b>\n\
             Product: {}\n\
             Department: {}\n\
             Remaining: {} (minimum {})",
            product_name, department_name, quantity, min_level
        );
        self.send(&text).await;
    }

    async fn send(&self, text: &str) {
        let Some(client) = &self.telegram else {
            tracing::debug!("Notification skipped, Telegram disabled");
            return;
        };
        if let Err(err) = client.send_message(text).await {
            tracing::warn!(error = err, "Telegram notification failed");
        }
    }
}
