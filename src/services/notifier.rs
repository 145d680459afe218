//! New-order notifications through the Telegram Bot API
//!
//! One `sendMessage` call per order with no queue or retry. Delivery
//! problems are logged and never reach the client who booked.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::models::OrderDetail;

/// Receives freshly created orders
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn order_created(&self, order: &OrderDetail);
}

/// Escape characters that legacy Telegram Markdown treats as markup
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Message body for a new order
pub fn format_order_message(order: &OrderDetail, base_url: &str) -> String {
    let comment = order
        .order
        .comment
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(escape_markdown)
        .unwrap_or_else(|| "—".to_string());
    let master = order
        .master_name
        .as_deref()
        .map(escape_markdown)
        .unwrap_or_else(|| "не выбран".to_string());
    let services = if order.services.is_empty() {
        "—".to_string()
    } else {
        order
            .services
            .iter()
            .map(|s| escape_markdown(&s.name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let appointment = order
        .order
        .appointment_date
        .map(|d| d.format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| "не указана".to_string());

    format!(
        "*Новый заказ!*\n\n\
         *Имя клиента:* {}\n\
         *Телефон:* {}\n\
         *Комментарий:* {}\n\
         *Мастер:* {}\n\
         *Услуги:* {}\n\
         *Дата записи:* {}\n\
         *Ссылка на заказ:* {}/barbershop/orders/{}/",
        escape_markdown(&order.order.client_name),
        escape_markdown(&order.order.phone),
        comment,
        master,
        services,
        appointment,
        base_url.trim_end_matches('/'),
        order.order.id,
    )
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Telegram bot notifier. Inactive without a bot token and chat id.
pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            client,
            config,
            base_url: base_url.into(),
        })
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.config.bot_token.as_deref().filter(|t| !t.is_empty())?;
        let chat_id = self.config.chat_id.as_deref().filter(|c| !c.is_empty())?;
        Some((token, chat_id))
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials().is_some()
    }

    async fn send(&self, token: &str, chat_id: &str, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_url.trim_end_matches('/'),
            token
        );

        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id,
                text,
                parse_mode: "Markdown",
            })
            .send()
            .await
            .context("Telegram request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Telegram API returned {}: {}", status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderNotifier for TelegramNotifier {
    async fn order_created(&self, order: &OrderDetail) {
        let Some((token, chat_id)) = self.credentials() else {
            tracing::debug!(order_id = order.order.id, "Telegram notifier disabled, skipping");
            return;
        };

        let text = format_order_message(order, &self.base_url);
        match self.send(token, chat_id, &text).await {
            Ok(()) => tracing::info!(order_id = order.order.id, "Order notification sent"),
            Err(e) => {
                tracing::warn!(order_id = order.order.id, error = %e, "Order notification failed")
            }
        }
    }
}
