// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Operator alerts delivered to a DingTalk group robot.

use std::time::Duration;

use async_trait::async_trait;
use nftsync_common::{alert::Alerter, config::AlertingConfig};
use nftsync_core::datetime::unix_millis_now;
use nftsync_cryptography::signing::hmac_signature_base64;
use nftsync_network::http::{HttpClient, HttpClientConfig};

/// The longest message body the robot accepts, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 1000;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Truncates `message` to at most `max_bytes`, on a character boundary.
#[must_use]
pub fn truncate_message(message: &str, max_bytes: usize) -> &str {
    if message.len() <= max_bytes {
        return message;
    }
    let mut end = max_bytes;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

/// Sends alerts as text messages to a DingTalk robot webhook.
///
/// When a secret is configured each request is signed with an HMAC-SHA256 of
/// `"{timestamp}\n{secret}"`, passed alongside the millisecond timestamp as query parameters.
#[derive(Debug)]
pub struct DingTalkAlerter {
    client: HttpClient,
    webhook: String,
    secret: Option<String>,
}

impl DingTalkAlerter {
    /// Creates a new [`DingTalkAlerter`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(webhook: impl Into<String>, secret: Option<String>) -> anyhow::Result<Self> {
        let client = HttpClient::new(HttpClientConfig {
            timeout: Some(SEND_TIMEOUT),
            ..Default::default()
        })?;
        Ok(Self {
            client,
            webhook: webhook.into(),
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    /// Creates an alerter from config, or `None` when no webhook is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AlertingConfig) -> anyhow::Result<Option<Self>> {
        match config.webhook.as_deref() {
            Some(webhook) if !webhook.is_empty() => {
                Self::new(webhook, config.secret.clone()).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Returns the webhook URL for a request made at `timestamp_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature cannot be computed.
    pub fn signed_url(&self, timestamp_ms: u64) -> anyhow::Result<String> {
        let Some(secret) = &self.secret else {
            return Ok(self.webhook.clone());
        };
        let sign = hmac_signature_base64(secret, &format!("{timestamp_ms}\n{secret}"))?;
        let separator = if self.webhook.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{}{separator}timestamp={timestamp_ms}&sign={}",
            self.webhook,
            urlencoding::encode(&sign)
        ))
    }
}

#[async_trait]
impl Alerter for DingTalkAlerter {
    async fn send(&self, message: &str) -> anyhow::Result<()> {
        let url = self.signed_url(unix_millis_now())?;
        let body = serde_json::json!({
            "msgtype": "text",
            "text": { "content": truncate_message(message, MAX_MESSAGE_BYTES) },
        });
        let response = self
            .client
            .post_json(&url, serde_json::to_vec(&body)?, None)
            .await?;
        anyhow::ensure!(
            response.status.is_success(),
            "DingTalk webhook returned {}",
            response.status
        );
        Ok(())
    }
}
