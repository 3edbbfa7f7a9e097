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

//! Operator alerting.

use std::{
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

/// Delivers a short text alert to operators.
#[async_trait]
pub trait Alerter: Debug + Send + Sync {
    /// Sends `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be delivered.
    async fn send(&self, message: &str) -> anyhow::Result<()>;
}

/// An [`Alerter`] which only logs, used when no alert transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn send(&self, message: &str) -> anyhow::Result<()> {
        tracing::info!(target: "nftsync::alert", "{message}");
        Ok(())
    }
}

/// An [`Alerter`] which keeps every message it is sent.
#[derive(Debug, Clone, Default)]
pub struct RecordingAlerter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingAlerter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Alerter for RecordingAlerter {
    async fn send(&self, message: &str) -> anyhow::Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
        Ok(())
    }
}
