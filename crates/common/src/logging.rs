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

//! Tracing setup and forwarding of error events to the operator alerter.

use std::{
    fmt::{Debug, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{
    EnvFilter, Layer, layer::Context, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::alert::Alerter;

/// Filter applied when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,sqlx=off";

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Returns whether [`init_tracing`] has completed.
pub fn logging_is_initialized() -> bool {
    LOGGING_INITIALIZED.load(Ordering::Relaxed)
}

/// Initialize tracing.
///
/// The filter is read from the `RUST_LOG` environment variable, falling back to
/// [`DEFAULT_LOG_FILTER`]. When `alerts` is given, every error event is also forwarded to it.
///
/// Should only be called once during an application's run, ideally at the beginning of the run.
///
/// # Errors
///
/// Returns an error if `RUST_LOG` is malformed or a global subscriber is already installed.
pub fn init_tracing(alerts: Option<AlertLayer>) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) => EnvFilter::try_new(&v)
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG '{v}': {e}"))?,
        Err(_) => EnvFilter::new(DEFAULT_LOG_FILTER),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(alerts)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))?;

    LOGGING_INITIALIZED.store(true, Ordering::Relaxed);
    Ok(())
}

/// A tracing layer which renders error events and queues them for alert delivery.
#[derive(Debug, Clone)]
pub struct AlertLayer {
    sender: mpsc::UnboundedSender<String>,
}

/// Creates an [`AlertLayer`] and the receiver its rendered events arrive on.
#[must_use]
pub fn alert_channel() -> (AlertLayer, mpsc::UnboundedReceiver<String>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (AlertLayer { sender }, receiver)
}

#[derive(Default)]
struct EventRenderer {
    message: String,
    fields: String,
}

impl Visit for EventRenderer {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() != Level::ERROR {
            return;
        }
        let mut renderer = EventRenderer::default();
        event.record(&mut renderer);
        // A closed receiver means alerting has shut down
        let _ = self.sender.send(format!(
            "[{}] {}{}",
            metadata.target(),
            renderer.message,
            renderer.fields
        ));
    }
}

/// Spawns a task delivering rendered error events to `alerter` until the channel closes.
pub fn spawn_alert_forwarder(
    mut receiver: mpsc::UnboundedReceiver<String>,
    alerter: Arc<dyn Alerter>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            if let Err(e) = alerter.send(&message).await {
                // Warn level so the failure is not forwarded again
                tracing::warn!("Failed to deliver alert: {e}");
            }
        }
    })
}
