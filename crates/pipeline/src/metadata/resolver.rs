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

//! Resolution of token metadata documents.

use std::{sync::Arc, time::Duration};

use nftsync_common::{broker::Delivery, lock::with_lock};
use nftsync_core::datetime::unix_millis_now;
use nftsync_model::{
    MetadataUpdate, Nft,
    contract::ContractAttributes,
    messages::{METADATA_SYNC_EXCHANGE, MetadataSyncRequest},
};
use nftsync_network::{
    http::{HttpClient, HttpClientConfig, HttpClientError},
    ratelimiter::{
        DEFAULT_ACQUIRE_DEADLINE, DEFAULT_CALL_COST, DEFAULT_POLL_INTERVAL, RateLimitError,
        acquire_within,
    },
};
use serde_json::Value;
use thiserror::Error;

use super::{
    document::{
        empty_document, extract_name, image_key, inline_image, is_empty_document,
        parse_document, scrub_inline_data,
    },
    uri::{DATA_URI_PLACEHOLDER, UriNormalizer, decode_data_uri, is_data_uri, is_fetchable_url},
};
use crate::{
    context::PipelineContext,
    contracts::nft::fetch_token_uri,
    fanout::NotificationFanout,
    rpc::error::BlockchainRpcClientError,
    scheduler::{RetryScheduler, ScheduleOutcome},
};

/// Errors raised while resolving a token's metadata, classified by how the pipeline reacts.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The contract reverted the URI lookup; the token no longer exists.
    #[error("Token does not exist: {0}")]
    Nonexistent(String),
    /// A timeout, network failure or server error worth retrying.
    #[error("Transient failure: {0}")]
    Transient(String),
    /// The document server failed; retried, and quarantined once it persists to the last attempt.
    #[error("Document server failed with status {status}")]
    DocumentServer { status: u16 },
    /// The document server refused in a way that will not improve; the contract is quarantined.
    #[error("Document server refused with status {status}")]
    Quarantine { status: u16 },
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<BlockchainRpcClientError> for ResolveError {
    fn from(e: BlockchainRpcClientError) -> Self {
        if e.is_revert() {
            Self::Nonexistent(e.to_string())
        } else if e.is_transient() {
            Self::Transient(e.to_string())
        } else {
            Self::Other(anyhow::anyhow!(e))
        }
    }
}

impl From<HttpClientError> for ResolveError {
    fn from(e: HttpClientError) -> Self {
        if e.is_transient() {
            Self::Transient(e.to_string())
        } else {
            Self::Other(anyhow::anyhow!(e))
        }
    }
}

/// Why a request was skipped without resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The contract is flagged `no_metadata`.
    Quarantined,
    /// The token has not been reconciled yet.
    UnknownToken,
}

/// The result of processing one metadata request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// Another worker holds the token's lock.
    Contended,
    Skipped(SkipReason),
    /// Nothing to store: the token has no URI or its document is empty.
    NoMetadata,
    Updated(MetadataUpdate),
    /// The document server refused and the contract is now quarantined.
    Quarantined { status: u16 },
    Retrying { attempt: u32, delay: Duration },
    /// The provider's rate limit was exhausted; requeued without spending an attempt.
    Deferred { delay: Duration },
    Dropped { attempts: u32 },
}

enum Resolution {
    Destroyed,
    Unavailable,
    Document { token_uri: String, document: Value },
}

/// Resolves token URIs and metadata documents and stores the result.
#[derive(Debug)]
pub struct MetadataResolver {
    ctx: Arc<PipelineContext>,
    normalizer: UriNormalizer,
    http: HttpClient,
    scheduler: RetryScheduler,
    fanout: NotificationFanout,
    rpc_timeout: Duration,
    fetch_timeout: Duration,
    lock_ttl: Duration,
}

impl MetadataResolver {
    /// Creates a new [`MetadataResolver`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the document HTTP client cannot be built, usually an invalid proxy.
    pub fn new(ctx: Arc<PipelineContext>) -> anyhow::Result<Self> {
        let config = &ctx.config.metadata;
        let http = HttpClient::new(HttpClientConfig {
            header_keys: vec!["content-type".to_string()],
            user_agent: Some(config.user_agent.clone()),
            proxy_url: config.proxy.as_ref().map(|p| p.url()),
            ..Default::default()
        })?;
        Ok(Self {
            normalizer: UriNormalizer::from_config(config),
            http,
            scheduler: ctx.scheduler(),
            fanout: ctx.fanout(),
            rpc_timeout: Duration::from_millis(config.rpc_timeout_ms),
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
            lock_ttl: Duration::from_millis(config.lock_ttl_ms),
            ctx,
        })
    }

    /// Decodes, processes and acknowledges one delivery of the metadata queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the delivery cannot be acknowledged.
    pub async fn handle_delivery(
        &self,
        delivery: Delivery,
    ) -> anyhow::Result<Option<ResolveOutcome>> {
        let outcome = match delivery.decode::<MetadataSyncRequest>() {
            Ok(request) => match self.process(request).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!("Metadata request failed: {e}");
                    None
                }
            },
            Err(e) => {
                tracing::error!("Dropping metadata request: {e}");
                None
            }
        };
        self.ctx.backends.broker.ack(&delivery).await?;
        Ok(outcome)
    }

    /// Resolves the requested token under its lock and stores the outcome.
    ///
    /// Resolution failures are recorded on the token and requeued or quarantined; only
    /// failures of the stores themselves are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock, cache or repository fails.
    pub async fn process(&self, request: MetadataSyncRequest) -> anyhow::Result<ResolveOutcome> {
        let key = self
            .ctx
            .keys
            .metadata_lock(request.chain_id, &request.token_hash());
        let outcome = with_lock(self.ctx.backends.locks.as_ref(), &key, self.lock_ttl, || {
            self.process_locked(request)
        })
        .await?;
        Ok(outcome.unwrap_or(ResolveOutcome::Contended))
    }

    async fn process_locked(
        &self,
        request: MetadataSyncRequest,
    ) -> anyhow::Result<ResolveOutcome> {
        let backends = &self.ctx.backends;
        let token_hash = request.token_hash();
        let Some(nft) = backends
            .repository
            .get_nft(request.chain_id, &token_hash)
            .await?
        else {
            return Ok(ResolveOutcome::Skipped(SkipReason::UnknownToken));
        };

        let attributes = backends
            .cache
            .contract_attributes(nft.chain_id, &nft.token_address)
            .await?;
        if attributes.no_metadata {
            return Ok(ResolveOutcome::Skipped(SkipReason::Quarantined));
        }

        let now = unix_millis_now();
        let update = match self.resolve(&nft, &attributes).await {
            Ok(Resolution::Destroyed) | Err(ResolveError::Nonexistent(_)) => MetadataUpdate {
                is_destroyed: true,
                sync_metadata_times: request.times,
                last_sync_metadata_time: now,
                ..Default::default()
            },
            Ok(Resolution::Unavailable) => return Ok(ResolveOutcome::NoMetadata),
            Ok(Resolution::Document { token_uri, document }) => {
                if is_empty_document(&document) {
                    return Ok(ResolveOutcome::NoMetadata);
                }
                MetadataUpdate {
                    token_uri: Some(if is_data_uri(&token_uri) {
                        DATA_URI_PLACEHOLDER.to_string()
                    } else {
                        token_uri
                    }),
                    name: extract_name(&document),
                    metadata: Some(document),
                    is_destroyed: false,
                    sync_metadata_error: None,
                    sync_metadata_times: request.times,
                    last_sync_metadata_time: now,
                }
            }
            Err(e) => return self.handle_failure(&nft, request, e).await,
        };

        backends
            .repository
            .update_nft_metadata(nft.chain_id, &nft.token_hash, &update)
            .await?;
        self.notify(&nft).await;
        Ok(ResolveOutcome::Updated(update))
    }

    async fn resolve(
        &self,
        nft: &Nft,
        attributes: &ContractAttributes,
    ) -> Result<Resolution, ResolveError> {
        if nft.is_destroyed {
            return Ok(Resolution::Destroyed);
        }

        let Some(token_uri) = self.token_uri(nft, attributes).await? else {
            return Ok(Resolution::Unavailable);
        };
        let Some(document) = self.fetch_document(&token_uri).await? else {
            return Ok(Resolution::Unavailable);
        };
        let document = self.sanitize(nft, document).await?;
        Ok(Resolution::Document {
            token_uri,
            document,
        })
    }

    /// Returns the normalized token URI from the cache, the contract prefix or the contract.
    async fn token_uri(
        &self,
        nft: &Nft,
        attributes: &ContractAttributes,
    ) -> Result<Option<String>, ResolveError> {
        let cache = &self.ctx.backends.cache;
        if let Some(uri) = cache
            .token_uri(nft.chain_id, &nft.token_address, &nft.token_hash)
            .await?
        {
            return Ok(Some(uri));
        }

        let raw = match attributes
            .token_uri_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
        {
            Some(prefix) => format!("{prefix}{}", nft.token_id),
            None => self.contract_token_uri(nft).await?,
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let uri = self.normalizer.normalize(&raw, &nft.token_id);
        cache
            .set_token_uri(
                nft.chain_id,
                &nft.token_address,
                &nft.token_hash,
                &uri,
                self.ctx.config.metadata.uri_cache_ttl(),
            )
            .await?;
        Ok(Some(uri))
    }

    async fn contract_token_uri(&self, nft: &Nft) -> Result<String, ResolveError> {
        let pooled = self.ctx.rpc_pool(nft.chain_id)?.select();
        let limiter = &self.ctx.backends.limiter;
        if pooled.endpoint.provider.as_deref() == Some(limiter.policy().provider.as_str()) {
            acquire_within(
                limiter.as_ref(),
                DEFAULT_CALL_COST,
                DEFAULT_POLL_INTERVAL,
                DEFAULT_ACQUIRE_DEADLINE,
            )
            .await?;
        }

        let call = fetch_token_uri(
            pooled.client.as_ref(),
            &nft.token_address,
            nft.token_id,
            nft.contract_type,
        );
        let result = match tokio::time::timeout(self.rpc_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BlockchainRpcClientError::Timeout(format!(
                "tokenURI call exceeded {:?}",
                self.rpc_timeout
            ))),
        };

        match result {
            Ok(uri) => Ok(uri),
            Err(e) if e.is_revert() => Err(e.into()),
            Err(e) => {
                tracing::warn!(
                    chain_id = nft.chain_id,
                    token_address = %nft.token_address,
                    token_id = %nft.token_id,
                    node = pooled.client.node(),
                    "Token URI call failed: {e}"
                );
                match self.provider_token_uri(nft).await {
                    Some(uri) => Ok(uri),
                    None => Err(e.into()),
                }
            }
        }
    }

    async fn provider_token_uri(&self, nft: &Nft) -> Option<String> {
        let provider = self.ctx.provider.as_ref()?;
        match provider
            .get_nft_metadata(nft.chain_id, &nft.token_address, &nft.token_id)
            .await
        {
            Ok(found) => found.and_then(|n| n.token_uri).filter(|uri| !uri.is_empty()),
            Err(e) => {
                tracing::debug!("Provider fallback failed: {e}");
                None
            }
        }
    }

    /// Loads the document behind `token_uri`; `None` when the URI is not fetchable or the
    /// server returned an image.
    async fn fetch_document(&self, token_uri: &str) -> Result<Option<Value>, ResolveError> {
        if is_data_uri(token_uri) {
            return Ok(Some(
                decode_data_uri(token_uri)
                    .map_or_else(empty_document, |d| parse_document(&d.data)),
            ));
        }
        if !is_fetchable_url(token_uri) {
            return Ok(None);
        }

        let response = self.http.get(token_uri, Some(self.fetch_timeout)).await?;
        let status = response.status.as_u16();
        if status == 403 {
            return Err(ResolveError::Quarantine { status });
        }
        if status >= 500 {
            return Err(ResolveError::DocumentServer { status });
        }
        if !response.status.is_success() {
            return Err(ResolveError::Other(anyhow::anyhow!(
                "Document fetch of {token_uri} returned status {status}"
            )));
        }
        if response
            .content_type()
            .is_some_and(|t| t.starts_with("image/"))
        {
            return Ok(None);
        }

        Ok(Some(parse_document(&response.body)))
    }

    /// Uploads the inline image, when enabled, and strips every inline payload.
    async fn sanitize(&self, nft: &Nft, document: Value) -> Result<Value, ResolveError> {
        let image_url = match (&self.ctx.backends.store, inline_image(&document)) {
            (Some(store), Some(image)) if self.ctx.config.metadata.upload_images => {
                let key = image_key(nft.chain_id, &nft.token_address, &nft.token_id);
                Some(store.upload(&key, &image.media_type, image.data).await?)
            }
            _ => None,
        };
        Ok(scrub_inline_data(document, image_url))
    }

    async fn handle_failure(
        &self,
        nft: &Nft,
        request: MetadataSyncRequest,
        error: ResolveError,
    ) -> anyhow::Result<ResolveOutcome> {
        let backends = &self.ctx.backends;
        let routing_key = request.chain_id.to_string();

        if let ResolveError::RateLimited(e) = &error {
            tracing::warn!(
                chain_id = nft.chain_id,
                token_address = %nft.token_address,
                token_id = %nft.token_id,
                "Deferring metadata resolution: {e}"
            );
            let outcome = self
                .scheduler
                .defer(METADATA_SYNC_EXCHANGE, &routing_key, &request)
                .await?;
            return Ok(match outcome {
                ScheduleOutcome::Requeued { delay, .. } | ScheduleOutcome::Persisted { delay, .. } => {
                    ResolveOutcome::Deferred { delay }
                }
                ScheduleOutcome::Dropped { attempts } => ResolveOutcome::Dropped { attempts },
            });
        }

        let error = match error {
            ResolveError::DocumentServer { status } if self.scheduler.is_final_attempt(&request) => {
                ResolveError::Quarantine { status }
            }
            error => error,
        };
        let message = error.to_string();
        tracing::warn!(
            chain_id = nft.chain_id,
            token_address = %nft.token_address,
            token_id = %nft.token_id,
            attempt = request.times,
            "Metadata resolution failed: {message}"
        );
        backends
            .repository
            .record_metadata_failure(
                nft.chain_id,
                &nft.token_hash,
                &message,
                request.times + 1,
                unix_millis_now(),
            )
            .await?;

        if let ResolveError::Quarantine { status } = error {
            backends
                .cache
                .quarantine_contract(nft.chain_id, &nft.token_address)
                .await?;
            tracing::warn!(
                chain_id = nft.chain_id,
                token_address = %nft.token_address,
                "Contract quarantined after document status {status}"
            );
            return Ok(ResolveOutcome::Quarantined { status });
        }

        let outcome = self
            .scheduler
            .schedule(METADATA_SYNC_EXCHANGE, &routing_key, request, &message)
            .await?;
        Ok(match outcome {
            ScheduleOutcome::Requeued { attempt, delay }
            | ScheduleOutcome::Persisted { attempt, delay } => {
                ResolveOutcome::Retrying { attempt, delay }
            }
            ScheduleOutcome::Dropped { attempts } => ResolveOutcome::Dropped { attempts },
        })
    }

    async fn notify(&self, nft: &Nft) {
        let updated = match self
            .ctx
            .backends
            .repository
            .get_nft(nft.chain_id, &nft.token_hash)
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Failed to reload {} for notification: {e}", nft.token_hash);
                return;
            }
        };
        if let Err(e) = self.fanout.notify(&updated).await {
            tracing::warn!("Failed to notify subscribers of {}: {e}", nft.token_hash);
        }
    }
}
