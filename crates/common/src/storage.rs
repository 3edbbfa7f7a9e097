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

//! Object storage for inline token images.

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

/// Stores blobs and returns their public URL.
#[async_trait]
pub trait ObjectStore: Debug + Send + Sync {
    /// Uploads `data` under `key` and returns the URL it is served from.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    async fn upload(&self, key: &str, content_type: &str, data: Vec<u8>) -> anyhow::Result<String>;
}

/// A process-local [`ObjectStore`] serving objects under a fixed base URL.
#[derive(Debug, Clone)]
pub struct InMemoryObjectStore {
    base_url: String,
    objects: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
}

impl InMemoryObjectStore {
    /// Creates a new [`InMemoryObjectStore`] instance.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Arc::default(),
        }
    }

    /// Returns the content type and bytes stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, key: &str, content_type: &str, data: Vec<u8>) -> anyhow::Result<String> {
        anyhow::ensure!(!key.is_empty(), "Object key must not be empty");
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (content_type.to_string(), data));
        Ok(format!("{}/{key}", self.base_url))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn test_upload_returns_url() {
        let store = InMemoryObjectStore::new("https://cdn.test/");
        let url = store
            .upload("1/0xabc/42", "image/png", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.test/1/0xabc/42");
        assert_eq!(
            store.get("1/0xabc/42"),
            Some(("image/png".to_string(), vec![1, 2, 3]))
        );
        assert!(store.upload("", "image/png", vec![]).await.is_err());
    }
}
