//! Install, activate and hydrate.

use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use super::ShellWorker;
use crate::cache::{ALL_STORES, CONTENT_STORE, MANIFEST_KEY, MANIFEST_STORE, TEMP_STORE};
use crate::manifest::Manifest;
use crate::net::Response;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Shell resources placed in the temp store.
    pub staged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// No previous manifest; the content store was rebuilt from the shell.
    Fresh,
    /// A previous manifest was reconciled against the current one.
    Upgraded,
    /// Reconciliation failed and every store was deleted.
    Wiped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationReport {
    pub outcome: ActivationOutcome,
    /// Content entries kept because their fingerprint did not change.
    pub retained: usize,
    /// Content entries deleted as changed, removed or foreign.
    pub evicted: usize,
    /// Shell entries copied from the temp store.
    pub promoted: usize,
    pub clients_claimed: bool,
}

impl ActivationReport {
    fn wiped() -> Self {
        Self {
            outcome: ActivationOutcome::Wiped,
            retained: 0,
            evicted: 0,
            promoted: 0,
            clients_claimed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Manifest resources that were already in the content store.
    pub already_cached: usize,
    pub fetched: usize,
}

impl ShellWorker {
    /// Stage the core shell in the temp store.
    ///
    /// Every shell resource is fetched with forced revalidation. Nothing is
    /// stored unless all of them succeed.
    pub async fn install(&self) -> Result<InstallReport> {
        if self.eager_takeover {
            self.skip_waiting();
        }
        self.storage.open(TEMP_STORE).await?;

        let requests = self
            .bundle
            .core
            .iter()
            .map(|path| self.resource_request(path, true))
            .collect::<Result<Vec<_>>>()?;
        let responses = self
            .fetch_all(&requests)
            .await
            .context("Failed to fetch application shell")?;

        for (request, response) in requests.iter().zip(&responses) {
            self.storage.put(TEMP_STORE, &request.key(), response).await?;
        }

        info!(staged = responses.len(), "Staged application shell");
        Ok(InstallReport {
            staged: responses.len(),
        })
    }

    /// Move the staged shell into the content store.
    ///
    /// Never fails: if reconciliation errors part way, all three stores are
    /// deleted so the next install starts from scratch.
    pub async fn activate(&self) -> ActivationReport {
        match self.reconcile().await {
            Ok(report) => {
                info!(
                    outcome = ?report.outcome,
                    retained = report.retained,
                    evicted = report.evicted,
                    promoted = report.promoted,
                    "Activated offline cache"
                );
                report
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(error = %message, "Failed to upgrade offline cache, clearing all stores");
                self.wipe().await;
                ActivationReport::wiped()
            }
        }
    }

    async fn reconcile(&self) -> Result<ActivationReport> {
        self.storage.open(CONTENT_STORE).await?;
        self.storage.open(TEMP_STORE).await?;
        self.storage.open(MANIFEST_STORE).await?;

        let previous = self.storage.get(MANIFEST_STORE, MANIFEST_KEY).await?;

        let (outcome, retained, evicted) = match previous {
            None => {
                let evicted = self.storage.keys(CONTENT_STORE).await?.len();
                self.storage.delete(CONTENT_STORE).await?;
                self.storage.open(CONTENT_STORE).await?;
                (ActivationOutcome::Fresh, 0, evicted)
            }
            Some(cached) => {
                let previous = Manifest::from_json(&cached.response.body)
                    .context("Stored manifest is corrupt")?;
                let (retained, evicted) = self.evict_stale(&previous).await?;
                (ActivationOutcome::Upgraded, retained, evicted)
            }
        };

        let promoted = self.promote_staged().await?;
        self.storage.delete(TEMP_STORE).await?;
        self.persist_manifest().await?;

        Ok(ActivationReport {
            outcome,
            retained,
            evicted,
            promoted,
            clients_claimed: true,
        })
    }

    /// Delete content entries whose resource was removed or whose fingerprint
    /// changed since `previous`. Returns (retained, evicted).
    async fn evict_stale(&self, previous: &Manifest) -> Result<(usize, usize)> {
        let mut retained = 0;
        let mut evicted = 0;
        for url in self.storage.keys(CONTENT_STORE).await? {
            let reusable = self
                .stored_key(&url)
                .map(|key| self.manifest().unchanged_since(previous, &key))
                .unwrap_or(false);
            if reusable {
                retained += 1;
            } else {
                debug!(url = %url, "Evicting stale resource");
                self.storage.remove(CONTENT_STORE, &url).await?;
                evicted += 1;
            }
        }
        Ok((retained, evicted))
    }

    /// Copy every temp entry into the content store, overwriting retained
    /// copies with the freshly fetched shell.
    async fn promote_staged(&self) -> Result<usize> {
        let mut promoted = 0;
        for url in self.storage.keys(TEMP_STORE).await? {
            let Some(staged) = self.storage.get(TEMP_STORE, &url).await? else {
                continue;
            };
            self.storage.put(CONTENT_STORE, &url, &staged.response).await?;
            promoted += 1;
        }
        Ok(promoted)
    }

    async fn persist_manifest(&self) -> Result<()> {
        let body = self.manifest().to_json()?;
        let response = Response::json(MANIFEST_KEY, body);
        self.storage.put(MANIFEST_STORE, MANIFEST_KEY, &response).await
    }

    /// Delete every store. Failures are logged and the rest still proceed.
    pub async fn wipe(&self) {
        for store in ALL_STORES {
            if let Err(e) = self.storage.delete(store).await {
                error!(store, error = %e, "Failed to delete store");
            }
        }
    }

    /// Whether an installed shell is staged and waiting to be activated.
    pub async fn has_staged_shell(&self) -> Result<bool> {
        Ok(!self.storage.keys(TEMP_STORE).await?.is_empty())
    }

    /// Fetch and store every manifest resource missing from the content
    /// store. Resources already cached are not fetched again.
    pub async fn download_offline(&self) -> Result<HydrationReport> {
        let present: HashSet<String> = self
            .storage
            .keys(CONTENT_STORE)
            .await?
            .iter()
            .filter_map(|url| self.stored_key(url))
            .collect();

        let missing: Vec<&str> = self
            .manifest()
            .keys()
            .filter(|key| !present.contains(*key))
            .collect();
        let already_cached = self.manifest().len() - missing.len();
        if missing.is_empty() {
            info!(already_cached, "All resources already available offline");
            return Ok(HydrationReport {
                already_cached,
                fetched: 0,
            });
        }

        let requests = missing
            .iter()
            .map(|key| self.resource_request(key, false))
            .collect::<Result<Vec<_>>>()?;
        let responses = self
            .fetch_all(&requests)
            .await
            .context("Failed to download offline resources")?;

        for (request, response) in requests.iter().zip(&responses) {
            if let Err(e) = self.storage.put(CONTENT_STORE, &request.key(), response).await {
                warn!(url = %request.url, error = %e, "Failed to store offline resource");
                return Err(e);
            }
        }

        info!(already_cached, fetched = responses.len(), "Downloaded offline resources");
        Ok(HydrationReport {
            already_cached,
            fetched: responses.len(),
        })
    }
}
