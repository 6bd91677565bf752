//! Install/update pipeline for deployable units.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mgmt_agent_error::AgentError;
use tokio::sync::{oneshot, RwLock};

use crate::descriptor::{self, DescriptorError};
use crate::dto::{OpResult, UnitInfo};
use crate::host::{HostError, HostRuntime};

pub struct InstallPipeline {
    host: Arc<dyn HostRuntime>,
    http: reqwest::Client,
    /// Location -> source URL for units installed from a URL.
    installed: RwLock<HashMap<String, String>>,
}

fn invalid_unit(err: DescriptorError) -> AgentError {
    AgentError::InvalidUnit {
        message: err.to_string(),
    }
}

fn host_failure(err: HostError) -> AgentError {
    AgentError::HostFailure {
        message: err.to_string(),
    }
}

impl InstallPipeline {
    pub fn new(host: Arc<dyn HostRuntime>) -> Self {
        Self {
            host,
            http: reqwest::Client::new(),
            installed: RwLock::new(HashMap::new()),
        }
    }

    /// Picks the location for an image installed without an explicit one.
    pub fn resolve_location(&self, image: &[u8]) -> Result<String, AgentError> {
        let identity = descriptor::identify(image).map_err(invalid_unit)?;
        let mut matches: Vec<UnitInfo> = self
            .host
            .units()
            .into_iter()
            .filter(|unit| unit.symbolic_name == identity.symbolic_name)
            .collect();
        match matches.len() {
            0 => Ok(identity.placeholder_location()),
            1 => Ok(matches.remove(0).location),
            _ => Err(AgentError::AmbiguousInstall {
                symbolic_name: identity.symbolic_name,
                locations: matches.into_iter().map(|unit| unit.location).collect(),
            }),
        }
    }

    /// Installs fresh at `location`, or updates the unit already there.
    pub async fn install(
        &self,
        location: Option<&str>,
        image: &[u8],
        start_level: i32,
        should_refresh: bool,
    ) -> Result<UnitInfo, AgentError> {
        let location = match location {
            Some(location) => location.to_string(),
            None => self.resolve_location(image)?,
        };

        match self.host.unit_by_location(&location) {
            None => {
                let unit = self.host.install(&location, image).map_err(host_failure)?;
                self.host
                    .set_start_level(unit.id, start_level)
                    .map_err(host_failure)?;
                tracing::info!(
                    unit_id = unit.id,
                    location = %location,
                    start_level = start_level,
                    "unit installed"
                );
                Ok(self.host.unit(unit.id).unwrap_or(unit))
            }
            Some(existing) => {
                let unit = self.host.update(existing.id, image).map_err(host_failure)?;
                tracing::info!(unit_id = unit.id, location = %location, "unit updated");
                if should_refresh {
                    self.refresh(true).await;
                }
                Ok(unit)
            }
        }
    }

    /// Installs every image independently. Failures are collected one per
    /// line; the result is `SUCCESS` even when some images failed, and the
    /// runtime is refreshed only when none did.
    pub async fn install_batch(&self, images: &[Vec<u8>], start_level: i32) -> OpResult {
        let entries = images.iter().map(|image| Ok(image.as_slice()));
        self.install_entries(entries, start_level).await
    }

    /// Batch install where some entries failed before reaching the pipeline.
    /// Those failures become message lines like any install failure.
    pub async fn install_entries<'a, I>(&self, entries: I, start_level: i32) -> OpResult
    where
        I: IntoIterator<Item = Result<&'a [u8], AgentError>>,
    {
        let mut failures = String::new();
        for entry in entries {
            let result = match entry {
                Ok(image) => self.install(None, image, start_level, false).await.map(|_| ()),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, "unit in batch failed to install");
                failures.push_str(&err.to_string());
                failures.push('\n');
            }
        }
        if failures.is_empty() {
            self.refresh(true).await;
        }
        OpResult::success(failures)
    }

    pub async fn install_from_url(&self, location: &str, url: &str) -> Result<UnitInfo, AgentError> {
        let parsed = url::Url::parse(url)
            .map_err(|err| AgentError::invalid_request(format!("invalid unit URL '{url}': {err}")))?;
        let image = self.download(&parsed).await?;
        let unit = self.host.install(location, &image).map_err(host_failure)?;
        self.installed
            .write()
            .await
            .insert(unit.location.clone(), url.to_string());
        tracing::info!(unit_id = unit.id, url = %url, "unit installed from url");
        Ok(unit)
    }

    async fn download(&self, url: &url::Url) -> Result<Vec<u8>, AgentError> {
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| AgentError::invalid_request(format!("invalid file URL '{url}'")))?;
            return tokio::fs::read(&path).await.map_err(|err| AgentError::HostFailure {
                message: format!("failed to read {}: {err}", path.display()),
            });
        }
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| AgentError::HostFailure {
                message: format!("failed to download {url}: {err}"),
            })?;
        let bytes = response.bytes().await.map_err(|err| AgentError::HostFailure {
            message: format!("failed to download {url}: {err}"),
        })?;
        Ok(bytes.to_vec())
    }

    pub async fn forget(&self, location: &str) {
        self.installed.write().await.remove(location);
    }

    pub async fn installed_from_urls(&self) -> BTreeMap<String, String> {
        self.installed
            .read()
            .await
            .iter()
            .map(|(location, url)| (location.clone(), url.clone()))
            .collect()
    }

    /// Asks the host to recompute wiring. With `asynchronous` the call
    /// returns right away; otherwise it waits for the completion signal.
    /// Failures are logged and swallowed.
    pub async fn refresh(&self, asynchronous: bool) {
        let (done_tx, done_rx) = oneshot::channel();
        if let Err(err) = self.host.refresh(done_tx) {
            tracing::warn!(error = %err, "refresh request failed");
            return;
        }
        if asynchronous {
            return;
        }
        if done_rx.await.is_err() {
            tracing::warn!("refresh completion signal dropped");
        }
    }
}
