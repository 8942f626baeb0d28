use anyhow::{Context, Result};
use async_trait::async_trait;
use common::{Job, JobId, JobSnapshot};
use reqwest::Url;
use std::time::Duration;

use crate::config::Config;

/// Where the controller gets job lists from.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn list_jobs(&self) -> Result<JobSnapshot>;
}

/// HTTP client for the job server's `jobs/` API.
#[derive(Clone)]
pub struct JobsClient {
    http: reqwest::Client,
    base: Url,
    list_path: String,
}

impl JobsClient {
    pub fn new(base: Url, list_path: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base,
            list_path: list_path.trim_start_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.server_url()?,
            &config.server.list_path,
            Duration::from_secs(config.server.timeout_secs),
        )
    }

    pub fn list_url(&self) -> Result<Url> {
        self.base
            .join(&self.list_path)
            .with_context(|| format!("Invalid list path: {}", self.list_path))
    }

    pub fn job_url(&self, id: JobId) -> Result<Url> {
        let path = format!("{}/{}", common::JOB_DETAIL_PATH, id);
        self.base
            .join(&path)
            .with_context(|| format!("Invalid job path: {}", path))
    }

    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {} returned {}", url, status);
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        Ok(body.to_vec())
    }

    pub async fn fetch_jobs(&self) -> Result<JobSnapshot> {
        let url = self.list_url()?;
        let body = self.get_bytes(url.clone()).await?;
        let snapshot = common::parse_job_list(&body)
            .with_context(|| format!("Invalid job list from {}", url))?;

        for q in &snapshot.quarantined {
            log::warn!("Skipping malformed job entry #{}: {} ({})", q.index, q.reason, q.raw);
        }
        for job in snapshot.unknown_states() {
            log::warn!("Job {} has unknown state index {}", job.id, job.state.index());
        }
        log::debug!("Fetched {} jobs from {}", snapshot.jobs.len(), url);
        Ok(snapshot)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job> {
        let url = self.job_url(id)?;
        let body = self.get_bytes(url.clone()).await?;
        let job = common::parse_job(&body).with_context(|| format!("Invalid job from {}", url))?;
        Ok(job)
    }
}

#[async_trait]
impl JobSource for JobsClient {
    async fn list_jobs(&self) -> Result<JobSnapshot> {
        self.fetch_jobs().await
    }
}
