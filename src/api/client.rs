//! Client used by the CLI to talk to the daemon.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::types::{CommitSettingsRequest, CreateInstanceRequest, UpdateInstanceRequest};
use crate::commands::StatusReport;
use crate::config::Settings;
use crate::error::{AppError, ErrorBody, Result};
use crate::instance::InstanceView;
use crate::jobs::JobRecord;
use crate::registry::{GuardClass, Snapshot};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("senex/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<reqwest::Response> {
        let resp = request
            .send()
            .await
            .map_err(|e| AppError::network_with_url(url, e.to_string()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        match resp.json::<ErrorBody>().await {
            Ok(body) => Err(body.into()),
            Err(_) => Err(AppError::network_with_url(url, status.to_string())),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, url: &str) -> Result<T> {
        self.send(request, url)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AppError::network_with_url(url, e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.send_json(self.http.get(&url), &url).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.send_json(self.http.post(&url), &url).await
    }

    pub async fn status(&self) -> Result<StatusReport> {
        self.get("/status").await
    }

    pub async fn list_instances(&self) -> Result<Vec<InstanceView>> {
        self.get("/instances").await
    }

    pub async fn get_instance(&self, name: &str) -> Result<InstanceView> {
        self.get(&format!("/instances/{}", name)).await
    }

    pub async fn create_instance(
        &self,
        name: &str,
        human_name: Option<String>,
    ) -> Result<JobRecord> {
        let url = self.url("/instances");
        let body = CreateInstanceRequest {
            name: name.to_string(),
            human_name,
        };
        self.send_json(self.http.post(&url).json(&body), &url).await
    }

    pub async fn update_instance(
        &self,
        name: &str,
        human_name: Option<String>,
    ) -> Result<InstanceView> {
        let url = self.url(&format!("/instances/{}", name));
        let body = UpdateInstanceRequest { human_name };
        self.send_json(self.http.patch(&url).json(&body), &url).await
    }

    /// Submit `start`, `stop`, `rebuild` or `cleanup` for an instance.
    pub async fn instance_action(&self, name: &str, action: &str) -> Result<JobRecord> {
        self.post(&format!("/instances/{}/{}", name, action)).await
    }

    pub async fn job(&self, id: Uuid) -> Result<JobRecord> {
        self.get(&format!("/jobs/{}", id)).await
    }

    /// Poll a job until it reaches a terminal status.
    pub async fn wait_job(&self, id: Uuid, interval: Duration) -> Result<JobRecord> {
        loop {
            let record = self.job(id).await?;
            if record.status.is_terminal() {
                return Ok(record);
            }
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn current_settings(&self) -> Result<Snapshot> {
        self.get("/settings").await
    }

    pub async fn commit_settings(&self, settings: Settings, refresh: bool) -> Result<Snapshot> {
        let url = self.url("/settings");
        let body = CommitSettingsRequest { settings, refresh };
        self.send_json(self.http.put(&url).json(&body), &url).await
    }

    pub async fn settings_history(&self) -> Result<Vec<Snapshot>> {
        self.get("/settings/history").await
    }

    pub async fn dependencies(&self, refresh: bool) -> Result<Snapshot> {
        self.get(&format!("/dependencies?refresh={}", refresh)).await
    }

    pub async fn install_dependencies(&self) -> Result<JobRecord> {
        self.post("/dependencies/install").await
    }

    pub async fn clear_guard(&self, class: GuardClass) -> Result<Snapshot> {
        self.post(&format!("/guards/{}/clear", class)).await
    }

    pub async fn proxy_config(&self) -> Result<String> {
        let url = self.url("/proxy/config");
        self.send(self.http.get(&url), &url)
            .await?
            .text()
            .await
            .map_err(|e| AppError::network_with_url(&url, e.to_string()))
    }
}
