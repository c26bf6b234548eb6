//! Asynchronous audit server backend (MobileAudit-style REST API).
//!
//! Scans are listed at `GET /api/v1/scan/`, created with a multipart
//! `POST /api/v1/scan/` and read back with `GET /api/v1/scan/{id}/`. The
//! artifact path is stored as the scan description so a rerun can find the
//! outcome of an earlier batch.

use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use tracing::debug;

use secscan_core::poll::{ExistingScan, JobStatus, PollJob, PollingScanClient, ScanBackend};
use secscan_core::{Artifact, Plugin, PluginError, PluginOutcome, RunContext};

use crate::http::{self, backend_error};

#[derive(Debug, Clone, Deserialize)]
pub struct ScanRecord {
    pub id: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScanList {
    Paged { results: Vec<ScanRecord> },
    Plain(Vec<ScanRecord>),
}

impl ScanList {
    fn into_records(self) -> Vec<ScanRecord> {
        match self {
            ScanList::Paged { results } => results,
            ScanList::Plain(records) => records,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

/// Map the server's status text onto the poll state machine.
pub fn parse_status(status: &str) -> JobStatus {
    match status {
        "Finished" => JobStatus::Finished,
        "Error" => JobStatus::Error,
        _ => JobStatus::Pending,
    }
}

/// Consult the server's own scan listing for `artifact`.
pub fn classify_existing(records: &[ScanRecord], artifact: &Artifact) -> ExistingScan {
    let key = artifact.to_string();
    let mut existing = ExistingScan::default();
    for record in records.iter().filter(|r| r.description == key) {
        match parse_status(&record.status) {
            JobStatus::Finished => existing.already_succeeded = true,
            JobStatus::Error => existing.already_failed = true,
            JobStatus::Pending => {}
        }
    }
    existing
}

pub struct HttpAuditBackend {
    base_url: String,
    token: String,
    app_id: u64,
    client: Client,
}

impl HttpAuditBackend {
    pub fn new(base_url: &str, token: String, app_id: u64) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            app_id,
            client: http::client(Duration::from_secs(300))?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url)
    }

    fn auth(&self) -> String {
        format!("Token {}", self.token)
    }
}

impl ScanBackend for HttpAuditBackend {
    fn find_existing(&self, artifact: &Artifact) -> Result<ExistingScan, PluginError> {
        let response = self
            .client
            .get(self.url("scan/"))
            .header("Authorization", self.auth())
            .send()
            .map_err(|e| backend_error("list scans", e))?;
        let list: ScanList = http::check_status("list scans", response)?
            .json()
            .map_err(|e| backend_error("list scans", e))?;
        Ok(classify_existing(&list.into_records(), artifact))
    }

    fn submit(&self, artifact: &Artifact) -> Result<PollJob, PluginError> {
        let form = multipart::Form::new()
            .text("app", self.app_id.to_string())
            .text("description", artifact.to_string())
            .file("file", artifact.path())?;
        let response = self
            .client
            .post(self.url("scan/"))
            .header("Authorization", self.auth())
            .multipart(form)
            .send()
            .map_err(|e| backend_error("create scan", e))?;
        let created: Created = http::check_status("create scan", response)?
            .json()
            .map_err(|e| backend_error("create scan", e))?;
        debug!(id = created.id, %artifact, "audit scan created");
        Ok(PollJob::pending(created.id.to_string()))
    }

    fn poll(&self, job: &PollJob) -> Result<JobStatus, PluginError> {
        let response = self
            .client
            .get(self.url(&format!("scan/{}/", job.id)))
            .header("Authorization", self.auth())
            .send()
            .map_err(|e| backend_error("read scan", e))?;
        let body: StatusBody = http::check_status("read scan", response)?
            .json()
            .map_err(|e| backend_error("read scan", e))?;
        Ok(parse_status(&body.status))
    }
}

/// Plugin that drives one artifact through an asynchronous scan backend.
pub struct AuditPlugin<B> {
    name: String,
    client: PollingScanClient<B>,
}

impl<B: ScanBackend> AuditPlugin<B> {
    pub fn new(name: impl Into<String>, client: PollingScanClient<B>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }
}

impl<B: ScanBackend> Plugin for AuditPlugin<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, artifact: &Artifact, ctx: &RunContext) -> Result<PluginOutcome, PluginError> {
        self.client.scan(artifact, &ctx.cancel)
    }
}
