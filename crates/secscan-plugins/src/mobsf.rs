use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use tracing::debug;

use secscan_core::{Artifact, Plugin, PluginError, PluginOutcome, RunContext};

use crate::command::write_diagnostic;
use crate::http::{self, backend_error};

#[derive(Debug, Deserialize)]
struct Uploaded {
    hash: String,
}

/// Uploads the artifact to a MobSF instance, runs the static scan and stores
/// the JSON report as `<report_dir>/<name>.json`.
pub struct MobsfPlugin {
    name: String,
    base_url: String,
    api_key: String,
    client: Client,
}

impl MobsfPlugin {
    pub fn new(name: impl Into<String>, base_url: &str, api_key: String) -> Result<Self, reqwest::Error> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: http::client(Duration::from_secs(900))?,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v1/{endpoint}", self.base_url)
    }

    /// POST the upload hash to `endpoint`. A rejected request becomes `Ok(Err(diagnostic))`.
    fn post_hash(&self, endpoint: &str, hash: &str) -> Result<Result<String, String>, PluginError> {
        let response = self
            .client
            .post(self.url(endpoint))
            .header("Authorization", &self.api_key)
            .form(&[("hash", hash)])
            .send()
            .map_err(|e| backend_error(endpoint, e))?;
        let status = response.status();
        let body = response.text().map_err(|e| backend_error(endpoint, e))?;
        if status.is_success() {
            Ok(Ok(body))
        } else {
            Ok(Err(format!("{endpoint}: HTTP {status}\n{body}")))
        }
    }
}

impl Plugin for MobsfPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, artifact: &Artifact, _ctx: &RunContext) -> Result<PluginOutcome, PluginError> {
        let form = multipart::Form::new().file("file", artifact.path())?;
        let response = self
            .client
            .post(self.url("upload"))
            .header("Authorization", &self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| backend_error("upload", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            write_diagnostic(artifact, &self.name, &format!("upload: HTTP {status}\n{body}"));
            return Ok(PluginOutcome::failure(format!("upload rejected with HTTP {status}")));
        }
        let uploaded: Uploaded = response.json().map_err(|e| backend_error("upload", e))?;
        debug!(hash = %uploaded.hash, %artifact, "uploaded to MobSF");

        for endpoint in ["scan", "report_json"] {
            match self.post_hash(endpoint, &uploaded.hash)? {
                Ok(body) if endpoint == "report_json" => {
                    let path = artifact.report_dir().join(format!("{}.json", self.name));
                    std::fs::write(path, body)?;
                }
                Ok(_) => {}
                Err(diagnostic) => {
                    write_diagnostic(artifact, &self.name, &diagnostic);
                    return Ok(PluginOutcome::failure(format!("{endpoint} request rejected")));
                }
            }
        }

        Ok(PluginOutcome::Success)
    }
}
