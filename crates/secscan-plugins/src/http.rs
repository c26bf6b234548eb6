use std::time::Duration;

use reqwest::blocking::{Client, Response};

use secscan_core::PluginError;

/// Build the blocking client shared by the HTTP-backed plugins.
pub fn client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(format!("secscan/{}", crate::VERSION))
        .timeout(timeout)
        .build()
}

/// Map transport errors to a fatal backend error.
pub fn backend_error(context: &str, e: reqwest::Error) -> PluginError {
    PluginError::Backend(format!("{context}: {e}"))
}

/// Reject non-2xx responses, keeping the body for the error message.
pub fn check_status(context: &str, response: Response) -> Result<Response, PluginError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(PluginError::Backend(format!(
        "{context}: HTTP {status}: {}",
        body.trim()
    )))
}
