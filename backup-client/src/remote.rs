//! HTTP client for the configuration server.
//!
//! The server publishes `config.json` and update scripts over plain HTTP on
//! its configuration port. Transport failures, non-2xx responses and
//! malformed JSON are three distinct fatal error classes; the caller aborts
//! before attempting any backup.

use crate::config::{merge_defaults, Configuration, PartialConfiguration, ServerConfig};
use crate::utils::errors::ClientError;

/// A fetched configuration: the parsed, default-merged document plus the raw
/// response bytes so persistence can be bit-identical to what the server
/// sent.
#[derive(Debug)]
pub struct FetchedConfig {
    pub raw: Vec<u8>,
    pub config: Configuration,
}

pub async fn fetch_config(
    http: &reqwest::Client,
    server: &ServerConfig,
) -> Result<FetchedConfig, ClientError> {
    let url = format!("http://{}:{}/config.json", server.host, server.httpd_port);
    tracing::info!("fetching configuration from {url}");

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(ClientError::ConfigFetch)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::ConfigStatus(status));
    }

    let raw = response
        .bytes()
        .await
        .map_err(ClientError::ConfigFetch)?
        .to_vec();
    let partial: PartialConfiguration =
        serde_json::from_slice(&raw).map_err(ClientError::ConfigParse)?;

    Ok(FetchedConfig {
        raw,
        config: merge_defaults(partial, &Configuration::defaults()),
    })
}

/// Fetch the body of one update script.
pub async fn fetch_update_script(
    http: &reqwest::Client,
    server: &ServerConfig,
    epoch: u64,
    script: &str,
) -> Result<String, ClientError> {
    let url = format!("http://{}:{}/{}", server.host, server.httpd_port, script);
    let fetch_err = |source| ClientError::UpdateFetch { epoch, source };

    let response = http.get(&url).send().await.map_err(fetch_err)?;
    let response = response.error_for_status().map_err(fetch_err)?;
    response.text().await.map_err(fetch_err)
}
