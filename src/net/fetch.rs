use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use super::endpoint::Endpoint;
use super::schema::{Snapshot, decode_snapshot};

pub async fn fetch_snapshot(client: &reqwest::Client, endpoint: &Endpoint) -> Result<Snapshot> {
    let hubs_url = endpoint.hubs_url();
    let devices_url = endpoint.devices_url();

    let (hubs, devices) = tokio::try_join!(
        fetch_collection(client, &hubs_url),
        fetch_collection(client, &devices_url),
    )?;

    let snapshot = decode_snapshot(&hubs, &devices);
    info!(
        hubs = snapshot.hubs.len(),
        devices = snapshot.devices.len(),
        %endpoint,
        "snapshot fetched"
    );
    Ok(snapshot)
}

async fn fetch_collection(client: &reqwest::Client, url: &str) -> Result<Value> {
    debug!(%url, "fetching collection");
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?
        .error_for_status()
        .with_context(|| format!("{url} answered with an error status"))?;

    response
        .json::<Value>()
        .await
        .with_context(|| format!("{url} did not return JSON"))
}
