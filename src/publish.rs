//! Two-step promotion of the uploaded page: preview, then live.
use crate::config::StatusConfig;
use crate::http::{HttpClient, HttpRequest};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PublishResponse {
    live: LiveResource,
}

#[derive(Debug, Deserialize)]
struct LiveResource {
    url: String,
}

/// Preview then publish. Returns the live URL when the publish API reports one.
pub fn preview_and_publish(config: &StatusConfig, http: &dyn HttpClient) -> Result<Option<String>> {
    let preview = http
        .send(HttpRequest::post(config.preview_url()))
        .context("preview status update")?;
    if preview.status != 200 {
        return Err(anyhow!(
            "problem previewing status update: {}",
            preview.status
        ));
    }
    tracing::info!(url = %config.preview_url(), "previewed status update");

    let publish = http
        .send(HttpRequest::post(config.publish_url()))
        .context("publish status update")?;
    if publish.status != 200 {
        return Err(anyhow!(
            "problem publishing status update: {}",
            publish.status
        ));
    }

    match publish.json::<PublishResponse>() {
        Ok(body) => {
            tracing::info!(url = %body.live.url, "published");
            Ok(Some(body.live.url))
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "publish response has no live URL");
            Ok(None)
        }
    }
}
