//! Document-store access for the status page.
use crate::config::StatusConfig;
use crate::http::{multipart_file, HttpClient, HttpRequest};
use crate::page::StatusPage;
use anyhow::{anyhow, Context, Result};

/// GET the current status page; anything but 200 is fatal.
pub fn fetch_status_page(
    config: &StatusConfig,
    http: &dyn HttpClient,
    token: Option<&str>,
) -> Result<StatusPage> {
    let url = config.status_admin_url();
    let response = http
        .send(HttpRequest::get(&url).bearer(token))
        .context("fetch status page")?;
    if response.status != 200 {
        return Err(anyhow!(
            "unable to obtain status page: {}",
            response.status
        ));
    }
    tracing::info!(url = %url, bytes = response.body.len(), "obtained status page");
    Ok(StatusPage::parse(&response.body))
}

/// PUT the serialized page back as the `data` field of a multipart form.
pub fn upload_status_page(
    config: &StatusConfig,
    http: &dyn HttpClient,
    token: Option<&str>,
    page: &StatusPage,
) -> Result<()> {
    let url = config.status_admin_url();
    let content = page.serialize();
    let form = multipart_file(
        "data",
        config.status_file_name(),
        "text/html",
        content.as_bytes(),
    );
    let request = HttpRequest::put(&url)
        .bearer(token)
        .bytes(&form.content_type, form.data);
    let response = http.send(request).context("upload status page")?;
    if !config
        .settings
        .upload_success_statuses
        .contains(&response.status)
    {
        return Err(anyhow!(
            "problem updating status page: {}",
            response.status
        ));
    }
    tracing::info!(url = %url, status = response.status, "uploaded status page");
    Ok(())
}
