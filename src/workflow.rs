//! The status-update pipeline: load report, fetch page, rewrite, upload, publish.
//!
//! Each stage runs once, in order. A failure anywhere aborts the run and is
//! reported through the chat notifier; there is no rollback, so a page that
//! was already uploaded stays uploaded when publishing fails afterwards.
use crate::auth;
use crate::config::{Settings, StatusConfig};
use crate::http::HttpClient;
use crate::notify::{service_down_message, ChatNotifier};
use crate::page::StatusPage;
use crate::publish;
use crate::report::TestReport;
use crate::status::{self, ServiceReport, ServiceStatus};
use crate::store;
use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub services: Vec<ServiceReport>,
    pub last_updated: String,
    pub published: bool,
    pub live_url: Option<String>,
}

/// Run the whole pipeline, reporting any failure to the chat channel.
pub fn run_status_update(
    config: &StatusConfig,
    http: &dyn HttpClient,
    report_path: &Path,
) -> Result<UpdateOutcome> {
    let notifier = ChatNotifier::from_config(config, http);
    let start = Instant::now();
    match update_status(config, http, &notifier, report_path) {
        Ok(outcome) => {
            tracing::info!(
                elapsed_ms = start.elapsed().as_millis(),
                published = outcome.published,
                "status update complete"
            );
            Ok(outcome)
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "problem updating status page");
            notifier.notify(&format!("Problem updating status page: {err:#}"));
            Err(err)
        }
    }
}

fn update_status(
    config: &StatusConfig,
    http: &dyn HttpClient,
    notifier: &ChatNotifier<'_>,
    report_path: &Path,
) -> Result<UpdateOutcome> {
    let report = TestReport::load(report_path)?;
    tracing::info!(
        path = %report_path.display(),
        cases = report.cases().len(),
        "loaded test report"
    );

    let token = config
        .ims
        .as_ref()
        .map(|credentials| auth::fetch_access_token(http, credentials))
        .transpose()?;

    let mut page = store::fetch_status_page(config, http, token.as_deref())?;
    let services = apply_statuses(&mut page, &report, &config.settings, notifier)?;
    let last_updated = page.set_last_updated(Utc::now())?;

    store::upload_status_page(config, http, token.as_deref(), &page)?;

    if config.skip_publish {
        tracing::info!("SKIP_PUBLISH set, not previewing or publishing");
        return Ok(UpdateOutcome {
            services,
            last_updated,
            published: false,
            live_url: None,
        });
    }
    let live_url = publish::preview_and_publish(config, http)?;
    Ok(UpdateOutcome {
        services,
        last_updated,
        published: true,
        live_url,
    })
}

/// Write every configured service's status into the page, alerting on each
/// service found down. Stops at the first service the page has no
/// indicator for.
pub fn apply_statuses(
    page: &mut StatusPage,
    report: &TestReport,
    settings: &Settings,
    notifier: &ChatNotifier<'_>,
) -> Result<Vec<ServiceReport>> {
    let mut applied = Vec::with_capacity(settings.services.len());
    for entry in status::evaluate(report, settings) {
        page.set_service_status(&entry.service, entry.status)?;
        tracing::info!(service = %entry.service, status = %entry.status, "service status");
        if entry.status == ServiceStatus::Down && settings.alerts && notifier.is_enabled() {
            notifier.notify(&service_down_message(&entry.service));
        }
        applied.push(entry);
    }
    Ok(applied)
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
