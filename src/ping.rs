//! Reachability checks for each service, written out as a JUnit report.
//!
//! The report this produces is the input of the status update: one
//! `Ping <service>` test case per service plus the detailed
//! `Test da-collab` case, failing cases carrying a `<failure>` child.
use crate::collab::{self, CollabConnector, PROSEMIRROR_FRAGMENT};
use crate::config::StatusConfig;
use crate::http::{HttpClient, HttpRequest};
use crate::status::{detail_classname, ping_case_name};
use anyhow::{anyhow, ensure, Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::{Duration, Instant};

pub const SUITE_NAME: &str = "Ping Suite";
pub const COLLAB_DOCUMENT_CASE: &str = "Test YDoc WebSocket connection";

const PING_MARKER: &str = "<p>ping</p>";
const LIVE_TITLE: &str = "Browse - DA";
const UE_CORS_SCRIPT: &str =
    r#"<script src="https://universal-editor-service.adobe.io/cors.js" async></script>"#;
const UE_INIT_MARKER: &str = "function init()";
const WS_MARKER: &str = "WSTest123";
const COLLAB_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub classname: String,
    pub elapsed: Duration,
    pub failure: Option<String>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PingReport {
    pub checks: Vec<CheckResult>,
    pub elapsed: Duration,
}

impl PingReport {
    pub fn failures(&self) -> usize {
        self.checks.iter().filter(|check| !check.passed()).count()
    }

    /// Checks grouped by classname, in first-seen order.
    fn suites(&self) -> Vec<(&str, Vec<&CheckResult>)> {
        let mut suites: Vec<(&str, Vec<&CheckResult>)> = Vec::new();
        for check in &self.checks {
            match suites
                .iter_mut()
                .find(|(classname, _)| *classname == check.classname)
            {
                Some((_, cases)) => cases.push(check),
                None => suites.push((check.classname.as_str(), vec![check])),
            }
        }
        suites
    }

    pub fn to_junit_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .context("write JUnit declaration")?;

        let tests = self.checks.len().to_string();
        let failures = self.failures().to_string();
        let time = seconds(self.elapsed);
        writer.write_event(Event::Start(BytesStart::new("testsuites").with_attributes([
            ("name", SUITE_NAME),
            ("tests", tests.as_str()),
            ("failures", failures.as_str()),
            ("time", time.as_str()),
        ])))?;

        for (classname, cases) in self.suites() {
            let tests = cases.len().to_string();
            let failures = cases.iter().filter(|case| !case.passed()).count().to_string();
            let time = seconds(cases.iter().map(|case| case.elapsed).sum());
            writer.write_event(Event::Start(BytesStart::new("testsuite").with_attributes([
                ("name", classname),
                ("tests", tests.as_str()),
                ("failures", failures.as_str()),
                ("time", time.as_str()),
            ])))?;
            for case in cases {
                let time = seconds(case.elapsed);
                let start = BytesStart::new("testcase").with_attributes([
                    ("name", case.name.as_str()),
                    ("classname", case.classname.as_str()),
                    ("time", time.as_str()),
                ]);
                let Some(message) = &case.failure else {
                    writer.write_event(Event::Empty(start))?;
                    continue;
                };
                writer.write_event(Event::Start(start))?;
                writer.write_event(Event::Start(BytesStart::new("failure").with_attributes([
                    ("message", message.as_str()),
                    ("type", "AssertionError"),
                ])))?;
                writer.write_event(Event::Text(BytesText::new(message)))?;
                writer.write_event(Event::End(BytesEnd::new("failure")))?;
                writer.write_event(Event::End(BytesEnd::new("testcase")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

        let mut xml = String::from_utf8(writer.into_inner()).context("encode JUnit report")?;
        xml.push('\n');
        Ok(xml)
    }
}

fn seconds(elapsed: Duration) -> String {
    format!("{:.3}", elapsed.as_secs_f64())
}

type Check = fn(&StatusConfig, &dyn HttpClient) -> Result<()>;

const CHECKS: [(&str, Check); 5] = [
    ("da-admin", check_admin),
    ("da-collab", check_collab),
    ("da-content", check_content),
    ("da-live", check_live),
    ("da-ue", check_ue),
];

pub fn run_ping_suite(
    config: &StatusConfig,
    http: &dyn HttpClient,
    collab: &dyn CollabConnector,
) -> PingReport {
    let start = Instant::now();
    warm_up(config, http);

    let mut checks = Vec::with_capacity(CHECKS.len() + 1);
    for (service, check) in CHECKS {
        checks.push(run_check(
            service,
            ping_case_name(service),
            SUITE_NAME.to_string(),
            || check(config, http),
        ));
    }
    checks.push(run_check(
        "da-collab",
        COLLAB_DOCUMENT_CASE.to_string(),
        detail_classname("da-collab"),
        || check_collab_document(config, collab),
    ));

    PingReport {
        checks,
        elapsed: start.elapsed(),
    }
}

fn run_check(
    service: &str,
    name: String,
    classname: String,
    check: impl FnOnce() -> Result<()>,
) -> CheckResult {
    let start = Instant::now();
    let failure = check().err().map(|err| format!("{err:#}"));
    let elapsed = start.elapsed();
    match &failure {
        None => tracing::info!(service, case = %name, elapsed_ms = elapsed.as_millis(), "check ok"),
        Some(message) => tracing::warn!(service, case = %name, error = %message, "check failed"),
    }
    CheckResult {
        name,
        classname,
        elapsed,
        failure,
    }
}

fn admin_ping_url(config: &StatusConfig) -> String {
    format!(
        "{}/source/da-sites/da-status/tests/pingtest.html",
        config.hosts.da_admin
    )
}

fn warm_up(config: &StatusConfig, http: &dyn HttpClient) {
    if let Err(err) = http.send(HttpRequest::get(admin_ping_url(config))) {
        tracing::warn!(error = %format!("{err:#}"), "network warmup failed");
    }
}

fn check_admin(config: &StatusConfig, http: &dyn HttpClient) -> Result<()> {
    let url = admin_ping_url(config);
    let response = http.send(HttpRequest::get(&url))?;
    ensure!(
        response.body.contains(PING_MARKER),
        "da-admin is down. Expected {PING_MARKER} not found in {url}"
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CollabPing {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    service_bindings: Vec<String>,
}

fn check_collab(config: &StatusConfig, http: &dyn HttpClient) -> Result<()> {
    let url = format!("{}/api/v1/ping", config.hosts.da_collab);
    let response = http.send(HttpRequest::get(&url))?;
    let ping: CollabPing = response
        .json()
        .map_err(|_| anyhow!("da-collab is down, unreadable ping response from {url}"))?;
    ensure!(
        ping.status.as_deref() == Some("ok"),
        "da-collab is down, status: {:?}",
        ping.status
    );
    ensure!(
        ping.service_bindings == ["da-admin"],
        "da-collab not using service binding to reach da-admin, bindings: {:?}",
        ping.service_bindings
    );
    Ok(())
}

fn check_content(config: &StatusConfig, http: &dyn HttpClient) -> Result<()> {
    let url = format!(
        "{}/da-sites/da-status/tests/pingtest",
        config.hosts.da_content
    );
    let response = http.send(HttpRequest::get(&url))?;
    ensure!(
        response.body.contains(PING_MARKER),
        "da-content is down. Expected {PING_MARKER} not found in {url}"
    );
    Ok(())
}

fn check_live(config: &StatusConfig, http: &dyn HttpClient) -> Result<()> {
    let response = http.send(HttpRequest::get(&config.hosts.da_live))?;
    let document = Html::parse_document(&response.body);
    let title = Selector::parse("title").map_err(|err| anyhow!("invalid selector: {err:?}"))?;
    let text: String = document
        .select(&title)
        .next()
        .map(|element| element.text().collect())
        .unwrap_or_default();
    ensure!(
        text.trim() == LIVE_TITLE,
        "da-live is down. Page title {:?} is not {LIVE_TITLE:?}",
        text.trim()
    );
    Ok(())
}

fn check_ue(config: &StatusConfig, http: &dyn HttpClient) -> Result<()> {
    let url = format!("{}/index", config.hosts.da_ue);
    let response = http.send(HttpRequest::get(&url))?;
    ensure!(
        response.status == 401,
        "da-ue is down. {url} returned {}",
        response.status
    );
    ensure!(
        response.body.contains(UE_CORS_SCRIPT),
        "da-ue is down. Universal editor script not found in {url}"
    );

    let url = format!("{}/scripts/aem.js", config.hosts.da_ue);
    let response = http.send(HttpRequest::get(&url))?;
    ensure!(
        response.is_success() && response.body.contains(UE_INIT_MARKER),
        "da-ue is down. Reverse proxy is not working for {url}"
    );
    Ok(())
}

/// Join the collab test room and expect the synced document to carry the
/// marker text.
fn check_collab_document(config: &StatusConfig, collab: &dyn CollabConnector) -> Result<()> {
    let room = format!(
        "{}/source/da-sites/da-status/tests/wstest.html",
        config.hosts.da_admin
    );
    let url = collab::room_url(&config.hosts.da_collab, &room);
    let mut channel = collab.connect(&url, COLLAB_SYNC_TIMEOUT)?;
    let text = collab::sync_document(channel.as_mut(), PROSEMIRROR_FRAGMENT, COLLAB_SYNC_TIMEOUT)?;
    ensure!(
        text.contains(WS_MARKER),
        "Web socket connection to da-collab not working: looking in {room} for {WS_MARKER} in {text}"
    );
    Ok(())
}
