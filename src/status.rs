//! Service up/down evaluation from a test report.
use crate::config::Settings;
use crate::report::{TestCase, TestReport};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Up,
    Down,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Up => "up",
            ServiceStatus::Down => "down",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReport {
    pub service: String,
    pub status: ServiceStatus,
}

pub fn ping_case_name(service: &str) -> String {
    format!("Ping {service}")
}

pub fn detail_classname(service: &str) -> String {
    format!("Test {service}")
}

/// A service is up when its ping case exists and passed and, if detailed
/// checks are enabled, every case in its `Test <service>` class passed.
pub fn service_status(report: &TestReport, service: &str, detailed: bool) -> ServiceStatus {
    let ping_name = ping_case_name(service);
    let mut pings = report.cases_named(&ping_name).peekable();
    let ping_ok = pings.peek().is_some() && pings.all(TestCase::passed);

    let detail_class = detail_classname(service);
    let detail_ok = !detailed || report.cases_in_class(&detail_class).all(TestCase::passed);

    if ping_ok && detail_ok {
        ServiceStatus::Up
    } else {
        ServiceStatus::Down
    }
}

/// Status of every configured service, in configured order.
pub fn evaluate(report: &TestReport, settings: &Settings) -> Vec<ServiceReport> {
    settings
        .services
        .iter()
        .map(|service| ServiceReport {
            service: service.clone(),
            status: service_status(report, service, settings.detailed_checks),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(xml_cases: &str) -> TestReport {
        TestReport::parse(&format!("<testsuites>{xml_cases}</testsuites>")).expect("parse report")
    }

    #[test]
    fn all_passing_cases_mean_every_service_is_up() {
        let report = report(
            r#"<testcase name="Ping da-admin" classname="Ping Suite"/>
               <testcase name="Ping da-collab" classname="Ping Suite"/>
               <testcase name="Test YDoc WebSocket connection" classname="Test da-collab"/>"#,
        );
        let settings = Settings {
            services: vec!["da-admin".to_string(), "da-collab".to_string()],
            ..Settings::default()
        };
        let statuses = evaluate(&report, &settings);
        assert!(statuses.iter().all(|entry| entry.status == ServiceStatus::Up));
        assert_eq!(statuses[0].service, "da-admin");
        assert_eq!(statuses[1].service, "da-collab");
    }

    #[test]
    fn failing_ping_marks_service_down() {
        let report = report(
            r#"<testcase name="Ping da-admin" classname="Ping Suite"><failure/></testcase>"#,
        );
        assert_eq!(service_status(&report, "da-admin", true), ServiceStatus::Down);
    }

    #[test]
    fn missing_ping_case_marks_service_down() {
        let report = report(r#"<testcase name="Ping da-admin" classname="Ping Suite"/>"#);
        assert_eq!(service_status(&report, "da-live", true), ServiceStatus::Down);
    }

    #[test]
    fn failing_detailed_case_marks_service_down_only_when_enabled() {
        let report = report(
            r#"<testcase name="Ping da-collab" classname="Ping Suite"/>
               <testcase name="Test YDoc WebSocket connection" classname="Test da-collab"><failure/></testcase>"#,
        );
        assert_eq!(service_status(&report, "da-collab", true), ServiceStatus::Down);
        assert_eq!(service_status(&report, "da-collab", false), ServiceStatus::Up);
    }

    #[test]
    fn status_renders_as_literal_page_text() {
        assert_eq!(ServiceStatus::Up.to_string(), "up");
        assert_eq!(ServiceStatus::Down.as_str(), "down");
    }
}
