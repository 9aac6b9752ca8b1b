//! JUnit-style test report loading.
//!
//! Only `testcase` elements matter: their `name`/`classname` attributes and
//! whether they carry direct `failure` or `error` children.
use anyhow::{anyhow, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub classname: String,
    /// Count of direct `failure`/`error` children.
    pub failures: usize,
}

impl TestCase {
    pub fn passed(&self) -> bool {
        self.failures == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestReport {
    cases: Vec<TestCase>,
}

impl TestReport {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read test report {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse test report {}", path.display()))
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut cases = Vec::new();
        let mut saw_element = false;
        // Open testcase plus nesting depth below it.
        let mut open: Option<(TestCase, usize)> = None;

        loop {
            let event = reader.read_event().context("malformed XML")?;
            match event {
                Event::Start(start) => {
                    saw_element = true;
                    match open.as_mut() {
                        Some((case, depth)) => {
                            if *depth == 0 && is_failure(&start) {
                                case.failures += 1;
                            }
                            *depth += 1;
                        }
                        None if is_testcase(&start) => open = Some((test_case(&start)?, 0)),
                        None => {}
                    }
                }
                Event::Empty(empty) => {
                    saw_element = true;
                    match open.as_mut() {
                        Some((case, 0)) if is_failure(&empty) => case.failures += 1,
                        Some(_) => {}
                        None if is_testcase(&empty) => cases.push(test_case(&empty)?),
                        None => {}
                    }
                }
                Event::End(_) => match open.take() {
                    Some((case, 0)) => cases.push(case),
                    Some((case, depth)) => open = Some((case, depth - 1)),
                    None => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some((case, _)) = open {
            return Err(anyhow!("testcase {:?} is never closed", case.name));
        }
        if !saw_element {
            return Err(anyhow!("test report contains no XML elements"));
        }
        Ok(Self { cases })
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Every case with exactly this `name`.
    pub fn cases_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TestCase> + 'a {
        self.cases.iter().filter(move |case| case.name == name)
    }

    /// Every case whose `classname` is exactly `classname`.
    pub fn cases_in_class<'a>(
        &'a self,
        classname: &'a str,
    ) -> impl Iterator<Item = &'a TestCase> + 'a {
        self.cases
            .iter()
            .filter(move |case| case.classname == classname)
    }
}

fn is_testcase(element: &BytesStart<'_>) -> bool {
    element.local_name().as_ref() == b"testcase"
}

fn is_failure(element: &BytesStart<'_>) -> bool {
    matches!(element.local_name().as_ref(), b"failure" | b"error")
}

fn test_case(element: &BytesStart<'_>) -> Result<TestCase> {
    Ok(TestCase {
        name: attribute(element, "name")?,
        classname: attribute(element, "classname")?,
        failures: 0,
    })
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Result<String> {
    match element
        .try_get_attribute(key)
        .with_context(|| format!("read testcase attribute {key}"))?
    {
        Some(attr) => Ok(attr
            .unescape_value()
            .with_context(|| format!("decode testcase attribute {key}"))?
            .into_owned()),
        None => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOCHA_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites name="Mocha Tests" tests="4" failures="1">
  <testsuite name="Ping Suite" tests="3" failures="1">
    <testcase name="Ping da-admin" classname="Ping da-admin" time="0.1"/>
    <testcase name="Ping da-collab" classname="Ping da-collab" time="0.2">
      <failure message="da-collab is down" type="AssertionError"><![CDATA[AssertionError: da-collab is down]]></failure>
    </testcase>
    <testcase name="Ping da-live &amp; friends" classname="Ping da-live" time="0.1">
      <system-out>warmup</system-out>
    </testcase>
  </testsuite>
  <testsuite name="Test da-collab" tests="1" failures="0">
    <testcase name="Test YDoc WebSocket connection" classname="Test da-collab" time="0.4"></testcase>
  </testsuite>
</testsuites>
"#;

    #[test]
    fn parses_cases_and_failure_children() {
        let report = TestReport::parse(MOCHA_REPORT).expect("parse report");
        assert_eq!(report.cases().len(), 4);

        let admin = report.cases_named("Ping da-admin").next().expect("admin");
        assert!(admin.passed());

        let collab = report.cases_named("Ping da-collab").next().expect("collab");
        assert_eq!(collab.failures, 1);
        assert!(!collab.passed());
    }

    #[test]
    fn non_failure_children_do_not_fail_a_case() {
        let report = TestReport::parse(MOCHA_REPORT).expect("parse report");
        let live = report
            .cases_named("Ping da-live & friends")
            .next()
            .expect("entity-decoded name");
        assert!(live.passed());
    }

    #[test]
    fn finds_cases_by_classname() {
        let report = TestReport::parse(MOCHA_REPORT).expect("parse report");
        let names: Vec<_> = report
            .cases_in_class("Test da-collab")
            .map(|case| case.name.as_str())
            .collect();
        assert_eq!(names, vec!["Test YDoc WebSocket connection"]);
    }

    #[test]
    fn error_elements_count_as_failures() {
        let xml = r#"<testsuite><testcase name="Ping da-ue" classname="c"><error message="boom"/></testcase></testsuite>"#;
        let report = TestReport::parse(xml).expect("parse report");
        assert!(!report.cases()[0].passed());
    }

    #[test]
    fn nested_failure_below_a_child_is_not_direct() {
        let xml = r#"<testsuite><testcase name="x" classname="c"><properties><failure/></properties></testcase></testsuite>"#;
        let report = TestReport::parse(xml).expect("parse report");
        assert!(report.cases()[0].passed());
    }

    #[test]
    fn rejects_malformed_and_empty_documents() {
        assert!(TestReport::parse("<testsuite><testcase name=\"x\"></testsuite>").is_err());
        assert!(TestReport::parse("").is_err());
        assert!(TestReport::parse("not xml at all").is_err());
    }

    #[test]
    fn load_reports_missing_file_path() {
        let err = TestReport::load(Path::new("/nonexistent/report.xml")).expect_err("missing");
        assert!(err.to_string().contains("read test report /nonexistent/report.xml"));
    }
}
