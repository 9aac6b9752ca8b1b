//! The remote status page as a mutable HTML tree.
//!
//! Service indicators are found either through an explicit
//! `data-status-service="<name>"` anchor or, for pages without anchors, by
//! the layout the page template renders: a list item (or paragraph) naming the
//! service inside a `div` whose next sibling holds the status paragraph.
use crate::status::ServiceStatus;
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use ego_tree::NodeId;
use scraper::node::Text;
use scraper::{ElementRef, Html, Node, Selector};

pub const LAST_UPDATED_PREFIX: &str = "Last updated:";
pub const SERVICE_ANCHOR_ATTR: &str = "data-status-service";

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("invalid selector {css:?}: {err:?}"))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Human-readable UTC timestamp written after `Last updated:`.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub struct StatusPage {
    html: Html,
}

impl StatusPage {
    pub fn parse(text: &str) -> Self {
        Self {
            html: Html::parse_document(text),
        }
    }

    pub fn serialize(&self) -> String {
        self.html.html()
    }

    /// Node whose text is the status of `service`.
    pub fn locate_indicator(&self, service: &str) -> Result<NodeId> {
        if let Some(id) = self.anchored_indicator(service)? {
            return Ok(id);
        }
        if let Some(id) = self.structural_indicator(service)? {
            return Ok(id);
        }
        bail!("status page has no indicator for service {service}")
    }

    #[cfg(test)]
    pub fn indicator_text(&self, service: &str) -> Result<String> {
        let id = self.locate_indicator(service)?;
        let element = self
            .html
            .tree
            .get(id)
            .and_then(ElementRef::wrap)
            .ok_or_else(|| anyhow!("indicator for service {service} is not an element"))?;
        Ok(element_text(element).trim().to_string())
    }

    pub fn set_service_status(&mut self, service: &str, status: ServiceStatus) -> Result<()> {
        let id = self.locate_indicator(service)?;
        self.replace_text(id, status.as_str())
    }

    /// Rewrite the `Last updated:` paragraph and return its new text.
    pub fn set_last_updated(&mut self, now: DateTime<Utc>) -> Result<String> {
        let paragraphs = selector("p")?;
        let targets: Vec<NodeId> = self
            .html
            .select(&paragraphs)
            .filter(|para| {
                element_text(*para)
                    .trim_start()
                    .starts_with(LAST_UPDATED_PREFIX)
            })
            .map(|para| para.id())
            .collect();
        if targets.is_empty() {
            bail!("status page has no {LAST_UPDATED_PREFIX:?} paragraph");
        }
        if targets.len() > 1 {
            tracing::warn!(count = targets.len(), "multiple last-updated paragraphs");
        }

        let text = format!("{LAST_UPDATED_PREFIX} {}", format_timestamp(now));
        for id in targets {
            self.replace_text(id, &text)?;
        }
        Ok(text)
    }

    #[cfg(test)]
    pub fn last_updated_text(&self) -> Result<Option<String>> {
        let paragraphs = selector("p")?;
        Ok(self
            .html
            .select(&paragraphs)
            .map(element_text)
            .map(|text| text.trim().to_string())
            .find(|text| text.starts_with(LAST_UPDATED_PREFIX)))
    }

    fn anchored_indicator(&self, service: &str) -> Result<Option<NodeId>> {
        let anchors: Vec<NodeId> = self
            .html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|element| element.value().attr(SERVICE_ANCHOR_ATTR) == Some(service))
            .map(|element| element.id())
            .collect();
        match anchors.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(*id)),
            _ => bail!(
                "status page has {} {SERVICE_ANCHOR_ATTR} anchors for service {service}",
                anchors.len()
            ),
        }
    }

    fn structural_indicator(&self, service: &str) -> Result<Option<NodeId>> {
        let labels = selector("li, p")?;
        let Some(label) = self
            .html
            .select(&labels)
            .find(|element| element_text(*element).contains(service))
        else {
            return Ok(None);
        };

        let container = label
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|element| element.value().name() == "div")
            .ok_or_else(|| anyhow!("label for service {service} is not inside a div"))?;
        let cell = container
            .next_siblings()
            .find_map(ElementRef::wrap)
            .ok_or_else(|| anyhow!("no status cell follows the label for service {service}"))?;

        let paragraphs = selector("p")?;
        let target = cell.select(&paragraphs).next().unwrap_or(cell);
        Ok(Some(target.id()))
    }

    fn replace_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        let mut node = self
            .html
            .tree
            .get_mut(id)
            .ok_or_else(|| anyhow!("status page node disappeared during update"))?;
        while let Some(mut child) = node.first_child() {
            child.detach();
        }
        node.append(Node::Text(Text { text: text.into() }));
        Ok(())
    }
}

#[cfg(test)]
#[path = "page_tests.rs"]
mod tests;
