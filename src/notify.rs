//! Chat notifications.
//!
//! Delivery is best effort: failures are logged and swallowed so a broken
//! notification path never hides the error being reported.
use crate::config::{StatusConfig, SLACK_POST_MESSAGE_URL};
use crate::http::{HttpClient, HttpRequest};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct ChatNotifier<'a> {
    http: &'a dyn HttpClient,
    token: Option<String>,
    channel: String,
}

impl<'a> ChatNotifier<'a> {
    pub fn from_config(config: &StatusConfig, http: &'a dyn HttpClient) -> Self {
        Self {
            http,
            token: config.slack_token.clone(),
            channel: config.slack_channel.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    pub fn notify(&self, message: &str) {
        let Some(token) = self.token.as_deref() else {
            tracing::warn!(text = message, "SLACK_TOKEN not set, notification skipped");
            return;
        };

        let request = HttpRequest::post(SLACK_POST_MESSAGE_URL)
            .bearer(Some(token))
            .query("channel", &self.channel)
            .query("text", message);
        let response = match self.http.send(request) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "chat notification failed");
                return;
            }
        };
        if response.status != 200 {
            tracing::error!(status = response.status, "chat notification rejected");
            return;
        }
        match response.json::<PostMessageResponse>() {
            Ok(reply) if reply.ok => {
                tracing::info!(channel = %self.channel, "chat notification sent");
            }
            Ok(reply) => tracing::error!(
                error = reply.error.as_deref().unwrap_or("unknown"),
                "chat notification refused"
            ),
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "chat notification reply unreadable");
            }
        }
    }
}

pub fn service_down_message(service: &str) -> String {
    format!("Alert: {service} is down")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::http::fake::FakeHttp;
    use crate::http::Method;

    fn config(token: Option<&str>) -> StatusConfig {
        let token = token.map(str::to_string);
        StatusConfig::from_lookup(Settings::default(), move |key| match key {
            "SLACK_TOKEN" => token.clone(),
            "SLACK_CHANNEL" => Some("ops".to_string()),
            _ => None,
        })
        .expect("config")
    }

    #[test]
    fn without_token_nothing_is_sent() {
        let http = FakeHttp::new();
        let notifier = ChatNotifier::from_config(&config(None), &http);
        assert!(!notifier.is_enabled());
        notifier.notify("hello");
        assert!(http.requests().is_empty());
    }

    #[test]
    fn sends_authenticated_message_to_channel() {
        let http = FakeHttp::new();
        http.respond(Method::Post, SLACK_POST_MESSAGE_URL, 200, r#"{"ok":true}"#);
        let notifier = ChatNotifier::from_config(&config(Some("xoxb-test")), &http);

        notifier.notify(&service_down_message("da-live"));

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.header_value("Authorization"), Some("Bearer xoxb-test"));
        assert!(request
            .query
            .contains(&("channel".to_string(), "ops".to_string())));
        assert!(request
            .query
            .contains(&("text".to_string(), "Alert: da-live is down".to_string())));
    }

    #[test]
    fn delivery_failures_are_swallowed() {
        let http = FakeHttp::new();
        http.fail(Method::Post, SLACK_POST_MESSAGE_URL, "connection reset");
        let notifier = ChatNotifier::from_config(&config(Some("xoxb-test")), &http);
        notifier.notify("still returns");

        let http = FakeHttp::new();
        http.respond(
            Method::Post,
            SLACK_POST_MESSAGE_URL,
            200,
            r#"{"ok":false,"error":"channel_not_found"}"#,
        );
        let notifier = ChatNotifier::from_config(&config(Some("xoxb-test")), &http);
        notifier.notify("still returns");
        assert_eq!(http.requests().len(), 1);
    }
}
