//! Notification payloads as seen by the application.
//!
//! Platform events carry optional `title`, `body` and `data` fields. This
//! module normalizes them into a [`NotificationEvent`] with defaults filled
//! in, so the router and the banner never deal with missing fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::DEFAULT_NOTIFICATION_TITLE;

/// Arbitrary key-value payload attached to a notification.
pub type NotificationData = Map<String, Value>;

/// Raw notification content as delivered by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformNotification {
    /// Title, if the sender set one.
    #[serde(default)]
    pub title: Option<String>,
    /// Body text, if the sender set one.
    #[serde(default)]
    pub body: Option<String>,
    /// Data payload, if the sender set one.
    #[serde(default)]
    pub data: Option<NotificationData>,
}

impl PlatformNotification {
    /// Content with a title and body and no data.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            body: Some(body.into()),
            data: None,
        }
    }

    /// Attach a data payload.
    pub fn with_data(mut self, data: NotificationData) -> Self {
        self.data = Some(data);
        self
    }
}

/// A notification being handled by the application.
///
/// Ephemeral: exists only while it is routed and displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Title, defaulted to a generic label when absent.
    pub title: String,
    /// Body text, empty when absent.
    pub body: String,
    /// Data payload, empty when absent.
    pub data: NotificationData,
}

impl NotificationEvent {
    /// Build an event, keeping the given fields as-is.
    pub fn new(title: impl Into<String>, body: impl Into<String>, data: NotificationData) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data,
        }
    }

    /// Identifier of the news article this notification points at, if any.
    ///
    /// Accepts both string and numeric `newsId` values.
    pub fn news_id(&self) -> Option<String> {
        match self.data.get("newsId")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

impl From<PlatformNotification> for NotificationEvent {
    fn from(content: PlatformNotification) -> Self {
        Self {
            title: content
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_NOTIFICATION_TITLE.to_string()),
            body: content.body.unwrap_or_default(),
            data: content.data.unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.body.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{}: {}", self.title, self.body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> NotificationData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let event = NotificationEvent::from(PlatformNotification::default());
        assert_eq!(event.title, "Notification");
        assert_eq!(event.body, "");
        assert!(event.data.is_empty());
    }

    #[test]
    fn test_empty_title_is_defaulted() {
        let content = PlatformNotification {
            title: Some(String::new()),
            body: Some("body".into()),
            data: None,
        };
        let event = NotificationEvent::from(content);
        assert_eq!(event.title, "Notification");
        assert_eq!(event.body, "body");
    }

    #[test]
    fn test_fields_are_kept() {
        let content = PlatformNotification::new("Breaking", "Something happened")
            .with_data(data(json!({"newsId": "42"})));
        let event = NotificationEvent::from(content);
        assert_eq!(event.title, "Breaking");
        assert_eq!(event.body, "Something happened");
        assert_eq!(event.news_id().as_deref(), Some("42"));
    }

    #[test]
    fn test_news_id_numeric_and_missing() {
        let event = NotificationEvent::new("t", "b", data(json!({"newsId": 7})));
        assert_eq!(event.news_id().as_deref(), Some("7"));

        let event = NotificationEvent::new("t", "b", data(json!({"newsId": null})));
        assert_eq!(event.news_id(), None);

        let event = NotificationEvent::new("t", "b", NotificationData::new());
        assert_eq!(event.news_id(), None);
    }

    #[test]
    fn test_display() {
        let event = NotificationEvent::new("Title", "", NotificationData::new());
        assert_eq!(event.to_string(), "Title");
        let event = NotificationEvent::new("Title", "Body", NotificationData::new());
        assert_eq!(event.to_string(), "Title: Body");
    }

    #[test]
    fn test_platform_notification_deserialize_partial() {
        let content: PlatformNotification = serde_json::from_str(r#"{"body": "hi"}"#).unwrap();
        assert_eq!(content.title, None);
        assert_eq!(content.body.as_deref(), Some("hi"));
    }
}
