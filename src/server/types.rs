//! Request and response types for the backend API.
//!
//! Field names follow the backend's camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profile submitted when a device registers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    /// Device identity, the backend's primary key.
    pub device_id: String,
    /// Optional real name.
    pub name: Option<String>,
    /// Optional email address.
    pub email: Option<String>,
    /// Display name.
    pub nickname: String,
}

impl DeviceProfile {
    /// Profile with only the required fields.
    pub fn new(device_id: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: None,
            email: None,
            nickname: nickname.into(),
        }
    }
}

/// Body of `POST /api/users/register`.
///
/// Optional fields are sent as explicit `null`s.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    /// Device identity.
    pub device_id: String,
    /// Real name or `null`.
    pub name: Option<String>,
    /// Email or `null`.
    pub email: Option<String>,
    /// Display name.
    pub nickname: String,
    /// Current push token or `null`.
    pub fcm_token: Option<String>,
    /// Always `null`; devices register without a password.
    pub password: Option<String>,
}

impl RegisterPayload {
    /// Build the payload from a profile and the resolved token.
    ///
    /// Empty optional strings are normalized to `null`.
    pub fn new(profile: &DeviceProfile, fcm_token: Option<String>) -> Self {
        let non_empty = |s: &Option<String>| s.clone().filter(|v| !v.is_empty());
        Self {
            device_id: profile.device_id.clone(),
            name: non_empty(&profile.name),
            email: non_empty(&profile.email),
            nickname: profile.nickname.clone(),
            fcm_token: fcm_token.filter(|t| !t.is_empty()),
            password: None,
        }
    }
}

/// Body of `PUT /api/users/{deviceId}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUpdatePayload {
    /// The push token to record.
    pub fcm_token: String,
}

/// Body of `POST /api/v1/fcm/send`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestNotificationPayload {
    /// Addressing mode; always `"token"`.
    pub target_type: String,
    /// Device whose token receives the push.
    pub device_id: String,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Data payload.
    pub data: TestNotificationData,
}

/// Data payload of a test notification.
#[derive(Debug, Clone, Serialize)]
pub struct TestNotificationData {
    /// Notification kind; always `"test"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// Envelope returned by every backend endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiResponse {
    /// Application-level acknowledgement.
    #[serde(default)]
    pub success: bool,
    /// Human-readable explanation, mostly on failure.
    #[serde(default)]
    pub message: Option<String>,
    /// Endpoint-specific payload.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Backend record created by a registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRecord {
    /// Record identifier (`data.id`), if the server returned one.
    pub id: Option<String>,
    /// The full `data` object.
    pub data: Value,
}

impl ServerRecord {
    /// Extract the record from a response's `data` field.
    pub fn from_data(data: Option<Value>) -> Self {
        let data = data.unwrap_or(Value::Null);
        let id = match data.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        Self { id, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_payload_nulls() {
        let profile = DeviceProfile {
            device_id: "d1".into(),
            name: Some(String::new()),
            email: None,
            nickname: "Ann".into(),
        };
        let payload = RegisterPayload::new(&profile, None);
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            value,
            json!({
                "deviceId": "d1",
                "name": null,
                "email": null,
                "nickname": "Ann",
                "fcmToken": null,
                "password": null,
            })
        );
    }

    #[test]
    fn test_register_payload_with_token() {
        let payload = RegisterPayload::new(&DeviceProfile::new("d1", "Ann"), Some("tok-A".into()));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["fcmToken"], "tok-A");
    }

    #[test]
    fn test_test_notification_payload_shape() {
        let payload = TestNotificationPayload {
            target_type: "token".into(),
            device_id: "d1".into(),
            title: "t".into(),
            body: "b".into(),
            data: TestNotificationData {
                kind: "test".into(),
                timestamp: "2026-01-01T00:00:00Z".into(),
            },
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["targetType"], "token");
        assert_eq!(value["deviceId"], "d1");
        assert_eq!(value["data"]["type"], "test");
    }

    #[test]
    fn test_api_response_defaults() {
        let resp: ApiResponse = serde_json::from_str("{}").unwrap();
        assert!(!resp.success);
        assert!(resp.message.is_none());

        let resp: ApiResponse =
            serde_json::from_str(r#"{"success": true, "data": {"id": "u1"}}"#).unwrap();
        assert!(resp.success);
        assert_eq!(ServerRecord::from_data(resp.data).id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_server_record_numeric_and_missing_id() {
        assert_eq!(
            ServerRecord::from_data(Some(json!({"id": 12}))).id.as_deref(),
            Some("12")
        );
        let record = ServerRecord::from_data(None);
        assert_eq!(record.id, None);
        assert_eq!(record.data, Value::Null);
    }
}
