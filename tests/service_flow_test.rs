//! End-to-end flows through the push service with a mock backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pushlink::platform::{EventStream, PermissionStatus, SharedPlatform, StaticPlatform};
use pushlink::store::{DeviceState, KeyValueStore, MemoryStore, SharedStore};
use pushlink::{
    Config, DeviceProfile, NoticeLevel, NotificationEvent, PlatformNotification, PushService,
    RegistrationStatus, RetryPolicy,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    service: PushService,
    platform: Arc<StaticPlatform>,
    store: SharedStore,
}

fn harness(server_url: &str, platform: StaticPlatform) -> Harness {
    let platform = Arc::new(platform);
    let store = MemoryStore::shared();
    let config = Config {
        server_url: server_url.to_string(),
        ..Config::default()
    };
    let service = PushService::new(
        config,
        Arc::clone(&platform) as SharedPlatform,
        Arc::clone(&store),
    )
    .unwrap()
    .with_retry_policy(RetryPolicy::linear(3, Duration::from_millis(10)));
    Harness {
        service,
        platform,
        store,
    }
}

fn ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"success": true}))
}

#[tokio::test]
async fn test_start_sends_token_when_registered() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/users/d1"))
        .and(body_json(json!({"fcmToken": "tok-A"})))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri(), StaticPlatform::new(Some("tok-A".into())));
    DeviceState::new(Arc::clone(&h.store))
        .mark_registered("d1")
        .unwrap();

    let report = h.service.start().await;
    assert_eq!(report.token.as_deref(), Some("tok-A"));
    assert_eq!(report.status, RegistrationStatus::RegisteredWithToken);
    assert_eq!(report.token_sent, Some(true));

    h.service.shutdown().await;
}

#[tokio::test]
async fn test_start_failure_is_silent() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri(), StaticPlatform::new(Some("tok-A".into())));
    DeviceState::new(Arc::clone(&h.store))
        .mark_registered("d1")
        .unwrap();

    let report = h.service.start().await;
    assert_eq!(report.token_sent, Some(false));
    assert!(h.service.is_running());

    h.service.shutdown().await;
}

#[tokio::test]
async fn test_register_persists_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/register"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"id": "u1"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri(), StaticPlatform::new(Some("tok-A".into())));
    assert_eq!(
        h.service.registration_status(),
        RegistrationStatus::NotRegistered
    );

    let record = h
        .service
        .register(&DeviceProfile::new("d1", "Ann"))
        .await
        .unwrap();
    assert_eq!(record.id.as_deref(), Some("u1"));
    assert_eq!(h.service.device_id().as_deref(), Some("d1"));
    assert_eq!(h.store.get("setupCompleted").unwrap().as_deref(), Some("true"));
    // The token resolved for the registration was persisted.
    assert_eq!(
        h.service.registration_status(),
        RegistrationStatus::RegisteredWithToken
    );
}

#[tokio::test]
async fn test_failed_registration_persists_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false, "message": "dup"})))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), StaticPlatform::new(Some("tok-A".into())));
    let err = h
        .service
        .register(&DeviceProfile::new("d1", "Ann"))
        .await
        .unwrap_err();

    assert_eq!(err.server_message(), Some("dup"));
    assert_eq!(h.service.device_id(), None);
}

#[tokio::test]
async fn test_permission_denied_leaves_stored_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ok())
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(
        &server.uri(),
        StaticPlatform::new(Some("tok-B".into())).with_permission(PermissionStatus::Denied),
    );
    h.store.set("fcmToken", "tok-A").unwrap();
    DeviceState::new(Arc::clone(&h.store))
        .mark_registered("d1")
        .unwrap();

    let notice = h.service.enable_notifications().await;
    assert_eq!(notice.level, NoticeLevel::Warning);
    assert_eq!(h.platform.issue_count(), 0);
    assert_eq!(h.service.stored_token().as_deref(), Some("tok-A"));
}

#[tokio::test]
async fn test_enable_notifications_updates_backend() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/users/d1"))
        .and(body_json(json!({"fcmToken": "tok-A"})))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri(), StaticPlatform::new(Some("tok-A".into())));
    DeviceState::new(Arc::clone(&h.store))
        .mark_registered("d1")
        .unwrap();

    let notice = h.service.enable_notifications().await;
    assert_eq!(notice.level, NoticeLevel::Info);
    assert_eq!(notice.title, "Done");
}

#[tokio::test]
async fn test_refresh_token_partial_success() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/users/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&server.uri(), StaticPlatform::new(Some("tok-new".into())));
    h.store.set("fcmToken", "tok-old").unwrap();
    DeviceState::new(Arc::clone(&h.store))
        .mark_registered("d1")
        .unwrap();

    let notice = h.service.refresh_token().await;
    assert_eq!(notice.level, NoticeLevel::Warning);
    assert_eq!(notice.title, "Partially completed");
    assert_eq!(h.service.stored_token().as_deref(), Some("tok-new"));
}

#[tokio::test]
async fn test_send_test_notification_with_permission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/fcm/send"))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(
        &server.uri(),
        StaticPlatform::new(None).with_permission(PermissionStatus::Granted),
    );
    DeviceState::new(Arc::clone(&h.store))
        .mark_registered("d1")
        .unwrap();

    let notice = h.service.send_test_notification(None).await;
    assert_eq!(notice.level, NoticeLevel::Info);
    assert_eq!(notice.title, "Test notification sent");
}

#[tokio::test]
async fn test_host_service_sends_test_notification() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/fcm/send"))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    // Built the same way as the CLI: a host platform with no OS prompt.
    let store = MemoryStore::shared();
    let config = Config {
        server_url: server.uri(),
        ..Config::default()
    };
    let (service, platform) = PushService::host(config, Arc::clone(&store)).unwrap();
    DeviceState::new(store).mark_registered("d1").unwrap();

    let notice = service.send_test_notification(Some("hello")).await;
    assert_eq!(notice.level, NoticeLevel::Info);
    assert_eq!(notice.title, "Test notification sent");
    assert_eq!(platform.prompt_count(), 0);
}

#[tokio::test]
async fn test_notifications_route_to_banner_and_tap_handler() {
    let h = harness("http://127.0.0.1:9", StaticPlatform::new(None));
    let taps: Arc<Mutex<Vec<NotificationEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&taps);
    let _tap = h.service.router().set_tap_handler(move |event| {
        sink.lock().unwrap().push(event.clone());
    });
    h.service.start().await;

    h.platform.deliver(
        EventStream::Received,
        &PlatformNotification::new("First", "one"),
    );
    h.platform.deliver(
        EventStream::Received,
        &PlatformNotification::new("Second", "two"),
    );
    let state = h.service.banner().state();
    assert!(state.visible);
    assert_eq!(state.current.map(|e| e.title), Some("Second".to_string()));

    let data = json!({"newsId": "42"}).as_object().cloned().unwrap();
    h.platform.deliver(
        EventStream::Tapped,
        &PlatformNotification::new("Tap", "me").with_data(data),
    );
    let taps = taps.lock().unwrap().clone();
    assert_eq!(taps.len(), 1);
    assert_eq!(taps[0].news_id().as_deref(), Some("42"));

    h.service.shutdown().await;
    h.service.shutdown().await;
    assert_eq!(h.platform.subscription_count(), 0);
}
