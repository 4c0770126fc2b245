//! End-to-end tests of the session layer against an in-process API server.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use educonnect_session::credentials::{
    Credential, CredentialStore, MemoryCredentialStore, RefreshState, SessionEvent,
};
use educonnect_session::filter::{FilterChange, FilterState};
use educonnect_session::{ApiError, CatalogClient, Error};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

mod renewal {
    use super::*;

    #[tokio::test]
    async fn test_expired_token_is_renewed_and_request_replayed() {
        let (api, client, store) = setup().await;
        let mut events = client.subscribe_events();

        let user = client.login("student@example.com", PASSWORD).await.unwrap();
        assert_eq!(user["email"], "student@example.com");

        let profile = client.profile().await.unwrap();
        assert_eq!(profile["email"], "student@example.com");

        assert_eq!(api.refresh_count(), 1);
        assert_eq!(client.coordinator().exchange_count(), 1);
        assert_eq!(client.coordinator().state(), RefreshState::Idle);

        let credential = store.read().await.unwrap();
        assert_eq!(credential.access_token, RENEWED_ACCESS);
        assert_eq!(credential.refresh_token, LOGIN_REFRESH);

        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::Authenticated, SessionEvent::Renewed]
        );
    }

    #[tokio::test]
    async fn test_mutation_body_survives_replay() {
        let (api, client, store) = setup().await;
        client.login("student@example.com", PASSWORD).await.unwrap();

        let saved = client.save_course(3, Some("shortlist")).await.unwrap();

        assert_eq!(saved["course_id"], 3);
        assert_eq!(saved["notes"], "shortlist");
        assert_eq!(api.save_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(api.refresh_count(), 1);
        assert_eq!(
            *api.last_saved.lock(),
            Some(serde_json::json!({"course_id": 3, "notes": "shortlist"}))
        );
        assert_eq!(store.read().await.unwrap().access_token, RENEWED_ACCESS);
    }

    #[tokio::test]
    async fn test_concurrent_rejections_share_one_renewal() {
        let (api, client, store) = setup().await;
        client.login("student@example.com", PASSWORD).await.unwrap();

        let results = futures::future::join_all((1..=8).map(|id| client.course(id))).await;

        for (id, result) in (1..=8).zip(results) {
            assert_eq!(result.unwrap()["id"], id);
        }
        assert_eq!(api.refresh_count(), 1);
        assert_eq!(client.coordinator().exchange_count(), 1);
        assert_eq!(store.read().await.unwrap().access_token, RENEWED_ACCESS);
    }

    #[tokio::test]
    async fn test_rejected_replay_ends_session() {
        let (api, client, store) = setup().await;
        let mut events = client.subscribe_events();
        client.login("student@example.com", PASSWORD).await.unwrap();
        api.reject_all.store(true, Ordering::SeqCst);

        let result = client.profile().await;

        assert_eq!(result, Err(ApiError::AuthExpired));
        assert_eq!(api.refresh_count(), 1);
        assert!(store.read().await.is_none());
        assert!(!client.is_authenticated().await);
        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::Authenticated,
                SessionEvent::Renewed,
                SessionEvent::Expired
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_renewal_expires_every_waiter_once() {
        let (api, client, store) = setup().await;
        let mut events = client.subscribe_events();
        client.login("student@example.com", PASSWORD).await.unwrap();
        api.refresh_fails.store(true, Ordering::SeqCst);

        let results = futures::future::join_all((1..=5).map(|id| client.course(id))).await;

        assert!(results.iter().all(|r| *r == Err(ApiError::AuthExpired)));
        assert_eq!(api.refresh_count(), 1);
        assert!(store.read().await.is_none());
        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::Authenticated, SessionEvent::Expired]
        );

        // A fresh login starts a new session.
        api.refresh_fails.store(false, Ordering::SeqCst);
        client.login("student@example.com", PASSWORD).await.unwrap();
        assert!(client.profile().await.is_ok());
        assert_eq!(api.refresh_count(), 2);
        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::Authenticated, SessionEvent::Renewed]
        );
    }

    #[tokio::test]
    async fn test_missing_refresh_token_skips_exchange() {
        let api = MockApi::new();
        let addr = spawn_server(Arc::clone(&api)).await;
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new(
            LOGIN_ACCESS,
            "",
        )));
        let client = client_with(addr, Arc::clone(&store));

        assert_eq!(client.profile().await, Err(ApiError::AuthExpired));
        assert_eq!(api.refresh_count(), 0);
        assert_eq!(client.coordinator().exchange_count(), 0);
        assert!(store.read().await.is_none());
    }

    #[tokio::test]
    async fn test_bad_login_is_not_renewed() {
        let (api, client, store) = setup().await;

        let result = client.login("student@example.com", "wrong").await;

        assert!(matches!(
            result,
            Err(Error::Api(ApiError::Validation { status: 401, .. }))
        ));
        assert_eq!(api.refresh_count(), 0);
        assert!(store.read().await.is_none());
    }
}

mod transport {
    use super::*;

    #[tokio::test]
    async fn test_client_errors_and_server_errors_are_classified() {
        let (api, client, _store) = setup().await;

        match client.compare(&[]).await {
            Err(ApiError::Validation { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("This list may not be empty."));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(
            client.statistics().await,
            Err(ApiError::Server {
                status: 500,
                body: "boom".to_string()
            })
        );
        assert_eq!(api.refresh_count(), 0);

        let compared = client.compare(&[1, 2]).await.unwrap();
        assert_eq!(compared["courses"], serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn test_anonymous_endpoints_never_carry_a_credential() {
        let (api, client, _store) = setup().await;

        client.login("student@example.com", PASSWORD).await.unwrap();
        client.profile().await.unwrap();
        // Logged in now; these must still go out bare.
        client.login("student@example.com", PASSWORD).await.unwrap();
        client
            .register(serde_json::json!({"email": "new@example.com"}))
            .await
            .unwrap();

        assert_eq!(api.anonymous_with_auth.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_with(addr, Arc::new(MemoryCredentialStore::new()));
        let result = client.courses(&FilterState::default()).await;

        assert!(matches!(result, Err(ApiError::Network(_))));
        assert!(client.cache().is_empty());
    }
}

mod caching {
    use super::*;

    #[tokio::test]
    async fn test_equivalent_filters_share_one_request() {
        let (api, client, _store) = setup().await;
        api.set_course_delay(Duration::from_millis(50));

        let a = FilterState::default().with(FilterChange::Level(vec!["master".into(), "phd".into()]));
        let b = FilterState::default().with(FilterChange::Level(vec!["phd".into(), "master".into()]));

        let (first, second) = tokio::join!(client.courses(&a), client.courses(&b));
        let first = first.unwrap();
        assert_eq!(first, second.unwrap());
        assert_eq!(api.course_list_calls.load(Ordering::SeqCst), 1);

        let query = first.results[0]["query"].as_str().unwrap();
        assert!(query.contains("level=master%2Cphd"), "{query}");
        assert!(query.contains("ordering=-popularity_score"), "{query}");

        client.courses(&a).await.unwrap();
        assert_eq!(api.course_list_calls.load(Ordering::SeqCst), 1);

        client
            .courses(&a.clone().with(FilterChange::Page(2)))
            .await
            .unwrap();
        assert_eq!(api.course_list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_saving_a_course_invalidates_lists() {
        let (api, client, _store) = setup().await;
        client.login("student@example.com", PASSWORD).await.unwrap();

        let filters = FilterState::default();
        client.courses(&filters).await.unwrap();
        client.saved_courses().await.unwrap();
        client.saved_courses().await.unwrap();
        assert_eq!(api.course_list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.saved_list_calls.load(Ordering::SeqCst), 1);

        let saved = client.save_course(3, Some("shortlist")).await.unwrap();
        assert_eq!(saved["notes"], "shortlist");

        client.saved_courses().await.unwrap();
        client.courses(&filters).await.unwrap();
        assert_eq!(api.saved_list_calls.load(Ordering::SeqCst), 2);
        assert_eq!(api.course_list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_logout_drops_session_data() {
        let (_api, client, store) = setup().await;
        let mut events = client.subscribe_events();
        client.login("student@example.com", PASSWORD).await.unwrap();
        client.saved_courses().await.unwrap();
        assert!(!client.cache().is_empty());

        client.logout().await.unwrap();

        assert!(client.cache().is_empty());
        assert!(store.read().await.is_none());
        assert_eq!(drain(&mut events).last(), Some(&SessionEvent::LoggedOut));
    }

    #[tokio::test]
    async fn test_cancelled_fetch_leaves_nothing_behind() {
        let (api, client, _store) = setup().await;
        api.set_course_delay(Duration::from_millis(300));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let filters = FilterState::default().with(FilterChange::Search("ai".into()));
        let result = client.courses_cancellable(&filters, &cancel).await;

        assert_eq!(result, Err(ApiError::Cancelled));
        assert!(client.cache().is_empty());
        assert!(!client.cache().has_in_flight(&filters.query_key()));
    }
}

mod filters {
    use super::*;

    #[tokio::test]
    async fn test_controller_drives_course_queries() {
        let (api, client, _store) = setup().await;
        let controller = client.filter_controller();
        let mut rx = controller.subscribe();

        controller.set_search("data");
        rx.changed().await.unwrap();
        let query = rx.borrow_and_update().clone();
        assert_eq!(controller.query_string(), "search=data");

        let page = client.courses(&query.filters).await.unwrap();
        assert!(controller.is_current(query.generation));
        assert_eq!(page.count, 1);

        controller.update(FilterChange::IsOnline(Some(true)));
        assert!(!controller.is_current(query.generation));
        assert_eq!(controller.query_string(), "search=data&is_online=true");
        assert_eq!(api.course_list_calls.load(Ordering::SeqCst), 1);
    }
}

mod persistence {
    use super::*;

    #[tokio::test]
    async fn test_file_store_survives_restart() {
        let api = MockApi::new();
        let addr = spawn_server(Arc::clone(&api)).await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = config_for(addr);
        config.credential_store_path = dir.path().join("credentials.json");

        let client = CatalogClient::from_config(config.clone()).await.unwrap();
        client.login("student@example.com", PASSWORD).await.unwrap();
        client.profile().await.unwrap();
        drop(client);

        let restarted = CatalogClient::from_config(config).await.unwrap();
        assert!(restarted.is_authenticated().await);
        let credential = restarted.coordinator().store().read().await.unwrap();
        assert_eq!(credential.access_token, RENEWED_ACCESS);

        // The renewed token is accepted without another exchange.
        restarted.profile().await.unwrap();
        assert_eq!(api.refresh_count(), 1);
    }
}
