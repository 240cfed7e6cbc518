#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
// self
use session_bridge::{
	_preludet::*,
	auth::{ApplicationToken, UserId},
	http::ReqwestHttpClient,
	realtime::NotificationFeed,
	state::AuthState,
	store::{MemoryStore, TokenStore},
};

const EXCHANGE_PATH: &str = "/api/auth/supabase-login";
const APPOINTMENTS_PATH: &str = "/api/appointments";

type TestState = AuthState<ReqwestHttpClient>;

fn exchange_body(token: &str) -> String {
	serde_json::json!({
		"success": true,
		"data": {
			"token": token,
			"user": {
				"id": 7,
				"supabaseId": "identity-a",
				"fullName": "Dana Reyes",
				"email": "dana@example.com",
				"role": "USER"
			}
		}
	})
	.to_string()
}

async fn signed_in_state(
	server: &MockServer,
	cached: Option<&str>,
) -> (Arc<TestState>, Arc<MemoryStore>, Arc<StaticProvider>) {
	let session = session_for("identity-a", "cred-1");
	let provider = Arc::new(StaticProvider::with_session(session.clone()));
	let (bridge, store) = build_reqwest_test_bridge(&server.url("/api"), provider.clone());

	if let Some(token) = cached {
		store
			.set(ApplicationToken::new(token, session.user_projection()))
			.await
			.expect("Seeding the slot should work.");
	}

	let state = Arc::new(AuthState::new(provider.clone(), Arc::new(bridge)));

	state.login(session.user_projection(), session);

	(state, store, provider)
}

#[tokio::test]
async fn rejected_call_refreshes_and_replays_with_the_new_token() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("fresh"));
		})
		.await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path(APPOINTMENTS_PATH).header("authorization", "Bearer stale");
			then.status(401).body(r#"{"success":false,"message":"Token expired"}"#);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path(APPOINTMENTS_PATH).header("authorization", "Bearer fresh");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"success":true,"data":[{"id":1},{"id":2}]}"#);
		})
		.await;
	let (state, store, provider) = signed_in_state(&server, Some("stale")).await;

	assert!(state.view().is_loading);

	let appointments = state
		.gateway()
		.get_json::<Vec<serde_json::Value>>("appointments")
		.await
		.expect("Replayed call should succeed.");

	assert_eq!(appointments.len(), 2);

	exchange.assert_calls_async(1).await;
	stale.assert_calls_async(1).await;
	fresh.assert_calls_async(1).await;

	assert_eq!(store.snapshot().map(|token| token.token.expose().to_owned()), Some("fresh".into()));
	assert_eq!(provider.sign_out_calls(), 0);

	let view = state.view();

	assert!(view.is_authenticated);
	assert!(!view.is_loading);
}

#[tokio::test]
async fn failed_refresh_forces_one_logout() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(503).body(r#"{"success":false,"message":"Maintenance"}"#);
		})
		.await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path(APPOINTMENTS_PATH);
			then.status(401);
		})
		.await;
	let (state, store, provider) = signed_in_state(&server, Some("stale")).await;
	let gateway = state.gateway();
	let request = gateway
		.request::<()>(oauth2::http::Method::GET, "appointments", None)
		.expect("Request should build against the API base.");
	let response = gateway.send(request).await.expect("Authorization failures are not errors.");

	assert!(response.requires_sign_in());
	assert_eq!(response.response.status().as_u16(), 401);

	exchange.assert_calls_async(1).await;
	rejected.assert_calls_async(1).await;

	assert_eq!(provider.sign_out_calls(), 1);
	assert!(store.snapshot().is_none());

	let view = state.view();

	assert!(!view.is_authenticated);
	assert!(view.user.is_none());
}

#[tokio::test]
async fn second_rejection_is_unrecoverable() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("fresh"));
		})
		.await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path(APPOINTMENTS_PATH);
			then.status(401);
		})
		.await;
	let (state, store, provider) = signed_in_state(&server, Some("stale")).await;
	let err = state
		.gateway()
		.get_json::<Vec<serde_json::Value>>("appointments")
		.await
		.expect_err("Second 401 should end the session.");

	assert!(matches!(err, Error::Unrecoverable));

	exchange.assert_calls_async(1).await;
	rejected.assert_calls_async(2).await;

	assert_eq!(provider.sign_out_calls(), 1);
	assert!(store.snapshot().is_none());
	assert!(!state.view().is_authenticated);
}

#[tokio::test]
async fn other_failures_pass_through_without_refresh() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("fresh"));
		})
		.await;
	let missing = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/appointments/99").header("authorization", "Bearer valid");
			then.status(404)
				.header("content-type", "application/json")
				.body(r#"{"success":false,"message":"Appointment not found"}"#);
		})
		.await;
	let (state, _store, provider) = signed_in_state(&server, Some("valid")).await;
	let err = state
		.gateway()
		.get_json::<serde_json::Value>("/appointments/99")
		.await
		.expect_err("404 should surface as an API error.");

	match err {
		Error::Api { endpoint, status, message } => {
			assert_eq!(endpoint, "/api/appointments/99");
			assert_eq!(status, 404);
			assert_eq!(message, "Appointment not found");
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	exchange.assert_calls_async(0).await;
	missing.assert_calls_async(1).await;

	assert_eq!(provider.sign_out_calls(), 0);
}

#[tokio::test]
async fn concurrent_rejections_share_one_refresh() {
	let server = MockServer::start_async().await;
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("fresh"));
		})
		.await;
	let _stale = server
		.mock_async(|when, then| {
			when.method(GET).path(APPOINTMENTS_PATH).header("authorization", "Bearer stale");
			then.status(401);
		})
		.await;
	let _fresh = server
		.mock_async(|when, then| {
			when.method(GET).path(APPOINTMENTS_PATH).header("authorization", "Bearer fresh");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"success":true,"data":[]}"#);
		})
		.await;
	let (state, _store, provider) = signed_in_state(&server, Some("stale")).await;
	let gateway = state.gateway();
	let (first, second) = tokio::join!(
		gateway.get_json::<Vec<serde_json::Value>>("appointments"),
		gateway.get_json::<Vec<serde_json::Value>>("appointments"),
	);

	first.expect("First call should recover.");
	second.expect("Second call should recover.");

	exchange.assert_calls_async(1).await;

	assert_eq!(provider.sign_out_calls(), 0);
}

#[tokio::test]
async fn notification_feed_loads_and_syncs_read_flags() {
	let server = MockServer::start_async().await;
	let list = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/notifications/user/7")
				.header("authorization", "Bearer valid");
			then.status(200).header("content-type", "application/json").body(
				r#"{"success":true,"data":[
					{"id":3,"userId":7,"title":"Reminder","message":"Tomorrow 9:00","isRead":false},
					{"id":2,"userId":7,"title":"Booked","message":"Confirmed","isRead":true}
				]}"#,
			);
		})
		.await;
	let read_one = server
		.mock_async(|when, then| {
			when.method(PATCH).path("/api/notifications/3/read");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"success":true,"message":"Marked as read","data":null}"#);
		})
		.await;
	let read_all = server
		.mock_async(|when, then| {
			when.method(PATCH).path("/api/notifications/user/7/read-all");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"success":true}"#);
		})
		.await;
	let (state, _store, _provider) = signed_in_state(&server, Some("valid")).await;
	let gateway = state.gateway();
	let feed = NotificationFeed::new();

	feed.load(&gateway, UserId(7)).await.expect("Notifications should load.");

	assert_eq!(feed.items().len(), 2);
	assert_eq!(feed.unread(), 1);

	feed.sync_read(&gateway, 3).await.expect("Read flag should sync.");

	assert_eq!(feed.unread(), 0);

	feed.sync_all_read(&gateway, UserId(7)).await.expect("Read-all should sync.");

	list.assert_calls_async(1).await;
	read_one.assert_calls_async(1).await;
	read_all.assert_calls_async(1).await;
}
