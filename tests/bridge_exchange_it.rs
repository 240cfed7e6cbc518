#![cfg(all(feature = "reqwest", feature = "test"))]

// std
use std::time::Duration as StdDuration;
// crates.io
use httpmock::prelude::*;
// self
use session_bridge::{
	_preludet::*,
	auth::{ApplicationToken, UserId},
	bridge::{CacheDirective, PassiveOutcome, Readiness},
	session::{IdentityProvider, SessionEvent},
	store::{StoreOp, TokenStore},
};

const EXCHANGE_PATH: &str = "/api/auth/supabase-login";

fn exchange_body(token: &str, identity: &str) -> String {
	serde_json::json!({
		"success": true,
		"data": {
			"token": token,
			"user": {
				"id": 7,
				"supabaseId": identity,
				"fullName": "Dana Reyes",
				"email": "dana@example.com",
				"role": "USER"
			}
		}
	})
	.to_string()
}

#[tokio::test]
async fn sign_in_exchanges_once_and_persists_the_token() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH).header("content-type", "application/json");
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("app-1", "identity-a"));
		})
		.await;
	let session = session_for("identity-a", "cred-1");
	let provider = Arc::new(StaticProvider::with_session(session.clone()));
	let (bridge, store) = build_reqwest_test_bridge(&server.url("/api"), provider.clone());
	let directive = bridge
		.apply(&SessionEvent::SignedIn(session.clone()))
		.await
		.expect("Sign-in should be applied.");

	assert_eq!(directive, CacheDirective::Invalidated);
	assert_eq!(bridge.exchange_passive().await, PassiveOutcome::Exchanged);
	assert_eq!(bridge.exchange_passive().await, PassiveOutcome::Skipped);

	let directive = bridge
		.apply(&SessionEvent::TokenRotated(session_for("identity-a", "cred-2")))
		.await
		.expect("Rotation should be applied.");

	assert_eq!(directive, CacheDirective::Kept);
	assert_eq!(bridge.exchange_passive().await, PassiveOutcome::Skipped);

	mock.assert_calls_async(1).await;

	let token = store.snapshot().expect("Exchanged token should be persisted.");

	assert_eq!(token.token.expose(), "app-1");
	assert_eq!(token.numeric_user_id(), Some(UserId(7)));
	assert!(bridge.is_confirmed());
	assert_eq!(bridge.readiness(), Readiness::Ready);
	assert_eq!(provider.refresh_calls(), 1);
	assert_eq!(bridge.metrics.exchanges(), 1);
}

#[tokio::test]
async fn concurrent_passive_exchanges_reach_the_server_once() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("app-1", "identity-a"));
		})
		.await;
	let provider = Arc::new(StaticProvider::with_session(session_for("identity-a", "cred-1")));
	let (bridge, _store) = build_reqwest_test_bridge(&server.url("/api"), provider);
	let (first, second) = tokio::join!(bridge.exchange_passive(), bridge.exchange_passive());
	let mut outcomes = [first, second];

	outcomes.sort_by_key(|outcome| *outcome == PassiveOutcome::Skipped);

	assert_eq!(outcomes, [PassiveOutcome::Exchanged, PassiveOutcome::Skipped]);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn signing_in_again_discards_the_previous_token() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("app-1", "identity-a"));
		})
		.await;
	let session_a = session_for("identity-a", "cred-a");
	let session_b = session_for("identity-b", "cred-b");
	let provider = Arc::new(StaticProvider::with_session(session_a.clone()));
	let (bridge, store) = build_reqwest_test_bridge(&server.url("/api"), provider.clone());

	bridge.apply(&SessionEvent::SignedIn(session_a)).await.expect("First sign-in should apply.");

	assert_eq!(bridge.exchange_passive().await, PassiveOutcome::Exchanged);

	bridge.apply(&SessionEvent::SignedOut).await.expect("Sign-out should apply.");

	assert!(store.snapshot().is_none());
	assert!(!bridge.is_confirmed());

	provider.set_session(Some(session_b.clone()));
	bridge.apply(&SessionEvent::SignedIn(session_b)).await.expect("Second sign-in should apply.");

	assert_eq!(bridge.readiness(), Readiness::Pending);
	assert_eq!(bridge.exchange_passive().await, PassiveOutcome::Exchanged);

	mock.assert_calls_async(2).await;

	assert_eq!(
		store.journal(),
		vec![
			StoreOp::Clear,
			StoreOp::Set("app-1".into()),
			StoreOp::Clear,
			StoreOp::Clear,
			StoreOp::Set("app-1".into()),
		]
	);
	assert!(bridge.is_confirmed());
}

#[tokio::test]
async fn rotation_for_another_identity_invalidates_the_cache() {
	let provider = Arc::new(StaticProvider::with_session(session_for("identity-b", "cred-b")));
	let (bridge, store) = build_reqwest_test_bridge("http://127.0.0.1:9/api", provider);
	let mut user = session_for("identity-a", "cred-a").user_projection();

	user.id = Some(UserId(7));
	store.set(ApplicationToken::new("app-a", user)).await.expect("Seeding the slot should work.");

	let directive = bridge
		.apply(&SessionEvent::TokenRotated(session_for("identity-b", "cred-b")))
		.await
		.expect("Rotation should be applied.");

	assert_eq!(directive, CacheDirective::Invalidated);
	assert!(store.snapshot().is_none());
	assert_eq!(bridge.readiness(), Readiness::Pending);
}

#[tokio::test]
async fn rejected_exchange_keeps_the_slot_empty_and_unconfirmed() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(500)
				.header("content-type", "application/json")
				.body(r#"{"success":false,"message":"Account provisioning failed"}"#);
		})
		.await;
	let provider = Arc::new(StaticProvider::with_session(session_for("identity-a", "cred-1")));
	let (bridge, store) = build_reqwest_test_bridge(&server.url("/api"), provider);

	assert_eq!(bridge.exchange_passive().await, PassiveOutcome::Failed);
	assert_eq!(bridge.readiness(), Readiness::Ready);
	assert!(!bridge.is_confirmed());
	assert!(store.snapshot().is_none());

	let err = bridge.exchange().await.expect_err("Explicit exchange should surface the rejection.");

	match err {
		Error::ExchangeRejected { reason, status } => {
			assert_eq!(reason, "Account provisioning failed");
			assert_eq!(status, Some(500));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	mock.assert_calls_async(2).await;

	assert_eq!(bridge.metrics.exchange_failures(), 2);
}

#[tokio::test]
async fn unsuccessful_envelope_is_a_rejection() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"success":false,"message":"Email not verified"}"#);
		})
		.await;
	let provider = Arc::new(StaticProvider::with_session(session_for("identity-a", "cred-1")));
	let (bridge, store) = build_reqwest_test_bridge(&server.url("/api"), provider);
	let err = bridge.exchange().await.expect_err("Failure envelope should be rejected.");

	assert!(matches!(err, Error::ExchangeRejected { status: Some(200), .. }));
	assert!(store.snapshot().is_none());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn blank_token_is_a_rejection() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("  ", "identity-a"));
		})
		.await;
	let provider = Arc::new(StaticProvider::with_session(session_for("identity-a", "cred-1")));
	let (bridge, store) = build_reqwest_test_bridge(&server.url("/api"), provider);
	let err = bridge.exchange().await.expect_err("Blank token should be rejected.");

	assert!(matches!(err, Error::ExchangeRejected { .. }));
	assert!(store.snapshot().is_none());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn failed_rotation_falls_back_to_the_current_credential() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("app-1", "identity-a"));
		})
		.await;
	let provider = Arc::new(StaticProvider::with_session(session_for("identity-a", "cred-1")));

	provider.fail_refresh(true);

	let (bridge, store) = build_reqwest_test_bridge(&server.url("/api"), provider.clone());
	let token = bridge.exchange().await.expect("Exchange should use the existing credential.");

	assert_eq!(token.token.expose(), "app-1");
	assert_eq!(provider.refresh_calls(), 1);
	assert!(store.snapshot().is_some());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn exchange_without_a_session_is_reported() {
	let provider = Arc::new(StaticProvider::default());
	let (bridge, store) = build_reqwest_test_bridge("http://127.0.0.1:9/api", provider.clone());
	let err = bridge.exchange().await.expect_err("Exchange should need a session.");

	assert!(matches!(err, Error::MissingSession));
	assert!(store.snapshot().is_none());
	assert!(provider.current_session().await.expect("Fake provider never fails.").is_none());
}

#[tokio::test]
async fn concurrent_refreshes_share_one_exchange() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("app-fresh", "identity-a"));
		})
		.await;
	let provider = Arc::new(StaticProvider::with_session(session_for("identity-a", "cred-1")));
	let (bridge, store) = build_reqwest_test_bridge(&server.url("/api"), provider);
	let stale =
		ApplicationToken::new("app-stale", session_for("identity-a", "cred-1").user_projection());

	store.set(stale.clone()).await.expect("Seeding the slot should work.");

	let (first, second) =
		tokio::join!(bridge.refresh(Some(&stale.token)), bridge.refresh(Some(&stale.token)));
	let first = first.expect("First refresh should succeed.");
	let second = second.expect("Second refresh should succeed.");

	assert_eq!(first.token.expose(), "app-fresh");
	assert_eq!(second.token.expose(), "app-fresh");
	assert_eq!(bridge.metrics.refreshes(), 2);
	assert_eq!(bridge.metrics.coalesced(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn sign_out_during_refresh_leaves_the_slot_empty() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(EXCHANGE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(exchange_body("app-late", "identity-a"));
		})
		.await;
	let session = session_for("identity-a", "cred-1");
	let provider = Arc::new(StaticProvider::with_session(session.clone()));
	let (bridge, store) = build_reqwest_test_bridge(&server.url("/api"), provider.clone());
	let stale = ApplicationToken::new("app-stale", session.user_projection());

	store.set(stale.clone()).await.expect("Seeding the slot should work.");
	provider.delay_refresh(StdDuration::from_millis(100));

	let (refreshed, signed_out) = tokio::join!(bridge.refresh(Some(&stale.token)), async {
		tokio::time::sleep(StdDuration::from_millis(20)).await;

		bridge.apply(&SessionEvent::SignedOut).await
	});

	assert!(matches!(refreshed, Err(Error::ExchangeRejected { status: None, .. })));
	assert_eq!(signed_out.expect("Sign-out should apply."), CacheDirective::Invalidated);
	assert!(store.snapshot().is_none());
	assert_eq!(store.journal(), vec![StoreOp::Set("app-stale".into()), StoreOp::Clear]);
	assert!(!bridge.is_confirmed());

	mock.assert_calls_async(1).await;
}
