mod common;

use assert_matches::assert_matches;
use savesync_dispatch::{DispatchConfig, DispatchError};
use savesync_events::DispatchEvent;
use std::time::Duration;

use common::{secs, setup, setup_with};

// ---- Test: heartbeat registers and is idempotent ----

#[tokio::test]
async fn heartbeat_is_idempotent_apart_from_timestamp() {
    let (c, clock) = setup();
    let first = c.presence.heartbeat("host-a").await.unwrap();
    clock.advance(secs(2));
    let second = c.presence.heartbeat("host-a").await.unwrap();
    let third = c.presence.heartbeat("host-a").await.unwrap();

    assert!(first.online && second.online);
    assert_eq!(second, third);
    assert_eq!(c.presence.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn heartbeat_publishes_presence_event() {
    let (c, _clock) = setup();
    let mut rx = c.events.subscribe();
    c.presence.heartbeat("host-a").await.unwrap();

    assert_matches!(
        rx.recv().await.unwrap(),
        DispatchEvent::PresenceChanged { client_id, .. } if client_id == "host-a"
    );
}

#[tokio::test]
async fn invalid_client_id_is_rejected() {
    let (c, _clock) = setup();
    assert_matches!(
        c.presence.heartbeat("bad id!").await,
        Err(DispatchError::Core(_))
    );
    assert_matches!(
        c.presence.get("nobody").await,
        Err(DispatchError::WorkerNotFound(_))
    );
}

// ---- Test: scenario B, silent worker goes offline but stays claimed ----

#[tokio::test]
async fn silent_worker_goes_offline_and_keeps_claim() {
    let (c, clock) = setup();
    c.presence.heartbeat("w2").await.unwrap();
    c.claims.claim("w2", 7).await.unwrap();
    clock.advance(secs(5));
    c.presence.heartbeat("w2").await.unwrap();
    clock.advance(secs(5));
    c.presence.heartbeat("w2").await.unwrap();

    clock.advance(secs(14));
    let w = c.presence.get("w2").await.unwrap();
    assert!(w.online);

    clock.advance(secs(1));
    let listed = c.presence.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].online);
    assert!(listed[0].claimed);
    assert_eq!(listed[0].linked_user, Some(7));
}

// ---- Test: presence monitor ----

#[tokio::test]
async fn monitor_announces_offline_flip_once() {
    let (c, clock) = setup();
    let mut monitor = c.presence_monitor();
    c.presence.heartbeat("host-a").await.unwrap();

    let first = monitor.check().await.unwrap();
    assert!(first.is_empty());

    clock.advance(secs(20));
    let mut rx = c.events.subscribe();
    let flipped = monitor.check().await.unwrap();
    assert_eq!(flipped.went_offline, vec!["host-a".to_string()]);
    assert_matches!(rx.recv().await.unwrap(), DispatchEvent::PresenceChanged { .. });

    let again = monitor.check().await.unwrap();
    assert!(again.went_offline.is_empty());
}

#[tokio::test]
async fn monitor_keeps_claims_by_default() {
    let (c, clock) = setup();
    let mut monitor = c.presence_monitor();
    c.presence.heartbeat("host-a").await.unwrap();
    c.claims.claim("host-a", 1).await.unwrap();

    clock.advance(secs(3 * 3600));
    let check = monitor.check().await.unwrap();
    assert!(check.claims_expired.is_empty());
    assert!(check.evicted.is_empty());
    assert!(c.presence.get("host-a").await.unwrap().claimed);
}

#[tokio::test]
async fn monitor_expires_idle_claims_when_configured() {
    let config = DispatchConfig {
        claim_idle_expiry: Some(Duration::from_secs(3600)),
        ..DispatchConfig::default()
    };
    let (c, clock) = setup_with(config);
    let mut monitor = c.presence_monitor();
    c.presence.heartbeat("host-a").await.unwrap();
    c.claims.claim("host-a", 1).await.unwrap();

    clock.advance(secs(3599));
    assert!(monitor.check().await.unwrap().claims_expired.is_empty());

    clock.advance(secs(2));
    let check = monitor.check().await.unwrap();
    assert_eq!(check.claims_expired, vec!["host-a".to_string()]);
    assert!(!c.presence.get("host-a").await.unwrap().claimed);
}

#[tokio::test]
async fn monitor_evicts_only_unclaimed_idle_workers() {
    let (c, clock) = setup();
    let mut monitor = c.presence_monitor();
    c.presence.heartbeat("idle").await.unwrap();
    c.presence.heartbeat("held").await.unwrap();
    c.claims.claim("held", 1).await.unwrap();

    clock.advance(secs(86_401));
    let check = monitor.check().await.unwrap();
    assert_eq!(check.evicted, vec!["idle".to_string()]);

    let remaining: Vec<String> = c
        .presence
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.client_id)
        .collect();
    assert_eq!(remaining, vec!["held".to_string()]);
}
