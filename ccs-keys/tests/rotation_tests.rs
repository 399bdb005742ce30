//! Key Rotation Integration Tests
//!
//! Timing-sensitive cases run on a paused tokio clock, so the full
//! 90-minute window elapses instantly. Key ages are measured against the wall
//! clock, which barely moves while these tests run.

use ccs_keys::memory::Operation;
use ccs_keys::{
    AccessKey, InMemoryIdentityService, KeyError, KeyRotator, RotationPolicy, ServiceError,
    SessionProvider, CCS_ADMIN_IDENTITY,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn rotator_for(service: &InMemoryIdentityService) -> KeyRotator<InMemoryIdentityService> {
    rotator_with_policy(service, RotationPolicy::default())
}

fn rotator_with_policy(
    service: &InMemoryIdentityService,
    policy: RotationPolicy,
) -> KeyRotator<InMemoryIdentityService> {
    let sessions = Arc::new(SessionProvider::new(service.clone()));
    KeyRotator::new(sessions, policy)
}

async fn seed_key(service: &InMemoryIdentityService, id: &str, minutes_old: i64) {
    service
        .insert_key(AccessKey::new(
            id,
            CCS_ADMIN_IDENTITY,
            Utc::now() - chrono::Duration::minutes(minutes_old),
        ))
        .await;
}

fn key_ids(keys: &[AccessKey]) -> Vec<String> {
    keys.iter().map(|k| k.id.clone()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_no_existing_keys_rotates_on_first_poll() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    let rotator = rotator_for(&service);

    let pair = assert_ok!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    assert_eq!(service.calls(Operation::ListKeys).await, 1);
    assert!(service.deleted_keys().await.is_empty());
    assert_eq!(key_ids(&service.keys(CCS_ADMIN_IDENTITY).await), vec![pair.access_key_id]);
}

#[tokio::test(start_paused = true)]
async fn test_single_key_rotates_without_deletion() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIAEXISTING", 60).await;
    let rotator = rotator_for(&service);

    let pair = assert_ok!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    assert_ne!(pair.access_key_id, "AKIAEXISTING");
    assert_eq!(pair.secret_access_key.len(), 40);
    assert_eq!(service.calls(Operation::ListKeys).await, 1);
    assert_eq!(service.calls(Operation::DeleteKey).await, 0);
    assert_eq!(
        key_ids(&service.keys(CCS_ADMIN_IDENTITY).await),
        vec!["AKIAEXISTING".to_string(), pair.access_key_id]
    );
}

#[tokio::test(start_paused = true)]
async fn test_deletes_only_the_stale_key_then_creates() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIAOLD", 10).await;
    seed_key(&service, "AKIAYOUNG", 1).await;
    let rotator = rotator_for(&service);

    let pair = assert_ok!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    assert_eq!(service.deleted_keys().await, vec!["AKIAOLD".to_string()]);
    // First poll deletes, the second observes one key and has capacity
    assert_eq!(service.calls(Operation::ListKeys).await, 2);
    assert_eq!(service.calls(Operation::CreateKey).await, 1);
    assert_eq!(
        key_ids(&service.keys(CCS_ADMIN_IDENTITY).await),
        vec!["AKIAYOUNG".to_string(), pair.access_key_id]
    );
}

#[tokio::test(start_paused = true)]
async fn test_young_keys_time_out_without_deletion() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIA1", 1).await;
    seed_key(&service, "AKIA2", 2).await;
    let rotator = rotator_for(&service);

    let err = assert_err!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    match err {
        KeyError::RotationTimeout {
            waited,
            attempts,
            last_error,
        } => {
            assert!(waited >= Duration::from_secs(90 * 60));
            assert!(attempts >= 45);
            assert!(last_error.is_none());
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(service.deleted_keys().await.is_empty());
    assert_eq!(service.calls(Operation::DeleteKey).await, 0);
    assert_eq!(service.calls(Operation::CreateKey).await, 0);
    assert!(service.calls(Operation::ListKeys).await >= 45);
}

#[tokio::test(start_paused = true)]
async fn test_keeps_polling_until_a_key_is_retired_elsewhere() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIA1", 1).await;
    seed_key(&service, "AKIA2", 2).await;
    let rotator = rotator_for(&service);

    let handle = tokio::spawn(async move { rotator.rotate_keys(CCS_ADMIN_IDENTITY).await });

    tokio::time::sleep(Duration::from_secs(5 * 60)).await;
    assert!(!handle.is_finished());
    assert!(service.retire_key(CCS_ADMIN_IDENTITY, "AKIA1").await);

    let pair = assert_ok!(handle.await.unwrap());

    assert!(service.calls(Operation::ListKeys).await > 1);
    assert!(service.deleted_keys().await.is_empty());
    assert_eq!(
        key_ids(&service.keys(CCS_ADMIN_IDENTITY).await),
        vec!["AKIA2".to_string(), pair.access_key_id]
    );
}

#[tokio::test(start_paused = true)]
async fn test_delete_failures_are_retried() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIAOLD", 30).await;
    seed_key(&service, "AKIAYOUNG", 1).await;
    service
        .fail_times(
            Operation::DeleteKey,
            ServiceError::Unavailable("Rate exceeded".into()),
            3,
        )
        .await;
    let rotator = rotator_for(&service);

    assert_ok!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    assert_eq!(service.calls(Operation::DeleteKey).await, 4);
    assert_eq!(service.deleted_keys().await, vec!["AKIAOLD".to_string()]);
    assert_eq!(service.calls(Operation::ListKeys).await, 5);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_delete_failure_surfaces_on_timeout() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIAOLD", 30).await;
    seed_key(&service, "AKIAYOUNG", 1).await;
    service
        .fail_always(
            Operation::DeleteKey,
            ServiceError::Unavailable("Rate exceeded".into()),
        )
        .await;
    let rotator = rotator_for(&service);

    let err = assert_err!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    match err {
        KeyError::RotationTimeout { last_error, .. } => {
            let last_error = last_error.expect("last transient error is kept");
            assert!(matches!(*last_error, KeyError::KeyDelete { ref key_id, .. } if key_id == "AKIAOLD"));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(service.calls(Operation::CreateKey).await, 0);
    assert_eq!(service.keys(CCS_ADMIN_IDENTITY).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_list_failures_are_absorbed() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    service
        .fail_times(
            Operation::ListKeys,
            ServiceError::Unavailable("connection reset".into()),
            2,
        )
        .await;
    let rotator = rotator_for(&service);

    assert_ok!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);
    assert_eq!(service.calls(Operation::ListKeys).await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_drops_errors_from_before_a_clean_poll() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIA1", 1).await;
    seed_key(&service, "AKIA2", 1).await;
    service
        .fail_times(
            Operation::ListKeys,
            ServiceError::Unavailable("connection reset".into()),
            2,
        )
        .await;
    let rotator = rotator_for(&service);

    let err = assert_err!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    match err {
        KeyError::RotationTimeout { last_error, .. } => assert!(last_error.is_none()),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_timeout_is_a_configuration_error() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIA1", 1).await;
    seed_key(&service, "AKIA2", 1).await;
    let rotator = rotator_with_policy(
        &service,
        RotationPolicy {
            timeout: Duration::from_secs(u64::MAX),
            ..RotationPolicy::default()
        },
    );

    let err = assert_err!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    assert!(matches!(err, KeyError::Configuration(_)));
    assert_eq!(service.calls(Operation::ListKeys).await, 0);
    assert_eq!(service.calls(Operation::CreateKey).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_identity_fails_immediately() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    let rotator = rotator_for(&service);

    // IAM user names are case sensitive
    let err = assert_err!(rotator.rotate_keys("osdCcSAdmin").await);

    assert!(matches!(
        err,
        KeyError::KeyList {
            source: ServiceError::NoSuchEntity(_),
            ..
        }
    ));
    assert_eq!(service.calls(Operation::ListKeys).await, 1);
    assert_eq!(service.calls(Operation::CreateKey).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_creation_failure_is_terminal() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIAEXISTING", 60).await;
    service
        .fail_always(
            Operation::CreateKey,
            ServiceError::Unavailable("internal failure".into()),
        )
        .await;
    let rotator = rotator_for(&service);

    let err = assert_err!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    assert!(matches!(err, KeyError::KeyCreation { .. }));
    assert_eq!(service.calls(Operation::CreateKey).await, 1);
    assert_eq!(service.calls(Operation::ListKeys).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_over_quota_identity_fails() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIA1", 60).await;
    seed_key(&service, "AKIA2", 60).await;
    seed_key(&service, "AKIA3", 60).await;
    let rotator = rotator_for(&service);

    let err = assert_err!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    assert!(matches!(err, KeyError::RotationFailed(ref reason) if reason == "unable to generate key pair"));
    assert!(service.deleted_keys().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_custom_policy_bounds_attempts() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIA1", 1).await;
    seed_key(&service, "AKIA2", 1).await;
    let rotator = rotator_with_policy(
        &service,
        RotationPolicy {
            poll_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
            ..RotationPolicy::default()
        },
    );

    let err = assert_err!(rotator.rotate_keys(CCS_ADMIN_IDENTITY).await);

    match err {
        KeyError::RotationTimeout { attempts, .. } => assert!((3..=4).contains(&attempts)),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_waiting() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    seed_key(&service, "AKIA1", 1).await;
    seed_key(&service, "AKIA2", 2).await;
    let rotator = rotator_for(&service);
    let cancel = CancellationToken::new();

    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        rotator
            .rotate_keys_with_cancel(CCS_ADMIN_IDENTITY, token)
            .await
    });

    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    cancel.cancel();

    let err = assert_err!(handle.await.unwrap());
    assert!(matches!(err, KeyError::Cancelled));
    assert!(service.deleted_keys().await.is_empty());
    assert_eq!(service.calls(Operation::CreateKey).await, 0);
}

#[tokio::test]
async fn test_cancelled_token_skips_rotation() {
    let service = InMemoryIdentityService::new(CCS_ADMIN_IDENTITY);
    let rotator = rotator_for(&service);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assert_err!(
        rotator
            .rotate_keys_with_cancel(CCS_ADMIN_IDENTITY, cancel)
            .await
    );

    assert!(matches!(err, KeyError::Cancelled));
    assert_eq!(service.calls(Operation::ListKeys).await, 0);
}
