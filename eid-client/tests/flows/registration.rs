//! Scenarios: Beacon Registration
//!
//! - a committed registration stores the server id and epoch in seconds
//! - the identity key matches what the server derives from the submission
//! - any failure after the local record exists deletes it
//! - no credential means no network traffic
//! - all-zero agreements are retried silently
//! - every byte-sized rotation exponent is accepted

use std::sync::Arc;

use eid_client::{
    delete_beacon, list_beacons, register_beacon, register_beacon_with, ClientError, Method, NewBeacon,
    OperationalStatus, RegistrationState, TransportError,
};
use eid_client::store::FieldSet;
use eid_core::encoding::to_base64url;
use eid_core::token::{compute_token, encode_token, token_for_counter};
use serde_json::json;

use crate::common::{AdvertiserEvent, DegenerateFirst, FailingStore, Harness, BEARER, NOW, SERVER_EPOCH};

fn lobby() -> NewBeacon {
    NewBeacon {
        rotation_exponent: Some(10),
        tag: Some("lobby".into()),
    }
}

#[tokio::test]
async fn registration_commits_and_starts_advertising() {
    let h = Harness::signed_in();
    h.script_params();
    h.script_accept("bcn-1");

    let beacon = register_beacon(&h.ctx, lobby(), &h.advertiser).await.unwrap();

    assert_eq!(beacon.state, RegistrationState::Registered);
    assert_eq!(beacon.server_id.as_deref(), Some("bcn-1"));
    assert_eq!(beacon.epoch, SERVER_EPOCH, "µs epoch truncated to seconds");
    assert_eq!(beacon.rotation_exponent, 10);
    assert_eq!(beacon.tag.as_deref(), Some("lobby"));
    assert_eq!(beacon.status, OperationalStatus::Active);

    let stored = list_beacons(&h.ctx).unwrap();
    assert_eq!(stored, vec![beacon.clone()]);

    let token = encode_token(&compute_token(&beacon.identity_key, 10, SERVER_EPOCH, NOW).unwrap());
    assert_eq!(
        h.advertiser.events(),
        vec![AdvertiserEvent::Started(eid_client::Advertisement {
            beacon_id: beacon.id,
            url: format!("http://u-c.info/{token}"),
            token,
            rotates_in: 24,
        })]
    );
}

#[tokio::test]
async fn submission_carries_counter_zero_token_and_matching_keys() {
    let h = Harness::signed_in();
    h.script_params();
    h.script_accept("bcn-1");

    let beacon = register_beacon(&h.ctx, lobby(), &h.advertiser).await.unwrap();

    let params = h.transport.requests_to(Method::Get, "params");
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].auth.as_deref(), Some(BEARER));

    let submitted = h.transport.requests_to(Method::Post, "beacons");
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].auth.as_deref(), Some(BEARER));
    let body = submitted[0].body.clone().unwrap();

    assert_eq!(
        body["serviceEcdhPublicKey"],
        json!(to_base64url(&h.server.public_key))
    );
    assert_eq!(body["initialClockValue"], json!(0));
    assert_eq!(body["rotationPeriodExponent"], json!(10));
    assert_eq!(body["tag"], json!("lobby"));

    // The server derives the same identity key from what was submitted.
    let server_key = h.server_side_identity(&body);
    assert_eq!(server_key, beacon.identity_key);
    assert_eq!(
        body["initialEid"],
        json!(to_base64url(&token_for_counter(&server_key, 0)))
    );
}

#[tokio::test]
async fn tag_omitted_when_absent() {
    let h = Harness::signed_in();
    let _ = h.registered_beacon("bcn-1").await;
    let body = h.transport.requests_to(Method::Post, "beacons")[0]
        .body
        .clone()
        .unwrap();
    assert!(body.get("tag").is_none());
}

#[tokio::test]
async fn conflict_rolls_back_local_record() {
    let h = Harness::signed_in();
    h.script_params();
    h.transport
        .http_error(Method::Post, "beacons", 409, "beacon_exists");

    let err = register_beacon(&h.ctx, lobby(), &h.advertiser)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::ServerRejected { status: 409, ref message } if message == "beacon_exists"
    ));
    assert!(list_beacons(&h.ctx).unwrap().is_empty());
    assert!(h.advertiser.events().is_empty());
}

#[tokio::test]
async fn network_failure_rolls_back_local_record() {
    let h = Harness::signed_in();
    h.script_params();
    h.transport.reply(
        Method::Post,
        "beacons",
        Err(TransportError::Network("connection reset".into())),
    );

    let err = register_beacon(&h.ctx, lobby(), &h.advertiser)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(list_beacons(&h.ctx).unwrap().is_empty());
}

#[tokio::test]
async fn malformed_acceptance_rolls_back_local_record() {
    let h = Harness::signed_in();
    h.script_params();
    h.transport
        .ok(Method::Post, "beacons", json!({ "unexpected": "shape" }));

    let err = register_beacon(&h.ctx, lobby(), &h.advertiser)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Malformed(_)));
    assert!(list_beacons(&h.ctx).unwrap().is_empty());
}

#[tokio::test]
async fn missing_credential_fails_without_network() {
    let h = Harness::new();

    let err = register_beacon(&h.ctx, lobby(), &h.advertiser)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::AuthExpired));
    assert!(h.transport.requests().is_empty());
    assert!(list_beacons(&h.ctx).unwrap().is_empty());
}

#[tokio::test]
async fn credential_inside_margin_counts_as_expired() {
    let h = Harness::new();
    h.sign_in_for(5);

    let err = register_beacon(&h.ctx, lobby(), &h.advertiser)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::AuthExpired));
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn every_byte_exponent_registers_and_advertises() {
    // Registration epoch is 1000 s before now.
    let cases = [
        (33u8, (1u64 << 33) - 1000),
        (63, (1u64 << 63) - 1000),
        (64, u64::MAX - 999),
        (255, u64::MAX),
    ];
    for (exponent, rotates_in) in cases {
        let h = Harness::signed_in();
        h.script_params();
        h.script_accept("bcn-1");
        let request = NewBeacon {
            rotation_exponent: Some(exponent),
            tag: None,
        };

        let beacon = register_beacon(&h.ctx, request, &h.advertiser)
            .await
            .unwrap();

        assert_eq!(beacon.rotation_exponent, exponent);
        let submitted = &h.transport.requests_to(Method::Post, "beacons")[0];
        assert_eq!(
            submitted.body.as_ref().unwrap()["rotationPeriodExponent"],
            json!(exponent)
        );
        match h.advertiser.last() {
            Some(AdvertiserEvent::Started(ad)) => {
                assert_eq!(ad.token, encode_token(&token_for_counter(&beacon.identity_key, 0)));
                assert_eq!(ad.rotates_in, rotates_in, "exponent {exponent}");
            }
            other => panic!("exponent {exponent}: expected start, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn default_exponent_comes_from_config() {
    let h = Harness::signed_in();
    h.script_params();
    h.script_accept("bcn-1");

    let beacon = register_beacon(&h.ctx, NewBeacon::default(), &h.advertiser)
        .await
        .unwrap();

    assert_eq!(beacon.rotation_exponent, h.ctx.config.default_rotation_exponent);
}

#[tokio::test]
async fn malformed_server_key_creates_no_record() {
    let h = Harness::signed_in();
    h.transport.ok(
        Method::Get,
        "params",
        json!({ "serviceEcdhPublicKey": to_base64url(&[1; 16]) }),
    );

    let err = register_beacon(&h.ctx, lobby(), &h.advertiser)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Malformed(_)));
    assert!(list_beacons(&h.ctx).unwrap().is_empty());
    assert!(h.transport.requests_to(Method::Post, "beacons").is_empty());
}

#[tokio::test]
async fn zero_shared_secret_is_retried_silently() {
    let h = Harness::signed_in();
    h.script_params();
    h.script_accept("bcn-1");
    let mut exchange = DegenerateFirst {
        zero_rounds: 2,
        generated: 0,
    };

    let beacon = register_beacon_with(&h.ctx, &mut exchange, lobby(), &h.advertiser)
        .await
        .unwrap();

    assert_eq!(exchange.generated, 3);
    let body = h.transport.requests_to(Method::Post, "beacons")[0]
        .body
        .clone()
        .unwrap();
    assert_eq!(h.server_side_identity(&body), beacon.identity_key);
}

#[tokio::test]
async fn advertise_failure_does_not_undo_registration() {
    let h = Harness::signed_in();
    h.script_params();
    // Epoch in the future: the first token cannot be computed yet.
    h.transport.ok(
        Method::Post,
        "beacons",
        json!({ "id": "bcn-1", "epoch": (NOW + 60) * 1_000_000, "active": true }),
    );

    let beacon = register_beacon(&h.ctx, lobby(), &h.advertiser).await.unwrap();

    assert!(beacon.is_registered());
    assert_eq!(list_beacons(&h.ctx).unwrap().len(), 1);
    assert!(matches!(
        h.advertiser.last(),
        Some(AdvertiserEvent::Failed(id, _)) if id == beacon.id
    ));
}

#[tokio::test]
async fn concurrent_registrations_stay_independent() {
    let h = Harness::signed_in();
    h.script_params();
    h.script_params();
    h.script_accept("bcn-1");
    h.script_accept("bcn-2");

    let (a, b) = tokio::join!(
        register_beacon(&h.ctx, lobby(), &h.advertiser),
        register_beacon(&h.ctx, lobby(), &h.advertiser),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.id, b.id);
    assert_ne!(a.identity_key, b.identity_key);
    let mut server_ids = vec![a.server_id.unwrap(), b.server_id.unwrap()];
    server_ids.sort();
    assert_eq!(server_ids, vec!["bcn-1", "bcn-2"]);
    assert_eq!(list_beacons(&h.ctx).unwrap().len(), 2);
}

#[tokio::test]
async fn store_failure_on_commit_rolls_back() {
    let store = Arc::new(FailingStore::default());
    let h = Harness::with_store(store.clone());
    h.sign_in_for(3600);
    h.script_params();
    h.script_accept("bcn-1");
    store.fail_updates(FieldSet::REGISTRATION);

    let err = register_beacon(&h.ctx, lobby(), &h.advertiser)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Storage(_)));
    assert_eq!(h.transport.requests_to(Method::Post, "beacons").len(), 1);
    assert!(list_beacons(&h.ctx).unwrap().is_empty());
    assert!(h.advertiser.events().is_empty());
}

#[tokio::test]
async fn delete_waits_for_in_flight_registration() {
    let h = Harness::signed_in();
    h.script_params();
    h.script_accept("bcn-1");

    let (registered, deleted) = tokio::join!(
        register_beacon(&h.ctx, lobby(), &h.advertiser),
        async {
            // Wait for the unregistered record, then delete it mid-flight.
            let id = loop {
                if let Some(beacon) = list_beacons(&h.ctx).unwrap().first() {
                    break beacon.id;
                }
                tokio::task::yield_now().await;
            };
            delete_beacon(&h.ctx, id).await
        }
    );

    let registered = registered.unwrap();
    assert_eq!(registered.state, RegistrationState::Registered);
    deleted.unwrap();
    assert!(list_beacons(&h.ctx).unwrap().is_empty());
}
