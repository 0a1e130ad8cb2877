//! Protocol negotiation across every historical peer version.

use std::time::Duration;

use rstest::rstest;
use serde_json::json;
use wsvpn::{
    CommandName,
    Feature,
    LinkPolicy,
    MessageKind,
    ProtocolVersion,
    command::{ErrorParameters, VersionParameters},
};
use wsvpn_testing::{Loopback, STEP_TIMEOUT};

mod common;
use common::{Harness, TestResult, quiet_config};

const FRAG: Feature = Feature::FRAGMENTATION;
const COMP: Feature = Feature::COMPRESSION;

fn policy(fragmentation: bool, compression: bool) -> LinkPolicy {
    LinkPolicy {
        fragmentation,
        compression,
    }
}

#[rstest]
#[case::legacy_ignores_flags(9, &[FRAG, COMP], true, &[], policy(false, false))]
#[case::always_fragment_without_local_flag(10, &[], false, &[], policy(true, false))]
#[case::always_fragment_never_compresses(10, &[FRAG, COMP], true, &[], policy(true, false))]
#[case::negotiated_follows_local_flag(11, &[FRAG], false, &[], policy(true, false))]
#[case::negotiated_local_flag_unset(11, &[], true, &[], policy(false, false))]
#[case::feature_field_intersection(
    12,
    &[FRAG],
    false,
    &[(FRAG, true), (COMP, false)],
    policy(true, false)
)]
#[case::feature_field_both(12, &[FRAG, COMP], false, &[(FRAG, true), (COMP, true)], policy(true, true))]
#[case::feature_field_remote_silent(12, &[FRAG, COMP], true, &[], policy(false, false))]
#[case::newer_peer_uses_feature_field(15, &[COMP], false, &[(COMP, true)], policy(false, true))]
#[tokio::test]
async fn policy_follows_peer_version(
    #[case] peer_version: u32,
    #[case] local: &[Feature],
    #[case] legacy_flag: bool,
    #[case] remote: &[(Feature, bool)],
    #[case] expected: LinkPolicy,
) -> TestResult {
    let mut h = Harness::new(None, |mut builder| {
        for feature in local {
            builder = builder.local_feature(feature.clone(), true);
        }
        builder
    });
    h.handshake(peer_version, legacy_flag, remote).await?;

    assert!(h.conn.is_ready());
    assert_eq!(
        h.conn.remote_protocol_version(),
        ProtocolVersion::new(peer_version)
    );
    assert_eq!(h.conn.link_policy(), expected);
    h.conn.close().await;
    h.joined().await
}

#[tokio::test]
async fn welcome_announces_version_and_features() -> TestResult {
    let mut h = Harness::new(None, |b| b.local_feature(FRAG, true));
    h.conn.serve().await?;
    let welcome = h.peer.expect_command(&CommandName::VERSION).await;
    assert!(welcome.id.is_some());
    let params: VersionParameters = welcome.parameters()?;
    assert_eq!(params.protocol_version, ProtocolVersion::CURRENT);
    assert!(params.enable_fragmentation);
    assert_eq!(params.features.get(&FRAG), Some(&true));
    assert!(!params.features.contains_key(&COMP));
    assert!(!h.conn.is_ready(), "not ready before the peer's handshake");
    h.conn.close().await;
    h.joined().await
}

#[tokio::test]
async fn used_features_match_scenario() -> TestResult {
    let mut h = Harness::new(None, |b| b.local_feature(FRAG, true));
    h.handshake(12, false, &[(FRAG, true), (COMP, false)]).await?;
    assert!(h.conn.is_used_feature(&FRAG));
    assert!(!h.conn.is_used_feature(&COMP));
    h.conn.close().await;
    h.joined().await
}

#[rstest]
#[case::garbage_parameters(json!("garbage"))]
#[case::missing_version(json!({"version": "x"}))]
#[case::reserved_version(json!({"protocol_version": 0}))]
#[tokio::test]
async fn malformed_handshake_is_fatal(#[case] parameters: serde_json::Value) -> TestResult {
    let mut h = Harness::new(None, |b| b);
    h.conn.serve().await?;
    h.peer.expect_command(&CommandName::VERSION).await;
    h.peer.send_command(CommandName::VERSION, parameters).await;

    let error = h.peer.expect_command(&CommandName::ERROR).await;
    let params: ErrorParameters = error.parameters()?;
    assert!(!params.message.is_empty());
    h.joined().await?;
    assert!(h.conn.is_closing());
    assert!(h.adapter.is_closed());
    Ok(())
}

#[tokio::test]
async fn repeated_handshake_is_ignored() -> TestResult {
    let mut h = Harness::new(None, |b| b.local_feature(FRAG, true));
    h.handshake(10, false, &[]).await?;
    h.peer.send_version(12, false, &[(FRAG, false)]).await;
    h.peer
        .send_command(CommandName::PING, serde_json::Value::Null)
        .await;
    h.peer.expect_command(&CommandName::PONG).await;

    assert!(!h.conn.is_closing());
    assert_eq!(h.conn.remote_protocol_version(), ProtocolVersion::new(10));
    assert_eq!(h.conn.link_policy(), policy(true, false));
    h.conn.close().await;
    h.joined().await
}

#[tokio::test]
async fn feature_readvertisement_updates_current_peers() -> TestResult {
    let mut h = Harness::new(None, |b| b.local_feature(FRAG, true).local_feature(COMP, true));
    h.handshake(12, false, &[(FRAG, true)]).await?;
    assert_eq!(h.conn.link_policy(), policy(true, false));

    h.peer
        .send_command(
            CommandName::FEATURES,
            json!({"features": {"fragmentation": false, "compression": true}}),
        )
        .await;
    h.peer
        .send_command(CommandName::PING, serde_json::Value::Null)
        .await;
    h.peer.expect_command(&CommandName::PONG).await;

    assert_eq!(h.conn.link_policy(), policy(false, true));
    h.conn.close().await;
    h.joined().await
}

#[tokio::test]
async fn feature_readvertisement_ignored_for_older_peers() -> TestResult {
    let mut h = Harness::new(None, |b| b.local_feature(FRAG, true).local_feature(COMP, true));
    h.handshake(11, true, &[]).await?;
    h.peer
        .send_command(
            CommandName::FEATURES,
            json!({"features": {"fragmentation": false, "compression": true}}),
        )
        .await;
    h.peer
        .send_command(CommandName::PING, serde_json::Value::Null)
        .await;
    h.peer.expect_command(&CommandName::PONG).await;

    assert_eq!(h.conn.link_policy(), policy(true, false));
    h.conn.close().await;
    h.joined().await
}

#[tokio::test]
async fn advertise_features_sends_local_set() -> TestResult {
    let mut h = Harness::new(None, |b| b);
    h.handshake(12, false, &[]).await?;

    h.conn.set_local_feature(COMP, true);
    let id = h.conn.advertise_features().await?;
    let features = h.peer.expect_command(&CommandName::FEATURES).await;
    assert_eq!(features.id, Some(id));
    assert_eq!(features.parameters, json!({"features": {"compression": true}}));
    h.conn.close().await;
    h.joined().await
}

#[tokio::test]
async fn readvertisement_changes_remote_engine_policy() -> TestResult {
    let link = Loopback::new(
        None,
        |b| b.config(quiet_config()),
        |b| b.config(quiet_config()).local_feature(COMP, true),
    );
    link.start().await;
    assert_eq!(link.right.conn.link_policy(), policy(false, false));

    link.left.conn.set_local_feature(COMP, true);
    link.left.conn.advertise_features().await?;
    let right = &link.right.conn;
    tokio::time::timeout(STEP_TIMEOUT, async {
        while !right.link_policy().compression {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await?;
    assert!(right.is_used_feature(&COMP));
    link.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn wait_ready_releases_early_and_late_waiters() -> TestResult {
    let mut h = Harness::new(None, |b| b);
    h.conn.serve().await?;
    h.peer.expect_command(&CommandName::VERSION).await;

    let early = tokio::spawn({
        let conn = h.conn.clone();
        async move { conn.wait_ready().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!early.is_finished());

    h.peer.send_version(12, false, &[]).await;
    tokio::time::timeout(STEP_TIMEOUT, early).await??;
    tokio::time::timeout(STEP_TIMEOUT, h.conn.wait_ready()).await?;
    assert!(h.conn.is_ready());
    h.conn.close().await;
    h.joined().await
}

#[tokio::test]
async fn data_before_handshake_is_still_delivered() -> TestResult {
    let mut h = Harness::new(None, |b| b);
    h.conn.serve().await?;
    h.peer
        .send_raw(MessageKind::Data, bytes::Bytes::from_static(b"early"))
        .await;
    let packet = tokio::time::timeout(STEP_TIMEOUT, h.tap.recv()).await?;
    assert_eq!(packet.as_deref(), Some(b"early".as_slice()));
    h.conn.close().await;
    h.joined().await
}
