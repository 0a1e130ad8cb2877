//! Metric helpers recorded through `metrics_util::debugging::DebuggingRecorder`.
#![cfg(feature = "metrics")]

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use wsvpn::metrics::{self as wsvpn_metrics, Direction};

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_value(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> Option<u64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| {
            let key = key.key();
            let labelled = label.is_none_or(|(k, v)| key.labels().any(|l| l.key() == k && l.value() == v));
            match value {
                DebugValue::Counter(count) if key.name() == name && labelled => Some(count),
                _ => None,
            }
        })
}

#[rstest]
#[case::inbound(Direction::Inbound)]
#[case::outbound(Direction::Outbound)]
fn packet_metric_is_labelled_by_direction(#[case] direction: Direction) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        wsvpn_metrics::inc_packets(direction);
        wsvpn_metrics::inc_packets(direction);
    });

    assert_eq!(
        counter_value(
            &snapshotter,
            wsvpn_metrics::PACKETS_TOTAL,
            Some(("direction", direction.as_str()))
        ),
        Some(2)
    );
}

#[test]
fn command_metric_is_labelled_by_name() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        wsvpn_metrics::inc_commands("ping");
    });

    assert_eq!(
        counter_value(&snapshotter, wsvpn_metrics::COMMANDS_TOTAL, Some(("command", "ping"))),
        Some(1)
    );
}

#[test]
fn evicted_fragments_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        wsvpn_metrics::inc_fragments_evicted(3);
    });

    assert_eq!(
        counter_value(&snapshotter, wsvpn_metrics::FRAGMENTS_EVICTED, None),
        Some(3)
    );
}

#[test]
fn active_connection_gauge_moves_both_ways() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        wsvpn_metrics::inc_connections();
        wsvpn_metrics::inc_connections();
        wsvpn_metrics::dec_connections();
    });

    let metrics = snapshotter.snapshot().into_vec();
    let gauge = metrics.iter().find_map(|(key, _, _, value)| match value {
        DebugValue::Gauge(gauge) if key.key().name() == wsvpn_metrics::CONNECTIONS_ACTIVE => {
            Some(gauge.into_inner())
        }
        _ => None,
    });
    assert_eq!(gauge, Some(1.0));
}
