#![cfg(feature = "metrics")]
//! Tests for `wampframe` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use bytes::BytesMut;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};
use wampframe::{
    Message,
    Options,
    codec::WebSocketCodec,
    metrics::{self, Direction},
    panic::guard_callback,
};
use wampframe_testing::{OP_TEXT, masked_frame, server_frame};

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(k, _, _, _)| {
            k.key().name() == name
                && label.is_none_or(|(key, value)| {
                    k.key()
                        .labels()
                        .any(|l| l.key() == key && l.value() == value)
                })
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || metrics::inc_frames(direction));

    assert_eq!(
        counter(&snapshotter, metrics::FRAMES_PROCESSED, Some(("direction", label))),
        1
    );
}

#[test]
fn codec_counts_frames_both_ways() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let codec = WebSocketCodec::new(Options::default());
    ::metrics::with_local_recorder(&recorder, || {
        let mut out = BytesMut::new();
        codec
            .encoder()
            .encode(Message::Binary(vec![1, 2, 3].into()), &mut out)
            .expect("encode");

        let mut decoder = codec.frame_decoder();
        let mut input = BytesMut::from(&server_frame(OP_TEXT, true, b"hi")[..]);
        assert_eq!(
            decoder.decode(&mut input).expect("decode"),
            Some(Message::Text("hi".into()))
        );
    });

    assert_eq!(
        counter(&snapshotter, metrics::FRAMES_PROCESSED, Some(("direction", "outbound"))),
        1
    );
    assert_eq!(
        counter(&snapshotter, metrics::FRAMES_PROCESSED, Some(("direction", "inbound"))),
        1
    );
}

#[test]
fn violations_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        let mut decoder = WebSocketCodec::new(Options::default()).frame_decoder();
        let mut input = BytesMut::from(&masked_frame(OP_TEXT, true, b"x", [1, 2, 3, 4])[..]);
        assert!(decoder.decode(&mut input).is_err());
    });

    assert_eq!(counter(&snapshotter, metrics::PROTOCOL_VIOLATIONS, None), 1);
}

#[test]
fn handler_panics_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        assert!(guard_callback("on_text_message", || panic!("boom")).is_none());
    });

    assert_eq!(counter(&snapshotter, metrics::HANDLER_PANICS, None), 1);
}

#[test]
fn connection_gauge_moves_both_ways() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_connections();
        metrics::inc_connections();
        metrics::dec_connections();
    });

    let gauge = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(k, _, _, _)| k.key().name() == metrics::CONNECTIONS_ACTIVE)
        .map(|(_, _, _, v)| v);
    assert!(
        matches!(gauge, Some(DebugValue::Gauge(g)) if (g.into_inner() - 1.0).abs() < f64::EPSILON),
        "{gauge:?}"
    );
}

#[test]
fn messages_are_labelled_by_kind() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || metrics::inc_messages("raw_text"));

    assert_eq!(
        counter(&snapshotter, metrics::MESSAGES_DELIVERED, Some(("kind", "raw_text"))),
        1
    );
}
