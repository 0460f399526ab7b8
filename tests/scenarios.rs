//! End-to-end scenarios against the raw `Element`/`connector` API
//! (SPEC_FULL.md §8: S1-S6).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use streamforge::connector::connect;
use streamforge::element::{Element, ElementContext, ElementImpl};
use streamforge::error::ErrorCode;
use streamforge::frame::{ChannelId, Frame, ObjectMetadata, PixelFormat};

struct PassThrough;

impl ElementImpl for PassThrough {
    fn init_internal(&mut self, _configure: &Value) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn do_work(&mut self, ctx: &mut ElementContext) -> Result<(), ErrorCode> {
        if let Some(item) = ctx.pop_input(0) {
            ctx.push_output(0, item, Duration::from_millis(200))?;
        }
        Ok(())
    }
}

struct SleepingPassThrough {
    sleep: Duration,
}

impl ElementImpl for SleepingPassThrough {
    fn init_internal(&mut self, _configure: &Value) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn do_work(&mut self, ctx: &mut ElementContext) -> Result<(), ErrorCode> {
        if let Some(item) = ctx.pop_input(0) {
            std::thread::sleep(self.sleep);
            ctx.push_output(0, item, Duration::from_millis(5))?;
        }
        Ok(())
    }
}

struct Recorder {
    items: Arc<Mutex<Vec<Arc<ObjectMetadata>>>>,
}

impl ElementImpl for Recorder {
    fn init_internal(&mut self, _configure: &Value) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn do_work(&mut self, ctx: &mut ElementContext) -> Result<(), ErrorCode> {
        if let Some(item) = ctx.pop_input(0) {
            self.items.lock().unwrap().push(item);
        }
        Ok(())
    }
}

fn item(channel_id: ChannelId, frame_id: u64, eos: bool) -> Arc<ObjectMetadata> {
    Arc::new(ObjectMetadata::from_frame(Frame {
        channel_id,
        frame_id,
        width: 1,
        height: 1,
        format: PixelFormat::Bgr,
        device_handle: 0,
        image_ref: Vec::new(),
        end_of_stream: eos,
    }))
}

/// S1 — Linear three-stage: src -> mid -> sink, capacity 4, 100 items,
/// expect all 100 delivered to sink in order with no failed pushes.
#[test]
fn s1_linear_three_stage_delivers_all_in_order() {
    let src = Element::new(1, "src", Box::new(PassThrough));
    let mid = Element::new(2, "mid", Box::new(PassThrough));
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Element::new(3, "sink", Box::new(Recorder { items: recorded.clone() }));

    connect(&src, 0, &mid, 0, 4).unwrap();
    connect(&mid, 0, &sink, 0, 4).unwrap();
    for element in [&src, &mid, &sink] {
        element.init(&Value::Null).unwrap();
        element.start().unwrap();
    }

    for i in 0..100u64 {
        src.push_input(0, item(1, i, false), Duration::from_secs(2)).unwrap();
    }

    std::thread::sleep(Duration::from_millis(500));
    for element in [&src, &mid, &sink] {
        element.stop().unwrap();
    }

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.len(), 100);
    for (idx, received) in recorded.iter().enumerate() {
        assert_eq!(received.frame.as_ref().unwrap().frame_id, idx as u64);
    }
}

/// S2 — Backpressure: a slow consumer with a small input pipe forces a
/// fast producer's 1ms-timeout pushes to fail often, but every push that
/// does succeed is later observed at the sink.
#[test]
fn s2_backpressure_produces_timeouts_but_no_lost_successes() {
    let mid = Element::new(4, "mid", Box::new(SleepingPassThrough { sleep: Duration::from_millis(10) }));
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Element::new(5, "sink", Box::new(Recorder { items: recorded.clone() }));

    connect(&mid, 0, &sink, 0, 4).unwrap();
    mid.configure_input(0, 2);
    for element in [&mid, &sink] {
        element.init(&Value::Null).unwrap();
        element.start().unwrap();
    }

    let mut timeouts = 0usize;
    let mut successes = 0usize;
    for i in 0..50u64 {
        match mid.push_input(0, item(1, i, false), Duration::from_millis(1)) {
            Ok(()) => successes += 1,
            Err(_) => timeouts += 1,
        }
    }

    std::thread::sleep(Duration::from_millis(800));
    mid.stop().unwrap();
    sink.stop().unwrap();

    assert!(timeouts >= 20, "expected heavy backpressure, got {timeouts} timeouts");
    assert_eq!(recorded.lock().unwrap().len(), successes);
}

/// S3 — EOS propagation: 5 items then an EOS, sink sees exactly 6
/// deliveries, the last flagged end_of_stream.
#[test]
fn s3_eos_propagation_terminates_the_stream() {
    let mid = Element::new(6, "mid", Box::new(PassThrough));
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Element::new(7, "sink", Box::new(Recorder { items: recorded.clone() }));

    connect(&mid, 0, &sink, 0, 8).unwrap();
    for element in [&mid, &sink] {
        element.init(&Value::Null).unwrap();
        element.start().unwrap();
    }

    for i in 0..5u64 {
        mid.push_input(0, item(1, i, false), Duration::from_secs(1)).unwrap();
    }
    mid.push_input(0, item(1, 5, true), Duration::from_secs(1)).unwrap();

    std::thread::sleep(Duration::from_millis(200));
    mid.stop().unwrap();
    sink.stop().unwrap();

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.len(), 6);
    assert!(!recorded[4].is_end_of_stream());
    assert!(recorded[5].is_end_of_stream());
}

/// S4 — Pause/Resume: items delivered while paused are withheld until
/// resume, never dropped.
#[test]
fn s4_pause_withholds_delivery_until_resume() {
    let mid = Element::new(8, "mid", Box::new(PassThrough));
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Element::new(9, "sink", Box::new(Recorder { items: recorded.clone() }));

    connect(&mid, 0, &sink, 0, 32).unwrap();
    mid.configure_input(0, 32);
    for element in [&mid, &sink] {
        element.init(&Value::Null).unwrap();
        element.start().unwrap();
    }

    for i in 0..10u64 {
        mid.push_input(0, item(1, i, false), Duration::from_millis(200)).unwrap();
    }
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(recorded.lock().unwrap().len(), 10);

    mid.pause().unwrap();
    for i in 10..14u64 {
        mid.push_input(0, item(1, i, false), Duration::from_millis(200)).unwrap();
    }
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(recorded.lock().unwrap().len(), 10, "no work while paused");

    mid.resume().unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(recorded.lock().unwrap().len(), 14);

    mid.stop().unwrap();
    sink.stop().unwrap();
}

/// S5 — Fan-out: one output port wired to two independent consumers,
/// both see the full, independently-FIFO sequence.
#[test]
fn s5_fan_out_delivers_full_sequence_to_every_consumer() {
    let src = Element::new(10, "src", Box::new(PassThrough));
    let recorded_a = Arc::new(Mutex::new(Vec::new()));
    let recorded_b = Arc::new(Mutex::new(Vec::new()));
    let sink_a = Element::new(11, "sink_a", Box::new(Recorder { items: recorded_a.clone() }));
    let sink_b = Element::new(12, "sink_b", Box::new(Recorder { items: recorded_b.clone() }));

    connect(&src, 0, &sink_a, 0, 16).unwrap();
    connect(&src, 0, &sink_b, 0, 16).unwrap();
    for element in [&src, &sink_a, &sink_b] {
        element.init(&Value::Null).unwrap();
        element.start().unwrap();
    }

    for i in 0..20u64 {
        src.push_input(0, item(1, i, false), Duration::from_secs(1)).unwrap();
    }

    std::thread::sleep(Duration::from_millis(300));
    for element in [&src, &sink_a, &sink_b] {
        element.stop().unwrap();
    }

    for recorded in [&recorded_a, &recorded_b] {
        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 20);
        for (idx, received) in recorded.iter().enumerate() {
            assert_eq!(received.frame.as_ref().unwrap().frame_id, idx as u64);
        }
    }
}

/// S6 — Sink handler bypass: a handler registered on an output port runs
/// synchronously on the pushing thread, and the wired downstream pipe
/// never receives anything.
#[test]
fn s6_sink_handler_bypasses_wired_downstream() {
    let src = Element::new(13, "src", Box::new(PassThrough));
    let downstream = Element::new(14, "downstream", Box::new(PassThrough));
    connect(&src, 0, &downstream, 0, 16).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    src.set_sink_handler(0, Box::new(move |item| seen2.lock().unwrap().push(item)));

    src.init(&Value::Null).unwrap();
    src.start().unwrap();

    for i in 0..10u64 {
        src.push_input(0, item(1, i, false), Duration::from_secs(1)).unwrap();
    }
    std::thread::sleep(Duration::from_millis(200));
    src.stop().unwrap();

    assert_eq!(seen.lock().unwrap().len(), 10);
    assert_eq!(downstream.input_pipe_len(0), Some(0));
}
