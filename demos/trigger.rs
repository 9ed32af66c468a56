//! Demo: fire-and-forget triggers.
//!
//! The consumer fires `Notify` triggers; the provider polls them in and
//! prints them. No result tracking exists on either side. Run with
//! `cargo run --example trigger`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use pollbridge::engine::loopback::LoopbackEngine;
use pollbridge::Bridge;

const DESCRIPTOR: &str = "function Notify(Event string)";

fn main() {
    tracing_subscriber::fmt::init();

    let bridge = Arc::new(Bridge::new(Arc::new(LoopbackEngine::new())));
    let provider = bridge.create_provider(DESCRIPTOR).expect("create provider");
    let consumer = bridge.create_consumer(DESCRIPTOR).expect("create consumer");

    for i in 0..3 {
        let event = serde_json::json!({ "Event": format!("event-{i}") });
        bridge
            .trigger(consumer, "Notify", Bytes::from(serde_json::to_vec(&event).unwrap()))
            .expect("trigger");
    }

    let mut received = 0;
    while received < 3 {
        if bridge.request_available(provider).expect("request available") {
            let request = bridge.take_next_request_id(provider).expect("take request");
            let event = bridge
                .request_parameter(provider, request)
                .expect("request parameter");
            let event: serde_json::Value = serde_json::from_slice(&event).expect("decode");
            println!("provider: {event}");
            received += 1;
        } else {
            thread::sleep(Duration::from_millis(10));
        }
    }
}
