//! Demo: a provider serving calls and publishing a property.
//!
//! Mirrors the provider side of a thermostat-ish service: answers `ReadOut`
//! calls and publishes `Temperature` changes that an observing consumer
//! polls in. Run with `cargo run --example serve`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use pollbridge::engine::loopback::LoopbackEngine;
use pollbridge::Bridge;

const DESCRIPTOR: &str = "\
function ReadOut() (Value int)
property Temperature: Value int";

fn main() {
    tracing_subscriber::fmt::init();

    let bridge = Arc::new(Bridge::new(Arc::new(LoopbackEngine::new())));
    let provider = bridge.create_provider(DESCRIPTOR).expect("create provider");
    let consumer = bridge.create_consumer(DESCRIPTOR).expect("create consumer");

    bridge
        .start_observe(consumer, "Temperature")
        .expect("start observe");

    // Provider thread: publish three temperature steps, then answer one
    // ReadOut call.
    let server = bridge.clone();
    let serving = thread::spawn(move || {
        for temperature in [19, 20, 21] {
            let value = serde_json::json!({ "Value": temperature });
            server
                .set_property(
                    provider,
                    "Temperature",
                    Bytes::from(serde_json::to_vec(&value).unwrap()),
                )
                .expect("set property");
            thread::sleep(Duration::from_millis(5));
        }

        loop {
            if server.request_available(provider).unwrap_or(false) {
                let request = server.take_next_request_id(provider).expect("take request");
                let value = serde_json::json!({ "Value": 21 });
                server
                    .reply(provider, request, Bytes::from(serde_json::to_vec(&value).unwrap()))
                    .expect("reply");
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
    });

    // Poll three observed changes in.
    let mut changes = 0;
    while changes < 3 {
        if bridge.change_available(consumer).expect("change available") {
            let name = bridge.peek_change_name(consumer).expect("change name");
            let value = bridge.peek_change_value(consumer).expect("change value");
            let value: serde_json::Value = serde_json::from_slice(&value).expect("decode");
            println!("consumer: {name} changed to {value}");
            bridge.clear_change(consumer).expect("clear change");
            changes += 1;
        } else {
            thread::sleep(Duration::from_millis(5));
        }
    }

    // One final synchronous read plus a round-trip call.
    let cached = bridge.get_property(consumer, "Temperature").expect("get property");
    let cached: serde_json::Value = serde_json::from_slice(&cached).expect("decode");
    println!("consumer: cached temperature {cached}");

    let request = bridge.call(consumer, "ReadOut", Bytes::new()).expect("call");
    while !bridge.result_ready(consumer, request).expect("result ready") {
        thread::sleep(Duration::from_millis(5));
    }
    let answer = bridge.result_parameter(consumer, request).expect("result");
    let answer: serde_json::Value = serde_json::from_slice(&answer).expect("decode");
    println!("consumer: ReadOut answered {answer}");

    serving.join().unwrap();
}
