//! Demo: a single-target call, polled until the answer arrives.
//!
//! A provider thread serves `SayHello`; the main thread plays a poll-driven
//! caller. Run with `cargo run --example call`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use pollbridge::engine::loopback::LoopbackEngine;
use pollbridge::Bridge;

const DESCRIPTOR: &str = "\
function SayHello(Greeting string) (Answer string)
tag example_tag";

fn main() {
    tracing_subscriber::fmt::init();

    let bridge = Arc::new(Bridge::new(Arc::new(LoopbackEngine::new())));
    let provider = bridge.create_provider(DESCRIPTOR).expect("create provider");
    let consumer = bridge.create_consumer(DESCRIPTOR).expect("create consumer");

    // Provider side, on its own thread: serve exactly one request.
    let server = bridge.clone();
    let serving = thread::spawn(move || loop {
        if server.request_available(provider).unwrap_or(false) {
            let request = server.take_next_request_id(provider).expect("take request");
            let greeting = server
                .request_parameter(provider, request)
                .expect("request parameter");
            println!("provider: got {:?}", greeting);

            let answer = serde_json::json!({ "Answer": "Hello yourself!" });
            server
                .reply(provider, request, Bytes::from(serde_json::to_vec(&answer).unwrap()))
                .expect("reply");
            break;
        }
        thread::sleep(Duration::from_millis(10));
    });

    let greeting = serde_json::json!({ "Greeting": "Hello" });
    let request = bridge
        .call(consumer, "SayHello", Bytes::from(serde_json::to_vec(&greeting).unwrap()))
        .expect("call");

    print!("waiting for answer");
    while !bridge.result_ready(consumer, request).expect("result ready") {
        print!(".");
        thread::sleep(Duration::from_millis(10));
    }

    let answer = bridge
        .result_parameter(consumer, request)
        .expect("result parameter");
    let answer: serde_json::Value = serde_json::from_slice(&answer).expect("decode answer");
    println!("\nconsumer: got {answer}");

    serving.join().unwrap();
}
