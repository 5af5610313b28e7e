// SPDX-License-Identifier: MIT OR Apache-2.0
//! Full gateway flow: Claude request → transcoder → dispatcher → mock
//! upstream → decoder → emitter → Claude SSE, with the upstream request
//! body inspected on the wire.

use qgw_claude::{ClaudeRequest, StreamEvent};
use qgw_dispatch::{Dispatcher, RequestTemplate};
use qgw_error::GatewayError;
use qgw_eventstream::{HeaderValue, Headers, encode_frame};
use qgw_stream::{StreamEmitter, assemble_response};
use qgw_transcode::convert_request;
use serde_json::json;
use std::collections::BTreeMap;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn frame(event_type: &str, payload: serde_json::Value) -> Vec<u8> {
    let mut headers = Headers::new();
    headers.push(":event-type", HeaderValue::String(event_type.into()));
    headers.push(":message-type", HeaderValue::String("event".into()));
    encode_frame(&headers, &serde_json::to_vec(&payload).unwrap())
}

fn upstream_body(content: &str) -> Vec<u8> {
    let mut body = frame("initial-response", json!({"conversationId": "c-e2e"}));
    body.extend(frame("assistantResponseEvent", json!({"content": content})));
    body.extend(frame("assistantResponseEnd", json!({})));
    body
}

fn dispatcher_for(server: &MockServer) -> Dispatcher {
    let mut headers = BTreeMap::new();
    headers.insert("user-agent".to_string(), "aws-sdk-rust/1.3.9".to_string());
    let template = RequestTemplate::from_parts(format!("{}/chat", server.uri()), headers);
    Dispatcher::new(template).unwrap()
}

fn claude_request(raw: serde_json::Value) -> ClaudeRequest {
    serde_json::from_value(raw).unwrap()
}

async fn drive_stream(
    dispatcher: &Dispatcher,
    token: &str,
    request: &ClaudeRequest,
) -> Result<Vec<StreamEvent>, GatewayError> {
    let payload = convert_request(request, None)?;
    let mut stream = dispatcher.send(token, &payload).await?;
    let mut emitter = StreamEmitter::new(&request.model, 0, None);
    let mut events = Vec::new();
    while let Some(upstream) = stream.next_event().await? {
        events.extend(emitter.handle_event(&upstream));
    }
    events.extend(emitter.finish());
    Ok(events)
}

#[tokio::test]
async fn streaming_exchange_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(header("authorization", "Bearer tok-e2e"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(upstream_body("Hello there")))
        .mount(&server)
        .await;

    let request = claude_request(json!({
        "model": "claude-sonnet-4-5-20250929",
        "messages": [{"role": "user", "content": "hi"}],
        "max_tokens": 256,
        "stream": true
    }));

    let dispatcher = dispatcher_for(&server);
    let events = drive_stream(&dispatcher, "tok-e2e", &request).await.unwrap();

    let transcript: String = events.iter().map(StreamEvent::to_sse).collect();
    assert!(transcript.contains("event: message_start"));
    assert!(transcript.contains("\"text\":\"Hello there\""));
    assert!(transcript.contains("event: message_stop"));

    // The dated model name was mapped before hitting the wire.
    let received = &server.received_requests().await.unwrap()[0];
    let body: serde_json::Value = serde_json::from_slice(&received.body).unwrap();
    assert_eq!(
        body["conversationState"]["currentMessage"]["userInputMessage"]["modelId"],
        "claude-sonnet-4.5"
    );
    assert_eq!(body["conversationState"]["chatTriggerType"], "MANUAL");
}

#[tokio::test]
async fn tool_results_are_reordered_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(upstream_body("done")))
        .mount(&server)
        .await;

    let request = claude_request(json!({
        "model": "claude-sonnet-4.5",
        "messages": [
            {"role": "user", "content": "fetch all three"},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "A", "name": "get", "input": {"n": 1}},
                {"type": "tool_use", "id": "B", "name": "get", "input": {"n": 2}},
                {"type": "tool_use", "id": "C", "name": "get", "input": {"n": 3}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "C", "content": "third"},
                {"type": "tool_result", "tool_use_id": "A", "content": "first"},
                {"type": "tool_result", "tool_use_id": "B", "content": "second"}
            ]}
        ],
        "stream": true
    }));

    let dispatcher = dispatcher_for(&server);
    drive_stream(&dispatcher, "tok", &request).await.unwrap();

    let received = &server.received_requests().await.unwrap()[0];
    let body: serde_json::Value = serde_json::from_slice(&received.body).unwrap();
    let results = &body["conversationState"]["currentMessage"]["userInputMessage"]
        ["userInputMessageContext"]["toolResults"];
    let ids: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["toolUseId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn tool_call_loop_never_reaches_the_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(upstream_body("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let call = json!({"role": "assistant", "content": [
        {"type": "tool_use", "id": "x", "name": "search", "input": {"q": "x"}}]});
    let request = claude_request(json!({
        "model": "claude-sonnet-4.5",
        "messages": [call.clone(), call.clone(), call],
        "stream": true
    }));

    let dispatcher = dispatcher_for(&server);
    let err = drive_stream(&dispatcher, "tok", &request).await.unwrap_err();
    assert!(matches!(err, GatewayError::LoopDetected(_)));
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn non_streaming_request_assembles_one_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(upstream_body(
            "summary: <thinking>check the numbers</thinking>all good",
        )))
        .mount(&server)
        .await;

    let request = claude_request(json!({
        "model": "claude-sonnet-4.5",
        "messages": [{"role": "user", "content": "status?"}]
    }));

    let dispatcher = dispatcher_for(&server);
    let events = drive_stream(&dispatcher, "tok", &request).await.unwrap();
    let response = assemble_response(&events, &request.model);

    assert_eq!(response.id, "c-e2e");
    assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
    assert_eq!(response.content.len(), 3);
    assert_eq!(response.content[0]["text"], "summary: ");
    assert_eq!(response.content[1]["thinking"], "check the numbers");
    assert_eq!(response.content[2]["text"], "all good");
}

#[tokio::test]
async fn upstream_rejection_maps_to_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-amzn-errortype", "ThrottlingException")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let request = claude_request(json!({
        "model": "claude-sonnet-4.5",
        "messages": [{"role": "user", "content": "hi"}],
        "stream": true
    }));

    let dispatcher = dispatcher_for(&server);
    let err = drive_stream(&dispatcher, "tok", &request).await.unwrap_err();
    match &err {
        GatewayError::Upstream {
            status, error_type, ..
        } => {
            assert_eq!(*status, 429);
            assert_eq!(error_type.as_deref(), Some("ThrottlingException"));
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
    assert_eq!(err.http_status(), 429);
}
