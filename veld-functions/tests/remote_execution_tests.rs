use serde_json::json;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use veld_functions::{
    Dispatcher, ExecutionRequest, ExecutionStrategy, FunctionsConfig, RemoteExecutor,
};

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

fn request_complete(data: &[u8]) -> bool {
    let Some(split) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&data[..split]);
    let declared = headers
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    data.len() >= split + 4 + declared
}

/// Serves exactly one request with a canned response and returns the base URL.
fn serve_once(response: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut data = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        data.extend_from_slice(&buf[..n]);
                        if request_complete(&data) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });
    format!("http://{}", addr)
}

#[test]
fn test_remote_success_envelope_is_mapped() {
    let body = r#"{"success":true,"value":7,"stdout":"hi\n","duration":0.25}"#;
    let url = serve_once(http_response("200 OK", body));

    let r = RemoteExecutor::new().run(
        "fn main(ctx) { 7 }",
        &json!({}),
        Duration::from_secs(5),
        &url,
    );
    assert!(r.success, "fault: {:?}", r.error_message);
    assert_eq!(r.value, Some(json!(7)));
    assert_eq!(r.stdout, "hi\n");
    assert_eq!(r.duration, Duration::from_secs_f64(0.25));
    assert_eq!(r.strategy_used, ExecutionStrategy::Remote);
}

#[test]
fn test_remote_fault_envelope_keeps_kind_and_trace() {
    let body = r#"{"success":false,"error_kind":"KeyError","error_message":"missing 'id'","trace":"at line 2"}"#;
    let url = serve_once(http_response("200 OK", body));

    let r = RemoteExecutor::new().run(
        "fn main(ctx) { ctx.id }",
        &json!({}),
        Duration::from_secs(5),
        &url,
    );
    assert!(!r.success);
    assert_eq!(r.error_kind.as_deref(), Some("KeyError"));
    assert_eq!(r.error_message.as_deref(), Some("missing 'id'"));
    assert_eq!(r.trace.as_deref(), Some("at line 2"));
}

#[test]
fn test_remote_http_error_status_becomes_fault() {
    let url = serve_once(http_response("500 Internal Server Error", "sandbox exploded"));

    let r = RemoteExecutor::new().run(
        "fn main(ctx) { 1 }",
        &json!({}),
        Duration::from_secs(5),
        &url,
    );
    assert!(!r.success);
    assert_eq!(r.error_kind.as_deref(), Some("HTTPError"));
    let message = r.error_message.unwrap();
    assert!(message.contains("500"), "message: {}", message);
    assert!(message.contains("sandbox exploded"), "message: {}", message);
}

#[test]
fn test_remote_unreachable_sandbox_is_connection_error() {
    // Bind then drop to get a port nothing is listening on.
    let url = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let r = RemoteExecutor::new().run(
        "fn main(ctx) { 1 }",
        &json!({}),
        Duration::from_secs(5),
        &url,
    );
    assert!(!r.success);
    assert_eq!(r.error_kind.as_deref(), Some("ConnectionError"));
}

#[test]
fn test_remote_garbage_body_is_json_decode_error() {
    let url = serve_once(http_response("200 OK", "not json at all"));

    let r = RemoteExecutor::new().run(
        "fn main(ctx) { 1 }",
        &json!({}),
        Duration::from_secs(5),
        &url,
    );
    assert!(!r.success);
    assert_eq!(r.error_kind.as_deref(), Some("JSONDecodeError"));
}

#[test]
fn test_dispatcher_forwards_explicit_remote_to_sandbox() {
    let body = r#"{"success":true,"value":"ok","stdout":"","duration":0.01}"#;
    let url = serve_once(http_response("200 OK", body));

    let dispatcher = Dispatcher::new(FunctionsConfig {
        sandbox_url: Some(url),
        ..FunctionsConfig::default()
    });
    let request = ExecutionRequest::new("fn main(ctx) { \"ok\" }", json!({}))
        .with_strategy(ExecutionStrategy::Remote)
        .with_timeout(Duration::from_secs(5));
    let r = dispatcher.dispatch(&request).unwrap();
    assert!(r.success, "fault: {:?}", r.error_message);
    assert_eq!(r.value, Some(json!("ok")));
    assert_eq!(r.strategy_used, ExecutionStrategy::Remote);
}
