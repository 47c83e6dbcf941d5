mod common;

use common::LspTestHarness;
use std::time::Duration;

/// Drives a full insertion run against the real stdio binary: `initialize`,
/// `didOpen`, `runPrapti` via `workspace/executeCommand`, answering the
/// `workspace/applyEdit` requests the driver sends back, then `stopPrapti`.
#[test]
fn test_run_prapti_streams_text_into_the_document() {
    let mut harness = LspTestHarness::spawn();

    harness.initialize().expect("Failed to initialize");
    harness.initialized();

    let uri = "file:///tmp/prapti-ls-test/doc.txt";
    let did_open = format!(
        r#"{{"jsonrpc":"2.0","method":"textDocument/didOpen","params":{{"textDocument":{{"uri":"{uri}","languageId":"plaintext","version":1,"text":""}}}}}}"#
    );
    harness.send(&did_open).expect("Failed to send didOpen");
    std::thread::sleep(Duration::from_millis(100));

    let run_command = format!(
        r#"{{"jsonrpc":"2.0","id":10,"method":"workspace/executeCommand","params":{{"command":"runPrapti","arguments":["{uri}"]}}}}"#
    );
    harness.send(&run_command).expect("Failed to send executeCommand");

    let mut apply_edit_requests = 0;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        let Some(message) = harness.read_response() else { break };
        if message.contains("\"workspace/applyEdit\"") {
            apply_edit_requests += 1;
            if let Some(id) = extract_request_id(&message) {
                let response = format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{"applied":true}}}}"#);
                harness.send(&response).expect("Failed to respond to applyEdit");
            }
        }
        if apply_edit_requests >= 4 {
            break;
        }
    }
    assert!(apply_edit_requests > 0, "Server should have requested at least one applyEdit");

    let stop_command = format!(
        r#"{{"jsonrpc":"2.0","id":11,"method":"workspace/executeCommand","params":{{"command":"stopPrapti","arguments":["{uri}"]}}}}"#
    );
    harness.send(&stop_command).expect("Failed to send stopPrapti");

    // Drain and answer any trailing applyEdit requests (the cursor-glyph
    // removal edit sent once the stream tears down).
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        let Some(message) = harness.read_response() else { break };
        if message.contains("\"workspace/applyEdit\"") {
            if let Some(id) = extract_request_id(&message) {
                let response = format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{"applied":true}}}}"#);
                let _ = harness.send(&response);
            }
        }
    }

    harness.shutdown();
}

fn extract_request_id(message: &str) -> Option<i64> {
    let key = "\"id\":";
    let start = message.find(key)? + key.len();
    let rest = message[start..].trim_start();
    let end = rest.find(|c: char| !c.is_ascii_digit())?;
    rest[..end].parse().ok()
}
