mod common;

use common::LspTestHarness;

#[test]
fn test_initialize_returns_capabilities() {
    let mut harness = LspTestHarness::spawn();

    let response = harness.initialize().expect("Failed to get initialize response");

    assert!(response.contains("capabilities"), "Response should contain capabilities");
    assert!(response.contains("textDocumentSync"), "Should declare incremental sync");
    assert!(response.contains("executeCommandProvider"), "Should support workspace/executeCommand");
    assert!(response.contains("runPrapti"), "Should advertise the runPrapti command");
    assert!(response.contains("stopPrapti"), "Should advertise the stopPrapti command");
    assert!(response.contains("codeActionProvider"), "Should support textDocument/codeAction");

    harness.shutdown();
}

#[test]
fn test_initialize_returns_server_info() {
    let mut harness = LspTestHarness::spawn();

    let response = harness.initialize().expect("Failed to get initialize response");

    assert!(response.contains("serverInfo"), "Response should contain serverInfo");
    assert!(response.contains("prapti-ls"), "Server name should be prapti-ls");

    harness.shutdown();
}
