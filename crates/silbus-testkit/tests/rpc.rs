//! RPC client/server matching, calls and failure delivery.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use silbus_core::time::TimeProvider;
use silbus_rpc::{RpcCallEvent, RpcCallResultEvent, RpcCallStatus, RpcSpec};
use silbus_testkit::SimulationHarness;

type ResultRecord = Arc<Mutex<Vec<RpcCallResultEvent>>>;
type CallRecord = Arc<Mutex<Vec<RpcCallEvent>>>;

fn result_recorder() -> (Arc<dyn Fn(&RpcCallResultEvent) + Send + Sync>, ResultRecord) {
    let record: ResultRecord = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&record);
    (
        Arc::new(move |event: &RpcCallResultEvent| {
            sink.lock().push(event.clone());
        }),
        record,
    )
}

fn call_recorder() -> (Arc<dyn Fn(RpcCallEvent) + Send + Sync>, CallRecord) {
    let record: CallRecord = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&record);
    (
        Arc::new(move |event: RpcCallEvent| {
            sink.lock().push(event);
        }),
        record,
    )
}

#[test]
fn call_without_a_server_fails_synchronously() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let client_side = harness.add_participant("ClientSide")?;

    let (handler, results) = result_recorder();
    let client = client_side.create_rpc_client(
        "Client",
        RpcSpec::new("Add", "application/json"),
        Some(handler),
    )?;

    client.call(vec![1, 2, 3], 42)?;

    let results = results.lock();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].call_status, RpcCallStatus::ServerNotReachable);
    assert!(results[0].result_data.is_empty());
    assert_eq!(results[0].user_context, 42);
    Ok(())
}

#[test]
fn calls_round_trip_to_a_matched_server() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let server_side = harness.add_participant("ServerSide")?;
    let client_side = harness.add_participant("ClientSide")?;

    let (call_handler, calls) = call_recorder();
    let server = server_side.create_rpc_server(
        "Server",
        RpcSpec::new("Add", "application/json"),
        Some(call_handler),
    )?;

    let (result_handler, results) = result_recorder();
    let client = client_side.create_rpc_client(
        "Client",
        RpcSpec::new("Add", "application/json"),
        Some(result_handler),
    )?;

    client.call(vec![1, 2], 7)?;
    {
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].data, vec![1, 2]);
    }

    let handle = calls.lock()[0].call_handle.clone();
    server.submit_result(&handle, &[3])?;

    let results = results.lock();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].call_status, RpcCallStatus::Success);
    assert_eq!(results[0].result_data, vec![3]);
    assert_eq!(results[0].user_context, 7);

    // Double submission is a contract violation.
    drop(results);
    assert!(server.submit_result(&handle, &[3]).is_err());
    Ok(())
}

#[test]
fn mismatched_function_names_do_not_pair() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let server_side = harness.add_participant("ServerSide")?;
    let client_side = harness.add_participant("ClientSide")?;

    let (call_handler, _calls) = call_recorder();
    server_side.create_rpc_server(
        "Server",
        RpcSpec::new("Multiply", "application/json"),
        Some(call_handler),
    )?;

    let (result_handler, results) = result_recorder();
    let client = client_side.create_rpc_client(
        "Client",
        RpcSpec::new("Add", "application/json"),
        Some(result_handler),
    )?;

    client.call(vec![1], 0)?;
    assert_eq!(
        results.lock()[0].call_status,
        RpcCallStatus::ServerNotReachable
    );
    Ok(())
}

#[test]
fn a_server_without_a_handler_reports_internal_server_error() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let server_side = harness.add_participant("ServerSide")?;
    let client_side = harness.add_participant("ClientSide")?;

    server_side.create_rpc_server("Server", RpcSpec::new("Add", "application/json"), None)?;

    let (result_handler, results) = result_recorder();
    let client = client_side.create_rpc_client(
        "Client",
        RpcSpec::new("Add", "application/json"),
        Some(result_handler),
    )?;

    client.call(vec![1], 0)?;
    let results = results.lock();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].call_status, RpcCallStatus::InternalServerError);
    Ok(())
}

#[test]
fn a_disconnect_mid_call_synthesises_the_missing_result() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let fast_side = harness.add_participant("FastServer")?;
    let slow_side = harness.add_participant("SlowServer")?;
    let client_side = harness.add_participant("ClientSide")?;

    let (fast_handler, fast_calls) = call_recorder();
    let fast_server = fast_side.create_rpc_server(
        "Server",
        RpcSpec::new("Add", "application/json"),
        Some(fast_handler),
    )?;
    let (slow_handler, slow_calls) = call_recorder();
    slow_side.create_rpc_server(
        "Server",
        RpcSpec::new("Add", "application/json"),
        Some(slow_handler),
    )?;

    let (result_handler, results) = result_recorder();
    let client = client_side.create_rpc_client(
        "Client",
        RpcSpec::new("Add", "application/json"),
        Some(result_handler),
    )?;

    client.call(vec![1, 2, 3], 11)?;
    assert_eq!(fast_calls.lock().len(), 1);
    assert_eq!(slow_calls.lock().len(), 1);

    // The fast server answers, the slow one's participant disconnects.
    let handle = fast_calls.lock()[0].call_handle.clone();
    fast_server.submit_result(&handle, &[4, 5])?;
    harness.disconnect("SlowServer");

    let results = results.lock();
    assert_eq!(results.len(), 2);
    let mut statuses: Vec<RpcCallStatus> =
        results.iter().map(|event| event.call_status).collect();
    statuses.sort_by_key(|status| format!("{status:?}"));
    assert_eq!(
        statuses,
        vec![RpcCallStatus::RecipientDisconnected, RpcCallStatus::Success]
    );
    let success = results
        .iter()
        .find(|event| event.call_status == RpcCallStatus::Success)
        .expect("success result");
    assert_eq!(success.result_data, vec![4, 5]);
    assert!(results
        .iter()
        .all(|event| event.user_context == 11));
    Ok(())
}

#[test]
fn an_expired_timeout_settles_the_call_and_late_results_are_dropped() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let server_side = harness.add_participant("ServerSide")?;
    let client_side = harness.add_participant("ClientSide")?;

    let (call_handler, calls) = call_recorder();
    let server = server_side.create_rpc_server(
        "Server",
        RpcSpec::new("Add", "application/json"),
        Some(call_handler),
    )?;

    let (result_handler, results) = result_recorder();
    let client = client_side.create_rpc_client(
        "Client",
        RpcSpec::new("Add", "application/json"),
        Some(result_handler),
    )?;

    client.call_with_timeout(vec![1], Duration::from_millis(10), 5)?;
    assert!(results.lock().is_empty());

    harness.time().advance(Duration::from_millis(20));
    client.process_timeouts(harness.time().now());

    {
        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].call_status, RpcCallStatus::Timeout);
        assert_eq!(results[0].user_context, 5);
    }

    // The server answers too late; the client has forgotten the call.
    let handle = calls.lock()[0].call_handle.clone();
    server.submit_result(&handle, &[9])?;
    assert_eq!(results.lock().len(), 1);
    Ok(())
}
