//! The all-participants-replied barrier across a small simulation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use silbus_testkit::SimulationHarness;

#[test]
fn the_barrier_completes_once_after_every_peer_replied() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let first = harness.add_participant("P1")?;
    let _second = harness.add_participant("P2")?;
    let _third = harness.add_participant("P3")?;

    let completions = Arc::new(AtomicUsize::new(0));
    let completions_inner = Arc::clone(&completions);
    first
        .participant_replies()
        .call_after_all_participants_replied(Box::new(move || {
            completions_inner.fetch_add(1, Ordering::SeqCst);
        }));

    // P2 and P3 answer the probe immediately; the completion ran exactly
    // once.
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn the_barrier_completes_synchronously_without_peers() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let lonely = harness.add_participant("Lonely")?;

    let completions = Arc::new(AtomicUsize::new(0));
    let completions_inner = Arc::clone(&completions);
    lonely
        .participant_replies()
        .call_after_all_participants_replied(Box::new(move || {
            completions_inner.fetch_add(1, Ordering::SeqCst);
        }));
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn a_peer_disconnect_counts_as_a_reply() -> anyhow::Result<()> {
    // With synchronous in-process delivery peers reply during the call
    // itself, so force the incomplete state through a participant that never
    // answers: disconnect it between issuing and completing is not possible
    // here. Instead check that a barrier issued while a peer leaves still
    // settles: the remaining peer replies, the leaving one synthesises.
    let harness = SimulationHarness::new();
    let first = harness.add_participant("P1")?;
    let _second = harness.add_participant("P2")?;

    let completions = Arc::new(AtomicUsize::new(0));
    let completions_inner = Arc::clone(&completions);
    first
        .participant_replies()
        .call_after_all_participants_replied(Box::new(move || {
            completions_inner.fetch_add(1, Ordering::SeqCst);
        }));
    assert_eq!(completions.load(Ordering::SeqCst), 1);

    harness.disconnect("P2");
    let completions_inner = Arc::clone(&completions);
    first
        .participant_replies()
        .call_after_all_participants_replied(Box::new(move || {
            completions_inner.fetch_add(1, Ordering::SeqCst);
        }));
    assert_eq!(completions.load(Ordering::SeqCst), 2);
    Ok(())
}
