//! Discovery bootstrap and the service directory across participants.

use std::sync::Arc;

use parking_lot::Mutex;

use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::keys;
use silbus_core::messages::discovery::ServiceDiscoveryEventType;
use silbus_pubsub::PubSubSpec;
use silbus_testkit::SimulationHarness;

type EventRecord = Arc<Mutex<Vec<(ServiceDiscoveryEventType, ServiceDescriptor)>>>;

fn recording_handler() -> (
    Arc<dyn Fn(ServiceDiscoveryEventType, &ServiceDescriptor) + Send + Sync>,
    EventRecord,
) {
    let record: EventRecord = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&record);
    (
        Arc::new(move |event_type, descriptor: &ServiceDescriptor| {
            sink.lock().push((event_type, descriptor.clone()));
        }),
        record,
    )
}

#[test]
fn a_late_joiner_learns_all_existing_services() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let early = harness.add_participant("Early")?;

    // Services created before anyone else is connected.
    early.create_data_publisher("Pub1", PubSubSpec::new("Telemetry", "application/json"))?;
    early.create_data_publisher("Pub2", PubSubSpec::new("Telemetry", "application/json"))?;

    let late = harness.add_participant("Late")?;

    // The specific store was filled by the targeted full-list announcement;
    // registering a specific handler replays both publishers.
    let (handler, record) = recording_handler();
    late.service_discovery().register_specific_service_discovery_handler(
        handler,
        keys::CONTROLLER_TYPE_DATA_PUBLISHER,
        "Telemetry",
        &[],
    );

    let record = record.lock();
    assert_eq!(record.len(), 2);
    assert!(record
        .iter()
        .all(|(event_type, _)| *event_type == ServiceDiscoveryEventType::ServiceCreated));
    let mut names: Vec<&str> = record
        .iter()
        .map(|(_, descriptor)| descriptor.service_name())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Pub1", "Pub2"]);
    Ok(())
}

#[test]
fn both_sides_of_a_connection_learn_each_other() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let first = harness.add_participant("First")?;
    first.create_data_publisher("Pub1", PubSubSpec::new("Telemetry", "application/json"))?;

    let second = harness.add_participant("Second")?;
    second.create_data_publisher("Pub2", PubSubSpec::new("Telemetry", "application/json"))?;

    let first_knows: Vec<String> = first
        .service_discovery()
        .services()
        .iter()
        .map(|descriptor| descriptor.to_string())
        .collect();
    let second_knows: Vec<String> = second
        .service_discovery()
        .services()
        .iter()
        .map(|descriptor| descriptor.to_string())
        .collect();

    assert!(first_knows.iter().any(|name| name.contains("Pub2")));
    assert!(second_knows.iter().any(|name| name.contains("Pub1")));
    // The internal services of the peer are known as well.
    assert!(first_knows
        .iter()
        .any(|name| name == "Second/InternalController/ServiceDiscovery"));
    Ok(())
}

#[test]
fn published_samples_reach_matched_subscribers() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let publisher_side = harness.add_participant("PubSide")?;
    let subscriber_side = harness.add_participant("SubSide")?;

    let publisher = publisher_side
        .create_data_publisher("Pub1", PubSubSpec::new("Telemetry", "application/json"))?;

    let samples: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&samples);
    subscriber_side.create_data_subscriber(
        "Sub1",
        PubSubSpec::new("Telemetry", "application/json"),
        Arc::new(move |event| {
            sink.lock().push(event.data.clone());
        }),
    )?;

    publisher.publish(vec![9, 8, 7]);
    assert_eq!(samples.lock().as_slice(), &[vec![9, 8, 7]]);

    // A publisher on the same topic with a different media type stays
    // unmatched.
    let other = publisher_side
        .create_data_publisher("Pub2", PubSubSpec::new("Telemetry", "application/cbor"))?;
    other.publish(vec![1]);
    assert_eq!(samples.lock().len(), 1);
    Ok(())
}

#[test]
fn participant_removal_retracts_every_service() -> anyhow::Result<()> {
    let harness = SimulationHarness::new();
    let leaving = harness.add_participant("Leaving")?;
    leaving.create_data_publisher("Pub1", PubSubSpec::new("Telemetry", "application/json"))?;
    leaving.create_data_publisher("Pub2", PubSubSpec::new("Status", "application/json"))?;

    let observer = harness.add_participant("Observer")?;
    let (handler, record) = recording_handler();
    observer
        .service_discovery()
        .register_service_discovery_handler(handler);

    let created: Vec<String> = record
        .lock()
        .iter()
        .filter(|(_, descriptor)| descriptor.participant_name() == "Leaving")
        .map(|(_, descriptor)| descriptor.to_string())
        .collect();
    assert!(!created.is_empty());
    record.lock().clear();

    harness.disconnect("Leaving");

    let removed: Vec<(ServiceDiscoveryEventType, String)> = record
        .lock()
        .iter()
        .map(|(event_type, descriptor)| (*event_type, descriptor.to_string()))
        .collect();
    assert!(removed
        .iter()
        .all(|(event_type, _)| *event_type == ServiceDiscoveryEventType::ServiceRemoved));

    // Every service observed as created is observed as removed.
    let mut created_sorted = created;
    created_sorted.sort_unstable();
    let mut removed_sorted: Vec<String> = removed.into_iter().map(|(_, name)| name).collect();
    removed_sorted.sort_unstable();
    assert_eq!(created_sorted, removed_sorted);

    // The directory no longer contains the participant.
    assert!(observer
        .service_discovery()
        .services()
        .iter()
        .all(|descriptor| descriptor.participant_name() != "Leaving"));
    Ok(())
}
