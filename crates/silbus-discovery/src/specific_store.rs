//! Pre-indexed lookup for publish/subscribe and RPC matching.
//!
//! Matching N publishers against M subscriber handlers by scanning is
//! quadratic in a busy simulation. The store buckets services and handlers
//! per `(controller type, topic-or-function)` filter and per label, and
//! answers "which handlers fire for this new service?" by walking the
//! smallest applicable bucket.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::keys;
use silbus_core::label::{decode_labels, LabelKind, MatchingLabel};
use silbus_core::messages::discovery::ServiceDiscoveryEventType;

use crate::service_discovery::ServiceDiscoveryHandler;

type FilterKey = (String, String);

#[derive(Default)]
pub(crate) struct DiscoveryCluster {
    pub(crate) nodes: Vec<ServiceDescriptor>,
    pub(crate) handlers: Vec<Arc<ServiceDiscoveryHandler>>,
}

/// Buckets for one `(controller type, key)` filter.
#[derive(Default)]
pub(crate) struct DiscoveryKeyNode {
    /// Every service / handler of this filter.
    pub(crate) all_cluster: DiscoveryCluster,
    /// Services / handlers without any labels.
    pub(crate) no_label_cluster: DiscoveryCluster,
    /// Services / handlers carrying a specific `(key, value)` label.
    pub(crate) label_map: HashMap<(String, String), DiscoveryCluster>,
    /// Services / handlers lacking a given label key entirely.
    pub(crate) not_label_map: HashMap<String, DiscoveryCluster>,
}

/// The label-indexed fast path for specific discovery handlers.
///
/// Only entered under the discovery lock; the store itself is not
/// synchronised.
#[derive(Default)]
pub struct SpecificDiscoveryStore {
    lookup: HashMap<FilterKey, DiscoveryKeyNode>,
}

/// The filter-relevant attributes of a service: lookup key and labels.
struct FilterAttributes {
    controller_type: String,
    key: String,
    labels: Vec<MatchingLabel>,
}

fn filter_attributes(descriptor: &ServiceDescriptor) -> Option<FilterAttributes> {
    let controller_type = descriptor.supplemental_data_item(keys::CONTROLLER_TYPE)?;
    let item = |key: &str| descriptor.supplemental_data_item(key).unwrap_or_default();
    let labels_from = |key: &str| -> Vec<MatchingLabel> {
        let raw = item(key);
        if raw.is_empty() {
            return Vec::new();
        }
        decode_labels(raw).unwrap_or_else(|error| {
            warn!(%descriptor, %error, "ignoring malformed label list");
            Vec::new()
        })
    };

    match controller_type {
        keys::CONTROLLER_TYPE_DATA_PUBLISHER => Some(FilterAttributes {
            controller_type: controller_type.to_string(),
            key: item(keys::KEY_DATA_PUBLISHER_TOPIC).to_string(),
            labels: labels_from(keys::KEY_DATA_PUBLISHER_LABELS),
        }),
        keys::CONTROLLER_TYPE_RPC_CLIENT => Some(FilterAttributes {
            controller_type: controller_type.to_string(),
            key: item(keys::KEY_RPC_CLIENT_FUNCTION_NAME).to_string(),
            labels: labels_from(keys::KEY_RPC_CLIENT_LABELS),
        }),
        keys::CONTROLLER_TYPE_RPC_SERVER_INTERNAL => Some(FilterAttributes {
            controller_type: controller_type.to_string(),
            key: item(keys::KEY_RPC_SERVER_INTERNAL_CLIENT_UUID).to_string(),
            labels: Vec::new(),
        }),
        _ => None,
    }
}

/// Pick the label whose handler bucket is smallest; `None` means "use the
/// all-cluster".
fn label_with_minimal_handler_set<'a>(
    node: &DiscoveryKeyNode,
    labels: &'a [MatchingLabel],
) -> Option<&'a MatchingLabel> {
    let mut greedy = None;
    let mut match_count = node.all_cluster.handlers.len();
    for label in labels {
        if match_count <= 1 {
            break;
        }
        let fit = node
            .label_map
            .get(&(label.key.clone(), label.value.clone()))
            .map_or(0, |cluster| cluster.handlers.len());
        let relevant = match label.kind {
            LabelKind::Mandatory => fit,
            LabelKind::Optional => {
                fit + node
                    .not_label_map
                    .get(&label.key)
                    .map_or(0, |cluster| cluster.handlers.len())
            }
        };
        if relevant < match_count {
            match_count = relevant;
            greedy = Some(label);
        }
    }
    greedy
}

/// Pick the label whose service bucket is smallest.
fn label_with_minimal_node_set<'a>(
    node: &DiscoveryKeyNode,
    labels: &'a [MatchingLabel],
) -> Option<&'a MatchingLabel> {
    let mut greedy = None;
    let mut match_count = node.all_cluster.nodes.len();
    for label in labels {
        if match_count <= 1 {
            break;
        }
        let fit = node
            .label_map
            .get(&(label.key.clone(), label.value.clone()))
            .map_or(0, |cluster| cluster.nodes.len());
        let relevant = match label.kind {
            LabelKind::Mandatory => fit,
            LabelKind::Optional => {
                fit + node
                    .not_label_map
                    .get(&label.key)
                    .map_or(0, |cluster| cluster.nodes.len())
            }
        };
        if relevant < match_count {
            match_count = relevant;
            greedy = Some(label);
        }
    }
    greedy
}

impl SpecificDiscoveryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a service change and return the handlers to notify, in
    /// registration order within each bucket.
    pub fn service_change(
        &mut self,
        event_type: ServiceDiscoveryEventType,
        descriptor: &ServiceDescriptor,
    ) -> Vec<Arc<ServiceDiscoveryHandler>> {
        let Some(attributes) = filter_attributes(descriptor) else {
            return Vec::new();
        };

        let handlers = self.handlers_for_service(&attributes);
        match event_type {
            ServiceDiscoveryEventType::ServiceCreated => {
                self.insert_node(&attributes, descriptor);
            }
            ServiceDiscoveryEventType::ServiceRemoved => {
                self.remove_node(&attributes, descriptor);
            }
            ServiceDiscoveryEventType::Invalid => {}
        }
        handlers
    }

    /// Candidate services a freshly registered handler must be replayed for.
    pub fn candidates_for_handler(
        &mut self,
        controller_type: &str,
        key: &str,
        labels: &[MatchingLabel],
    ) -> Vec<ServiceDescriptor> {
        let node = self
            .lookup
            .entry((controller_type.to_string(), key.to_string()))
            .or_default();

        match label_with_minimal_node_set(node, labels) {
            None => node.all_cluster.nodes.clone(),
            Some(greedy) => {
                let mut candidates = Vec::new();
                if greedy.kind == LabelKind::Optional {
                    if let Some(cluster) = node.not_label_map.get(&greedy.key) {
                        candidates.extend(cluster.nodes.iter().cloned());
                    }
                    candidates.extend(node.no_label_cluster.nodes.iter().cloned());
                }
                if let Some(cluster) = node
                    .label_map
                    .get(&(greedy.key.clone(), greedy.value.clone()))
                {
                    candidates.extend(cluster.nodes.iter().cloned());
                }
                candidates
            }
        }
    }

    /// Insert a handler into every bucket its labels select.
    pub fn insert_handler(
        &mut self,
        controller_type: &str,
        key: &str,
        labels: &[MatchingLabel],
        handler: Arc<ServiceDiscoveryHandler>,
    ) {
        self.update_clusters(controller_type, key, labels, |cluster| {
            cluster.handlers.push(Arc::clone(&handler));
        });
    }

    fn handlers_for_service(
        &mut self,
        attributes: &FilterAttributes,
    ) -> Vec<Arc<ServiceDiscoveryHandler>> {
        let node = self
            .lookup
            .entry((attributes.controller_type.clone(), attributes.key.clone()))
            .or_default();

        match label_with_minimal_handler_set(node, &attributes.labels) {
            None => node.all_cluster.handlers.clone(),
            Some(greedy) => {
                let mut handlers = Vec::new();
                if greedy.kind == LabelKind::Optional {
                    if let Some(cluster) = node.not_label_map.get(&greedy.key) {
                        handlers.extend(cluster.handlers.iter().cloned());
                    }
                    handlers.extend(node.no_label_cluster.handlers.iter().cloned());
                }
                if let Some(cluster) = node
                    .label_map
                    .get(&(greedy.key.clone(), greedy.value.clone()))
                {
                    handlers.extend(cluster.handlers.iter().cloned());
                }
                handlers
            }
        }
    }

    fn insert_node(&mut self, attributes: &FilterAttributes, descriptor: &ServiceDescriptor) {
        self.update_clusters(
            &attributes.controller_type,
            &attributes.key,
            &attributes.labels,
            |cluster| {
                cluster.nodes.push(descriptor.clone());
            },
        );
    }

    fn remove_node(&mut self, attributes: &FilterAttributes, descriptor: &ServiceDescriptor) {
        let node = self
            .lookup
            .entry((attributes.controller_type.clone(), attributes.key.clone()))
            .or_default();
        node.all_cluster.nodes.retain(|entry| entry != descriptor);
        node.no_label_cluster
            .nodes
            .retain(|entry| entry != descriptor);
        for cluster in node.not_label_map.values_mut() {
            cluster.nodes.retain(|entry| entry != descriptor);
        }
        for cluster in node.label_map.values_mut() {
            cluster.nodes.retain(|entry| entry != descriptor);
        }
    }

    /// Apply `update` to every cluster the labels select; creates label
    /// buckets on first sight and backfills `not_label_map` with everything
    /// stored before the key was known.
    fn update_clusters(
        &mut self,
        controller_type: &str,
        key: &str,
        labels: &[MatchingLabel],
        mut update: impl FnMut(&mut DiscoveryCluster),
    ) {
        let node = self
            .lookup
            .entry((controller_type.to_string(), key.to_string()))
            .or_default();

        update(&mut node.all_cluster);

        if labels.is_empty() {
            update(&mut node.no_label_cluster);
            return;
        }

        for label in labels {
            node.label_map
                .entry((label.key.clone(), label.value.clone()))
                .or_default();

            let first_time = !node.not_label_map.contains_key(&label.key);
            let entry = node.not_label_map.entry(label.key.clone()).or_default();
            if first_time {
                entry.nodes.extend(node.all_cluster.nodes.iter().cloned());
                entry
                    .handlers
                    .extend(node.all_cluster.handlers.iter().cloned());
            }
        }

        let known_keys: Vec<String> = node.not_label_map.keys().cloned().collect();
        for label_key in known_keys {
            if let Some(found) = labels.iter().find(|label| label.key == label_key) {
                let cluster = node
                    .label_map
                    .entry((label_key, found.value.clone()))
                    .or_default();
                update(cluster);
            } else if let Some(cluster) = node.not_label_map.get_mut(&label_key) {
                update(cluster);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn lookup_node(
        &mut self,
        controller_type: &str,
        key: &str,
    ) -> &mut DiscoveryKeyNode {
        self.lookup
            .entry((controller_type.to_string(), key.to_string()))
            .or_default()
    }

    #[cfg(test)]
    pub(crate) fn filter_count(&self) -> usize {
        self.lookup.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use silbus_core::label::encode_labels;

    fn publisher_descriptor(topic: &str, labels: &[MatchingLabel], service_id: u64) -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::new("ParticipantA", "Link1", "Pub", service_id);
        descriptor.set_supplemental_data_item(
            keys::CONTROLLER_TYPE,
            keys::CONTROLLER_TYPE_DATA_PUBLISHER,
        );
        descriptor.set_supplemental_data_item(keys::KEY_DATA_PUBLISHER_TOPIC, topic);
        descriptor.set_supplemental_data_item(keys::KEY_DATA_PUBLISHER_MEDIA_TYPE, "text/json");
        descriptor.set_supplemental_data_item(keys::KEY_DATA_PUBLISHER_LABELS, encode_labels(labels));
        descriptor
    }

    fn rpc_client_descriptor(function: &str, labels: &[MatchingLabel], service_id: u64) -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::new("ParticipantA", "Link1", "Client", service_id);
        descriptor
            .set_supplemental_data_item(keys::CONTROLLER_TYPE, keys::CONTROLLER_TYPE_RPC_CLIENT);
        descriptor.set_supplemental_data_item(keys::KEY_RPC_CLIENT_FUNCTION_NAME, function);
        descriptor.set_supplemental_data_item(keys::KEY_RPC_CLIENT_MEDIA_TYPE, "text/json");
        descriptor.set_supplemental_data_item(keys::KEY_RPC_CLIENT_LABELS, encode_labels(labels));
        descriptor
    }

    fn recording_handler() -> (Arc<ServiceDiscoveryHandler>, Arc<Mutex<Vec<(ServiceDiscoveryEventType, ServiceDescriptor)>>>) {
        let record: Arc<Mutex<Vec<(ServiceDiscoveryEventType, ServiceDescriptor)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&record);
        let handler: Arc<ServiceDiscoveryHandler> = Arc::new(move |event_type, descriptor| {
            sink.lock().push((event_type, descriptor.clone()));
        });
        (handler, record)
    }

    #[test]
    fn irrelevant_controller_types_are_not_indexed() {
        let mut store = SpecificDiscoveryStore::new();
        for controller_type in [
            keys::CONTROLLER_TYPE_SERVICE_DISCOVERY,
            keys::CONTROLLER_TYPE_CAN,
            keys::CONTROLLER_TYPE_DATA_SUBSCRIBER_INTERNAL,
            keys::CONTROLLER_TYPE_ETHERNET,
            keys::CONTROLLER_TYPE_FLEXRAY,
            keys::CONTROLLER_TYPE_LIFECYCLE_SERVICE,
            keys::CONTROLLER_TYPE_LIN,
            keys::CONTROLLER_TYPE_SYSTEM_CONTROLLER,
        ] {
            let mut descriptor = ServiceDescriptor::new("ParticipantA", "Link1", "Svc", 1);
            descriptor.set_supplemental_data_item(keys::CONTROLLER_TYPE, controller_type);
            let handlers =
                store.service_change(ServiceDiscoveryEventType::ServiceCreated, &descriptor);
            assert!(handlers.is_empty());
        }
        assert_eq!(store.filter_count(), 0);
    }

    #[test]
    fn lookup_entries_pubsub() {
        let no_label = publisher_descriptor("Topic1", &[], 1);
        let labeled = publisher_descriptor("Topic1", &[MatchingLabel::optional("kA", "vA")], 2);

        let mut store = SpecificDiscoveryStore::new();
        store.service_change(ServiceDiscoveryEventType::ServiceCreated, &no_label);

        {
            let node = store.lookup_node(keys::CONTROLLER_TYPE_DATA_PUBLISHER, "Topic1");
            assert_eq!(node.no_label_cluster.nodes, vec![no_label.clone()]);
            assert_eq!(node.all_cluster.nodes, vec![no_label.clone()]);
        }

        store.service_change(ServiceDiscoveryEventType::ServiceCreated, &labeled);
        {
            let node = store.lookup_node(keys::CONTROLLER_TYPE_DATA_PUBLISHER, "Topic1");
            assert_eq!(node.no_label_cluster.nodes, vec![no_label.clone()]);
            assert_eq!(
                node.label_map[&("kA".to_string(), "vA".to_string())].nodes,
                vec![labeled.clone()]
            );
            assert_eq!(node.all_cluster.nodes, vec![no_label.clone(), labeled.clone()]);
            // The earlier label-less descriptor was backfilled into the
            // not-label bucket when "kA" was first seen.
            assert_eq!(node.not_label_map["kA"].nodes, vec![no_label.clone()]);
        }

        store.service_change(ServiceDiscoveryEventType::ServiceRemoved, &labeled);
        {
            let node = store.lookup_node(keys::CONTROLLER_TYPE_DATA_PUBLISHER, "Topic1");
            assert_eq!(node.no_label_cluster.nodes, vec![no_label.clone()]);
            assert!(node.label_map[&("kA".to_string(), "vA".to_string())]
                .nodes
                .is_empty());
            assert_eq!(node.all_cluster.nodes, vec![no_label.clone()]);
            assert_eq!(node.not_label_map["kA"].nodes, vec![no_label]);
        }
    }

    #[test]
    fn lookup_entries_rpc_client() {
        let no_label = rpc_client_descriptor("Function1", &[], 1);
        let labeled = rpc_client_descriptor("Function1", &[MatchingLabel::optional("kA", "vA")], 2);

        let mut store = SpecificDiscoveryStore::new();
        store.service_change(ServiceDiscoveryEventType::ServiceCreated, &no_label);
        store.service_change(ServiceDiscoveryEventType::ServiceCreated, &labeled);

        let node = store.lookup_node(keys::CONTROLLER_TYPE_RPC_CLIENT, "Function1");
        assert_eq!(node.all_cluster.nodes.len(), 2);
        assert_eq!(
            node.label_map[&("kA".to_string(), "vA".to_string())].nodes,
            vec![labeled]
        );
        assert_eq!(node.not_label_map["kA"].nodes, vec![no_label]);
    }

    #[test]
    fn lookup_entries_rpc_server_internal() {
        let client_uuid = "dda9a411-2bc8-4428-9e62-bd3000278b9e";
        let mut descriptor = ServiceDescriptor::new("ParticipantA", "Link1", "ServerInternal", 1);
        descriptor.set_supplemental_data_item(
            keys::CONTROLLER_TYPE,
            keys::CONTROLLER_TYPE_RPC_SERVER_INTERNAL,
        );
        descriptor
            .set_supplemental_data_item(keys::KEY_RPC_SERVER_INTERNAL_CLIENT_UUID, client_uuid);

        let mut store = SpecificDiscoveryStore::new();
        store.service_change(ServiceDiscoveryEventType::ServiceCreated, &descriptor);
        {
            let node = store.lookup_node(keys::CONTROLLER_TYPE_RPC_SERVER_INTERNAL, client_uuid);
            assert_eq!(node.all_cluster.nodes, vec![descriptor.clone()]);
            assert_eq!(node.no_label_cluster.nodes, vec![descriptor.clone()]);
        }

        store.service_change(ServiceDiscoveryEventType::ServiceRemoved, &descriptor);
        let node = store.lookup_node(keys::CONTROLLER_TYPE_RPC_SERVER_INTERNAL, client_uuid);
        assert!(node.all_cluster.nodes.is_empty());
    }

    #[test]
    fn handler_then_service() {
        let mut store = SpecificDiscoveryStore::new();
        let (handler, record) = recording_handler();
        assert!(store
            .candidates_for_handler(keys::CONTROLLER_TYPE_DATA_PUBLISHER, "Topic1", &[])
            .is_empty());
        store.insert_handler(keys::CONTROLLER_TYPE_DATA_PUBLISHER, "Topic1", &[], handler);

        let descriptor = publisher_descriptor("Topic1", &[], 1);
        let to_fire = store.service_change(ServiceDiscoveryEventType::ServiceCreated, &descriptor);
        for handler in to_fire {
            handler(ServiceDiscoveryEventType::ServiceCreated, &descriptor);
        }
        assert_eq!(
            record.lock().as_slice(),
            &[(ServiceDiscoveryEventType::ServiceCreated, descriptor)]
        );
    }

    #[test]
    fn service_then_handler_sees_candidates() {
        let mut store = SpecificDiscoveryStore::new();
        let descriptor = publisher_descriptor("Topic1", &[], 1);
        store.service_change(ServiceDiscoveryEventType::ServiceCreated, &descriptor);

        let candidates =
            store.candidates_for_handler(keys::CONTROLLER_TYPE_DATA_PUBLISHER, "Topic1", &[]);
        assert_eq!(candidates, vec![descriptor.clone()]);

        // A labeled handler still sees the label-less publisher as candidate.
        let candidates = store.candidates_for_handler(
            keys::CONTROLLER_TYPE_DATA_PUBLISHER,
            "Topic1",
            &[MatchingLabel::mandatory("keyA", "valA")],
        );
        assert_eq!(candidates, vec![descriptor]);
    }

    #[test]
    fn optional_label_handlers_see_all_compatible_buckets() {
        let mut store = SpecificDiscoveryStore::new();
        let labeled = publisher_descriptor(
            "Topic1",
            &[
                MatchingLabel::optional("kA", "vA"),
                MatchingLabel::optional("kB", "vB"),
                MatchingLabel::optional("kC", "vC"),
            ],
            2,
        );
        let no_label = publisher_descriptor("Topic1", &[], 1);
        store.service_change(ServiceDiscoveryEventType::ServiceCreated, &labeled);
        store.service_change(ServiceDiscoveryEventType::ServiceCreated, &no_label);

        // Mismatching value on kB: only the label-less publisher is
        // ultimately compatible, but the store may over-approximate; the
        // caller re-checks with match_labels. The label-less one must always
        // be among the candidates.
        let wanted = [
            MatchingLabel::optional("kA", "vA"),
            MatchingLabel::optional("kB", "vB2"),
            MatchingLabel::optional("kC", "vC"),
        ];
        let candidates =
            store.candidates_for_handler(keys::CONTROLLER_TYPE_DATA_PUBLISHER, "Topic1", &wanted);
        assert!(candidates.contains(&no_label));

        let wanted = [
            MatchingLabel::optional("kA", "vA"),
            MatchingLabel::optional("kB", "vB"),
            MatchingLabel::optional("kC", "vC"),
        ];
        let candidates =
            store.candidates_for_handler(keys::CONTROLLER_TYPE_DATA_PUBLISHER, "Topic1", &wanted);
        assert!(candidates.contains(&no_label));
        assert!(candidates.contains(&labeled));
    }
}
