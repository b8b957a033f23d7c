use std::fmt;

/// The fixed set of resources a quota can constrain.
///
/// Variants are declared in lexicographic order of their quota key so the
/// derived `Ord` matches the ordering used in violation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKey {
    ConfigMaps,
    LimitsCpu,
    LimitsMemory,
    PersistentVolumeClaims,
    Pods,
    ReplicationControllers,
    RequestsCpu,
    RequestsMemory,
    RequestsStorage,
    Secrets,
    Services,
    ServicesAllocatedPorts,
    ServicesLoadBalancers,
    ServicesNodePorts,
}

/// Quota key, cluster-allocatable name (if the cluster reports the resource).
static KEY_TABLE: [(ResourceKey, &str, Option<&str>); 14] = [
    (ResourceKey::ConfigMaps, "configMaps", Some("configmaps")),
    (ResourceKey::LimitsCpu, "limitsCpu", Some("cpu")),
    (ResourceKey::LimitsMemory, "limitsMemory", Some("memory")),
    (
        ResourceKey::PersistentVolumeClaims,
        "persistentVolumeClaims",
        Some("persistentvolumeclaims"),
    ),
    (ResourceKey::Pods, "pods", Some("pods")),
    (
        ResourceKey::ReplicationControllers,
        "replicationControllers",
        Some("replicationcontrollers"),
    ),
    (ResourceKey::RequestsCpu, "requestsCpu", None),
    (ResourceKey::RequestsMemory, "requestsMemory", None),
    (ResourceKey::RequestsStorage, "requestsStorage", Some("storage")),
    (ResourceKey::Secrets, "secrets", Some("secrets")),
    (ResourceKey::Services, "services", Some("services")),
    (
        ResourceKey::ServicesAllocatedPorts,
        "servicesAllocatedPorts",
        Some("services.allocatedports"),
    ),
    (
        ResourceKey::ServicesLoadBalancers,
        "servicesLoadBalancers",
        Some("services.loadbalancers"),
    ),
    (
        ResourceKey::ServicesNodePorts,
        "servicesNodePorts",
        Some("services.nodeports"),
    ),
];

impl ResourceKey {
    pub const ALL: [ResourceKey; 14] = [
        ResourceKey::ConfigMaps,
        ResourceKey::LimitsCpu,
        ResourceKey::LimitsMemory,
        ResourceKey::PersistentVolumeClaims,
        ResourceKey::Pods,
        ResourceKey::ReplicationControllers,
        ResourceKey::RequestsCpu,
        ResourceKey::RequestsMemory,
        ResourceKey::RequestsStorage,
        ResourceKey::Secrets,
        ResourceKey::Services,
        ResourceKey::ServicesAllocatedPorts,
        ResourceKey::ServicesLoadBalancers,
        ResourceKey::ServicesNodePorts,
    ];

    fn row(self) -> &'static (ResourceKey, &'static str, Option<&'static str>) {
        // KEY_TABLE is indexed by declaration order
        &KEY_TABLE[self as usize]
    }

    /// camelCase name used in quota objects and annotations.
    pub fn quota_key(self) -> &'static str {
        self.row().1
    }

    /// Lowercase name used by cluster allocatable capacity, if any.
    pub fn allocatable_name(self) -> Option<&'static str> {
        self.row().2
    }

    pub fn from_quota_key(key: &str) -> Option<Self> {
        KEY_TABLE
            .iter()
            .find(|(_, quota_key, _)| *quota_key == key)
            .map(|(k, _, _)| *k)
    }

    pub fn from_allocatable_name(name: &str) -> Option<Self> {
        KEY_TABLE
            .iter()
            .find(|(_, _, allocatable)| *allocatable == Some(name))
            .map(|(k, _, _)| *k)
    }

    pub fn is_cpu(self) -> bool {
        matches!(self, ResourceKey::LimitsCpu | ResourceKey::RequestsCpu)
    }

    pub fn is_memory(self) -> bool {
        matches!(self, ResourceKey::LimitsMemory | ResourceKey::RequestsMemory)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.quota_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_follow_declaration_order() {
        for (index, key) in ResourceKey::ALL.iter().enumerate() {
            assert_eq!(KEY_TABLE[index].0, *key);
        }
    }

    #[test]
    fn quota_keys_round_trip() {
        for key in ResourceKey::ALL {
            assert_eq!(ResourceKey::from_quota_key(key.quota_key()), Some(key));
        }
        assert_eq!(ResourceKey::from_quota_key("requestsGpu"), None);
    }

    #[test]
    fn allocatable_names_round_trip_for_every_pair() {
        let pairs = [
            ("cpu", ResourceKey::LimitsCpu),
            ("memory", ResourceKey::LimitsMemory),
            ("storage", ResourceKey::RequestsStorage),
            ("pods", ResourceKey::Pods),
            ("services", ResourceKey::Services),
            ("services.nodeports", ResourceKey::ServicesNodePorts),
            ("services.loadbalancers", ResourceKey::ServicesLoadBalancers),
            ("services.allocatedports", ResourceKey::ServicesAllocatedPorts),
            ("configmaps", ResourceKey::ConfigMaps),
            ("secrets", ResourceKey::Secrets),
            ("persistentvolumeclaims", ResourceKey::PersistentVolumeClaims),
            ("replicationcontrollers", ResourceKey::ReplicationControllers),
        ];
        for (name, key) in pairs {
            assert_eq!(ResourceKey::from_allocatable_name(name), Some(key));
            assert_eq!(key.allocatable_name(), Some(name));
        }
        assert_eq!(ResourceKey::RequestsCpu.allocatable_name(), None);
        assert_eq!(ResourceKey::RequestsMemory.allocatable_name(), None);
        assert_eq!(ResourceKey::from_allocatable_name("nvidia.com/gpu"), None);
    }

    #[test]
    fn derived_order_is_lexicographic() {
        let mut names: Vec<&str> = ResourceKey::ALL.iter().map(|k| k.quota_key()).collect();
        let declared = names.clone();
        names.sort();
        assert_eq!(names, declared);
    }
}
