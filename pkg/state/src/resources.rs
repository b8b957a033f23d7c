use pkg_types::{
    Cluster, ClusterRoleBinding, GlobalRoleBinding, Namespace, Project, ProjectRoleBinding,
};

use crate::client::StateStore;
use crate::error::StoreError;
use crate::lister::Lister;
use crate::registry::Registry;

/// Direct (authoritative) access to every kind.
#[derive(Clone)]
pub struct Registries {
    pub clusters: Registry<Cluster>,
    pub projects: Registry<Project>,
    pub namespaces: Registry<Namespace>,
    pub project_bindings: Registry<ProjectRoleBinding>,
    pub cluster_bindings: Registry<ClusterRoleBinding>,
    pub global_bindings: Registry<GlobalRoleBinding>,
}

impl Registries {
    pub fn new(store: &StateStore) -> Self {
        Self {
            clusters: Registry::new(store.clone()),
            projects: Registry::new(store.clone()),
            namespaces: Registry::new(store.clone()),
            project_bindings: Registry::new(store.clone()),
            cluster_bindings: Registry::new(store.clone()),
            global_bindings: Registry::new(store.clone()),
        }
    }
}

/// Watch-fed caches for every kind.
#[derive(Clone)]
pub struct Listers {
    pub clusters: Lister<Cluster>,
    pub projects: Lister<Project>,
    pub namespaces: Lister<Namespace>,
    pub project_bindings: Lister<ProjectRoleBinding>,
    pub cluster_bindings: Lister<ClusterRoleBinding>,
    pub global_bindings: Lister<GlobalRoleBinding>,
}

impl Listers {
    pub async fn start(store: &StateStore) -> Result<Self, StoreError> {
        Ok(Self {
            clusters: Lister::start(store.clone()).await?,
            projects: Lister::start(store.clone()).await?,
            namespaces: Lister::start(store.clone()).await?,
            project_bindings: Lister::start(store.clone()).await?,
            cluster_bindings: Lister::start(store.clone()).await?,
            global_bindings: Lister::start(store.clone()).await?,
        })
    }
}
