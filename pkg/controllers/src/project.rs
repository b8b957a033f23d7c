use pkg_constants::labels::{
    NAMESPACE_BACKED_CONDITION, PROJECT_ID_ANNOTATION, PROJECT_ID_LABEL, TENANT_NAMESPACE_LABEL,
};
use pkg_constants::quota::PROJECT_CONTROLLER_INTERVAL_SECS;
use pkg_state::{Registries, StoreError};
use pkg_types::meta::{Resource, set_condition};
use pkg_types::project::split_project_id;
use pkg_types::{LabelSelector, Namespace, Project};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Background controller that backs every project with a namespace and
/// mirrors namespace project-id annotations into the project label.
///
/// Provisioning polls for the state this controller writes, so a project
/// only becomes ready once a pass has seen it.
pub struct ProjectController {
    registries: Registries,
    check_interval: Duration,
}

impl ProjectController {
    pub fn new(registries: Registries) -> Self {
        Self {
            registries,
            check_interval: Duration::from_secs(PROJECT_CONTROLLER_INTERVAL_SECS),
        }
    }

    pub fn with_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Start the controller loop as a background task.
    pub fn start(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "ProjectController started (interval={}ms)",
                self.check_interval.as_millis()
            );
            let mut interval = tokio::time::interval(self.check_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if let Err(e) = self.reconcile().await {
                    warn!("ProjectController reconcile error: {}", e);
                }
            }
            info!("ProjectController stopped");
        })
    }

    /// One pass over every project and namespace.
    pub async fn reconcile(&self) -> anyhow::Result<()> {
        let everything = LabelSelector::everything();
        for project in self.registries.projects.list(None, &everything).await? {
            self.back_project(project).await?;
        }
        for namespace in self.registries.namespaces.list(None, &everything).await? {
            self.sync_namespace_label(namespace).await?;
        }
        Ok(())
    }

    async fn back_project(&self, mut project: Project) -> Result<(), StoreError> {
        let cluster = project.scope().to_string();
        let mut backing = Namespace::new(&cluster, project.name());
        backing
            .metadata
            .annotations
            .insert(PROJECT_ID_ANNOTATION.to_string(), project.id());
        if let Some(tenant) = project.tenant_id() {
            backing
                .metadata
                .labels
                .insert(TENANT_NAMESPACE_LABEL.to_string(), tenant.to_string());
        }
        match self.registries.namespaces.create(backing).await {
            Ok(_) => info!("created backing namespace {}/{}", cluster, project.name()),
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e),
        }

        if project.is_namespace_backed() {
            return Ok(());
        }
        let name = project.id();
        set_condition(
            &mut project.status.conditions,
            NAMESPACE_BACKED_CONDITION,
            true,
            "",
        );
        match self.registries.projects.update(project).await {
            Ok(_) => info!("project {} is namespace-backed", name),
            Err(e) if e.is_conflict() || e.is_not_found() => {
                debug!("project {} changed during reconcile: {}", name, e)
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn sync_namespace_label(&self, mut namespace: Namespace) -> Result<(), StoreError> {
        let desired = namespace
            .project_id()
            .and_then(split_project_id)
            .filter(|(cluster, _)| *cluster == namespace.scope())
            .map(|(_, project)| project.to_string());
        let current = namespace.metadata.label(PROJECT_ID_LABEL).map(str::to_string);
        if desired == current {
            return Ok(());
        }

        match &desired {
            Some(project) => {
                namespace
                    .metadata
                    .labels
                    .insert(PROJECT_ID_LABEL.to_string(), project.clone());
            }
            None => {
                namespace.metadata.labels.remove(PROJECT_ID_LABEL);
            }
        }
        let key = format!("{}/{}", namespace.scope(), namespace.name());
        match self.registries.namespaces.update(namespace).await {
            Ok(_) => debug!("namespace {} project label {:?} -> {:?}", key, current, desired),
            Err(e) if e.is_conflict() || e.is_not_found() => {
                debug!("namespace {} changed during reconcile: {}", key, e)
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_constants::labels::TENANT_ID_LABEL;
    use pkg_state::StateStore;

    fn setup() -> (Registries, ProjectController) {
        let registries = Registries::new(&StateStore::in_memory());
        let controller = ProjectController::new(registries.clone());
        (registries, controller)
    }

    #[tokio::test]
    async fn backs_projects_with_a_namespace() {
        let (registries, controller) = setup();
        let mut project = Project::new("c1", "pro-1", "acme");
        project
            .metadata
            .labels
            .insert(TENANT_ID_LABEL.to_string(), "t-1".to_string());
        registries.projects.create(project).await.unwrap();

        controller.reconcile().await.unwrap();

        let project = registries.projects.get("c1", "pro-1").await.unwrap();
        assert!(project.is_namespace_backed());
        let backing = registries.namespaces.get("c1", "pro-1").await.unwrap();
        assert!(backing.is_linked_to(&project));
        assert_eq!(backing.tenant_id(), Some("t-1"));

        // second pass writes nothing
        let version = project.metadata.resource_version;
        controller.reconcile().await.unwrap();
        let project = registries.projects.get("c1", "pro-1").await.unwrap();
        assert_eq!(project.metadata.resource_version, version);
    }

    #[tokio::test]
    async fn mirrors_and_clears_project_label() {
        let (registries, controller) = setup();
        let mut ns = Namespace::new("c1", "team");
        ns.metadata
            .annotations
            .insert(PROJECT_ID_ANNOTATION.to_string(), "c1:pro-1".to_string());
        registries.namespaces.create(ns).await.unwrap();

        controller.reconcile().await.unwrap();
        let mut ns = registries.namespaces.get("c1", "team").await.unwrap();
        assert_eq!(ns.metadata.label(PROJECT_ID_LABEL), Some("pro-1"));

        ns.metadata.annotations.remove(PROJECT_ID_ANNOTATION);
        registries.namespaces.update(ns).await.unwrap();
        controller.reconcile().await.unwrap();
        let ns = registries.namespaces.get("c1", "team").await.unwrap();
        assert_eq!(ns.metadata.label(PROJECT_ID_LABEL), None);
    }

    #[tokio::test]
    async fn ignores_project_ids_from_other_clusters() {
        let (registries, controller) = setup();
        let mut ns = Namespace::new("c1", "team");
        ns.metadata
            .annotations
            .insert(PROJECT_ID_ANNOTATION.to_string(), "c2:pro-1".to_string());
        registries.namespaces.create(ns).await.unwrap();

        controller.reconcile().await.unwrap();
        let ns = registries.namespaces.get("c1", "team").await.unwrap();
        assert_eq!(ns.metadata.label(PROJECT_ID_LABEL), None);
    }
}
