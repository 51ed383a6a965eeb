use crate::helm_release::HelmRelease;
use crate::image_reference::{ImageReference, ParseError};
use crate::resolver::resolve_containers;
use crate::state::ContainerEntry;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::PodSpec;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;

pub trait Workload
where
    Self: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Send
        + Sync
        + DeserializeOwned
        + 'static,
{
    fn kind_name() -> &'static str {
        let type_name = std::any::type_name::<Self>();
        type_name.rsplit("::").next().unwrap_or(type_name)
    }

    fn containers(&self) -> Result<Vec<ContainerEntry>, ParseError>;

    fn resource_id(&self) -> String {
        format!(
            "{}:{}/{}",
            self.namespace().unwrap_or_default(),
            Self::kind_name().to_lowercase(),
            self.name_any()
        )
    }

    /// Where the declared images come from, when that is not the resource itself.
    fn source(&self) -> Option<String> {
        None
    }

    /// Whether the resource reports its desired state as applied.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Init containers first, then containers. Containers without an image are skipped.
fn pod_spec_containers(pod_spec: Option<&PodSpec>) -> Result<Vec<ContainerEntry>, ParseError> {
    let Some(pod_spec) = pod_spec else {
        return Ok(Vec::new());
    };

    pod_spec
        .init_containers
        .iter()
        .flatten()
        .chain(pod_spec.containers.iter())
        .filter_map(|container| {
            let image = container.image.as_deref()?;
            Some(ImageReference::parse(image).map(|image| ContainerEntry {
                name: container.name.clone(),
                image,
            }))
        })
        .collect()
}

impl Workload for Deployment {
    fn containers(&self) -> Result<Vec<ContainerEntry>, ParseError> {
        pod_spec_containers(self.spec.as_ref().and_then(|s| s.template.spec.as_ref()))
    }
}

impl Workload for StatefulSet {
    fn containers(&self) -> Result<Vec<ContainerEntry>, ParseError> {
        pod_spec_containers(self.spec.as_ref().and_then(|s| s.template.spec.as_ref()))
    }
}

impl Workload for DaemonSet {
    fn containers(&self) -> Result<Vec<ContainerEntry>, ParseError> {
        pod_spec_containers(self.spec.as_ref().and_then(|s| s.template.spec.as_ref()))
    }
}

impl Workload for CronJob {
    fn containers(&self) -> Result<Vec<ContainerEntry>, ParseError> {
        pod_spec_containers(
            self.spec
                .as_ref()
                .and_then(|s| s.job_template.spec.as_ref())
                .and_then(|s| s.template.spec.as_ref()),
        )
    }
}

impl Workload for HelmRelease {
    fn containers(&self) -> Result<Vec<ContainerEntry>, ParseError> {
        resolve_containers(&self.values_tree(), &self.chart_identity())
    }

    fn resource_id(&self) -> String {
        HelmRelease::resource_id(self)
    }

    fn source(&self) -> Option<String> {
        Some(self.chart_location())
    }

    fn is_ready(&self) -> bool {
        self.is_released()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_name() {
        assert_eq!(Deployment::kind_name(), "Deployment");
        assert_eq!(CronJob::kind_name(), "CronJob");
        assert_eq!(HelmRelease::kind_name(), "HelmRelease");
    }

    #[test]
    fn test_deployment_containers() {
        let deployment: Deployment = serde_json::from_value(json!({
            "metadata": {"name": "web"},
            "spec": {
                "selector": {"matchLabels": {"app": "web"}},
                "template": {
                    "spec": {
                        "initContainers": [{"name": "migrate", "image": "example.com/web/migrate:2"}],
                        "containers": [
                            {"name": "web", "image": "nginx:1.14"},
                            {"name": "no-image"}
                        ]
                    }
                }
            }
        }))
        .unwrap();

        let containers = deployment.containers().unwrap();
        let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["migrate", "web"]);
        assert_eq!(containers[0].image.domain.as_deref(), Some("example.com"));
        assert_eq!(containers[1].image.to_string(), "nginx:1.14");
        assert_eq!(deployment.resource_id(), ":deployment/web");
        assert!(deployment.is_ready());
        assert!(deployment.source().is_none());
    }

    #[test]
    fn test_cronjob_containers() {
        let cronjob: CronJob = serde_json::from_value(json!({
            "metadata": {"name": "backup"},
            "spec": {
                "schedule": "0 * * * *",
                "jobTemplate": {
                    "spec": {
                        "template": {
                            "spec": {"containers": [{"name": "backup", "image": "busybox"}]}
                        }
                    }
                }
            }
        }))
        .unwrap();

        let containers = cronjob.containers().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].image.repository, "busybox");
    }

    #[test]
    fn test_malformed_container_image_voids_workload() {
        let statefulset: StatefulSet = serde_json::from_value(json!({
            "metadata": {"name": "db"},
            "spec": {
                "selector": {},
                "serviceName": "db",
                "template": {
                    "spec": {"containers": [
                        {"name": "db", "image": "mariadb:10"},
                        {"name": "broken", "image": "Not A Reference"}
                    ]}
                }
            }
        }))
        .unwrap();

        assert!(matches!(
            statefulset.containers(),
            Err(ParseError::MalformedReference(_))
        ));
    }

    #[test]
    fn test_missing_pod_spec_has_no_containers() {
        let daemonset: DaemonSet =
            serde_json::from_value(json!({"metadata": {"name": "agent"}})).unwrap();
        assert!(daemonset.containers().unwrap().is_empty());
    }

    #[test]
    fn test_helm_release_containers() {
        let hr: HelmRelease = serde_json::from_value(json!({
            "apiVersion": "flux.weave.works/v1beta1",
            "kind": "HelmRelease",
            "metadata": {"name": "mariadb", "namespace": "dev"},
            "spec": {
                "chart": {"git": "git@github.com:example/charts", "path": "charts/mariadb"},
                "values": {"image": "bitnami/mariadb", "imageTag": "10.1.32"}
            }
        }))
        .unwrap();

        let containers = hr.containers().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "charts/mariadb");
        assert_eq!(Workload::resource_id(&hr), "dev:helmrelease/mariadb");
        assert!(!hr.is_ready());
        assert_eq!(
            hr.source().as_deref(),
            Some("git@github.com:example/charts//charts/mariadb?ref=master")
        );
        assert_eq!(containers[0].image.tag.as_deref(), Some("10.1.32"));
    }

    #[test]
    fn test_helm_release_nested_containers_keep_values_order() {
        let hr: HelmRelease = serde_json::from_value(json!({
            "apiVersion": "flux.weave.works/v1beta1",
            "kind": "HelmRelease",
            "metadata": {"name": "stack", "namespace": "dev"},
            "spec": {
                "chart": {"repository": "https://charts.example.com/", "name": "stack", "version": "1.0.0"},
                "values": {
                    "web": {"image": "nginx"},
                    "cache": {"image": "redis"},
                    "api": {"image": "example.com/api:3"}
                }
            }
        }))
        .unwrap();

        let containers = hr.containers().unwrap();
        let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["web", "cache", "api"]);
    }
}
