use crate::values::Mapping;
use k8s_openapi::api::core::v1::LocalObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Git ref assumed when a git chart source does not name one.
pub const DEFAULT_GIT_REF: &str = "master";

/// A Helm chart release managed by Flux.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "flux.weave.works",
    version = "v1beta1",
    kind = "HelmRelease",
    namespaced,
    status = "HelmReleaseStatus",
    shortname = "hr"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseSpec {
    pub chart: ChartSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_file_secrets: Vec<LocalObjectReference>,
    /// Chart values, the tree image declarations are resolved from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Map<String, serde_json::Value>>,
    /// Install or upgrade timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    /// Reset values on helm upgrade
    #[serde(default)]
    pub reset_values: bool,
    /// Do not run 'dep' update (assume requirements.yaml is already fulfilled)
    #[serde(default)]
    pub skip_dep_update: bool,
}

/// Where the chart comes from: a path in a git repository or a chart repository.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum ChartSource {
    Git(GitChartSource),
    Repo(RepoChartSource),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GitChartSource {
    #[serde(rename = "git")]
    pub git_url: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    pub path: String,
}

impl GitChartSource {
    pub fn ref_or_default(&self) -> &str {
        if self.git_ref.is_empty() {
            DEFAULT_GIT_REF
        } else {
            &self.git_ref
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepoChartSource {
    #[serde(rename = "repository")]
    pub repo_url: String,
    pub name: String,
    pub version: String,
    /// An authentication secret for accessing the chart repo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_pull_secret: Option<LocalObjectReference>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    /// Status as given by Helm for the release managed by this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<HelmReleaseCondition>,
}

impl HelmReleaseStatus {
    pub fn condition(
        &self,
        condition_type: &HelmReleaseConditionType,
    ) -> Option<&HelmReleaseCondition> {
        self.conditions
            .iter()
            .find(|c| &c.condition_type == condition_type)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseCondition {
    #[serde(rename = "type")]
    pub condition_type: HelmReleaseConditionType,
    /// One of `True`, `False` or `Unknown`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HelmReleaseCondition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum HelmReleaseConditionType {
    /// The chart the release refers to has been fetched
    ChartFetched,
    /// The chart release has been processed by Helm
    Released,
    #[serde(other)]
    Unknown,
}

impl HelmRelease {
    /// `<namespace>:helmrelease/<name>`
    pub fn resource_id(&self) -> String {
        format!(
            "{}:helmrelease/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    /// Names the single container of a chart that declares its image at the top level.
    pub fn chart_identity(&self) -> String {
        match &self.spec.chart {
            ChartSource::Git(git) => git.path.clone(),
            ChartSource::Repo(repo) => repo.name.clone(),
        }
    }

    /// `<git url>//<path>?ref=<ref>` or `<repository url>/<name>:<version>`
    pub fn chart_location(&self) -> String {
        match &self.spec.chart {
            ChartSource::Git(git) => {
                format!("{}//{}?ref={}", git.git_url, git.path, git.ref_or_default())
            }
            ChartSource::Repo(repo) => format!(
                "{}/{}:{}",
                repo.repo_url.trim_end_matches('/'),
                repo.name,
                repo.version
            ),
        }
    }

    pub fn values_tree(&self) -> Mapping {
        self.spec
            .values
            .clone()
            .map(Mapping::from)
            .unwrap_or_default()
    }

    pub fn is_released(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.condition(&HelmReleaseConditionType::Released))
            .is_some_and(HelmReleaseCondition::is_true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(yaml: &str) -> HelmRelease {
        serde_yaml_ng::from_str(yaml).expect("fixture should deserialize")
    }

    #[test]
    fn test_deserialize_git_chart_release() {
        let hr = release(
            r#"
            apiVersion: flux.weave.works/v1beta1
            kind: HelmRelease
            metadata:
              name: mariadb
              namespace: dev
            spec:
              chart:
                git: git@github.com:example/charts
                path: charts/mariadb
              values:
                image:
                  registry: docker.io
                  repository: bitnami/mariadb
                  tag: 10.1.32
            "#,
        );
        match &hr.spec.chart {
            ChartSource::Git(git) => {
                assert_eq!(git.path, "charts/mariadb");
                assert_eq!(git.ref_or_default(), DEFAULT_GIT_REF);
            }
            other => panic!("expected git chart source, got {:?}", other),
        }
        assert_eq!(hr.chart_identity(), "charts/mariadb");
        assert_eq!(
            hr.chart_location(),
            "git@github.com:example/charts//charts/mariadb?ref=master"
        );
        assert_eq!(hr.resource_id(), "dev:helmrelease/mariadb");
        assert_eq!(hr.spec.timeout, None);
        assert!(hr.values_tree().contains_key("image"));
    }

    #[test]
    fn test_deserialize_repo_chart_release() {
        let hr = release(
            r#"
            apiVersion: flux.weave.works/v1beta1
            kind: HelmRelease
            metadata:
              name: ingress
            spec:
              releaseName: nginx-ingress
              timeout: 600
              chart:
                repository: https://kubernetes-charts.storage.googleapis.com/
                name: nginx-ingress
                version: 0.12.0
                chartPullSecret:
                  name: chart-auth
            "#,
        );
        match &hr.spec.chart {
            ChartSource::Repo(repo) => {
                assert_eq!(repo.name, "nginx-ingress");
                assert_eq!(repo.version, "0.12.0");
                assert!(repo.chart_pull_secret.is_some());
            }
            other => panic!("expected repo chart source, got {:?}", other),
        }
        assert_eq!(hr.spec.timeout, Some(600));
        assert_eq!(
            hr.chart_location(),
            "https://kubernetes-charts.storage.googleapis.com/nginx-ingress:0.12.0"
        );
        assert!(hr.values_tree().is_empty());
        assert!(!hr.is_released());
    }

    #[test]
    fn test_git_ref_is_kept_when_set() {
        let git = GitChartSource {
            git_url: "git@github.com:example/charts".to_string(),
            git_ref: "release-1.0".to_string(),
            path: "charts/app".to_string(),
        };
        assert_eq!(git.ref_or_default(), "release-1.0");
    }

    #[test]
    fn test_released_condition() {
        let hr = release(
            r#"
            apiVersion: flux.weave.works/v1beta1
            kind: HelmRelease
            metadata:
              name: app
            spec:
              chart:
                git: git@github.com:example/charts
                path: charts/app
            status:
              releaseStatus: DEPLOYED
              conditions:
                - type: ChartFetched
                  status: "True"
                - type: Released
                  status: "True"
                  reason: HelmSuccess
                - type: SomethingNew
                  status: "False"
            "#,
        );
        assert!(hr.is_released());
        let status = hr.status.as_ref().unwrap();
        assert_eq!(
            status
                .condition(&HelmReleaseConditionType::Released)
                .and_then(|c| c.reason.as_deref()),
            Some("HelmSuccess")
        );
        assert!(status.condition(&HelmReleaseConditionType::Unknown).is_some());
    }
}
