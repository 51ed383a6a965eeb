use crate::helm_release::HelmRelease;
use crate::state::{ControllerContext, ScanReport, WorkloadImages};
use crate::workload::Workload;
use anyhow::Context;
use chrono::Utc;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, warn};

pub async fn create_client() -> anyhow::Result<Client> {
    info!("Initializing K8s client");
    let client = Client::try_default().await?;
    let api_server_info = client.apiserver_version().await?;
    info!(
        "Connected to namespace {}, Kubernetes API server with version {}.{}",
        client.default_namespace(),
        api_server_info.major,
        api_server_info.minor
    );
    Ok(client)
}

pub async fn run(ctx: ControllerContext) -> anyhow::Result<()> {
    let namespace = ctx
        .config
        .namespace
        .clone()
        .unwrap_or_else(|| ctx.kube_client.default_namespace().to_string());
    let mut lp = ListParams::default();
    if let Some(selector) = &ctx.config.label_selector {
        lp = lp.labels(selector);
    }

    info!("Scanning namespace {} for declared container images", namespace);

    let mut workloads = scan_kind::<HelmRelease>(&ctx, &namespace, &lp).await;
    if ctx.config.scan_workloads {
        let (deployments, statefulsets, daemonsets, cronjobs) = futures::join!(
            scan_kind::<Deployment>(&ctx, &namespace, &lp),
            scan_kind::<StatefulSet>(&ctx, &namespace, &lp),
            scan_kind::<DaemonSet>(&ctx, &namespace, &lp),
            scan_kind::<CronJob>(&ctx, &namespace, &lp),
        );
        workloads.extend(deployments);
        workloads.extend(statefulsets);
        workloads.extend(daemonsets);
        workloads.extend(cronjobs);
    }

    info!(
        "Scan finished, found {} workloads with {} container images",
        workloads.len(),
        workloads.iter().map(|w| w.containers.len()).sum::<usize>()
    );

    let mut report = ctx.report.write().await;
    *report = ScanReport {
        scanned_at: Some(Utc::now()),
        workloads,
    };

    Ok(())
}

/// Lists one kind and resolves its images. A kind that cannot be listed is
/// logged and contributes nothing.
async fn scan_kind<K: Workload>(
    ctx: &ControllerContext,
    namespace: &str,
    lp: &ListParams,
) -> Vec<WorkloadImages> {
    match list_workload_images::<K>(ctx, namespace, lp).await {
        Ok(workloads) => workloads,
        Err(e) => {
            warn!("Skipping {} scan: {:?}", K::kind_name(), e);
            Vec::new()
        }
    }
}

async fn list_workload_images<K: Workload>(
    ctx: &ControllerContext,
    namespace: &str,
    lp: &ListParams,
) -> anyhow::Result<Vec<WorkloadImages>> {
    let kind = K::kind_name();
    let api: Api<K> = Api::namespaced(ctx.kube_client.clone(), namespace);
    let list = api
        .list(lp)
        .await
        .with_context(|| format!("Failed to list {} in namespace {}", kind, namespace))?;

    debug!("Found {} {} resources", list.items.len(), kind);

    let mut workloads = Vec::new();
    for resource in list.items {
        let name = resource.name_any();
        if !ctx.name_filter.matches(&name) {
            debug!("Skipping {} {}, excluded by name filters", kind, name);
            continue;
        }

        if !resource.is_ready() {
            debug!("{} has not been applied successfully yet", resource.resource_id());
        }

        let containers = match resource.containers() {
            Ok(containers) => containers,
            Err(e) => {
                warn!(
                    "Skipping {}, its container images could not be determined: {}",
                    resource.resource_id(),
                    e
                );
                continue;
            }
        };

        for container in &containers {
            info!(
                "Found {} {} container {} with image {}",
                kind, name, container.name, container.image
            );
        }

        workloads.push(WorkloadImages {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            source: resource.source(),
            name,
            containers,
        });
    }

    Ok(workloads)
}
