//! Kubernetes implementation of the cluster capability

use super::{ClusterBackend, EndpointStatus, EndpointStream, InstanceStatus, InstanceStream};
use crate::error::ClusterError;
use crate::models::WorkloadSpec;
use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, Pod, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use serde::Deserialize;
use tracing::{debug, info};

/// Name of the single container in the workload pod
const CONTAINER_NAME: &str = "health-server";

/// Kubernetes-backed cluster capability
///
/// Built once at process start and shared read-only by every run.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Connect using in-cluster configuration or the local kubeconfig
    pub async fn try_default(namespace: impl Into<String>) -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        let cluster = Self::new(client, namespace);
        info!(namespace = %cluster.namespace, "Connected to cluster API");
        Ok(cluster)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn endpoints(&self) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            &self.namespace,
            &cilium_endpoint_resource(),
        )
    }
}

#[async_trait]
impl ClusterBackend for KubeCluster {
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let deployment = build_deployment(spec);
        self.deployments()
            .create(&PostParams::default(), &deployment)
            .await?;
        debug!(workload = %spec.name, namespace = %self.namespace, "Deployment accepted");
        Ok(())
    }

    async fn watch_instances(&self, selector: &str) -> Result<InstanceStream, ClusterError> {
        let config = watcher::Config::default().labels(selector);
        let stream = watcher(self.pods(), config)
            .applied_objects()
            .map_ok(|pod| instance_status(&pod))
            .map_err(ClusterError::from)
            .boxed();
        Ok(stream)
    }

    async fn list_instances(&self, selector: &str) -> Result<Vec<InstanceStatus>, ClusterError> {
        let params = ListParams::default().labels(selector);
        let pods = self.pods().list(&params).await?;
        Ok(pods.items.iter().map(instance_status).collect())
    }

    async fn watch_endpoints(&self, selector: &str) -> Result<EndpointStream, ClusterError> {
        let config = watcher::Config::default().labels(selector);
        let objects = watcher(self.endpoints(), config)
            .applied_objects()
            .map_err(ClusterError::from);
        Ok(endpoint_events(objects))
    }
}

/// Decode raw CiliumEndpoint objects; a malformed status ends up as an
/// error item on the stream
fn endpoint_events<S>(objects: S) -> EndpointStream
where
    S: Stream<Item = Result<DynamicObject, ClusterError>> + Send + 'static,
{
    objects
        .and_then(|obj| futures::future::ready(endpoint_status(&obj)))
        .boxed()
}

/// Build the single-replica deployment for a workload
pub fn build_deployment(spec: &WorkloadSpec) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            labels: Some(spec.labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(spec.labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(spec.labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(spec.image.clone()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        ports: Some(vec![ContainerPort {
                            container_port: i32::from(spec.port),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// API resource for Cilium's per-pod endpoint records
pub fn cilium_endpoint_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("cilium.io", "v2", "CiliumEndpoint");
    ApiResource::from_gvk_with_plural(&gvk, "ciliumendpoints")
}

fn instance_status(pod: &Pod) -> InstanceStatus {
    let status = pod.status.as_ref();
    InstanceStatus {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase: status.and_then(|s| s.phase.clone()),
        address: status.and_then(|s| s.pod_ip.clone()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CiliumEndpointStatus {
    #[serde(default)]
    networking: Option<EndpointNetworking>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointNetworking {
    #[serde(default)]
    addressing: Vec<AddressPair>,
}

#[derive(Debug, Default, Deserialize)]
struct AddressPair {
    #[serde(default)]
    ipv4: Option<String>,
}

fn endpoint_status(obj: &DynamicObject) -> Result<EndpointStatus, ClusterError> {
    let name = obj.metadata.name.clone().unwrap_or_default();

    let status: CiliumEndpointStatus = match obj.data.get("status") {
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            ClusterError::decode(format!("CiliumEndpoint {} status: {}", name, e))
        })?,
        None => CiliumEndpointStatus::default(),
    };

    let ipv4 = status
        .networking
        .map(|n| {
            n.addressing
                .into_iter()
                .map(|pair| pair.ipv4.unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();

    Ok(EndpointStatus { name, ipv4 })
}
