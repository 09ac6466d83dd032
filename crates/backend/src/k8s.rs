// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pod backend: one Kubernetes pod per agent, tmux inside.
//!
//! Pod lifecycle goes through the Kubernetes API; tmux itself runs through
//! a cluster exec so the mux surface is identical to the other backends.

use crate::exec::ExecTarget;
use crate::{
    labels, tmux, Backend, BackendError, ManagedSession, Mux, PaneLocks, SpawnSpec,
    SPAWN_TIMEOUT,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::config::{Config, KubeConfigOptions};
use kube::Client;
use std::collections::BTreeMap;
use std::time::Duration;

pub struct PodBackend {
    namespace: String,
    image: String,
    context: Option<String>,
    locks: PaneLocks,
}

impl PodBackend {
    pub fn new(namespace: String, image: String, context: Option<String>) -> Self {
        Self { namespace, image, context, locks: PaneLocks::new() }
    }

    async fn client(&self) -> Result<Client, BackendError> {
        let config = match &self.context {
            Some(context) => {
                let options =
                    KubeConfigOptions { context: Some(context.clone()), ..Default::default() };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| BackendError::Unreachable(e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| BackendError::Unreachable(e.to_string()))?,
        };
        Client::try_from(config).map_err(|e| BackendError::Unreachable(e.to_string()))
    }

    fn pods(&self, client: Client) -> Api<Pod> {
        Api::namespaced(client, &self.namespace)
    }

    fn pod_spec(&self, spec: &SpawnSpec, pod_name: &str) -> Pod {
        let mut pod_labels = BTreeMap::new();
        pod_labels.insert(labels::MARKER.to_string(), "true".to_string());
        pod_labels.insert(labels::AGENT_ID.to_string(), spec.agent_id.clone());
        pod_labels.insert(labels::SESSION_NAME.to_string(), spec.session_name.clone());
        pod_labels.insert(labels::PROVIDER.to_string(), spec.provider.clone());
        pod_labels.insert(labels::CREATED_AT.to_string(), spec.created_at_ms.to_string());

        Pod {
            metadata: ObjectMeta {
                name: Some(pod_name.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(pod_labels),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "agent".to_string(),
                    image: Some(self.image.clone()),
                    command: Some(vec!["sleep".to_string(), "infinity".to_string()]),
                    ..Default::default()
                }],
                restart_policy: Some("Never".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn exec_target(&self, pod_name: &str) -> ExecTarget {
        ExecTarget::pod(&self.namespace, pod_name, self.context.as_deref())
    }

    async fn wait_running(&self, pods: &Api<Pod>, pod_name: &str) -> Result<(), BackendError> {
        let deadline = std::time::Instant::now() + SPAWN_TIMEOUT;
        loop {
            let pod = pods
                .get(pod_name)
                .await
                .map_err(|e| BackendError::Failure(e.to_string()))?;
            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_default();
            match phase.as_str() {
                "Running" => return Ok(()),
                "Failed" | "Succeeded" => {
                    return Err(BackendError::Failure(format!(
                        "pod {} entered phase {}",
                        pod_name, phase
                    )))
                }
                _ => {}
            }
            // Surface image pull problems instead of timing out on them.
            if let Some(statuses) =
                pod.status.as_ref().and_then(|s| s.container_statuses.as_ref())
            {
                for status in statuses {
                    let waiting = status.state.as_ref().and_then(|s| s.waiting.as_ref());
                    if let Some(reason) = waiting.and_then(|w| w.reason.as_deref()) {
                        if reason == "ErrImagePull" || reason == "ImagePullBackOff" {
                            return Err(BackendError::ImageMissing(self.image.clone()));
                        }
                    }
                }
            }
            if std::time::Instant::now() >= deadline {
                return Err(BackendError::Timeout(SPAWN_TIMEOUT));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

fn pod_parts(handle: &ta_core::BackendHandle) -> Result<(&str, &str, &str), BackendError> {
    match handle {
        ta_core::BackendHandle::Pod { pod_name, namespace, session } => {
            Ok((pod_name, namespace, session))
        }
        other => Err(BackendError::WrongBackend(other.to_string())),
    }
}

#[async_trait]
impl Backend for PodBackend {
    fn kind(&self) -> &'static str {
        "pod"
    }

    async fn spawn(&self, spec: &SpawnSpec) -> Result<ta_core::BackendHandle, BackendError> {
        let client = self.client().await?;
        let pods = self.pods(client);
        let pod_name = spec.session_name.clone();

        if pods.get_opt(&pod_name).await.map_err(|e| BackendError::Failure(e.to_string()))?.is_some()
        {
            return Err(BackendError::NameConflict(pod_name));
        }

        let pod = self.pod_spec(spec, &pod_name);
        pods.create(&PostParams::default(), &pod).await.map_err(|e| match &e {
            kube::Error::Api(api_err) if api_err.code == 403 => {
                BackendError::ResourceDenied(api_err.message.clone())
            }
            other => BackendError::Failure(other.to_string()),
        })?;

        if let Err(e) = self.wait_running(&pods, &pod_name).await {
            let _ = pods.delete(&pod_name, &DeleteParams::default()).await;
            return Err(e);
        }

        let in_pod = self.exec_target(&pod_name);
        match tmux::new_session(&in_pod, spec).await {
            Ok(session) => Ok(ta_core::BackendHandle::Pod {
                pod_name,
                namespace: self.namespace.clone(),
                session,
            }),
            Err(e) => {
                let _ = pods.delete(&pod_name, &DeleteParams::default()).await;
                Err(e)
            }
        }
    }

    async fn kill(&self, handle: &ta_core::BackendHandle) -> Result<(), BackendError> {
        let (pod_name, _, session) = pod_parts(handle)?;
        let client = self.client().await?;
        let pods = self.pods(client);
        match pods.delete(pod_name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {}
            Err(e) => return Err(BackendError::Failure(e.to_string())),
        }
        self.locks.forget(session);
        Ok(())
    }

    async fn list_managed(&self) -> Result<Vec<ManagedSession>, BackendError> {
        let client = self.client().await?;
        let pods = self.pods(client);
        let params = ListParams::default().labels(&format!("{}=true", labels::MARKER));
        let list = pods.list(&params).await.map_err(|e| BackendError::Failure(e.to_string()))?;
        let mut found = Vec::new();
        for pod in list {
            let meta_labels = pod.metadata.labels.unwrap_or_default();
            let pod_name = pod.metadata.name.unwrap_or_default();
            let session = meta_labels
                .get(labels::SESSION_NAME)
                .cloned()
                .unwrap_or_else(|| pod_name.clone());
            found.push(ManagedSession {
                handle: ta_core::BackendHandle::Pod {
                    pod_name,
                    namespace: self.namespace.clone(),
                    session,
                },
                agent_id: meta_labels.get(labels::AGENT_ID).cloned().unwrap_or_default(),
                provider: meta_labels.get(labels::PROVIDER).cloned().unwrap_or_default(),
                created_at: meta_labels.get(labels::CREATED_AT).cloned().unwrap_or_default(),
            });
        }
        Ok(found)
    }

    async fn exists(&self, handle: &ta_core::BackendHandle) -> Result<bool, BackendError> {
        let (pod_name, _, _) = pod_parts(handle)?;
        let client = self.client().await?;
        let pods = self.pods(client);
        let pod = pods
            .get_opt(pod_name)
            .await
            .map_err(|e| BackendError::Failure(e.to_string()))?;
        Ok(pod
            .and_then(|p| p.status)
            .and_then(|s| s.phase)
            .map(|phase| phase == "Running")
            .unwrap_or(false))
    }

    fn attach_command(&self, handle: &ta_core::BackendHandle) -> String {
        match handle {
            ta_core::BackendHandle::Pod { pod_name, namespace, session } => {
                format!(
                    "kubectl exec -it -n {} {} -- tmux attach -t {}",
                    namespace, pod_name, session
                )
            }
            other => format!("# handle {} does not belong to this backend", other),
        }
    }

    fn mux(&self, handle: &ta_core::BackendHandle) -> Result<Box<dyn Mux>, BackendError> {
        let (pod_name, _, session) = pod_parts(handle)?;
        let exec = self.exec_target(pod_name);
        Ok(Box::new(tmux::ExecMux::new(exec, session.to_string(), &self.locks)))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let client = self.client().await?;
        let pods = self.pods(client);
        pods.list(&ListParams::default().limit(1))
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        Ok(())
    }
}
