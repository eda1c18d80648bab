//! 워크로드(Pod) 레코드와 저장소 추상화
//!
//! [`WorkloadRecord`]는 컨트롤러가 보는 Pod의 최소 정보입니다.
//! [`WorkloadStore`]는 레코드 조회와 finalizer 갱신을 추상화하여
//! 테스트에서 Kubernetes API 없이 조정 패스를 검증할 수 있게 합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, Patch, PatchParams};
use serde_json::json;
use tracing::debug;

use crate::error::ControllerError;

/// 워크로드 식별자 (`namespace/name`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkloadKey {
    pub namespace: String,
    pub name: String,
}

impl WorkloadKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// 컨테이너 포트 선언
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDeclaration {
    /// 컨테이너 이름
    pub container: String,
    /// 컨테이너 내부 포트
    pub container_port: i32,
    /// 노드에 노출할 호스트 포트
    pub host_port: Option<i32>,
    /// 프로토콜 (TCP, UDP, SCTP)
    pub protocol: String,
}

/// 컨트롤러가 보는 Pod 레코드
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadRecord {
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
    pub finalizers: Vec<String>,
    /// 삭제가 요청되었는지 (`deletionTimestamp` 존재 여부)
    pub deletion_requested: bool,
    /// 스케줄된 노드의 IP (스케줄 전이면 `None`)
    pub host_ip: Option<String>,
    pub resource_version: Option<String>,
    pub ports: Vec<PortDeclaration>,
}

impl WorkloadRecord {
    pub fn key(&self) -> WorkloadKey {
        WorkloadKey::new(&self.namespace, &self.name)
    }

    /// 어노테이션 값을 키로 직접 조회합니다.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }
}

impl TryFrom<&Pod> for WorkloadRecord {
    type Error = ControllerError;

    fn try_from(pod: &Pod) -> Result<Self, Self::Error> {
        let meta = &pod.metadata;
        let name = meta.name.clone().ok_or_else(|| ControllerError::InvalidWorkload {
            key: "<unnamed>".to_owned(),
            reason: "pod has no name".to_owned(),
        })?;
        let namespace = meta
            .namespace
            .clone()
            .ok_or_else(|| ControllerError::InvalidWorkload {
                key: name.clone(),
                reason: "pod has no namespace".to_owned(),
            })?;

        let ports = pod
            .spec
            .iter()
            .flat_map(|spec| spec.containers.iter())
            .flat_map(|container| {
                container
                    .ports
                    .iter()
                    .flatten()
                    .map(move |port| PortDeclaration {
                        container: container.name.clone(),
                        container_port: port.container_port,
                        host_port: port.host_port,
                        protocol: port.protocol.clone().unwrap_or_else(|| "TCP".to_owned()),
                    })
            })
            .collect();

        let host_ip = pod
            .status
            .as_ref()
            .and_then(|status| status.host_ip.clone())
            .filter(|ip| !ip.is_empty());

        Ok(Self {
            namespace,
            name,
            annotations: meta.annotations.clone().unwrap_or_default(),
            finalizers: meta.finalizers.clone().unwrap_or_default(),
            deletion_requested: meta.deletion_timestamp.is_some(),
            host_ip,
            resource_version: meta.resource_version.clone(),
            ports,
        })
    }
}

/// 워크로드 레코드 저장소
///
/// # Error Handling
///
/// - 조회 시 레코드가 없으면 `Ok(None)`
/// - finalizer 갱신 시 레코드가 없으면 `ControllerError::WorkloadNotFound`
pub trait WorkloadStore: Send + Sync + 'static {
    /// 레코드를 조회합니다.
    fn get(
        &self,
        key: &WorkloadKey,
    ) -> impl Future<Output = Result<Option<WorkloadRecord>, ControllerError>> + Send;

    /// 레코드의 finalizer 목록을 교체합니다.
    ///
    /// `record`의 resource version을 전제 조건으로 사용하므로
    /// 그 사이 레코드가 바뀌었다면 충돌 에러가 반환됩니다.
    fn set_finalizers(
        &self,
        record: &WorkloadRecord,
        finalizers: Vec<String>,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send;
}

/// Kubernetes API 기반 저장소
#[derive(Clone)]
pub struct KubeWorkloadStore {
    client: kube::Client,
}

impl KubeWorkloadStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl WorkloadStore for KubeWorkloadStore {
    async fn get(&self, key: &WorkloadKey) -> Result<Option<WorkloadRecord>, ControllerError> {
        let pod = self.api(&key.namespace).get_opt(&key.name).await?;
        pod.as_ref().map(WorkloadRecord::try_from).transpose()
    }

    async fn set_finalizers(
        &self,
        record: &WorkloadRecord,
        finalizers: Vec<String>,
    ) -> Result<(), ControllerError> {
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": record.resource_version,
            }
        });

        match self
            .api(&record.namespace)
            .patch(&record.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!(workload = %record.key(), "finalizers updated");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Err(ControllerError::WorkloadNotFound(record.key().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// 테스트용 메모리 저장소
#[cfg(test)]
#[derive(Default)]
pub struct MockWorkloadStore {
    records: std::sync::Mutex<BTreeMap<WorkloadKey, WorkloadRecord>>,
    writes: std::sync::Mutex<usize>,
    gets: std::sync::Mutex<usize>,
    fail_writes: bool,
    fail_reads: bool,
    vanish_on_write: bool,
}

#[cfg(test)]
impl MockWorkloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, record: WorkloadRecord) -> Self {
        self.records
            .lock()
            .expect("mock lock")
            .insert(record.key(), record);
        self
    }

    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn with_failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// finalizer 갱신 직전에 레코드가 사라진 상황을 흉내냅니다.
    pub fn with_vanishing_record(mut self) -> Self {
        self.vanish_on_write = true;
        self
    }

    pub fn record(&self, key: &WorkloadKey) -> Option<WorkloadRecord> {
        self.records.lock().expect("mock lock").get(key).cloned()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().expect("mock lock")
    }

    /// `get` 호출 수 (API 서버 왕복 수에 해당)
    pub fn gets(&self) -> usize {
        *self.gets.lock().expect("mock lock")
    }
}

#[cfg(test)]
impl WorkloadStore for MockWorkloadStore {
    async fn get(&self, key: &WorkloadKey) -> Result<Option<WorkloadRecord>, ControllerError> {
        *self.gets.lock().expect("mock lock") += 1;
        if self.fail_reads {
            return Err(ControllerError::InvalidWorkload {
                key: key.to_string(),
                reason: "mock read failure".to_owned(),
            });
        }
        Ok(self.record(key))
    }

    async fn set_finalizers(
        &self,
        record: &WorkloadRecord,
        finalizers: Vec<String>,
    ) -> Result<(), ControllerError> {
        *self.writes.lock().expect("mock lock") += 1;
        if self.fail_writes {
            return Err(ControllerError::InvalidWorkload {
                key: record.key().to_string(),
                reason: "mock write failure".to_owned(),
            });
        }
        let mut records = self.records.lock().expect("mock lock");
        if self.vanish_on_write {
            records.remove(&record.key());
        }
        match records.get_mut(&record.key()) {
            Some(stored) => {
                stored.finalizers = finalizers;
                Ok(())
            }
            None => Err(ControllerError::WorkloadNotFound(record.key().to_string())),
        }
    }
}
