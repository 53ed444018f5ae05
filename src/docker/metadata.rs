use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bollard::volume::ListVolumesOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use tracing::{debug, info};

use super::{with_retry, DockerError, RetryPolicy, RetryableOperation};

/// 미들웨어가 엔진 측 리소스를 조회할 때 사용하는 저장소
///
/// 여러 요청에서 동시에 호출될 수 있으며, 결과를 캐시하지 않습니다.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// 주어진 라벨을 모두 가진 볼륨의 이름 목록을 반환합니다.
    async fn volumes_for_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, DockerError>;
}

/// bollard 기반 메타데이터 저장소
pub struct DockerMetadataStore {
    docker: Docker,
    retry: RetryPolicy,
}

impl DockerMetadataStore {
    /// 포워딩 대상 소켓으로 Docker 클라이언트를 생성합니다.
    ///
    /// 연결은 첫 조회 시점에 맺어집니다.
    pub fn connect(socket_path: &Path, timeout: Duration) -> Result<Self, DockerError> {
        let docker = Docker::connect_with_unix(
            &socket_path.to_string_lossy(),
            timeout.as_secs(),
            API_DEFAULT_VERSION,
        )?;

        info!(socket = %socket_path.display(), "메타데이터 저장소 초기화");
        Ok(Self { docker, retry: RetryPolicy::default() })
    }

    fn label_filters(labels: &BTreeMap<String, String>) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            labels.iter().map(|(key, value)| format!("{}={}", key, value)).collect(),
        );
        filters
    }
}

struct VolumeLookup<'a> {
    docker: &'a Docker,
    filters: HashMap<String, Vec<String>>,
}

#[async_trait]
impl<'a> RetryableOperation for VolumeLookup<'a> {
    type Output = Vec<String>;

    async fn execute(&self) -> Result<Vec<String>, DockerError> {
        let options = ListVolumesOptions { filters: self.filters.clone() };

        let response = self.docker.list_volumes(Some(options)).await
            .map_err(|e| DockerError::ListVolumesError {
                source: e,
                context: "라벨 기반 볼륨 조회".to_string(),
            })?;

        Ok(response.volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| volume.name)
            .collect())
    }
}

#[async_trait]
impl MetadataStore for DockerMetadataStore {
    async fn volumes_for_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, DockerError> {
        let lookup = VolumeLookup {
            docker: &self.docker,
            filters: Self::label_filters(labels),
        };

        let volumes = with_retry(lookup, &self.retry).await?;
        debug!(labels = ?labels, count = volumes.len(), "라벨 기반 볼륨 조회 완료");
        Ok(volumes)
    }
}

/// 고정된 볼륨 목록으로 응답하는 메타데이터 저장소
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataStore {
    volumes: Vec<(String, BTreeMap<String, String>)>,
}

impl StaticMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, name: &str, labels: &[(&str, &str)]) -> Self {
        let labels = labels.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        self.volumes.push((name.to_string(), labels));
        self
    }
}

#[async_trait]
impl MetadataStore for StaticMetadataStore {
    async fn volumes_for_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, DockerError> {
        Ok(self.volumes.iter()
            .filter(|(_, volume_labels)| {
                labels.iter().all(|(key, value)| volume_labels.get(key) == Some(value))
            })
            .map(|(name, _)| name.clone())
            .collect())
    }
}
