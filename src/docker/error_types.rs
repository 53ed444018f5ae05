use std::fmt;

#[derive(Debug)]
pub enum DockerError {
    /// Docker 데몬 연결 실패
    ConnectionError {
        source: bollard::errors::Error,
        context: String,
    },
    /// 볼륨 목록 조회 실패
    ListVolumesError {
        source: bollard::errors::Error,
        context: String,
    },
}

impl DockerError {
    /// 재시도할 가치가 있는 오류인지 판단합니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            DockerError::ConnectionError { .. } => true,
            DockerError::ListVolumesError { source, .. } =>
                matches!(source, bollard::errors::Error::IOError { .. }),
        }
    }
}

impl fmt::Display for DockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerError::ConnectionError { source, context } =>
                write!(f, "Docker 데몬 연결 실패 ({}): {}", context, source),
            DockerError::ListVolumesError { source, context } =>
                write!(f, "볼륨 목록 조회 실패 ({}): {}", context, source),
        }
    }
}

impl std::error::Error for DockerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DockerError::ConnectionError { source, .. } |
            DockerError::ListVolumesError { source, .. } => Some(source),
        }
    }
}

impl From<bollard::errors::Error> for DockerError {
    fn from(err: bollard::errors::Error) -> Self {
        DockerError::ConnectionError {
            source: err,
            context: "Docker 데몬 연결 실패".to_string(),
        }
    }
}
