use std::fmt;

#[derive(Debug)]
pub enum SettingsError {
    EnvVarInvalid {
        var_name: String,
        value: String,
        reason: String,
    },
    FileError {
        path: String,
        error: std::io::Error,
    },
    /// 정책 문서 파싱 실패 (`source`는 파일 경로 또는 환경 변수 이름)
    PolicyParseError {
        source: String,
        reason: String,
    },
    NoConfiguration,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvVarInvalid { var_name, value, reason } =>
                write!(f, "환경 변수 {} 값 {} 오류: {}", var_name, value, reason),
            Self::FileError { path, error } =>
                write!(f, "설정 파일 {} 오류: {}", path, error),
            Self::PolicyParseError { source, reason } =>
                write!(f, "정책 설정 파싱 오류 ({}): {}", source, reason),
            Self::NoConfiguration =>
                write!(f, "No configuration provided"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileError { error, .. } => Some(error),
            _ => None,
        }
    }
}
