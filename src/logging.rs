use std::io;
use std::path::Path;
use std::time::Instant;

use tracing::{error, info, span, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{LogFormat, LogOutput, LogSettings};

/// 전역 subscriber를 설치합니다.
///
/// 반환된 guard가 drop되면 버퍼에 남은 로그가 기록되므로 `main`이 끝까지 보관해야 합니다.
pub fn init_logging(settings: &LogSettings) -> io::Result<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(settings.level).into())
        .from_env_lossy();

    let (writer, guard) = match &settings.output {
        LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
        LogOutput::File(path) => tracing_appender::non_blocking(file_appender(Path::new(path))?),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(writer)
        .with_target(true);

    let installed = match settings.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    // 테스트처럼 이미 설치된 경우는 무시
    if let Err(e) = installed {
        warn!(error = %e, "로깅이 이미 초기화되어 있습니다");
    }

    Ok(guard)
}

fn file_appender(path: &Path) -> io::Result<RollingFileAppender> {
    let directory = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let file_name = path.file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("로그 파일 경로 오류: {}", path.display())))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

/// 요청 한 건의 처리 기록. 요청이 끝날 때 `log_request`로 한 번 출력됩니다.
#[derive(Debug)]
pub struct RequestLog {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration_ms: u64,
    pub units: Vec<&'static str>,
    pub tunnel: bool,
    pub error: Option<String>,
    started: Instant,
}

impl RequestLog {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            method: String::new(),
            path: String::new(),
            status_code: 0,
            duration_ms: 0,
            units: Vec::new(),
            tunnel: false,
            error: None,
            started: Instant::now(),
        }
    }

    pub fn with_request<B>(&mut self, req: &hyper::Request<B>) {
        self.method = req.method().to_string();
        self.path = req.uri().path().to_string();
    }

    pub fn with_units(&mut self, units: Vec<&'static str>) {
        self.units = units;
    }

    pub fn with_response(&mut self, status: hyper::StatusCode) {
        self.status_code = status.as_u16();
    }

    pub fn with_error(&mut self, error: impl std::fmt::Display) {
        self.error = Some(error.to_string());
    }

    pub fn finish(&mut self) {
        self.duration_ms = self.started.elapsed().as_millis() as u64;
    }
}

pub fn log_request(log: &RequestLog) {
    let level = if log.error.is_some() || log.status_code >= 500 {
        Level::ERROR
    } else if log.status_code >= 400 {
        Level::WARN
    } else {
        Level::INFO
    };

    let span = span!(
        Level::INFO,
        "request",
        request_id = %log.request_id,
        method = %log.method,
        path = %log.path,
        status = log.status_code,
        duration_ms = log.duration_ms
    );
    let _enter = span.enter();

    match level {
        Level::ERROR => error!(units = ?log.units, tunnel = log.tunnel, error = ?log.error, "Request failed"),
        Level::WARN => warn!(units = ?log.units, tunnel = log.tunnel, "Request rejected"),
        _ => info!(units = ?log.units, tunnel = log.tunnel, "Request completed"),
    }
}
