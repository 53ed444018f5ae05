//! 마운트 소스 경로 재작성 (`from` 경로를 `to` 아래로 옮김)
//!
//! `to`가 볼륨 이름이고 남은 경로가 있으면 볼륨 + subpath 마운트로 바뀝니다.
//! bind 마운트는 subpath를 지원하지 않으므로 이 경우 `Binds` 항목을 지우고
//! `HostConfig.Mounts`에 volume 타입 마운트를 추가합니다.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::docker::MetadataStore;
use crate::middleware::config::require;
use crate::middleware::{Method, MiddlewareError, Mutator, RequestContext, Unit, UnitConfig, Url};

pub const KEY: &str = "mountPath";

#[derive(Debug, Deserialize)]
struct MountPathSettings {
    from: Option<String>,
    to: Option<String>,
}

/// 재작성된 마운트 소스
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rebased {
    /// `from` 밖의 경로 (변경하지 않음)
    OutOfScope,
    /// 호스트 절대 경로
    Path(String),
    Volume { name: String, subpath: Option<String> },
}

#[derive(Debug, PartialEq)]
enum BindRewrite {
    Keep,
    Bind(String),
    Mount(Value),
}

pub struct MountPathMutator {
    from: String,
    to: String,
    from_absolute: bool,
    from_parts: Vec<String>,
}

impl MountPathMutator {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let (from_absolute, parts) = normalize(&from);
        let from_parts = parts.into_iter().map(str::to_string).collect();
        Self { from, to: to.into(), from_absolute, from_parts }
    }

    /// 요청된 소스를 `from` 기준으로 재작성합니다.
    ///
    /// 정규화 후 `from` 아래에 있지 않은 경로(`..`로 빠져나가는 경로 포함)는 범위 밖입니다.
    pub fn rebase(&self, source: &str) -> Rebased {
        let (absolute, parts) = normalize(source);
        let in_scope = absolute == self.from_absolute
            && parts.len() >= self.from_parts.len()
            && parts.iter().zip(&self.from_parts).all(|(a, b)| a == b);
        if !in_scope {
            return Rebased::OutOfScope;
        }

        let remainder = parts[self.from_parts.len()..].join("/");
        let new_source = if remainder.is_empty() {
            self.to.clone()
        } else {
            format!("{}/{}", self.to.trim_end_matches('/'), remainder)
        };

        if new_source.starts_with('/') {
            return Rebased::Path(new_source);
        }

        // `to`가 `/`로 끝나고 남은 경로가 없으면 볼륨 이름만 바뀜
        match new_source.split_once('/') {
            Some((name, subpath)) => Rebased::Volume {
                name: name.to_string(),
                subpath: Some(subpath.to_string()).filter(|s| !s.is_empty()),
            },
            None => Rebased::Volume { name: new_source, subpath: None },
        }
    }

    fn rewrite_bind(&self, bind: &str) -> BindRewrite {
        let mut parts = bind.splitn(3, ':');
        let source = parts.next().unwrap_or_default();
        let Some(target) = parts.next() else {
            return BindRewrite::Keep;
        };
        let options = parts.next();

        let new_source = match self.rebase(source) {
            Rebased::OutOfScope => return BindRewrite::Keep,
            Rebased::Path(path) => path,
            Rebased::Volume { name, subpath: None } => name,
            Rebased::Volume { name, subpath: Some(subpath) } => {
                let mut mount = json!({
                    "Type": "volume",
                    "Source": name,
                    "Target": target,
                    "VolumeOptions": { "Subpath": subpath },
                });
                let read_only = options.map_or(false, |opts| opts.split(',').any(|opt| opt == "ro"));
                if read_only {
                    mount["ReadOnly"] = Value::Bool(true);
                }
                return BindRewrite::Mount(mount);
            }
        };

        match options {
            Some(options) => BindRewrite::Bind(format!("{}:{}:{}", new_source, target, options)),
            None => BindRewrite::Bind(format!("{}:{}", new_source, target)),
        }
    }

    fn rewrite_mount(&self, mount: &mut Map<String, Value>) {
        // tmpfs처럼 소스가 없는 마운트는 건너뜀
        let Some(source) = mount.get("Source").and_then(Value::as_str) else {
            return;
        };

        match self.rebase(source) {
            Rebased::OutOfScope => {}
            Rebased::Path(path) => {
                mount.insert("Source".to_string(), Value::String(path));
                if mount.get("Type").and_then(Value::as_str) == Some("volume") {
                    mount.insert("Type".to_string(), Value::String("bind".to_string()));
                    mount.remove("VolumeOptions");
                }
            }
            Rebased::Volume { name, subpath } => {
                mount.insert("Source".to_string(), Value::String(name));
                mount.insert("Type".to_string(), Value::String("volume".to_string()));
                mount.remove("BindOptions");

                if let Some(subpath) = subpath {
                    let options = mount.entry("VolumeOptions").or_insert(Value::Null);
                    if !options.is_object() {
                        *options = Value::Object(Map::new());
                    }
                    if let Some(options) = options.as_object_mut() {
                        options.insert("Subpath".to_string(), Value::String(subpath));
                    }
                }
            }
        }
    }
}

/// `.`과 `..`을 정리한 경로 구성요소. 절대 경로에서 루트 위로는 올라가지 않습니다.
fn normalize(path: &str) -> (bool, Vec<&str>) {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().map_or(false, |last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            segment => parts.push(segment),
        }
    }

    (absolute, parts)
}

impl Unit for MountPathMutator {
    fn name(&self) -> &'static str {
        "MountPathMutator"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        method == Method::POST && url.path().ends_with("/containers/create")
    }

    fn describe(&self) -> String {
        format!("MountPathMutator - rewriting volume paths from {} to rebase to {}", self.from, self.to)
    }
}

#[async_trait]
impl Mutator for MountPathMutator {
    async fn run(&self, request: &mut RequestContext) -> Result<(), MiddlewareError> {
        let body = request.body_object_mut()?;
        let Some(host_config) = body.get_mut("HostConfig").and_then(Value::as_object_mut) else {
            return Ok(());
        };

        let mut converted = Vec::new();
        if let Some(binds) = host_config.get_mut("Binds").and_then(Value::as_array_mut) {
            let mut kept = Vec::with_capacity(binds.len());
            for bind in binds.iter() {
                let spec = bind.as_str()
                    .ok_or_else(|| MiddlewareError::InvalidBody("HostConfig.Binds 항목은 문자열이어야 합니다".to_string()))?;
                match self.rewrite_bind(spec) {
                    BindRewrite::Keep => kept.push(bind.clone()),
                    BindRewrite::Bind(rewritten) => kept.push(Value::String(rewritten)),
                    BindRewrite::Mount(mount) => converted.push(mount),
                }
            }
            *binds = kept;
        }

        if let Some(mounts) = host_config.get_mut("Mounts").and_then(Value::as_array_mut) {
            for mount in mounts.iter_mut().filter_map(Value::as_object_mut) {
                self.rewrite_mount(mount);
            }
        }

        if !converted.is_empty() {
            let mounts = host_config.entry("Mounts").or_insert(Value::Null);
            if mounts.is_null() {
                *mounts = Value::Array(Vec::new());
            }
            mounts.as_array_mut()
                .ok_or_else(|| MiddlewareError::InvalidBody("HostConfig.Mounts는 배열이어야 합니다".to_string()))?
                .extend(converted);
        }

        Ok(())
    }
}

pub fn construct(config: &UnitConfig, _metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn Mutator>, MiddlewareError> {
    let settings: MountPathSettings = config.parse()?;
    let from = require(settings.from, "from")?;
    let to = require(settings.to, "to")?;
    Ok(Arc::new(MountPathMutator::new(from, to)))
}
