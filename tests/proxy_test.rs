use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use docker_socket_proxy::docker::StaticMetadataStore;
use docker_socket_proxy::middleware::{MiddlewareManager, PolicyConfig};
use docker_socket_proxy::server::ProxyServer;
use docker_socket_proxy::settings::{ListenAddress, ServerSettings};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;

// 엔진이 받은 요청 기록
#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
}

type EngineLog = Arc<Mutex<Vec<Recorded>>>;

const CONTAINER_LIST: &str = r#"[
    {"Id": "a", "Labels": {"env": "test"}},
    {"Id": "b", "Labels": {"env": "prod"}},
    {"Id": "c", "Labels": null}
]"#;

fn engine_json(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

// 테스트용 가짜 Docker 엔진
async fn engine_service(mut req: Request<Incoming>, log: EngineLog) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.headers().contains_key(header::UPGRADE) {
        let on_upgrade = hyper::upgrade::on(&mut req);
        log.lock().unwrap().push(Recorded {
            method: req.method().to_string(),
            uri: req.uri().to_string(),
            headers: req.headers().clone(),
            body: Bytes::new(),
        });

        // 없는 컨테이너는 업그레이드 없이 거절
        if req.uri().path().contains("/containers/missing/") {
            return Ok(engine_json(StatusCode::NOT_FOUND, r#"{"message": "no such container"}"#));
        }

        // 업그레이드 후 받은 바이트를 그대로 돌려줌
        tokio::spawn(async move {
            let Ok(upgraded) = on_upgrade.await else { return };
            let mut io = TokioIo::new(upgraded);
            let mut buf = [0u8; 1024];
            loop {
                match io.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if io.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        return Ok(Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "tcp")
            .body(Full::new(Bytes::new()))
            .unwrap());
    }

    let (parts, body) = req.into_parts();
    let body = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
    log.lock().unwrap().push(Recorded {
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        headers: parts.headers.clone(),
        body,
    });

    let response = match parts.uri.path() {
        "/containers/json" => engine_json(StatusCode::OK, CONTAINER_LIST),
        "/_ping" => Response::new(Full::new(Bytes::from_static(b"OK"))),
        _ => engine_json(StatusCode::CREATED, r#"{"Id": "created"}"#),
    };
    Ok(response)
}

async fn start_engine(path: &Path) -> EngineLog {
    let listener = UnixListener::bind(path).unwrap();
    let log: EngineLog = Arc::default();
    let engine_log = log.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = engine_log.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| engine_service(req, log.clone()));
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades()
                    .await;
            });
        }
    });

    log
}

struct TestProxy {
    socket: PathBuf,
    engine: EngineLog,
    shutdown: Option<oneshot::Sender<()>>,
    _dir: tempfile::TempDir,
}

impl TestProxy {
    async fn start(policy: &str, max_body_size: usize) -> Self {
        Self::start_with_engine(policy, max_body_size, true).await
    }

    async fn start_with_engine(policy: &str, max_body_size: usize, with_engine: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let engine_socket = dir.path().join("engine.sock");
        let proxy_socket = dir.path().join("proxy.sock");

        let engine = if with_engine {
            start_engine(&engine_socket).await
        } else {
            Arc::default()
        };

        let config = PolicyConfig::from_yaml(policy).unwrap();
        let manager = MiddlewareManager::bootstrap(&config, Arc::new(StaticMetadataStore::new())).unwrap();

        let settings = ServerSettings {
            listen: ListenAddress::Unix(proxy_socket.clone()),
            forwarding_socket: engine_socket,
            max_body_size,
            metadata_timeout: Duration::from_secs(1),
        };
        let server = ProxyServer::bind(&settings, manager).await.unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Self {
            socket: proxy_socket,
            engine,
            shutdown: Some(tx),
            _dir: dir,
        }
    }

    async fn send(&self, req: Request<Full<Bytes>>) -> (StatusCode, HeaderMap, Bytes) {
        let stream = UnixStream::connect(&self.socket).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn);

        let response = sender.send_request(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    fn engine_requests(&self) -> Vec<Recorded> {
        self.engine.lock().unwrap().clone()
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Full<Bytes>> {
    let body = serde_json::to_vec(&body).unwrap();
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "docker")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "docker")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn content_length(headers: &HeaderMap) -> usize {
    headers[header::CONTENT_LENGTH].to_str().unwrap().parse().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_BODY: usize = 16 * 1024;

    #[tokio::test]
    async fn test_unmatched_request_is_forwarded_untouched() {
        let proxy = TestProxy::start("gates:\n  - type: imageLoading\n", MAX_BODY).await;

        let tarball = Bytes::from_static(b"not json at all \x00\x01\x02");
        let req = Request::builder()
            .method("POST")
            .uri("/v1.43/build?t=app")
            .header(header::HOST, "docker")
            .header(header::CONTENT_TYPE, "application/x-tar")
            .header(header::CONTENT_LENGTH, tarball.len())
            .body(Full::new(tarball.clone()))
            .unwrap();

        let (status, _, _) = proxy.send(req).await;
        assert_eq!(status, StatusCode::CREATED);

        let requests = proxy.engine_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].uri, "/v1.43/build?t=app");
        assert_eq!(requests[0].body, tarball);
        assert_eq!(content_length(&requests[0].headers), tarball.len());
    }

    #[tokio::test]
    async fn test_gate_denial_returns_403() {
        let proxy = TestProxy::start("gates:\n  - type: readonlyAccess\n", MAX_BODY).await;

        let (status, headers, body) = proxy
            .send(json_request("POST", "/v1.43/containers/create", json!({ "Image": "nginx" })))
            .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "message": "Read-only access is enabled" }));
        assert!(proxy.engine_requests().is_empty());

        let (status, _, body) = proxy.send(empty_request("GET", "/_ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_mutated_body_has_matching_length() {
        let policy = r#"
mutators:
  - type: addLabels
    labels:
      managed-by: docker-socket-proxy
"#;
        let proxy = TestProxy::start(policy, MAX_BODY).await;

        let (status, _, _) = proxy
            .send(json_request("POST", "/containers/create?name=web", json!({ "Image": "nginx" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let requests = proxy.engine_requests();
        let forwarded = &requests[0];
        assert_eq!(forwarded.uri, "/containers/create?name=web");
        assert_eq!(content_length(&forwarded.headers), forwarded.body.len());

        let body: Value = serde_json::from_slice(&forwarded.body).unwrap();
        assert_eq!(body["Labels"], json!({ "managed-by": "docker-socket-proxy" }));
    }

    #[tokio::test]
    async fn test_mutator_output_is_validated_by_gate() {
        let policy = r#"
gates:
  - type: mountSource
    allowedSources:
      - /home/user/project
mutators:
  - type: mountPath
    from: /workspaces/project
    to: /home/user/project
"#;
        let proxy = TestProxy::start(policy, MAX_BODY).await;

        let (status, _, _) = proxy
            .send(json_request(
                "POST",
                "/containers/create",
                json!({ "HostConfig": { "Binds": ["/workspaces/project:/src"] } }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let forwarded: Value = serde_json::from_slice(&proxy.engine_requests()[0].body).unwrap();
        assert_eq!(forwarded["HostConfig"]["Binds"], json!(["/home/user/project:/src"]));

        let (status, _, body) = proxy
            .send(json_request(
                "POST",
                "/containers/create",
                json!({ "HostConfig": { "Binds": ["/etc:/host-etc"] } }),
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Mounting /etc is not allowed");
        assert_eq!(proxy.engine_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_response_filter() {
        let policy = r#"
responseFilters:
  - type: labelFilter
    requiredLabels:
      env: test
"#;
        let proxy = TestProxy::start(policy, MAX_BODY).await;

        let (status, headers, body) = proxy.send(empty_request("GET", "/containers/json")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_length(&headers), body.len());
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!([{ "Id": "a", "Labels": { "env": "test" } }]));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let policy = "mutators:\n  - type: addLabels\n    labels: { a: b }\n";
        let proxy = TestProxy::start(policy, 64).await;

        let big = json!({ "Image": "nginx", "Env": ["X".repeat(200)] });
        let (status, _, body) = proxy.send(json_request("POST", "/containers/create", big)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["message"].as_str().unwrap().contains("64"));
        assert!(proxy.engine_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_upgrade() {
        let proxy = TestProxy::start("", MAX_BODY).await;

        let req = Request::builder()
            .method("GET")
            .uri("/containers/abc/attach/ws")
            .header(header::HOST, "docker")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let (status, _, _) = proxy.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(proxy.engine_requests().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_unavailable() {
        let proxy = TestProxy::start_with_engine("", MAX_BODY, false).await;

        let (status, _, body) = proxy.send(empty_request("GET", "/_ping")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_tunnel_splices_both_directions() {
        // 터널에는 미들웨어가 적용되지 않음
        let proxy = TestProxy::start("gates:\n  - type: readonlyAccess\n", MAX_BODY).await;

        let stream = UnixStream::connect(&proxy.socket).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn.with_upgrades());

        let req = Request::builder()
            .method("POST")
            .uri("/v1.43/containers/abc/attach?stream=1&stdin=1")
            .header(header::HOST, "docker")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "tcp")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = sender.send_request(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

        let upgraded = hyper::upgrade::on(response).await.unwrap();
        let mut io = TokioIo::new(upgraded);

        io.write_all(b"hello engine").await.unwrap();
        let mut buf = [0u8; 12];
        io.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello engine");

        io.write_all(b"again").await.unwrap();
        let mut buf = [0u8; 5];
        io.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"again");

        let requests = proxy.engine_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].uri, "/v1.43/containers/abc/attach?stream=1&stdin=1");
    }

    #[tokio::test]
    async fn test_refused_tunnel_is_relayed_as_response() {
        let proxy = TestProxy::start("", MAX_BODY).await;

        let stream = UnixStream::connect(&proxy.socket).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn.with_upgrades());

        let req = Request::builder()
            .method("POST")
            .uri("/v1.43/containers/missing/attach?stream=1")
            .header(header::HOST, "docker")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "tcp")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let mut response = sender.send_request(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(hyper::upgrade::on(&mut response).await.is_err());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "message": "no such container" }));

        let requests = proxy.engine_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].uri, "/v1.43/containers/missing/attach?stream=1");
    }

    #[tokio::test]
    async fn test_encoded_path_is_checked_as_decoded() {
        let policy = r#"
gates:
  - type: mountSource
    allowedSources:
      - /home/user/project
"#;
        let proxy = TestProxy::start(policy, MAX_BODY).await;

        let (status, _, body) = proxy
            .send(json_request(
                "POST",
                "/v1.43/containers%2Fcreate",
                json!({ "HostConfig": { "Binds": ["/var/run/docker.sock:/var/run/docker.sock"] } }),
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Mounting /var/run/docker.sock is not allowed");
        assert!(proxy.engine_requests().is_empty());

        let (status, _, _) = proxy
            .send(json_request(
                "POST",
                "/v1.43/%63ontainers%2Fcreate?name=web",
                json!({ "HostConfig": { "Binds": ["/home/user/project:/src"] } }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let requests = proxy.engine_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].uri, "/v1.43/containers/create?name=web");
    }

    #[tokio::test]
    async fn test_double_encoded_path_is_rejected() {
        let proxy = TestProxy::start("gates:\n  - type: readonlyAccess\n", MAX_BODY).await;

        let (status, _, _) = proxy
            .send(json_request("POST", "/v1.43/containers%252Fcreate", json!({ "Image": "nginx" })))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(proxy.engine_requests().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let mut proxy = TestProxy::start("", MAX_BODY).await;
        assert!(proxy.socket.exists());

        if let Some(tx) = proxy.shutdown.take() {
            tx.send(()).unwrap();
        }

        for _ in 0..50 {
            if !proxy.socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!proxy.socket.exists());
    }
}
