//! Docker 엔진 API 앞단에서 정책을 적용하는 소켓 프록시
//!
//! 요청마다 적용할 미들웨어를 골라 본문과 URL을 재작성하거나 검증한 뒤
//! 엔진 소켓으로 전달하고, 필요하면 응답 본문을 걸러서 돌려줍니다.
//!
//! # 예제
//!
//! ```
//! use docker_socket_proxy::middleware::{MiddlewareManager, PolicyConfig, Method};
//! use docker_socket_proxy::middleware::context::parse_request_url;
//! use docker_socket_proxy::docker::StaticMetadataStore;
//! use std::sync::Arc;
//!
//! let config = PolicyConfig::from_yaml(r#"
//! gates:
//!   - type: registry
//!     registries: [docker.io]
//! "#).unwrap();
//!
//! let manager = MiddlewareManager::bootstrap(&config, Arc::new(StaticMetadataStore::new())).unwrap();
//!
//! let url = parse_request_url("/v1.43/images/create?fromImage=quay.io/foo/bar").unwrap();
//! let chain = manager.create_chain(&Method::POST, &url);
//! assert!(chain.has_gates());
//! ```

pub mod docker;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod server;
pub mod settings;
