use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::{Gate, GateOutcome, MiddlewareError, Mutator, RequestContext, ResponseFilter, Url};

/// 단일 요청에 적용될 미들웨어 목록
///
/// 요청마다 새로 만들어지며 요청이 끝나면 버려집니다.
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    gates: Vec<Arc<dyn Gate>>,
    mutators: Vec<Arc<dyn Mutator>>,
    response_filters: Vec<Arc<dyn ResponseFilter>>,
}

impl MiddlewareChain {
    pub fn new(
        gates: Vec<Arc<dyn Gate>>,
        mutators: Vec<Arc<dyn Mutator>>,
        response_filters: Vec<Arc<dyn ResponseFilter>>,
    ) -> Self {
        Self { gates, mutators, response_filters }
    }

    pub fn has_middleware(&self) -> bool {
        self.has_gates() || self.has_mutators() || self.has_response_filters()
    }

    /// 요청 본문을 읽어야 하는 유닛이 있는지 여부
    pub fn has_request_middleware(&self) -> bool {
        self.has_gates() || self.has_mutators()
    }

    pub fn has_gates(&self) -> bool {
        !self.gates.is_empty()
    }

    pub fn has_mutators(&self) -> bool {
        !self.mutators.is_empty()
    }

    pub fn has_response_filters(&self) -> bool {
        !self.response_filters.is_empty()
    }

    /// 뮤테이터를 설정 순서대로 실행합니다. 뒤의 뮤테이터는 앞선 변경 결과를 봅니다.
    pub async fn apply_mutators(&self, request: &mut RequestContext) -> Result<(), MiddlewareError> {
        for mutator in &self.mutators {
            debug!(mutator = mutator.name(), "뮤테이터 실행");
            mutator.run(request).await?;
        }
        Ok(())
    }

    /// 게이트를 설정 순서대로 실행하고 첫 번째 거부에서 멈춥니다.
    pub async fn apply_gates(&self, request: &RequestContext) -> Result<GateOutcome, MiddlewareError> {
        for gate in &self.gates {
            debug!(gate = gate.name(), "게이트 실행");
            let outcome = gate.run(request).await?;
            if let GateOutcome::Denied(reason) = &outcome {
                info!(gate = gate.name(), reason = %reason, "요청 거부");
                return Ok(outcome);
            }
        }
        Ok(GateOutcome::Allowed)
    }

    /// 뮤테이터를 먼저 실행한 뒤 게이트를 실행합니다.
    pub async fn process_request(&self, request: &mut RequestContext) -> Result<GateOutcome, MiddlewareError> {
        self.apply_mutators(request).await?;
        self.apply_gates(request).await
    }

    pub fn apply_response_filters(&self, url: &Url, body: &mut Value) -> Result<(), MiddlewareError> {
        for filter in &self.response_filters {
            debug!(filter = filter.name(), "응답 필터 실행");
            filter.run(url, body)?;
        }
        Ok(())
    }

    pub fn unit_names(&self) -> Vec<&'static str> {
        self.mutators.iter().map(|m| m.name())
            .chain(self.gates.iter().map(|g| g.name()))
            .chain(self.response_filters.iter().map(|f| f.name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Method, Unit};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        deny: bool,
    }

    impl Unit for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn applies(&self, _method: &Method, _url: &Url) -> bool {
            true
        }
    }

    #[async_trait]
    impl Gate for Recorder {
        async fn run(&self, _request: &RequestContext) -> Result<GateOutcome, MiddlewareError> {
            self.log.lock().unwrap().push(self.name);
            if self.deny {
                Ok(GateOutcome::denied(format!("{} says no", self.name)))
            } else {
                Ok(GateOutcome::Allowed)
            }
        }
    }

    #[async_trait]
    impl Mutator for Recorder {
        async fn run(&self, _request: &mut RequestContext) -> Result<(), MiddlewareError> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, deny: bool) -> Arc<Recorder> {
        Arc::new(Recorder { name, log: log.clone(), deny })
    }

    #[test]
    fn test_empty_chain() {
        let chain = MiddlewareChain::default();
        assert!(!chain.has_middleware());
        assert!(!chain.has_request_middleware());
    }

    #[tokio::test]
    async fn test_mutators_run_before_gates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new(
            vec![recorder("gate", &log, false)],
            vec![recorder("mutator-1", &log, false), recorder("mutator-2", &log, false)],
            vec![],
        );

        let mut request = RequestContext::from_path(Method::POST, "/containers/create", None).unwrap();
        let outcome = chain.process_request(&mut request).await.unwrap();

        assert!(outcome.is_allowed());
        assert_eq!(*log.lock().unwrap(), vec!["mutator-1", "mutator-2", "gate"]);
    }

    #[tokio::test]
    async fn test_gates_stop_at_first_denial() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new(
            vec![
                recorder("first", &log, false),
                recorder("second", &log, true),
                recorder("third", &log, true),
            ],
            vec![],
            vec![],
        );

        let request = RequestContext::from_path(Method::POST, "/containers/create", None).unwrap();
        let outcome = chain.apply_gates(&request).await.unwrap();

        assert_eq!(outcome, GateOutcome::denied("second says no"));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }
}
