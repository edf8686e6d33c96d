// Fake Engine
// Scripted execution engine used by step and executor tests

use crate::runners::{ExecRequest, ExecStatus, ExecutionEngine};
use crate::RunnerResult;

use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct FakeReply {
    pub lines: Vec<String>,
    pub exit_code: i32,
    pub delay: Option<Duration>,
}

impl FakeReply {
    pub fn ok(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Default::default()
        }
    }

    pub fn sleep(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }
}

type Responder = Box<dyn Fn(&ExecRequest) -> FakeReply + Send + Sync>;

/// Records every request and answers with whatever the responder returns
pub struct FakeEngine {
    responder: Responder,
    requests: Mutex<Vec<ExecRequest>>,
}

impl FakeEngine {
    pub fn new(responder: impl Fn(&ExecRequest) -> FakeReply + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request succeeds with no output
    pub fn succeeding() -> Self {
        Self::new(|_| FakeReply::default())
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ExecutionEngine for FakeEngine {
    async fn execute(
        &self,
        request: &ExecRequest,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> RunnerResult<ExecStatus> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = (self.responder)(request);
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        for line in &reply.lines {
            on_line(line);
        }
        Ok(ExecStatus {
            exit_code: Some(reply.exit_code),
        })
    }
}
