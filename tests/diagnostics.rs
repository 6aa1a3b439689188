//! End-to-end tests through the public API: facade and JSON-RPC server.

use async_trait::async_trait;
use mysql_agent::config::AgentConfig;
use mysql_agent::error::{InferenceError, ToolError};
use mysql_agent::inference::ChatCompletion;
use mysql_agent::rpc::{self, RpcResponse};
use mysql_agent::service::{AgentContext, AgentRuntime, DiagnosticService, GUIDANCE_ANSWER};
use mysql_agent::tools::{empty_schema, Probe, ToolRegistry};
use mysql_agent::types::{ChatMessage, InferenceResponse, QueryRequest, SourceStatus};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

struct CannedProbe {
    name: &'static str,
    output: Result<Value, &'static str>,
}

#[async_trait]
impl Probe for CannedProbe {
    // Accepts any parameters, like the default plan's `{"full": true}`.
    type Params = Value;

    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "canned diagnostic probe"
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn run(&self, _params: Value) -> Result<Value, ToolError> {
        self.output.clone().map_err(|e| ToolError::InvalidParams {
            tool: self.name.to_string(),
            message: e.to_string(),
        })
    }
}

/// Replies in order; `None` entries fail the call. Out of replies: fail.
struct ScriptedModel {
    replies: Mutex<VecDeque<Option<String>>>,
    calls: Mutex<usize>,
}

impl ScriptedModel {
    fn new(replies: Vec<Option<&str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(String::from)).collect()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedModel {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _max_tokens: u32,
    ) -> Result<InferenceResponse, InferenceError> {
        *self.calls.lock().unwrap() += 1;
        match self.replies.lock().unwrap().pop_front().flatten() {
            Some(text) => Ok(InferenceResponse {
                content: Some(text),
                ..InferenceResponse::default()
            }),
            None => Err(InferenceError::Status {
                status: 502,
                body: "bad gateway".into(),
            }),
        }
    }
}

/// Catalog without `slow_query_analysis`.
fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CannedProbe {
        name: "show_status",
        output: Ok(json!({"status_variables": [{"variable_name": "Threads_running", "value": "3"}], "total_count": 1})),
    });
    registry.register(CannedProbe {
        name: "show_connections",
        output: Ok(json!({"total_active_processes": 2})),
    });
    registry.register(CannedProbe {
        name: "show_processlist",
        output: Ok(json!({"processes": [], "total_count": 0})),
    });
    registry.register(CannedProbe {
        name: "innodb_trx",
        output: Err("access denied"),
    });
    registry
}

fn service(model: Arc<ScriptedModel>) -> DiagnosticService {
    let runtime = AgentRuntime::new(registry(), model, &AgentConfig::default());
    DiagnosticService::new(Arc::new(AgentContext::ready(runtime)))
}

#[tokio::test]
async fn outage_of_the_model_still_produces_a_full_response() {
    let model = ScriptedModel::new(vec![None, None]);
    let svc = service(model.clone());

    let response = svc.query(QueryRequest::new("why slow?")).await.unwrap();

    let tools: Vec<&str> = response.sources.iter().map(|s| s.tool.as_str()).collect();
    assert_eq!(tools, vec!["show_status", "show_connections", "show_processlist"]);
    assert!(response.sources.iter().all(|s| s.status == SourceStatus::Success));
    assert!(response.answer.starts_with("Summarization failed"));
    for tool in &tools {
        assert!(response.answer.contains(tool), "answer misses {}", tool);
    }
    assert_eq!(response.raw.len(), 3);
    assert_eq!(response.raw["show_processlist"][0].params, json!({"full": true}));
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn unknown_planned_tool_does_not_stop_the_plan() {
    let model = ScriptedModel::new(vec![
        Some(r#"{"steps":[{"tool":"drop_table"},{"tool":"innodb_trx"},{"tool":"show_status"}]}"#),
        Some("**Summary:** Threads_running is 3."),
    ]);
    let svc = service(model);

    let response = svc.query(QueryRequest::new("locks?")).await.unwrap();

    assert_eq!(response.answer, "**Summary:** Threads_running is 3.");
    assert_eq!(response.sources.len(), 3);
    assert_eq!(
        response.sources[0].error.as_deref(),
        Some("tool not registered: drop_table")
    );
    assert_eq!(response.sources[1].status, SourceStatus::Error);
    assert_eq!(response.sources[2].status, SourceStatus::Success);
    assert!(response.raw["innodb_trx"][0].result.is_none());
}

async fn send(stream: &mut BufReader<TcpStream>, request: Value) -> RpcResponse {
    let mut line = serde_json::to_vec(&request).unwrap();
    line.push(b'\n');
    stream.get_mut().write_all(&line).await.unwrap();

    let mut reply = String::new();
    stream.read_line(&mut reply).await.unwrap();
    serde_json::from_str(&reply).unwrap()
}

#[tokio::test]
async fn rpc_server_answers_over_loopback() {
    let model = ScriptedModel::new(vec![
        Some(r#"```json
{"steps":[{"tool":"show_status","reason":"load"}]}
```"#),
        Some("**Summary:** ok"),
    ]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(rpc::serve(listener, service(model), cancel.clone()));

    let mut stream = BufReader::new(TcpStream::connect(addr).await.unwrap());

    let blank = send(
        &mut stream,
        json!({"method": "Agent.Query", "params": [{"query": ""}], "id": 1}),
    )
    .await;
    assert_eq!(blank.id, json!(1));
    assert_eq!(blank.result["answer"], GUIDANCE_ANSWER);

    let answered = send(
        &mut stream,
        json!({"method": "Agent.Query", "params": {"query": "how loaded is it?"}, "id": 2}),
    )
    .await;
    assert!(answered.error.is_none());
    assert_eq!(answered.result["answer"], "**Summary:** ok");
    assert_eq!(answered.result["sources"][0]["tool"], "show_status");
    assert_eq!(answered.result["sources"][0]["status"], "success");
    assert_eq!(
        answered.result["raw"]["show_status"][0]["result"]["total_count"],
        1
    );

    let unknown = send(&mut stream, json!({"method": "Agent.Nope", "params": [], "id": 3})).await;
    assert!(unknown.error.is_some());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn rpc_answers_undecodable_line_and_keeps_connection() {
    let model = ScriptedModel::new(vec![]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(rpc::serve(listener, service(model), cancel.clone()));

    let mut stream = BufReader::new(TcpStream::connect(addr).await.unwrap());
    stream.get_mut().write_all(b"\xc3\x28 not utf-8\n").await.unwrap();
    let mut reply = String::new();
    stream.read_line(&mut reply).await.unwrap();
    let rejected: RpcResponse = serde_json::from_str(&reply).unwrap();
    assert!(rejected.id.is_null());
    assert_eq!(
        rejected.error.as_deref(),
        Some("invalid request: request is not valid UTF-8")
    );

    let blank = send(
        &mut stream,
        json!({"method": "Agent.Query", "params": [{"query": " "}], "id": 2}),
    )
    .await;
    assert_eq!(blank.result["answer"], GUIDANCE_ANSWER);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn rpc_reports_cached_init_failure() {
    let context = AgentContext::new(|| async {
        Err(mysql_agent::error::InitError::Inference(
            "inference API key is not configured".into(),
        ))
    });
    let svc = DiagnosticService::new(Arc::new(context));

    let reply = rpc::handle_line(
        &svc,
        r#"{"method":"Agent.Query","params":[{"query":"why slow?"}],"id":9}"#,
    )
    .await;
    assert_eq!(reply.id, json!(9));
    assert!(reply.result.is_null());
    assert_eq!(
        reply.error.as_deref(),
        Some("failed to create inference client: inference API key is not configured")
    );
}
