//! Service facade: one diagnostic query from question to response.
//!
//! The shared runtime (tool registry, planner and summarizer over one model
//! client) lives in an [`AgentContext`] that builds it at most once. Every
//! caller sees the same runtime, or the same cached initialization error.

use crate::agent::{
    default_plan, derive_signal_statuses, execute, normalize_plan, raw_dump, Planner, Summarizer,
};
use crate::config::{AgentConfig, MAX_QUERY_TIMEOUT_SECS};
use crate::database::{self, MysqlSource};
use crate::error::InitError;
use crate::inference::{ChatCompletion, InferenceClient};
use crate::tools::{mysql_registry, ToolDefinition, ToolRegistry};
use crate::types::{
    PlanOrigin, QueryRequest, QueryResponse, RawEntry, RequiredSignal, SignalStatus, SourceStatus,
    SourceSummary, StepOutcome, ToolExecutionResult, ToolPlanStep,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use ulid::Ulid;

/// Answer for an empty question.
pub const GUIDANCE_ANSWER: &str =
    "Please describe the database problem you want diagnosed, e.g. \"why is the database slow?\"";

/// Answer when not even the default plan has a runnable tool.
pub const NO_TOOLS_ANSWER: &str = "No diagnostic tools are available to answer this request.";

/// Process-lifetime components shared by all queries. Read-only once built.
pub struct AgentRuntime {
    pub registry: ToolRegistry,
    pub planner: Planner,
    pub summarizer: Summarizer,
    pub signals: Vec<RequiredSignal>,
    pub default_timeout: Duration,
}

impl AgentRuntime {
    pub fn new(registry: ToolRegistry, chat: Arc<dyn ChatCompletion>, config: &AgentConfig) -> Self {
        Self {
            registry,
            planner: Planner::new(chat.clone(), config.inference.plan_max_tokens),
            summarizer: Summarizer::new(chat, config.inference.summary_max_tokens),
            signals: config.signals.clone(),
            default_timeout: config.default_query_timeout(),
        }
    }
}

type InitFuture = Pin<Box<dyn Future<Output = Result<AgentRuntime, InitError>> + Send>>;
type Initializer = Box<dyn Fn() -> InitFuture + Send + Sync>;

/// Lazily built, dependency-injected runtime.
pub struct AgentContext {
    init: Option<Initializer>,
    cell: OnceCell<Result<Arc<AgentRuntime>, InitError>>,
}

impl AgentContext {
    /// Context that runs `init` on first use. Concurrent first uses share one run.
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AgentRuntime, InitError>> + Send + 'static,
    {
        Self {
            init: Some(Box::new(move || -> InitFuture { Box::pin(init()) })),
            cell: OnceCell::new(),
        }
    }

    /// Context around an already built runtime.
    pub fn ready(runtime: AgentRuntime) -> Self {
        Self {
            init: None,
            cell: OnceCell::new_with(Some(Ok(Arc::new(runtime)))),
        }
    }

    /// Context that builds the MySQL catalog and the model client from `config`.
    pub fn from_config(config: AgentConfig) -> Self {
        let config = Arc::new(config);
        Self::new(move || {
            let config = Arc::clone(&config);
            async move { build_runtime(&config).await }
        })
    }

    /// The shared runtime, building it on first call.
    pub async fn runtime(&self) -> Result<Arc<AgentRuntime>, InitError> {
        self.cell
            .get_or_init(|| async {
                let result = match &self.init {
                    Some(init) => init().await.map(Arc::new),
                    None => Err(InitError::Tools("no runtime initializer configured".into())),
                };
                if let Err(e) = &result {
                    warn!("Agent initialization failed: {}", e);
                }
                result
            })
            .await
            .clone()
    }
}

async fn build_runtime(config: &AgentConfig) -> Result<AgentRuntime, InitError> {
    let client = InferenceClient::new(&config.inference)
        .map_err(|e| InitError::Inference(e.to_string()))?;
    info!("Inference client ready (model: {})", client.model());

    let pool = database::connect(&config.mysql)
        .await
        .map_err(|e| InitError::Tools(format!("database connection failed: {}", e)))?;
    let registry = mysql_registry(Arc::new(MysqlSource::new(pool)), &config.mysql);
    info!("Registered {} diagnostic tools", registry.len());

    Ok(AgentRuntime::new(registry, Arc::new(client), config))
}

/// Everything one query produced, for callers that want more than the response.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub response: QueryResponse,
    /// `None` when no plan ran (empty question or no tools).
    pub plan_origin: Option<PlanOrigin>,
    pub signals: Vec<SignalStatus>,
    /// Whether `answer` came from the model rather than the raw dump.
    pub summarized: bool,
}

impl QueryOutcome {
    fn answer_only(answer: &str) -> Self {
        Self {
            response: QueryResponse {
                answer: answer.to_string(),
                ..QueryResponse::default()
            },
            plan_origin: None,
            signals: Vec::new(),
            summarized: false,
        }
    }
}

/// The only component exposed across the remote boundary.
#[derive(Clone)]
pub struct DiagnosticService {
    context: Arc<AgentContext>,
}

impl DiagnosticService {
    pub fn new(context: Arc<AgentContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    /// Answer one question. Business failures are folded into the response;
    /// only a failed runtime initialization is returned as an error.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse, InitError> {
        self.run_query(request).await.map(|outcome| outcome.response)
    }

    pub async fn run_query(&self, request: QueryRequest) -> Result<QueryOutcome, InitError> {
        let span = info_span!("query", id = %Ulid::new());
        self.run_query_inner(request).instrument(span).await
    }

    async fn run_query_inner(&self, request: QueryRequest) -> Result<QueryOutcome, InitError> {
        let question = request.query.trim();
        if question.is_empty() {
            info!("Empty question, returning guidance");
            return Ok(QueryOutcome::answer_only(GUIDANCE_ANSWER));
        }

        let runtime = self.context.runtime().await?;
        let timeout = query_timeout(request.timeout_seconds, runtime.default_timeout);
        let deadline = Instant::now() + timeout;
        info!("Query received ({}s budget): {}", timeout.as_secs(), question);

        let catalog = runtime.registry.definitions();
        let (plan, origin) = resolve_plan(&runtime, question, request.tools, &catalog, deadline).await;
        if plan.is_empty() {
            warn!("No runnable tools for this query");
            return Ok(QueryOutcome::answer_only(NO_TOOLS_ANSWER));
        }
        info!(
            "Plan ({}): {}",
            origin,
            plan.iter().map(|s| s.tool.as_str()).collect::<Vec<_>>().join(", ")
        );

        let results = execute(&runtime.registry, &plan, deadline).await;
        let signals = derive_signal_statuses(&catalog, &results, &runtime.signals);

        let (answer, summarized) = match runtime
            .summarizer
            .summarize(question, &plan, &results, &signals, deadline)
            .await
        {
            Ok(text) => (text, true),
            Err(e) => {
                warn!("Summarization failed, returning raw data: {}", e);
                (raw_dump(&results, &e.to_string()), false)
            }
        };

        info!(
            "Query answered ({} steps, {} failed)",
            results.len(),
            results.iter().filter(|r| !r.outcome.is_success()).count()
        );
        Ok(QueryOutcome {
            response: assemble_response(answer, &results),
            plan_origin: Some(origin),
            signals,
            summarized,
        })
    }
}

/// The requested budget, capped at [`MAX_QUERY_TIMEOUT_SECS`]; zero or absent
/// means the configured default.
fn query_timeout(requested_secs: Option<u64>, default: Duration) -> Duration {
    requested_secs
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs.min(MAX_QUERY_TIMEOUT_SECS)))
        .unwrap_or(default)
}

/// Caller plan if it normalizes to something, else the model's plan, else the default.
async fn resolve_plan(
    runtime: &AgentRuntime,
    question: &str,
    caller_plan: Option<Vec<ToolPlanStep>>,
    catalog: &[ToolDefinition],
    deadline: Instant,
) -> (Vec<ToolPlanStep>, PlanOrigin) {
    if let Some(steps) = caller_plan {
        let steps = normalize_plan(steps);
        if !steps.is_empty() {
            return (steps, PlanOrigin::Caller);
        }
    }

    match runtime.planner.plan(question, catalog, deadline).await {
        Ok(steps) if !steps.is_empty() => return (steps, PlanOrigin::Model),
        Ok(_) => warn!("Planner returned no steps, using default plan"),
        Err(e) => warn!("Planning failed, using default plan: {}", e),
    }
    (default_plan(catalog), PlanOrigin::Default)
}

fn assemble_response(answer: String, results: &[ToolExecutionResult]) -> QueryResponse {
    let mut raw: BTreeMap<String, Vec<RawEntry>> = BTreeMap::new();
    let sources = results
        .iter()
        .map(|r| {
            raw.entry(r.step.tool.clone()).or_default().push(RawEntry {
                params: r.step.params.clone(),
                result: r.outcome.output().cloned(),
                error: r.outcome.error().map(str::to_string),
            });
            SourceSummary {
                tool: r.step.tool.clone(),
                description: r.description.clone(),
                status: match r.outcome {
                    StepOutcome::Success { .. } => SourceStatus::Success,
                    StepOutcome::Error { .. } => SourceStatus::Error,
                },
                params: r.step.params.clone(),
                error: r.outcome.error().map(str::to_string),
                duration_ms: r.duration_ms,
            }
        })
        .collect();

    QueryResponse {
        answer,
        sources,
        raw,
    }
}
