//! Drives one chat turn: stream the provider, run any in-band tool calls,
//! then stream a summary of their results from the default model.

use crate::domain::detector;
use crate::domain::error::{GatewayError, Result};
use crate::domain::executor::{CallOutcome, ToolExecutor};
use crate::domain::models::*;
use crate::domain::ports::{AdapterProvider, ConfigSource, ToolService};
use crate::domain::prompt;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Bound on each namespace's tool list fetch while building the tool context.
    pub tool_list_timeout: Duration,
    /// Pause after every forwarded event. Zero disables pacing.
    pub fragment_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            tool_list_timeout: Duration::from_secs(5),
            fragment_delay: Duration::ZERO,
        }
    }
}

pub struct ResponseOrchestrator {
    config: Arc<dyn ConfigSource>,
    adapters: Arc<dyn AdapterProvider>,
    tools: Arc<dyn ToolService>,
    executor: ToolExecutor,
    settings: OrchestratorSettings,
}

/// Sends events to the caller and remembers whether the caller is still there.
struct Emitter<'a> {
    tx: &'a Sender<TurnEvent>,
    delay: Duration,
    open: bool,
}

impl Emitter<'_> {
    async fn emit(&mut self, event: TurnEvent) -> bool {
        if !self.open {
            return false;
        }
        if self.tx.send(event).await.is_err() {
            debug!("caller went away, ending turn");
            self.open = false;
            return false;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        true
    }

    async fn narrate(&mut self, text: impl Into<String>) -> bool {
        self.emit(TurnEvent::Narration(text.into())).await
    }
}

impl ResponseOrchestrator {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        adapters: Arc<dyn AdapterProvider>,
        tools: Arc<dyn ToolService>,
    ) -> Self {
        Self {
            executor: ToolExecutor::new(tools.clone()),
            config,
            adapters,
            tools,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    fn resolve_model(&self, requested: Option<&str>) -> Result<ModelConfig> {
        let name = requested
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_model());
        self.config
            .model_config(&name)
            .ok_or(GatewayError::UnknownModel(name))
    }

    /// Non-streaming turn: tool context is added but in-band calls are not executed.
    pub async fn respond(&self, request: TurnRequest) -> Result<String> {
        let model = self.resolve_model(request.model.as_deref())?;
        let messages = self
            .with_tool_context(request.messages, &request.selected_mcp)
            .await;

        let adapter = self.adapters.adapter_for(&model);
        let text = adapter.chat(ChatRequest::new(&model, messages)).await?;
        Ok(text)
    }

    /// Streams one turn to `tx`.
    ///
    /// Fails before emitting anything when the model is unknown, and fails when the
    /// first provider stream breaks. Tool and summary failures are reported as
    /// events instead. If the caller drops its receiver the turn stops at the
    /// next emission; a tool call already in flight runs to completion.
    pub async fn stream_turn(
        &self,
        request: TurnRequest,
        tx: Sender<TurnEvent>,
    ) -> Result<TurnSummary> {
        let model = self.resolve_model(request.model.as_deref())?;
        let namespaces = request.selected_mcp;
        let messages = self.with_tool_context(request.messages, &namespaces).await;

        let mut emitter = Emitter {
            tx: &tx,
            delay: self.settings.fragment_delay,
            open: true,
        };
        let mut summary = TurnSummary {
            model: model.name.clone(),
            ..Default::default()
        };

        info!(model = %model.name, provider = %model.provider, namespaces = namespaces.len(), "starting turn");
        let adapter = self.adapters.adapter_for(&model);
        let mut fragments = adapter.stream(ChatRequest::new(&model, messages)).await?;
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            summary.response.push_str(&fragment);
            if !emitter.emit(TurnEvent::Delta(fragment)).await {
                summary.cancelled = true;
                return Ok(summary);
            }
        }
        drop(fragments);

        if namespaces.is_empty() || !detector::is_present(&summary.response) {
            return Ok(summary);
        }

        let blocks: Vec<String> = detector::detect(&summary.response)
            .into_iter()
            .map(str::to_string)
            .collect();
        if blocks.is_empty() {
            return Ok(summary);
        }

        if !self.execute_blocks(&blocks, &namespaces, &mut emitter, &mut summary).await {
            summary.cancelled = true;
            return Ok(summary);
        }

        if !summary.tool_results.is_empty() && !self.summarize(&mut emitter, &mut summary).await {
            summary.cancelled = true;
        }

        Ok(summary)
    }

    /// Runs every call in every block. Returns false if the caller went away.
    async fn execute_blocks(
        &self,
        blocks: &[String],
        namespaces: &[String],
        emitter: &mut Emitter<'_>,
        summary: &mut TurnSummary,
    ) -> bool {
        if !emitter
            .narrate("\n\n---\n\n🔧 **Running MCP tool calls...**\n\n")
            .await
        {
            return false;
        }

        for block in blocks {
            let calls = match detector::parse_block(block) {
                Ok(calls) => calls,
                Err(e) => {
                    warn!(error = %e, "skipping malformed tool call block");
                    if !emitter.narrate(format!("❌ **JSON parse error**: {}\n\n", e)).await {
                        return false;
                    }
                    continue;
                }
            };

            for call in calls {
                let params = Value::Object(call.parameters.clone());
                let pretty = serde_json::to_string_pretty(&params).unwrap_or_else(|_| params.to_string());
                let announced = emitter
                    .narrate(format!(
                        "📞 **Calling tool**: `{}`\n📋 **Parameters**:\n```json\n{}\n```\n\n",
                        call.name, pretty
                    ))
                    .await;
                if !announced {
                    return false;
                }

                let still_open = match self.executor.resolve_and_call(&call, namespaces).await {
                    CallOutcome::Executed { namespace, result } => {
                        info!(tool = %call.name, namespace = %namespace, "tool call succeeded");
                        let record = ToolCallResult {
                            function_name: call.name.clone(),
                            parameters: call.parameters,
                            result,
                        };
                        summary.tool_results.push(record.clone());
                        emitter.narrate("✅ **Succeeded**\n\n").await
                            && emitter.emit(TurnEvent::ToolResult(record)).await
                    }
                    CallOutcome::NotFound => {
                        emitter
                            .narrate(format!(
                                "❌ **Failed**: no enabled MCP namespace provides `{}`\n\n",
                                call.name
                            ))
                            .await
                    }
                    CallOutcome::Failed(e) => {
                        emitter.narrate(format!("❌ **Execution error**: {}\n\n", e)).await
                    }
                };
                if !still_open {
                    return false;
                }
            }
        }

        true
    }

    /// Streams the default model's explanation of the collected results.
    async fn summarize(&self, emitter: &mut Emitter<'_>, summary: &mut TurnSummary) -> bool {
        if !emitter.narrate("\n\n---\n\n🤖 **Analyzing results...**\n\n").await {
            return false;
        }

        let default_model = self.config.default_model();
        let Some(model) = self.config.model_config(&default_model) else {
            warn!(model = %default_model, "default model is not configured, skipping summary");
            return emitter
                .emit(TurnEvent::Warning(format!(
                    "Cannot analyze results: default model `{}` is not configured",
                    default_model
                )))
                .await;
        };

        let adapter = self.adapters.adapter_for(&model);
        let request = ChatRequest::new(&model, prompt::analysis_messages(&summary.tool_results));
        let mut fragments = match adapter.stream(request).await {
            Ok(fragments) => fragments,
            Err(e) => return self.summary_failed(emitter, e.to_string()).await,
        };

        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    if !emitter.emit(TurnEvent::Delta(text)).await {
                        return false;
                    }
                }
                Err(e) => return self.summary_failed(emitter, e.to_string()).await,
            }
        }

        summary.summarized = true;
        true
    }

    async fn summary_failed(&self, emitter: &mut Emitter<'_>, error: String) -> bool {
        warn!(error = %error, "result analysis failed");
        emitter
            .emit(TurnEvent::Warning(format!(
                "An error occurred while analyzing results: {}",
                error
            )))
            .await
    }

    /// Adds the tool context for `namespaces` to the conversation.
    async fn with_tool_context(&self, messages: Vec<Message>, namespaces: &[String]) -> Vec<Message> {
        if namespaces.is_empty() {
            return messages;
        }

        let mut context = prompt::tool_context_header();
        for id in namespaces {
            let Some(namespace) = self.config.namespace_config(id) else {
                warn!(namespace = %id, "ignoring unknown MCP namespace");
                continue;
            };
            context.push_str(&prompt::describe_namespace(&namespace));

            let listing =
                tokio::time::timeout(self.settings.tool_list_timeout, self.tools.list_tools(id)).await;
            match listing {
                Ok(Ok(tools)) if !tools.is_empty() => {
                    for tool in &tools {
                        context.push_str(&prompt::describe_tool(tool));
                    }
                }
                Ok(Ok(_)) => {
                    context.push_str(prompt::TOOLS_LOADING_NOTICE);
                    context.push_str("\n\n");
                }
                Ok(Err(e)) => {
                    warn!(namespace = %id, error = %e, "tool list unavailable");
                    context.push_str(prompt::TOOLS_LOADING_NOTICE);
                    context.push_str("\n\n");
                }
                Err(_) => {
                    warn!(namespace = %id, timeout = ?self.settings.tool_list_timeout, "tool list timed out");
                    context.push_str("Loading tools timed out. ");
                    context.push_str(prompt::TOOLS_LOADING_NOTICE);
                    context.push_str("\n\n");
                }
            }
        }
        context.push_str(prompt::tool_context_footer());

        prompt::attach_system_context(messages, &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ProviderError;
    use crate::domain::ports::{FragmentStream, ModelAdapter};
    use crate::mcp::McpError;
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct ScriptedAdapter {
        replies: Mutex<Vec<Vec<String>>>,
        seen: Arc<Mutex<Vec<(String, Vec<Message>)>>>,
    }

    #[async_trait]
    impl ModelAdapter for ScriptedAdapter {
        async fn chat(&self, req: ChatRequest) -> std::result::Result<String, ProviderError> {
            self.seen.lock().unwrap().push((req.model_id.clone(), req.messages.clone()));
            Ok("complete".to_string())
        }

        async fn stream(&self, req: ChatRequest) -> std::result::Result<FragmentStream, ProviderError> {
            self.seen.lock().unwrap().push((req.model_id.clone(), req.messages.clone()));
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ProviderError::Stream {
                    provider: ProviderKind::OpenAi,
                    message: "no scripted reply".to_string(),
                });
            }
            // A fragment written as "!err <message>" fails the stream at that point.
            let fragments: Vec<std::result::Result<String, ProviderError>> = replies
                .remove(0)
                .into_iter()
                .map(|fragment| match fragment.strip_prefix("!err ") {
                    Some(message) => Err(ProviderError::Stream {
                        provider: ProviderKind::OpenAi,
                        message: message.to_string(),
                    }),
                    None => Ok(fragment),
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(fragments)))
        }
    }

    struct SharedAdapters(Arc<ScriptedAdapter>);

    impl AdapterProvider for SharedAdapters {
        fn adapter_for(&self, _config: &ModelConfig) -> Arc<dyn ModelAdapter> {
            self.0.clone()
        }
    }

    struct StaticConfig {
        models: Vec<ModelConfig>,
        default: String,
        namespaces: Vec<ToolNamespace>,
    }

    impl ConfigSource for StaticConfig {
        fn model_config(&self, name: &str) -> Option<ModelConfig> {
            self.models.iter().find(|m| m.name == name).cloned()
        }
        fn default_model(&self) -> String {
            self.default.clone()
        }
        fn namespace_config(&self, id: &str) -> Option<ToolNamespace> {
            self.namespaces.iter().find(|n| n.id == id).cloned()
        }
    }

    #[derive(Default)]
    struct FakeTools {
        tools: HashMap<String, Vec<ToolDescriptor>>,
        results: HashMap<String, Value>,
        list_delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolService for FakeTools {
        async fn list_tools(&self, namespace: &str) -> std::result::Result<Vec<ToolDescriptor>, McpError> {
            if let Some(delay) = self.list_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.tools.get(namespace).cloned().unwrap_or_default())
        }

        async fn call_tool(
            &self,
            _namespace: &str,
            name: &str,
            _parameters: Map<String, Value>,
        ) -> std::result::Result<Value, McpError> {
            self.calls.lock().unwrap().push(name.to_string());
            self.results
                .get(name)
                .cloned()
                .ok_or_else(|| McpError::Protocol(format!("{} exploded", name)))
        }
    }

    fn model(name: &str, model_id: &str) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            provider: ProviderKind::OpenAi,
            api_key: Some("k".to_string()),
            api_base: None,
            model_id: model_id.to_string(),
            max_tokens: 256,
            temperature: 0.2,
        }
    }

    fn namespace(id: &str) -> ToolNamespace {
        ToolNamespace {
            label: format!("{} label", id),
            id: id.to_string(),
            description: Some("test tools".to_string()),
            enabled: true,
            endpoint: Some("http://localhost:9/mcp".to_string()),
        }
    }

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{} tool", name),
            parameters: json!({"properties": {"q": {"type": "string"}}, "required": ["q"]}),
        }
    }

    struct Harness {
        orchestrator: ResponseOrchestrator,
        seen: Arc<Mutex<Vec<(String, Vec<Message>)>>>,
        tools: Arc<FakeTools>,
    }

    fn harness(replies: Vec<Vec<&str>>, tools: FakeTools) -> Harness {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let adapter = Arc::new(ScriptedAdapter {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.into_iter().map(str::to_string).collect())
                    .collect(),
            ),
            seen: seen.clone(),
        });
        let config = Arc::new(StaticConfig {
            models: vec![model("main", "main-id"), model("summary", "summary-id")],
            default: "summary".to_string(),
            namespaces: vec![namespace("ns1"), namespace("ns2")],
        });
        let tools = Arc::new(tools);
        let orchestrator =
            ResponseOrchestrator::new(config, Arc::new(SharedAdapters(adapter)), tools.clone());
        Harness {
            orchestrator,
            seen,
            tools,
        }
    }

    async fn run(
        harness: &Harness,
        request: TurnRequest,
    ) -> (Result<TurnSummary>, Vec<TurnEvent>) {
        let (tx, mut rx) = mpsc::channel(256);
        let result = harness.orchestrator.stream_turn(request, tx).await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (result, events)
    }

    fn request(text: &str, model: Option<&str>, namespaces: &[&str]) -> TurnRequest {
        TurnRequest {
            messages: vec![Message::user(text)],
            model: model.map(str::to_string),
            selected_mcp: namespaces.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_unknown_model_fails_before_output() {
        let h = harness(vec![vec!["never"]], FakeTools::default());
        let (result, events) = run(&h, request("hi", Some("missing"), &[])).await;
        assert!(matches!(result, Err(GatewayError::UnknownModel(ref m)) if m == "missing"));
        assert!(events.is_empty());
        assert!(h.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plain_turn_without_namespaces_only_streams() {
        let h = harness(
            vec![vec!["Sure, ", "<|FunctionCallBegin|>{broken", "<|FunctionCallEnd|>"]],
            FakeTools::default(),
        );
        let (result, events) = run(&h, request("list tools", None, &[])).await;
        let summary = result.unwrap();

        assert!(events.iter().all(|e| matches!(e, TurnEvent::Delta(_))));
        assert_eq!(events.len(), 3);
        assert!(summary.tool_results.is_empty());
        assert!(!summary.summarized);

        let seen = h.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        // No tool context was added: the user message is sent as-is.
        assert_eq!(seen[0].1, vec![Message::user("list tools")]);
    }

    #[tokio::test]
    async fn test_tool_call_is_executed_and_summarized() {
        let mut tools = FakeTools::default();
        tools.tools.insert("ns1".to_string(), vec![tool("lookup")]);
        tools.results.insert("lookup".to_string(), json!({"v": 1}));
        let h = harness(
            vec![
                vec![
                    "Let me check.",
                    "<|FunctionCallBegin|>[{\"name\":\"lookup\",",
                    "\"parameters\":{\"q\":\"x\"}}]<|FunctionCallEnd|>",
                ],
                vec!["The value ", "is 1."],
            ],
            tools,
        );

        let (result, events) = run(&h, request("what is v?", Some("main"), &["ns1"])).await;
        let summary = result.unwrap();

        assert_eq!(summary.model, "main");
        assert_eq!(summary.tool_results.len(), 1);
        let record = &summary.tool_results[0];
        assert_eq!(record.function_name, "lookup");
        assert_eq!(Value::Object(record.parameters.clone()), json!({"q": "x"}));
        assert_eq!(record.result, json!({"v": 1}));
        assert!(summary.summarized);

        let narration: String = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Narration(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert!(narration.contains("`lookup`"));
        assert!(narration.contains("Succeeded"));
        assert!(events.contains(&TurnEvent::ToolResult(record.clone())));
        assert_eq!(events.last(), Some(&TurnEvent::Delta("is 1.".to_string())));

        let seen = h.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "main-id");
        assert_eq!(seen[0].1[0].role, Role::System);
        assert!(seen[0].1[0].content.contains("### lookup"));
        // The summary always goes to the default model.
        assert_eq!(seen[1].0, "summary-id");
        let prompt = &seen[1].1[1].content;
        assert!(prompt.contains("lookup"));
        assert!(prompt.contains("{\"q\":\"x\"}"));
        assert!(prompt.contains("{\"v\":1}"));
    }

    #[tokio::test]
    async fn test_failed_and_missing_calls_are_narrated_not_recorded() {
        let mut tools = FakeTools::default();
        tools.tools.insert("ns1".to_string(), vec![tool("explode")]);
        let h = harness(
            vec![vec![
                "<|FunctionCallBegin|>[{\"name\":\"explode\",\"parameters\":{}},",
                "{\"name\":\"ghost\",\"parameters\":{}}]<|FunctionCallEnd|>",
            ]],
            tools,
        );

        let (result, events) = run(&h, request("go", None, &["ns1"])).await;
        let summary = result.unwrap();

        assert!(summary.tool_results.is_empty());
        assert!(!summary.summarized);
        let text: String = events.iter().map(TurnEvent::as_text).collect();
        assert!(text.contains("explode exploded"));
        assert!(text.contains("no enabled MCP namespace provides `ghost`"));
        // Only the first stream ran.
        assert_eq!(h.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_block_does_not_stop_other_blocks() {
        let mut tools = FakeTools::default();
        tools.tools.insert("ns2".to_string(), vec![tool("lookup")]);
        tools.results.insert("lookup".to_string(), json!("plain"));
        let h = harness(
            vec![
                vec![
                    "<|FunctionCallBegin|>[{oops]<|FunctionCallEnd|>",
                    "<|FunctionCallBegin|>{\"name\":\"lookup\",\"parameters\":{\"q\":\"y\"}}<|FunctionCallEnd|>",
                ],
                vec!["summary"],
            ],
            tools,
        );

        let (result, events) = run(&h, request("go", None, &["ns1", "ns2"])).await;
        let summary = result.unwrap();

        assert_eq!(summary.tool_results.len(), 1);
        assert_eq!(summary.tool_results[0].result, json!("plain"));
        let text: String = events.iter().map(TurnEvent::as_text).collect();
        assert!(text.contains("JSON parse error"));
        assert_eq!(*h.tools.calls.lock().unwrap(), vec!["lookup"]);
    }

    #[tokio::test]
    async fn test_summary_failure_becomes_warning() {
        let mut tools = FakeTools::default();
        tools.tools.insert("ns1".to_string(), vec![tool("lookup")]);
        tools.results.insert("lookup".to_string(), json!(1));
        // Only one scripted reply: the summary stream fails to start.
        let h = harness(
            vec![vec!["<|FunctionCallBegin|>{\"name\":\"lookup\"}<|FunctionCallEnd|>"]],
            tools,
        );

        let (result, events) = run(&h, request("go", None, &["ns1"])).await;
        let summary = result.unwrap();

        assert_eq!(summary.tool_results.len(), 1);
        assert!(!summary.summarized);
        assert!(matches!(events.last(), Some(TurnEvent::Warning(w)) if w.contains("no scripted reply")));
    }

    #[tokio::test]
    async fn test_summary_stream_breaking_midway_becomes_warning() {
        let mut tools = FakeTools::default();
        tools.tools.insert("ns1".to_string(), vec![tool("lookup")]);
        tools.results.insert("lookup".to_string(), json!(1));
        let h = harness(
            vec![
                vec!["<|FunctionCallBegin|>{\"name\":\"lookup\"}<|FunctionCallEnd|>"],
                vec!["The value", "!err connection reset", "never sent"],
            ],
            tools,
        );

        let (result, events) = run(&h, request("go", None, &["ns1"])).await;
        let summary = result.unwrap();

        assert_eq!(summary.tool_results.len(), 1);
        assert!(!summary.summarized);
        assert!(!summary.cancelled);
        let n = events.len();
        assert_eq!(events[n - 2], TurnEvent::Delta("The value".to_string()));
        assert!(matches!(&events[n - 1], TurnEvent::Warning(w) if w.contains("connection reset")));
        assert!(!events.contains(&TurnEvent::Delta("never sent".to_string())));
    }

    #[tokio::test]
    async fn test_first_stream_breaking_is_a_provider_error() {
        let h = harness(vec![vec!["partial", "!err upstream closed"]], FakeTools::default());
        let (result, events) = run(&h, request("hi", None, &[])).await;

        assert!(matches!(result, Err(GatewayError::Provider(ProviderError::Stream { .. }))));
        assert_eq!(events, vec![TurnEvent::Delta("partial".to_string())]);
    }

    #[tokio::test]
    async fn test_fragment_delay_paces_events() {
        let h = harness(vec![vec!["a", "b", "c"]], FakeTools::default());
        let orchestrator = h.orchestrator.with_settings(OrchestratorSettings {
            tool_list_timeout: Duration::from_secs(5),
            fragment_delay: Duration::from_millis(40),
        });

        let (tx, mut rx) = mpsc::channel(16);
        let started = std::time::Instant::now();
        let summary = orchestrator.stream_turn(request("hi", None, &[]), tx).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(120));
        assert_eq!(summary.response, "abc");
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_slow_tool_listing_degrades_to_notice() {
        let mut tools = FakeTools::default();
        tools.tools.insert("ns1".to_string(), vec![tool("lookup")]);
        tools.list_delay = Some(Duration::from_millis(200));
        let h = harness(vec![vec!["hello"]], tools);
        let orchestrator = h.orchestrator.with_settings(OrchestratorSettings {
            tool_list_timeout: Duration::from_millis(20),
            fragment_delay: Duration::ZERO,
        });

        let (tx, mut rx) = mpsc::channel(16);
        let summary = orchestrator
            .stream_turn(
                TurnRequest {
                    messages: vec![Message::system("Be brief."), Message::user("hi")],
                    model: None,
                    selected_mcp: vec!["ns1".to_string()],
                },
                tx,
            )
            .await
            .unwrap();

        assert_eq!(summary.response, "hello");
        assert_eq!(rx.recv().await, Some(TurnEvent::Delta("hello".to_string())));
        let seen = h.seen.lock().unwrap();
        let system = &seen[0].1[0];
        assert!(system.content.starts_with("Be brief.\n\n"));
        assert!(system.content.contains("timed out"));
        assert!(system.content.contains(prompt::TOOLS_LOADING_NOTICE));
        assert!(!system.content.contains("### lookup"));
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_turn() {
        let mut tools = FakeTools::default();
        tools.tools.insert("ns1".to_string(), vec![tool("lookup")]);
        tools.results.insert("lookup".to_string(), json!(1));
        let h = harness(
            vec![vec!["a", "<|FunctionCallBegin|>{\"name\":\"lookup\"}<|FunctionCallEnd|>"]],
            tools,
        );

        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let summary = h
            .orchestrator
            .stream_turn(request("go", None, &["ns1"]), tx)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert!(h.tools.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_respond_uses_complete_with_tool_context() {
        let mut tools = FakeTools::default();
        tools.tools.insert("ns1".to_string(), vec![tool("lookup")]);
        let h = harness(vec![], tools);

        let text = h
            .orchestrator
            .respond(request("hi", Some("main"), &["ns1", "unknown"]))
            .await
            .unwrap();

        assert_eq!(text, "complete");
        let seen = h.seen.lock().unwrap();
        assert_eq!(seen[0].1.len(), 2);
        assert!(seen[0].1[0].content.contains("## ns1 label (ns1)"));
        assert!(!seen[0].1[0].content.contains("unknown"));
    }
}
