//! Built-in flows.
//!
//! Every model-backed flow is a [`PromptedFlow`]: a system prompt source, a
//! rule for building the user message, a model and an output policy. Only
//! `testFlow` skips the model entirely.

use std::collections::HashMap;

use async_trait::async_trait;
use flow_core::{
    post_process, template, FallbackRecord, Flow, FlowError, FlowRegistry, GenerationOptions,
    GenerationRequest, Message, OutputPolicy, RegistryError, ResponseFormat, Result, Shape,
};
use flow_llm::GenerationInvoker;
use flow_store::PromptResolver;
use serde_json::{json, Value};

use crate::logging::Timer;

pub const TEST_FLOW: &str = "testFlow";
pub const ARCHITECT_FLOW: &str = "architectFlow";
pub const CHARACTER_GENERATOR_FLOW: &str = "characterGeneratorFlow";
pub const RESEARCH_FLOW: &str = "researchFlow";
pub const SUMMARIZE_FLOW: &str = "summarizeFlow";

const CHARACTER_PROMPT: &str = "You are a character generator for a fantasy role-playing game. \
Given a short description, invent one character and reply with a single JSON object with \
exactly these fields: \"name\" (string), \"strength\" (integer from 1 to 20), \
\"intelligence\" (integer from 1 to 20) and \"description\" (string, two or three sentences). \
Reply with the JSON object only.";

const SUMMARIZE_PROMPT: &str = "Summarize the text you are given in a few sentences. \
Keep names, numbers and conclusions. Reply with the summary only.";

/// Shared dependencies handed to every flow at registration.
#[derive(Clone)]
pub struct FlowContext {
    pub invoker: GenerationInvoker,
    pub prompts: PromptResolver,
    pub default_model: String,
    pub secondary_model: String,
}

/// Where a flow's system prompt comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptSource {
    Static(String),
    /// Literal text with `{key}` placeholders filled from the input.
    Template(String),
    /// Document id in the prompt store, placeholders filled from the input.
    Stored { id: String },
}

/// How the user message is built from the flow input.
#[derive(Debug, Clone, PartialEq)]
pub enum UserMessage {
    /// The whole input: a string as is, anything else as JSON text.
    WholeInput,
    /// One string field of an object input.
    Field(String),
}

pub struct PromptedFlow {
    name: String,
    input_shape: Shape,
    output_shape: Shape,
    prompt: PromptSource,
    bindings: Vec<String>,
    user_message: UserMessage,
    model: String,
    options: GenerationOptions,
    policy: OutputPolicy,
    invoker: GenerationInvoker,
    prompts: PromptResolver,
}

impl PromptedFlow {
    pub fn new(name: impl Into<String>, context: &FlowContext) -> Self {
        Self {
            name: name.into(),
            input_shape: Shape::String,
            output_shape: Shape::String,
            prompt: PromptSource::Static(flow_store::DEFAULT_SYSTEM_PROMPT.to_string()),
            bindings: Vec::new(),
            user_message: UserMessage::WholeInput,
            model: context.default_model.clone(),
            options: GenerationOptions::default(),
            policy: OutputPolicy::Text,
            invoker: context.invoker.clone(),
            prompts: context.prompts.clone(),
        }
    }

    pub fn with_shapes(mut self, input: Shape, output: Shape) -> Self {
        self.input_shape = input;
        self.output_shape = output;
        self
    }

    pub fn with_prompt(mut self, prompt: PromptSource) -> Self {
        self.prompt = prompt;
        self
    }

    /// Input fields substituted into `{field}` placeholders of the prompt.
    pub fn with_bindings<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bindings = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_user_message(mut self, user_message: UserMessage) -> Self {
        self.user_message = user_message;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_policy(mut self, policy: OutputPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn bind(&self, input: &Value) -> HashMap<String, String> {
        self.bindings
            .iter()
            .filter_map(|field| {
                let value = match input.get(field)? {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                Some((field.clone(), value))
            })
            .collect()
    }

    async fn system_prompt(&self, bindings: &HashMap<String, String>) -> String {
        match &self.prompt {
            PromptSource::Static(text) => text.clone(),
            PromptSource::Template(text) => template::render(text, bindings),
            PromptSource::Stored { id } => self.prompts.resolve_with(id, bindings).await,
        }
    }

    fn user_text(&self, input: &Value) -> Result<String> {
        match &self.user_message {
            UserMessage::WholeInput => Ok(match input {
                Value::String(text) => text.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            }),
            UserMessage::Field(field) => input
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| FlowError::validation(format!("input.{field}"), "expected string")),
        }
    }
}

#[async_trait]
impl Flow for PromptedFlow {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shape(&self) -> Shape {
        self.input_shape.clone()
    }

    fn output_shape(&self) -> Shape {
        self.output_shape.clone()
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let bindings = self.bind(&input);
        let system = self.system_prompt(&bindings).await;
        let user = self.user_text(&input)?;

        let mut options = self.options.clone();
        if self.policy.expects_json() {
            options = options.with_response_format(ResponseFormat::Json);
        }
        let request = GenerationRequest::new(
            self.model.clone(),
            vec![Message::system(system), Message::user(user)],
        )
        .with_options(options);

        let timer = Timer::new(format!("{} generation", self.name));
        let result = self.invoker.invoke(request).await?;
        log::debug!(
            "Flow '{}' got {} chars from {} in {}ms",
            self.name,
            result.text.len(),
            result.model,
            timer.elapsed_ms()
        );

        post_process(&result.text, &self.policy, &self.output_shape)
    }
}

/// Connectivity check that never calls a model.
pub struct HelloFlow;

#[async_trait]
impl Flow for HelloFlow {
    fn name(&self) -> &str {
        TEST_FLOW
    }

    fn input_shape(&self) -> Shape {
        Shape::optional(Shape::String)
    }

    fn output_shape(&self) -> Shape {
        Shape::object([("message", Shape::String)])
    }

    async fn execute(&self, _input: Value) -> Result<Value> {
        log::info!("{} executed", TEST_FLOW);
        Ok(json!({ "message": "Hello World" }))
    }
}

pub fn architect_flow(context: &FlowContext) -> PromptedFlow {
    PromptedFlow::new(ARCHITECT_FLOW, context)
        .with_shapes(
            Shape::String,
            Shape::object([("title", Shape::String), ("steps", Shape::array(Shape::Any))]),
        )
        .with_prompt(PromptSource::Stored {
            id: "architect".to_string(),
        })
        .with_policy(OutputPolicy::strict_json())
}

pub fn character_fallback() -> FallbackRecord {
    FallbackRecord::new(
        json!({ "name": "Unknown", "strength": 10, "intelligence": 10 }),
        "description",
    )
}

pub fn character_generator_flow(context: &FlowContext) -> PromptedFlow {
    PromptedFlow::new(CHARACTER_GENERATOR_FLOW, context)
        .with_shapes(
            Shape::object([("description", Shape::String)]),
            Shape::object([
                ("name", Shape::String),
                ("strength", Shape::Number),
                ("intelligence", Shape::Number),
                ("description", Shape::String),
            ]),
        )
        .with_prompt(PromptSource::Static(CHARACTER_PROMPT.to_string()))
        .with_user_message(UserMessage::Field("description".to_string()))
        .with_options(GenerationOptions::default().with_temperature(0.9))
        .with_policy(OutputPolicy::lenient_json(character_fallback()))
}

pub fn research_flow(context: &FlowContext) -> PromptedFlow {
    PromptedFlow::new(RESEARCH_FLOW, context)
        .with_shapes(Shape::object([("topic", Shape::String)]), Shape::String)
        .with_prompt(PromptSource::Stored {
            id: "researcher".to_string(),
        })
        .with_bindings(["topic"])
        .with_user_message(UserMessage::Field("topic".to_string()))
        .with_options(GenerationOptions::default().with_search(true))
}

pub fn summarize_flow(context: &FlowContext) -> PromptedFlow {
    let model = context.secondary_model.clone();
    PromptedFlow::new(SUMMARIZE_FLOW, context)
        .with_shapes(Shape::object([("text", Shape::String)]), Shape::String)
        .with_prompt(PromptSource::Static(SUMMARIZE_PROMPT.to_string()))
        .with_user_message(UserMessage::Field("text".to_string()))
        .with_model(model)
}

pub fn builtin_registry(context: &FlowContext) -> std::result::Result<FlowRegistry, RegistryError> {
    let mut builder = FlowRegistry::builder();
    builder
        .register(HelloFlow)?
        .register(architect_flow(context))?
        .register(character_generator_flow(context))?
        .register(research_flow(context))?
        .register(summarize_flow(context))?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Role;
    use flow_llm::testing::MockProvider;
    use flow_llm::ProviderRouter;
    use flow_store::{InMemoryPromptStore, DEFAULT_SYSTEM_PROMPT};
    use std::sync::Arc;

    fn context(provider: Arc<MockProvider>, store: InMemoryPromptStore) -> FlowContext {
        FlowContext {
            invoker: GenerationInvoker::new(ProviderRouter::new().with_provider(provider)),
            prompts: PromptResolver::new(Arc::new(store)),
            default_model: "googleai/gemini-2.5-flash".to_string(),
            secondary_model: "openai/gpt-4o-mini".to_string(),
        }
    }

    #[test]
    fn registry_holds_all_builtin_flows() {
        let ctx = context(Arc::new(MockProvider::named("gemini")), InMemoryPromptStore::new());
        let registry = builtin_registry(&ctx).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                ARCHITECT_FLOW,
                CHARACTER_GENERATOR_FLOW,
                RESEARCH_FLOW,
                SUMMARIZE_FLOW,
                TEST_FLOW
            ]
        );
    }

    #[tokio::test]
    async fn architect_without_stored_prompt_uses_fallback() {
        let provider = Arc::new(MockProvider::replying(
            "gemini",
            r#"{"title":"Shed","steps":["foundation","walls"]}"#,
        ));
        let flow = architect_flow(&context(provider.clone(), InMemoryPromptStore::new()));

        let output = flow.execute(json!("build a shed")).await.unwrap();
        assert_eq!(output["title"], "Shed");

        let request = &provider.requests()[0];
        assert_eq!(request.model, "gemini-2.5-flash");
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(request.messages[1].content, "build a shed");
        assert!(request.options.wants_json());
    }

    #[tokio::test]
    async fn architect_rejects_non_json() {
        let provider = Arc::new(MockProvider::replying("gemini", "Sure! Step one: ..."));
        let flow = architect_flow(&context(provider, InMemoryPromptStore::new()));

        let err = flow.execute(json!("build a shed")).await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidModelOutput { raw, .. } if raw == "Sure! Step one: ..."));
    }

    #[tokio::test]
    async fn character_generator_falls_back_on_garbage() {
        let provider = Arc::new(MockProvider::replying("gemini", "not json at all"));
        let flow = character_generator_flow(&context(provider, InMemoryPromptStore::new()));

        let output = flow.execute(json!({ "description": "a brave knight" })).await.unwrap();
        assert_eq!(
            output,
            json!({
                "name": "Unknown",
                "strength": 10,
                "intelligence": 10,
                "description": "not json at all"
            })
        );
    }

    #[tokio::test]
    async fn character_generator_falls_back_on_off_shape_json() {
        for reply in ["\"Grim, a grumpy dwarf\"", "42", "{\"name\":\"Grim\"}"] {
            let provider = Arc::new(MockProvider::replying("gemini", reply));
            let registry = builtin_registry(&context(provider, InMemoryPromptStore::new())).unwrap();

            let output = registry
                .dispatch(CHARACTER_GENERATOR_FLOW, json!({ "description": "a grumpy dwarf" }))
                .await
                .unwrap();
            assert_eq!(output["name"], "Unknown", "reply {reply}");
            assert_eq!(output["strength"], 10);
            assert_eq!(output["description"], reply);
        }
    }

    #[tokio::test]
    async fn character_generator_accepts_fenced_json() {
        let provider = Arc::new(MockProvider::replying(
            "gemini",
            "```json\n{\"name\":\"Aria\",\"strength\":12,\"intelligence\":17,\"description\":\"A mage.\"}\n```",
        ));
        let flow = character_generator_flow(&context(provider.clone(), InMemoryPromptStore::new()));

        let output = flow.execute(json!({ "description": "a clever mage" })).await.unwrap();
        assert_eq!(output["name"], "Aria");
        assert_eq!(provider.requests()[0].messages[1].content, "a clever mage");
    }

    #[tokio::test]
    async fn research_binds_topic_and_enables_search() {
        let provider = Arc::new(MockProvider::replying("gemini", "Findings.").with_search(true));
        let store = InMemoryPromptStore::new()
            .with_prompt("researcher", "Research {topic} thoroughly. {topic} matters. {unknown}");
        let flow = research_flow(&context(provider.clone(), store));

        let output = flow.execute(json!({ "topic": "tides" })).await.unwrap();
        assert_eq!(output, json!("Findings."));

        let request = &provider.requests()[0];
        assert_eq!(
            request.messages[0].content,
            "Research tides thoroughly. tides matters. {unknown}"
        );
        assert!(request.options.search_enabled);
    }

    #[tokio::test]
    async fn summarize_without_secondary_provider_is_not_found_class() {
        let provider = Arc::new(MockProvider::replying("gemini", "unused"));
        let flow = summarize_flow(&context(provider.clone(), InMemoryPromptStore::new()));

        let err = flow.execute(json!({ "text": "long text" })).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn template_prompt_is_rendered_from_input() {
        let provider = Arc::new(MockProvider::replying("gemini", "ok"));
        let flow = PromptedFlow::new("greetFlow", &context(provider.clone(), InMemoryPromptStore::new()))
            .with_shapes(Shape::object([("name", Shape::String)]), Shape::String)
            .with_prompt(PromptSource::Template("Greet {name} warmly.".to_string()))
            .with_bindings(["name"])
            .with_user_message(UserMessage::Field("name".to_string()));

        flow.execute(json!({ "name": "Ada" })).await.unwrap();
        assert_eq!(provider.requests()[0].messages[0].content, "Greet Ada warmly.");
    }
}
