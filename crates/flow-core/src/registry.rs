use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::{FlowError, Result};
use crate::shape::Shape;

/// A named, independently invocable request handler.
#[async_trait]
pub trait Flow: Send + Sync {
    fn name(&self) -> &str;
    fn input_shape(&self) -> Shape;
    fn output_shape(&self) -> Shape;
    async fn execute(&self, input: Value) -> Result<Value>;

    fn describe(&self) -> FlowDescriptor {
        FlowDescriptor {
            name: self.name().to_string(),
            input_schema: self.input_shape().describe(),
            output_schema: self.output_shape().describe(),
        }
    }
}

pub type SharedFlow = Arc<dyn Flow>;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowDescriptor {
    pub name: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("flow with name '{0}' already registered")]
    DuplicateFlow(String),

    #[error("invalid flow: {0}")]
    InvalidFlow(String),
}

/// Collects flows at startup. [`FlowRegistryBuilder::build`] freezes the set.
#[derive(Default)]
pub struct FlowRegistryBuilder {
    flows: HashMap<String, SharedFlow>,
}

impl FlowRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, flow: F) -> std::result::Result<&mut Self, RegistryError>
    where
        F: Flow + 'static,
    {
        self.register_shared(Arc::new(flow))
    }

    pub fn register_shared(
        &mut self,
        flow: SharedFlow,
    ) -> std::result::Result<&mut Self, RegistryError> {
        let name = flow.name().trim();

        if name.is_empty() {
            return Err(RegistryError::InvalidFlow(
                "flow name cannot be empty".to_string(),
            ));
        }
        if name.contains('/') {
            return Err(RegistryError::InvalidFlow(format!(
                "flow name '{name}' cannot contain '/'"
            )));
        }
        if self.flows.contains_key(name) {
            return Err(RegistryError::DuplicateFlow(name.to_string()));
        }

        self.flows.insert(name.to_string(), flow);
        Ok(self)
    }

    pub fn build(self) -> FlowRegistry {
        FlowRegistry { flows: self.flows }
    }
}

/// Immutable name → flow mapping; the only place flows are discovered.
pub struct FlowRegistry {
    flows: HashMap<String, SharedFlow>,
}

impl FlowRegistry {
    pub fn builder() -> FlowRegistryBuilder {
        FlowRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<SharedFlow> {
        self.flows.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flows.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.flows.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptors(&self) -> Vec<FlowDescriptor> {
        let mut descriptors: Vec<FlowDescriptor> =
            self.flows.values().map(|flow| flow.describe()).collect();
        descriptors.sort_by(|left, right| left.name.cmp(&right.name));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Validate input, run the flow, validate its output.
    pub async fn dispatch(&self, name: &str, input: Value) -> Result<Value> {
        let flow = self
            .get(name)
            .ok_or_else(|| FlowError::FlowNotFound(name.to_string()))?;

        flow.input_shape().validate(&input, "input")?;

        log::debug!("Dispatching flow '{}'", name);
        let output = flow.execute(input).await?;

        flow.output_shape().validate(&output, "output")?;
        Ok(output)
    }
}
