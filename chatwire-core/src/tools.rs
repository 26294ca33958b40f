//! Callable tools handed to the backend.
//!
//! A tool is a name, a description, a JSON schema for its arguments and a
//! synchronous handler that turns arguments into a plain string. Handler
//! failures are reported as text; the orchestration layer never inspects them.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub type ToolHandler = Arc<dyn Fn(Value) -> String + Send + Sync>;

#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    handler: ToolHandler,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: impl Fn(Value) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(handler),
        }
    }

    /// Builds a tool whose parameter schema is derived from `P`.
    ///
    /// Arguments that do not deserialize into `P` produce an error string
    /// for the model instead of reaching the handler.
    pub fn typed<P, F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        P: JsonSchema + DeserializeOwned + 'static,
        F: Fn(P) -> String + Send + Sync + 'static,
    {
        let name = name.into();
        let parameters = serde_json::to_value(schemars::schema_for!(P))
            .unwrap_or_else(|_| serde_json::json!({ "type": "object" }));
        let tool_name = name.clone();
        Self::new(name, description, parameters, move |args: Value| {
            match serde_json::from_value::<P>(args) {
                Ok(params) => handler(params),
                Err(e) => format!("Invalid arguments for tool '{}': {}", tool_name, e),
            }
        })
    }

    pub fn invoke(&self, args: Value) -> String {
        (self.handler)(args)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of tools with unique names.
#[derive(Clone, Debug, Default)]
pub struct ToolSet {
    tools: Vec<Tool>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool, replacing any tool with the same name in place.
    pub fn insert(&mut self, tool: Tool) {
        match self.tools.iter_mut().find(|t| t.name == tool.name) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Tool> {
        let index = self.tools.iter().position(|t| t.name == name)?;
        Some(self.tools.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<Tool> for ToolSet {
    fn from_iter<I: IntoIterator<Item = Tool>>(iter: I) -> Self {
        let mut set = ToolSet::new();
        for tool in iter {
            set.insert(tool);
        }
        set
    }
}
