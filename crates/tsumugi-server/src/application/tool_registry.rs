//! Tool Registry
//!
//! Server tools are registered once at startup and executed inside this
//! process. Client tools arrive with each request, are compiled into a JSON
//! schema once, and are only ever forwarded back to the caller.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use tsumugi::ToolSchema;

use super::errors::{ToolExecutionError, ToolSchemaError};

/// Who is asking a server tool to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub user_id: String,
    pub thread_id: Option<String>,
}

/// A tool executed by the server, invisible to the client
#[async_trait]
pub trait ServerTool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    /// Guidance lines appended to the system turn
    fn instructions(&self) -> Vec<String> {
        Vec::new()
    }

    async fn execute(
        &self,
        arguments: &Value,
        context: &ToolContext,
    ) -> Result<Value, ToolExecutionError>;
}

/// Argument declaration in the compact client form: `{type, description?}`
#[derive(Debug, Clone, PartialEq)]
pub struct ClientArgSpec {
    pub type_name: String,
    pub description: Option<String>,
}

/// A tool as declared by the caller of a chat turn
#[derive(Debug, Clone, PartialEq)]
pub struct ClientToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub args: BTreeMap<String, ClientArgSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgType {
    String,
    Number,
    Integer,
    Boolean,
}

impl ArgType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ArgType::String),
            "number" => Some(ArgType::Number),
            "integer" => Some(ArgType::Integer),
            "boolean" => Some(ArgType::Boolean),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Number => "number",
            ArgType::Integer => "integer",
            ArgType::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ArgType::String => value.is_string(),
            ArgType::Number => value.is_number(),
            ArgType::Integer => value.is_i64() || value.is_u64(),
            ArgType::Boolean => value.is_boolean(),
        }
    }
}

/// A client tool compiled into a schema and an argument validator
#[derive(Debug, Clone)]
pub struct ClientToolDeclaration {
    fields: Vec<(String, ArgType)>,
    schema: ToolSchema,
}

impl ClientToolDeclaration {
    /// Compile the compact declaration. Every field is required.
    pub fn compile(spec: &ClientToolSpec) -> Result<Self, ToolSchemaError> {
        let name = spec.name.trim();
        if name.is_empty() {
            return Err(ToolSchemaError::EmptyName);
        }

        let mut fields = Vec::with_capacity(spec.args.len());
        let mut properties = Map::new();
        for (field, arg) in &spec.args {
            let arg_type =
                ArgType::parse(&arg.type_name).ok_or_else(|| ToolSchemaError::UnsupportedType {
                    tool: name.to_string(),
                    field: field.clone(),
                    type_name: arg.type_name.clone(),
                })?;

            let mut property = json!({ "type": arg_type.as_str() });
            if let Some(description) = &arg.description {
                property["description"] = json!(description);
            }
            properties.insert(field.clone(), property);
            fields.push((field.clone(), arg_type));
        }

        let required: Vec<&str> = fields.iter().map(|(f, _)| f.as_str()).collect();

        Ok(Self {
            schema: ToolSchema {
                name: name.to_string(),
                description: spec.description.clone().unwrap_or_default(),
                parameters: json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false,
                }),
            },
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    /// Check model-produced arguments against the declaration
    pub fn validate(&self, arguments: &Value) -> Result<(), ToolExecutionError> {
        let invalid = |message: String| ToolExecutionError::InvalidArguments {
            tool: self.schema.name.clone(),
            message,
        };

        let object = arguments
            .as_object()
            .ok_or_else(|| invalid("arguments must be an object".to_string()))?;

        for (field, arg_type) in &self.fields {
            match object.get(field) {
                None => return Err(invalid(format!("missing '{}'", field))),
                Some(value) if !arg_type.accepts(value) => {
                    return Err(invalid(format!(
                        "'{}' must be a {}",
                        field,
                        arg_type.as_str()
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// A tool offered to the model for one turn
#[derive(Clone)]
pub enum ToolDeclaration {
    Server(Arc<dyn ServerTool>),
    Client(ClientToolDeclaration),
}

impl ToolDeclaration {
    pub fn schema(&self) -> ToolSchema {
        match self {
            ToolDeclaration::Server(tool) => tool.schema(),
            ToolDeclaration::Client(decl) => decl.schema().clone(),
        }
    }
}

/// Server and client tools available to one turn
#[derive(Clone, Default)]
pub struct ResolvedTools {
    declarations: Vec<ToolDeclaration>,
}

impl ResolvedTools {
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.declarations.iter().map(ToolDeclaration::schema).collect()
    }

    /// Guidance from every server tool, in registration order
    pub fn instructions(&self) -> Vec<String> {
        self.declarations
            .iter()
            .filter_map(|d| match d {
                ToolDeclaration::Server(tool) => Some(tool.instructions()),
                ToolDeclaration::Client(_) => None,
            })
            .flatten()
            .collect()
    }

    pub fn server_tool(&self, name: &str) -> Option<&Arc<dyn ServerTool>> {
        self.declarations.iter().find_map(|d| match d {
            ToolDeclaration::Server(tool) if tool.schema().name == name => Some(tool),
            _ => None,
        })
    }

    pub fn client_tool(&self, name: &str) -> Option<&ClientToolDeclaration> {
        self.declarations.iter().find_map(|d| match d {
            ToolDeclaration::Client(decl) if decl.name() == name => Some(decl),
            _ => None,
        })
    }
}

/// Server tools available to every turn
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ServerTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server tool under its schema name
    pub fn register(&mut self, tool: Arc<dyn ServerTool>) -> Result<(), ToolSchemaError> {
        let name = tool.schema().name;
        if name.trim().is_empty() {
            return Err(ToolSchemaError::EmptyName);
        }
        if self.is_server_tool(&name) {
            return Err(ToolSchemaError::DuplicateName(name));
        }

        tracing::debug!("Registered server tool: {}", name);
        self.tools.push(tool);
        Ok(())
    }

    pub fn is_server_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.schema().name == name)
    }

    pub fn get_schema(&self, name: &str) -> Option<ToolSchema> {
        self.tools
            .iter()
            .map(|t| t.schema())
            .find(|schema| schema.name == name)
    }

    /// Merge server tools with the caller's declarations for one turn
    pub fn resolve(&self, client_tools: &[ClientToolSpec]) -> Result<ResolvedTools, ToolSchemaError> {
        let mut declarations: Vec<ToolDeclaration> = self
            .tools
            .iter()
            .cloned()
            .map(ToolDeclaration::Server)
            .collect();

        let mut seen = HashSet::new();
        for spec in client_tools {
            let decl = ClientToolDeclaration::compile(spec)?;
            if self.is_server_tool(decl.name()) {
                return Err(ToolSchemaError::Conflict(decl.name().to_string()));
            }
            if !seen.insert(decl.name().to_string()) {
                return Err(ToolSchemaError::DuplicateName(decl.name().to_string()));
            }
            declarations.push(ToolDeclaration::Client(decl));
        }

        Ok(ResolvedTools { declarations })
    }
}
