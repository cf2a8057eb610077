//! Translation of the peer's tool catalogue into the model's function-calling
//! convention.
//!
//! Descriptors are never dropped. Missing fields get these defaults:
//! - description: empty string
//! - input schema: an object schema without properties ([`empty_object_schema`])

use crate::model::ModelToolSpec;
use crate::tooling::ToolDescriptor;
use serde_json::{Value, json};

pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Map descriptors to model tool specs, preserving order.
pub fn adapt(descriptors: &[ToolDescriptor]) -> Vec<ModelToolSpec> {
    descriptors.iter().map(adapt_one).collect()
}

fn adapt_one(descriptor: &ToolDescriptor) -> ModelToolSpec {
    let parameters = match &descriptor.input_schema {
        Some(Value::Null) | None => empty_object_schema(),
        Some(schema) => schema.clone(),
    };
    ModelToolSpec::function(
        descriptor.name.clone(),
        descriptor.description.clone().unwrap_or_default(),
        parameters,
    )
}
