//! Reusable assembly instructions stored server-side.

use serde_json::{Map, Value};
use tl_models::{Response, Steps};
use tracing::info;

use crate::client::Transloadit;
use crate::error::TransloaditResult;
use crate::request::Request;

/// A template under construction.
#[derive(Debug, Clone)]
pub struct Template {
    client: Transloadit,
    name: String,
    steps: Steps,
    options: Map<String, Value>,
}

impl Template {
    pub fn new(client: Transloadit, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            steps: Steps::new(),
            options: Map::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn add_step(&mut self, name: impl Into<String>, robot: impl Into<String>, options: Map<String, Value>) {
        self.steps.add(name, robot, options);
    }

    pub fn remove_step(&mut self, name: &str) {
        self.steps.remove(name);
    }

    pub fn steps(&self) -> &Steps {
        &self.steps
    }

    pub fn add_option(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(key.into(), value.into());
    }

    /// Body posted to `/templates`: `{name, template: {...options, steps}}`.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut template = self.options.clone();
        template.insert("steps".to_string(), Value::Object(self.steps.to_map()));

        let mut data = Map::new();
        data.insert("name".to_string(), Value::String(self.name.clone()));
        data.insert("template".to_string(), Value::Object(template));
        data
    }

    /// Create the template.
    pub async fn save(&self) -> TransloaditResult<Response> {
        info!(name = %self.name, steps = self.steps.len(), "Saving template");
        Request::new(&self.client)
            .post("/templates", &self.to_payload(), &[], &[])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_nests_steps_under_template() {
        let client = Transloadit::new("key", "secret");
        let mut template = client.new_template("thumbs");

        let mut options = Map::new();
        options.insert("width".to_string(), json!(75));
        template.add_step("resize", "/image/resize", options);
        template.add_option("allow_steps_override", false);

        assert_eq!(
            Value::Object(template.to_payload()),
            json!({
                "name": "thumbs",
                "template": {
                    "allow_steps_override": false,
                    "steps": {"resize": {"robot": "/image/resize", "width": 75}}
                }
            })
        );
    }
}
