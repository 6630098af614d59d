use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    error::{QuizgenError, Result},
    transport::CompletionRequest,
};

/// Wire dialect spoken by the generation endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Ollama,
    OpenaiCompatible,
}

pub struct ProviderConfig {
    pub generate_path: &'static str,
    pub health_path: &'static str,
    pub models_path: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Ollama => ProviderConfig {
                generate_path: "/api/generate",
                health_path: "/api/version",
                models_path: "/api/tags",
            },
            Provider::OpenaiCompatible => ProviderConfig {
                generate_path: "/v1/chat/completions",
                health_path: "/v1/models",
                models_path: "/v1/models",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Ollama => "Ollama",
            Provider::OpenaiCompatible => "OpenAI-compatible",
        }
    }

    /// Resolve the bearer token for this provider.
    ///
    /// Ollama never authenticates. The OpenAI dialect authenticates only when an
    /// env var is configured, and then the var must be set.
    pub fn api_key(&self, env_var: Option<&str>) -> Result<Option<String>> {
        match (self, env_var) {
            (Provider::Ollama, _) | (_, None) => Ok(None),
            (Provider::OpenaiCompatible, Some(var)) => std::env::var(var)
                .map(Some)
                .map_err(|_| QuizgenError::MissingApiKey {
                    env_var: var.to_string(),
                }),
        }
    }

    pub fn request_body(&self, request: &CompletionRequest) -> Value {
        match self {
            Provider::Ollama => {
                let mut options = json!({ "temperature": request.temperature });
                if let Some(top_p) = request.top_p {
                    options["top_p"] = json!(top_p);
                }

                let mut body = json!({
                    "model": request.model,
                    "prompt": request.prompt,
                    "stream": false,
                    "options": options,
                });
                if let Some(schema) = &request.response_schema {
                    body["format"] = schema.clone();
                }
                body
            }
            Provider::OpenaiCompatible => {
                let mut body = json!({
                    "model": request.model,
                    "messages": [
                        {
                            "role": "user",
                            "content": request.prompt,
                        },
                    ],
                    "stream": false,
                    "temperature": request.temperature,
                });
                if let Some(top_p) = request.top_p {
                    body["top_p"] = json!(top_p);
                }
                if let Some(schema) = &request.response_schema {
                    body["response_format"] = json!({
                        "type": "json_schema",
                        "json_schema": {
                            "name": "quizgen_response",
                            "schema": schema,
                        },
                    });
                }
                body
            }
        }
    }

    pub fn response_text<'a>(&self, response: &'a Value) -> Option<&'a str> {
        match self {
            Provider::Ollama => response["response"].as_str(),
            Provider::OpenaiCompatible => response["choices"][0]["message"]["content"].as_str(),
        }
    }

    pub fn model_names(&self, response: &Value) -> Vec<String> {
        let (list, key) = match self {
            Provider::Ollama => (&response["models"], "name"),
            Provider::OpenaiCompatible => (&response["data"], "id"),
        };

        list.as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item[key].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Pull a human-readable message out of an error body, if the upstream sent one.
pub fn upstream_error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match &value["error"] {
            Value::String(message) => message.clone(),
            Value::Object(obj) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.trim().to_string()),
            _ => body.trim().to_string(),
        },
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn request(schema: Option<Value>) -> CompletionRequest {
        CompletionRequest {
            model: "gemma3".into(),
            prompt: "Say hi".into(),
            temperature: 0.1,
            top_p: Some(0.9),
            response_schema: schema,
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn ollama_body_carries_options_and_format() {
        let schema = json!({"type": "object"});
        let body = Provider::Ollama.request_body(&request(Some(schema.clone())));

        assert_eq!(body["model"], "gemma3");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["top_p"], 0.9);
        assert_eq!(body["format"], schema);
    }

    #[test]
    fn openai_body_wraps_schema_in_response_format() {
        let body = Provider::OpenaiCompatible.request_body(&request(Some(json!({"type": "array"}))));

        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["schema"]["type"], "array");
    }

    #[test]
    fn omits_unset_fields() {
        let mut req = request(None);
        req.top_p = None;
        let body = Provider::Ollama.request_body(&req);

        assert!(body.get("format").is_none());
        assert!(body["options"].get("top_p").is_none());
    }

    #[test]
    fn reads_response_text_per_dialect() {
        let ollama = json!({"response": "[1]", "done": true});
        assert_eq!(Provider::Ollama.response_text(&ollama), Some("[1]"));

        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "{}"}}]});
        assert_eq!(Provider::OpenaiCompatible.response_text(&openai), Some("{}"));
        assert_eq!(Provider::OpenaiCompatible.response_text(&ollama), None);
    }

    #[test]
    fn lists_model_names() {
        let tags = json!({"models": [{"name": "gemma3:latest"}, {"name": "llama3"}]});
        assert_eq!(
            Provider::Ollama.model_names(&tags),
            vec!["gemma3:latest".to_string(), "llama3".to_string()]
        );
        assert!(Provider::OpenaiCompatible.model_names(&tags).is_empty());
    }

    #[test]
    fn ollama_never_needs_a_key() {
        assert_eq!(Provider::Ollama.api_key(Some("QUIZGEN_UNSET_KEY")).unwrap(), None);
    }

    #[test]
    fn missing_openai_key_is_reported() {
        let err = Provider::OpenaiCompatible
            .api_key(Some("QUIZGEN_TEST_KEY_THAT_IS_NEVER_SET"))
            .unwrap_err();
        assert!(matches!(err, QuizgenError::MissingApiKey { .. }));
    }

    #[test]
    fn extracts_upstream_error_messages() {
        assert_eq!(
            upstream_error_message(r#"{"error":"model 'x' not found"}"#),
            "model 'x' not found"
        );
        assert_eq!(
            upstream_error_message(r#"{"error":{"message":"rate limited"}}"#),
            "rate limited"
        );
        assert_eq!(upstream_error_message("  gateway down \n"), "gateway down");
    }
}
