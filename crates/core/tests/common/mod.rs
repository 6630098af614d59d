use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use quizgen_core::{Completion, CompletionRequest, LlmTransport, QuizgenError, Result};

#[derive(Clone)]
pub enum Reply {
    Text(String),
    Delayed(Duration, String),
    Timeout,
    Refused,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

struct Rule {
    needles: Vec<String>,
    reply: Reply,
}

/// Answers by prompt content: the first rule whose needles all occur in the
/// prompt wins, otherwise the default reply is used.
pub struct StubTransport {
    rules: Vec<Rule>,
    default: Reply,
    prompts: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new(default: Reply) -> Self {
        Self {
            rules: Vec::new(),
            default,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needles: &[&str], reply: Reply) -> Self {
        self.rules.push(Rule {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            reply,
        });
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmTransport for StubTransport {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let reply = self
            .rules
            .iter()
            .find(|rule| rule.needles.iter().all(|n| request.prompt.contains(n.as_str())))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| self.default.clone());

        match reply {
            Reply::Text(text) => Ok(Completion { text }),
            Reply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(Completion { text })
            }
            Reply::Timeout => Err(QuizgenError::UpstreamTimeout {
                url: "http://stub/api/generate".into(),
                timeout_ms: request.timeout.as_millis() as u64,
            }),
            Reply::Refused => Err(QuizgenError::UpstreamUnavailable {
                url: "http://stub/api/generate".into(),
                reason: "connection refused".into(),
            }),
        }
    }
}

/// A well-formed single-correct question in the lot-item shape.
pub fn lot_item_question(text: &str) -> String {
    serde_json::json!({
        "question": {"text": text, "isParameterized": false},
        "solution": {
            "incorrectLotItems": [
                {"text": "Mitochondria", "explaination": "Produces ATP."},
                {"text": "Nucleus", "explaination": "Stores DNA."},
                {"text": "Ribosome", "explaination": "Builds proteins."}
            ],
            "correctLotItem": {"text": "Chloroplast", "explaination": "Hosts photosynthesis."}
        }
    })
    .to_string()
}

pub fn numbered_lines(n: usize) -> String {
    (0..n).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n")
}
