//! Text-completion service boundary.
//!
//! The companion only needs one operation: send a system instruction, the
//! recent conversation and the new input, and get back text and/or function
//! calls. [`GeminiClient`] speaks the generative-language REST API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use crate::models::{ChatMessage, ChatRole};

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub history: Vec<ChatMessage>,
    pub user_input: String,
    /// Function declarations offered to the model; empty for plain text.
    pub tools: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    pub text: Option<String>,
    pub function_calls: Vec<FunctionCall>,
}

pub trait CompletionService {
    fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}

// Wire format

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

fn text_content(role: Option<&str>, text: &str) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part {
            text: Some(text.to_string()),
            function_call: None,
        }],
    }
}

fn build_body(request: &CompletionRequest, temperature: f32) -> GenerateContentBody {
    let mut contents: Vec<Content> = request
        .history
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::User => "user",
                ChatRole::Model => "model",
            };
            text_content(Some(role), &m.text)
        })
        .collect();
    contents.push(text_content(Some("user"), &request.user_input));

    let tools = if request.tools.is_empty() {
        vec![]
    } else {
        vec![Tool {
            function_declarations: request.tools.clone(),
        }]
    };

    GenerateContentBody {
        system_instruction: text_content(None, &request.system_instruction),
        contents,
        tools,
        generation_config: GenerationConfig { temperature },
    }
}

fn parse_response(body: GenerateContentResponse) -> CompletionResponse {
    let mut response = CompletionResponse::default();
    let parts = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let mut text = String::new();
    for part in parts {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(call) = part.function_call {
            response.function_calls.push(FunctionCall {
                name: call.name,
                args: call.args,
            });
        }
    }
    if !text.trim().is_empty() {
        response.text = Some(text);
    }
    response
}

pub struct GeminiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or(Error::MissingApiKey)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

impl CompletionService for GeminiClient {
    fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = build_body(request, self.temperature);
        tracing::debug!(model = %self.model, messages = body.contents.len(), "sending completion request");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(Error::Completion {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json()?;
        Ok(parse_response(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn request(tools: Vec<Value>) -> CompletionRequest {
        CompletionRequest {
            system_instruction: "You are MindHub.".to_string(),
            history: vec![
                ChatMessage {
                    role: ChatRole::User,
                    text: "hi".to_string(),
                    timestamp: Utc::now(),
                },
                ChatMessage {
                    role: ChatRole::Model,
                    text: "hello".to_string(),
                    timestamp: Utc::now(),
                },
            ],
            user_input: "I finished two exercises".to_string(),
            tools,
        }
    }

    fn config(base_url: &str) -> CompletionConfig {
        CompletionConfig {
            base_url: base_url.to_string(),
            api_key: Some("test-key".to_string()),
            ..CompletionConfig::default()
        }
    }

    mod body_tests {
        use super::*;

        #[test]
        fn body_orders_history_then_input() {
            let body = build_body(&request(vec![]), 0.7);
            let value = serde_json::to_value(&body).unwrap();

            let contents = value["contents"].as_array().unwrap();
            assert_eq!(contents.len(), 3);
            assert_eq!(contents[0]["role"], "user");
            assert_eq!(contents[1]["role"], "model");
            assert_eq!(contents[2]["parts"][0]["text"], "I finished two exercises");
            assert_eq!(value["systemInstruction"]["parts"][0]["text"], "You are MindHub.");
            assert!(value["systemInstruction"].get("role").is_none());
            assert!((value["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        }

        #[test]
        fn tools_omitted_when_empty() {
            let value = serde_json::to_value(build_body(&request(vec![]), 0.7)).unwrap();
            assert!(value.get("tools").is_none());
        }

        #[test]
        fn tools_wrapped_in_declarations() {
            let decl = json!({"name": "updateLearningModule"});
            let value = serde_json::to_value(build_body(&request(vec![decl.clone()]), 0.7)).unwrap();
            assert_eq!(value["tools"][0]["functionDeclarations"][0], decl);
        }
    }

    mod response_tests {
        use super::*;

        fn parse(raw: Value) -> CompletionResponse {
            parse_response(serde_json::from_value(raw).unwrap())
        }

        #[test]
        fn text_parts_are_joined() {
            let r = parse(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Great "}, {"text": "work!"}]}}]
            }));
            assert_eq!(r.text.as_deref(), Some("Great work!"));
            assert!(r.function_calls.is_empty());
        }

        #[test]
        fn function_calls_are_collected() {
            let r = parse(json!({
                "candidates": [{"content": {"parts": [
                    {"functionCall": {"name": "updateLearningModule", "args": {"moduleName": "Physics", "exercisesDelta": 2}}}
                ]}}]
            }));
            assert!(r.text.is_none());
            assert_eq!(r.function_calls.len(), 1);
            assert_eq!(r.function_calls[0].name, "updateLearningModule");
            assert_eq!(r.function_calls[0].args["exercisesDelta"], 2);
        }

        #[test]
        fn empty_candidates_yield_empty_response() {
            assert_eq!(parse(json!({})), CompletionResponse::default());
            assert_eq!(parse(json!({"candidates": [{}]})), CompletionResponse::default());
        }
    }

    mod client_tests {
        use super::*;

        #[test]
        fn requires_api_key() {
            let cfg = CompletionConfig {
                api_key: None,
                ..CompletionConfig::default()
            };
            assert!(matches!(GeminiClient::new(&cfg), Err(Error::MissingApiKey)));
        }

        #[test]
        fn posts_to_generate_content() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("POST", "/v1beta/models/gemini-3-flash-preview:generateContent")
                .match_header("x-goog-api-key", "test-key")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"Keep going!"}]}}]}"#)
                .create();

            let client = GeminiClient::new(&config(&server.url())).unwrap();
            let response = client.generate(&request(vec![])).unwrap();

            mock.assert();
            assert_eq!(response.text.as_deref(), Some("Keep going!"));
        }

        #[test]
        fn error_status_becomes_completion_error() {
            let mut server = mockito::Server::new();
            let _mock = server
                .mock("POST", mockito::Matcher::Any)
                .with_status(503)
                .with_body("overloaded")
                .create();

            let client = GeminiClient::new(&config(&server.url())).unwrap();
            match client.generate(&request(vec![])) {
                Err(Error::Completion { status, message }) => {
                    assert_eq!(status, 503);
                    assert_eq!(message, "overloaded");
                }
                other => panic!("Expected completion error, got {:?}", other),
            }
        }
    }
}
