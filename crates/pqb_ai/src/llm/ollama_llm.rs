use pqb_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::{GenerationRole, Llm};
use crate::ollama::OllamaClient;

pub const AI_GENERATE_FAILED: &str = "AI_GENERATE_FAILED";

/// `/api/generate` backend. Each role gets its own sampling options so a question request
/// stops after one line while a ground-truth draft has room for a paragraph.
#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct SamplingOptions {
    temperature: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<&'static str>,
}

fn options_for(role: GenerationRole) -> SamplingOptions {
    match role {
        GenerationRole::Question => SamplingOptions {
            temperature: 0.7,
            num_predict: 96,
            stop: vec!["\n\n"],
        },
        GenerationRole::GroundTruth => SamplingOptions {
            temperature: 0.2,
            num_predict: 512,
            stop: Vec::new(),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    fn request_body(
        model: &str,
        prompt: &str,
        role: Option<GenerationRole>,
    ) -> Result<serde_json::Value, AppError> {
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: role.map(options_for),
        };
        serde_json::to_value(req).map_err(|e| {
            AppError::new(AI_GENERATE_FAILED, "Failed to encode generate request")
                .with_details(e.to_string())
        })
    }

    fn send(&self, model: &str, prompt: &str, role: Option<GenerationRole>) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let role_label = role.map(GenerationRole::as_str).unwrap_or("unspecified");
        let body = Self::request_body(model, prompt, role)?;

        let resp = ureq::post(&url).timeout(self.client.timeout()).send_json(body);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: GenerateResponse = r.into_json().map_err(|e| {
                    AppError::new(AI_GENERATE_FAILED, "Failed to decode generate response")
                        .with_details(format!("model={model}; role={role_label}; err={e}"))
                })?;
                if v.response.trim().is_empty() {
                    return Err(AppError::new(AI_GENERATE_FAILED, "Generate response was empty")
                        .with_details(format!("model={model}; role={role_label}")));
                }
                Ok(v.response)
            }
            Ok(r) => Err(
                AppError::new(AI_GENERATE_FAILED, "Generate request failed").with_details(format!(
                    "model={model}; role={role_label}; status={}",
                    r.status()
                )),
            ),
            Err(e) => Err(
                AppError::new(AI_GENERATE_FAILED, "Failed to call generate endpoint")
                    .with_details(format!("url={url}; role={role_label}; err={e}"))
                    .with_retryable(true),
            ),
        }
    }
}

impl Llm for OllamaLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        self.send(model, prompt, None)
    }

    fn generate_as(&self, role: GenerationRole, model: &str, prompt: &str) -> Result<String, AppError> {
        self.send(model, prompt, Some(role))
    }
}
