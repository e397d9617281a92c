//! Client for the remote multimodal `generateContent` endpoint.
//!
//! Only the request body is typed. The response comes back as raw JSON and is
//! picked apart by [`crate::nutrition::parse_generate_response`], so every deviation
//! from the expected shape surfaces as the same malformed-response failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::config::InferenceConfig;
use crate::error::AppError;
use crate::payload::ImagePayload;

pub const NUTRITION_PROMPT: &str = "Analyze the food in this image and provide its estimated calorie, carbohydrate, and protein content. Please provide the response in JSON format with keys 'calories', 'carbohydrates', and 'proteins'. If you cannot identify the food or its nutritional content, return 0 for all values. Provide only the JSON object.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: ResponseSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: NutritionProperties,
    pub property_ordering: Vec<String>,
}

/// Struct rather than a map so the fields serialize in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionProperties {
    pub calories: PropertySchema,
    pub carbohydrates: PropertySchema,
    pub proteins: PropertySchema,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
}

impl PropertySchema {
    fn number() -> Self {
        Self {
            schema_type: "NUMBER".to_string(),
        }
    }
}

impl GenerateContentRequest {
    /// One user turn carrying the nutrition instruction and the image inline.
    pub fn nutrition(image: &ImagePayload) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::Text {
                        text: NUTRITION_PROMPT.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type().to_string(),
                            data: image.base64_data().to_string(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: ResponseSchema {
                    schema_type: "OBJECT".to_string(),
                    properties: NutritionProperties {
                        calories: PropertySchema::number(),
                        carbohydrates: PropertySchema::number(),
                        proteins: PropertySchema::number(),
                    },
                    property_ordering: vec![
                        "calories".to_string(),
                        "carbohydrates".to_string(),
                        "proteins".to_string(),
                    ],
                },
            },
        }
    }
}

#[async_trait]
pub trait InferenceService: Send + Sync {
    fn display_name(&self) -> &'static str;

    /// Send one request and hand back the decoded response body.
    async fn generate(&self, request: &GenerateContentRequest) -> Result<Value, AppError>;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &InferenceConfig) -> Result<Self, AppError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.resolved_api_key(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }

    fn masked_url(&self) -> String {
        if self.api_key.is_empty() {
            return self.url();
        }
        self.url().replace(&self.api_key, "***")
    }
}

#[async_trait]
impl InferenceService for GeminiClient {
    fn display_name(&self) -> &'static str {
        "Google Gemini"
    }

    async fn generate(&self, request: &GenerateContentRequest) -> Result<Value, AppError> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::MissingApiKey);
        }

        log::debug!("Sending request to {}", self.masked_url());

        let response = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                log::error!("Inference request failed: {}", e);
                AppError::from(e)
            })?;

        let status = response.status();
        let body = response.text().await?;
        log::debug!("Inference raw response ({}): {}", status, body);

        if !status.is_success() {
            log::error!("Inference service error: {} - {}", status, body);
            return Err(AppError::ServiceRejected {
                status: status.as_u16(),
                message: service_error_message(&body),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| AppError::MalformedResponse(format!("response body is not JSON: {}", e)))
    }
}

/// `error.message` from a Google API error body, or the raw body.
fn service_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> ImagePayload {
        ImagePayload::from_bytes("image/png", &[0, 0, 0]).unwrap()
    }

    #[test]
    fn test_request_wire_format() {
        let request = GenerateContentRequest::nutrition(&payload());
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": NUTRITION_PROMPT },
                        { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
                    ]
                }],
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": {
                        "type": "OBJECT",
                        "properties": {
                            "calories": { "type": "NUMBER" },
                            "carbohydrates": { "type": "NUMBER" },
                            "proteins": { "type": "NUMBER" }
                        },
                        "propertyOrdering": ["calories", "carbohydrates", "proteins"]
                    }
                }
            })
        );
    }

    #[test]
    fn test_schema_properties_keep_order() {
        let request = GenerateContentRequest::nutrition(&payload());
        let text = serde_json::to_string(&request.generation_config.response_schema.properties).unwrap();
        let calories = text.find("calories").unwrap();
        let carbohydrates = text.find("carbohydrates").unwrap();
        let proteins = text.find("proteins").unwrap();
        assert!(calories < carbohydrates && carbohydrates < proteins);
    }

    #[test]
    fn test_url_masks_key() {
        let mut config = crate::config::Config::default().inference;
        config.api_key = "secret-key".to_string();
        config.api_key_env = String::new();
        let client = GeminiClient::new(&config).unwrap();

        assert_eq!(
            client.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent?key=secret-key"
        );
        assert!(!client.masked_url().contains("secret-key"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_sending() {
        let mut config = crate::config::Config::default().inference;
        config.api_key = String::new();
        config.api_key_env = String::new();
        let client = GeminiClient::new(&config).unwrap();

        let result = client.generate(&GenerateContentRequest::nutrition(&payload())).await;
        assert_eq!(result, Err(AppError::MissingApiKey));
    }

    #[test]
    fn test_service_error_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid."}}"#;
        assert_eq!(service_error_message(body), "API key not valid.");
        assert_eq!(service_error_message("Bad Gateway\n"), "Bad Gateway");
    }
}
