use crate::context::PartnerGlobalContext;
use crate::error::{AllocationError, Result};
use crate::types::AllocationItem;
use async_trait::async_trait;
use pantry_protocol::PartnerId;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_REASONING_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_TOKENS: usize = 4_096;

/// The fixed heuristic rubric the reasoning service adjusts under.
const RUBRIC: &str = "\
You adjust proposed food-bank allocations. For every item you receive the \
total quantity, each partner's original request, a proportional baseline \
share, and each partner's cross-item context (summed normalized share and \
request count across this batch). Rebalance the integer quantities using \
these criteria, in order of importance:
1. Partner tier: higher tiers carry priority when requests conflict.
2. Population and need: partners serving larger populations lean larger.
3. Declared request priority: honor explicitly prioritized requests.
4. Equity within the offer: avoid leaving any requester with nothing when \
supply allows.
5. Breadth over monopoly: avoid one partner capturing every item in the \
batch.
6. Cross-item compensation: favor partners whose shares were reduced on \
other items in this batch.
Respond with JSON only, shaped exactly as \
{\"items\":[{\"requests\":[{\"partnerId\":number,\"quantity\":number}]}]} \
with the same items in the same order, the same partners per item, and \
integer quantities.";

/// Per-partner line of the adjustment payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadRequest {
    pub partner_id: i64,
    pub requested: u32,
    pub baseline: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub population: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    pub global_share: f64,
    pub global_request_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadItem {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
    pub total_quantity: u32,
    pub requests: Vec<PayloadRequest>,
}

/// Compact per-item payload submitted for adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentPayload {
    pub items: Vec<PayloadItem>,
}

impl AdjustmentPayload {
    pub fn build(
        items: &[AllocationItem],
        baselines: &[Vec<u32>],
        context: &BTreeMap<PartnerId, PartnerGlobalContext>,
    ) -> Self {
        let items = items
            .iter()
            .zip(baselines)
            .map(|(item, shares)| PayloadItem {
                title: item.title.clone(),
                unit_type: item.unit_type.clone(),
                total_quantity: item.total_quantity,
                requests: item
                    .requests
                    .iter()
                    .zip(shares)
                    .map(|(request, &baseline)| {
                        let global = context.get(&request.partner).copied().unwrap_or_default();
                        PayloadRequest {
                            partner_id: request.partner.0,
                            requested: request.quantity,
                            baseline,
                            tier: request.tier.clone(),
                            population: request.population,
                            priority: request.priority,
                            global_share: global.normalized_share,
                            global_request_count: global.request_count,
                        }
                    })
                    .collect(),
            })
            .collect();
        Self { items }
    }
}

/// Lenient mirror of the strict response schema.
///
/// Quantities stay raw JSON values: anything non-numeric falls back to the
/// baseline downstream instead of failing the whole batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdjustmentResponse {
    #[serde(default)]
    pub items: Vec<ResponseItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseItem {
    #[serde(default)]
    pub requests: Vec<ResponseRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRequest {
    #[serde(default)]
    pub partner_id: Option<i64>,
    #[serde(default)]
    pub quantity: serde_json::Value,
}

/// Structured heuristic adjustment of proposed allocations.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn adjust(&self, payload: &AdjustmentPayload) -> Result<AdjustmentResponse>;
}

/// Builds the reasoning client from the environment, or `None` when the
/// service is not configured.
///
/// Unlike the embedding client this never fails: an absent key simply
/// means every suggestion uses the deterministic baseline.
pub fn reasoner_from_env() -> Option<Arc<dyn ReasoningClient>> {
    let mode = env::var("PANTRY_REASONING_MODE")
        .unwrap_or_else(|_| "remote".to_string())
        .to_ascii_lowercase();
    if mode == "off" {
        return None;
    }
    let api_key = match env::var("PANTRY_ANTHROPIC_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            log::info!("no reasoning service configured; suggestions use the baseline");
            return None;
        }
    };
    let model =
        env::var("PANTRY_REASONING_MODEL").unwrap_or_else(|_| DEFAULT_REASONING_MODEL.to_string());
    match AnthropicReasoner::new(api_key, model, DEFAULT_TIMEOUT) {
        Ok(client) => Some(Arc::new(client)),
        Err(err) => {
            log::warn!("reasoning client unavailable: {err}");
            None
        }
    }
}

/// Async client for the Anthropic messages API.
pub struct AnthropicReasoner {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicReasoner {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AllocationError::Configuration(
                "missing Anthropic API key".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                AllocationError::Configuration(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            model,
        })
    }
}

#[async_trait]
impl ReasoningClient for AnthropicReasoner {
    async fn adjust(&self, payload: &AdjustmentPayload) -> Result<AdjustmentResponse> {
        let input = serde_json::to_string(payload)
            .map_err(|err| AllocationError::Reasoning(format!("payload encoding: {err}")))?;
        let prompt = format!("{RUBRIC}\n\nInput:\n{input}");

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| AllocationError::Configuration("invalid API key".to_string()))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };
        let resp = self
            .client
            .post(ANTHROPIC_ENDPOINT)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|err| AllocationError::Reasoning(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(AllocationError::Reasoning(format!(
                "reasoning service returned {status}: {text}"
            )));
        }
        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|err| AllocationError::Reasoning(format!("response parsing: {err}")))?;
        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let json = extract_json_object(&text).ok_or_else(|| {
            AllocationError::Reasoning("reply carried no JSON object".to_string())
        })?;
        serde_json::from_str(json)
            .map_err(|err| AllocationError::Reasoning(format!("reply did not match schema: {err}")))
    }
}

/// The first top-level JSON object in a reply, tolerating code fences and
/// prose around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_reply() {
        let text = "Here you go:\n```json\n{\"items\":[]}\n```\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"items\":[]}"));
    }

    #[test]
    fn missing_json_yields_none() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn lenient_schema_tolerates_junk_quantities() {
        let parsed: AdjustmentResponse = serde_json::from_str(
            r#"{"items":[{"requests":[{"partnerId":1,"quantity":"plenty"},{"partnerId":2,"quantity":4.6}]}]}"#,
        )
        .unwrap();
        let requests = &parsed.items[0].requests;
        assert_eq!(requests[0].partner_id, Some(1));
        assert!(requests[0].quantity.as_f64().is_none());
        assert_eq!(requests[1].quantity.as_f64(), Some(4.6));
    }

    #[test]
    fn reasoner_requires_api_key() {
        let out = AnthropicReasoner::new(" ".to_string(), "model".to_string(), DEFAULT_TIMEOUT);
        assert!(matches!(out, Err(AllocationError::Configuration(_))));
    }
}
