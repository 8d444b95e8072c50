// SYNOID Scenes - Semantic Matcher
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Asks a text-generation service to pick clips for a narration segment.
// The service is an untrusted oracle: its reply is searched for the first
// bracketed array, and anything that goes wrong becomes "no ids this round".

use crate::agent::relevance_ranker::RankedClip;
use crate::error::{MatchParseError, SceneError};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Characters of narration text included in the prompt.
pub const PROMPT_TEXT_LIMIT: usize = 500;

/// A text-generation backend that answers one prompt with one reply.
#[async_trait]
pub trait ClipOracle: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, SceneError>;
}

/// OpenAI-compatible chat completion client.
pub struct OpenAiOracle {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiOracle {
    pub fn new(api_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_url: api_url.to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ClipOracle for OpenAiOracle {
    async fn complete(&self, prompt: &str) -> Result<String, SceneError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": 0.7
        });

        let endpoint = format!("{}/chat/completions", self.api_url.trim_end_matches('/'));
        let mut request = self.client.post(&endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| SceneError::Oracle(format!("request to {} failed: {}", endpoint, e)))?;

        if !resp.status().is_success() {
            return Err(SceneError::Oracle(format!("API error: {}", resp.status())));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| SceneError::Oracle(format!("unreadable response body: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| SceneError::Oracle("empty completion".into()))
    }
}

/// Everything the oracle is told about one segment.
#[derive(Debug, Clone)]
pub struct MatchRequest<'a> {
    pub narration_text: &'a str,
    pub narration_keywords: Option<&'a str>,
    pub target_duration_secs: f64,
    pub candidates: &'a [RankedClip<'a>],
}

#[derive(Serialize)]
struct CandidateEntry<'a> {
    id: &'a str,
    keywords: &'a str,
    duration: f64,
}

pub struct SemanticMatcher {
    oracle: Arc<dyn ClipOracle>,
}

impl SemanticMatcher {
    pub fn new(oracle: Arc<dyn ClipOracle>) -> Self {
        Self { oracle }
    }

    /// One oracle round. Never fails: transport errors and unparsable
    /// replies both come back as an empty list.
    pub async fn select(&self, request: &MatchRequest<'_>) -> Vec<String> {
        if request.candidates.is_empty() {
            return Vec::new();
        }

        let prompt = build_prompt(request);
        info!(
            "[MATCHER] Asking oracle for {:.1}s of footage from {} candidates",
            request.target_duration_secs,
            request.candidates.len()
        );

        let reply = match self.oracle.complete(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("[MATCHER] Oracle call failed: {}", e);
                return Vec::new();
            }
        };

        match parse_clip_ids(&reply) {
            Ok(ids) => {
                debug!("[MATCHER] Oracle proposed {} ids", ids.len());
                ids
            }
            Err(e) => {
                warn!("[MATCHER] Could not parse oracle reply ({}): {:.200}", e, reply);
                Vec::new()
            }
        }
    }
}

pub fn build_prompt(request: &MatchRequest<'_>) -> String {
    let excerpt: String = request.narration_text.chars().take(PROMPT_TEXT_LIMIT).collect();
    let truncated = request.narration_text.chars().count() > PROMPT_TEXT_LIMIT;

    let candidates: Vec<CandidateEntry> = request
        .candidates
        .iter()
        .map(|r| CandidateEntry {
            id: &r.clip.id,
            keywords: &r.clip.keywords,
            duration: r.clip.duration_secs,
        })
        .collect();
    let candidates_json = serde_json::to_string(&candidates).unwrap_or_else(|_| "[]".to_string());

    let keywords_line = request
        .narration_keywords
        .map(|k| format!("\nKeywords from the narration: {}\n", k))
        .unwrap_or_default();

    format!(
        "I need to match stock video clips to a narration segment for a documentary scene.\n\
         The narration says: \"{excerpt}{ellipsis}\"\n\
         {keywords_line}\n\
         Select clips that visually match this narration with a combined duration close to \
         {target:.1} seconds.\n\
         Do not choose clips whose keywords suggest abstract graphics, text overlays, title cards, \
         logos, or blank/black frames.\n\n\
         Available clips (id, keywords, duration in seconds):\n\
         {candidates_json}\n\n\
         Return ONLY a JSON array of the chosen clip ids in your preferred order, for example:\n\
         [\"clip-id-1\", \"clip-id-2\", \"clip-id-3\"]",
        excerpt = excerpt,
        ellipsis = if truncated { "..." } else { "" },
        keywords_line = keywords_line,
        target = request.target_duration_secs,
        candidates_json = candidates_json,
    )
}

fn array_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\[.*?\]").ok()).as_ref()
}

/// Pull the first bracketed array out of a free-form reply and decode it
/// as a list of ids. Numeric ids are accepted and stringified.
pub fn parse_clip_ids(reply: &str) -> Result<Vec<String>, MatchParseError> {
    let found = array_pattern()
        .and_then(|p| p.find(reply))
        .ok_or(MatchParseError::NoArray)?;

    let values: Vec<serde_json::Value> = serde_json::from_str(found.as_str())
        .map_err(|e| MatchParseError::InvalidJson(e.to_string()))?;

    let ids = values
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::clip_catalog::Clip;
    use std::path::PathBuf;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedOracle(Result<String, String>);

    #[async_trait]
    impl ClipOracle for FixedOracle {
        async fn complete(&self, _prompt: &str) -> Result<String, SceneError> {
            self.0.clone().map_err(SceneError::Oracle)
        }
    }

    fn clip(id: &str) -> Clip {
        Clip::new(id, 4.0, "tank, desert", PathBuf::from(format!("{}.mp4", id)))
    }

    #[test]
    fn test_parse_tolerates_commentary() {
        let reply = "Sure! Here are my picks:\n[\"a\", \"b\",\n \"c\"]\nThese match the mood.";
        assert_eq!(parse_clip_ids(reply).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_numeric_ids() {
        assert_eq!(parse_clip_ids("[12, \"x\", null]").unwrap(), vec!["12", "x"]);
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_clip_ids("no clips fit"), Err(MatchParseError::NoArray));
        assert!(matches!(
            parse_clip_ids("[a, b]"),
            Err(MatchParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_prompt_contents() {
        let clips = vec![clip("abc")];
        let ranked = vec![RankedClip { clip: &clips[0], score: 1 }];
        let long_text = "x".repeat(PROMPT_TEXT_LIMIT + 50);
        let prompt = build_prompt(&MatchRequest {
            narration_text: &long_text,
            narration_keywords: Some("war, tanks"),
            target_duration_secs: 12.0,
            candidates: &ranked,
        });
        assert!(prompt.contains("12.0 seconds"));
        assert!(prompt.contains("\"id\":\"abc\""));
        assert!(prompt.contains("war, tanks"));
        assert!(prompt.contains("JSON array"));
        assert!(!prompt.contains(&"x".repeat(PROMPT_TEXT_LIMIT + 1)));
    }

    #[tokio::test]
    async fn test_select_swallows_oracle_errors() {
        let clips = vec![clip("abc")];
        let ranked = vec![RankedClip { clip: &clips[0], score: 0 }];
        let request = MatchRequest {
            narration_text: "tanks",
            narration_keywords: None,
            target_duration_secs: 5.0,
            candidates: &ranked,
        };

        let failing = SemanticMatcher::new(Arc::new(FixedOracle(Err("offline".into()))));
        assert!(failing.select(&request).await.is_empty());

        let garbage = SemanticMatcher::new(Arc::new(FixedOracle(Ok("[not json".into()))));
        assert!(garbage.select(&request).await.is_empty());

        let good = SemanticMatcher::new(Arc::new(FixedOracle(Ok("[\"abc\"]".into()))));
        assert_eq!(good.select(&request).await, vec!["abc"]);
    }

    #[tokio::test]
    async fn test_openai_oracle_round_trip() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": " [\"a\", \"b\"] " },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&mock_server)
            .await;

        let oracle = OpenAiOracle::new(&mock_server.uri(), "test-model", Some("sk-test-key".into()));
        let reply = oracle.complete("pick clips").await.unwrap();
        assert_eq!(reply, "[\"a\", \"b\"]");
    }

    #[tokio::test]
    async fn test_openai_oracle_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let oracle = OpenAiOracle::new(&mock_server.uri(), "test-model", None);
        assert!(matches!(oracle.complete("pick clips").await, Err(SceneError::Oracle(_))));
    }
}
