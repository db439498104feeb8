// src/services/judge.rs
use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::MontageError;
use crate::models::Winner;

pub const FALLBACK_SUGGESTIONS: [&str; 3] = [
    "Increase the overall contrast and color vibrancy for a bolder look",
    "Soften the lighting to blend the composited elements together",
    "Refine the edges where pasted images meet the background",
];

pub const FALLBACK_REASON: &str =
    "Automatic comparison was unavailable; defaulting to the first image.";
pub const FALLBACK_SCORE1: u8 = 7;
pub const FALLBACK_SCORE2: u8 = 6;

/// Result of decoding a model reply: either what the model said, or the
/// fixed substitute. Callers get a usable value either way; no error path.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Parsed(T),
    Fallback(T),
}

impl<T> Decoded<T> {
    pub fn into_inner(self) -> T {
        match self {
            Decoded::Parsed(v) | Decoded::Fallback(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Verdict {
    pub winner: Winner,
    pub reason: String,
    pub score1: u8,
    pub score2: u8,
}

pub fn fallback_verdict() -> Verdict {
    Verdict {
        winner: Winner::Image1,
        reason: FALLBACK_REASON.to_string(),
        score1: FALLBACK_SCORE1,
        score2: FALLBACK_SCORE2,
    }
}

/// Expects a strict JSON array of exactly three strings; anything else gets
/// the fixed fallback triple.
pub fn decode_suggestions(raw: &str) -> Decoded<Vec<String>> {
    match serde_json::from_str::<Vec<String>>(raw.trim()) {
        Ok(suggestions) if suggestions.len() == 3 => Decoded::Parsed(suggestions),
        _ => Decoded::Fallback(FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect()),
    }
}

/// Expects a strict JSON object {winner, reason, score1, score2} with scores
/// in 1..=10; anything else gets the fixed image1-wins fallback.
pub fn decode_verdict(raw: &str) -> Decoded<Verdict> {
    match serde_json::from_str::<Verdict>(raw.trim()) {
        Ok(v) if (1..=10).contains(&v.score1) && (1..=10).contains(&v.score2) => {
            Decoded::Parsed(v)
        }
        _ => Decoded::Fallback(fallback_verdict()),
    }
}

/// Seam over the pairwise judgment so winner selection can be driven by a
/// scripted double in tests.
#[async_trait]
pub trait ImageJudge: Send + Sync {
    async fn compare_images(&self, url1: &str, url2: &str, prompt: &str) -> Verdict;
}

/// Multimodal judge: picks a winner between two candidate images and produces
/// improvement suggestions for a finished enhancement.
pub struct JudgeService {
    api_key: String,
    client: Client,
}

impl JudgeService {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
        }
    }

    /// Asks for exactly three improvement suggestions. Transport or API
    /// failures propagate; an unparseable reply degrades to the fallback
    /// triple instead.
    pub async fn suggest_improvements(
        &self,
        image_url: &str,
    ) -> Result<Vec<String>, MontageError> {
        let prompt = "You are a professional photo editor reviewing an AI-enhanced collage. \
            Suggest exactly three specific, actionable improvements to the image. \
            Respond with ONLY a JSON array of three strings, no other text.";

        let content = self.vision_request(prompt, &[image_url], false).await?;
        Ok(decode_suggestions(&content).into_inner())
    }
}

#[async_trait]
impl ImageJudge for JudgeService {
    /// Judges two candidates against the prompt that produced them. Never
    /// fails: transport errors and unparseable replies both land on the
    /// fixed fallback verdict.
    async fn compare_images(&self, url1: &str, url2: &str, prompt: &str) -> Verdict {
        let instruction = format!(
            "Two images were generated from the same collage with this prompt: \"{}\". \
             Decide which one is the better result. Respond with ONLY a JSON object \
             {{\"winner\": \"image1\"|\"image2\", \"reason\": string, \
             \"score1\": 1-10, \"score2\": 1-10}}.",
            prompt
        );

        match self.vision_request(&instruction, &[url1, url2], true).await {
            Ok(content) => decode_verdict(&content).into_inner(),
            Err(e) => {
                warn!("Comparison judgment failed, using fallback: {}", e);
                fallback_verdict()
            }
        }
    }
}

impl JudgeService {
    async fn vision_request(
        &self,
        prompt: &str,
        image_urls: &[&str],
        json_object: bool,
    ) -> Result<String, MontageError> {
        let mut content = vec![json!({ "type": "text", "text": prompt })];
        for url in image_urls {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": url }
            }));
        }

        let mut body = json!({
            "model": "gpt-4o",
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": 1024,
        });
        if json_object {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| MontageError::Prediction(format!("Judge request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MontageError::Prediction(format!(
                "Judge error: {}",
                error_text
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MontageError::Prediction(format!("Failed to parse judge response: {}", e)))?;

        result["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| MontageError::Prediction("No content in judge response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_suggestion_array_passes_through_unchanged() {
        let raw = r#"["Add warmth", "Sharpen the focal point", "Balance the margins"]"#;
        let decoded = decode_suggestions(raw);
        assert_eq!(
            decoded,
            Decoded::Parsed(vec![
                "Add warmth".to_string(),
                "Sharpen the focal point".to_string(),
                "Balance the margins".to_string(),
            ])
        );
    }

    #[test]
    fn malformed_suggestions_fall_back_to_the_fixed_triple() {
        let expected: Vec<String> = FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect();

        for raw in [
            "not json at all",
            r#"{"suggestions": ["a", "b", "c"]}"#,
            r#"["only", "two"]"#,
            r#"["one", "two", "three", "four"]"#,
            "[]",
        ] {
            let decoded = decode_suggestions(raw);
            assert_eq!(decoded, Decoded::Fallback(expected.clone()), "raw: {raw}");
        }
    }

    #[test]
    fn well_formed_verdict_is_parsed() {
        let raw = r#"{"winner": "image2", "reason": "Cleaner blending", "score1": 6, "score2": 9}"#;
        match decode_verdict(raw) {
            Decoded::Parsed(v) => {
                assert_eq!(v.winner, Winner::Image2);
                assert_eq!(v.reason, "Cleaner blending");
                assert_eq!((v.score1, v.score2), (6, 9));
            }
            other => panic!("expected parsed verdict, got {:?}", other),
        }
    }

    #[test]
    fn bad_verdicts_default_to_image1_with_fixed_scores() {
        for raw in [
            "nope",
            r#"{"winner": "image3", "reason": "x", "score1": 5, "score2": 5}"#,
            r#"{"winner": "image1", "reason": "x", "score1": 0, "score2": 5}"#,
            r#"{"winner": "image1", "reason": "x", "score1": 5, "score2": 11}"#,
            r#"{"winner": "image1"}"#,
        ] {
            let verdict = decode_verdict(raw).into_inner();
            assert_eq!(verdict.winner, Winner::Image1, "raw: {raw}");
            assert_eq!(
                (verdict.score1, verdict.score2),
                (FALLBACK_SCORE1, FALLBACK_SCORE2)
            );
        }
    }
}
