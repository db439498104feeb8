// src/services/orchestrator.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::errors::MontageError;
use crate::models::{ComparisonResult, Prediction, PredictionStatus, Winner};
use crate::services::judge::{ImageJudge, Verdict};
use crate::services::prediction::{
    COMPARISON_MODEL, PRIMARY_MODEL, PredictionApi, enhancement_input, resolve_input_image,
};

/// Fixed poll cadence. There is deliberately no timeout, backoff or retry: a
/// stalled external job stalls the orchestration, matching the product's
/// accepted behavior.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_ENHANCEMENT_PROMPT: &str = "Transform this collage into a professional, \
    high-quality digital asset with enhanced colors, perfect lighting, crisp details, and \
    polished composition. Make it look like a premium marketing material with vibrant colors \
    and studio-quality finish. Many components will be porly pasted by user, so use the \
    collage as a base, if things have a background there is more chance that it is pasted \
    by user, so make sure to use the collage as a base and enhance it.";

/// Wraps a chosen suggestion into the edit prompt.
pub fn suggestion_prompt(suggestion: &str) -> String {
    format!(
        "Apply this specific improvement to the image: \"{}\". Make precise adjustments \
         while maintaining the overall quality and composition of the professional asset.",
        suggestion
    )
}

/// Outcome of a comparison run: the winning image plus the full record.
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub winner_url: String,
    pub comparison: ComparisonResult,
}

/// Drives one or two long-running enhancement jobs to completion.
pub struct Orchestrator {
    api: Arc<dyn PredictionApi>,
    judge: Arc<dyn ImageJudge>,
    static_root: PathBuf,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn PredictionApi>,
        judge: Arc<dyn ImageJudge>,
        static_root: PathBuf,
    ) -> Self {
        Self {
            api,
            judge,
            static_root,
        }
    }

    /// Single-job path: submit against the primary backend, poll every
    /// second until terminal, return the output URL.
    pub async fn enhance(&self, source: &str, prompt: &str) -> Result<String, MontageError> {
        let input_image = resolve_input_image(source, &self.static_root).await?;
        let prediction = self
            .api
            .create(PRIMARY_MODEL, enhancement_input(prompt, &input_image))
            .await?;
        info!("Submitted enhancement job {}", prediction.id);
        self.poll_to_completion(prediction).await
    }

    /// Iterative edit: the previous result feeds back in as the new input.
    pub async fn edit(&self, previous_result: &str, prompt: &str) -> Result<String, MontageError> {
        self.enhance(previous_result, prompt).await
    }

    /// Dual-job path: identical input against two backends, both polled in
    /// the same loop until terminal, then a winner picked.
    pub async fn enhance_pair(
        &self,
        source: &str,
        prompt: &str,
    ) -> Result<ComparisonOutcome, MontageError> {
        let input_image = resolve_input_image(source, &self.static_root).await?;
        let input = enhancement_input(prompt, &input_image);

        let (first, second) = tokio::join!(
            self.submit_tracked(PRIMARY_MODEL, input.clone()),
            self.submit_tracked(COMPARISON_MODEL, input)
        );
        let (first, second) = self.poll_pair(first, second).await;

        match (first, second) {
            (Err(e1), Err(e2)) => Err(MontageError::Prediction(format!(
                "Both generation jobs failed: {}; {}",
                e1, e2
            ))),
            (Ok(url1), Err(e2)) => {
                info!("Second backend failed, first wins by default: {}", e2);
                Ok(ComparisonOutcome {
                    winner_url: url1.clone(),
                    comparison: ComparisonResult {
                        winner: Winner::Image1,
                        reason: "Only the first backend produced a result; the second job failed."
                            .to_string(),
                        score1: 8,
                        score2: 0,
                        image1_url: Some(url1),
                        image2_url: None,
                    },
                })
            }
            (Err(e1), Ok(url2)) => {
                info!("First backend failed, second wins by default: {}", e1);
                Ok(ComparisonOutcome {
                    winner_url: url2.clone(),
                    comparison: ComparisonResult {
                        winner: Winner::Image2,
                        reason: "Only the second backend produced a result; the first job failed."
                            .to_string(),
                        score1: 0,
                        score2: 8,
                        image1_url: None,
                        image2_url: Some(url2),
                    },
                })
            }
            (Ok(url1), Ok(url2)) => {
                let verdict = self.judge.compare_images(&url1, &url2, prompt).await;
                let winner_url = match verdict.winner {
                    Winner::Image1 => url1.clone(),
                    Winner::Image2 => url2.clone(),
                };
                Ok(ComparisonOutcome {
                    winner_url,
                    comparison: ComparisonResult {
                        winner: verdict.winner,
                        reason: verdict.reason,
                        score1: verdict.score1,
                        score2: verdict.score2,
                        image1_url: Some(url1),
                        image2_url: Some(url2),
                    },
                })
            }
        }
    }

    async fn poll_to_completion(&self, mut prediction: Prediction) -> Result<String, MontageError> {
        while !prediction.status.is_terminal() {
            tokio::time::sleep(POLL_INTERVAL).await;
            prediction = self.api.get(&prediction.id).await?;
        }
        output_url(prediction)
    }

    /// Submission failure counts as that job having failed, so the sibling
    /// can still carry the comparison.
    async fn submit_tracked(
        &self,
        model: &str,
        input: serde_json::Value,
    ) -> Result<Prediction, MontageError> {
        let prediction = self.api.create(model, input).await?;
        info!("Submitted comparison job {} on {}", prediction.id, model);
        Ok(prediction)
    }

    /// One shared loop: each pending job is polled once per tick and stops
    /// being polled as soon as it goes terminal; the loop runs until both
    /// are done, so its period is bounded by the slower job.
    async fn poll_pair(
        &self,
        first: Result<Prediction, MontageError>,
        second: Result<Prediction, MontageError>,
    ) -> (Result<String, MontageError>, Result<String, MontageError>) {
        let mut first = GenerationJob::initial(first);
        let mut second = GenerationJob::initial(second);

        while first.is_pending() || second.is_pending() {
            tokio::time::sleep(POLL_INTERVAL).await;
            if let GenerationJob::Pending(id) = &first {
                first = self.poll_once(id.clone()).await;
            }
            if let GenerationJob::Pending(id) = &second {
                second = self.poll_once(id.clone()).await;
            }
        }

        (first.into_result(), second.into_result())
    }

    async fn poll_once(&self, id: String) -> GenerationJob {
        match self.api.get(&id).await {
            Ok(prediction) if prediction.status.is_terminal() => {
                GenerationJob::Done(output_url(prediction))
            }
            Ok(_) => GenerationJob::Pending(id),
            // A poll failure is a job failure, not an orchestration failure.
            Err(e) => GenerationJob::Done(Err(e)),
        }
    }
}

/// Tracking state for one external job in the dual-job loop.
#[derive(Debug)]
enum GenerationJob {
    Pending(String),
    Done(Result<String, MontageError>),
}

impl GenerationJob {
    fn initial(submitted: Result<Prediction, MontageError>) -> Self {
        match submitted {
            Ok(prediction) if prediction.status.is_terminal() => {
                GenerationJob::Done(output_url(prediction))
            }
            Ok(prediction) => GenerationJob::Pending(prediction.id),
            Err(e) => GenerationJob::Done(Err(e)),
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, GenerationJob::Pending(_))
    }

    fn into_result(self) -> Result<String, MontageError> {
        match self {
            GenerationJob::Done(result) => result,
            GenerationJob::Pending(id) => Err(MontageError::Prediction(format!(
                "Job {} is still pending",
                id
            ))),
        }
    }
}

/// A terminal prediction either succeeded with a single string output URL or
/// it failed; any other success shape counts as failure.
fn output_url(prediction: Prediction) -> Result<String, MontageError> {
    match prediction.status {
        PredictionStatus::Succeeded => match prediction.output {
            Some(serde_json::Value::String(url)) => Ok(url),
            _ => Err(MontageError::Prediction(
                "No output received from prediction".to_string(),
            )),
        },
        _ => Err(MontageError::Prediction(format!(
            "Prediction failed: {}",
            prediction
                .error
                .as_ref()
                .and_then(|e| e.as_str())
                .unwrap_or("Unknown error")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted prediction backend: each job id maps to a sequence of poll
    /// results consumed one per `get`.
    struct ScriptedApi {
        // model -> job id handed out on create
        create_ids: Mutex<Vec<(String, String)>>,
        polls: Mutex<HashMap<String, Vec<Prediction>>>,
    }

    impl ScriptedApi {
        fn new() -> Self {
            Self {
                create_ids: Mutex::new(Vec::new()),
                polls: Mutex::new(HashMap::new()),
            }
        }

        fn on_create(&self, model: &str, id: &str) {
            self.create_ids
                .lock()
                .unwrap()
                .push((model.to_string(), id.to_string()));
        }

        fn script(&self, id: &str, states: Vec<Prediction>) {
            let mut polls = self.polls.lock().unwrap();
            let mut states = states;
            states.reverse();
            polls.insert(id.to_string(), states);
        }
    }

    fn pending(id: &str) -> Prediction {
        prediction(id, PredictionStatus::Processing, None, None)
    }

    fn succeeded(id: &str, url: &str) -> Prediction {
        prediction(id, PredictionStatus::Succeeded, Some(json!(url)), None)
    }

    fn failed(id: &str) -> Prediction {
        prediction(
            id,
            PredictionStatus::Failed,
            None,
            Some(json!("NSFW content detected")),
        )
    }

    fn prediction(
        id: &str,
        status: PredictionStatus,
        output: Option<Value>,
        error: Option<Value>,
    ) -> Prediction {
        serde_json::from_value(json!({
            "id": id,
            "status": status,
            "output": output,
            "error": error,
        }))
        .unwrap()
    }

    #[async_trait]
    impl PredictionApi for ScriptedApi {
        async fn create(&self, model: &str, _input: Value) -> Result<Prediction, MontageError> {
            let ids = self.create_ids.lock().unwrap();
            let id = ids
                .iter()
                .find(|(m, _)| m == model)
                .map(|(_, id)| id.clone())
                .ok_or_else(|| MontageError::Prediction(format!("no job for {model}")))?;
            Ok(pending(&id))
        }

        async fn get(&self, id: &str) -> Result<Prediction, MontageError> {
            let mut polls = self.polls.lock().unwrap();
            let states = polls
                .get_mut(id)
                .ok_or_else(|| MontageError::Prediction(format!("unknown job {id}")))?;
            // Every poll consumes one scripted state; a poll past the end of
            // the script is a test failure.
            states
                .pop()
                .ok_or_else(|| MontageError::Prediction(format!("script exhausted for {id}")))
        }
    }

    /// Scripted judge: always returns the fixed verdict it was built with.
    struct ScriptedJudge {
        verdict: Verdict,
    }

    #[async_trait]
    impl ImageJudge for ScriptedJudge {
        async fn compare_images(&self, _url1: &str, _url2: &str, _prompt: &str) -> Verdict {
            self.verdict.clone()
        }
    }

    fn orchestrator(api: ScriptedApi) -> Orchestrator {
        orchestrator_with_judge(api, crate::services::judge::fallback_verdict())
    }

    fn orchestrator_with_judge(api: ScriptedApi, verdict: Verdict) -> Orchestrator {
        Orchestrator::new(
            Arc::new(api),
            Arc::new(ScriptedJudge { verdict }),
            PathBuf::from("/static"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn single_job_polls_until_success() {
        let api = ScriptedApi::new();
        api.on_create(PRIMARY_MODEL, "job-1");
        api.script(
            "job-1",
            vec![
                pending("job-1"),
                pending("job-1"),
                succeeded("job-1", "https://img.example/out.jpg"),
            ],
        );

        let url = orchestrator(api)
            .enhance("data:image/jpeg;base64,AA", "prompt")
            .await
            .unwrap();
        assert_eq!(url, "https://img.example/out.jpg");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_surfaces_a_prediction_error() {
        let api = ScriptedApi::new();
        api.on_create(PRIMARY_MODEL, "job-1");
        api.script("job-1", vec![failed("job-1")]);

        let err = orchestrator(api)
            .enhance("data:image/jpeg;base64,AA", "prompt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NSFW content detected"));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_success_output_counts_as_failure() {
        let api = ScriptedApi::new();
        api.on_create(PRIMARY_MODEL, "job-1");
        api.script(
            "job-1",
            vec![prediction(
                "job-1",
                PredictionStatus::Succeeded,
                Some(json!(["unexpected", "array"])),
                None,
            )],
        );

        let err = orchestrator(api)
            .enhance("data:image/jpeg;base64,AA", "prompt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No output received"));
    }

    #[tokio::test(start_paused = true)]
    async fn first_failed_second_succeeded_yields_a_synthetic_comparison() {
        let api = ScriptedApi::new();
        api.on_create(PRIMARY_MODEL, "job-a");
        api.on_create(COMPARISON_MODEL, "job-b");
        api.script("job-a", vec![failed("job-a")]);
        api.script(
            "job-b",
            vec![pending("job-b"), succeeded("job-b", "https://img.example/b.jpg")],
        );

        let outcome = orchestrator(api)
            .enhance_pair("data:image/jpeg;base64,AA", "prompt")
            .await
            .unwrap();
        assert_eq!(outcome.winner_url, "https://img.example/b.jpg");
        assert_eq!(outcome.comparison.winner, Winner::Image2);
        assert_eq!((outcome.comparison.score1, outcome.comparison.score2), (0, 8));
        assert_eq!(outcome.comparison.image1_url, None);
        assert_eq!(
            outcome.comparison.image2_url.as_deref(),
            Some("https://img.example/b.jpg")
        );
        assert!(outcome.comparison.reason.contains("first job failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_failed_first_succeeded_is_symmetric() {
        let api = ScriptedApi::new();
        api.on_create(PRIMARY_MODEL, "job-a");
        api.on_create(COMPARISON_MODEL, "job-b");
        api.script(
            "job-a",
            vec![pending("job-a"), succeeded("job-a", "https://img.example/a.jpg")],
        );
        api.script("job-b", vec![failed("job-b")]);

        let outcome = orchestrator(api)
            .enhance_pair("data:image/jpeg;base64,AA", "prompt")
            .await
            .unwrap();
        assert_eq!(outcome.winner_url, "https://img.example/a.jpg");
        assert_eq!(outcome.comparison.winner, Winner::Image1);
        assert_eq!((outcome.comparison.score1, outcome.comparison.score2), (8, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn both_succeeded_winner_follows_the_verdict() {
        let api = ScriptedApi::new();
        api.on_create(PRIMARY_MODEL, "job-a");
        api.on_create(COMPARISON_MODEL, "job-b");
        api.script(
            "job-a",
            vec![succeeded("job-a", "https://img.example/a.jpg")],
        );
        api.script(
            "job-b",
            vec![pending("job-b"), succeeded("job-b", "https://img.example/b.jpg")],
        );

        let verdict = Verdict {
            winner: Winner::Image2,
            reason: "Stronger composition".to_string(),
            score1: 6,
            score2: 9,
        };
        let outcome = orchestrator_with_judge(api, verdict)
            .enhance_pair("data:image/jpeg;base64,AA", "prompt")
            .await
            .unwrap();

        assert_eq!(outcome.winner_url, "https://img.example/b.jpg");
        assert_eq!(outcome.comparison.winner, Winner::Image2);
        assert_eq!((outcome.comparison.score1, outcome.comparison.score2), (6, 9));
        assert_eq!(
            outcome.comparison.image1_url.as_deref(),
            Some("https://img.example/a.jpg")
        );
        assert_eq!(
            outcome.comparison.image2_url.as_deref(),
            Some("https://img.example/b.jpg")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn both_failed_is_a_hard_failure() {
        let api = ScriptedApi::new();
        api.on_create(PRIMARY_MODEL, "job-a");
        api.on_create(COMPARISON_MODEL, "job-b");
        api.script("job-a", vec![failed("job-a")]);
        api.script("job-b", vec![pending("job-b"), failed("job-b")]);

        let err = orchestrator(api)
            .enhance_pair("data:image/jpeg;base64,AA", "prompt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Both generation jobs failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn slower_job_keeps_the_loop_alive_without_repolling_the_finished_one() {
        let api = ScriptedApi::new();
        api.on_create(PRIMARY_MODEL, "job-a");
        api.on_create(COMPARISON_MODEL, "job-b");
        // job-a finishes on the first poll; job-b needs three more ticks.
        // If job-a were polled again the exhausted script would error the
        // whole run.
        api.script("job-a", vec![failed("job-a")]);
        api.script(
            "job-b",
            vec![
                pending("job-b"),
                pending("job-b"),
                pending("job-b"),
                succeeded("job-b", "https://img.example/b.jpg"),
            ],
        );

        let outcome = orchestrator(api)
            .enhance_pair("data:image/jpeg;base64,AA", "prompt")
            .await
            .unwrap();
        assert_eq!(outcome.comparison.winner, Winner::Image2);
    }
}
