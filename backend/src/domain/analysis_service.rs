//! Natural-language analysis of a child's bracelet data.
//!
//! Heart-rate and gyroscope samples in the requested window are thinned to a
//! fixed number of points each, rendered into a plain-text prompt and sent to
//! the completion endpoint. The completion text is returned verbatim.

use chrono::{Duration, Utc};
use shared::{AnalysisResponse, GyroscopeData, HeartRateData, User};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::child_service::ChildService;
use crate::domain::errors::{GuardianError, Result};
use crate::platform::TextCompletion;
use crate::storage::repositories::{TelemetryRepository, TimeWindow};

/// Days of history analysed when the request leaves the window open
pub const DEFAULT_ANALYSIS_DAYS: i64 = 30;
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NO_DATA: &str = "No data available.";

/// Keep every `step`-th item, where `step = max(len / sample_size, 1)`, then
/// keep the last `sample_size` of those
pub fn sample_evenly<T: Clone>(items: &[T], sample_size: usize) -> Vec<T> {
    if sample_size == 0 {
        return Vec::new();
    }
    let step = (items.len() / sample_size).max(1);
    let kept: Vec<T> = items.iter().step_by(step).cloned().collect();
    let skip = kept.len().saturating_sub(sample_size);
    kept.into_iter().skip(skip).collect()
}

pub fn format_heart_rate(samples: &[HeartRateData]) -> String {
    let mut out = String::new();
    for sample in samples {
        let _ = writeln!(
            out,
            "Time: {}, BPM: {}",
            sample.timestamp.format(TIME_FORMAT),
            sample.heart_rate_bpm
        );
    }
    out
}

pub fn format_gyroscope(samples: &[GyroscopeData]) -> String {
    let mut out = String::new();
    for sample in samples {
        let _ = writeln!(
            out,
            "Time: {}, X: {:.2}, Y: {:.2}, Z: {:.2}",
            sample.timestamp.format(TIME_FORMAT),
            sample.value.x,
            sample.value.y,
            sample.value.z
        );
    }
    out
}

/// Wording for the analysed period, as it appears in the prompt
pub fn describe_window(window: &TimeWindow) -> String {
    match (window.start, window.end) {
        (Some(start), Some(end)) => format!(
            "the period from {} to {}",
            start.format(TIME_FORMAT),
            end.format(TIME_FORMAT)
        ),
        (Some(start), None) => format!("the period since {}", start.format(TIME_FORMAT)),
        (None, Some(end)) => format!("the period up to {}", end.format(TIME_FORMAT)),
        (None, None) => "all recorded history".to_string(),
    }
}

pub fn build_prompt(child_name: &str, period: &str, heart_rate: &str, gyroscope: &str) -> String {
    let or_none = |section: &str| {
        if section.trim().is_empty() {
            NO_DATA.to_string()
        } else {
            section.trim_end().to_string()
        }
    };

    format!(
        "You are a data analyst specialised in autistic children. Your task is to analyse biometric and \
movement information and offer clear observations and recommendations.

You have received the following data covering {period} for the child named \"{name}\":

===== HEART RATE DATA (BPM) =====
{heart}

===== GYROSCOPE DATA (X, Y, Z) =====
{gyro}

Please provide a structured analysis covering:

1. Recurring patterns and trends:
- How BPM behaves over the day or in specific situations.
- Repeated movements in the gyroscope data and their intensity.

2. Significant events:
- Indicators of stress, overload or calm.

3. Correlations:
- Relationship between heart rate and movement.

4. Predictions:
- Which behaviours are most likely in the future.

5. Practical recommendations:
- Useful strategies for caregivers or therapists.
- Which additional data would be useful going forward.

IMPORTANT:
- Write clearly, professionally and with empathy.
- Do NOT use bold, Markdown or symbols such as \"**\", \"#\", \"*\".
- Use plain text only, with titles and line breaks where needed.",
        period = period,
        name = child_name,
        heart = or_none(heart_rate),
        gyro = or_none(gyroscope),
    )
}

#[derive(Clone)]
pub struct AnalysisService {
    children: ChildService,
    telemetry: TelemetryRepository,
    completion: Option<Arc<dyn TextCompletion>>,
    sample_size: usize,
}

impl AnalysisService {
    pub fn new(
        children: ChildService,
        telemetry: TelemetryRepository,
        completion: Option<Arc<dyn TextCompletion>>,
        sample_size: usize,
    ) -> Self {
        Self {
            children,
            telemetry,
            completion,
            sample_size,
        }
    }

    pub async fn analyze(&self, guardian: &User, child_id: &str, window: TimeWindow) -> Result<AnalysisResponse> {
        let profile = self.children.owned_profile(guardian, child_id).await?;
        let (window, period) = match (window.start, window.end) {
            (None, None) => {
                let end = Utc::now();
                let window = TimeWindow::new(Some(end - Duration::days(DEFAULT_ANALYSIS_DAYS)), Some(end));
                (window, format!("the last {} days", DEFAULT_ANALYSIS_DAYS))
            }
            _ => (window, describe_window(&window)),
        };

        let heart = self.telemetry.heart_rate_in(&guardian.user_id, child_id, window).await?;
        let gyro = self.telemetry.gyroscope_in(&guardian.user_id, child_id, window).await?;
        if heart.is_empty() && gyro.is_empty() {
            return Err(GuardianError::Validation("no sensor data available for analysis".to_string()));
        }

        let completion = self
            .completion
            .as_ref()
            .ok_or_else(|| GuardianError::Unavailable("text analysis is not configured".to_string()))?;

        let prompt = build_prompt(
            &profile.name,
            &period,
            &format_heart_rate(&sample_evenly(&heart, self.sample_size)),
            &format_gyroscope(&sample_evenly(&gyro, self.sample_size)),
        );
        info!(
            "Requesting analysis for child {} ({} heart rate, {} gyroscope samples)",
            child_id,
            heart.len(),
            gyro.len()
        );

        let analysis = completion.complete(&prompt).await.map_err(|e| {
            error!("Analysis request failed for child {}: {}", child_id, e);
            GuardianError::Unavailable(format!("analysis request failed: {}", e))
        })?;

        Ok(AnalysisResponse {
            child_id: child_id.to_string(),
            analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seed_associated, TestStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use shared::GyroscopeValues;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedCompletion {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextCompletion for ScriptedCompletion {
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Heart rate stayed in a calm range.".to_string())
        }
    }

    #[test]
    fn test_sample_evenly() {
        let items: Vec<u32> = (0..250).collect();
        let sampled = sample_evenly(&items, 100);
        // step 2 keeps 125 even numbers, of which the last 100 remain
        assert_eq!(sampled.len(), 100);
        assert_eq!(sampled[0], 50);
        assert_eq!(sampled[99], 248);

        let few: Vec<u32> = (0..7).collect();
        assert_eq!(sample_evenly(&few, 100), few);
        assert!(sample_evenly::<u32>(&[], 100).is_empty());
    }

    #[test]
    fn test_line_formats() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 5).unwrap();
        assert_eq!(
            format_heart_rate(&[HeartRateData::new(ts, 92)]),
            "Time: 2024-05-01 14:30:05, BPM: 92\n"
        );
        let gyro = GyroscopeData::new(ts, GyroscopeValues { x: 0.123, y: -1.0, z: 2.5 });
        assert_eq!(
            format_gyroscope(&[gyro]),
            "Time: 2024-05-01 14:30:05, X: 0.12, Y: -1.00, Z: 2.50\n"
        );
    }

    #[test]
    fn test_prompt_marks_missing_sections() {
        let prompt = build_prompt("Leo", "the last 30 days", "Time: x, BPM: 90\n", "");
        assert!(prompt.contains("covering the last 30 days for the child named \"Leo\""));
        assert!(prompt.contains("Time: x, BPM: 90\n\n===== GYROSCOPE DATA"));
        assert!(prompt.contains("(X, Y, Z) =====\nNo data available."));
    }

    #[tokio::test]
    async fn test_analyze_sends_prompt_and_returns_text() {
        let store = TestStore::sqlite().await;
        let (guardian, child) = seed_associated(&store).await;
        store
            .telemetry
            .add_heart_rate(&guardian.user_id, &child.user_id, &HeartRateData::new(Utc::now(), 101))
            .await
            .unwrap();

        let completion = Arc::new(ScriptedCompletion::default());
        let service = AnalysisService::new(
            store.child_service(),
            store.telemetry.clone(),
            Some(completion.clone()),
            DEFAULT_SAMPLE_SIZE,
        );

        let response = service.analyze(&guardian, &child.user_id, TimeWindow::default()).await.unwrap();
        assert_eq!(response.analysis, "Heart rate stayed in a calm range.");

        let prompts = completion.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("BPM: 101"));
        assert!(prompts[0].contains("covering the last 30 days"));
    }

    #[tokio::test]
    async fn test_prompt_names_explicit_window() {
        let store = TestStore::sqlite().await;
        let (guardian, child) = seed_associated(&store).await;
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap();
        store
            .telemetry
            .add_heart_rate(&guardian.user_id, &child.user_id, &HeartRateData::new(start + Duration::days(2), 97))
            .await
            .unwrap();

        let completion = Arc::new(ScriptedCompletion::default());
        let service = AnalysisService::new(
            store.child_service(),
            store.telemetry.clone(),
            Some(completion.clone()),
            DEFAULT_SAMPLE_SIZE,
        );
        service
            .analyze(&guardian, &child.user_id, TimeWindow::new(Some(start), Some(end)))
            .await
            .unwrap();

        let prompts = completion.prompts.lock().unwrap();
        assert!(prompts[0].contains("covering the period from 2024-03-01 00:00:00 to 2024-03-08 00:00:00 for"));
        assert!(!prompts[0].contains("last 30 days"));
    }

    #[test]
    fn test_describe_open_windows() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(describe_window(&TimeWindow::new(Some(at), None)), "the period since 2024-03-01 09:00:00");
        assert_eq!(describe_window(&TimeWindow::new(None, Some(at))), "the period up to 2024-03-01 09:00:00");
    }

    #[tokio::test]
    async fn test_analyze_error_cases() {
        let store = TestStore::sqlite().await;
        let (guardian, child) = seed_associated(&store).await;
        let service = AnalysisService::new(store.child_service(), store.telemetry.clone(), None, DEFAULT_SAMPLE_SIZE);

        assert!(matches!(
            service.analyze(&guardian, &child.user_id, TimeWindow::default()).await,
            Err(GuardianError::Validation(_))
        ));

        store
            .telemetry
            .add_heart_rate(&guardian.user_id, &child.user_id, &HeartRateData::new(Utc::now(), 88))
            .await
            .unwrap();
        assert!(matches!(
            service.analyze(&guardian, &child.user_id, TimeWindow::default()).await,
            Err(GuardianError::Unavailable(_))
        ));
    }
}
