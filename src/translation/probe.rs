/*!
 * Capability probe.
 *
 * One short translation request sent before any batch is planned. The result
 * is written as JSON next to the output; a failure stops the run.
 */

use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

use super::core::TranslationService;
use super::prompts::{PromptTemplate, probe_user_prompt};
use crate::errors::AppError;

/// Machine-readable probe result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub ok: bool,
    pub provider: String,
    pub model: String,
    pub target_language: String,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: String,
    pub run_id: Uuid,
}

/// Pre-flight check of the translation provider
pub struct CapabilityProbe<'a> {
    service: &'a TranslationService,
}

impl<'a> CapabilityProbe<'a> {
    pub fn new(service: &'a TranslationService) -> Self {
        Self { service }
    }

    /// Send the probe once, without retries, and write the report.
    pub async fn run(&self, target_language: &str, report_path: &Path, run_id: Uuid) -> Result<ProbeReport, AppError> {
        let started = Instant::now();
        let result = self
            .service
            .complete(PromptTemplate::PROBE_TRANSLATOR, &probe_user_prompt(target_language))
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (sample, failure) = match result {
            Ok(text) if !text.trim().is_empty() => (Some(text.trim().to_string()), None),
            Ok(_) => (None, Some("provider returned an empty reply".to_string())),
            Err(e) => (None, Some(e.to_string())),
        };

        let report = ProbeReport {
            ok: failure.is_none(),
            provider: self.service.provider_name().to_string(),
            model: self.service.model(),
            target_language: target_language.to_string(),
            latency_ms,
            sample,
            error: failure.clone(),
            checked_at: Utc::now().to_rfc3339(),
            run_id,
        };

        let json = serde_json::to_string_pretty(&report).map_err(|e| AppError::File(e.to_string()))?;
        fs::write(report_path, json)
            .map_err(|e| AppError::File(format!("{}: {}", report_path.display(), e)))?;

        match failure {
            None => {
                info!(
                    "{} ({}) answered the probe in {} ms",
                    report.provider, report.model, report.latency_ms
                );
                Ok(report)
            }
            Some(message) => {
                error!("Provider probe failed: {}", message);
                Err(AppError::Precondition(format!(
                    "{} is not usable: {} (see {})",
                    report.provider,
                    message,
                    report_path.display()
                )))
            }
        }
    }
}
