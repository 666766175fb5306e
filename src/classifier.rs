//! Interchangeable classify-and-score strategies with a fixed fallback order.

use crate::error::{AppError, Result};
use crate::llm::{AnalysisRequest, LlmGateway};
use crate::models::LeadCandidate;
use crate::processor::process_results;
use async_trait::async_trait;
use std::time::Duration;

/// Candidates produced by one classifier, plus whatever summary it offers.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Classification {
    pub classifier: &'static str,
    pub candidates: Vec<LeadCandidate>,
    pub summary: Option<String>,
    pub active_searchers: u32,
}

#[async_trait]
pub(crate) trait LeadClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, request: &AnalysisRequest<'_>) -> Result<Classification>;
}

/// Keyword rules; never fails.
pub(crate) struct RuleBasedClassifier;

#[async_trait]
impl LeadClassifier for RuleBasedClassifier {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn classify(&self, request: &AnalysisRequest<'_>) -> Result<Classification> {
        Ok(Classification {
            classifier: self.name(),
            candidates: process_results(request.results),
            summary: None,
            active_searchers: 0,
        })
    }
}

/// The LLM gateway, bounded by a timeout.
pub(crate) struct LlmClassifier {
    gateway: LlmGateway,
    timeout: Duration,
}

impl LlmClassifier {
    pub(crate) fn new(gateway: LlmGateway, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }
}

#[async_trait]
impl LeadClassifier for LlmClassifier {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn classify(&self, request: &AnalysisRequest<'_>) -> Result<Classification> {
        let report = tokio::time::timeout(self.timeout, self.gateway.analyze_leads(request))
            .await
            .map_err(|_| AppError::Timeout("llm"))??;
        Ok(Classification {
            classifier: self.name(),
            candidates: report
                .leads
                .into_iter()
                .map(|lead| lead.into_candidate())
                .filter(|c| !c.company_name.is_empty())
                .collect(),
            summary: Some(report.summary).filter(|s| !s.is_empty()),
            active_searchers: report.active_searchers,
        })
    }
}

/// Tries each classifier in order. An error or an empty answer moves on to
/// the next one; the last classifier's answer is returned as-is.
pub(crate) async fn classify_with_fallback(
    classifiers: &[&dyn LeadClassifier],
    request: &AnalysisRequest<'_>,
) -> Classification {
    let last = classifiers.len().saturating_sub(1);
    for (i, classifier) in classifiers.iter().enumerate() {
        match classifier.classify(request).await {
            Ok(classification) if !classification.candidates.is_empty() || i == last => {
                tracing::info!(target: "classify_task",
                    "{} classifier produced {} candidates",
                    classifier.name(),
                    classification.candidates.len()
                );
                return classification;
            }
            Ok(_) => {
                tracing::warn!(target: "classify_task",
                    "{} classifier found no leads, falling back", classifier.name()
                );
            }
            Err(e) => {
                tracing::warn!(target: "classify_task",
                    "{} classifier failed ({}), falling back", classifier.name(), e
                );
            }
        }
    }
    Classification::default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classify::{State, TargetArea};
    use crate::dedup::tests::candidate;
    use crate::models::SearchResult;

    /// Returns a fixed answer, for exercising the fallback chain.
    pub(crate) struct FixedClassifier {
        pub name: &'static str,
        pub answer: std::result::Result<Vec<LeadCandidate>, &'static str>,
    }

    #[async_trait]
    impl LeadClassifier for FixedClassifier {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn classify(&self, _request: &AnalysisRequest<'_>) -> Result<Classification> {
            match &self.answer {
                Ok(candidates) => Ok(Classification {
                    classifier: self.name,
                    candidates: candidates.clone(),
                    summary: None,
                    active_searchers: 0,
                }),
                Err(_) => Err(AppError::RateLimited("llm")),
            }
        }
    }

    fn request(results: &[SearchResult]) -> AnalysisRequest<'_> {
        AnalysisRequest {
            results,
            area: TargetArea::All,
            min_usage: 5460,
            existing_names: &[],
        }
    }

    fn results() -> Vec<SearchResult> {
        vec![SearchResult {
            title: Some("ABC Sdn Bhd diesel generator Kuantan".to_string()),
            description: Some("genset".to_string()),
            ..Default::default()
        }]
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_rules() {
        let llm = FixedClassifier {
            name: "llm",
            answer: Err("rate limited"),
        };
        let classifiers: [&dyn LeadClassifier; 2] = [&llm, &RuleBasedClassifier];
        let results = results();
        let outcome = classify_with_fallback(&classifiers, &request(&results)).await;
        assert_eq!(outcome.classifier, "rules");
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_answer_falls_back() {
        let llm = FixedClassifier {
            name: "llm",
            answer: Ok(vec![]),
        };
        let classifiers: [&dyn LeadClassifier; 2] = [&llm, &RuleBasedClassifier];
        let results = results();
        let outcome = classify_with_fallback(&classifiers, &request(&results)).await;
        assert_eq!(outcome.classifier, "rules");
    }

    #[tokio::test]
    async fn test_first_useful_answer_wins() {
        let llm = FixedClassifier {
            name: "llm",
            answer: Ok(vec![candidate("Delta Marine Sdn Bhd", State::Sabah)]),
        };
        let classifiers: [&dyn LeadClassifier; 2] = [&llm, &RuleBasedClassifier];
        let results = results();
        let outcome = classify_with_fallback(&classifiers, &request(&results)).await;
        assert_eq!(outcome.classifier, "llm");
        assert_eq!(outcome.candidates[0].company_name, "Delta Marine Sdn Bhd");
    }

    #[tokio::test]
    async fn test_last_classifier_answer_returned_even_if_empty() {
        let classifiers: [&dyn LeadClassifier; 1] = [&RuleBasedClassifier];
        let outcome = classify_with_fallback(&classifiers, &request(&[])).await;
        assert_eq!(outcome.classifier, "rules");
        assert!(outcome.candidates.is_empty());
    }
}
