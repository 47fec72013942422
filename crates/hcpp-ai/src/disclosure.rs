//! Per-capability disclosure checks and the overall disclosure label.

use hcpp_core::capability::filter_capabilities;
use hcpp_core::{
    CapabilityAssessment, DisclosureRecord, DisclosureTally, PolicyDocument, Verdict, fields,
};
use hcpp_store::{Collection, Document, DocumentStore, Filter};
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::AiError;
use crate::ollama::LanguageModel;
use crate::prompt;

#[derive(Debug, Clone)]
pub struct DisclosureConfig {
    pub collection: String,
}

/// Ask the model about every segment for one capability.
///
/// All segments are queried even after a Yes. Each Yes response is appended
/// to the evidence. Ambiguous responses and failed calls are logged and count
/// as non-disclosing votes.
pub async fn assess_capability(
    llm: &dyn LanguageModel,
    segments: &[String],
    capability: &str,
) -> CapabilityAssessment {
    let mut disclosed = false;
    let mut evidence = String::new();
    for (idx, segment) in segments.iter().enumerate() {
        let response = match llm.complete(&prompt::rationale(segment, capability)).await {
            Ok(text) => text,
            Err(e) => {
                error!(capability, segment = idx, error = %e, "model call failed");
                continue;
            }
        };
        match Verdict::parse(&response) {
            Verdict::Yes => {
                disclosed = true;
                evidence.push_str(&response);
            }
            Verdict::No => {}
            Verdict::Undetermined => {
                error!(capability, segment = idx, response = %response, "ambiguous response");
            }
        }
    }
    CapabilityAssessment {
        capability: capability.to_string(),
        disclosed,
        evidence,
    }
}

/// Assess every requested capability of one policy.
///
/// Stored capability names are deduplicated and whitelisted first.
pub async fn assess_policy(llm: &dyn LanguageModel, doc: &PolicyDocument) -> DisclosureRecord {
    let segments = doc.pp_segments.as_deref().unwrap_or_default();
    let stored = doc.requested_permissions.as_deref().unwrap_or_default();
    let capabilities = filter_capabilities(stored.iter().map(String::as_str));
    if capabilities.len() != stored.len() {
        warn!(
            package = %doc.package,
            stored = stored.len(),
            kept = capabilities.len(),
            "dropped duplicate or unrecognized capabilities"
        );
    }
    let mut assessments = Vec::with_capacity(capabilities.len());
    for capability in &capabilities {
        let a = assess_capability(llm, segments, capability).await;
        info!(
            package = %doc.package,
            capability = %a.capability,
            disclosed = a.disclosed,
            "capability assessed"
        );
        assessments.push(a);
    }
    DisclosureRecord::from_assessments(doc.package.as_str(), assessments)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisclosureRun {
    pub tally: DisclosureTally,
    pub skipped: usize,
}

fn rationale_fields(record: &DisclosureRecord) -> Document {
    let mut set = Document::new();
    set.insert(fields::RATIONALE_OVERALL.into(), json!(record.overall));
    set.insert(fields::RATIONALE_REASONING.into(), json!(record.reasoning));
    set.insert(fields::RATIONALE_FLAGS.into(), json!(record.flags));
    set
}

/// Analyze every policy that has segments and requested capabilities but no
/// overall label yet, and store the result on the same document.
pub async fn analyze_disclosure(
    store: &dyn DocumentStore,
    llm: &dyn LanguageModel,
    config: &DisclosureConfig,
) -> Result<DisclosureRun, AiError> {
    let docs: Collection<'_, PolicyDocument> = Collection::new(store, &config.collection);
    let candidates = docs.find(
        &Filter::is_array(fields::PP_SEGMENTS).and(Filter::exists(fields::REQUESTED_PERMISSIONS)),
    )?;
    info!(
        candidates = candidates.len(),
        collection = %config.collection,
        model = llm.model_name(),
        "analyzing policy disclosure"
    );

    let mut run = DisclosureRun::default();
    for (idx, (id, doc)) in candidates.into_iter().enumerate() {
        let n = idx + 1;
        if let Some(overall) = doc.rationale_overall {
            info!(n, package = %doc.package, %overall, "skip, already analyzed");
            run.skipped += 1;
            continue;
        }
        info!(
            n,
            package = %doc.package,
            permissions = doc.requested_permissions.as_ref().map_or(0, Vec::len),
            "analyzing"
        );
        let record = assess_policy(llm, &doc).await;
        docs.set_fields(id, rationale_fields(&record))?;
        run.tally.record(record.overall);
        info!(package = %record.package, overall = %record.overall, "stored disclosure");
    }

    if run.tally.total() > 0 {
        info!("{}", run.tally);
    }
    Ok(run)
}

/// Tally the stored overall labels of every analyzed policy.
pub fn disclosure_summary(store: &dyn DocumentStore, collection: &str) -> Result<DisclosureTally, AiError> {
    let docs: Collection<'_, PolicyDocument> = Collection::new(store, collection);
    Ok(docs
        .find(&Filter::exists(fields::RATIONALE_OVERALL))?
        .into_iter()
        .filter_map(|(_, d)| d.rationale_overall)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use async_trait::async_trait;
    use hcpp_core::DisclosureLevel;
    use hcpp_store::MemoryStore;
    use std::sync::Mutex;

    /// Says Yes when the prompt's capability appears in the quoted segment.
    struct KeywordModel {
        calls: Mutex<Vec<String>>,
    }

    impl KeywordModel {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for KeywordModel {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            let capability = prompt
                .split("rationales specific for ")
                .nth(1)
                .and_then(|s| s.split(',').next())
                .unwrap_or_default();
            let segment = prompt
                .split("The quoted sentences are: ")
                .nth(1)
                .and_then(|s| s.split("\n\n").next())
                .unwrap_or_default();
            if segment.contains("FAIL") {
                return Err(LlmError::Server {
                    status: 500,
                    body: "boom".into(),
                });
            }
            if segment.contains("???") {
                return Ok("I cannot tell.".into());
            }
            if segment.contains(capability) {
                Ok(format!("[Yes] {segment}"))
            } else {
                Ok("[No]".into())
            }
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }

    fn segs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn queries_every_segment_and_concatenates_evidence() {
        let llm = KeywordModel::new();
        let segments = segs(&["Steps help goals.", "???", "FAIL", "Steps again."]);
        let a = assess_capability(&llm, &segments, "Steps").await;
        assert!(a.disclosed);
        assert_eq!(a.evidence, "[Yes] Steps help goals.[Yes] Steps again.");
        assert_eq!(llm.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn ambiguous_and_failed_segments_do_not_disclose() {
        let llm = KeywordModel::new();
        let a = assess_capability(&llm, &segs(&["???", "FAIL"]), "Sleep").await;
        assert!(!a.disclosed);
        assert_eq!(a.evidence, "");
    }

    fn policy(package: &str, segments: &[&str], permissions: &[&str]) -> PolicyDocument {
        PolicyDocument {
            requested_permissions: Some(permissions.iter().map(|s| s.to_string()).collect()),
            ..PolicyDocument::with_segments(package, segs(segments))
        }
    }

    #[tokio::test]
    async fn stored_capabilities_are_deduplicated_and_whitelisted() {
        let llm = KeywordModel::new();
        let doc = policy("com.dup", &["We count Steps."], &["Steps", "Bogus", "Steps", "Sleep"]);
        let record = assess_policy(&llm, &doc).await;
        assert_eq!(record.capabilities, ["Steps", "Sleep"]);
        assert_eq!(record.flags, [true, false]);
        assert_eq!(record.overall, DisclosureLevel::Partial);
        assert_eq!(llm.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn labels_policies_and_skips_analyzed_ones() {
        let store = MemoryStore::new();
        let docs: Collection<'_, PolicyDocument> = Collection::new(&store, "RQ3");
        docs.insert(&policy("com.full", &["We use Steps and Sleep."], &["Steps", "Sleep"])).unwrap();
        docs.insert(&policy("com.part", &["We use Steps."], &["Steps", "Sleep"])).unwrap();
        docs.insert(&policy("com.none", &["Nothing here."], &["Steps"])).unwrap();
        docs.insert(&policy("com.empty", &["Nothing here."], &[])).unwrap();
        docs.insert(&PolicyDocument::with_segments("com.noperm", segs(&["x"]))).unwrap();

        let config = DisclosureConfig {
            collection: "RQ3".into(),
        };
        let llm = KeywordModel::new();
        let run = analyze_disclosure(&store, &llm, &config).await.unwrap();
        assert_eq!(run.tally.comprehensive, 1);
        assert_eq!(run.tally.partial, 1);
        assert_eq!(run.tally.non, 2);
        assert_eq!(run.skipped, 0);

        let (_, part) = docs.find_one(&Filter::eq(fields::PACKAGE, "com.part")).unwrap().unwrap();
        assert_eq!(part.rationale_overall, Some(DisclosureLevel::Partial));
        assert_eq!(part.rationale_flags, Some(vec![true, false]));
        assert_eq!(
            part.rationale_reasoning,
            Some(vec!["[Yes] We use Steps.".to_string(), String::new()])
        );

        let calls = llm.calls.lock().unwrap().len();
        let again = analyze_disclosure(&store, &llm, &config).await.unwrap();
        assert_eq!(again.skipped, 4);
        assert_eq!(again.tally.total(), 0);
        assert_eq!(llm.calls.lock().unwrap().len(), calls);

        let summary = disclosure_summary(&store, "RQ3").unwrap();
        assert_eq!(summary, run.tally);
    }
}
