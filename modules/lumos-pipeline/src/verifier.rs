use chrono::Utc;
use tracing::{debug, info};

use lumos_common::{Claim, SourceRef, Verdict, VerificationResult};

use crate::chain::{ChainOutcome, EvidenceProviderChain};
use crate::providers::term_overlap;

/// Finding-term overlap with a source snippet at or above this fraction
/// counts as corroboration.
const CORROBORATION_THRESHOLD: f32 = 0.4;

/// Phrases in a qualifying source that flip the verdict to refuted.
const CONTRADICTION_CUES: &[&str] = &[
    "no evidence",
    "debunked",
    "false claim",
    "is false",
    "myth",
    "retracted",
    "contrary to",
    "disproven",
    "misleading",
    "did not replicate",
    "failed to replicate",
];

/// Resolves claims to verdicts using the evidence provider chain.
/// Primary query first, then each fallback query in order; terminal claims
/// are never re-verified.
pub struct ClaimVerifier {
    chain: EvidenceProviderChain,
}

impl ClaimVerifier {
    pub fn new(chain: EvidenceProviderChain) -> Self {
        Self { chain }
    }

    /// Verify a claim in place. Idempotent: an already-terminal claim is a
    /// no-op that leaves the stored result untouched and skips providers.
    pub async fn verify(&self, claim: &mut Claim) {
        if claim.status.is_terminal() {
            debug!(claim_id = %claim.id, status = ?claim.status, "Claim already terminal, skipping");
            return;
        }

        let queries: Vec<&str> = std::iter::once(claim.search_query.as_str())
            .chain(claim.fallback_queries.iter().map(String::as_str))
            .collect();

        for query in queries {
            match self.chain.run(query).await {
                ChainOutcome::Evidence { provider, sources } => {
                    let result = assess(&claim.finding, &provider, sources);
                    info!(
                        claim_id = %claim.id,
                        verdict = %result.verdict,
                        provider,
                        "Claim resolved"
                    );
                    claim.resolve(result, Utc::now());
                    return;
                }
                ChainOutcome::NoEvidence => continue,
            }
        }

        info!(claim_id = %claim.id, "No qualifying evidence after all queries");
        claim.resolve(
            VerificationResult {
                verdict: Verdict::Inconclusive,
                reasoning: format!(
                    "No credible source found for \"{}\" after exhausting all search queries and providers.",
                    claim.finding
                ),
                sources: vec![],
                provider: None,
            },
            Utc::now(),
        );
    }
}

/// Derive a verdict from qualifying evidence. The top source decides:
/// a contradiction cue refutes, sufficient finding-term overlap verifies,
/// anything else stays inconclusive with the sources attached.
fn assess(finding: &str, provider: &str, sources: Vec<SourceRef>) -> VerificationResult {
    let Some(top) = sources.first() else {
        return VerificationResult {
            verdict: Verdict::Inconclusive,
            reasoning: "No qualifying source available.".to_string(),
            sources,
            provider: Some(provider.to_string()),
        };
    };
    let haystack = format!("{} {}", top.title, top.snippet).to_lowercase();

    if let Some(cue) = CONTRADICTION_CUES.iter().find(|c| haystack.contains(**c)) {
        return VerificationResult {
            verdict: Verdict::Refuted,
            reasoning: format!(
                "Source \"{}\" contradicts the claim (\"{}\"): \"{}\".",
                top.title, cue, finding
            ),
            sources,
            provider: Some(provider.to_string()),
        };
    }

    let overlap = term_overlap(finding, &haystack);
    if overlap >= CORROBORATION_THRESHOLD {
        return VerificationResult {
            verdict: Verdict::Verified,
            reasoning: format!(
                "Source \"{}\" corroborates the claim ({:.0}% of finding terms matched).",
                top.title,
                overlap * 100.0
            ),
            sources,
            provider: Some(provider.to_string()),
        };
    }

    VerificationResult {
        verdict: Verdict::Inconclusive,
        reasoning: format!(
            "Source \"{}\" was relevant but neither corroborated nor contradicted the claim.",
            top.title
        ),
        sources,
        provider: Some(provider.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, snippet: &str) -> SourceRef {
        SourceRef {
            title: title.to_string(),
            url: "https://example.org/paper".to_string(),
            snippet: snippet.to_string(),
            relevance: 0.9,
        }
    }

    #[test]
    fn assess_verifies_on_overlap() {
        let result = assess(
            "adults sleep less than six hours nightly",
            "openalex",
            vec![source(
                "Sleep duration in adults",
                "Many adults sleep less than six hours nightly according to survey data",
            )],
        );
        assert_eq!(result.verdict, Verdict::Verified);
        assert_eq!(result.provider.as_deref(), Some("openalex"));
    }

    #[test]
    fn assess_refutes_on_contradiction_cue() {
        let result = assess(
            "humans only use ten percent of their brains",
            "crossref",
            vec![source(
                "The ten percent myth",
                "The idea that humans use only ten percent of their brains has been debunked",
            )],
        );
        assert_eq!(result.verdict, Verdict::Refuted);
        assert!(result.reasoning.contains("contradicts"));
    }

    #[test]
    fn assess_inconclusive_when_unrelated() {
        let result = assess(
            "coffee consumption lowers mortality risk",
            "serper",
            vec![source("Gardening tips", "How to grow tomatoes in raised beds")],
        );
        assert_eq!(result.verdict, Verdict::Inconclusive);
    }
}
