use chrono::Utc;
use regex::Regex;
use tracing::info;

use lumos_common::{
    AuthorMention, Claim, ClaimId, Confidence, TranscriptSegment, VerificationStatus,
};

/// Heuristic claim extraction over transcript segments. A segment yields at
/// most one candidate claim; segments matching no heuristic yield nothing.
/// Ordinals are assigned in transcript order and are stable thereafter.
pub struct ClaimExtractor {
    numeric: Regex,
    study: Regex,
    author_etal: Regex,
    author_by_year: Regex,
    author_pair_year: Regex,
    institution: Regex,
}

/// Heuristic signals found in one segment.
struct SegmentSignals {
    numeric_match: Option<String>,
    study: bool,
    author: Option<AuthorMention>,
    institution: Option<String>,
}

impl SegmentSignals {
    fn count(&self) -> usize {
        usize::from(self.numeric_match.is_some())
            + usize::from(self.study)
            + usize::from(self.author.is_some())
            + usize::from(self.institution.is_some())
    }
}

impl ClaimExtractor {
    pub fn new() -> Self {
        Self {
            numeric: Regex::new(
                r"(?i)\b\d+(?:\.\d+)?\s*(?:%|(?:percent(?:age points?)?|million|billion|thousand|times|fold|hours?|years?|days?|minutes?|people|participants|patients)\b)|\b\d{1,3}(?:,\d{3})+\b",
            )
            .expect("valid regex"),
            study: Regex::new(
                r"(?i)\b(?:a (?:new |recent |famous |landmark )?(?:study|paper|meta-analysis|survey)|researchers? (?:at|from|found|showed|estimate)|randomi[sz]ed controlled trial|clinical trial|published in|according to (?:a|the) (?:study|paper|report)|journal of \w+|the lancet|new england journal)\b",
            )
            .expect("valid regex"),
            author_etal: Regex::new(r"\b([A-Z][\w'-]+)\s+et al\.?,?\s*\(?((?:19|20)\d{2})\)?")
                .expect("valid regex"),
            author_by_year: Regex::new(
                r"\b(?:by|of|from)\s+([A-Z][\w'-]+)\s+(?:in|back in)\s+((?:19|20)\d{2})\b",
            )
            .expect("valid regex"),
            author_pair_year: Regex::new(
                r"\b([A-Z][\w-]+)\s+(?:and|&)\s+[A-Z][\w-]+\s+\(?((?:19|20)\d{2})\)?",
            )
            .expect("valid regex"),
            institution: Regex::new(
                r"\b(?:University of [A-Z][\w-]+|[A-Z][\w-]+ University|[A-Z][\w-]+ Institute(?: of [A-Z][\w-]+)?|Institute of [A-Z][\w-]+|Harvard|Stanford|Berkeley|Princeton|Oxford|Cambridge|Yale|MIT|Mayo Clinic|Cleveland Clinic|World Health Organization|WHO|CDC|NIH|FDA|NASA|Pew Research(?: Center)?|RAND Corporation)\b",
            )
            .expect("valid regex"),
        }
    }

    /// Extract candidate claims in transcript order.
    pub fn extract(&self, video_id: &str, segments: &[TranscriptSegment]) -> Vec<Claim> {
        let now = Utc::now();
        let mut claims = Vec::new();

        for segment in segments {
            let signals = self.match_segment(&segment.text);
            let signal_count = signals.count();
            if signal_count == 0 {
                continue;
            }

            let confidence = match signal_count {
                1 => Confidence::Low,
                2 => Confidence::Medium,
                _ => Confidence::High,
            };

            let finding = finding_sentence(&segment.text, signals.numeric_match.as_deref());
            let mut keywords = keyword_terms(&finding);
            // Keep the keyword core free of the specific signals so the
            // broader fallback queries actually broaden.
            if let Some(author) = &signals.author {
                keywords.retain(|k| *k != author.normalized);
            }
            if let Some(institution) = &signals.institution {
                let lowered = institution.to_lowercase();
                keywords.retain(|k| !lowered.contains(k.as_str()));
            }
            let search_query = primary_query(&signals, &keywords);
            let fallback_queries = fallback_queries(&signals, &keywords, &search_query);

            let ordinal = claims.len() as u32;
            claims.push(Claim {
                id: ClaimId::new(video_id, ordinal),
                video_id: video_id.to_string(),
                segment_text: segment.text.clone(),
                word_count: segment.text.split_whitespace().count() as u32,
                author: signals.author,
                institution: signals.institution,
                finding,
                confidence,
                search_query,
                fallback_queries,
                timestamp_seconds: segment.start_time_seconds,
                status: VerificationStatus::Pending,
                result: None,
                created_at: now,
                updated_at: now,
            });
        }

        info!(video_id, count = claims.len(), "Extracted candidate claims");
        claims
    }

    fn match_segment(&self, text: &str) -> SegmentSignals {
        let numeric_match = self.numeric.find(text).map(|m| m.as_str().to_string());
        let study = self.study.is_match(text);

        let author = self
            .author_etal
            .captures(text)
            .or_else(|| self.author_by_year.captures(text))
            .or_else(|| self.author_pair_year.captures(text))
            .map(|caps| author_mention(&caps[1]));

        let institution = self.institution.find(text).map(|m| m.as_str().to_string());

        SegmentSignals {
            numeric_match,
            study,
            author,
            institution,
        }
    }
}

impl Default for ClaimExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn author_mention(raw: &str) -> AuthorMention {
    let normalized: String = raw
        .chars()
        .map(fold_diacritic)
        .collect::<String>()
        .to_lowercase();

    let mut variants = vec![raw.to_string(), raw.to_lowercase()];
    if normalized.contains('-') {
        variants.push(normalized.replace('-', " "));
    }
    variants.retain(|v| *v != normalized);
    variants.sort();
    variants.dedup();

    AuthorMention {
        raw: raw.to_string(),
        normalized,
        variants,
    }
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// The sentence carrying the strongest signal (the numeric match when
/// present), truncated to a query-friendly length.
fn finding_sentence(text: &str, numeric_match: Option<&str>) -> String {
    let sentence = sentences(text)
        .into_iter()
        .find(|s| match numeric_match {
            Some(m) => s.contains(m),
            None => true,
        })
        .unwrap_or(text)
        .trim_end_matches(['.', '?', '!'])
        .trim();

    if sentence.len() <= 200 {
        return sentence.to_string();
    }
    let mut end = 200;
    while !sentence.is_char_boundary(end) {
        end -= 1;
    }
    sentence[..end].to_string()
}

/// Sentence split that survives "et al." and single-letter initials.
/// A terminator only ends a sentence when followed by whitespace plus an
/// uppercase letter and the preceding token isn't an abbreviation.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if !matches!(c, '.' | '?' | '!') {
            continue;
        }
        let rest = &text[i + 1..];
        if !rest.starts_with(|w: char| w.is_whitespace()) {
            continue;
        }
        match rest.trim_start().chars().next() {
            Some(next) if next.is_uppercase() => {}
            _ => continue,
        }
        let prev = text[start..i].split_whitespace().last().unwrap_or("");
        if prev.eq_ignore_ascii_case("al") || prev.chars().count() == 1 {
            continue;
        }
        let sentence = text[start..=i].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = i + 1;
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn keyword_terms(finding: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "and", "that", "this", "with", "from", "they", "there", "their", "have", "has",
        "was", "were", "are", "about", "which", "would", "could", "been", "than", "then", "them",
        "when", "what", "like", "just", "really", "actually", "basically", "you", "know",
    ];
    let mut terms = Vec::new();
    for token in finding.split(|c: char| !c.is_alphanumeric() && c != '%') {
        let term = token.to_lowercase();
        if term.len() > 3 && !STOPWORDS.contains(&term.as_str()) && !terms.contains(&term) {
            terms.push(term);
        }
        if terms.len() >= 8 {
            break;
        }
    }
    terms
}

fn primary_query(signals: &SegmentSignals, keywords: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(author) = &signals.author {
        parts.push(author.normalized.clone());
    }
    if let Some(institution) = &signals.institution {
        parts.push(institution.clone());
    }
    parts.push(keywords.join(" "));
    parts.retain(|p| !p.trim().is_empty());
    parts.join(" ")
}

/// Progressively broader queries: drop the author, then the institution,
/// then fall back to a shortened keyword core.
fn fallback_queries(signals: &SegmentSignals, keywords: &[String], primary: &str) -> Vec<String> {
    let mut queries = Vec::new();

    if signals.author.is_some() {
        if let Some(institution) = &signals.institution {
            queries.push(format!("{} {}", institution, keywords.join(" ")));
        }
    }
    queries.push(keywords.join(" "));
    if keywords.len() > 4 {
        queries.push(keywords[..4].join(" "));
    }

    queries.retain(|q| !q.trim().is_empty() && q != primary);
    queries.dedup();
    queries
}
