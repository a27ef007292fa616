//! Role-aware retrieval and ranking.
//!
//! The ranking algorithm operates entirely through the [`Store`] trait
//! with no database or configuration dependencies. The caller embeds the
//! query, builds [`RankingParams`], and passes a store implementation.
//!
//! # Algorithm
//!
//! 1. Fetch the `candidate_window` most recent chunks of the tenant.
//! 2. Drop chunks whose `allowed_roles` does not contain the caller's role.
//!    Nothing below ever sees an invisible chunk.
//! 3. **Document-type hint**: if the query names a known document type
//!    (medical, maternity, appraisal, ...), restrict to chunks whose doc id
//!    or text mentions it, provided at least `type_hint_min_pool` remain.
//! 4. **Document-identity hint**: if query tokens pick out 1 to
//!    `identity_max_docs` doc ids, restrict to those documents when the
//!    restricted pool is still large enough.
//! 5. Score: `cosine(query, chunk) + min(cap, per_token × lexical hits)`.
//! 6. Pick the dominant document: highest score sum among the top
//!    `dominant_top_n` scored chunks.
//! 7. Threshold filter, favouring the dominant document.
//! 8. Maximal Marginal Relevance selection seeded with the dominant
//!    document's best chunk.
//! 9. Append dominant-document chunks while the result is short of
//!    `top_k`, until they make up at least half of it. MMR picks stay.
//! 10. Confidence = score of the first selected chunk, clamped to `[0, 1]`.
//!
//! All ordering ties are broken deterministically (chunk id ascending,
//! doc id ascending, earlier position first).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::Result;
use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Role};
use crate::store::Store;

/// Ranking tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingParams {
    /// Number of most recent tenant chunks considered per query.
    pub candidate_window: usize,
    /// Default result size when the caller does not specify one.
    pub top_k: usize,
    /// Absolute relevance floor.
    pub min_score: f32,
    /// Maximum distance below the top score when no dominant document applies.
    pub spread: f32,
    /// Maximum distance below the top score for non-dominant chunks.
    pub other_doc_margin: f32,
    /// MMR trade-off: `λ·relevance − (1−λ)·redundancy`.
    pub mmr_lambda: f32,
    pub lexical_boost_per_token: f32,
    pub lexical_boost_cap: f32,
    /// How many top-scored chunks vote for the dominant document.
    pub dominant_top_n: usize,
    /// Minimum pool size for the document-type restriction to apply.
    pub type_hint_min_pool: usize,
    /// Maximum number of documents the identity hint may narrow to.
    pub identity_max_docs: usize,
    /// Restricted pool size that always satisfies the identity hint.
    pub identity_min_pool: usize,
}

impl Default for RankingParams {
    fn default() -> Self {
        Self {
            candidate_window: 2000,
            top_k: 8,
            min_score: 0.3,
            spread: 0.25,
            other_doc_margin: 0.15,
            mmr_lambda: 0.7,
            lexical_boost_per_token: 0.02,
            lexical_boost_cap: 0.15,
            dominant_top_n: 30,
            type_hint_min_pool: 5,
            identity_max_docs: 3,
            identity_min_pool: 10,
        }
    }
}

/// A cluster of keywords that identifies a document type.
#[derive(Debug, Clone, Copy)]
pub struct DocTypeCluster {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

/// Known document types. Multi-word keywords match consecutive query tokens.
pub const DOC_TYPE_CLUSTERS: &[DocTypeCluster] = &[
    DocTypeCluster {
        name: "medical",
        keywords: &["medical", "illness", "sick", "sickness", "health"],
    },
    DocTypeCluster {
        name: "maternity",
        keywords: &["maternity", "pregnancy", "pregnant", "delivery", "childbirth"],
    },
    DocTypeCluster {
        name: "paternity",
        keywords: &["paternity", "new father", "newborn"],
    },
    DocTypeCluster {
        name: "leave",
        keywords: &["annual leave", "casual leave", "earned leave", "vacation", "paid time off", "pto"],
    },
    DocTypeCluster {
        name: "appraisal",
        keywords: &["appraisal", "performance", "review", "evaluation"],
    },
    DocTypeCluster {
        name: "work_hours",
        keywords: &[
            "work hours",
            "working hours",
            "hours adherence",
            "attendance",
            "shift hours",
            "office hours",
            "timing policy",
        ],
    },
    DocTypeCluster {
        name: "payroll",
        keywords: &["payroll", "salary", "payslip", "compensation", "reimbursement"],
    },
    DocTypeCluster {
        name: "remote_work",
        keywords: &["remote work", "work from home", "wfh", "hybrid work"],
    },
];

/// Query tokens ignored by the identity hint. Generic HR words are listed
/// because they appear in most doc ids.
const IDENTITY_STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "what", "how", "many", "much", "does", "did", "can", "who",
    "when", "where", "which", "with", "about", "from", "that", "this", "have", "has", "our", "your",
    "you", "tell", "days", "policy", "policies", "document", "please",
];

/// Inputs for a single retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalRequest<'a> {
    pub tenant_id: &'a str,
    pub role: &'a Role,
    pub query: &'a str,
    /// Pre-computed query embedding.
    pub query_vec: &'a [f32],
    pub top_k: usize,
}

/// A chunk paired with its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ordered selection plus confidence.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
    /// In `[0, 1]`; `0.0` if and only if `chunks` is empty.
    pub confidence: f32,
}

impl RetrievalResult {
    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.chunk.id.clone()).collect()
    }
}

/// Pool sizes and decisions taken at each ranking step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankingTrace {
    pub fetched: usize,
    pub visible: usize,
    pub type_hints: Vec<String>,
    pub type_hint_applied: bool,
    pub identity_docs: Vec<String>,
    pub identity_hint_applied: bool,
    pub scored: usize,
    pub dominant_doc: Option<String>,
    pub top_score: Option<f32>,
    pub above_threshold: usize,
    pub selected: usize,
    pub backfilled: usize,
}

/// Fetch candidates from `store` and rank them.
///
/// An empty visible set is not an error: it produces an empty result
/// with confidence `0.0`.
pub async fn retrieve<S: Store + ?Sized>(
    store: &S,
    req: &RetrievalRequest<'_>,
    params: &RankingParams,
) -> Result<(RetrievalResult, RankingTrace)> {
    let candidates = store
        .recent_chunks(req.tenant_id, params.candidate_window)
        .await?;
    Ok(rank(candidates, req, params))
}

/// Rank an already-fetched candidate set. Pure and deterministic.
pub fn rank(
    candidates: Vec<Chunk>,
    req: &RetrievalRequest<'_>,
    params: &RankingParams,
) -> (RetrievalResult, RankingTrace) {
    let mut trace = RankingTrace {
        fetched: candidates.len(),
        ..Default::default()
    };

    let visible: Vec<Chunk> = candidates
        .into_iter()
        .filter(|c| c.tenant_id == req.tenant_id && c.visible_to(req.role))
        .collect();
    trace.visible = visible.len();
    if visible.is_empty() || req.top_k == 0 {
        return (RetrievalResult::default(), trace);
    }

    let tokens = tokenize(req.query);

    let type_hints = detect_doc_types(&tokens);
    trace.type_hints = type_hints.clone();
    let pool = if type_hints.is_empty() {
        visible
    } else {
        let restricted: Vec<Chunk> = visible
            .iter()
            .filter(|c| mentions_any(c, &type_hints))
            .cloned()
            .collect();
        if restricted.len() >= params.type_hint_min_pool {
            trace.type_hint_applied = true;
            restricted
        } else {
            visible
        }
    };

    let identity_docs = match_doc_identities(&tokens, &pool);
    trace.identity_docs = identity_docs.iter().cloned().collect();
    let pool = if !identity_docs.is_empty() && identity_docs.len() <= params.identity_max_docs {
        let restricted: Vec<Chunk> = pool
            .iter()
            .filter(|c| identity_docs.contains(&c.doc_id))
            .cloned()
            .collect();
        if restricted.len() * 2 >= pool.len() || restricted.len() >= params.identity_min_pool {
            trace.identity_hint_applied = true;
            restricted
        } else {
            pool
        }
    } else {
        pool
    };

    let distinct_tokens: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
    let mut scored: Vec<ScoredChunk> = pool
        .into_iter()
        .map(|chunk| {
            let score = score_chunk(&chunk, req.query_vec, &distinct_tokens, params);
            ScoredChunk { chunk, score }
        })
        .collect();
    scored.sort_by(by_score_then_id);
    trace.scored = scored.len();

    let dominant = dominant_doc(&scored, params.dominant_top_n);
    trace.dominant_doc = dominant.clone();
    let top_score = scored.first().map(|s| s.score);
    trace.top_score = top_score;

    let filtered = threshold_filter(&scored, dominant.as_deref(), params);
    trace.above_threshold = filtered.len();

    let mut selected = mmr_select(&filtered, dominant.as_deref(), req.top_k, params.mmr_lambda);
    trace.selected = selected.len();

    if let Some(dom) = dominant.as_deref() {
        trace.backfilled = backfill_dominant(&mut selected, &scored, dom, req.top_k);
    }

    let confidence = selected
        .first()
        .map(|s| s.score.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    (
        RetrievalResult {
            chunks: selected,
            confidence,
        },
        trace,
    )
}

/// Lowercase alphanumeric runs, in query order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Names and matched keywords of every document type the query mentions.
///
/// The returned list holds each matched cluster name (with `_` read as a
/// space) followed by the query keywords that triggered it.
pub fn detect_doc_types(tokens: &[String]) -> Vec<String> {
    let joined = format!(" {} ", tokens.join(" "));
    let mut hints = Vec::new();
    for cluster in DOC_TYPE_CLUSTERS {
        let matched: Vec<&str> = cluster
            .keywords
            .iter()
            .copied()
            .filter(|kw| joined.contains(&format!(" {kw} ")))
            .collect();
        if matched.is_empty() {
            continue;
        }
        push_unique(&mut hints, cluster.name.replace('_', " "));
        for kw in matched {
            push_unique(&mut hints, kw.to_string());
        }
    }
    hints
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn normalize_doc_id(doc_id: &str) -> String {
    doc_id.to_lowercase().replace(['_', '-'], " ")
}

fn mentions_any(chunk: &Chunk, keywords: &[String]) -> bool {
    let doc_id = normalize_doc_id(&chunk.doc_id);
    let text = chunk.text.to_lowercase();
    keywords
        .iter()
        .any(|kw| doc_id.contains(kw.as_str()) || text.contains(kw.as_str()))
}

/// Doc ids in `pool` whose identifier contains a significant query token
/// or a long-enough prefix of one.
fn match_doc_identities(tokens: &[String], pool: &[Chunk]) -> BTreeSet<String> {
    let needles: Vec<String> = tokens
        .iter()
        .filter(|t| t.chars().count() >= 3 && !IDENTITY_STOPWORDS.contains(&t.as_str()))
        .flat_map(|t| {
            let len = t.chars().count();
            let mut needles = vec![t.clone()];
            if len > 4 {
                let prefix_len = (len - 2).max(5).min(len);
                let prefix: String = t.chars().take(prefix_len).collect();
                if prefix != *t {
                    needles.push(prefix);
                }
            }
            needles
        })
        .collect();
    if needles.is_empty() {
        return BTreeSet::new();
    }

    let doc_ids: BTreeSet<&str> = pool.iter().map(|c| c.doc_id.as_str()).collect();
    doc_ids
        .into_iter()
        .filter(|doc_id| {
            let id = doc_id.to_lowercase();
            needles.iter().any(|p| id.contains(p.as_str()))
        })
        .map(str::to_string)
        .collect()
}

fn score_chunk(
    chunk: &Chunk,
    query_vec: &[f32],
    tokens: &BTreeSet<&str>,
    params: &RankingParams,
) -> f32 {
    let similarity = cosine_similarity(query_vec, &chunk.embedding);
    let text = chunk.text.to_lowercase();
    let hits = tokens.iter().filter(|t| text.contains(**t)).count();
    let boost = (params.lexical_boost_per_token * hits as f32).min(params.lexical_boost_cap);
    similarity + boost
}

fn by_score_then_id(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

/// Document with the highest score sum among the top `top_n` of `scored`.
///
/// `scored` must already be sorted. Ties go to the smaller doc id.
fn dominant_doc(scored: &[ScoredChunk], top_n: usize) -> Option<String> {
    let mut sums: BTreeMap<&str, f32> = BTreeMap::new();
    for s in scored.iter().take(top_n) {
        *sums.entry(s.chunk.doc_id.as_str()).or_insert(0.0) += s.score;
    }
    let mut best: Option<(&str, f32)> = None;
    // BTreeMap iterates doc ids ascending, so a strict comparison keeps the smallest on ties.
    for (doc_id, sum) in sums {
        if best.map_or(true, |(_, b)| sum > b) {
            best = Some((doc_id, sum));
        }
    }
    best.map(|(doc_id, _)| doc_id.to_string())
}

fn threshold_filter(
    scored: &[ScoredChunk],
    dominant: Option<&str>,
    params: &RankingParams,
) -> Vec<ScoredChunk> {
    let Some(top_score) = scored.iter().map(|s| s.score).reduce(f32::max) else {
        return Vec::new();
    };
    let dominant_top = dominant.and_then(|dom| {
        scored
            .iter()
            .filter(|s| s.chunk.doc_id == dom)
            .map(|s| s.score)
            .reduce(f32::max)
    });

    let mut seen = HashSet::new();
    let mut kept: Vec<ScoredChunk> = match (dominant, dominant_top) {
        (Some(dom), Some(dom_top)) if dom_top > params.min_score => {
            let other_floor = params.min_score.max(top_score - params.other_doc_margin);
            scored
                .iter()
                .filter(|s| {
                    if s.chunk.doc_id == dom {
                        s.score >= params.min_score
                    } else {
                        s.score >= other_floor
                    }
                })
                .cloned()
                .collect()
        }
        _ => {
            let floor = params.min_score.max(top_score - params.spread);
            scored.iter().filter(|s| s.score >= floor).cloned().collect()
        }
    };
    kept.retain(|s| seen.insert(s.chunk.id.clone()));
    kept.sort_by(by_score_then_id);
    kept
}

/// Maximal Marginal Relevance over `candidates` (sorted by score).
fn mmr_select(
    candidates: &[ScoredChunk],
    dominant: Option<&str>,
    top_k: usize,
    lambda: f32,
) -> Vec<ScoredChunk> {
    let mut picked: Vec<usize> = Vec::new();
    let mut taken = vec![false; candidates.len()];

    if top_k == 0 {
        return Vec::new();
    }

    if let Some(dom) = dominant {
        if let Some(seed) = candidates.iter().position(|c| c.chunk.doc_id == dom) {
            picked.push(seed);
            taken[seed] = true;
        }
    }

    while picked.len() < top_k {
        let mut best: Option<(usize, f32)> = None;
        for (i, cand) in candidates.iter().enumerate() {
            if taken[i] {
                continue;
            }
            let redundancy = picked
                .iter()
                .map(|&j| cosine_similarity(&cand.chunk.embedding, &candidates[j].chunk.embedding))
                .fold(None, |acc: Option<f32>, sim| Some(acc.map_or(sim, |a| a.max(sim))))
                .unwrap_or(0.0);
            let mmr = lambda * cand.score - (1.0 - lambda) * redundancy;
            if best.map_or(true, |(_, b)| mmr > b) {
                best = Some((i, mmr));
            }
        }
        let Some((i, _)) = best else { break };
        picked.push(i);
        taken[i] = true;
    }

    picked.into_iter().map(|i| candidates[i].clone()).collect()
}

/// Raise the share of `dominant` in `selected` towards `ceil(top_k / 2)`.
///
/// Appends unselected dominant chunks from `scored` (sorted, highest first)
/// only while the selection is below `top_k`. Picks already made by MMR are
/// never removed, so a full selection is left untouched. Returns how many
/// chunks were added.
fn backfill_dominant(
    selected: &mut Vec<ScoredChunk>,
    scored: &[ScoredChunk],
    dominant: &str,
    top_k: usize,
) -> usize {
    if selected.is_empty() {
        return 0;
    }
    let floor = top_k.div_ceil(2);
    let mut dominant_count = selected
        .iter()
        .filter(|s| s.chunk.doc_id == dominant)
        .count();

    let chosen: HashSet<String> = selected.iter().map(|s| s.chunk.id.clone()).collect();
    let mut added = 0;
    for extra in scored
        .iter()
        .filter(|s| s.chunk.doc_id == dominant && !chosen.contains(&s.chunk.id))
    {
        if dominant_count >= floor || selected.len() >= top_k {
            break;
        }
        selected.push(extra.clone());
        dominant_count += 1;
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hash_embedding;
    use crate::models::Confidentiality;
    use crate::store::memory::InMemoryStore;

    fn role(r: &str) -> Role {
        Role::parse(r).unwrap()
    }

    fn chunk(id: &str, doc: &str, text: &str, embedding: Vec<f32>, roles: &[&str]) -> Chunk {
        Chunk {
            id: id.to_string(),
            tenant_id: "acme".to_string(),
            doc_id: doc.to_string(),
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
            embedding,
            allowed_roles: roles.iter().map(|r| role(r)).collect(),
            confidentiality: Confidentiality::Internal,
            pii_flags: Vec::new(),
            created_at: 0,
        }
    }

    fn request<'a>(role: &'a Role, query: &'a str, qv: &'a [f32], top_k: usize) -> RetrievalRequest<'a> {
        RetrievalRequest {
            tenant_id: "acme",
            role,
            query,
            query_vec: qv,
            top_k,
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("How many DAYS of medical-leave?"),
            vec!["how", "many", "days", "of", "medical", "leave"]
        );
        assert!(tokenize("  ?! ").is_empty());
    }

    #[test]
    fn test_detect_doc_types_multiword_and_boundaries() {
        let hints = detect_doc_types(&tokenize("what are the office hours"));
        assert_eq!(hints, vec!["work hours", "office hours"]);
        // "sickle" must not trigger "sick"
        assert!(detect_doc_types(&tokenize("sickle cell")).is_empty());
        let hints = detect_doc_types(&tokenize("maternity leave"));
        assert_eq!(hints, vec!["maternity"]);
    }

    #[test]
    fn test_rbac_filter_before_scoring() {
        let q = vec![1.0, 0.0];
        let chunks = vec![chunk("c1", "salary_bands", "salary bands", vec![1.0, 0.0], &["hr"])];
        let employee = role("employee");
        let (result, trace) = rank(chunks, &request(&employee, "salary bands", &q, 8), &RankingParams::default());
        assert!(result.chunks.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(trace.visible, 0);
    }

    #[test]
    fn test_other_tenant_chunks_never_selected() {
        let q = vec![1.0, 0.0];
        let mut foreign = chunk("c2", "handbook", "handbook", vec![1.0, 0.0], &["hr"]);
        foreign.tenant_id = "globex".to_string();
        let chunks = vec![chunk("c1", "handbook", "handbook", vec![1.0, 0.0], &["hr"]), foreign];
        let hr = role("hr");
        let (result, _) = rank(chunks, &request(&hr, "handbook", &q, 8), &RankingParams::default());
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].chunk.tenant_id, "acme");
    }

    #[test]
    fn test_dominant_doc_tie_breaks_on_doc_id() {
        let scored = vec![
            ScoredChunk { chunk: chunk("a", "zeta", "", vec![], &["hr"]), score: 0.5 },
            ScoredChunk { chunk: chunk("b", "alpha", "", vec![], &["hr"]), score: 0.5 },
        ];
        assert_eq!(dominant_doc(&scored, 30).as_deref(), Some("alpha"));
        assert_eq!(dominant_doc(&[], 30), None);
    }

    #[test]
    fn test_threshold_keeps_only_close_other_docs() {
        let params = RankingParams::default();
        let scored = vec![
            ScoredChunk { chunk: chunk("a", "dom", "", vec![], &["hr"]), score: 0.9 },
            ScoredChunk { chunk: chunk("b", "dom", "", vec![], &["hr"]), score: 0.35 },
            ScoredChunk { chunk: chunk("c", "other", "", vec![], &["hr"]), score: 0.8 },
            ScoredChunk { chunk: chunk("d", "other", "", vec![], &["hr"]), score: 0.7 },
            ScoredChunk { chunk: chunk("e", "dom", "", vec![], &["hr"]), score: 0.2 },
        ];
        let kept = threshold_filter(&scored, Some("dom"), &params);
        let ids: Vec<&str> = kept.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_threshold_without_dominant_uses_spread() {
        let params = RankingParams::default();
        let scored = vec![
            ScoredChunk { chunk: chunk("a", "x", "", vec![], &["hr"]), score: 0.9 },
            ScoredChunk { chunk: chunk("b", "y", "", vec![], &["hr"]), score: 0.66 },
            ScoredChunk { chunk: chunk("c", "z", "", vec![], &["hr"]), score: 0.6 },
        ];
        let kept = threshold_filter(&scored, None, &params);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_mmr_prefers_diverse_chunk() {
        let candidates = vec![
            ScoredChunk { chunk: chunk("a", "d", "", vec![1.0, 0.0], &["hr"]), score: 0.9 },
            ScoredChunk { chunk: chunk("b", "d", "", vec![1.0, 0.0], &["hr"]), score: 0.85 },
            ScoredChunk { chunk: chunk("c", "e", "", vec![0.0, 1.0], &["hr"]), score: 0.8 },
        ];
        let picked = mmr_select(&candidates, Some("d"), 2, 0.7);
        let ids: Vec<&str> = picked.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_mmr_ties_go_to_earlier_position() {
        let candidates = vec![
            ScoredChunk { chunk: chunk("a", "d", "", vec![1.0, 0.0], &["hr"]), score: 0.5 },
            ScoredChunk { chunk: chunk("b", "d", "", vec![1.0, 0.0], &["hr"]), score: 0.5 },
        ];
        let picked = mmr_select(&candidates, None, 1, 0.7);
        assert_eq!(picked[0].chunk.id, "a");
    }

    /// Unit vector whose cosine with `[1, 0]` is `c`.
    fn at_cosine(c: f32) -> Vec<f32> {
        vec![c, (1.0 - c * c).sqrt()]
    }

    #[test]
    fn test_backfill_appends_below_top_k() {
        let mut selected = vec![
            ScoredChunk { chunk: chunk("d1", "dom", "", vec![], &["hr"]), score: 0.9 },
            ScoredChunk { chunk: chunk("o1", "other", "", vec![], &["hr"]), score: 0.8 },
        ];
        let scored = vec![
            selected[0].clone(),
            selected[1].clone(),
            ScoredChunk { chunk: chunk("d2", "dom", "", vec![], &["hr"]), score: 0.4 },
            ScoredChunk { chunk: chunk("d3", "dom", "", vec![], &["hr"]), score: 0.1 },
        ];
        let added = backfill_dominant(&mut selected, &scored, "dom", 4);
        assert_eq!(added, 1);
        let ids: Vec<&str> = selected.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "o1", "d2"]);
    }

    #[test]
    fn test_backfill_leaves_full_selection_untouched() {
        let mut selected = vec![
            ScoredChunk { chunk: chunk("d1", "dom", "", vec![], &["hr"]), score: 0.9 },
            ScoredChunk { chunk: chunk("o1", "other", "", vec![], &["hr"]), score: 0.8 },
            ScoredChunk { chunk: chunk("o2", "other", "", vec![], &["hr"]), score: 0.7 },
            ScoredChunk { chunk: chunk("o3", "other", "", vec![], &["hr"]), score: 0.6 },
        ];
        let before: Vec<String> = selected.iter().map(|s| s.chunk.id.clone()).collect();
        let scored = vec![
            selected[0].clone(),
            ScoredChunk { chunk: chunk("d2", "dom", "", vec![], &["hr"]), score: 0.4 },
        ];
        assert_eq!(backfill_dominant(&mut selected, &scored, "dom", 4), 0);
        let after: Vec<String> = selected.iter().map(|s| s.chunk.id.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_full_selection_keeps_only_threshold_passing_chunks() {
        let q = vec![1.0, 0.0];
        let mut chunks = vec![chunk("d00", "dom", "", at_cosine(0.9), &["hr"])];
        for i in 1..=20 {
            chunks.push(chunk(&format!("d{i:02}"), "dom", "", at_cosine(0.1), &["hr"]));
        }
        for i in 0..3 {
            chunks.push(chunk(&format!("o{i}"), "other", "", at_cosine(0.8), &["hr"]));
        }
        let hr = role("hr");
        let params = RankingParams::default();
        let (result, trace) = rank(chunks, &request(&hr, "zzz", &q, 4), &params);

        assert_eq!(trace.dominant_doc.as_deref(), Some("dom"));
        assert_eq!(trace.selected, 4);
        assert_eq!(trace.backfilled, 0);
        assert_eq!(result.chunks.len(), 4);
        assert!(result.chunks.iter().all(|s| s.score >= params.min_score));
        let mut ids = result.chunk_ids();
        ids.sort();
        assert_eq!(ids, vec!["d00", "o0", "o1", "o2"]);
    }

    #[test]
    fn test_backfill_fills_short_selection_from_dominant_doc() {
        let q = vec![1.0, 0.0];
        let chunks = vec![
            chunk("d00", "dom", "", at_cosine(0.9), &["hr"]),
            chunk("d01", "dom", "", at_cosine(0.2), &["hr"]),
            chunk("o0", "other", "", at_cosine(0.8), &["hr"]),
        ];
        let hr = role("hr");
        let (result, trace) = rank(chunks, &request(&hr, "zzz", &q, 4), &RankingParams::default());

        assert_eq!(trace.selected, 2);
        assert_eq!(trace.backfilled, 1);
        assert_eq!(result.chunk_ids(), vec!["d00", "o0", "d01"]);
        assert!((result.confidence - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_result_size_bounded_and_filled() {
        let q = hash_embedding("leave policy", 64);
        let chunks: Vec<Chunk> = (0..20)
            .map(|i| {
                chunk(
                    &format!("c{i:02}"),
                    &format!("doc{}", i % 4),
                    &format!("leave policy section {i}"),
                    hash_embedding(&format!("leave policy section {i}"), 64),
                    &["employee"],
                )
            })
            .collect();
        let employee = role("employee");
        for top_k in [1, 3, 8] {
            let (result, _) = rank(chunks.clone(), &request(&employee, "leave policy", &q, top_k), &RankingParams::default());
            assert_eq!(result.chunks.len(), top_k);
            assert!(result.confidence > 0.0 && result.confidence <= 1.0);
        }
    }

    #[test]
    fn test_rank_is_deterministic() {
        let q = hash_embedding("appraisal cycle", 64);
        let chunks: Vec<Chunk> = (0..12)
            .map(|i| {
                let text = format!("appraisal cycle detail {i}");
                chunk(&format!("c{i}"), &format!("doc{}", i % 3), &text, hash_embedding(&text, 64), &["hr"])
            })
            .collect();
        let hr = role("hr");
        let req = request(&hr, "appraisal cycle", &q, 5);
        let (a, _) = rank(chunks.clone(), &req, &RankingParams::default());
        let (b, _) = rank(chunks, &req, &RankingParams::default());
        assert_eq!(a.chunk_ids(), b.chunk_ids());
    }

    #[test]
    fn test_identity_hint_narrows_to_named_doc() {
        let q = hash_embedding("gratuity", 64);
        let mut chunks = Vec::new();
        for i in 0..6 {
            let text = format!("general benefit clause {i}");
            chunks.push(chunk(&format!("g{i}"), "gratuity_rules", &text, hash_embedding(&text, 64), &["hr"]));
            let text = format!("general travel clause {i}");
            chunks.push(chunk(&format!("t{i}"), "travel_rules", &text, hash_embedding(&text, 64), &["hr"]));
        }
        let hr = role("hr");
        let (result, trace) = rank(chunks, &request(&hr, "explain gratuity", &q, 4), &RankingParams::default());
        assert!(trace.identity_hint_applied);
        assert_eq!(trace.identity_docs, vec!["gratuity_rules".to_string()]);
        assert!(result.chunks.iter().all(|c| c.chunk.doc_id == "gratuity_rules"));
    }

    #[tokio::test]
    async fn test_retrieve_reads_tenant_window() {
        let store = InMemoryStore::new();
        let text = "remote work allowance";
        store
            .insert_chunks(&[chunk("c1", "remote_work", text, hash_embedding(text, 32), &["employee"])])
            .await
            .unwrap();
        let employee = role("employee");
        let q = hash_embedding("remote work", 32);
        let (result, trace) = retrieve(&store, &request(&employee, "remote work", &q, 8), &RankingParams::default())
            .await
            .unwrap();
        assert_eq!(trace.fetched, 1);
        assert_eq!(result.chunks.len(), 1);
    }
}
