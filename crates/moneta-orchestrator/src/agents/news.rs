//! News agent: two-source gathering with dedup and blended scoring.
//!
//! Articles come from the news knowledge graph (embedding search) and the
//! real-time feed (translated to Korean when needed). The merged list is
//! deduplicated by URL and by title similarity, then ordered by
//! `0.7 · relevance + recency bonus`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::context::NodeCtx;
use crate::error::{AgentError, CapabilityError};
use crate::types::{AgentName, AgentPayload, NewsDigest, NewsItem, NewsOrigin, StateSnapshot};

use super::{with_retry, Agent};

const RELEVANCE_WEIGHT: f64 = 0.7;
/// Feed items carry no retrieval score; relevance is keyword overlap with
/// the query, floored here.
const FEED_RELEVANCE_FLOOR: f64 = 0.3;

pub struct NewsAgent;

#[async_trait]
impl Agent for NewsAgent {
    fn name(&self) -> AgentName {
        AgentName::News
    }

    async fn process(
        &self,
        query: &str,
        _snapshot: &StateSnapshot,
        ctx: &NodeCtx,
    ) -> Result<AgentPayload, AgentError> {
        let limit = ctx.config.news_top_k;
        let mut items: Vec<NewsItem> = Vec::new();
        let mut last_error: Option<CapabilityError> = None;

        // Source 1: knowledge graph, queried by query embedding.
        match self.from_graph(query, limit, ctx).await {
            Ok(graph_items) => items.extend(graph_items),
            Err(err) => {
                tracing::warn!(error = %err, "news graph lookup failed");
                last_error = Some(err);
            }
        }

        // Source 2: real-time feed, translated to Korean when needed.
        match self.from_feed(query, limit, ctx).await {
            Ok(feed_items) => items.extend(feed_items),
            Err(err) => {
                tracing::warn!(error = %err, "news feed fetch failed");
                last_error = Some(err);
            }
        }

        if items.is_empty() {
            if let Some(err) = last_error {
                return Err(err.into());
            }
        }

        let threshold = ctx.config.similarity_dedup_threshold;
        let mut merged = dedup(items, threshold);
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(limit);

        Ok(AgentPayload::News(NewsDigest { items: merged }))
    }
}

impl NewsAgent {
    async fn from_graph(
        &self,
        query: &str,
        limit: usize,
        ctx: &NodeCtx,
    ) -> Result<Vec<NewsItem>, CapabilityError> {
        let llm = Arc::clone(&ctx.caps.llm);
        let text = query.to_string();
        let embedding = with_retry("llm.embed", || {
            let llm = Arc::clone(&llm);
            let text = text.clone();
            async move { llm.embed(&text).await }
        })
        .await?;

        let graph = Arc::clone(&ctx.caps.news_graph);
        let min_score = ctx.config.news_min_score;
        let articles = with_retry("news_graph.similar", || {
            let graph = Arc::clone(&graph);
            let embedding = embedding.clone();
            async move { graph.similar(&embedding, limit, min_score).await }
        })
        .await?;

        Ok(articles
            .into_iter()
            .map(|a| {
                let score = blend_score(a.relevance, a.published_at);
                NewsItem {
                    title: a.title,
                    url: a.url,
                    summary: a.summary,
                    origin: NewsOrigin::KnowledgeGraph,
                    published_at: a.published_at,
                    relevance: a.relevance,
                    score,
                }
            })
            .collect())
    }

    async fn from_feed(
        &self,
        query: &str,
        limit: usize,
        ctx: &NodeCtx,
    ) -> Result<Vec<NewsItem>, CapabilityError> {
        let feed = Arc::clone(&ctx.caps.news_feed);
        let keywords = query.to_string();
        let raw = with_retry("news_feed.fetch", || {
            let feed = Arc::clone(&feed);
            let keywords = keywords.clone();
            async move { feed.fetch(&keywords, limit).await }
        })
        .await?;

        let mut items = Vec::with_capacity(raw.len());
        for item in raw {
            let (title, summary) = if item.language == "ko" {
                (item.title, item.body)
            } else {
                // Keep the original text if translation is down.
                let title = ctx
                    .caps
                    .translator
                    .translate(&item.title, "ko")
                    .await
                    .unwrap_or_else(|_| item.title.clone());
                let body = ctx
                    .caps
                    .translator
                    .translate(&item.body, "ko")
                    .await
                    .unwrap_or_else(|_| item.body.clone());
                (title, body)
            };
            let relevance = keyword_relevance(query, &title);
            items.push(NewsItem {
                score: blend_score(relevance, item.published_at),
                title,
                url: item.url,
                summary,
                origin: NewsOrigin::LiveFeed,
                published_at: item.published_at,
                relevance,
            });
        }
        Ok(items)
    }
}

/// `0.7 · relevance` plus the recency bonus ladder.
fn blend_score(relevance: f64, published_at: Option<DateTime<Utc>>) -> f64 {
    RELEVANCE_WEIGHT * relevance + recency_bonus(published_at)
}

fn recency_bonus(published_at: Option<DateTime<Utc>>) -> f64 {
    let Some(published) = published_at else {
        return 0.1;
    };
    let age = Utc::now().signed_duration_since(published);
    if age < Duration::hours(24) {
        0.3
    } else if age < Duration::hours(48) {
        0.2
    } else {
        0.1
    }
}

/// Fraction of query tokens appearing in the title, floored so feed items
/// are never scored out entirely.
fn keyword_relevance(query: &str, title: &str) -> f64 {
    let title = title.to_lowercase();
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return FEED_RELEVANCE_FLOOR;
    }
    let hits = tokens
        .iter()
        .filter(|t| title.contains(&t.to_lowercase()))
        .count();
    (hits as f64 / tokens.len() as f64).max(FEED_RELEVANCE_FLOOR)
}

/// Drop items with a repeated URL or a near-identical title. The first
/// occurrence wins, so graph items survive over feed duplicates.
fn dedup(items: Vec<NewsItem>, jaccard_threshold: f64) -> Vec<NewsItem> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut kept: Vec<NewsItem> = Vec::with_capacity(items.len());
    for item in items {
        if !seen_urls.insert(item.url.clone()) {
            continue;
        }
        if kept
            .iter()
            .any(|k| title_jaccard(&k.title, &item.title) >= jaccard_threshold)
        {
            continue;
        }
        kept.push(item);
    }
    kept
}

/// Jaccard similarity over lowercase whitespace tokens.
fn title_jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let set_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: &str, score: f64) -> NewsItem {
        NewsItem {
            title: title.into(),
            url: url.into(),
            summary: String::new(),
            origin: NewsOrigin::LiveFeed,
            published_at: None,
            relevance: score,
            score,
        }
    }

    #[test]
    fn jaccard_identical_titles() {
        assert_eq!(title_jaccard("삼성전자 주가 상승", "삼성전자 주가 상승"), 1.0);
    }

    #[test]
    fn jaccard_disjoint_titles() {
        assert_eq!(title_jaccard("삼성전자 상승", "네이버 하락"), 0.0);
    }

    #[test]
    fn dedup_drops_repeated_urls() {
        let items = vec![
            item("첫 기사", "https://a", 0.9),
            item("전혀 다른 기사", "https://a", 0.8),
        ];
        let kept = dedup(items, 0.9);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "첫 기사");
    }

    #[test]
    fn dedup_drops_near_identical_titles() {
        let items = vec![
            item("삼성전자 주가 상승세 지속", "https://a", 0.9),
            item("삼성전자 주가 상승세 지속", "https://b", 0.8),
            item("네이버 AI 투자 확대 발표", "https://c", 0.7),
        ];
        let kept = dedup(items, 0.9);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn recency_ladder() {
        let now = Utc::now();
        assert_eq!(recency_bonus(Some(now - Duration::hours(1))), 0.3);
        assert_eq!(recency_bonus(Some(now - Duration::hours(30))), 0.2);
        assert_eq!(recency_bonus(Some(now - Duration::hours(72))), 0.1);
        assert_eq!(recency_bonus(None), 0.1);
    }

    #[test]
    fn fresh_relevant_item_outranks_stale_one() {
        let fresh = blend_score(0.8, Some(Utc::now() - Duration::hours(2)));
        let stale = blend_score(0.8, Some(Utc::now() - Duration::hours(100)));
        assert!(fresh > stale);
    }
}
