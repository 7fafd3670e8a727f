use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::index::view::IndexView;
use crate::scoring::scorer::ScorerSpec;
use crate::search::cursor::TermList;
use crate::search::daat::daat;
use crate::search::maxscore::maxscore;
use crate::search::saat::{SaatBudget, saat};
use crate::search::taat::taat;
use crate::search::topk::SearchResults;
use crate::search::wand::wand;

/// Traversal order of a query run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalType {
    Taat,
    Daat,
    Wand,
    MaxScore,
    Saat,
}

/// The request contract any front-end speaks to this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: Vec<String>,
    pub k: usize,
    pub engine: TraversalType,
    pub scorer: String,
    pub stem: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trec_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentRef {
    Id(u32),
    Title(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseResult {
    pub rank: usize,
    pub document: DocumentRef,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<ResponseResult>,
    pub elapsed_nanoseconds: u64,
}

/// Results of one query run plus its wall-clock time.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub results: SearchResults,
    pub elapsed: Duration,
}

impl QueryOutput {
    /// Response with documents referenced by ID.
    pub fn to_response(&self) -> QueryResponse {
        QueryResponse {
            results: self
                .results
                .iter()
                .map(|(rank, document, score)| ResponseResult {
                    rank,
                    document: DocumentRef::Id(document.0),
                    score,
                })
                .collect(),
            elapsed_nanoseconds: self.elapsed.as_nanos() as u64,
        }
    }

    /// Response with documents mapped back to their titles.
    pub fn to_titled_response(&self, view: &IndexView) -> Result<QueryResponse> {
        let mut results = Vec::with_capacity(self.results.results.len());
        for (rank, document, score) in self.results.iter() {
            results.push(ResponseResult {
                rank,
                document: DocumentRef::Title(view.title(document)?),
                score,
            });
        }
        Ok(QueryResponse {
            results,
            elapsed_nanoseconds: self.elapsed.as_nanos() as u64,
        })
    }
}

/// Runs top-k queries over one index view with a fixed traversal and
/// scorer.
///
/// The engine holds no mutable state between queries; it can be shared
/// freely across threads along with its view.
pub struct QueryEngine<'v, 'a> {
    view: &'v IndexView<'a>,
    traversal: TraversalType,
    scorer: ScorerSpec,
    saat_budget: SaatBudget,
}

impl<'v, 'a> QueryEngine<'v, 'a> {
    pub fn new(view: &'v IndexView<'a>, traversal: TraversalType, scorer: ScorerSpec) -> Self {
        QueryEngine {
            view,
            traversal,
            scorer,
            saat_budget: SaatBudget::All,
        }
    }

    pub fn with_saat_budget(mut self, budget: SaatBudget) -> Self {
        self.saat_budget = budget;
        self
    }

    /// Term lists for the query terms; unknown terms are silently
    /// dropped.
    fn term_lists(&self, terms: &[String]) -> Result<Vec<TermList<'v, 'a>>> {
        let mut lists = Vec::with_capacity(terms.len());
        for term in terms {
            let Some(term_id) = self.view.term_id(term) else {
                continue;
            };
            let list = match self.scorer.layer_name() {
                Some(layer) => {
                    let scored = self.view.scored_postings(term_id, &layer)?;
                    TermList::quantized(scored.postings, scored.max_score, 1.0)
                }
                None => TermList::on_the_fly(
                    self.view.postings(term_id)?,
                    self.view.term_scorer(term_id, self.scorer.tag)?,
                    self.view,
                    1.0,
                )?,
            };
            lists.push(list);
        }
        Ok(lists)
    }

    pub fn run_query(&self, terms: &[String], k: usize) -> Result<QueryOutput> {
        self.run_query_with_deadline(terms, k, None)
    }

    /// Runs one query; if `deadline` passes mid-traversal, a partial but
    /// correctly ordered top-k is returned with `cancelled` set.
    pub fn run_query_with_deadline(
        &self,
        terms: &[String],
        k: usize,
        deadline: Option<Instant>,
    ) -> Result<QueryOutput> {
        let start = Instant::now();
        let lists = self.term_lists(terms)?;
        let cursors = lists.iter().map(|list| list.cursor()).collect();
        let results = match self.traversal {
            TraversalType::Daat => daat(cursors, k, deadline)?,
            TraversalType::Taat => taat(
                cursors,
                k,
                self.view.collection_size() as usize,
                deadline,
            )?,
            TraversalType::Wand => wand(cursors, k, deadline)?,
            TraversalType::MaxScore => maxscore(cursors, k, deadline)?,
            TraversalType::Saat => saat(
                cursors,
                k,
                self.view.collection_size() as usize,
                self.saat_budget,
                deadline,
            )?,
        };
        Ok(QueryOutput {
            results,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request: QueryRequest = serde_json::from_str(
            r#"{"query": ["lorem", "ipsum"], "k": 10, "engine": "maxscore",
                "scorer": "bm25-8", "stem": false}"#,
        )
        .unwrap();
        assert_eq!(request.engine, TraversalType::MaxScore);
        assert_eq!(request.k, 10);
        assert_eq!(request.trec_id, None);
        let spec: ScorerSpec = request.scorer.parse().unwrap();
        assert_eq!(spec.layer_name().unwrap(), "bm25-8");

        let text = serde_json::to_string(&request).unwrap();
        assert!(text.contains("\"engine\":\"maxscore\""));
        assert!(!text.contains("trec_id"));
    }

    #[test]
    fn test_response_serialization() {
        let response = QueryResponse {
            results: vec![ResponseResult {
                rank: 0,
                document: DocumentRef::Title("Doc00".to_string()),
                score: 1.5,
            }],
            elapsed_nanoseconds: 1200,
        };
        let text = serde_json::to_string(&response).unwrap();
        assert!(text.contains("\"document\":\"Doc00\""));
        assert!(text.contains("\"elapsed_nanoseconds\":1200"));
    }
}
