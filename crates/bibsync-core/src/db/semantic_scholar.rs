use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::{AuthorQuery, PublicationSource, SEMANTIC_SCHOLAR, SourceError};
use crate::authors::exact_author_match;
use crate::normalize::{normalize_text, normalize_value, value_text};
use crate::rate_limit::FetchContext;
use crate::record::{DEFAULT_ENTRY_TYPE, PublicationRecord, UNKNOWN_YEAR, derive_record_id};

const AUTHOR_SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/author/search";
const PAPER_FIELDS: &str = "name,papers.title,papers.year,papers.authors,papers.externalIds,papers.venue";

pub struct SemanticScholar {
    pub api_key: Option<String>,
}

impl PublicationSource for SemanticScholar {
    fn name(&self) -> &str {
        SEMANTIC_SCHOLAR
    }

    fn fetch<'a>(
        &'a self,
        query: &'a AuthorQuery,
        ctx: &'a FetchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PublicationRecord>, SourceError>> + Send + 'a>>
    {
        Box::pin(async move {
            let full_name = query.full_name();
            let url = format!(
                "{}?query={}&fields={}",
                AUTHOR_SEARCH_URL,
                urlencoding::encode(&full_name),
                PAPER_FIELDS
            );

            let mut req = ctx
                .client
                .get(&url)
                .header("User-Agent", concat!("bibsync/", env!("CARGO_PKG_VERSION")));
            if let Some(ref key) = self.api_key {
                req = req.header("x-api-key", key);
            }

            let data = ctx.get_json(req).await?;
            Ok(parse_author_search(&data, &full_name))
        })
    }
}

/// Papers of the first author hit whose name exactly matches `full_name`.
pub fn parse_author_search(data: &Value, full_name: &str) -> Vec<PublicationRecord> {
    let Some(authors) = data["data"].as_array() else {
        return Vec::new();
    };
    // Both sides normalized so "José Doe" and "Jose Doe" select the same profile.
    let query = normalize_text(full_name);
    let Some(author) = authors
        .iter()
        .find(|a| exact_author_match(&query, &normalize_value(&a["name"])))
    else {
        tracing::debug!(author = full_name, "no exact author profile on semantic scholar");
        return Vec::new();
    };

    author["papers"]
        .as_array()
        .map(|papers| papers.iter().map(parse_paper).collect())
        .unwrap_or_default()
}

fn parse_paper(paper: &Value) -> PublicationRecord {
    let author = paper["authors"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|a| a["name"].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    let year = match &paper["year"] {
        Value::Number(n) => n.to_string(),
        Value::String(s) if !s.is_empty() => s.clone(),
        _ => UNKNOWN_YEAR.to_string(),
    };
    let title = value_text(&paper["title"]);
    let doi = value_text(&paper["externalIds"]["DOI"]);

    PublicationRecord {
        entry_type: DEFAULT_ENTRY_TYPE.to_string(),
        id: derive_record_id(&doi, &title),
        author,
        year,
        title,
        doi,
        container_title: value_text(&paper["venue"]),
        ..Default::default()
    }
}
