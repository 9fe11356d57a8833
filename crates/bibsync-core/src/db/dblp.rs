use std::future::Future;
use std::pin::Pin;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{AuthorQuery, DBLP, PublicationSource, SourceError};
use crate::authors::author_matches;
use crate::normalize::value_text;
use crate::rate_limit::FetchContext;
use crate::record::{DEFAULT_ENTRY_TYPE, PublicationRecord, UNKNOWN_YEAR, derive_record_id};

const SEARCH_URL: &str = "https://dblp.org/search/publ/api";
const MAX_HITS: usize = 1000;

/// DBLP disambiguates homonyms with a numeric suffix: "Jane Doe 0001".
static HOMONYM_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\d{4}$").unwrap());

pub struct DblpOnline;

impl DblpOnline {
    /// Full name, "F. Last", and last name alone.
    pub fn search_terms(query: &AuthorQuery) -> Vec<String> {
        let mut terms = vec![query.full_name(), query.initial_name(), query.last_name.clone()];
        terms.dedup();
        terms
    }
}

impl PublicationSource for DblpOnline {
    fn name(&self) -> &str {
        DBLP
    }

    fn fetch<'a>(
        &'a self,
        query: &'a AuthorQuery,
        ctx: &'a FetchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PublicationRecord>, SourceError>> + Send + 'a>>
    {
        Box::pin(async move {
            let full_name = query.full_name();
            let mut records = Vec::new();
            let mut last_error = None;
            for term in Self::search_terms(query) {
                let url = format!(
                    "{}?q={}&format=json&h={}",
                    SEARCH_URL,
                    urlencoding::encode(&term),
                    MAX_HITS
                );
                match ctx.get_json(ctx.client.get(&url)).await {
                    Ok(data) => {
                        let hits = parse_search(&data, &full_name);
                        tracing::debug!(term = %term, kept = hits.len(), "dblp search");
                        records.extend(hits);
                    }
                    Err(e) => {
                        tracing::warn!(term = %term, error = %e, "dblp search failed");
                        last_error = Some(e);
                    }
                }
            }

            // A failed search only fails the source when nothing was collected.
            match last_error {
                Some(e) if records.is_empty() => Err(e),
                _ => Ok(records),
            }
        })
    }
}

fn text_of(v: &Value) -> Option<&str> {
    match v {
        Value::String(s) => Some(s.as_str()),
        Value::Object(_) => v["text"].as_str(),
        _ => None,
    }
}

/// `info.authors.author` is an array, or a bare object for single-author hits.
fn hit_authors(info: &Value) -> Vec<String> {
    let author = &info["authors"]["author"];
    let list: Vec<&Value> = match author {
        Value::Array(arr) => arr.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };
    list.into_iter()
        .filter_map(text_of)
        .map(|name| HOMONYM_SUFFIX.replace(name, "").into_owned())
        .collect()
}

fn venue_of(info: &Value) -> String {
    match &info["venue"] {
        Value::Array(arr) => arr
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.as_str().unwrap_or("").to_string(),
    }
}

/// Normalize one search response, keeping hits that list the queried author.
pub fn parse_search(data: &Value, full_name: &str) -> Vec<PublicationRecord> {
    let Some(hits) = data["result"]["hits"]["hit"].as_array() else {
        return Vec::new();
    };

    hits.iter()
        .filter_map(|hit| {
            let info = &hit["info"];
            if !info.is_object() {
                return None;
            }
            let author = hit_authors(info).join(", ");
            if !author_matches(full_name, &author) {
                return None;
            }

            let title = value_text(&info["title"])
                .trim()
                .trim_end_matches('.')
                .to_string();
            let year = match &info["year"] {
                Value::String(s) if !s.is_empty() => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => UNKNOWN_YEAR.to_string(),
            };
            let doi = value_text(&info["doi"]);

            let mut record = PublicationRecord {
                entry_type: DEFAULT_ENTRY_TYPE.to_string(),
                id: derive_record_id(&doi, &title),
                author,
                year,
                title,
                doi,
                container_title: venue_of(info),
                ..Default::default()
            };
            if let Some(url) = info["ee"].as_str().or_else(|| info["url"].as_str()) {
                record.set("url", url);
            }
            Some(record)
        })
        .collect()
}
