use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::{AuthorQuery, CROSSREF, PublicationSource, SourceError};
use crate::authors::{PersonName, author_matches};
use crate::normalize::value_text;
use crate::rate_limit::FetchContext;
use crate::record::{PublicationRecord, derive_record_id};

const WORKS_URL: &str = "https://api.crossref.org/works";
const PAGE_SIZE: usize = 100;

pub struct Crossref {
    pub mailto: Option<String>,
    pub max_results: usize,
    /// Lower bound for `from-pub-date`, `YYYY-MM-DD`.
    pub from_date: String,
}

impl Crossref {
    fn user_agent(&self) -> String {
        match &self.mailto {
            Some(email) => format!("bibsync/{} (mailto:{})", env!("CARGO_PKG_VERSION"), email),
            None => format!("bibsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn page_url(&self, query: &AuthorQuery, cursor: &str, rows: usize) -> String {
        let mut url = format!(
            "{}?query.author={}&filter=from-pub-date:{}&rows={}&cursor={}",
            WORKS_URL,
            urlencoding::encode(&query.full_name()),
            urlencoding::encode(&self.from_date),
            rows,
            urlencoding::encode(cursor),
        );
        if let Some(email) = &self.mailto {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }
        url
    }
}

impl PublicationSource for Crossref {
    fn name(&self) -> &str {
        CROSSREF
    }

    fn fetch<'a>(
        &'a self,
        query: &'a AuthorQuery,
        ctx: &'a FetchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PublicationRecord>, SourceError>> + Send + 'a>>
    {
        Box::pin(async move {
            let full_name = query.full_name();
            let user_agent = self.user_agent();
            let mut cursor = "*".to_string();
            let mut seen = 0usize;
            let mut records = Vec::new();

            while seen < self.max_results {
                let rows = PAGE_SIZE.min(self.max_results - seen);
                let url = self.page_url(query, &cursor, rows);
                let data = ctx
                    .get_json(ctx.client.get(&url).header("User-Agent", &user_agent))
                    .await?;

                let message = &data["message"];
                let items = message["items"].as_array().cloned().unwrap_or_default();
                if items.is_empty() {
                    break;
                }
                seen += items.len();

                records.extend(
                    items
                        .iter()
                        .filter(|item| author_matches(&full_name, &crossref_authors(item)))
                        .map(parse_crossref_item),
                );

                match message["next-cursor"].as_str() {
                    Some(next) if next != cursor => cursor = next.to_string(),
                    _ => break,
                }
            }

            tracing::debug!(scanned = seen, kept = records.len(), "crossref pages read");
            Ok(records)
        })
    }
}

/// The structured author list of a Crossref work item.
pub fn crossref_authors(item: &Value) -> Vec<PersonName> {
    item["author"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|a| {
                    PersonName::new(
                        a["given"].as_str().unwrap_or(""),
                        a["family"].as_str().unwrap_or(""),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Map a Crossref work type to a BibTeX entry type.
pub fn entry_type_for(crossref_type: &str) -> &'static str {
    match crossref_type {
        "journal-article" => "article",
        "proceedings-article" => "inproceedings",
        "book-chapter" => "incollection",
        "book" => "book",
        _ => "article",
    }
}

/// "2021-3-14" from `{"date-parts": [[2021, 3, 14]]}`.
fn date_parts(item: &Value, key: &str) -> Option<Vec<String>> {
    let parts = item[key]["date-parts"].get(0)?.as_array()?;
    let parts: Vec<String> = parts
        .iter()
        .filter_map(|p| match p {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    if parts.is_empty() { None } else { Some(parts) }
}

fn first_string(v: &Value) -> String {
    match v {
        Value::Array(arr) => arr.first().and_then(Value::as_str).unwrap_or("").to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn joined(v: &Value) -> String {
    v.as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn count(v: &Value) -> String {
    match v {
        Value::Number(n) => n.to_string(),
        other => value_text(other),
    }
}

/// Normalize one Crossref work item.
pub fn parse_crossref_item(item: &Value) -> PublicationRecord {
    let author = crossref_authors(item)
        .iter()
        .filter(|p| !p.given.is_empty() && !p.family.is_empty())
        .map(PersonName::display_name)
        .collect::<Vec<_>>()
        .join(", ");

    let print = date_parts(item, "published-print");
    let online = date_parts(item, "published-online");
    let year = print
        .as_ref()
        .or(online.as_ref())
        .and_then(|p| p.first().cloned())
        .unwrap_or_default();

    let title = first_string(&item["title"]);
    let doi = value_text(&item["DOI"]);
    let raw_type = value_text(&item["type"]);

    let mut record = PublicationRecord {
        entry_type: entry_type_for(&raw_type).to_string(),
        id: derive_record_id(&doi, &title),
        author,
        year,
        title,
        doi,
        container_title: first_string(&item["container-title"]),
        publisher: value_text(&item["publisher"]),
        ..Default::default()
    };

    let extras = [
        ("abstract", value_text(&item["abstract"])),
        ("issn", joined(&item["ISSN"])),
        ("isbn", joined(&item["ISBN"])),
        ("url", value_text(&item["URL"])),
        ("type", raw_type),
        ("language", value_text(&item["language"])),
        ("page", value_text(&item["page"])),
        ("volume", value_text(&item["volume"])),
        ("issue", value_text(&item["issue"])),
        ("published-print", print.map(|p| p.join("-")).unwrap_or_default()),
        ("published-online", online.map(|p| p.join("-")).unwrap_or_default()),
        ("reference-count", count(&item["reference-count"])),
        ("subject", joined(&item["subject"])),
    ];
    for (field, value) in extras {
        if !value.is_empty() {
            record.set(field, value);
        }
    }
    record
}
