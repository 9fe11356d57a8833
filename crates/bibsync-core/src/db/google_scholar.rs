//! Google Scholar has no API; author profiles are scraped from HTML.

use std::future::Future;
use std::pin::Pin;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{AuthorQuery, GOOGLE_SCHOLAR, PublicationSource, SourceError};
use crate::authors::exact_author_match;
use crate::rate_limit::FetchContext;
use crate::record::{DEFAULT_ENTRY_TYPE, PublicationRecord, UNKNOWN_YEAR, derive_record_id};

const BASE_URL: &str = "https://scholar.google.com";

static AUTHOR_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("h3.gs_ai_name a").unwrap());
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr.gsc_a_tr").unwrap());
static ROW_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("a.gsc_a_at").unwrap());
static ROW_GRAY: Lazy<Selector> = Lazy::new(|| Selector::parse("div.gs_gray").unwrap());
static ROW_YEAR: Lazy<Selector> = Lazy::new(|| Selector::parse("span.gsc_a_h").unwrap());
static USER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"user=([\w-]+)").unwrap());

pub struct GoogleScholar {
    pub max_publications: usize,
}

/// One entry on the author search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScholarAuthor {
    pub name: String,
    pub user_id: String,
}

impl PublicationSource for GoogleScholar {
    fn name(&self) -> &str {
        GOOGLE_SCHOLAR
    }

    fn fetch<'a>(
        &'a self,
        query: &'a AuthorQuery,
        ctx: &'a FetchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PublicationRecord>, SourceError>> + Send + 'a>>
    {
        Box::pin(async move {
            let full_name = query.full_name();
            let search_url = format!(
                "{}/citations?view_op=search_authors&mauthors={}&hl=en",
                BASE_URL,
                urlencoding::encode(&full_name)
            );
            let body = ctx.get_text(ctx.client.get(&search_url)).await?;

            // scraper types are !Send; parse off the async task
            let authors = tokio::task::spawn_blocking(move || parse_author_search(&body))
                .await
                .map_err(|e| SourceError::Parse(e.to_string()))?;

            let Some(author) = authors
                .into_iter()
                .find(|a| exact_author_match(&full_name, &a.name))
            else {
                tracing::info!(author = %full_name, "no exact author profile on google scholar");
                return Ok(Vec::new());
            };
            tracing::debug!(user_id = %author.user_id, "google scholar profile found");

            let profile_url = format!(
                "{}/citations?user={}&hl=en&cstart=0&pagesize={}",
                BASE_URL, author.user_id, self.max_publications
            );
            let body = ctx.get_text(ctx.client.get(&profile_url)).await?;
            let max = self.max_publications;
            tokio::task::spawn_blocking(move || parse_profile(&body, max))
                .await
                .map_err(|e| SourceError::Parse(e.to_string()))
        })
    }
}

/// Author names and profile ids from the author search page.
pub fn parse_author_search(html: &str) -> Vec<ScholarAuthor> {
    let document = Html::parse_document(html);
    document
        .select(&AUTHOR_LINK)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let user_id = USER_ID.captures(href)?.get(1)?.as_str().to_string();
            let name = collapse_ws(&a.text().collect::<String>());
            Some(ScholarAuthor { name, user_id })
        })
        .collect()
}

/// Up to `max` publication rows from a profile page.
pub fn parse_profile(html: &str, max: usize) -> Vec<PublicationRecord> {
    let document = Html::parse_document(html);
    document
        .select(&ROW)
        .filter_map(parse_row)
        .take(max)
        .collect()
}

fn parse_row(row: ElementRef<'_>) -> Option<PublicationRecord> {
    let link = row.select(&ROW_TITLE).next()?;
    let title = collapse_ws(&link.text().collect::<String>());
    if title.is_empty() {
        return None;
    }
    let mut gray = row.select(&ROW_GRAY);
    let author = gray
        .next()
        .map(|g| collapse_ws(&g.text().collect::<String>()))
        .unwrap_or_default();
    // The venue line repeats the year in a hidden child span; direct text only.
    let venue = gray
        .next()
        .map(|g| {
            let direct: String = g
                .children()
                .filter_map(|c| c.value().as_text().map(|t| t.to_string()))
                .collect();
            collapse_ws(&direct)
        })
        .unwrap_or_default();
    let year = row
        .select(&ROW_YEAR)
        .next()
        .map(|y| y.text().collect::<String>().trim().to_string())
        .filter(|y| !y.is_empty())
        .unwrap_or_else(|| UNKNOWN_YEAR.to_string());

    let mut record = PublicationRecord {
        entry_type: DEFAULT_ENTRY_TYPE.to_string(),
        id: derive_record_id("", &title),
        author,
        year,
        title,
        container_title: venue,
        ..Default::default()
    };
    if let Some(href) = link.value().attr("href") {
        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{BASE_URL}{href}")
        };
        record.set("url", url);
    }
    Some(record)
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
        <html><body>
        <div class="gsc_1usr">
          <h3 class="gs_ai_name"><a href="/citations?hl=en&amp;user=AbC-12_x">Jane <span class="gs_hlt">Doe</span> Smith</a></h3>
        </div>
        <div class="gsc_1usr">
          <h3 class="gs_ai_name"><a href="/citations?hl=en&amp;user=QQQ999">Jane <span class="gs_hlt">Doe</span></a></h3>
        </div>
        </body></html>"#;

    const PROFILE_PAGE: &str = r#"
        <table><tbody id="gsc_a_b">
        <tr class="gsc_a_tr">
          <td class="gsc_a_t">
            <a href="/citations?view_op=view_citation&amp;citation_for_view=QQQ999:1" class="gsc_a_at">Deep learning   systems</a>
            <div class="gs_gray">J Doe, J Smith</div>
            <div class="gs_gray">Nature 12 (3), 45-67<span class="gs_oph">, 2020</span></div>
          </td>
          <td class="gsc_a_c"><a class="gsc_a_ac">10</a></td>
          <td class="gsc_a_y"><span class="gsc_a_h gsc_a_hc gs_ibl">2020</span></td>
        </tr>
        <tr class="gsc_a_tr">
          <td class="gsc_a_t">
            <a href="/citations?view_op=view_citation&amp;citation_for_view=QQQ999:2" class="gsc_a_at">Undated preprint</a>
            <div class="gs_gray">J Doe</div>
            <div class="gs_gray"></div>
          </td>
          <td class="gsc_a_y"><span class="gsc_a_h gsc_a_hc gs_ibl"></span></td>
        </tr>
        <tr class="gsc_a_tr">
          <td class="gsc_a_t"><a class="gsc_a_at">Third</a></td>
        </tr>
        </tbody></table>"#;

    #[test]
    fn author_search_extracts_names_and_ids() {
        let authors = parse_author_search(SEARCH_PAGE);
        assert_eq!(
            authors,
            vec![
                ScholarAuthor {
                    name: "Jane Doe Smith".into(),
                    user_id: "AbC-12_x".into()
                },
                ScholarAuthor {
                    name: "Jane Doe".into(),
                    user_id: "QQQ999".into()
                },
            ]
        );
        let exact = authors
            .iter()
            .find(|a| exact_author_match("Jane Doe", &a.name))
            .unwrap();
        assert_eq!(exact.user_id, "QQQ999");
    }

    #[test]
    fn profile_rows_become_records() {
        let records = parse_profile(PROFILE_PAGE, 20);
        assert_eq!(records.len(), 3);

        let r = &records[0];
        assert_eq!(r.title, "Deep learning systems");
        assert_eq!(r.author, "J Doe, J Smith");
        assert_eq!(r.container_title, "Nature 12 (3), 45-67");
        assert_eq!(r.year, "2020");
        assert_eq!(r.doi, "");
        assert!(r.id.starts_with("key"));
        assert_eq!(
            r.get("url"),
            Some("https://scholar.google.com/citations?view_op=view_citation&citation_for_view=QQQ999:1")
        );

        assert_eq!(records[1].year, "Unknown");
        assert_eq!(records[1].container_title, "");
        assert_eq!(records[2].get("url"), None);
    }

    #[test]
    fn profile_respects_limit() {
        assert_eq!(parse_profile(PROFILE_PAGE, 1).len(), 1);
        assert!(parse_profile("<html></html>", 20).is_empty());
    }
}
