//! The user's own bibliography, indexed by year.

use std::collections::BTreeMap;

use crate::authors::author_matches;
use crate::db::AuthorQuery;
use crate::record::PublicationRecord;

/// Records grouped by year label ("2021", ..., or "Unknown").
pub type YearIndex = BTreeMap<String, Vec<PublicationRecord>>;

/// Group records by [`PublicationRecord::year_or_unknown`], preserving order
/// within each year.
pub fn organize_by_year(records: impl IntoIterator<Item = PublicationRecord>) -> YearIndex {
    let mut index = YearIndex::new();
    for record in records {
        index
            .entry(record.year_or_unknown().to_string())
            .or_default()
            .push(record);
    }
    index
}

/// Records from `index` whose year is one of `years`, in year order.
pub fn records_in_years(index: &YearIndex, years: &[String]) -> Vec<PublicationRecord> {
    index
        .iter()
        .filter(|(year, _)| years.iter().any(|y| y.trim() == year.as_str()))
        .flat_map(|(_, records)| records.iter().cloned())
        .collect()
}

/// A loaded local bibliography.
#[derive(Debug, Clone, Default)]
pub struct LocalLibrary {
    index: YearIndex,
    len: usize,
}

impl LocalLibrary {
    pub fn from_records(records: Vec<PublicationRecord>) -> Self {
        let len = records.len();
        Self {
            index: organize_by_year(records),
            len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Year labels present, ascending.
    pub fn years(&self) -> Vec<&str> {
        self.index.keys().map(String::as_str).collect()
    }

    pub fn by_year(&self) -> &YearIndex {
        &self.index
    }

    /// Records in `years` that list the queried author.
    pub fn select(&self, years: &[String], query: &AuthorQuery) -> Vec<PublicationRecord> {
        let full_name = query.full_name();
        records_in_years(&self.index, years)
            .into_iter()
            .filter(|r| author_matches(&full_name, &r.author))
            .collect()
    }

    /// Records in `years` whose author text contains both name fragments,
    /// case-insensitively. Looser than [`select`](Self::select); for browsing.
    pub fn filter_for_display(
        &self,
        years: &[String],
        first_name: &str,
        last_name: &str,
    ) -> Vec<PublicationRecord> {
        let first = first_name.trim().to_lowercase();
        let last = last_name.trim().to_lowercase();
        records_in_years(&self.index, years)
            .into_iter()
            .filter(|r| {
                let author = r.author.to_lowercase();
                author.contains(&first) && author.contains(&last)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> LocalLibrary {
        LocalLibrary::from_records(vec![
            PublicationRecord::new("Deep Learning Systems")
                .with_author("Jane Doe, John Smith")
                .with_year("2020"),
            PublicationRecord::new("Graph Things")
                .with_author("John Smith")
                .with_year("2020"),
            PublicationRecord::new("Later Work")
                .with_author("J. Doe")
                .with_year("2021"),
            PublicationRecord::new("Undated Draft").with_author("Jane Doe"),
        ])
    }

    fn years(ys: &[&str]) -> Vec<String> {
        ys.iter().map(|y| y.to_string()).collect()
    }

    #[test]
    fn organizes_by_year_with_unknown_bucket() {
        let lib = library();
        assert_eq!(lib.len(), 4);
        assert_eq!(lib.years(), vec!["2020", "2021", "Unknown"]);
        assert_eq!(lib.by_year()["2020"].len(), 2);
        assert_eq!(lib.by_year()["Unknown"][0].title, "Undated Draft");
    }

    #[test]
    fn select_filters_by_year_and_author() {
        let lib = library();
        let q = AuthorQuery::new("Jane", "Doe");
        let picked = lib.select(&years(&["2020", "2021"]), &q);
        let titles: Vec<&str> = picked.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Deep Learning Systems", "Later Work"]);

        assert!(lib.select(&years(&["2019"]), &q).is_empty());
    }

    #[test]
    fn select_unknown_year_is_addressable() {
        let lib = library();
        let q = AuthorQuery::new("Jane", "Doe");
        let picked = lib.select(&years(&["Unknown"]), &q);
        assert_eq!(picked.len(), 1);
    }

    #[test]
    fn display_filter_is_substring_based() {
        let lib = library();
        let shown = lib.filter_for_display(&years(&["2020", "2021"]), "jo", "SMITH");
        assert_eq!(shown.len(), 2);
        // "J. Doe" does not contain "jane".
        let shown = lib.filter_for_display(&years(&["2021"]), "Jane", "Doe");
        assert!(shown.is_empty());
    }

    #[test]
    fn empty_library() {
        let lib = LocalLibrary::from_records(vec![]);
        assert!(lib.is_empty());
        assert!(lib.years().is_empty());
    }
}
