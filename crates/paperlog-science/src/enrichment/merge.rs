//! Field-merge reconciliation: fixed source priority, first non-empty value
//! wins per field.

use paperlog_core::Author;

use crate::types::{PaperRecord, PartialRecord, RecordKey};

/// Fold partial records into one, in source priority order. Never fails; with
/// no usable partials the result carries only `key`.
pub fn merge(key: RecordKey, mut partials: Vec<PartialRecord>) -> PaperRecord {
    partials.sort_by_key(|p| p.source.priority());
    let mut record = PaperRecord::empty(key);
    for partial in partials {
        record.absorb(partial);
    }
    record
}

impl PaperRecord {
    /// Fill empty fields from `partial`. Fields already set are kept, so
    /// partials must arrive highest priority first.
    pub fn absorb(&mut self, partial: PartialRecord) {
        if partial.is_empty() {
            return;
        }
        self.sources.insert(partial.source);

        fill_text(&mut self.title, partial.title);
        if self.authors.is_empty() {
            self.authors = partial
                .authors
                .into_iter()
                .filter(|a| !Author::is_empty(a))
                .collect();
        }
        // An inverted index is only rebuilt when no earlier source had prose.
        if self.abstract_text.is_none() {
            self.abstract_text = partial.abstract_text.as_ref().and_then(|a| a.resolve());
        }
        fill(&mut self.citation_count, partial.citation_count);
        fill(&mut self.references_count, partial.references_count);
        fill(&mut self.year, partial.year);
        fill_text(&mut self.journal, partial.journal);
        fill_text(&mut self.conference, partial.conference);
        fill_text(&mut self.published_date, partial.published_date);
        fill_text(&mut self.publisher, partial.publisher);
        fill_text(&mut self.work_type, partial.work_type);
        fill_text(&mut self.pdf_url, partial.pdf_url);
        fill_text(&mut self.html_url, partial.html_url);
        self.citing_dois.extend(partial.citing_dois);
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn fill_text(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::Doi;
    use crate::types::{AbstractText, InvertedIndex, SourceName};

    fn key() -> RecordKey {
        RecordKey::Doi(Doi::parse("10.1000/x").unwrap())
    }

    fn partial(source: SourceName) -> PartialRecord {
        PartialRecord::new(source)
    }

    #[test]
    fn higher_priority_wins_regardless_of_input_order() {
        let mut crossref = partial(SourceName::CrossRef);
        crossref.title = Some("From CrossRef".to_string());
        crossref.citation_count = Some(3);

        let mut openalex = partial(SourceName::OpenAlex);
        openalex.title = Some("From OpenAlex".to_string());
        openalex.citation_count = Some(30);
        openalex.year = Some(2020);

        let record = merge(key(), vec![openalex, crossref]);
        assert_eq!(record.title.as_deref(), Some("From CrossRef"));
        assert_eq!(record.citation_count, Some(3));
        assert_eq!(record.year, Some(2020));
    }

    #[test]
    fn first_non_empty_field_per_priority() {
        let mut crossref = partial(SourceName::CrossRef);
        crossref.title = Some("A".to_string());
        let mut openalex = partial(SourceName::OpenAlex);
        openalex.title = Some("B".to_string());
        openalex.abstract_text = Some(AbstractText::Plain("X".to_string()));
        let mut s2 = partial(SourceName::SemanticScholar);
        s2.abstract_text = Some(AbstractText::Plain("Y".to_string()));
        s2.year = Some(2020);

        let record = merge(key(), vec![s2, crossref, openalex]);
        assert_eq!(record.title.as_deref(), Some("A"));
        assert_eq!(record.abstract_text.as_deref(), Some("X"));
        assert_eq!(record.year, Some(2020));
    }

    #[test]
    fn overridden_source_is_still_listed() {
        let mut crossref = partial(SourceName::CrossRef);
        crossref.title = Some("Kept".to_string());
        let mut openalex = partial(SourceName::OpenAlex);
        openalex.title = Some("Overwritten".to_string());

        let record = merge(key(), vec![openalex, crossref]);
        assert_eq!(record.title.as_deref(), Some("Kept"));
        assert_eq!(
            record.sources.into_iter().collect::<Vec<_>>(),
            vec![SourceName::CrossRef, SourceName::OpenAlex]
        );
    }

    #[test]
    fn blank_values_fall_through() {
        let mut crossref = partial(SourceName::CrossRef);
        crossref.title = Some("   ".to_string());
        crossref.authors = vec![Author::from_name(" ")];
        crossref.year = Some(1999);

        let mut s2 = partial(SourceName::SemanticScholar);
        s2.title = Some("Real title".to_string());
        s2.authors = vec![Author::from_name("Ada Lovelace")];

        let record = merge(key(), vec![crossref, s2]);
        assert_eq!(record.title.as_deref(), Some("Real title"));
        assert_eq!(record.authors, vec![Author::from_name("Ada Lovelace")]);
    }

    #[test]
    fn sources_accumulate_only_for_contributors() {
        let mut crossref = partial(SourceName::CrossRef);
        crossref.title = Some("T".to_string());
        let mut openalex = partial(SourceName::OpenAlex);
        openalex.external_id = Some("W1".to_string());
        let mut s2 = partial(SourceName::SemanticScholar);
        s2.citation_count = Some(1);

        let record = merge(key(), vec![crossref, openalex, s2]);
        assert_eq!(
            record.sources.into_iter().collect::<Vec<_>>(),
            vec![SourceName::CrossRef, SourceName::SemanticScholar]
        );
    }

    #[test]
    fn citing_dois_are_unioned() {
        let mut a = partial(SourceName::CrossRef);
        a.citing_dois.insert(Doi::parse("10.1000/a").unwrap());
        let mut b = partial(SourceName::SemanticScholar);
        b.citing_dois.insert(Doi::parse("10.1000/a").unwrap());
        b.citing_dois.insert(Doi::parse("10.1000/b").unwrap());

        assert_eq!(merge(key(), vec![a, b]).citing_dois.len(), 2);
    }

    #[test]
    fn inverted_index_used_when_no_prose_earlier() {
        let mut crossref = partial(SourceName::CrossRef);
        crossref.title = Some("T".to_string());
        crossref.abstract_text = Some(AbstractText::Plain("  ".to_string()));

        let mut index = InvertedIndex::new();
        index.insert("bar".to_string(), vec![1]);
        index.insert("foo".to_string(), vec![0]);
        let mut openalex = partial(SourceName::OpenAlex);
        openalex.abstract_text = Some(AbstractText::InvertedIndex(index));

        let mut s2 = partial(SourceName::SemanticScholar);
        s2.abstract_text = Some(AbstractText::Plain("ignored".to_string()));

        let record = merge(key(), vec![s2, openalex, crossref]);
        assert_eq!(record.abstract_text.as_deref(), Some("foo bar"));
    }

    #[test]
    fn empty_input_yields_bare_key() {
        let record = merge(key(), vec![]);
        assert_eq!(record, PaperRecord::empty(key()));
        assert!(record.is_empty());
    }
}
