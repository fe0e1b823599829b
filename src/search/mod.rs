use bitflags::bitflags;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::model::Item;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SearchField {
    Name,
    Category,
    Note,
}

bitflags! {
    /// Set of item fields a query is matched against.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SearchFields: u8 {
        const NAME = 0b001;
        const CATEGORY = 0b010;
        const NOTE = 0b100;
    }
}

impl Default for SearchFields {
    fn default() -> Self {
        SearchFields::all()
    }
}

impl From<SearchField> for SearchFields {
    fn from(field: SearchField) -> Self {
        match field {
            SearchField::Name => SearchFields::NAME,
            SearchField::Category => SearchFields::CATEGORY,
            SearchField::Note => SearchFields::NOTE,
        }
    }
}

impl SearchFields {
    /// An empty selection means "every field".
    pub fn from_fields(fields: &[SearchField]) -> Self {
        let selected = fields
            .iter()
            .fold(SearchFields::empty(), |acc, field| acc | SearchFields::from(*field));
        if selected.is_empty() {
            SearchFields::all()
        } else {
            selected
        }
    }

    pub fn fields(&self) -> Vec<SearchField> {
        [SearchField::Name, SearchField::Category, SearchField::Note]
            .into_iter()
            .filter(|field| self.contains(SearchFields::from(*field)))
            .collect()
    }
}

/// Lowercased query, or `None` when the query is blank. Blank queries match nothing.
pub fn normalize_query(query: &str) -> Option<String> {
    if query.trim().is_empty() {
        None
    } else {
        Some(query.to_lowercase())
    }
}

/// Case-insensitive substring match; `needle` must already be lowercased.
pub fn matches(item: &Item, needle: &str, fields: SearchFields) -> bool {
    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);
    (fields.contains(SearchFields::NAME) && contains(&item.name))
        || (fields.contains(SearchFields::CATEGORY) && contains(&item.category))
        || (fields.contains(SearchFields::NOTE) && item.note().map(contains).unwrap_or(false))
}

pub fn search_items<I>(items: I, query: &str, fields: SearchFields) -> Vec<Item>
where
    I: IntoIterator<Item = Item>,
{
    let Some(needle) = normalize_query(query) else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter(|item| matches(item, &needle, fields))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn item(id: &str, name: &str, category: &str, note: Option<&str>) -> Item {
        Item {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            purchase_date: date!(2024 - 01 - 01),
            expiry_date: date!(2024 - 01 - 20),
            note: note.map(str::to_owned),
            created_at: datetime!(2024-01-01 00:00 UTC),
            updated_at: datetime!(2024-01-01 00:00 UTC),
        }
    }

    fn sample() -> Vec<Item> {
        vec![
            item("1", "Milk", "Dairy", None),
            item("2", "Crackers", "Snacks", Some("keep away from milk carton")),
            item("3", "Salmon", "Fish", Some("freezer")),
        ]
    }

    #[test]
    fn blank_queries_match_nothing() {
        assert!(search_items(sample(), "", SearchFields::all()).is_empty());
        assert!(search_items(sample(), "   ", SearchFields::all()).is_empty());
    }

    #[test]
    fn matching_ignores_case() {
        let ids: Vec<_> = search_items(sample(), "MILK", SearchFields::all())
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn restricts_to_requested_fields() {
        let hits = search_items(sample(), "milk", SearchFields::NAME);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");

        let hits = search_items(sample(), "fish", SearchFields::NAME | SearchFields::NOTE);
        assert!(hits.is_empty());
    }

    #[test]
    fn absent_note_never_matches() {
        let hits = search_items(sample(), "e", SearchFields::NOTE);
        let ids: Vec<_> = hits.into_iter().map(|item| item.id).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn substring_is_not_tokenized() {
        assert_eq!(search_items(sample(), "rack", SearchFields::all()).len(), 1);
        assert!(search_items(sample(), "milk fish", SearchFields::all()).is_empty());
    }

    #[test]
    fn empty_field_selection_means_all() {
        assert_eq!(SearchFields::from_fields(&[]), SearchFields::all());
        assert_eq!(
            SearchFields::from_fields(&[SearchField::Note, SearchField::Name]).fields(),
            vec![SearchField::Name, SearchField::Note]
        );
    }
}
