//! Read-side views over the repository: category extraction and sorted, filtered listings.

use std::cmp::Ordering;

use clap::ValueEnum;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model::Item;
use crate::storage::{ItemRepository, StoreResult};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SortField {
    #[default]
    Expiry,
    Name,
    Category,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Exact category label to keep; `None` lists everything.
    pub category: Option<String>,
    pub sort: SortSpec,
}

/// Unique non-empty categories in first-seen order, recomputed from the current collection.
pub fn distinct_categories(repo: &dyn ItemRepository) -> StoreResult<Vec<String>> {
    Ok(collect_categories(&repo.list_all()?))
}

pub fn collect_categories(items: &[Item]) -> Vec<String> {
    let seen: IndexSet<&str> = items
        .iter()
        .map(|item| item.category.as_str())
        .filter(|category| !category.trim().is_empty())
        .collect();
    seen.into_iter().map(str::to_owned).collect()
}

pub fn list_items(repo: &dyn ItemRepository, options: &ListOptions) -> StoreResult<Vec<Item>> {
    let mut items = repo.list_all()?;
    if let Some(category) = options.category.as_deref() {
        items.retain(|item| item.category == category);
    }
    sort_items(&mut items, options.sort);
    Ok(items)
}

/// Stable sort: items comparing equal keep their insertion order in either direction.
pub fn sort_items(items: &mut [Item], spec: SortSpec) {
    items.sort_by(|a, b| {
        let ordering = compare(a, b, spec.field);
        match spec.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

fn compare(a: &Item, b: &Item, field: SortField) -> Ordering {
    match field {
        SortField::Expiry => a.expiry_date.cmp(&b.expiry_date),
        SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortField::Category => a.category.to_lowercase().cmp(&b.category.to_lowercase()),
    }
}
