//! # Age-Based Working-Set Filter
//!
//! Bounds an unordered set of items to a working set by recency. The
//! normal limit is given by `normal_count`. If items are younger than
//! `min_age`, they are included beyond the `normal_count` limit. Under no
//! circumstances are more than `max_count` items included.
//!
//! The filter is a pure function: ages are supplied by the caller, items
//! with an unknown age are dropped (and logged) rather than guessed at,
//! and equal ages never collapse two items: ties are broken by the items'
//! own ordering, so the result is deterministic.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::time::Duration;

use log::debug;

/// Limits a set of items to the youngest ones.
#[derive(Debug, Clone, Default)]
pub struct AgeFilter {
    normal_count: Option<usize>,
    max_count: Option<usize>,
    min_age: Option<Duration>,
}

impl AgeFilter {
    /// Creates a filter. Every bound is optional; an unbounded filter only
    /// removes items with unknown age.
    pub fn new(
        normal_count: Option<usize>,
        max_count: Option<usize>,
        min_age: Option<Duration>,
    ) -> Self {
        Self {
            normal_count,
            max_count,
            min_age,
        }
    }

    /// Selects the working set from `items`.
    ///
    /// `age_of` yields each item's age (now minus last change); `None`
    /// means the age is unknown and the item is excluded from selection.
    pub fn apply<T, F>(&self, items: &BTreeSet<T>, age_of: F) -> BTreeSet<T>
    where
        T: Ord + Clone + Display,
        F: Fn(&T) -> Option<Duration>,
    {
        // Sort by age, youngest first; ties broken by item order so equal
        // ages keep distinct items.
        let mut by_age: Vec<(Duration, &T)> = Vec::with_capacity(items.len());
        for item in items {
            match age_of(item) {
                Some(age) => by_age.push((age, item)),
                None => debug!("Age of {} unknown; excluded from selection.", item),
            }
        }
        by_age.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        // Hard limit of max_count items:
        if let Some(max_count) = self.max_count {
            by_age.truncate(max_count);
        }

        let selected: &[(Duration, &T)] = match self.normal_count {
            Some(normal_count) if by_age.len() > normal_count => {
                // Include all that are younger than min_age, even if
                // normal_count is exceeded:
                let grace = self.min_age.map(|min_age| {
                    let young = by_age.partition_point(|(age, _)| *age <= min_age);
                    &by_age[..young]
                });
                match grace {
                    Some(young) if young.len() >= normal_count => young,
                    // Otherwise include the normal_count youngest entries:
                    _ => &by_age[..normal_count],
                }
            }
            // Don't filter further.
            _ => &by_age[..],
        };

        selected.iter().map(|(_, item)| (*item).clone()).collect()
    }
}
