use std::collections::HashSet;

use crate::models::{Candidate, RawListing};
use crate::store::SeenStore;

/// Result of splitting one scrape pass against the seen-set.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub new: Vec<Candidate>,
    pub seen: Vec<String>,
    /// Listings without a job id; neither processed nor recorded.
    pub invalid: usize,
    /// Repeats of an id already classified earlier in the same pass.
    pub duplicates: usize,
}

impl Classification {
    /// Every valid id observed this pass, in scrape order.
    pub fn observed(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.new.iter().map(|c| c.id.clone()).collect();
        ids.extend(self.seen.iter().cloned());
        ids
    }
}

pub fn classify(listings: Vec<RawListing>, seen: &SeenStore) -> Classification {
    let mut result = Classification::default();
    let mut this_pass: HashSet<String> = HashSet::new();

    for listing in listings {
        let id = match listing.id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => {
                result.invalid += 1;
                continue;
            }
        };

        if !this_pass.insert(id.clone()) {
            result.duplicates += 1;
            continue;
        }

        if seen.contains(&id) {
            result.seen.push(id);
        } else {
            result.new.push(Candidate {
                id,
                raw_fields: listing.raw_fields,
            });
        }
    }

    result
}
