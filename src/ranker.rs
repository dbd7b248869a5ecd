use crate::error::{PlacementError, PlacementResult};
use crate::models::{Employment, LocationRecord};
use std::cmp::Ordering;

/// Per-location values that replace the record's own for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocationOverrides {
    pub ad_cost: Option<f64>,
}

/// A record together with its derived scores. Recompute rather than patch.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLocation {
    pub record: LocationRecord,
    /// Ad cost actually used for scoring (override or the record's own).
    pub ad_cost: f64,
    pub audience_reach: f64,
    pub cost_efficiency_score: f64,
    /// Position in the order locations were added; breaks score ties.
    pub input_index: usize,
}

impl ScoredLocation {
    pub fn city(&self) -> &str {
        &self.record.city
    }
}

/// `foot_traffic * employed share`, rounded half away from zero.
pub fn audience_reach(record: &LocationRecord) -> PlacementResult<f64> {
    if record.population == 0 {
        return Err(PlacementError::Division {
            city: record.city.clone(),
            reason: "total population is zero".to_string(),
        });
    }

    let employed_share = match record.employment {
        Employment::Count(employed) => employed as f64 / record.population as f64,
        Employment::Percentage(pct) => pct / 100.0,
    };

    Ok((record.foot_traffic * employed_share).round())
}

/// Audience reach per unit of ad cost.
pub fn cost_efficiency_score(city: &str, audience_reach: f64, ad_cost: f64) -> PlacementResult<f64> {
    if !(ad_cost > 0.0) || !ad_cost.is_finite() {
        return Err(PlacementError::Division {
            city: city.to_string(),
            reason: format!("ad cost must be positive, got {}", ad_cost),
        });
    }
    Ok(audience_reach / ad_cost)
}

/// Score descending, then first-added first.
fn rank_order(a: &ScoredLocation, b: &ScoredLocation) -> Ordering {
    b.cost_efficiency_score
        .total_cmp(&a.cost_efficiency_score)
        .then_with(|| a.input_index.cmp(&b.input_index))
}

#[derive(Debug, Default)]
pub struct Ranker {
    scored: Vec<ScoredLocation>,
}

impl Ranker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score every record with no overrides.
    pub fn from_records(records: &[LocationRecord]) -> PlacementResult<Self> {
        let mut ranker = Self::new();
        for record in records {
            ranker.add_location(record, LocationOverrides::default())?;
        }
        Ok(ranker)
    }

    /// Score one record and append it to the working set. The record itself
    /// is left untouched; overrides only affect the scored copy.
    pub fn add_location(
        &mut self,
        record: &LocationRecord,
        overrides: LocationOverrides,
    ) -> PlacementResult<&ScoredLocation> {
        let ad_cost = overrides.ad_cost.unwrap_or(record.ad_cost);
        let audience_reach = audience_reach(record)?;
        let cost_efficiency_score = cost_efficiency_score(&record.city, audience_reach, ad_cost)?;

        log::debug!(
            "Scored {}: reach {} / cost {} = {:.6}",
            record.city,
            audience_reach,
            ad_cost,
            cost_efficiency_score
        );

        let input_index = self.scored.len();
        self.scored.push(ScoredLocation {
            record: record.clone(),
            ad_cost,
            audience_reach,
            cost_efficiency_score,
            input_index,
        });
        Ok(&self.scored[input_index])
    }

    pub fn len(&self) -> usize {
        self.scored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scored.is_empty()
    }

    /// The best `n` locations. Asking for more than exist returns them all.
    pub fn rank_locations(&self, n: usize) -> PlacementResult<RankedList> {
        if n == 0 {
            return Err(PlacementError::InvalidArgument(
                "number of top locations must be at least 1".to_string(),
            ));
        }

        let mut entries = self.scored.clone();
        entries.sort_by(rank_order);
        entries.truncate(n);

        Ok(RankedList { entries })
    }
}

/// Locations in rank order, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    entries: Vec<ScoredLocation>,
}

impl RankedList {
    pub fn entries(&self) -> &[ScoredLocation] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredLocation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_efficiency(&self) -> f64 {
        self.entries.iter().map(|e| e.cost_efficiency_score).sum()
    }
}

impl<'a> IntoIterator for &'a RankedList {
    type Item = &'a ScoredLocation;
    type IntoIter = std::slice::Iter<'a, ScoredLocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
