use crate::allocator::{BudgetAllocation, BudgetAllocator, MoneyPrecision, Reconciliation};
use crate::error::{PlacementError, PlacementResult};
use crate::filter::{DemographicConstraints, DemographicFilter};
use crate::models::LocationDataset;
use crate::ranker::{LocationOverrides, RankedList, Ranker};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Everything the user asks of one placement run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    pub constraints: DemographicConstraints,
    pub budget: f64,
    pub top_num: usize,
    pub precision: MoneyPrecision,
    pub reconciliation: Reconciliation,
    /// Hold each location's allocation at or below its ad cost.
    pub cap_to_ad_cost: bool,
    /// City → ad cost used instead of the dataset's value. Cities match
    /// case-insensitively, like duplicate detection at load time.
    pub ad_cost_overrides: BTreeMap<String, f64>,
}

impl PlacementRequest {
    /// Budget, top count and constraints, checked without any data.
    pub fn validate(&self) -> PlacementResult<()> {
        if !(self.budget > 0.0) || !self.budget.is_finite() {
            return Err(PlacementError::InvalidArgument(format!(
                "total budget must be positive, got {}",
                self.budget
            )));
        }
        if self.top_num == 0 {
            return Err(PlacementError::InvalidArgument(
                "number of top locations must be at least 1".to_string(),
            ));
        }
        self.constraints.validate()
    }
}

/// One line of the final result, ready for display or export.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRow {
    pub rank: usize,
    pub city: String,
    pub audience_reach: f64,
    pub cost_efficiency_score: f64,
    pub ad_cost: f64,
    pub allocated_budget: f64,
    pub capped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementPlan {
    pub ranked: RankedList,
    pub allocation: BudgetAllocation,
    pub rows: Vec<PlacementRow>,
    /// Locations that passed the demographic filter (before truncation).
    pub matched_locations: usize,
    /// Override keys that name no city in the dataset.
    pub unmatched_overrides: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    /// The demographic filter left nothing to rank.
    NoMatches,
    Ranked(PlacementPlan),
}

pub struct PlacementAnalyzer<'a> {
    pub dataset: &'a LocationDataset,
}

impl<'a> PlacementAnalyzer<'a> {
    pub fn new(dataset: &'a LocationDataset) -> Self {
        Self { dataset }
    }

    /// Run filter → score → rank → allocate over the dataset.
    pub fn analyze(&self, request: &PlacementRequest) -> PlacementResult<PlacementOutcome> {
        // Step 1: Reject bad arguments before touching the data
        request.validate()?;

        let (ad_costs, unmatched_overrides) = self.resolve_overrides(&request.ad_cost_overrides);

        // Step 2: Narrow down by demographics
        let filtered = DemographicFilter::new(&self.dataset.records).filter(&request.constraints)?;
        if filtered.is_empty() {
            log::info!("No locations in {} match the demographic constraints", self.dataset.source);
            return Ok(PlacementOutcome::NoMatches);
        }

        // Step 3: Score with any per-city overrides
        let mut ranker = Ranker::new();
        for record in &filtered {
            let overrides = LocationOverrides {
                ad_cost: ad_costs.get(&record.city.to_lowercase()).copied(),
            };
            ranker.add_location(record, overrides)?;
        }

        // Step 4: Keep the best top_num
        let ranked = ranker.rank_locations(request.top_num)?;
        log::info!(
            "Ranked {} of {} matching location(s)",
            ranked.len(),
            filtered.len()
        );

        // Step 5: Split the budget
        let allocator = BudgetAllocator::new(request.precision, request.reconciliation);
        let allocation = if request.cap_to_ad_cost {
            allocator.adjust_budget_allocation(&ranked, request.budget)?
        } else {
            allocator.allocate_budget(&ranked, request.budget)?
        };

        let rows = ranked
            .iter()
            .zip(allocation.entries())
            .enumerate()
            .map(|(i, (scored, entry))| PlacementRow {
                rank: i + 1,
                city: scored.city().to_string(),
                audience_reach: scored.audience_reach,
                cost_efficiency_score: scored.cost_efficiency_score,
                ad_cost: scored.ad_cost,
                allocated_budget: entry.amount,
                capped: entry.capped,
            })
            .collect();

        Ok(PlacementOutcome::Ranked(PlacementPlan {
            ranked,
            allocation,
            rows,
            matched_locations: filtered.len(),
            unmatched_overrides,
        }))
    }

    /// Key overrides by lowercased city and pick out the ones that match
    /// nothing in the dataset.
    fn resolve_overrides(&self, overrides: &BTreeMap<String, f64>) -> (HashMap<String, f64>, Vec<String>) {
        let known: HashSet<String> = self
            .dataset
            .records
            .iter()
            .map(|record| record.city.to_lowercase())
            .collect();

        let mut by_city = HashMap::new();
        let mut unmatched = Vec::new();
        for (city, ad_cost) in overrides {
            let key = city.trim().to_lowercase();
            if known.contains(&key) {
                by_city.insert(key, *ad_cost);
            } else {
                log::warn!("Ad cost override for '{}' matches no city in {}", city, self.dataset.source);
                unmatched.push(city.clone());
            }
        }

        (by_city, unmatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::record;
    use crate::models::LocationRecord;

    fn dataset(records: Vec<LocationRecord>) -> LocationDataset {
        LocationDataset {
            source: "test".to_string(),
            records,
            rejected: Vec::new(),
        }
    }

    fn request() -> PlacementRequest {
        PlacementRequest {
            constraints: DemographicConstraints::new((25.0, 35.0), (75_000.0, 120_000.0), 20.0).unwrap(),
            budget: 100.0,
            top_num: 3,
            precision: MoneyPrecision::default(),
            reconciliation: Reconciliation::LargestShare,
            cap_to_ad_cost: false,
            ad_cost_overrides: BTreeMap::new(),
        }
    }

    fn with_traffic(mut rec: LocationRecord, foot_traffic: f64, ad_cost: f64) -> LocationRecord {
        rec.foot_traffic = foot_traffic;
        rec.ad_cost = ad_cost;
        rec
    }

    fn plan(outcome: PlacementOutcome) -> PlacementPlan {
        match outcome {
            PlacementOutcome::Ranked(plan) => plan,
            PlacementOutcome::NoMatches => panic!("expected a ranked plan"),
        }
    }

    #[test]
    fn no_matching_city_reports_no_matches() {
        let data = dataset(vec![record("Sun City", 70.0, 40_000.0, 5.0), record("Campus", 21.0, 15_000.0, 30.0)]);
        let outcome = PlacementAnalyzer::new(&data).analyze(&request()).unwrap();
        assert_eq!(outcome, PlacementOutcome::NoMatches);
    }

    #[test]
    fn two_matches_for_top_three() {
        let data = dataset(vec![
            with_traffic(record("A", 30.0, 90_000.0, 50.0), 800.0, 100.0),  // 4
            with_traffic(record("B", 30.0, 90_000.0, 50.0), 1_200.0, 100.0), // 6
            record("Excluded", 60.0, 90_000.0, 50.0),
        ]);
        let plan = plan(PlacementAnalyzer::new(&data).analyze(&request()).unwrap());

        assert_eq!(plan.rows.len(), 2);
        assert_eq!(plan.matched_locations, 2);
        assert_eq!(plan.rows[0].city, "B");
        assert_eq!(plan.rows[0].rank, 1);
        assert_eq!(plan.rows[0].audience_reach, 600.0);
        assert_eq!(plan.rows[0].cost_efficiency_score, 6.0);
        assert_eq!(plan.rows[0].allocated_budget, 60.0);
        assert_eq!(plan.rows[1].city, "A");
        assert_eq!(plan.rows[1].allocated_budget, 40.0);
        assert_eq!(plan.allocation.allocated_total(), 100.0);
    }

    #[test]
    fn overrides_change_ranking() {
        let data = dataset(vec![
            with_traffic(record("A", 30.0, 90_000.0, 50.0), 800.0, 100.0),
            with_traffic(record("B", 30.0, 90_000.0, 50.0), 1_200.0, 100.0),
        ]);
        let mut req = request();
        req.ad_cost_overrides.insert("A".to_string(), 20.0);
        let plan = plan(PlacementAnalyzer::new(&data).analyze(&req).unwrap());
        assert_eq!(plan.rows[0].city, "A");
        assert_eq!(plan.rows[0].ad_cost, 20.0);
        assert_eq!(plan.rows[0].cost_efficiency_score, 20.0);
        // dataset untouched
        assert_eq!(data.records[0].ad_cost, 100.0);
    }

    #[test]
    fn overrides_match_city_case_insensitively() {
        let data = dataset(vec![with_traffic(record("Austin", 30.0, 90_000.0, 50.0), 800.0, 100.0)]);
        let mut req = request();
        req.ad_cost_overrides.insert("austin".to_string(), 1.0);
        req.ad_cost_overrides.insert("Nowhere".to_string(), 1.0);

        let plan = plan(PlacementAnalyzer::new(&data).analyze(&req).unwrap());
        assert_eq!(plan.rows[0].city, "Austin");
        assert_eq!(plan.rows[0].ad_cost, 1.0);
        assert_eq!(plan.rows[0].cost_efficiency_score, 400.0);
        assert_eq!(plan.unmatched_overrides, vec!["Nowhere".to_string()]);
    }

    #[test]
    fn overrides_for_known_cities_are_not_reported() {
        let data = dataset(vec![
            with_traffic(record("Austin", 30.0, 90_000.0, 50.0), 800.0, 100.0),
            // loaded but filtered out by age; still a known city
            with_traffic(record("Boise", 60.0, 90_000.0, 50.0), 800.0, 100.0),
        ]);
        let mut req = request();
        req.ad_cost_overrides.insert("BOISE".to_string(), 5.0);

        let plan = plan(PlacementAnalyzer::new(&data).analyze(&req).unwrap());
        assert!(plan.unmatched_overrides.is_empty());
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.rows[0].ad_cost, 100.0);
    }

    #[test]
    fn all_zero_scores_are_unallocatable() {
        let data = dataset(vec![
            with_traffic(record("A", 30.0, 90_000.0, 50.0), 0.0, 100.0),
            with_traffic(record("B", 30.0, 90_000.0, 50.0), 0.0, 100.0),
        ]);
        let err = PlacementAnalyzer::new(&data).analyze(&request()).unwrap_err();
        assert!(matches!(err, PlacementError::UnallocatableBudget { locations: 2 }));
    }

    #[test]
    fn arguments_validated_before_filtering() {
        let data = dataset(Vec::new());
        let mut req = request();
        req.budget = 0.0;
        assert!(matches!(
            PlacementAnalyzer::new(&data).analyze(&req),
            Err(PlacementError::InvalidArgument(_))
        ));

        let mut req = request();
        req.top_num = 0;
        assert!(matches!(
            PlacementAnalyzer::new(&data).analyze(&req),
            Err(PlacementError::InvalidArgument(_))
        ));
    }

    #[test]
    fn capping_flows_through_rows() {
        let data = dataset(vec![
            with_traffic(record("A", 30.0, 90_000.0, 100.0), 300.0, 30.0),
            with_traffic(record("B", 30.0, 90_000.0, 100.0), 5_000.0, 1_000.0),
        ]);
        let mut req = request();
        req.cap_to_ad_cost = true;
        let plan = plan(PlacementAnalyzer::new(&data).analyze(&req).unwrap());
        assert_eq!(plan.rows[0].city, "A");
        assert!(plan.rows[0].capped);
        assert_eq!(plan.rows[0].allocated_budget, 30.0);
        assert_eq!(plan.rows[1].allocated_budget, 70.0);
    }

    #[test]
    fn rerun_is_identical() {
        let data = dataset(vec![
            with_traffic(record("A", 30.0, 90_000.0, 37.0), 913.0, 77.7),
            with_traffic(record("B", 31.0, 95_000.0, 41.0), 1_337.0, 123.4),
            with_traffic(record("C", 32.0, 99_000.0, 29.0), 777.0, 55.5),
        ]);
        let analyzer = PlacementAnalyzer::new(&data);
        assert_eq!(analyzer.analyze(&request()).unwrap(), analyzer.analyze(&request()).unwrap());
    }
}
