use crate::error::{PlacementError, PlacementResult};
use crate::models::LocationRecord;

/// Inclusive `[min, max]` bound on one demographic attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(field: &'static str, min: f64, max: f64) -> PlacementResult<Self> {
        // NaN fails the comparison too
        if !(min <= max) {
            return Err(PlacementError::InvalidRange { field, min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// User constraints for narrowing the dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemographicConstraints {
    pub age: ValueRange,
    pub income: ValueRange,
    pub min_employed_percentage: f64,
}

impl DemographicConstraints {
    pub fn new(
        age: (f64, f64),
        income: (f64, f64),
        min_employed_percentage: f64,
    ) -> PlacementResult<Self> {
        let constraints = Self {
            age: ValueRange::new("age", age.0, age.1)?,
            income: ValueRange::new("income", income.0, income.1)?,
            min_employed_percentage,
        };
        constraints.validate()?;
        Ok(constraints)
    }

    /// Checks both ranges and the employment threshold. Fields are public,
    /// so the filter re-validates before use.
    pub fn validate(&self) -> PlacementResult<()> {
        ValueRange::new("age", self.age.min, self.age.max)?;
        ValueRange::new("income", self.income.min, self.income.max)?;
        if !(0.0..=100.0).contains(&self.min_employed_percentage) {
            return Err(PlacementError::InvalidConstraint {
                field: "minimum employed percentage",
                value: self.min_employed_percentage,
                lower: 0.0,
                upper: 100.0,
            });
        }
        Ok(())
    }

    pub fn matches(&self, record: &LocationRecord) -> bool {
        self.age.contains(record.median_age)
            && self.income.contains(record.median_income)
            && record.employed_percentage() >= self.min_employed_percentage
    }
}

pub struct DemographicFilter<'a> {
    records: &'a [LocationRecord],
}

impl<'a> DemographicFilter<'a> {
    pub fn new(records: &'a [LocationRecord]) -> Self {
        Self { records }
    }

    /// Records satisfying every constraint, in their original order.
    /// An empty result is valid and is not an error.
    pub fn filter(&self, constraints: &DemographicConstraints) -> PlacementResult<Vec<LocationRecord>> {
        constraints.validate()?;

        let matching: Vec<LocationRecord> = self
            .records
            .iter()
            .filter(|record| constraints.matches(record))
            .cloned()
            .collect();

        log::debug!(
            "Demographic filter kept {} of {} location(s)",
            matching.len(),
            self.records.len()
        );

        Ok(matching)
    }
}
