//! Pulling per-commodity values out of Geo API responses.
//!
//! A missing commodity is `None`, never an error, and looking up one
//! commodity never affects another.

use std::fmt;

/// Metered commodity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Electricity,
    Gas,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Electricity, Category::Gas];

    /// Parses the commodity name used by the API.
    pub fn from_wire(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("ELECTRICITY") {
            Some(Self::Electricity)
        } else if name.eq_ignore_ascii_case("GAS_ENERGY") {
            Some(Self::Gas)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "Electricity",
            Self::Gas => "Gas",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of value a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CadenceKind {
    Live,
    TotalConsumption,
    ActiveTariff,
}

impl CadenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::TotalConsumption => "totalConsumption",
            Self::ActiveTariff => "activeTariff",
        }
    }
}

impl fmt::Display for CadenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry in one of the API's per-commodity lists.
pub trait Reading {
    fn category(&self) -> Option<Category>;
    fn value(&self) -> Option<f64>;
}

/// Returns the value of the first entry for `wanted`.
///
/// `None` if no entry matches or the matching entry has no value.
pub fn extract<R: Reading>(readings: &[R], wanted: Category) -> Option<f64> {
    readings
        .iter()
        .find(|r| r.category() == Some(wanted))
        .and_then(|r| r.value())
}

/// Instantaneous power for one commodity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingSample {
    pub category: Category,
    pub instant_value_watts: Option<f64>,
}

impl ReadingSample {
    pub fn from_readings<R: Reading>(readings: &[R], category: Category) -> Self {
        Self {
            category,
            instant_value_watts: extract(readings, category),
        }
    }
}

/// Cumulative consumption and current tariff for one commodity, as reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateSample {
    pub category: Category,
    pub total_consumption: Option<f64>,
    pub tariff_price_per_unit: Option<f64>,
}

impl AggregateSample {
    pub fn from_readings<C: Reading, T: Reading>(
        consumption: &[C],
        tariffs: &[T],
        category: Category,
    ) -> Self {
        Self {
            category,
            total_consumption: extract(consumption, category),
            tariff_price_per_unit: extract(tariffs, category),
        }
    }
}
