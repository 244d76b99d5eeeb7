use super::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Store-assigned identity of a car row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CarId(pub u64);

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptive attributes of a car. `make` is the category key used by bulk deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub engine_type: String,
    pub horsepower: u32,
    /// Price in cents
    pub price_cents: u64,
}

impl Car {
    pub fn new(make: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            make: make.into(),
            model: model.into(),
            year: 2000,
            color: "Default".to_string(),
            engine_type: "Default".to_string(),
            horsepower: 100,
            price_cents: 0,
        }
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn engine_type(mut self, engine_type: impl Into<String>) -> Self {
        self.engine_type = engine_type.into();
        self
    }

    pub fn horsepower(mut self, horsepower: u32) -> Self {
        self.horsepower = horsepower;
        self
    }

    pub fn price_cents(mut self, price_cents: u64) -> Self {
        self.price_cents = price_cents;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.make.trim().is_empty() {
            return Err(DbError::ConstraintViolation(
                "Column 'make' cannot be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(DbError::ConstraintViolation(
                "Column 'model' cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A car as read from the store: identity and version captured at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarRecord {
    pub id: CarId,
    pub version: u64,
    pub car: Car,
}

impl CarRecord {
    pub fn make(&self) -> &str {
        &self.car.make
    }
}

/// Partial update applied by `CarRepository::update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarPatch {
    pub model: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub engine_type: Option<String>,
    pub horsepower: Option<u32>,
    pub price_cents: Option<u64>,
}

impl CarPatch {
    pub fn apply(&self, car: &Car) -> Car {
        let mut next = car.clone();
        if let Some(model) = &self.model {
            next.model = model.clone();
        }
        if let Some(year) = self.year {
            next.year = year;
        }
        if let Some(color) = &self.color {
            next.color = color.clone();
        }
        if let Some(engine_type) = &self.engine_type {
            next.engine_type = engine_type.clone();
        }
        if let Some(horsepower) = self.horsepower {
            next.horsepower = horsepower;
        }
        if let Some(price_cents) = self.price_cents {
            next.price_cents = price_cents;
        }
        next
    }
}

/// Point-in-time view of transaction states used for MVCC visibility
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tx_id: u64,
    pub active: Arc<HashSet<u64>>,
    pub max_tx_id: u64,
}

impl Snapshot {
    /// Committed before this snapshot was taken.
    /// Rolled-back transactions leave no row versions behind, so any finished id counts.
    pub fn is_committed(&self, tx_id: u64) -> bool {
        tx_id < self.max_tx_id && !self.active.contains(&tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_car_validation() {
        assert!(Car::new("Ford", "Focus").validate().is_ok());

        let err = Car::new("  ", "Focus").validate().unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));

        let err = Car::new("Ford", "").validate().unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let car = Car::new("Ford", "Focus").year(2003).color("Green");
        let patch = CarPatch {
            color: Some("Red".to_string()),
            price_cents: Some(199_900),
            ..CarPatch::default()
        };

        let patched = patch.apply(&car);
        assert_eq!(patched.color, "Red");
        assert_eq!(patched.price_cents, 199_900);
        assert_eq!(patched.year, 2003);
        assert_eq!(patched.make, "Ford");
    }

    #[test]
    fn test_snapshot_commit_visibility() {
        let snapshot = Snapshot {
            tx_id: 5,
            active: Arc::new([3].into_iter().collect()),
            max_tx_id: 5,
        };

        assert!(snapshot.is_committed(1));
        assert!(!snapshot.is_committed(3));
        assert!(!snapshot.is_committed(5));
        assert!(!snapshot.is_committed(6));
    }
}
