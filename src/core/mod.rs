pub mod error;
pub mod types;

pub use error::{DbError, Result, TrialFailure, UnitFailure};
pub use types::{Car, CarId, CarPatch, CarRecord, Snapshot};
