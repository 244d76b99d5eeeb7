pub mod memory;
pub mod table;

pub use memory::{CarStore, Session};
pub use table::{CarTable, MakeSweep, MvccRow};
