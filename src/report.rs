pub mod comparison;
pub mod drawdown;
pub mod io;
pub mod performance;
pub mod polars_ext;
pub mod summary;
pub mod yearly;
