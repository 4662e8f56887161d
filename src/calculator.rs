pub mod aggregation;
pub mod covariance;
pub mod returns;
pub mod segment;
pub mod volatility;
