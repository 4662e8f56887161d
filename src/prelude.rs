// 1. Traits
pub use crate::report::io::{Report, ReportName, ToCsv, ToJson, ToSchema};
pub use crate::report::polars_ext::DataFrameExt;

// 2. Pipeline
pub use crate::config::{BenchmarkSpec, InstrumentSpec, PipelineConfig};
pub use crate::pipeline::{AnalysisRun, Pipeline, ROLL_UP_BUCKETS};

// 3. Domain Types
pub use crate::data::allocation::{Allocation, AllocationSet};
pub use crate::data::domain::{
    Country, InstrumentId, PeriodBucket, PeriodKey, ReturnConvention, Scope, SeriesLabel, Weight,
};
pub use crate::data::prices::{PanelRow, PriceObservation, PricePanel, PriceTable};

// 4. Tables
pub use crate::calculator::aggregation::{DailyReturn, PeriodReturn, PeriodReturns};
pub use crate::calculator::covariance::{CovarianceMatrix, PortfolioRisk, ReturnPivot};
pub use crate::calculator::returns::{ReturnRecord, ReturnTable};
pub use crate::calculator::volatility::{VolatilityRecord, VolatilityTable};
pub use crate::report::comparison::{ComparisonRow, ComparisonTable};
pub use crate::report::drawdown::{DrawdownRecord, DrawdownTable, MaxDrawdown};
pub use crate::report::performance::{PerformanceRow, PerformanceSeries};
pub use crate::report::summary::{PerformanceSummary, SummaryRow};
pub use crate::report::yearly::{YearlyPerformance, YearlyRow};

// 5. Simulation
pub use crate::sim::random_walk::{GbmParams, PriceSimulator};

// 6. Errors
pub use crate::error::{ConfigError, DataError, FolioError, FolioResult, InputError, IoError};
