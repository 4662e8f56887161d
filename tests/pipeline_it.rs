use chrono::NaiveDate;
use folio::{calculator::aggregation::portfolio_daily, prelude::*};

mod common;

use common::{approx_eq, date, price_series, run, two_year_config};

// ================================================================================================
// Return Calculator
// ================================================================================================

#[test]
fn test_one_row_dropped_per_instrument() {
    let run = run(two_year_config(3));

    let instruments = run.prices.instrument_ids().len();
    assert_eq!(instruments, 3);
    assert_eq!(run.prices.len(), 3 * 730);
    assert_eq!(run.returns.len(), run.prices.len() - instruments);
}

#[test]
fn test_log_returns_reconstruct_prices() {
    let run = run(two_year_config(5));

    for id in run.prices.instrument_ids() {
        let prices = run.prices.series(id).collect::<Vec<_>>();
        let returns = run.returns.series(id).collect::<Vec<_>>();
        assert_eq!(prices.len(), returns.len() + 1, "length mismatch for {id}");

        let base = prices[0].price;
        let mut log_sum = 0.0;
        for (obs, record) in prices[1..].iter().zip(&returns) {
            assert_eq!(obs.date, record.date);
            log_sum += record.log_return;
            let rebuilt = base * log_sum.exp();
            assert!(
                approx_eq(rebuilt, obs.price, 1e-9 * obs.price),
                "{id} on {}: rebuilt {rebuilt}, actual {}",
                obs.date,
                obs.price
            );
        }
    }
}

#[test]
fn test_hundred_one_hundred_one_ninety_nine() {
    let prices = PriceTable::new(price_series("X", date(2021, 1, 1), &[100.0, 101.0, 99.0]))
        .expect("prices");
    let allocations =
        AllocationSet::new([Allocation::new("X", 1.0, "US").expect("allocation")])
            .expect("allocations");
    let table = ReturnTable::compute(
        &prices.join_allocations(&allocations),
        ReturnConvention::Simple,
    )
    .expect("returns");

    let simple = table.rows().iter().map(|r| r.simple_return).collect::<Vec<_>>();
    let log = table.rows().iter().map(|r| r.log_return).collect::<Vec<_>>();
    assert!(approx_eq(simple[0], 0.01, 1e-12));
    assert!(approx_eq(simple[1], -0.019_801_980_198_019_8, 1e-12));
    assert!(approx_eq(log[0], 0.009_950_330_853_168_083, 1e-12));
    assert!(approx_eq(log[1], -0.020_000_666_706_669_333, 1e-12));

    let series = PerformanceSeries::build(
        &portfolio_daily(&table, ReturnConvention::Simple),
        &[],
        ReturnConvention::Simple,
    )
    .expect("performance");
    let last = series.rows().last().expect("last row");
    // 1.01 * 0.980198 - 1, i.e. 99 / 100 - 1
    assert!(approx_eq(last.cumulative_return, -0.01, 1e-12));
}

#[test]
fn test_non_positive_price_is_rejected() {
    let result = PriceTable::new(price_series("X", date(2021, 1, 1), &[100.0, 0.0]));
    assert!(matches!(
        result,
        Err(FolioError::Input(InputError::NonPositivePrice { .. }))
    ));
}

// ================================================================================================
// Aggregator
// ================================================================================================

#[test]
fn test_equal_returns_give_the_same_portfolio_return() {
    let start = date(2021, 1, 1);
    let ids = ["A", "B", "C", "D"];
    let weights = [0.4, 0.3, 0.2, 0.1];

    let prices = PriceTable::new(
        ids.iter()
            .flat_map(|id| price_series(id, start, &[100.0, 101.0])),
    )
    .expect("prices");
    let allocations = AllocationSet::new(
        ids.iter()
            .zip(weights)
            .map(|(id, w)| Allocation::new(*id, w, "US").expect("allocation")),
    )
    .expect("allocations");

    let table = ReturnTable::compute(
        &prices.join_allocations(&allocations),
        ReturnConvention::Simple,
    )
    .expect("returns");
    let daily = portfolio_daily(&table, ReturnConvention::Simple);

    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].constituents, 4);
    assert!(approx_eq(daily[0].value, 0.01, 1e-12));
}

#[test]
fn test_yearly_log_sum_matches_price_ratio() {
    let run = run(two_year_config(9).with_convention(ReturnConvention::Log));
    let id = InstrumentId::from("SAP");
    let price_on = |d: NaiveDate| {
        run.prices
            .series(&id)
            .find(|o| o.date == d)
            .map(|o| o.price)
            .expect("price on date")
    };

    let scope = Scope::Instrument(id.clone());
    let years = run
        .period_returns
        .select(&scope, PeriodBucket::Year)
        .collect::<Vec<_>>();
    assert_eq!(years.len(), 2);

    // The first year has no return on its first day.
    assert_eq!(years[0].observations, 364);
    let expected_2021 = (price_on(date(2021, 12, 31)) / price_on(date(2021, 1, 1))).ln();
    assert!(approx_eq(years[0].compounded_return, expected_2021, 1e-9));

    assert_eq!(years[1].observations, 365);
    let expected_2022 = (price_on(date(2022, 12, 31)) / price_on(date(2021, 12, 31))).ln();
    assert!(approx_eq(years[1].compounded_return, expected_2022, 1e-9));
}

#[test]
fn test_simple_yearly_compounding_matches_price_ratio() {
    let run = run(two_year_config(9));
    let id = InstrumentId::from("AAPL");
    let price_on = |d: NaiveDate| {
        run.prices
            .series(&id)
            .find(|o| o.date == d)
            .map(|o| o.price)
            .expect("price on date")
    };

    let scope = Scope::Instrument(id.clone());
    let y2022 = run
        .period_returns
        .select(&scope, PeriodBucket::Year)
        .find(|p| p.year == 2022)
        .expect("2022");
    let expected = price_on(date(2022, 12, 31)) / price_on(date(2021, 12, 31)) - 1.0;
    assert!(approx_eq(y2022.compounded_return, expected, 1e-9));
}

#[test]
fn test_every_scope_is_rolled_up() {
    let run = run(two_year_config(1));

    let us = Scope::Country(Country::from("US"));
    assert_eq!(run.period_returns.select(&us, PeriodBucket::Month).count(), 24);
    assert_eq!(
        run.period_returns
            .select(&Scope::Portfolio, PeriodBucket::Year)
            .count(),
        2
    );

    // 2021-01-01..03 belong to ISO week 53 of 2020.
    let first_week = run
        .period_returns
        .select(&Scope::Portfolio, PeriodBucket::Week)
        .next()
        .expect("first week");
    assert_eq!((first_week.year, first_week.period), (2020, Some(53)));
    assert_eq!(first_week.start_date, date(2021, 1, 2));
    assert_eq!(first_week.end_date, date(2021, 1, 3));
}

#[test]
fn test_volatility_per_scope_and_year() {
    let run = run(two_year_config(4));

    for scope in [Scope::Portfolio, Scope::Instrument(InstrumentId::from("MSFT"))] {
        for year in [2021, 2022] {
            let record = run
                .volatility
                .get(&scope, year)
                .unwrap_or_else(|| panic!("volatility of {scope} in {year}"));
            assert!(record.daily > 0.0);
            assert!(approx_eq(record.yearly, record.daily * 252.0_f64.sqrt(), 1e-15));
        }
    }

    // MSFT is simulated with 1.5% daily volatility.
    let msft = run
        .volatility
        .get(&Scope::Instrument(InstrumentId::from("MSFT")), 2022)
        .expect("msft 2022");
    assert!(msft.daily > 0.01 && msft.daily < 0.02, "daily {}", msft.daily);
}

#[test]
fn test_risk_is_invariant_to_instrument_order() {
    let run = run(two_year_config(6));

    let reversed = run
        .covariance
        .instruments()
        .iter()
        .rev()
        .cloned()
        .collect::<Vec<_>>();
    let permuted = run.covariance.reordered(&reversed).expect("reordered");
    let risk = PortfolioRisk::compute(&permuted, &run.allocations).expect("risk");

    assert!(approx_eq(risk.variance, run.risk.variance, 1e-15));
    assert!(approx_eq(risk.volatility, run.risk.volatility, 1e-12));
    assert!(approx_eq(run.risk.volatility.powi(2), run.risk.variance, 1e-15));
}

// ================================================================================================
// Analyzer
// ================================================================================================

#[test]
fn test_drawdown_never_positive_and_zero_only_at_peaks() {
    let run = run(two_year_config(2));
    assert_eq!(run.drawdowns.len(), run.performance.len());

    for r in run.drawdowns.rows() {
        assert!(r.drawdown <= 0.0, "positive drawdown on {}", r.date);
        assert!(r.running_peak >= r.cumulative_return);
        assert_eq!(
            r.drawdown == 0.0,
            r.peak_date == r.date,
            "{} on {}: drawdown {}, peak date {}",
            r.label,
            r.date,
            r.drawdown,
            r.peak_date
        );
    }
}

#[test]
fn test_known_drawdown_trough() {
    let start = date(2021, 1, 1);
    let daily = start
        .iter_days()
        .zip([0.0, 0.1, -0.05, 0.15])
        .map(|(d, value)| DailyReturn {
            scope: Scope::Portfolio,
            date: d,
            value,
            constituents: 1,
        })
        .collect::<Vec<_>>();

    let series = PerformanceSeries::build(&daily, &[], ReturnConvention::Log).expect("series");
    let drawdowns = DrawdownTable::from_performance(&series);

    let peaks = drawdowns.rows().iter().map(|r| r.running_peak).collect::<Vec<_>>();
    let dds = drawdowns.rows().iter().map(|r| r.drawdown).collect::<Vec<_>>();
    for (actual, expected) in peaks.iter().zip([0.0, 0.1, 0.1, 0.2]) {
        assert!(approx_eq(*actual, expected, 1e-12), "peaks {peaks:?}");
    }
    for (actual, expected) in dds.iter().zip([0.0, 0.0, -0.05, 0.0]) {
        assert!(approx_eq(*actual, expected, 1e-12), "drawdowns {dds:?}");
    }

    let max = drawdowns
        .max_drawdown(SeriesLabel::Portfolio)
        .expect("max drawdown");
    assert_eq!(max.trough_date, date(2021, 1, 3));
    assert_eq!(max.peak_date, date(2021, 1, 2));
}

#[test]
fn test_comparison_and_summary_cover_both_labels() {
    let run = run(two_year_config(8));

    assert_eq!(run.comparison.len(), 729);
    for r in run.comparison.rows() {
        assert!(approx_eq(r.difference, r.portfolio - r.benchmark, 1e-15));
        assert_eq!(r.outperforming, r.difference > 0.0);
    }

    let portfolio = run.summary.get(SeriesLabel::Portfolio).expect("portfolio");
    let benchmark = run.summary.get(SeriesLabel::Benchmark).expect("benchmark");
    assert_eq!(portfolio.observations, 729);
    assert_eq!(benchmark.observations, 729);
    assert_eq!(portfolio.end_date, date(2022, 12, 31));

    let last = run
        .performance
        .label(SeriesLabel::Portfolio)
        .last()
        .expect("last portfolio row");
    assert_eq!(portfolio.total_return, last.cumulative_return);
}

#[test]
fn test_yearly_window_starts_at_configured_date() {
    let run = run(two_year_config(8).with_window_start(date(2022, 3, 1)));

    let rows = run.yearly.rows();
    assert_eq!(rows.len(), 2, "one year per label");
    for row in rows {
        assert_eq!(row.year, 2022);
        assert_eq!(row.first_date, date(2022, 3, 1));
        assert_eq!(row.last_date, date(2022, 12, 31));
    }
}

// ================================================================================================
// Pipeline & Export
// ================================================================================================

#[test]
fn test_same_seed_same_run() {
    let a = run(two_year_config(11));
    let b = run(two_year_config(11));
    let c = run(two_year_config(12));

    assert_eq!(a.prices, b.prices);
    assert_eq!(a.summary, b.summary);
    assert_ne!(a.prices, c.prices);
}

#[test]
fn test_exported_prices_reproduce_the_run() {
    let config = two_year_config(13);
    let original = run(config.clone());

    let dir = std::env::temp_dir().join(format!("folio_it_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    original.export_csv(&dir).expect("export");

    let prices = PriceTable::read_csv(dir.join("prices.csv")).expect("read prices");
    assert_eq!(prices.len(), original.prices.len() + original.benchmark_prices.len());

    let replay = Pipeline::new(config)
        .run_with_prices(prices.clone(), prices)
        .expect("replay");
    for label in [SeriesLabel::Portfolio, SeriesLabel::Benchmark] {
        let a = original.summary.get(label).expect("original");
        let b = replay.summary.get(label).expect("replay");
        assert!(approx_eq(a.total_return, b.total_return, 1e-9), "{label}");
        assert!(approx_eq(a.max_drawdown, b.max_drawdown, 1e-9), "{label}");
    }
    assert!(approx_eq(original.risk.variance, replay.risk.variance, 1e-12));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_summary_json_rows() {
    let run = run(two_year_config(14));
    let json = run.summary.to_json().expect("json");

    let rows = json.as_array().expect("array of rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["label"], "Portfolio");
    assert_eq!(rows[1]["label"], "Benchmark");
}

#[test]
fn test_config_file_round_trip() {
    let config = PipelineConfig::demo().expect("demo");
    let path = std::env::temp_dir().join(format!("folio_config_{}.json", std::process::id()));
    std::fs::write(&path, config.to_json_string().expect("json")).expect("write config");

    let loaded = PipelineConfig::from_json_file(&path).expect("load config");
    assert_eq!(loaded, config);

    let _ = std::fs::remove_file(&path);
}
