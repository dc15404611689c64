//! Universe files, the daily cache and the synthetic market, exercised
//! through the public API only.

use chrono::NaiveDate;
use optscan_core::data::{
    ClientSet, DailyCache, OptionsClient, QuoteClient, SyntheticMarket, Universe, UniverseError,
};
use std::sync::Arc;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
}

#[test]
fn universe_files_by_extension() {
    let dir = tempfile::tempdir().unwrap();

    let csv = dir.path().join("universe.csv");
    std::fs::write(&csv, "Symbol,Name\nko,Coca-Cola\nAAPL,Apple\nKO,dup\n").unwrap();
    let u = Universe::from_file(&csv).unwrap();
    assert_eq!(u.symbols(), ["KO", "AAPL"]);

    let toml = dir.path().join("universe.toml");
    std::fs::write(
        &toml,
        "[sectors]\nenergy = [\"XOM\", \"CVX\"]\ntech = [\"MSFT\", \"XOM\"]\n",
    )
    .unwrap();
    let u = Universe::from_file(&toml).unwrap();
    assert_eq!(u.symbols(), ["XOM", "CVX", "MSFT"]);

    let missing = Universe::from_file(&dir.path().join("nope.csv")).unwrap_err();
    assert!(matches!(missing, UniverseError::Io { .. }));

    let empty = dir.path().join("empty.csv");
    std::fs::write(&empty, "Symbol\n").unwrap();
    assert!(matches!(Universe::from_file(&empty), Err(UniverseError::Empty)));
}

#[test]
fn cache_survives_the_day_and_expires_the_next() {
    let dir = tempfile::tempdir().unwrap();

    let cache = DailyCache::open(dir.path(), "dividends", day(15));
    cache.insert("KO", 0.031);
    cache.persist().unwrap();
    assert!(dir.path().join("dividends.json").exists());

    let same_day = DailyCache::open(dir.path(), "dividends", day(15));
    assert_eq!(same_day.get("KO"), Some(0.031));

    let next_day = DailyCache::open(dir.path(), "dividends", day(16));
    assert!(next_day.is_empty());
    next_day.persist().unwrap();
    assert!(!dir.path().join("dividends.json").exists());
}

#[test]
fn synthetic_market_is_deterministic_per_symbol() {
    let a = SyntheticMarket::new(day(15));
    let b = SyntheticMarket::new(day(15));

    assert_eq!(
        a.fetch_underlying("AAPL").unwrap(),
        b.fetch_underlying("AAPL").unwrap()
    );
    assert_ne!(
        a.fetch_underlying("AAPL").unwrap(),
        a.fetch_underlying("MSFT").unwrap()
    );

    let expirations = a.fetch_expirations("AAPL").unwrap().value;
    assert!(!expirations.is_empty());
    assert!(expirations.iter().all(|e| *e > day(15)));

    let first = expirations[0];
    let chain_a = a.fetch_chain("AAPL", first).unwrap().value;
    let chain_b = b.fetch_chain("AAPL", first).unwrap().value;
    assert_eq!(chain_a, chain_b);
    assert!(chain_a.iter().all(|l| l.expiration == first && l.root_symbol == "AAPL"));
}

#[test]
fn synthetic_rate_budget_shrinks_and_resets() {
    let market = SyntheticMarket::new(day(15)).with_allowance(3);
    let available: Vec<i64> = (0..4)
        .map(|_| {
            market
                .fetch_expirations("KO")
                .unwrap()
                .rate
                .expect("synthetic responses are metered")
                .available
        })
        .collect();
    assert_eq!(available, vec![2, 1, 0, 2]);
}

#[test]
fn single_client_serves_every_role() {
    let clients = ClientSet::single(Arc::new(SyntheticMarket::new(day(15))));
    assert_eq!(clients.options.name(), "synthetic");
    assert_eq!(clients.quotes.name(), "synthetic");
    assert_eq!(clients.dividends.name(), "synthetic");
    assert!(clients.rates.fetch_risk_free_rate().unwrap() > 0.0);
}
