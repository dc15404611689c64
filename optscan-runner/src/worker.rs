//! Worker loop: dequeue a symbol, fetch what the analyzer needs, run it,
//! record the outcome. Repeat until the queue is empty.
//!
//! Nothing a single symbol does can take the worker down: fetch failures
//! are counted and logged, analyzer errors and panics are caught at the
//! `run` boundary, and every dequeued symbol is marked done exactly once.

use crate::aggregate::ResultKey;
use crate::context::ScanContext;
use crate::retry::{FetchFailure, FetchKind};
use optscan_core::analysis::{
    AnalysisError, Analyzer, EquityAnalyzer, OptionAnalyzer, OptionInput, ResultRow,
};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Per-worker tally, returned when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub skipped: u64,
}

pub fn worker_loop(ctx: &ScanContext, worker_id: usize) -> WorkerStats {
    let source = format!("worker-{worker_id}");
    let mut stats = WorkerStats::default();

    loop {
        if ctx.is_cancelled() {
            stats.skipped += drain_as_skipped(ctx);
            break;
        }
        let Some(symbol) = ctx.queue.try_dequeue() else {
            break;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| process_symbol(ctx, &source, &symbol)));
        if let Err(payload) = outcome {
            ctx.counters.record_analysis();
            ctx.log.error(
                &source,
                format!("{symbol}: panicked outside analysis: {}", panic_message(&*payload)),
            );
        }
        ctx.queue.mark_done();
        stats.processed += 1;
    }

    ctx.log.debug(
        &source,
        format!(
            "exiting after {} symbols ({} skipped)",
            stats.processed, stats.skipped
        ),
    );
    stats
}

/// Dequeue and mark done everything left, without processing it.
fn drain_as_skipped(ctx: &ScanContext) -> u64 {
    let mut skipped = 0;
    while ctx.queue.try_dequeue().is_some() {
        ctx.record_skipped();
        ctx.queue.mark_done();
        skipped += 1;
    }
    skipped
}

fn process_symbol(ctx: &ScanContext, source: &str, symbol: &str) {
    match &ctx.analyzer {
        Analyzer::Option(analyzer) => process_option(ctx, source, analyzer.as_ref(), symbol),
        Analyzer::Equity(analyzer) => process_equity(ctx, source, analyzer.as_ref(), symbol),
    }
}

// ─── Option analyzers ────────────────────────────────────────────────

fn process_option(ctx: &ScanContext, source: &str, analyzer: &dyn OptionAnalyzer, symbol: &str) {
    if !analyzer.validate_symbol(symbol) {
        return;
    }

    let underlying = match ctx
        .retrier
        .fetch_unmetered(|| ctx.clients.quotes.fetch_underlying(symbol))
    {
        Ok(price) => price,
        Err(failure) => return fetch_failed(ctx, source, symbol, "underlying", &failure),
    };
    if !analyzer.validate_underlying(symbol, underlying) {
        return;
    }

    let needs = analyzer.needs();
    let dividend = if needs.dividend {
        fetch_dividend(ctx, source, symbol)
    } else {
        0.0
    };
    if !analyzer.validate_dividend(symbol, dividend) {
        return;
    }

    let quotes = if needs.year_quotes {
        match ctx
            .retrier
            .fetch_unmetered(|| ctx.clients.quotes.fetch_year_quotes(symbol))
        {
            Ok(quotes) => Some(quotes),
            Err(failure) => return fetch_failed(ctx, source, symbol, "year quotes", &failure),
        }
    } else {
        None
    };
    if let Some(quotes) = &quotes {
        if !analyzer.validate_quotes(symbol, quotes) {
            return;
        }
    }

    let expirations = match ctx.retrier.fetch_with_retry(FetchKind::Metered, || {
        ctx.clients.options.fetch_expirations(symbol)
    }) {
        Ok(dates) => dates,
        Err(failure) => return fetch_failed(ctx, source, symbol, "expirations", &failure),
    };

    let mut stored = 0usize;
    for expiration in expirations {
        if !analyzer.validate_expiration(symbol, expiration, ctx.as_of) {
            continue;
        }
        let chain = match ctx.retrier.fetch_with_retry(FetchKind::Metered, || {
            ctx.clients.options.fetch_chain(symbol, expiration)
        }) {
            Ok(chain) => chain,
            Err(failure) => {
                fetch_failed(ctx, source, symbol, &format!("chain {expiration}"), &failure);
                continue;
            }
        };
        if !analyzer.validate_chain(symbol, expiration, &chain) {
            continue;
        }

        let input = OptionInput {
            symbol,
            underlying,
            dividend,
            expiration,
            as_of: ctx.as_of,
            chain: &chain,
            risk_free_rate: ctx.risk_free_rate,
            quotes: quotes.as_deref(),
        };
        let key = ResultKey::option(symbol, expiration);
        match guarded(|| analyzer.run(&input)) {
            Ok(rows) => stored += store(ctx, source, key, rows),
            Err(reason) => analysis_failed(ctx, source, &key, &reason),
        }
    }

    ctx.log.debug(source, format!("{symbol}: {stored} rows"));
}

/// Dividend yield never fails the symbol; providers that cannot answer
/// mean "no dividend".
fn fetch_dividend(ctx: &ScanContext, source: &str, symbol: &str) -> f64 {
    match ctx
        .retrier
        .fetch_unmetered(|| ctx.clients.dividends.fetch_annual_yield(symbol))
    {
        Ok(yield_) => yield_,
        Err(failure) => {
            ctx.log.warn(
                source,
                format!("{symbol}: dividend yield unavailable, using 0 ({failure})"),
            );
            0.0
        }
    }
}

// ─── Equity analyzers ────────────────────────────────────────────────

fn process_equity(ctx: &ScanContext, source: &str, analyzer: &dyn EquityAnalyzer, symbol: &str) {
    if !analyzer.validate_symbol(symbol) {
        return;
    }
    let quotes = match ctx
        .retrier
        .fetch_unmetered(|| ctx.clients.quotes.fetch_year_quotes(symbol))
    {
        Ok(quotes) => quotes,
        Err(failure) => return fetch_failed(ctx, source, symbol, "year quotes", &failure),
    };
    if !analyzer.validate_quotes(symbol, &quotes) {
        return;
    }

    let key = ResultKey::equity(symbol);
    match guarded(|| analyzer.run(symbol, &quotes)) {
        Ok(row) => {
            store(ctx, source, key, vec![row]);
        }
        Err(reason) => analysis_failed(ctx, source, &key, &reason),
    }
}

// ─── Outcome recording ───────────────────────────────────────────────

fn fetch_failed(ctx: &ScanContext, source: &str, symbol: &str, what: &str, failure: &FetchFailure) {
    ctx.counters.record_fetch();
    ctx.log
        .error(source, format!("{symbol}: failed to fetch {what}: {failure}"));
}

fn analysis_failed(ctx: &ScanContext, source: &str, key: &ResultKey, reason: &str) {
    ctx.counters.record_analysis();
    ctx.log.error(
        source,
        format!("{key}: {} failed: {reason}", ctx.analyzer.name()),
    );
}

/// Returns the number of rows stored. Empty outputs are not recorded.
fn store(ctx: &ScanContext, source: &str, key: ResultKey, rows: Vec<ResultRow>) -> usize {
    if rows.is_empty() {
        return 0;
    }
    let n = rows.len();
    match ctx.results.insert(key, rows) {
        Ok(()) => n,
        Err(duplicate) => {
            ctx.log.warn(source, duplicate.to_string());
            0
        }
    }
}

/// Run analyzer code, turning both `Err` and panics into a message.
fn guarded<T>(run: impl FnOnce() -> Result<T, AnalysisError>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
