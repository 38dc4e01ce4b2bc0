//! Transfer Settlement - batch runner
//!
//! Wires the whole pipeline in one process and settles a file of payments:
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  JSONL   │──▶│  Bridge  │──▶│  Worker  │──▶│   Saga   │──▶ risk / fx / ledger
//! │ payments │   │ (submit) │   │ (stream) │   │          │
//! └──────────┘   └────▲─────┘   └────┬─────┘   └──────────┘
//!                     └── results ───┘
//! ```
//!
//! Usage: `transfer_settlement --config <path> --input <requests.jsonl>`
//!
//! One JSON line per payment is printed to stdout, followed by the final
//! balance of every seeded account. Logs go to stderr and the log file.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing::{info, warn};

use transfer_settlement::bridge::{
    self, CorrelationBridge, IngressPayment, PendingRegistry, SettlementWorker,
};
use transfer_settlement::config::AppConfig;
use transfer_settlement::fx::RateTable;
use transfer_settlement::ledger::{Account, InMemoryLedger, LedgerStore, PgLedger};
use transfer_settlement::logging::init_logging;
use transfer_settlement::risk::RuleBasedRiskEvaluator;
use transfer_settlement::saga::{SagaCoordinator, SagaOutcome};

// ============================================================
// ARGUMENTS
// ============================================================

fn get_arg(name: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1).cloned())
}

fn get_config_path() -> String {
    get_arg("--config").unwrap_or_else(|| "config/settlement.yaml".to_string())
}

// ============================================================
// WIRING
// ============================================================

async fn build_ledger(config: &AppConfig) -> Result<Arc<dyn LedgerStore>> {
    let ledger: Arc<dyn LedgerStore> = match &config.postgres_url {
        Some(url) => {
            let pg = PgLedger::connect(url)
                .await
                .context("connecting PostgreSQL ledger")?;
            pg.ensure_schema().await.context("creating ledger schema")?;
            Arc::new(pg)
        }
        None => Arc::new(InMemoryLedger::new()),
    };

    if !config.accounts.is_empty() {
        let seeds = config
            .accounts
            .iter()
            .map(|s| Account::new(&s.account_id, s.balance, s.currency))
            .collect();
        let seeded = ledger
            .upsert_accounts(seeds)
            .await
            .context("seeding accounts")?;
        info!(count = seeded, ledger = ledger.name(), "Accounts seeded");
    }
    Ok(ledger)
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = get_config_path();
    let Some(input_path) = get_arg("--input") else {
        bail!("usage: transfer_settlement --config <path> --input <requests.jsonl>");
    };

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading config {config_path}"))?;
    let _log_guard = init_logging(&config.log);
    info!(
        git_hash = env!("GIT_HASH"),
        config = %config_path,
        settlement_currency = %config.settlement.currency,
        "Starting transfer settlement"
    );

    let ledger = build_ledger(&config).await?;
    let rates = RateTable::from_seeds(&config.fx.rates).context("loading FX rates")?;
    let coordinator = Arc::new(SagaCoordinator::new(
        Arc::new(RuleBasedRiskEvaluator::new(config.risk.clone())),
        Arc::new(rates),
        ledger.clone(),
        &config.settlement,
    ));

    // Streams, worker and the shared result listener
    let (request_tx, request_rx) = bridge::memory_stream(config.bridge.channel_capacity);
    let (result_tx, result_rx) = bridge::memory_stream(config.bridge.channel_capacity);
    let registry = Arc::new(PendingRegistry::new(config.bridge.grace_period()));
    let listener = bridge::spawn_result_listener(
        result_rx,
        registry.clone(),
        config.bridge.sweep_interval(),
    );
    let worker = tokio::spawn(
        SettlementWorker::new(
            coordinator.clone(),
            Arc::new(result_tx),
            config.bridge.max_in_flight,
            config.bridge.sweep_interval(),
        )
        .run(request_rx),
    );
    let bridge = Arc::new(CorrelationBridge::new(
        Arc::new(request_tx),
        registry,
        config.bridge.wait_timeout(),
    ));

    // Submit every payment concurrently, report in input order
    let input = tokio::fs::read_to_string(&input_path)
        .await
        .with_context(|| format!("reading {input_path}"))?;
    let mut pending = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let bridge = bridge.clone();
        let line = line.to_string();
        pending.push(tokio::spawn(async move {
            match IngressPayment::from_json(&line) {
                Ok(payment) => {
                    let key = payment.idempotency_key.clone();
                    (line_no + 1, key, bridge.submit_payment(payment).await)
                }
                Err(e) => {
                    warn!(line = line_no + 1, error = %e, "Skipping malformed payment");
                    (line_no + 1, String::new(), SagaOutcome::failed(e.code()))
                }
            }
        }));
    }

    let mut succeeded = 0usize;
    let total = pending.len();
    for handle in pending {
        let (line, key, outcome) = handle.await.context("submission task panicked")?;
        if outcome.is_success() {
            succeeded += 1;
        }
        println!(
            "{}",
            json!({ "line": line, "idempotency_key": key, "result": outcome })
        );
    }

    // Close the request stream; the worker drains, then the listener stops
    drop(bridge);
    let handled = worker.await.context("worker task panicked")?;
    listener.await.context("result listener panicked")?;

    for seed in &config.accounts {
        if let Some(account) = ledger.account(&seed.account_id).await? {
            println!("{}", json!({ "balance": account }));
        }
    }

    info!(
        total = total,
        succeeded = succeeded,
        handled = handled,
        "Settlement run complete"
    );
    Ok(())
}
