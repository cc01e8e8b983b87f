use metrics::{describe_counter, describe_histogram};

pub fn describe() {
    describe_counter!(
        "pool_predictions_submitted_total",
        "Predictions saved, by mode (created or replaced)."
    );
    describe_counter!(
        "pool_predictions_scored_total",
        "Predictions settled against a final result, by score kind."
    );
    describe_counter!(
        "pool_wallet_ops_total",
        "Wallet operations by transaction type and outcome."
    );
    describe_counter!("pool_joins_total", "Pool entries, by outcome.");
    describe_counter!(
        "pool_jackpot_payouts_total",
        "Jackpot payout transactions written."
    );
    describe_histogram!(
        "pool_db_query_latency_ms",
        "Session store query latency in milliseconds."
    );
    describe_counter!(
        "pool_db_query_errors_total",
        "Session store queries that returned an error."
    );
}
