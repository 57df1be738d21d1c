pub mod boost;
pub mod consolidation;
pub mod history;
pub mod history_run;
pub mod inputs;
pub mod ledger;
pub mod metrics_run;
pub mod owner_metrics;
pub mod ranking;
pub mod retry;
pub mod scheduler;
pub mod tdh;
pub mod tdh_run;

#[cfg(test)]
pub mod test_support;
