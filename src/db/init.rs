use anyhow::Result;
use clickhouse::Client;
use crate::db::schema::{
    owner_metrics_table_sql, tdh_table_sql, CONSOLIDATIONS_SQL, ENS_SQL, MEMES_SEASONS_SQL,
    NFTS_SQL, OWNER_METRICS_CONSOLIDATED_TABLE, OWNER_METRICS_TABLE, PROFILES_SQL,
    TDH_GLOBAL_HISTORY_SQL, TDH_HISTORY_SQL, TDH_RUNS_SQL, TDH_TABLE, TDH_WALLET_TABLE, TRANSACTIONS_SQL,
};

pub async fn init_database(client: &Client) -> Result<()> {
    tracing::info!("Initializing database tables...");

    // Create tables if they don't exist (won't drop existing data)
    for sql in [
        TRANSACTIONS_SQL,
        NFTS_SQL,
        MEMES_SEASONS_SQL,
        CONSOLIDATIONS_SQL,
        ENS_SQL,
        PROFILES_SQL,
        TDH_RUNS_SQL,
        TDH_HISTORY_SQL,
        TDH_GLOBAL_HISTORY_SQL,
    ] {
        client.query(sql).execute().await?;
    }
    for table in [TDH_TABLE, TDH_WALLET_TABLE] {
        client.query(&tdh_table_sql(table)).execute().await?;
    }
    for table in [OWNER_METRICS_TABLE, OWNER_METRICS_CONSOLIDATED_TABLE] {
        client.query(&owner_metrics_table_sql(table)).execute().await?;
    }

    Ok(())
}
