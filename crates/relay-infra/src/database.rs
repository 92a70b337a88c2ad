//! Postgres storage for webhook subscriptions
//!
//! The `webhook` table is shared with the registration API, which owns its
//! schema. Column names are camelCase and must be quoted.

use crate::{InfraError, Result};
use async_trait::async_trait;
use relay_core::{DatabaseConfig, WebhookId, WebhookRepository, WebhookSubscription};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Create a connection pool from configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connecting to database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Apply the embedded migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const SELECT_COLUMNS: &str = r#"SELECT "id", "url", "description", "isActive", "authorization", "chains",
    "addresses", "sendConfirmations", "sendMultisigTxs", "sendEtherTransfers", "sendTokenTransfers",
    "sendModuleTransactions", "sendSafeCreations", "sendMessages", "sendReorgs", "sendDelegates"
    FROM "webhook""#;

#[derive(Debug, FromRow)]
struct WebhookRow {
    id: Uuid,
    url: String,
    description: String,
    #[sqlx(rename = "isActive")]
    is_active: bool,
    authorization: String,
    chains: Vec<i64>,
    addresses: Vec<String>,
    #[sqlx(rename = "sendConfirmations")]
    send_confirmations: bool,
    #[sqlx(rename = "sendMultisigTxs")]
    send_multisig_txs: bool,
    #[sqlx(rename = "sendEtherTransfers")]
    send_ether_transfers: bool,
    #[sqlx(rename = "sendTokenTransfers")]
    send_token_transfers: bool,
    #[sqlx(rename = "sendModuleTransactions")]
    send_module_transactions: bool,
    #[sqlx(rename = "sendSafeCreations")]
    send_safe_creations: bool,
    #[sqlx(rename = "sendMessages")]
    send_messages: bool,
    #[sqlx(rename = "sendReorgs")]
    send_reorgs: bool,
    #[sqlx(rename = "sendDelegates")]
    send_delegates: bool,
}

impl From<WebhookRow> for WebhookSubscription {
    fn from(row: WebhookRow) -> Self {
        WebhookSubscription {
            id: WebhookId(row.id),
            url: row.url,
            description: row.description,
            is_active: row.is_active,
            authorization: row.authorization,
            chains: row.chains.iter().map(i64::to_string).collect(),
            addresses: row.addresses,
            send_confirmations: row.send_confirmations,
            send_multisig_txs: row.send_multisig_txs,
            send_ether_transfers: row.send_ether_transfers,
            send_token_transfers: row.send_token_transfers,
            send_module_transactions: row.send_module_transactions,
            send_safe_creations: row.send_safe_creations,
            send_messages: row.send_messages,
            send_reorgs: row.send_reorgs,
            send_delegates: row.send_delegates,
        }
    }
}

/// Chain ids are stored as `bigint`
fn chains_to_db(chains: &[String]) -> Result<Vec<i64>> {
    chains
        .iter()
        .map(|chain| {
            chain
                .parse::<i64>()
                .map_err(|_| InfraError::Configuration(format!("Invalid chain id: {chain}")))
        })
        .collect()
}

/// Webhook repository backed by the shared `webhook` table
#[derive(Clone)]
pub struct PgWebhookRepository {
    pool: PgPool,
}

impl PgWebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WebhookRepository for PgWebhookRepository {
    async fn find_active(&self) -> relay_core::Result<Vec<WebhookSubscription>> {
        let query = format!(r#"{SELECT_COLUMNS} WHERE "isActive" = true"#);
        let rows: Vec<WebhookRow> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(InfraError::from)?;

        debug!(count = rows.len(), "Loaded active webhooks");
        Ok(rows.into_iter().map(WebhookSubscription::from).collect())
    }

    async fn find_by_id(&self, id: &WebhookId) -> relay_core::Result<Option<WebhookSubscription>> {
        let query = format!(r#"{SELECT_COLUMNS} WHERE "id" = $1"#);
        let row: Option<WebhookRow> = sqlx::query_as(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(InfraError::from)?;

        Ok(row.map(WebhookSubscription::from))
    }

    async fn save(&self, subscription: &WebhookSubscription) -> relay_core::Result<()> {
        let chains = chains_to_db(&subscription.chains)?;

        sqlx::query(
            r#"INSERT INTO "webhook" ("id", "url", "description", "isActive", "authorization", "chains",
                "addresses", "sendConfirmations", "sendMultisigTxs", "sendEtherTransfers",
                "sendTokenTransfers", "sendModuleTransactions", "sendSafeCreations", "sendMessages",
                "sendReorgs", "sendDelegates")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT ("id") DO UPDATE SET
                "url" = EXCLUDED."url",
                "description" = EXCLUDED."description",
                "isActive" = EXCLUDED."isActive",
                "authorization" = EXCLUDED."authorization",
                "chains" = EXCLUDED."chains",
                "addresses" = EXCLUDED."addresses",
                "sendConfirmations" = EXCLUDED."sendConfirmations",
                "sendMultisigTxs" = EXCLUDED."sendMultisigTxs",
                "sendEtherTransfers" = EXCLUDED."sendEtherTransfers",
                "sendTokenTransfers" = EXCLUDED."sendTokenTransfers",
                "sendModuleTransactions" = EXCLUDED."sendModuleTransactions",
                "sendSafeCreations" = EXCLUDED."sendSafeCreations",
                "sendMessages" = EXCLUDED."sendMessages",
                "sendReorgs" = EXCLUDED."sendReorgs",
                "sendDelegates" = EXCLUDED."sendDelegates""#,
        )
        .bind(subscription.id.0)
        .bind(&subscription.url)
        .bind(&subscription.description)
        .bind(subscription.is_active)
        .bind(&subscription.authorization)
        .bind(chains)
        .bind(&subscription.addresses)
        .bind(subscription.send_confirmations)
        .bind(subscription.send_multisig_txs)
        .bind(subscription.send_ether_transfers)
        .bind(subscription.send_token_transfers)
        .bind(subscription.send_module_transactions)
        .bind(subscription.send_safe_creations)
        .bind(subscription.send_messages)
        .bind(subscription.send_reorgs)
        .bind(subscription.send_delegates)
        .execute(&self.pool)
        .await
        .map_err(InfraError::from)?;

        Ok(())
    }

    async fn deactivate(&self, id: &WebhookId) -> relay_core::Result<bool> {
        let result = sqlx::query(
            r#"UPDATE "webhook" SET "isActive" = false WHERE "id" = $1 AND "isActive" = true"#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(InfraError::from)?;

        Ok(result.rows_affected() > 0)
    }
}
