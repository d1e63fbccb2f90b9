//! Schema bootstrap for the gift store.
//!
//! Counter invariants are also enforced by CHECK constraints so that even a
//! buggy transaction cannot commit an oversold kind.

use sqlx::PgPool;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    tg_id BIGINT NOT NULL UNIQUE,
    language_code TEXT,
    received_gifts_count INT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (received_gifts_count >= 0)
)
"#;

const CREATE_GIFT_KINDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gift_kinds (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    price_asset TEXT NOT NULL,
    price_amount NUMERIC NOT NULL,
    limit_count INT NOT NULL,
    purchased_count INT NOT NULL DEFAULT 0,
    reserved_count INT NOT NULL DEFAULT 0,
    CHECK (purchased_count >= 0),
    CHECK (reserved_count >= 0),
    CHECK (purchased_count + reserved_count <= limit_count)
)
"#;

const CREATE_GIFTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gifts (
    id UUID PRIMARY KEY,
    kind_id UUID NOT NULL REFERENCES gift_kinds(id),
    purchaser_id UUID NOT NULL REFERENCES users(id),
    send_token TEXT NOT NULL,
    invoice JSONB NOT NULL,
    invoice_id BIGINT NOT NULL,
    status SMALLINT NOT NULL,
    order_num INT,
    sent_at TIMESTAMPTZ,
    receiver_id UUID REFERENCES users(id),
    UNIQUE (purchaser_id, send_token)
)
"#;

// One live reservation per (kind, purchaser); repeat requests return it.
const CREATE_GIFTS_RESERVATION_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS gifts_one_reservation_idx
    ON gifts (kind_id, purchaser_id) WHERE status = 0
"#;

const CREATE_GIFTS_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS gifts_status_idx ON gifts (status)
"#;

const CREATE_GIFTS_RECEIVER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS gifts_receiver_idx
    ON gifts (receiver_id, sent_at DESC) WHERE status = 2
"#;

const CREATE_RECEIVE_TOKENS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gift_receive_tokens (
    token TEXT PRIMARY KEY,
    gift_id UUID NOT NULL UNIQUE,
    issued_at TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_GIFT_ACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gift_actions (
    id UUID PRIMARY KEY,
    gift_id UUID NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL,
    kind SMALLINT NOT NULL,
    purchaser_id UUID,
    sender_id UUID,
    receiver_id UUID,
    price_asset TEXT,
    price_amount NUMERIC
)
"#;

/// Create all tables and indexes if they do not exist yet.
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing gift store schema");

    for ddl in [
        CREATE_USERS_TABLE,
        CREATE_GIFT_KINDS_TABLE,
        CREATE_GIFTS_TABLE,
        CREATE_GIFTS_RESERVATION_INDEX,
        CREATE_GIFTS_STATUS_INDEX,
        CREATE_GIFTS_RECEIVER_INDEX,
        CREATE_RECEIVE_TOKENS_TABLE,
        CREATE_GIFT_ACTIONS_TABLE,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}
