// db/walletdb.rs
use async_trait::async_trait;
use sqlx::{Error, PgConnection};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::walletmodels::*;
use crate::service::error::FlowError;

/// What a journal row is tied to: a conversation, an escrow hold, an
/// external payment, or any combination.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub conversation_id: Option<Uuid>,
    pub hold_id: Option<Uuid>,
    pub external_payment_id: Option<String>,
}

impl Correlation {
    pub fn conversation(conversation_id: Uuid) -> Self {
        Correlation {
            conversation_id: Some(conversation_id),
            ..Default::default()
        }
    }

    pub fn hold(conversation_id: Uuid, hold_id: Uuid) -> Self {
        Correlation {
            conversation_id: Some(conversation_id),
            hold_id: Some(hold_id),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait WalletExt {
    async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, Error>;
    async fn get_or_create_wallet(&self, user_id: Uuid) -> Result<Wallet, Error>;
    async fn get_wallet_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>, Error>;
}

#[async_trait]
impl WalletExt for DBClient {
    async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, Error> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance_total, balance_frozen, created_at, updated_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_or_create_wallet(&self, user_id: Uuid) -> Result<Wallet, Error> {
        sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = NOW()
            RETURNING id, user_id, balance_total, balance_frozen, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_wallet_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>, Error> {
        sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT id, wallet_id, user_id, amount, direction, stage,
                   conversation_id, hold_id, external_payment_id, status,
                   description, created_at
            FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }
}

/// Lock the wallet row for the remainder of the enclosing transaction,
/// creating it on first touch.
pub async fn lock_wallet(conn: &mut PgConnection, user_id: Uuid) -> Result<Wallet, FlowError> {
    sqlx::query(
        r#"
        INSERT INTO wallets (user_id)
        VALUES ($1)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        SELECT id, user_id, balance_total, balance_frozen, created_at, updated_at
        FROM wallets
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(wallet)
}

async fn journal(
    conn: &mut PgConnection,
    wallet: &Wallet,
    amount: i64,
    direction: TransactionDirection,
    stage: TransactionStage,
    correlation: &Correlation,
    description: &str,
) -> Result<WalletTransaction, FlowError> {
    let row = sqlx::query_as::<_, WalletTransaction>(
        r#"
        INSERT INTO wallet_transactions
            (wallet_id, user_id, amount, direction, stage,
             conversation_id, hold_id, external_payment_id, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, wallet_id, user_id, amount, direction, stage,
                  conversation_id, hold_id, external_payment_id, status,
                  description, created_at
        "#,
    )
    .bind(wallet.id)
    .bind(wallet.user_id)
    .bind(amount)
    .bind(direction)
    .bind(stage)
    .bind(correlation.conversation_id)
    .bind(correlation.hold_id)
    .bind(correlation.external_payment_id.clone())
    .bind(description)
    .fetch_one(conn)
    .await?;

    Ok(row)
}

async fn set_balances(
    conn: &mut PgConnection,
    wallet_id: Uuid,
    total: i64,
    frozen: i64,
) -> Result<(), FlowError> {
    sqlx::query(
        r#"
        UPDATE wallets
        SET balance_total = $2, balance_frozen = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(wallet_id)
    .bind(total)
    .bind(frozen)
    .execute(conn)
    .await?;
    Ok(())
}

/// Increase the wallet total. One journal row, stage `deposit`.
pub async fn credit(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
    correlation: &Correlation,
    description: &str,
) -> Result<WalletTransaction, FlowError> {
    if amount <= 0 {
        return Err(FlowError::InvalidInput("credit amount must be positive".to_string()));
    }
    let wallet = lock_wallet(conn, user_id).await?;
    set_balances(conn, wallet.id, wallet.balance_total + amount, wallet.balance_frozen).await?;
    journal(
        conn,
        &wallet,
        amount,
        TransactionDirection::Credit,
        TransactionStage::Deposit,
        correlation,
        description,
    )
    .await
}

/// Move available funds into the frozen bucket. Journalled as a credit into
/// the correlated conversation's escrow.
pub async fn freeze(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
    correlation: &Correlation,
    description: &str,
) -> Result<WalletTransaction, FlowError> {
    if amount <= 0 {
        return Err(FlowError::InvalidInput("freeze amount must be positive".to_string()));
    }
    let wallet = lock_wallet(conn, user_id).await?;
    if wallet.available() < amount {
        return Err(FlowError::InsufficientAvailable {
            required: amount,
            available: wallet.available(),
        });
    }
    set_balances(conn, wallet.id, wallet.balance_total, wallet.balance_frozen + amount).await?;
    journal(
        conn,
        &wallet,
        amount,
        TransactionDirection::Credit,
        TransactionStage::Freeze,
        correlation,
        description,
    )
    .await
}

/// Move frozen funds back to available. `stage` distinguishes a work-approval
/// `release` from a plain `unfreeze` (auto-release).
pub async fn release(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
    stage: TransactionStage,
    correlation: &Correlation,
    description: &str,
) -> Result<WalletTransaction, FlowError> {
    if amount <= 0 {
        return Err(FlowError::InvalidInput("release amount must be positive".to_string()));
    }
    let wallet = lock_wallet(conn, user_id).await?;
    if wallet.balance_frozen < amount {
        return Err(FlowError::InsufficientFrozen {
            required: amount,
            frozen: wallet.balance_frozen,
        });
    }
    set_balances(conn, wallet.id, wallet.balance_total, wallet.balance_frozen - amount).await?;
    journal(
        conn,
        &wallet,
        amount,
        TransactionDirection::Debit,
        stage,
        correlation,
        description,
    )
    .await
}

/// Refund frozen funds out of the wallet entirely (frozen and total both
/// drop). Used when a paid collaboration is cancelled.
pub async fn refund(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
    correlation: &Correlation,
    description: &str,
) -> Result<WalletTransaction, FlowError> {
    if amount <= 0 {
        return Err(FlowError::InvalidInput("refund amount must be positive".to_string()));
    }
    let wallet = lock_wallet(conn, user_id).await?;
    if wallet.balance_frozen < amount {
        return Err(FlowError::InsufficientFrozen {
            required: amount,
            frozen: wallet.balance_frozen,
        });
    }
    set_balances(
        conn,
        wallet.id,
        wallet.balance_total - amount,
        wallet.balance_frozen - amount,
    )
    .await?;
    journal(
        conn,
        &wallet,
        amount,
        TransactionDirection::Debit,
        TransactionStage::Refund,
        correlation,
        description,
    )
    .await
}

/// Decrease the wallet total from available funds.
pub async fn withdraw(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
    correlation: &Correlation,
    description: &str,
) -> Result<WalletTransaction, FlowError> {
    if amount <= 0 {
        return Err(FlowError::InvalidInput("withdraw amount must be positive".to_string()));
    }
    let wallet = lock_wallet(conn, user_id).await?;
    if wallet.available() < amount {
        return Err(FlowError::InsufficientAvailable {
            required: amount,
            available: wallet.available(),
        });
    }
    set_balances(conn, wallet.id, wallet.balance_total - amount, wallet.balance_frozen).await?;
    journal(
        conn,
        &wallet,
        amount,
        TransactionDirection::Debit,
        TransactionStage::Withdraw,
        correlation,
        description,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recompute (total, frozen) from the journal. Balance columns are
    // caches; these tests assert the stage semantics replay to them.
    fn replay_balances(log: &[WalletTransaction]) -> (i64, i64) {
        let mut total = 0i64;
        let mut frozen = 0i64;
        for row in log {
            if row.status == TransactionStatus::Reversed {
                continue;
            }
            match row.stage {
                TransactionStage::Deposit => total += row.amount,
                TransactionStage::Withdraw => total -= row.amount,
                TransactionStage::Freeze => frozen += row.amount,
                TransactionStage::Unfreeze | TransactionStage::Release => frozen -= row.amount,
                TransactionStage::Refund => {
                    total -= row.amount;
                    frozen -= row.amount;
                }
            }
        }
        (total, frozen)
    }

    fn row(amount: i64, direction: TransactionDirection, stage: TransactionStage) -> WalletTransaction {
        WalletTransaction {
            id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount,
            direction,
            stage,
            conversation_id: None,
            hold_id: None,
            external_payment_id: None,
            status: TransactionStatus::Completed,
            description: String::new(),
            created_at: None,
        }
    }

    #[test]
    fn replay_happy_path_matches_s1() {
        // capture -> freeze -> release, like an approved collaboration
        let log = vec![
            row(100_000, TransactionDirection::Credit, TransactionStage::Deposit),
            row(100_000, TransactionDirection::Credit, TransactionStage::Freeze),
            row(100_000, TransactionDirection::Debit, TransactionStage::Release),
        ];
        assert_eq!(replay_balances(&log), (100_000, 0));
    }

    #[test]
    fn replay_refund_removes_funds_entirely() {
        let log = vec![
            row(50_000, TransactionDirection::Credit, TransactionStage::Deposit),
            row(50_000, TransactionDirection::Credit, TransactionStage::Freeze),
            row(50_000, TransactionDirection::Debit, TransactionStage::Refund),
        ];
        assert_eq!(replay_balances(&log), (0, 0));
    }

    fn tagged(mut row: WalletTransaction, conversation_id: Uuid) -> WalletTransaction {
        row.conversation_id = Some(conversation_id);
        row
    }

    // A conversation's escrow balance is readable straight off the journal:
    // credits minus debits over its tagged rows.
    fn conversation_escrow_balance(log: &[WalletTransaction], conversation_id: Uuid) -> i64 {
        log.iter()
            .filter(|row| {
                row.conversation_id == Some(conversation_id)
                    && row.status != TransactionStatus::Reversed
            })
            .map(|row| match row.direction {
                TransactionDirection::Credit => row.amount,
                TransactionDirection::Debit => -row.amount,
            })
            .sum()
    }

    #[test]
    fn tagged_rows_mirror_the_open_hold() {
        let conversation = Uuid::new_v4();
        // capture keys the deposit to the payment, never the conversation
        let mut deposit = row(100_000, TransactionDirection::Credit, TransactionStage::Deposit);
        deposit.external_payment_id = Some("pay_x".to_string());

        let mut log = vec![
            deposit,
            tagged(
                row(100_000, TransactionDirection::Credit, TransactionStage::Freeze),
                conversation,
            ),
        ];
        assert_eq!(conversation_escrow_balance(&log, conversation), 100_000);

        log.push(tagged(
            row(100_000, TransactionDirection::Debit, TransactionStage::Release),
            conversation,
        ));
        assert_eq!(conversation_escrow_balance(&log, conversation), 0);
    }

    #[test]
    fn tagged_rows_zero_out_after_a_refund() {
        let conversation = Uuid::new_v4();
        let mut deposit = row(50_000, TransactionDirection::Credit, TransactionStage::Deposit);
        deposit.external_payment_id = Some("pay_y".to_string());

        let log = vec![
            deposit,
            tagged(
                row(50_000, TransactionDirection::Credit, TransactionStage::Freeze),
                conversation,
            ),
            tagged(
                row(50_000, TransactionDirection::Debit, TransactionStage::Refund),
                conversation,
            ),
        ];
        assert_eq!(conversation_escrow_balance(&log, conversation), 0);
    }

    #[test]
    fn replay_ignores_reversed_rows() {
        let mut reversed = row(10_000, TransactionDirection::Credit, TransactionStage::Deposit);
        reversed.status = TransactionStatus::Reversed;
        let log = vec![
            row(20_000, TransactionDirection::Credit, TransactionStage::Deposit),
            reversed,
        ];
        assert_eq!(replay_balances(&log), (20_000, 0));
    }
}
