//! Postgres-backed account ledger with idempotent entries.
#![allow(clippy::needless_raw_string_hashes)]

use super::{
    errors::{AccountError, AccountResult},
    ledger::{AccountLedger, reversal_key},
    models::{Account, EntryDirection, EntryType, LedgerEntry},
};
use crate::tournament::{PlayerId, PrizeCredit};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

/// Account ledger stored in the `accounts` and `ledger_entries` tables
#[derive(Clone)]
pub struct PgAccountLedger {
    pool: Arc<PgPool>,
    opening_balance: i64,
}

impl PgAccountLedger {
    /// Create a new ledger
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `opening_balance` - Coins granted to an account the first time it is touched
    pub fn new(pool: Arc<PgPool>, opening_balance: i64) -> Self {
        Self {
            pool,
            opening_balance,
        }
    }

    /// Get an account by player
    pub async fn get_account(&self, player_id: PlayerId) -> AccountResult<Account> {
        let row = sqlx::query(
            r#"
            SELECT player_id, coins, tournaments_won, updated_at
            FROM accounts
            WHERE player_id = $1
            "#,
        )
        .bind(player_id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(AccountError::AccountNotFound(player_id))?;

        Ok(Account {
            player_id: row.get("player_id"),
            coins: row.get("coins"),
            tournaments_won: row.get("tournaments_won"),
            updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
        })
    }

    /// Get ledger entries for a player, newest first
    pub async fn get_entries(&self, player_id: PlayerId, limit: i64) -> AccountResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT player_id, amount, balance_after, direction, entry_type, idempotency_key, created_at
            FROM ledger_entries
            WHERE player_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(player_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        let entries = rows
            .into_iter()
            .map(|row| {
                let amount: i64 = row.get("amount");
                let entry_type = match row.get::<String, _>("entry_type").as_str() {
                    "entry_fee" => EntryType::EntryFee,
                    "refund" => EntryType::Refund,
                    _ => EntryType::Prize,
                };
                LedgerEntry {
                    player_id: row.get("player_id"),
                    amount,
                    balance_after: row.get("balance_after"),
                    direction: if row.get::<String, _>("direction") == "debit" {
                        EntryDirection::Debit
                    } else {
                        EntryDirection::Credit
                    },
                    entry_type,
                    idempotency_key: row.get("idempotency_key"),
                    created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
                }
            })
            .collect();

        Ok(entries)
    }

    async fn ensure_account(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        player_id: PlayerId,
    ) -> AccountResult<()> {
        sqlx::query(
            "INSERT INTO accounts (player_id, coins)
             VALUES ($1, $2)
             ON CONFLICT (player_id) DO NOTHING",
        )
        .bind(player_id)
        .bind(self.opening_balance)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn key_used(
        tx: &mut Transaction<'_, Postgres>,
        idempotency_key: &str,
    ) -> AccountResult<bool> {
        let existing = sqlx::query("SELECT id FROM ledger_entries WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(existing.is_some())
    }

    /// Credit coins inside an open transaction, returning the new balance
    async fn credit_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        player_id: PlayerId,
        amount: i64,
        entry_type: EntryType,
        idempotency_key: &str,
    ) -> AccountResult<i64> {
        self.ensure_account(tx, player_id).await?;

        let row = sqlx::query(
            "UPDATE accounts
             SET coins = coins + $1, updated_at = NOW()
             WHERE player_id = $2
             RETURNING coins",
        )
        .bind(amount)
        .bind(player_id)
        .fetch_one(&mut **tx)
        .await?;
        let new_balance: i64 = row.get("coins");

        Self::create_entry(
            tx,
            player_id,
            amount,
            new_balance,
            EntryDirection::Credit,
            entry_type,
            idempotency_key,
        )
        .await?;

        Ok(new_balance)
    }

    async fn create_entry(
        tx: &mut Transaction<'_, Postgres>,
        player_id: PlayerId,
        amount: i64,
        balance_after: i64,
        direction: EntryDirection,
        entry_type: EntryType,
        idempotency_key: &str,
    ) -> AccountResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO ledger_entries (player_id, amount, balance_after, direction, entry_type, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(player_id)
        .bind(amount)
        .bind(balance_after)
        .bind(direction.to_string())
        .bind(entry_type.to_string())
        .bind(idempotency_key)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.get("id"))
    }
}

#[async_trait]
impl AccountLedger for PgAccountLedger {
    async fn balance(&self, player_id: PlayerId) -> AccountResult<i64> {
        let row = sqlx::query("SELECT coins FROM accounts WHERE player_id = $1")
            .bind(player_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map_or(self.opening_balance, |row| row.get("coins")))
    }

    async fn debit(
        &self,
        player_id: PlayerId,
        amount: i64,
        entry_type: EntryType,
        idempotency_key: &str,
    ) -> AccountResult<i64> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;

        if Self::key_used(&mut tx, idempotency_key).await? {
            return Err(AccountError::DuplicateTransaction(idempotency_key.to_string()));
        }

        self.ensure_account(&mut tx, player_id).await?;

        // Check and update in one statement so concurrent debits cannot overdraw
        let debited = sqlx::query(
            "UPDATE accounts
             SET coins = coins - $1, updated_at = NOW()
             WHERE player_id = $2 AND coins >= $1
             RETURNING coins",
        )
        .bind(amount)
        .bind(player_id)
        .fetch_optional(&mut *tx)
        .await?;

        let new_balance: i64 = match debited {
            Some(row) => row.get("coins"),
            None => {
                let row = sqlx::query("SELECT coins FROM accounts WHERE player_id = $1")
                    .bind(player_id)
                    .fetch_one(&mut *tx)
                    .await?;
                return Err(AccountError::InsufficientBalance {
                    player_id,
                    available: row.get("coins"),
                    required: amount,
                });
            }
        };

        Self::create_entry(
            &mut tx,
            player_id,
            -amount,
            new_balance,
            EntryDirection::Debit,
            entry_type,
            idempotency_key,
        )
        .await?;

        tx.commit().await?;

        Ok(new_balance)
    }

    async fn credit(
        &self,
        player_id: PlayerId,
        amount: i64,
        entry_type: EntryType,
        idempotency_key: &str,
    ) -> AccountResult<i64> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;

        if Self::key_used(&mut tx, idempotency_key).await? {
            return Err(AccountError::DuplicateTransaction(idempotency_key.to_string()));
        }

        let new_balance = self
            .credit_in(&mut tx, player_id, amount, entry_type, idempotency_key)
            .await?;

        tx.commit().await?;

        Ok(new_balance)
    }

    async fn increment_tournament_wins(&self, player_id: PlayerId) -> AccountResult<()> {
        let mut tx = self.pool.begin().await?;
        self.ensure_account(&mut tx, player_id).await?;

        sqlx::query(
            "UPDATE accounts
             SET tournaments_won = tournaments_won + 1, updated_at = NOW()
             WHERE player_id = $1",
        )
        .bind(player_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn award_prizes(&self, credits: &[PrizeCredit]) -> AccountResult<()> {
        if let Some(bad) = credits.iter().find(|c| c.amount < 0) {
            return Err(AccountError::InvalidAmount(bad.amount));
        }

        let mut tx = self.pool.begin().await?;

        for credit in credits {
            if Self::key_used(&mut tx, &credit.idempotency_key).await? {
                log::warn!("Prize {} already paid, skipping", credit.idempotency_key);
                continue;
            }

            if credit.amount > 0 {
                self.credit_in(
                    &mut tx,
                    credit.player_id,
                    credit.amount,
                    EntryType::Prize,
                    &credit.idempotency_key,
                )
                .await?;
            } else {
                // Zero prizes still claim their key so a retry stays a no-op
                self.ensure_account(&mut tx, credit.player_id).await?;
                let row = sqlx::query("SELECT coins FROM accounts WHERE player_id = $1")
                    .bind(credit.player_id)
                    .fetch_one(&mut *tx)
                    .await?;
                Self::create_entry(
                    &mut tx,
                    credit.player_id,
                    0,
                    row.get("coins"),
                    EntryDirection::Credit,
                    EntryType::Prize,
                    &credit.idempotency_key,
                )
                .await?;
            }

            if credit.champion {
                sqlx::query(
                    "UPDATE accounts
                     SET tournaments_won = tournaments_won + 1, updated_at = NOW()
                     WHERE player_id = $1",
                )
                .bind(credit.player_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        Ok(())
    }

    async fn revoke_prizes(&self, credits: &[PrizeCredit]) -> AccountResult<()> {
        let mut tx = self.pool.begin().await?;

        for credit in credits {
            let reversal = reversal_key(&credit.idempotency_key);
            if !Self::key_used(&mut tx, &credit.idempotency_key).await?
                || Self::key_used(&mut tx, &reversal).await?
            {
                continue;
            }

            // The coins check rolls back the whole revocation on a shortfall
            let row = sqlx::query(
                "UPDATE accounts
                 SET coins = coins - $1,
                     tournaments_won = tournaments_won - $2,
                     updated_at = NOW()
                 WHERE player_id = $3 AND coins >= $1
                 RETURNING coins",
            )
            .bind(credit.amount)
            .bind(i32::from(credit.champion))
            .bind(credit.player_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                let available = sqlx::query("SELECT coins FROM accounts WHERE player_id = $1")
                    .bind(credit.player_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .map_or(0, |row| row.get("coins"));
                return Err(AccountError::InsufficientBalance {
                    player_id: credit.player_id,
                    available,
                    required: credit.amount,
                });
            };

            Self::create_entry(
                &mut tx,
                credit.player_id,
                -credit.amount,
                row.get("coins"),
                EntryDirection::Debit,
                EntryType::Prize,
                &reversal,
            )
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn entry_applied(&self, idempotency_key: &str) -> AccountResult<bool> {
        let row = sqlx::query("SELECT id FROM ledger_entries WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.is_some())
    }
}
