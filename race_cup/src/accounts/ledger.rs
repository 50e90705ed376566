//! Account ledger contract and the in-memory implementation.

use super::{
    errors::{AccountError, AccountResult},
    models::{Account, EntryDirection, EntryType, LedgerEntry},
};
use crate::tournament::{PlayerId, PrizeCredit};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Coin balances owned by the account service
#[async_trait]
pub trait AccountLedger: Send + Sync {
    /// Current coin balance
    async fn balance(&self, player_id: PlayerId) -> AccountResult<i64>;

    /// Remove coins, failing with `InsufficientBalance` rather than going negative.
    /// Returns the new balance.
    async fn debit(
        &self,
        player_id: PlayerId,
        amount: i64,
        entry_type: EntryType,
        idempotency_key: &str,
    ) -> AccountResult<i64>;

    /// Add coins. Returns the new balance.
    async fn credit(
        &self,
        player_id: PlayerId,
        amount: i64,
        entry_type: EntryType,
        idempotency_key: &str,
    ) -> AccountResult<i64>;

    /// Record a tournament win
    async fn increment_tournament_wins(&self, player_id: PlayerId) -> AccountResult<()>;

    /// Pay every prize and record the champion's win as one unit: either all
    /// credits apply or none do. Credits whose idempotency key was already
    /// applied are skipped, so a retried payout never pays twice.
    async fn award_prizes(&self, credits: &[PrizeCredit]) -> AccountResult<()>;

    /// Undo a payout whose tournament state could not be persisted. Every
    /// applied credit is taken back under `{key}:reversal` together with the
    /// champion's win; credits never applied or already reversed are skipped.
    async fn revoke_prizes(&self, credits: &[PrizeCredit]) -> AccountResult<()>;

    /// Whether an entry with this idempotency key has been recorded
    async fn entry_applied(&self, idempotency_key: &str) -> AccountResult<bool>;
}

/// Idempotency key of the entry that reverses `idempotency_key`
pub fn reversal_key(idempotency_key: &str) -> String {
    format!("{idempotency_key}:reversal")
}

#[derive(Default)]
struct Book {
    accounts: HashMap<PlayerId, Account>,
    entries: Vec<LedgerEntry>,
    keys: HashSet<String>,
}

impl Book {
    fn account(&mut self, player_id: PlayerId, opening_balance: i64) -> &mut Account {
        self.accounts.entry(player_id).or_insert_with(|| Account {
            player_id,
            coins: opening_balance,
            tournaments_won: 0,
            updated_at: Utc::now(),
        })
    }

    fn record(
        &mut self,
        player_id: PlayerId,
        amount: i64,
        balance_after: i64,
        direction: EntryDirection,
        entry_type: EntryType,
        idempotency_key: &str,
    ) {
        self.keys.insert(idempotency_key.to_string());
        self.entries.push(LedgerEntry {
            player_id,
            amount,
            balance_after,
            direction,
            entry_type,
            idempotency_key: idempotency_key.to_string(),
            created_at: Utc::now(),
        });
    }
}

/// In-process ledger. Accounts open on first use with `opening_balance` coins.
pub struct MemoryAccountLedger {
    opening_balance: i64,
    book: Mutex<Book>,
}

impl MemoryAccountLedger {
    pub fn new(opening_balance: i64) -> Self {
        Self {
            opening_balance,
            book: Mutex::new(Book::default()),
        }
    }

    /// Set a player's balance, opening the account if needed
    pub async fn set_balance(&self, player_id: PlayerId, coins: i64) {
        let mut book = self.book.lock().await;
        book.account(player_id, self.opening_balance).coins = coins;
    }

    pub async fn account(&self, player_id: PlayerId) -> Option<Account> {
        self.book.lock().await.accounts.get(&player_id).cloned()
    }

    /// Ledger history of one player, oldest first
    pub async fn entries(&self, player_id: PlayerId) -> Vec<LedgerEntry> {
        self.book
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.player_id == player_id)
            .cloned()
            .collect()
    }
}

impl Default for MemoryAccountLedger {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl AccountLedger for MemoryAccountLedger {
    async fn balance(&self, player_id: PlayerId) -> AccountResult<i64> {
        let mut book = self.book.lock().await;
        Ok(book.account(player_id, self.opening_balance).coins)
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

        let mut book = self.book.lock().await;
        if book.keys.contains(idempotency_key) {
            return Err(AccountError::DuplicateTransaction(idempotency_key.to_string()));
        }

        let account = book.account(player_id, self.opening_balance);
        if account.coins < amount {
            return Err(AccountError::InsufficientBalance {
                player_id,
                available: account.coins,
                required: amount,
            });
        }

        account.coins -= amount;
        account.updated_at = Utc::now();
        let balance = account.coins;
        book.record(
            player_id,
            -amount,
            balance,
            EntryDirection::Debit,
            entry_type,
            idempotency_key,
        );

        Ok(balance)
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

        let mut book = self.book.lock().await;
        if book.keys.contains(idempotency_key) {
            return Err(AccountError::DuplicateTransaction(idempotency_key.to_string()));
        }

        let account = book.account(player_id, self.opening_balance);
        account.coins += amount;
        account.updated_at = Utc::now();
        let balance = account.coins;
        book.record(
            player_id,
            amount,
            balance,
            EntryDirection::Credit,
            entry_type,
            idempotency_key,
        );

        Ok(balance)
    }

    async fn increment_tournament_wins(&self, player_id: PlayerId) -> AccountResult<()> {
        let mut book = self.book.lock().await;
        let account = book.account(player_id, self.opening_balance);
        account.tournaments_won += 1;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn award_prizes(&self, credits: &[PrizeCredit]) -> AccountResult<()> {
        if let Some(bad) = credits.iter().find(|c| c.amount < 0) {
            return Err(AccountError::InvalidAmount(bad.amount));
        }

        // Single lock scope: nothing else observes a half-paid tournament
        let mut book = self.book.lock().await;
        for credit in credits {
            if book.keys.contains(&credit.idempotency_key) {
                log::warn!(
                    "Prize {} already paid, skipping",
                    credit.idempotency_key
                );
                continue;
            }

            let account = book.account(credit.player_id, self.opening_balance);
            account.coins += credit.amount;
            if credit.champion {
                account.tournaments_won += 1;
            }
            account.updated_at = Utc::now();
            let balance = account.coins;
            book.record(
                credit.player_id,
                credit.amount,
                balance,
                EntryDirection::Credit,
                EntryType::Prize,
                &credit.idempotency_key,
            );
        }

        Ok(())
    }

    async fn revoke_prizes(&self, credits: &[PrizeCredit]) -> AccountResult<()> {
        let mut book = self.book.lock().await;
        let pending: Vec<(&PrizeCredit, String)> = credits
            .iter()
            .map(|c| (c, reversal_key(&c.idempotency_key)))
            .filter(|(c, reversal)| {
                book.keys.contains(&c.idempotency_key) && !book.keys.contains(reversal)
            })
            .collect();

        // Check every balance first so a shortfall leaves the book untouched
        for (credit, _) in &pending {
            let account = book.account(credit.player_id, self.opening_balance);
            if account.coins < credit.amount {
                return Err(AccountError::InsufficientBalance {
                    player_id: credit.player_id,
                    available: account.coins,
                    required: credit.amount,
                });
            }
        }

        for (credit, reversal) in pending {
            let account = book.account(credit.player_id, self.opening_balance);
            account.coins -= credit.amount;
            if credit.champion {
                account.tournaments_won -= 1;
            }
            account.updated_at = Utc::now();
            let balance = account.coins;
            book.record(
                credit.player_id,
                -credit.amount,
                balance,
                EntryDirection::Debit,
                EntryType::Prize,
                &reversal,
            );
        }

        Ok(())
    }

    async fn entry_applied(&self, idempotency_key: &str) -> AccountResult<bool> {
        Ok(self.book.lock().await.keys.contains(idempotency_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debit_and_credit() {
        let ledger = MemoryAccountLedger::new(500);
        assert_eq!(ledger.debit(1, 200, EntryType::EntryFee, "a").await.unwrap(), 300);
        assert_eq!(ledger.credit(1, 200, EntryType::Refund, "b").await.unwrap(), 500);

        let entries = ledger.entries(1).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].direction, EntryDirection::Debit);
        assert_eq!(entries[0].amount, -200);
        assert_eq!(entries[1].entry_type, EntryType::Refund);
    }

    #[tokio::test]
    async fn test_debit_never_goes_negative() {
        let ledger = MemoryAccountLedger::new(50);
        let result = ledger.debit(1, 51, EntryType::EntryFee, "k").await;
        assert!(matches!(
            result,
            Err(AccountError::InsufficientBalance { available: 50, required: 51, .. })
        ));
        assert_eq!(ledger.balance(1).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_duplicate_keys_rejected() {
        let ledger = MemoryAccountLedger::default();
        ledger.credit(1, 10, EntryType::Refund, "same").await.unwrap();
        assert!(matches!(
            ledger.credit(1, 10, EntryType::Refund, "same").await,
            Err(AccountError::DuplicateTransaction(_))
        ));
        assert_eq!(ledger.balance(1).await.unwrap(), 1010);
    }

    #[tokio::test]
    async fn test_award_prizes_once() {
        let ledger = MemoryAccountLedger::new(0);
        let credits = vec![
            PrizeCredit {
                player_id: 1,
                amount: 60,
                champion: true,
                idempotency_key: "t:prize:1".to_string(),
            },
            PrizeCredit {
                player_id: 2,
                amount: 40,
                champion: false,
                idempotency_key: "t:prize:2".to_string(),
            },
        ];

        ledger.award_prizes(&credits).await.unwrap();
        ledger.award_prizes(&credits).await.unwrap();

        let champion = ledger.account(1).await.unwrap();
        assert_eq!(champion.coins, 60);
        assert_eq!(champion.tournaments_won, 1);
        assert_eq!(ledger.account(2).await.unwrap().coins, 40);
        assert_eq!(ledger.account(2).await.unwrap().tournaments_won, 0);
    }

    fn credits(champion: PlayerId, runner_up: PlayerId) -> Vec<PrizeCredit> {
        vec![
            PrizeCredit {
                player_id: champion,
                amount: 60,
                champion: true,
                idempotency_key: format!("t:prize:{champion}"),
            },
            PrizeCredit {
                player_id: runner_up,
                amount: 0,
                champion: false,
                idempotency_key: format!("t:prize:{runner_up}"),
            },
        ]
    }

    #[tokio::test]
    async fn test_revoke_prizes_restores_accounts() {
        let ledger = MemoryAccountLedger::new(100);
        let paid = credits(1, 2);
        ledger.award_prizes(&paid).await.unwrap();
        assert_eq!(ledger.balance(1).await.unwrap(), 160);

        ledger.revoke_prizes(&paid).await.unwrap();
        ledger.revoke_prizes(&paid).await.unwrap();

        let champion = ledger.account(1).await.unwrap();
        assert_eq!(champion.coins, 100);
        assert_eq!(champion.tournaments_won, 0);
        assert_eq!(ledger.balance(2).await.unwrap(), 100);

        let history = ledger.entries(1).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].direction, EntryDirection::Debit);
        assert_eq!(history[1].amount, -60);
        assert_eq!(history[1].idempotency_key, "t:prize:1:reversal");
    }

    #[tokio::test]
    async fn test_revoke_skips_credits_never_paid() {
        let ledger = MemoryAccountLedger::new(100);
        ledger.revoke_prizes(&credits(1, 2)).await.unwrap();

        assert_eq!(ledger.balance(1).await.unwrap(), 100);
        assert!(ledger.entries(1).await.is_empty());
        assert!(!ledger.entry_applied("t:prize:1:reversal").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_is_all_or_nothing() {
        let ledger = MemoryAccountLedger::new(0);
        let paid = vec![
            PrizeCredit {
                player_id: 1,
                amount: 60,
                champion: true,
                idempotency_key: "t:prize:1".to_string(),
            },
            PrizeCredit {
                player_id: 2,
                amount: 40,
                champion: false,
                idempotency_key: "t:prize:2".to_string(),
            },
        ];
        ledger.award_prizes(&paid).await.unwrap();
        ledger.debit(2, 30, EntryType::EntryFee, "spent").await.unwrap();

        assert!(matches!(
            ledger.revoke_prizes(&paid).await,
            Err(AccountError::InsufficientBalance { player_id: 2, .. })
        ));
        assert_eq!(ledger.balance(1).await.unwrap(), 60);
        assert_eq!(ledger.account(1).await.unwrap().tournaments_won, 1);
    }

    #[tokio::test]
    async fn test_entry_applied() {
        let ledger = MemoryAccountLedger::default();
        assert!(!ledger.entry_applied("fee").await.unwrap());
        ledger.debit(1, 10, EntryType::EntryFee, "fee").await.unwrap();
        assert!(ledger.entry_applied("fee").await.unwrap());

        // Rejected debits leave no trace
        let _ = ledger.debit(1, 5000, EntryType::EntryFee, "too_much").await;
        assert!(!ledger.entry_applied("too_much").await.unwrap());
    }
}
