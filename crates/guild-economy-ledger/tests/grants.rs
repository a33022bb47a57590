//! Grant scenarios: validation, lazy initialization, journal lifecycle,
//! admin adjustments, transfers, freezes, and level transitions.

mod common;

use chrono::Duration;
use common::harness;
use guild_economy_core::{EconomyError, RewardCategory, TxStatus, UserId};

#[tokio::test]
async fn fresh_account_grant_sets_balance_and_version() {
    let h = harness();
    let user = UserId::generate();

    let tx_id = h
        .economy
        .balance
        .grant_coin(user, 100, "EARN", None, None)
        .await
        .unwrap();

    let view = h.economy.balance.balance(user).unwrap();
    assert_eq!(view.available, 100);
    assert_eq!(view.total_earned, 100);
    assert_eq!(view.version, 1);

    let transactions = h.economy.balance.transactions(user, 10, 0).unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].id, tx_id);
    assert_eq!(transactions[0].status, TxStatus::Success);
    assert_eq!(transactions[0].balance_before, 0);
    assert_eq!(transactions[0].balance_after, 100);
}

#[tokio::test]
async fn grant_rejects_bad_input() {
    let h = harness();
    let user = UserId::generate();

    let zero = h.economy.balance.grant_coin(user, 0, "EARN", None, None).await;
    assert!(matches!(zero, Err(EconomyError::Validation(_))));

    let negative = h.economy.balance.grant_coin(user, -5, "EARN", None, None).await;
    assert!(matches!(negative, Err(EconomyError::Validation(_))));

    let blank = h.economy.balance.grant_coin(user, 10, "  ", None, None).await;
    assert!(matches!(blank, Err(EconomyError::Validation(_))));

    // Nothing was written.
    assert!(h.economy.balance.transactions(user, 10, 0).unwrap().is_empty());
}

#[tokio::test]
async fn balance_read_initializes_lazily() {
    let h = harness();
    let user = UserId::generate();

    let view = h.economy.balance.balance(user).unwrap();
    assert_eq!(view.available, 0);
    assert_eq!(view.version, 0);

    // The same row is reused on the next read.
    let again = h.economy.balance.balance(user).unwrap();
    assert_eq!(again.version, 0);
}

#[tokio::test]
async fn admin_debit_more_than_balance_is_rejected_without_mutation() {
    let h = harness();
    let user = UserId::generate();
    let operator = UserId::generate();

    h.economy.balance.grant_coin(user, 30, "EARN", None, None).await.unwrap();

    let result = h
        .economy
        .balance
        .admin_adjust(user, -50, "chargeback", operator)
        .await;
    assert!(matches!(
        result,
        Err(EconomyError::InsufficientBalance {
            balance: 30,
            required: 50
        })
    ));

    // Balance and version are untouched; no journal row was created for
    // the rejected debit.
    let view = h.economy.balance.balance(user).unwrap();
    assert_eq!(view.available, 30);
    assert_eq!(view.version, 1);
    assert_eq!(h.economy.balance.transactions(user, 10, 0).unwrap().len(), 1);
}

#[tokio::test]
async fn admin_adjust_moves_balance_both_ways() {
    let h = harness();
    let user = UserId::generate();
    let operator = UserId::generate();

    h.economy
        .balance
        .admin_adjust(user, 80, "manual credit", operator)
        .await
        .unwrap();
    h.economy
        .balance
        .admin_adjust(user, -30, "manual debit", operator)
        .await
        .unwrap();

    let view = h.economy.balance.balance(user).unwrap();
    assert_eq!(view.available, 50);
    assert_eq!(view.total_earned, 80);
    assert_eq!(view.total_spent, 30);
    assert_eq!(view.version, 2);

    let transactions = h.economy.balance.transactions(user, 10, 0).unwrap();
    assert_eq!(transactions.len(), 2);
    assert!(transactions.iter().all(|tx| tx.operator == Some(operator)));
}

#[tokio::test]
async fn transfer_moves_value_and_updates_totals() {
    let h = harness();
    let payer = UserId::generate();
    let payee = UserId::generate();

    h.economy.balance.grant_coin(payer, 100, "EARN", None, None).await.unwrap();
    h.economy
        .balance
        .transfer(payer, payee, 40, Some("thanks"))
        .await
        .unwrap();

    let payer_view = h.economy.balance.balance(payer).unwrap();
    assert_eq!(payer_view.available, 60);
    assert_eq!(payer_view.total_spent, 40);
    assert_eq!(payer_view.total_transferred_out, 40);

    let payee_view = h.economy.balance.balance(payee).unwrap();
    assert_eq!(payee_view.available, 40);
    assert_eq!(payee_view.total_earned, 40);
    assert_eq!(payee_view.total_transferred_in, 40);

    // The transfer row appears in both users' journals.
    assert_eq!(h.economy.balance.transactions(payer, 10, 0).unwrap().len(), 2);
    assert_eq!(h.economy.balance.transactions(payee, 10, 0).unwrap().len(), 1);
}

#[tokio::test]
async fn transfer_guards() {
    let h = harness();
    let payer = UserId::generate();
    let payee = UserId::generate();

    let to_self = h.economy.balance.transfer(payer, payer, 10, None).await;
    assert!(matches!(to_self, Err(EconomyError::Validation(_))));

    let broke = h.economy.balance.transfer(payer, payee, 10, None).await;
    assert!(matches!(broke, Err(EconomyError::InsufficientBalance { .. })));
}

#[tokio::test]
async fn experience_grant_and_view() {
    let h = harness();
    let user = UserId::generate();

    let granted = h
        .economy
        .experience
        .grant_experience(user, 40, "POST_CREATE", RewardCategory::Post, None, None)
        .await
        .unwrap();
    assert!(granted);

    let view = h.economy.experience.experience(user).unwrap();
    assert_eq!(view.total_exp, 40);
    assert_eq!(view.level, 0);
    assert_eq!(view.level_exp, 40);
    assert_eq!(view.exp_to_next, 60);
    assert!((view.progress_to_next - 0.4).abs() < f64::EPSILON);

    let journal = h.economy.experience.transactions(user, 10, 0).unwrap();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].exp_before, 0);
    assert_eq!(journal[0].exp_after, 40);
    assert_eq!(journal[0].level_before, 0);
    assert_eq!(journal[0].level_after, 0);
}

#[tokio::test]
async fn experience_crossing_threshold_levels_up_once() {
    let h = harness();
    let user = UserId::generate();

    // 99 exp, still level 0.
    h.economy
        .experience
        .grant_experience(user, 99, "POST_CREATE", RewardCategory::Post, None, None)
        .await
        .unwrap();
    assert_eq!(h.economy.experience.experience(user).unwrap().level, 0);

    // +2 crosses the 100 threshold.
    let granted = h
        .economy
        .experience
        .grant_experience(user, 2, "RECEIVE_LIKE", RewardCategory::Like, None, None)
        .await
        .unwrap();
    assert!(granted);

    let view = h.economy.experience.experience(user).unwrap();
    assert_eq!(view.level, 1);
    assert_eq!(view.level_exp, 1);
    assert_eq!(view.total_exp, 101);

    let journal = h.economy.experience.transactions(user, 10, 0).unwrap();
    assert!(journal[0].leveled_up());
    assert_eq!(journal[0].level_before, 0);
    assert_eq!(journal[0].level_after, 1);

    // The detached effects were queued, not executed inline.
    assert_eq!(h.store_follow_up_count(), 2);
}

#[tokio::test]
async fn non_positive_experience_is_soft_rejected() {
    let h = harness();
    let user = UserId::generate();

    let granted = h
        .economy
        .experience
        .grant_experience(user, 0, "POST_CREATE", RewardCategory::Post, None, None)
        .await
        .unwrap();
    assert!(!granted);
}

#[tokio::test]
async fn frozen_account_rejects_grants_until_freeze_lapses() {
    let h = harness();
    let user = UserId::generate();

    let until = h.clock_now() + Duration::hours(2);
    h.economy
        .experience
        .freeze(user, Some(until), "spam wave")
        .await
        .unwrap();

    let rejected = h
        .economy
        .experience
        .grant_experience(user, 10, "POST_CREATE", RewardCategory::Post, None, None)
        .await
        .unwrap();
    assert!(!rejected);
    assert_eq!(h.economy.experience.experience(user).unwrap().total_exp, 0);

    // Once the freeze lapses, grants flow again without an explicit
    // unfreeze.
    h.clock.advance(Duration::hours(3));
    let granted = h
        .economy
        .experience
        .grant_experience(user, 10, "POST_CREATE", RewardCategory::Post, None, None)
        .await
        .unwrap();
    assert!(granted);

    // Explicit unfreeze also works.
    h.economy.experience.unfreeze(user).await.unwrap();
    let view = h.economy.experience.experience(user).unwrap();
    assert!(!view.frozen);
}

#[tokio::test]
async fn admin_penalty_lowers_total_and_level_consistently() {
    let h = harness();
    let user = UserId::generate();
    let operator = UserId::generate();

    // Reach level 1 (threshold 100).
    h.economy
        .experience
        .grant_experience(user, 150, "POST_CREATE", RewardCategory::Post, None, None)
        .await
        .unwrap();
    assert_eq!(h.economy.experience.experience(user).unwrap().level, 1);

    // Penalty below the threshold demotes through the same calculator.
    h.economy
        .experience
        .admin_adjust(user, -120, "farming", operator)
        .await
        .unwrap();

    let view = h.economy.experience.experience(user).unwrap();
    assert_eq!(view.total_exp, 30);
    assert_eq!(view.level, 0);
    assert_eq!(view.level_exp, 30);

    // Penalties floor at zero rather than going negative.
    h.economy
        .experience
        .admin_adjust(user, -500, "more farming", operator)
        .await
        .unwrap();
    assert_eq!(h.economy.experience.experience(user).unwrap().total_exp, 0);
}

impl common::Harness {
    fn store_follow_up_count(&self) -> usize {
        use guild_economy_store::Store;
        self.store.follow_up_count().unwrap()
    }

    fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        use guild_economy_ledger::Clock;
        self.clock.now()
    }
}
