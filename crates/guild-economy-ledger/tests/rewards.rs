//! Reward dispatch: idempotency, daily caps, highlight awards, level-up
//! follow-ups, and leaderboards.

mod common;

use chrono::Duration;
use common::harness;
use guild_economy_core::ids::IdSource;
use guild_economy_core::reward::{DAILY_LIKE_COIN_CAP, LEVEL_UP_BONUS_PER_LEVEL};
use guild_economy_core::{RewardCategory, TxStatus, UserId};
use guild_economy_ledger::{HighlightKind, RewardOutcome};
use guild_economy_store::Store;

#[tokio::test]
async fn post_like_reward_is_idempotent_per_day() {
    let h = harness();
    let author = UserId::generate();
    let liker = UserId::generate();

    let first = h.economy.dispatcher.post_liked(7, author, liker).await.unwrap();
    assert!(matches!(first, RewardOutcome::Granted { coins: 3, exp: 3, .. }));

    // Same post, same day: skipped wholesale.
    let second = h.economy.dispatcher.post_liked(7, author, liker).await.unwrap();
    assert_eq!(second, RewardOutcome::AlreadyGranted);

    // Exactly one author-side Success row and one balance increment.
    let author_txs = h.economy.balance.transactions(author, 100, 0).unwrap();
    let successes = author_txs
        .iter()
        .filter(|tx| tx.status == TxStatus::Success)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(h.economy.balance.balance(author).unwrap().available, 2);
    assert_eq!(h.economy.balance.balance(liker).unwrap().available, 1);

    // A different post grants again.
    let other = h.economy.dispatcher.post_liked(8, author, liker).await.unwrap();
    assert!(matches!(other, RewardOutcome::Granted { .. }));

    // The next day resets the per-day key.
    h.clock.advance(Duration::days(1));
    let tomorrow = h.economy.dispatcher.post_liked(7, author, liker).await.unwrap();
    assert!(matches!(tomorrow, RewardOutcome::Granted { .. }));
}

#[tokio::test]
async fn liker_coin_cap_stops_the_liker_side_only() {
    let h = harness();
    let liker = UserId::generate();

    // Fill the liker's daily budget: one coin per liked post.
    for post_id in 0..DAILY_LIKE_COIN_CAP {
        let author = UserId::generate();
        let outcome = h
            .economy
            .dispatcher
            .post_liked(post_id, author, liker)
            .await
            .unwrap();
        assert!(matches!(outcome, RewardOutcome::Granted { .. }));
    }
    assert_eq!(
        h.economy.balance.balance(liker).unwrap().available,
        DAILY_LIKE_COIN_CAP
    );

    // The cap binds: the author is still rewarded, the liker is not.
    let author = UserId::generate();
    let capped = h
        .economy
        .dispatcher
        .post_liked(DAILY_LIKE_COIN_CAP, author, liker)
        .await
        .unwrap();
    match capped {
        RewardOutcome::Granted { coins, .. } => assert_eq!(coins, 2),
        other => panic!("expected author-side grant, got {other:?}"),
    }
    assert_eq!(
        h.economy.balance.balance(liker).unwrap().available,
        DAILY_LIKE_COIN_CAP
    );
    assert_eq!(h.economy.balance.balance(author).unwrap().available, 2);
}

#[tokio::test]
async fn daily_exp_cap_boundary_is_exact() {
    let h = harness();
    let user = UserId::generate();
    let cap = RewardCategory::Like.daily_exp_cap();

    // Exactly reaching the cap succeeds.
    let at_cap = h
        .economy
        .experience
        .grant_experience(user, cap, "RECEIVE_LIKE", RewardCategory::Like, None, None)
        .await
        .unwrap();
    assert!(at_cap);

    // One more unit the same day is rejected and not applied.
    let over = h
        .economy
        .experience
        .grant_experience(user, 1, "RECEIVE_LIKE", RewardCategory::Like, None, None)
        .await
        .unwrap();
    assert!(!over);
    assert_eq!(h.economy.experience.experience(user).unwrap().total_exp, cap);

    // Tomorrow the counter keys onto a new day.
    h.clock.advance(Duration::days(1));
    let next_day = h
        .economy
        .experience
        .grant_experience(user, 1, "RECEIVE_LIKE", RewardCategory::Like, None, None)
        .await
        .unwrap();
    assert!(next_day);
}

#[tokio::test]
async fn comment_rewards_compose_coin_and_exp() {
    let h = harness();
    let author = UserId::generate();

    let outcome = h
        .economy
        .dispatcher
        .comment_posted(11, author, true)
        .await
        .unwrap();
    match outcome {
        RewardOutcome::Granted { coins, exp, coin_tx } => {
            assert_eq!(coins, 1);
            assert_eq!(exp, 15); // 5 for the comment, 10 first-comment bonus
            assert!(coin_tx.is_some());
        }
        other => panic!("expected grant, got {other:?}"),
    }

    // Reply reward pays the parent author once per day.
    let replied = h.economy.dispatcher.comment_replied(11, author).await.unwrap();
    assert!(matches!(replied, RewardOutcome::Granted { coins: 1, .. }));
    let again = h.economy.dispatcher.comment_replied(11, author).await.unwrap();
    assert_eq!(again, RewardOutcome::AlreadyGranted);
}

#[tokio::test]
async fn highlight_award_pays_base_plus_like_bonus_once() {
    let h = harness();
    let author = UserId::generate();

    let outcome = h
        .economy
        .dispatcher
        .highlight_awarded(HighlightKind::GodComment, 31, author, 4)
        .await
        .unwrap();
    match outcome {
        RewardOutcome::Granted { coins, .. } => assert_eq!(coins, 8 + 4 * 5),
        other => panic!("expected grant, got {other:?}"),
    }

    let duplicate = h
        .economy
        .dispatcher
        .highlight_awarded(HighlightKind::GodComment, 31, author, 9)
        .await
        .unwrap();
    assert_eq!(duplicate, RewardOutcome::AlreadyGranted);

    // Sofa rates differ.
    let sofa = h
        .economy
        .dispatcher
        .highlight_awarded(HighlightKind::Sofa, 32, author, 2)
        .await
        .unwrap();
    assert!(matches!(sofa, RewardOutcome::Granted { coins: 11, .. }));
}

#[tokio::test]
async fn retention_rewards_pay_each_week_once() {
    let h = harness();
    let user = UserId::generate();

    let week1 = h
        .economy
        .dispatcher
        .retention_reward(HighlightKind::Sofa, 99, user, 1)
        .await
        .unwrap();
    assert!(matches!(week1, RewardOutcome::Granted { coins: 10, .. }));

    let week1_again = h
        .economy
        .dispatcher
        .retention_reward(HighlightKind::Sofa, 99, user, 1)
        .await
        .unwrap();
    assert_eq!(week1_again, RewardOutcome::AlreadyGranted);

    let week2 = h
        .economy
        .dispatcher
        .retention_reward(HighlightKind::Sofa, 99, user, 2)
        .await
        .unwrap();
    assert!(matches!(week2, RewardOutcome::Granted { coins: 10, .. }));

    let bad_week = h
        .economy
        .dispatcher
        .retention_reward(HighlightKind::Sofa, 99, user, 4)
        .await;
    assert!(bad_week.is_err());
}

#[tokio::test]
async fn level_up_bonus_arrives_through_the_outbox() {
    let h = harness();
    let user = UserId::generate();

    // Cross the level-1 threshold (100) in one grant.
    let granted = h
        .economy
        .experience
        .grant_experience(user, 120, "POST_CREATE", RewardCategory::Post, None, None)
        .await
        .unwrap();
    assert!(granted);
    assert_eq!(h.economy.experience.experience(user).unwrap().level, 1);

    // The triggering call returned without paying the bonus.
    assert_eq!(h.economy.balance.balance(user).unwrap().available, 0);
    assert_eq!(h.store.follow_up_count().unwrap(), 2);

    // Draining the outbox pays level * multiplier and notifies.
    let completed = h.economy.outbox.drain(10).await.unwrap();
    assert_eq!(completed, 2);
    assert_eq!(
        h.economy.balance.balance(user).unwrap().available,
        LEVEL_UP_BONUS_PER_LEVEL
    );
    assert_eq!(*h.notifier.notices.lock().unwrap(), vec![(user, 0, 1)]);

    // Redelivery of the same bonus is deduplicated by the guard.
    let item = guild_economy_core::FollowUp::new(
        guild_economy_core::ids::UlidSource.next_transaction_id(),
        guild_economy_core::FollowUpKind::LevelUpBonus {
            user_id: user,
            new_level: 1,
        },
        chrono::Utc::now(),
    );
    h.store.enqueue_follow_up(&item).unwrap();
    h.economy.outbox.drain(10).await.unwrap();
    assert_eq!(
        h.economy.balance.balance(user).unwrap().available,
        LEVEL_UP_BONUS_PER_LEVEL
    );
}

#[tokio::test]
async fn leaderboards_rank_by_value() {
    let h = harness();
    let operator = UserId::generate();
    let mut users = Vec::new();
    for exp in [30_i64, 250, 120] {
        let user = UserId::generate();
        // Seed through the admin path; daily caps do not apply there.
        h.economy
            .experience
            .admin_adjust(user, exp, "seed", operator)
            .await
            .unwrap();
        h.economy
            .balance
            .grant_coin(user, exp * 2, "EARN", None, None)
            .await
            .unwrap();
        users.push((user, exp));
    }

    let page = h.economy.leaderboard.experience_page(1, 10).unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.entries.len(), 3);
    assert_eq!(page.entries[0].value, 250);
    assert_eq!(page.entries[0].rank, 1);
    assert_eq!(page.entries[0].level, Some(1)); // 250 exp -> level 1
    assert_eq!(page.entries[2].value, 30);
    assert_eq!(page.entries[2].rank, 3);

    let balance_page = h.economy.leaderboard.balance_page(1, 2).unwrap();
    assert_eq!(balance_page.entries.len(), 2);
    assert_eq!(balance_page.entries[0].value, 500);

    let (top_user, _) = users.iter().find(|(_, e)| *e == 250).unwrap();
    assert_eq!(h.economy.leaderboard.experience_rank(*top_user).unwrap(), Some(1));
    assert_eq!(
        h.economy.leaderboard.experience_rank(UserId::generate()).unwrap(),
        None
    );

    // Paging past the data yields an empty page with the same total.
    let past = h.economy.leaderboard.experience_page(2, 10).unwrap();
    assert!(past.entries.is_empty());
    assert_eq!(past.total, 3);
}
