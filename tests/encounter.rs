mod common;

use chrono::Duration;
use common::{actor, always_lose, always_win, fixed_content, harness};
use questbot::config::{InjuryKind, QuestConfig};
use questbot::constants::{ACTIVE_ENCOUNTER_KEY, STATE_MODULE};
use questbot::database::PlayerStore;
use questbot::quest::encounter::{CloseOutcome, NOBODY_JOINED};
use questbot::quest::{Actor, Rejection};

fn winning_config() -> QuestConfig {
    always_win(fixed_content(QuestConfig::default(), 100))
}

#[tokio::test]
async fn party_shares_one_victory() {
    let h = harness(winning_config());
    let ana = actor("ana");
    let bo = actor("bo");

    let started = h.engine.start_encounter(&ana).await.unwrap();
    assert!(started.success, "{}", started.reply);
    assert!(started.announcements[0].contains("MOB ENCOUNTER"));
    let joined = h.engine.join_encounter(&bo).await.unwrap();
    assert!(joined.success);
    assert!(joined.reply.contains("Party size: 2"));

    h.clock.advance(Duration::seconds(61));
    let Some(CloseOutcome::Resolved(report)) = h.engine.close_if_expired().await.unwrap() else {
        panic!("expected a resolution");
    };
    assert!(report.won);
    assert_eq!(report.party_size, 2);
    // 100 XP, x1.1 for a pair, split two ways.
    assert_eq!(report.xp_each, 55);

    let a = h.engine.player(&ana).await.unwrap();
    let b = h.engine.player(&bo).await.unwrap();
    assert_eq!((a.xp, a.wins, a.energy), (55, 1, 8));
    assert_eq!((b.xp, b.wins, b.energy), (55, 1, 9));

    let sent = h.notifier.messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "general");
    assert!(sent[0].1.contains("VICTORY"));
}

#[tokio::test]
async fn channel_cools_down_after_resolution() {
    let h = harness(winning_config());
    let ana = actor("ana");
    h.engine.start_encounter(&ana).await.unwrap();
    h.clock.advance(Duration::seconds(61));
    h.engine.close_if_expired().await.unwrap();

    let again = h.engine.start_encounter(&ana).await.unwrap();
    assert!(!again.success);
    assert!(again.reply.starts_with("A mob encounter was recently completed here"));

    let elsewhere = Actor::new("ana", "ana", "tavern");
    assert!(h.engine.start_encounter(&elsewhere).await.unwrap().success);
}

#[tokio::test]
async fn second_start_is_refused_while_open() {
    let h = harness(winning_config());
    h.engine.start_encounter(&actor("ana")).await.unwrap();
    let second = h.engine.start_encounter(&actor("bo")).await.unwrap();
    assert_eq!(second.reply, Rejection::EncounterAlreadyOpen.to_string());
    assert_eq!(h.engine.player(&actor("bo")).await.unwrap().energy, 10);
}

#[tokio::test]
async fn join_rejections() {
    let h = harness(winning_config());
    let idle = h.engine.join_encounter(&actor("bo")).await.unwrap();
    assert_eq!(idle.reply, Rejection::NoOpenEncounter.to_string());

    h.engine.start_encounter(&actor("ana")).await.unwrap();
    let dup = h.engine.join_encounter(&actor("ana")).await.unwrap();
    assert_eq!(dup.reply, Rejection::AlreadyJoined.to_string());

    let far = h.engine.join_encounter(&Actor::new("cy", "cy", "tavern")).await.unwrap();
    assert_eq!(far.reply, Rejection::WrongChannel.to_string());

    h.clock.advance(Duration::seconds(61));
    let late = h.engine.join_encounter(&actor("bo")).await.unwrap();
    assert_eq!(late.reply, Rejection::NoOpenEncounter.to_string());
    // The late join closed the window lazily on the way in.
    assert_eq!(h.engine.player(&actor("ana")).await.unwrap().wins, 1);
}

#[tokio::test]
async fn full_party_is_refused() {
    let mut config = winning_config();
    config.encounter.max_participants = 2;
    let h = harness(config);
    h.engine.start_encounter(&actor("ana")).await.unwrap();
    h.engine.join_encounter(&actor("bo")).await.unwrap();
    let third = h.engine.join_encounter(&actor("cy")).await.unwrap();
    assert_eq!(third.reply, Rejection::EncounterFull.to_string());
}

#[tokio::test]
async fn join_without_energy_changes_nothing() {
    let h = harness(winning_config());
    h.engine.players().update("bo", "bo", |p| p.energy = 0).await.unwrap();
    h.engine.start_encounter(&actor("ana")).await.unwrap();
    let res = h.engine.join_encounter(&actor("bo")).await.unwrap();
    assert_eq!(res.reply, Rejection::NotEnoughEnergy { needed: 1, have: 0 }.to_string());
    assert_eq!(h.engine.open_party().await.len(), 1);
}

#[tokio::test]
async fn defeat_costs_xp_and_injures() {
    let mut config = always_lose(fixed_content(QuestConfig::default(), 100));
    config.injuries.chance_on_loss = 1.0;
    config.injuries.kinds = vec![InjuryKind {
        name: "Bruised Ribs".to_string(),
        description: "ow".to_string(),
        duration_hours: 3.0,
        xp_multiplier: 0.8,
        energy_regen_modifier: -1,
    }];
    let h = harness(config);
    let ana = actor("ana");
    h.engine.players().update("ana", "ana", |p| p.xp = 180).await.unwrap();

    h.engine.start_encounter(&ana).await.unwrap();
    h.clock.advance(Duration::seconds(61));
    let Some(CloseOutcome::Resolved(report)) = h.engine.close_if_expired().await.unwrap() else {
        panic!("expected a resolution");
    };
    assert!(!report.won);
    let p = h.engine.player(&ana).await.unwrap();
    assert_eq!((p.losses, p.streak), (1, 0));
    // A quarter of the 180 XP above the level-1 floor.
    assert_eq!(p.xp, 135);
    assert_eq!(p.active_injuries.len(), 1);
    assert_eq!(p.active_injuries[0].name, "Bruised Ribs");
}

#[tokio::test]
async fn spawned_encounter_with_nobody_is_abandoned() {
    let mut config = winning_config();
    config.admins = vec!["gm".to_string()];
    let h = harness(config);
    let gm = actor("gm");

    let spawned = h.engine.admin(&gm, "spawn".parse().unwrap()).await.unwrap();
    assert!(spawned.success, "{}", spawned.reply);
    assert!(h.engine.open_party().await.is_empty());

    h.clock.advance(Duration::seconds(61));
    assert_eq!(h.engine.close_if_expired().await.unwrap(), Some(CloseOutcome::Abandoned));
    assert_eq!(h.notifier.texts().await, vec![NOBODY_JOINED.to_string()]);

    // Nothing was resolved, so the channel is free right away.
    assert!(h.engine.start_encounter(&actor("ana")).await.unwrap().success);
}

#[tokio::test]
async fn closing_twice_is_a_no_op() {
    let h = harness(winning_config());
    h.engine.start_encounter(&actor("ana")).await.unwrap();
    h.clock.advance(Duration::seconds(61));
    assert!(h.engine.close_if_expired().await.unwrap().is_some());
    assert!(h.engine.close_if_expired().await.unwrap().is_none());
    assert!(h.engine.close_by_timer(12345).await.unwrap().is_none());
}

#[tokio::test]
async fn open_encounter_is_mirrored_and_cleared() {
    let h = harness(winning_config());
    h.engine.start_encounter(&actor("ana")).await.unwrap();
    let stored = h.store.get(STATE_MODULE, ACTIVE_ENCOUNTER_KEY).await.unwrap().unwrap();
    assert_eq!(stored["participants"][0]["id"], "ana");

    h.clock.advance(Duration::seconds(61));
    h.engine.close_if_expired().await.unwrap();
    let stored = h.store.get(STATE_MODULE, ACTIVE_ENCOUNTER_KEY).await.unwrap().unwrap();
    assert!(stored.is_null());
}

#[tokio::test]
async fn restart_resolves_an_expired_window() {
    let h = harness(winning_config());
    h.engine.start_encounter(&actor("ana")).await.unwrap();
    h.engine.shutdown().await;

    let clock = h.clock.clone();
    let engine = questbot::quest::QuestEngine::builder(winning_config(), h.store.clone())
        .clock(clock.clone())
        .notifier(h.notifier.clone())
        .build();
    clock.advance(Duration::seconds(120));
    engine.start().await.unwrap();
    assert!(engine.open_party().await.is_empty());
    assert_eq!(engine.players().peek("ana").await.unwrap().unwrap().wins, 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn restart_keeps_an_open_window() {
    let h = harness(winning_config());
    h.engine.start_encounter(&actor("ana")).await.unwrap();

    let engine = questbot::quest::QuestEngine::builder(winning_config(), h.store.clone())
        .clock(h.clock.clone())
        .build();
    engine.start().await.unwrap();
    assert_eq!(engine.open_party().await.len(), 1);
    let joined = engine.join_encounter(&actor("bo")).await.unwrap();
    assert!(joined.success);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn window_timer_closes_the_encounter() {
    let h = harness(winning_config());
    h.engine.start_encounter(&actor("ana")).await.unwrap();
    for _ in 0..10 {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        if !h.notifier.texts().await.is_empty() {
            break;
        }
    }
    let texts = h.notifier.texts().await;
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("VICTORY"));
    assert!(h.engine.open_party().await.is_empty());
}
