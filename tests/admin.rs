mod common;

use common::{actor, harness};
use questbot::config::QuestConfig;
use questbot::quest::Rejection;
use questbot::quest::admin::AdminCommand;
use questbot::quest::items::ItemKind;

fn admin_harness() -> common::Harness {
    let mut config = QuestConfig::default();
    config.admins = vec!["gm".to_string()];
    harness(config)
}

fn cmd(text: &str) -> AdminCommand {
    text.parse().unwrap()
}

#[tokio::test]
async fn non_admins_are_refused() {
    let h = admin_harness();
    h.engine.player(&actor("ana")).await.unwrap();
    let res = h.engine.admin(&actor("ana"), cmd("grant_xp ana 500")).await.unwrap();
    assert_eq!(res.reply, Rejection::NotAuthorized.to_string());
    assert_eq!(h.engine.player(&actor("ana")).await.unwrap().xp, 0);
}

#[tokio::test]
async fn grants_items_and_xp_by_name() {
    let h = admin_harness();
    let gm = actor("gm");
    h.engine.players().update("u1", "Ana", |_| ()).await.unwrap();

    let items = h.engine.admin(&gm, cmd("grant_item ana potion 3")).await.unwrap();
    assert_eq!(items.reply, "🎁 Gave 3x Energy Potion to Ana (now 3).");

    let xp = h.engine.admin(&gm, cmd("grant_xp @Ana 250")).await.unwrap();
    assert!(xp.reply.starts_with("⭐ Granted 250 XP to Ana (Level 2)."), "{}", xp.reply);

    let p = h.engine.players().peek("u1").await.unwrap().unwrap();
    assert_eq!((p.xp, p.level, p.item_count(ItemKind::EnergyPotion)), (250, 2, 3));

    let missing = h.engine.admin(&gm, cmd("grant_xp ghost 1")).await.unwrap();
    assert_eq!(missing.reply, Rejection::UnknownPlayer("ghost".to_string()).to_string());
    let bogus = h.engine.admin(&gm, cmd("give ana sword")).await.unwrap();
    assert!(bogus.reply.starts_with("Unknown item 'sword'"));
}

#[tokio::test]
async fn reset_keeps_identity_only() {
    let h = admin_harness();
    h.engine
        .players()
        .update("ana", "ana", |p| {
            p.xp = 900;
            p.prestige = 3;
            p.wins = 40;
            p.add_item(ItemKind::Medkit, 2);
        })
        .await
        .unwrap();
    let res = h.engine.admin(&actor("gm"), cmd("reset ana")).await.unwrap();
    assert!(res.success);
    let p = h.engine.player(&actor("ana")).await.unwrap();
    assert_eq!((p.id.as_str(), p.username.as_str()), ("ana", "ana"));
    assert_eq!((p.level, p.xp, p.prestige, p.wins), (1, 0, 0, 0));
    assert!(p.inventory.is_empty());
}

#[tokio::test]
async fn restore_all_refills_only_the_drained() {
    let h = admin_harness();
    h.engine.players().update("ana", "ana", |p| p.energy = 1).await.unwrap();
    h.engine.player(&actor("bo")).await.unwrap();
    let res = h.engine.admin(&actor("gm"), cmd("restore_all")).await.unwrap();
    assert_eq!(res.reply, "⚡ Restored energy for 1 adventurer(s).");
    assert_eq!(h.engine.player(&actor("ana")).await.unwrap().energy, 10);
}

#[tokio::test]
async fn path_toggle_and_stats() {
    let h = admin_harness();
    let gm = actor("gm");
    h.engine
        .players()
        .update("ana", "ana", |p| {
            p.xp = 300;
            p.wins = 3;
            p.losses = 1;
        })
        .await
        .unwrap();

    let on = h.engine.admin(&gm, cmd("path iron_path")).await.unwrap();
    assert_eq!(on.reply, "🎯 Challenge path activated: Path of Iron");

    let stats = h.engine.stats().await.unwrap();
    assert_eq!(stats.players, 1);
    assert_eq!((stats.total_wins, stats.total_losses), (3, 1));
    assert!((stats.average_level - 3.0).abs() < 1e-9);

    let text = h.engine.admin(&gm, cmd("stats")).await.unwrap();
    assert!(text.reply.contains("Active path: iron_path"));

    h.engine.admin(&gm, cmd("path off")).await.unwrap();
    assert_eq!(h.engine.active_path().await, None);
}

#[tokio::test]
async fn close_without_an_encounter_is_harmless() {
    let h = admin_harness();
    let res = h.engine.admin(&actor("gm"), cmd("close")).await.unwrap();
    assert_eq!(res.reply, "No encounter is open.");
}

#[tokio::test]
async fn force_close_drops_the_encounter_unresolved() {
    let h = admin_harness();
    h.engine.start_encounter(&actor("ana")).await.unwrap();
    let res = h.engine.admin(&actor("gm"), cmd("close")).await.unwrap();
    assert_eq!(res.reply, "The open encounter was closed without resolution.");
    assert!(h.engine.open_party().await.is_empty());
    let ana = h.engine.player(&actor("ana")).await.unwrap();
    assert_eq!((ana.wins, ana.losses), (0, 0));
    assert_eq!(h.notifier.messages().await.len(), 1);
}
