mod common;

use chrono::{Duration, Utc};
use common::{actor, harness};
use questbot::config::{InjuryKind, QuestConfig, SearchChances};
use questbot::database::models::PlayerRecord;
use questbot::quest::injuries::{InjuryOutcome, apply_injury, heal, injury_effects};
use questbot::quest::items::ItemKind;
use questbot::quest::{Rejection, energy, inventory};

fn kind_named(config: &QuestConfig, name: &str) -> InjuryKind {
    config
        .injuries
        .kinds
        .iter()
        .find(|k| k.name == name)
        .cloned()
        .unwrap()
}

fn only(found: ItemKind) -> SearchChances {
    let mut chances = SearchChances {
        injury: 0.0,
        medkit: 0.0,
        energy_potion: 0.0,
        lucky_charm: 0.0,
        armor_shard: 0.0,
        xp_scroll: 0.0,
    };
    match found {
        ItemKind::Medkit => chances.medkit = 1.0,
        ItemKind::EnergyPotion => chances.energy_potion = 1.0,
        ItemKind::LuckyCharm => chances.lucky_charm = 1.0,
        ItemKind::ArmorShard => chances.armor_shard = 1.0,
        ItemKind::XpScroll => chances.xp_scroll = 1.0,
    }
    chances
}

#[test]
fn third_copy_of_an_injury_is_a_narrow_miss() {
    let config = QuestConfig::default();
    let duck = kind_named(&config, "Duck Hugged");
    let now = Utc::now();
    let mut p = PlayerRecord::default();
    assert!(matches!(apply_injury(&mut p, &duck, now), InjuryOutcome::Sustained { repeat: false, .. }));
    assert!(matches!(apply_injury(&mut p, &duck, now), InjuryOutcome::Sustained { repeat: true, .. }));
    let before = p.active_injuries.clone();
    let third = apply_injury(&mut p, &duck, now);
    assert_eq!(third, InjuryOutcome::NarrowMiss { name: "Duck Hugged".to_string() });
    assert_eq!(third.message(), "You narrowly avoid another Duck Hugged!");
    assert_eq!(p.active_injuries, before);
}

#[test]
fn healing_by_name_leaves_the_rest() {
    let config = QuestConfig::default();
    let now = Utc::now();
    let mut p = PlayerRecord::default();
    apply_injury(&mut p, &kind_named(&config, "Concussion"), now);
    apply_injury(&mut p, &kind_named(&config, "Bruised Ribs"), now);
    let healed = heal(&mut p, Some("concussion"));
    assert_eq!(healed.len(), 1);
    assert_eq!(p.active_injuries.len(), 1);
    assert!(heal(&mut p, Some("Concussion")).is_empty());
}

#[test]
fn injuries_slow_regeneration() {
    let config = QuestConfig::default();
    let now = Utc::now();
    let mut p = PlayerRecord { energy: 4, ..PlayerRecord::default() };
    apply_injury(&mut p, &kind_named(&config, "Bruised Ribs"), now);
    assert_eq!(injury_effects(&p, now).energy_regen_modifier, -1);
    assert_eq!(energy::regen_tick(&mut p, &config, now), 0);
    assert_eq!(p.last_energy_regen, Some(now));

    let later = now + Duration::hours(4);
    assert_eq!(energy::regen_tick(&mut p, &config, later), 1);
    assert_eq!(p.energy, 5);
}

#[test]
fn armor_wears_out_after_its_charges() {
    let config = QuestConfig::default();
    let mut p = PlayerRecord::default();
    p.add_item(ItemKind::ArmorShard, 1);
    inventory::activate(&mut p, &config, ItemKind::ArmorShard).unwrap();
    assert!((inventory::injury_reduction(&p) - 0.3).abs() < 1e-9);
    for _ in 0..2 {
        inventory::process_combat_effects(&mut p, false);
    }
    assert!(inventory::has_effect(&p, ItemKind::ArmorShard));
    inventory::process_combat_effects(&mut p, true);
    assert!(!inventory::has_effect(&p, ItemKind::ArmorShard));
}

#[test]
fn scroll_survives_a_loss_but_not_a_win() {
    let config = QuestConfig::default();
    let mut p = PlayerRecord::default();
    p.add_item(ItemKind::XpScroll, 1);
    p.add_item(ItemKind::LuckyCharm, 1);
    inventory::activate(&mut p, &config, ItemKind::XpScroll).unwrap();
    inventory::activate(&mut p, &config, ItemKind::LuckyCharm).unwrap();
    inventory::process_combat_effects(&mut p, false);
    assert_eq!(inventory::scroll_multiplier(&p), 1.5);
    assert_eq!(inventory::win_bonus(&p), 0.0);
    inventory::process_combat_effects(&mut p, true);
    assert!(p.active_effects.is_empty());
}

#[tokio::test]
async fn search_finds_the_only_possible_item() {
    let mut config = QuestConfig::default();
    config.items.search_chances = only(ItemKind::Medkit);
    let h = harness(config);
    let ana = actor("ana");
    let res = h.engine.search(&ana).await.unwrap();
    assert!(res.reply.contains("You found a Medkit!"), "{}", res.reply);
    let p = h.engine.player(&ana).await.unwrap();
    assert_eq!(p.item_count(ItemKind::Medkit), 1);
    assert_eq!(p.energy, 9);

    let again = h.engine.search(&ana).await.unwrap();
    assert!(!again.success);
    assert!(again.reply.starts_with("You can search again in"));
}

#[tokio::test]
async fn injured_players_cannot_search() {
    let mut config = QuestConfig::default();
    config.items.search_chances = only(ItemKind::Medkit);
    let ribs = kind_named(&config, "Bruised Ribs");
    let h = harness(config);
    let now = h.engine.now();
    h.engine
        .players()
        .update("ana", "ana", |p| {
            apply_injury(p, &ribs, now);
        })
        .await
        .unwrap();
    let res = h.engine.search(&actor("ana")).await.unwrap();
    assert_eq!(res.reply, Rejection::Injured { injuries: "Bruised Ribs".to_string() }.to_string());
    assert_eq!(h.engine.player(&actor("ana")).await.unwrap().energy, 10);

    h.clock.advance(Duration::hours(3));
    assert!(h.engine.search(&actor("ana")).await.unwrap().success);
}

#[tokio::test]
async fn potion_restores_energy_and_refuses_when_full() {
    let mut config = QuestConfig::default();
    config.items.energy_potion_min = 3;
    config.items.energy_potion_max = 3;
    let h = harness(config);
    let ana = actor("ana");
    h.engine
        .players()
        .update("ana", "ana", |p| {
            p.add_item(ItemKind::EnergyPotion, 2);
            p.energy = 5;
        })
        .await
        .unwrap();
    let res = h.engine.use_item(&ana, "potion", None).await.unwrap();
    assert!(res.reply.contains("+3 energy (8/10)"), "{}", res.reply);

    h.engine.restore_energy("ana", 10).await.unwrap();
    let full = h.engine.use_item(&ana, "potion", None).await.unwrap();
    assert_eq!(full.reply, Rejection::EnergyFull.to_string());
    assert_eq!(h.engine.player(&ana).await.unwrap().item_count(ItemKind::EnergyPotion), 1);
}

#[tokio::test]
async fn second_charm_is_refused_while_one_is_active() {
    let h = harness(QuestConfig::default());
    let ana = actor("ana");
    h.engine
        .players()
        .update("ana", "ana", |p| p.add_item(ItemKind::LuckyCharm, 2))
        .await
        .unwrap();
    assert!(h.engine.use_item(&ana, "charm", None).await.unwrap().success);
    let second = h.engine.use_item(&ana, "charm", None).await.unwrap();
    assert_eq!(second.reply, "You already have an active Lucky Charm.");
    assert_eq!(h.engine.player(&ana).await.unwrap().item_count(ItemKind::LuckyCharm), 1);
}

#[tokio::test]
async fn medkit_on_yourself_pays_a_reduced_reward() {
    let config = QuestConfig::default();
    let concussion = kind_named(&config, "Concussion");
    let h = harness(config);
    let ana = actor("ana");
    let now = h.engine.now();
    h.engine
        .players()
        .update("ana", "ana", |p| {
            p.add_item(ItemKind::Medkit, 1);
            apply_injury(p, &concussion, now);
        })
        .await
        .unwrap();
    let res = h.engine.use_item(&ana, "medkit", None).await.unwrap();
    assert!(res.success, "{}", res.reply);
    let p = h.engine.player(&ana).await.unwrap();
    assert!(p.active_injuries.is_empty());
    assert_eq!(p.xp, 37);
    assert_eq!(p.challenge.medkits_used_this_prestige, 1);

    let empty = h.engine.use_item(&ana, "medkit", None).await.unwrap();
    assert_eq!(empty.reply, Rejection::NoItem("Medkit".to_string()).to_string());
}

#[tokio::test]
async fn medkit_on_a_friend_pays_the_healer() {
    let config = QuestConfig::default();
    let ribs = kind_named(&config, "Bruised Ribs");
    let h = harness(config);
    let now = h.engine.now();
    h.engine
        .players()
        .update("ana", "ana", |p| p.add_item(ItemKind::Medkit, 1))
        .await
        .unwrap();
    h.engine
        .players()
        .update("bo", "Bo", |p| {
            apply_injury(p, &ribs, now);
        })
        .await
        .unwrap();

    let res = h.engine.use_item(&actor("ana"), "medkit", Some("bo")).await.unwrap();
    assert!(res.success, "{}", res.reply);
    assert_eq!(res.announcements, vec!["💚 ana healed Bo!".to_string()]);
    assert_eq!(h.engine.player(&actor("ana")).await.unwrap().xp, 150);
    assert!(h.engine.players().peek("bo").await.unwrap().unwrap().active_injuries.is_empty());
}

#[tokio::test]
async fn healthy_target_keeps_the_medkit() {
    let h = harness(QuestConfig::default());
    h.engine
        .players()
        .update("ana", "ana", |p| p.add_item(ItemKind::Medkit, 1))
        .await
        .unwrap();
    h.engine.player(&actor("bo")).await.unwrap();
    let res = h.engine.use_item(&actor("ana"), "medkit", Some("bo")).await.unwrap();
    assert_eq!(res.reply, Rejection::TargetNotInjured("bo".to_string()).to_string());
    assert_eq!(h.engine.player(&actor("ana")).await.unwrap().item_count(ItemKind::Medkit), 1);

    let nobody = h.engine.use_item(&actor("ana"), "medkit", Some("ghost")).await.unwrap();
    assert_eq!(nobody.reply, Rejection::UnknownPlayer("ghost".to_string()).to_string());
}

#[tokio::test]
async fn unknown_items_are_named_back() {
    let h = harness(QuestConfig::default());
    let res = h.engine.use_item(&actor("ana"), "sword", None).await.unwrap();
    assert!(!res.success);
    assert!(res.reply.starts_with("Unknown item 'sword'"));
}

#[tokio::test]
async fn regeneration_tick_skips_full_and_slowed_players() {
    let config = QuestConfig::default();
    let ribs = kind_named(&config, "Bruised Ribs");
    let h = harness(config);
    let now = h.engine.now();
    h.engine.players().update("ana", "ana", |p| p.energy = 3).await.unwrap();
    h.engine
        .players()
        .update("bo", "bo", |p| {
            p.energy = 3;
            apply_injury(p, &ribs, now);
        })
        .await
        .unwrap();
    h.engine.player(&actor("cy")).await.unwrap();

    assert_eq!(h.engine.regenerate_energy().await.unwrap(), 1);
    assert_eq!(h.engine.player(&actor("ana")).await.unwrap().energy, 4);
    assert_eq!(h.engine.player(&actor("bo")).await.unwrap().energy, 3);
    assert_eq!(h.engine.player(&actor("cy")).await.unwrap().energy, 10);
}

#[tokio::test]
async fn energy_spend_fails_closed_through_the_engine() {
    let h = harness(QuestConfig::default());
    h.engine.players().update("ana", "ana", |p| p.energy = 2).await.unwrap();
    assert!(!h.engine.consume_energy("ana", 3).await.unwrap());
    assert!(h.engine.consume_energy("ana", 2).await.unwrap());
    assert_eq!(h.engine.player(&actor("ana")).await.unwrap().energy, 0);
    assert_eq!(h.engine.restore_energy("ana", 50).await.unwrap(), 10);
}

#[tokio::test]
async fn sweep_clears_only_expired_injuries() {
    let config = QuestConfig::default();
    let ankle = kind_named(&config, "Sprained Ankle");
    let concussion = kind_named(&config, "Concussion");
    let h = harness(config);
    let now = h.engine.now();
    h.engine
        .players()
        .update("ana", "ana", |p| {
            apply_injury(p, &ankle, now);
        })
        .await
        .unwrap();
    h.engine
        .players()
        .update("bo", "bo", |p| {
            apply_injury(p, &concussion, now);
        })
        .await
        .unwrap();

    h.clock.advance(Duration::hours(3));
    assert_eq!(h.engine.sweep_all_injuries().await.unwrap(), 1);
    assert!(h.engine.player(&actor("ana")).await.unwrap().active_injuries.is_empty());
    assert_eq!(h.engine.player(&actor("bo")).await.unwrap().active_injuries.len(), 1);
}
