mod common;

use common::{actor, harness};
use questbot::config::QuestConfig;
use questbot::constants::PLAYERS_MODULE;
use questbot::database::PlayerStore;
use questbot::database::models::ActiveEffect;
use questbot::quest::{Rejection, inventory};
use questbot::quest::items::ItemKind;
use serde_json::json;

#[tokio::test]
async fn old_record_shapes_load_and_play() {
    let h = harness(QuestConfig::default());
    h.store
        .replace(
            PLAYERS_MODULE,
            "ana",
            json!({
                "username": "ana",
                "xp": 450,
                "level": 1,
                "inventory": {"medkits": 2, "swords": 1},
                "active_injury": {"name": "Concussion", "expires_at": 4102444800u64},
                "challenge_path": "iron_path",
                "challenge_stats": {"medkits_used_this_prestige": 1},
                "unlocked_abilities": null,
                "quest_cooldown": null
            }),
        )
        .await
        .unwrap();

    let p = h.engine.player(&actor("ana")).await.unwrap();
    assert_eq!(p.level, 4);
    assert_eq!(p.item_count(ItemKind::Medkit), 2);
    assert_eq!(p.inventory.len(), 1);
    assert_eq!(p.challenge.path.as_deref(), Some("iron_path"));
    assert_eq!(p.challenge.medkits_used_this_prestige, 1);
    assert!(p.unlocked_abilities.is_empty());
    assert_eq!(p.active_injuries[0].name, "Concussion");

    let res = h.engine.quest(&actor("ana")).await.unwrap();
    assert_eq!(res.reply, Rejection::Injured { injuries: "Concussion".to_string() }.to_string());

    // The upgraded shape is what gets written back.
    let stored = h.store.get(PLAYERS_MODULE, "ana").await.unwrap().unwrap();
    assert!(stored.get("active_injury").is_none());
    assert_eq!(stored["active_injuries"][0]["expires_at"], "2100-01-01T00:00:00Z");
}

#[tokio::test]
async fn prestiged_record_without_effective_prestige_keeps_its_bonus() {
    let h = harness(QuestConfig::default());
    h.store
        .replace(PLAYERS_MODULE, "vet", json!({"username": "vet", "xp": 0, "prestige": 3}))
        .await
        .unwrap();
    let p = h.engine.player(&actor("vet")).await.unwrap();
    assert_eq!((p.prestige, p.effective_prestige), (3, 3));

    let award = h.engine.grant_xp("vet", 100, 1.0).await.unwrap();
    assert_eq!(award.level.xp_gained, 130);
}

#[tokio::test]
async fn fractional_armor_shard_survives_loading() {
    let h = harness(QuestConfig::default());
    h.store
        .replace(
            PLAYERS_MODULE,
            "ana",
            json!({
                "username": "ana",
                "active_effects": [{"type": "armor_shard", "injury_reduction": 0.30, "remaining_fights": 3}]
            }),
        )
        .await
        .unwrap();
    let p = h.engine.player(&actor("ana")).await.unwrap();
    assert_eq!(p.active_effects, vec![ActiveEffect::ArmorShard { injury_reduction: 30, remaining_fights: 3 }]);
    assert!((inventory::injury_reduction(&p) - 0.30).abs() < 1e-9);
}

#[tokio::test]
async fn one_bad_field_does_not_reset_the_player() {
    let h = harness(QuestConfig::default());
    h.store
        .replace(
            PLAYERS_MODULE,
            "c",
            json!({
                "username": "c",
                "xp": 450.5,
                "level": "3",
                "prestige": 3,
                "class": 7,
                "wins": -2,
                "inventory": {"medkits": "2"}
            }),
        )
        .await
        .unwrap();
    let p = h.engine.player(&actor("c")).await.unwrap();
    assert_eq!((p.xp, p.level, p.prestige, p.wins), (450, 4, 3, 0));
    assert_eq!(p.class, None);
    assert_eq!(p.item_count(ItemKind::Medkit), 2);

    // The repaired record is what gets written back.
    let stored = h.store.get(PLAYERS_MODULE, "c").await.unwrap().unwrap();
    assert_eq!(stored["xp"], 450);
    assert_eq!(stored["prestige"], 3);
}

#[tokio::test]
async fn non_record_value_starts_fresh() {
    let h = harness(QuestConfig::default());
    h.store.replace(PLAYERS_MODULE, "bo", json!("not a player")).await.unwrap();
    let p = h.engine.player(&actor("bo")).await.unwrap();
    assert_eq!((p.id.as_str(), p.level, p.energy), ("bo", 1, 10));
}
