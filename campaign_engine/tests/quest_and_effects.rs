mod common;

use campaign_engine::content::seed;
use campaign_engine::EngineError;
use campaign_rules::{
    Combatant, Effect, LocationId, QuestId, QuestStatus, StatusEffectId, TargetRef,
};

use common::id;

#[test]
fn test_main_quest_through_dialogue() {
    let mut state = seed::starter_state(42).unwrap();
    let quest: QuestId = id("echoes-in-whisperwood");
    let woods: LocationId = id("whisperwood");
    let mine: LocationId = id("durnhelm");

    assert!(state.travel_to(&mine).is_err());
    state.travel_to(&woods).unwrap();
    assert_eq!(state.quest("echoes-in-whisperwood").unwrap().status, QuestStatus::Active);

    let mut stages = vec![state.quest("echoes-in-whisperwood").unwrap().stage];
    state.advance_quest_stage(&quest, true).unwrap();
    stages.push(state.quest("echoes-in-whisperwood").unwrap().stage);

    let present: Vec<&str> = state.npcs_at("whisperwood").iter().map(|n| n.id.as_str()).collect();
    assert_eq!(present, vec!["scout-aodhan"]);
    state.start_dialogue(&id("scout-aodhan"), "greeting").unwrap();
    state.choose("ask-about-spores").unwrap();
    state.choose("thank").unwrap();
    assert_eq!(state.transcript().len(), 2);

    while state.quest("echoes-in-whisperwood").unwrap().status == QuestStatus::Active {
        state.advance_quest_stage(&quest, true).unwrap();
        stages.push(state.quest("echoes-in-whisperwood").unwrap().stage);
    }

    assert!(stages.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(state.quest("echoes-in-whisperwood").unwrap().status, QuestStatus::Completed);
    assert_eq!(state.pc().level(), 2);

    state.travel_to(&mine).unwrap();
    assert_eq!(state.current_location(), &mine);
}

#[test]
fn test_completed_quest_cannot_restart() {
    let mut state = seed::starter_state(1).unwrap();
    let quest: QuestId = id("echoes-in-whisperwood");
    state.start_quest(&quest).unwrap();
    for _ in 0..3 {
        state.advance_quest_stage(&quest, true).unwrap();
    }
    let snapshot = state.clone();

    assert!(state.start_quest(&quest).is_err());
    assert!(state.advance_quest_stage(&quest, true).is_err());
    assert_eq!(state, snapshot);
}

#[test]
fn test_stacking_caps_at_three() {
    let mut state = seed::starter_state(42).unwrap();
    let sickness: StatusEffectId = id("spore-sickness");
    for _ in 0..5 {
        state
            .apply_quest_effect(&[Effect::ApplyStatusEffect {
                target: TargetRef::Player,
                effect_id: sickness.clone(),
            }])
            .unwrap();
    }

    assert_eq!(state.pc().status_effects().stacks_of("spore-sickness"), 3);
    assert_eq!(state.pc().status_effects().len(), 1);
}

#[test]
fn test_refresh_keeps_single_instance() {
    let mut state = seed::starter_state(42).unwrap();
    let base_armor = state.pc().armor_class();
    for _ in 0..3 {
        state
            .apply_quest_effect(&[Effect::ApplyStatusEffect {
                target: TargetRef::Player,
                effect_id: id("warded"),
            }])
            .unwrap();
    }

    assert_eq!(state.pc().status_effects().len(), 1);
    assert_eq!(state.pc().armor_class(), base_armor + 1);
}

#[test]
fn test_bundle_with_unknown_reference_changes_nothing() {
    let mut state = seed::starter_state(42).unwrap();
    let snapshot = state.clone();

    let err = state
        .apply_quest_effect(&[
            Effect::set_flag("gate-open", true),
            Effect::AdjustReputation {
                faction_id: id("spore-cult"),
                delta: 5,
            },
        ])
        .unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(state, snapshot);
}
