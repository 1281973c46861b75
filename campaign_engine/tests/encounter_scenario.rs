mod common;

use campaign_engine::content::seed;
use campaign_engine::save;
use campaign_engine::{CombatAction, EncounterSetup, GameState, Side};
use campaign_rules::{Combatant, Effect, EncounterOutcome, EntityType, LocationId, TimeOfDay};

use common::{fight_out, id, sturdy_state};

/// Travel from the starting town into the woods and roll the daytime table.
fn into_the_woods(seed: u64) -> (GameState, EncounterSetup) {
    let mut state = sturdy_state(seed);
    assert_eq!(state.current_location().as_str(), "silverthorn");

    let woods: LocationId = id("whisperwood");
    state.travel_to(&woods).unwrap();
    assert_eq!(state.clock().time_of_day(), TimeOfDay::Day);

    let roll = state
        .roll_encounter(&woods, TimeOfDay::Day)
        .unwrap()
        .expect("weighted tables always produce an encounter");
    assert_eq!(roll.entry_id.as_str(), "spore-wolf-pack");
    (state, roll.into_setup())
}

#[test]
fn test_daytime_wolf_pack_encounter() {
    let (mut state, setup) = into_the_woods(42);
    let wraith_before = state.creature("myconid-wraith").cloned();

    state.begin_encounter(setup).unwrap();
    let encounter = state.active_encounter().unwrap();
    let hostiles: Vec<_> = encounter
        .participants
        .iter()
        .filter(|p| p.combatant.kind == EntityType::Creature)
        .map(|p| state.creature_instance(&p.combatant.id).unwrap())
        .collect();
    assert_eq!(hostiles.len(), 2);
    assert!(hostiles
        .iter()
        .all(|c| c.template_id.as_ref().map(|t| t.as_str()) == Some("spore-wolf")));

    let summary = fight_out(&mut state, 200).expect("fight should end");
    assert_eq!(summary.outcome, EncounterOutcome::Victory);
    assert_eq!(state.creature("myconid-wraith").cloned(), wraith_before);

    let dead: Vec<String> = state
        .creature_instances()
        .filter(|c| !c.is_alive())
        .map(|c| c.id.to_string())
        .collect();
    assert_eq!(dead.len(), 2);

    let restored = save::load(&save::save(&state, 1).unwrap()).unwrap();
    for instance_id in &dead {
        assert!(!restored.creature_instance(instance_id).unwrap().is_alive());
    }
    assert_eq!(restored, state);
}

#[test]
fn test_same_seed_same_fight() {
    let (mut a, setup_a) = into_the_woods(42);
    let (mut b, setup_b) = into_the_woods(42);
    assert_eq!(setup_a, setup_b);

    a.begin_encounter(setup_a).unwrap();
    b.begin_encounter(setup_b).unwrap();
    assert_eq!(a.active_encounter(), b.active_encounter());

    let summary_a = fight_out(&mut a, 200);
    let summary_b = fight_out(&mut b, 200);
    assert_eq!(summary_a, summary_b);
    assert_eq!(a.last_encounter(), b.last_encounter());
    assert_eq!(a, b);
}

#[test]
fn test_mid_fight_save_resumes_identically() {
    let (mut state, setup) = into_the_woods(9);
    state.begin_encounter(setup).unwrap();
    state.run_ai_turns().unwrap();

    let mut restored = save::load(&save::save(&state, 4).unwrap()).unwrap();
    assert_eq!(restored.active_encounter(), state.active_encounter());

    let original = fight_out(&mut state, 200);
    let resumed = fight_out(&mut restored, 200);
    assert_eq!(original, resumed);
    assert_eq!(state, restored);
}

#[test]
fn test_travel_blocked_during_fight() {
    let (mut state, setup) = into_the_woods(42);
    state.begin_encounter(setup).unwrap();
    let before = state.current_location().clone();

    let home: LocationId = id("silverthorn");
    assert!(state.travel_to(&home).is_err());
    assert_eq!(state.current_location(), &before);
}

#[test]
fn test_scaled_npc_refights_at_new_level() {
    let mut state = seed::starter_state(0).unwrap();
    let patrol = || EncounterSetup::new(id("mountain-patrol")).at(id("durnhelm"));

    state.begin_encounter(patrol()).unwrap();
    let first_level = state
        .npc("spore-wolf-alpha")
        .and_then(|npc| npc.combat_block.as_ref())
        .map(|block| block.level)
        .unwrap();
    state.run_ai_turns().unwrap();
    assert!(state.is_player_turn());
    let fled = state.submit_action(CombatAction::Flee).unwrap();
    assert_eq!(fled.resolution.unwrap().outcome, EncounterOutcome::Fled);

    state
        .apply_quest_effect(&[Effect::GrantXp { amount: 6500 }])
        .unwrap();
    assert_eq!(state.pc().level(), 5);

    let mut state = save::load(&save::save(&state, 2).unwrap()).unwrap();
    let alpha = state.npc("spore-wolf-alpha").unwrap();
    let expected = alpha
        .scaled_stat_block(state.pc().level(), state.difficulty())
        .unwrap();
    let carried_hp = alpha.combat_block.as_ref().unwrap().current_hit_points();
    let template_level = alpha.stat_block.as_ref().unwrap().level;

    state.begin_encounter(patrol()).unwrap();
    let alpha = state.npc("spore-wolf-alpha").unwrap();
    let block = alpha.combat_block.as_ref().unwrap();
    assert!(block.level > first_level);
    assert_eq!(block.level, expected.level);
    assert_eq!(block.actions, expected.actions);
    assert_eq!(block.current_hit_points(), carried_hp.min(block.max_hit_points()));
    assert_eq!(alpha.stat_block.as_ref().unwrap().level, template_level);
}

#[test]
fn test_recruited_companion_fights_on_party_side() {
    let (mut state, setup) = into_the_woods(42);
    let alpha: campaign_rules::NpcId = id("spore-wolf-alpha");
    let aodhan: campaign_rules::NpcId = id("aodhan");
    state.recruit_companion(&aodhan, true).unwrap();
    state.recruit_companion(&alpha, true).unwrap();
    state.set_party_leader(Some(alpha.clone())).unwrap();
    assert!(state.set_party_leader(Some(id("ghost-of-nobody"))).is_err());
    assert_eq!(state.party().leader.as_ref(), Some(&alpha));

    let restored = save::load(&save::save(&state, 3).unwrap()).unwrap();
    assert_eq!(restored.party(), state.party());
    assert_eq!(restored.party().active, vec![aodhan.clone(), alpha.clone()]);

    state.begin_encounter(setup).unwrap();
    let encounter = state.active_encounter().unwrap();
    let party: Vec<_> = encounter
        .side(Side::Party)
        .map(|p| (p.combatant.kind, p.combatant.id.to_string()))
        .collect();
    // Aodhan has no stat block and stays out of the fight.
    assert_eq!(party.len(), 2);
    assert_eq!(party[0].0, EntityType::Player);
    assert_eq!(party[1], (EntityType::Npc, "spore-wolf-alpha".to_string()));
    assert!(state.dismiss_companion(&alpha).is_err());

    fight_out(&mut state, 200).expect("fight should end");
    assert!(state.dismiss_companion(&alpha).unwrap());
    assert!(!state.dismiss_companion(&alpha).unwrap());
    assert_eq!(state.party().leader, None);
}
