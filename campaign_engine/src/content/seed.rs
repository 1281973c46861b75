//! The built-in starter campaign: Silverthorn, the Whisperwood, and the
//! search for the missing scout Aodhan.

use campaign_rules::{
    Ability, AbilityScores, AttackProfile, CharacterClass, CheckKind, ChoiceCheck, Comparator,
    Condition, Connection, Consumable, ConsumableEffect, Creature, DangerLevel, DialogueChoice,
    DialogueNode, DiceFormula, Difficulty, DamageType, EffectDuration, Effect, EncounterEntry,
    Equipment, EquipmentSlot, Faction, FactionId, FlagValue, Item, ItemId, ItemKind, Location,
    LocationId, Modifiers, Npc, NpcId, NpcScalingProfile, PlayerCharacter, ProficiencyTier, Quest,
    QuestDependency, QuestStage, Race, RollMode, SaveKind, ScheduleEntry, Skill, StackingRule,
    StatusEffect, StatusEffectId, TimeWindow,
};

use super::ContentPack;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::state::GameState;

/// The starter campaign as a content pack.
pub fn starter_pack() -> EngineResult<ContentPack> {
    let silverthorn: LocationId = "silverthorn".parse()?;
    let whisperwood: LocationId = "whisperwood".parse()?;
    let durnhelm: LocationId = "durnhelm".parse()?;
    let rangers: FactionId = "silverthorn-rangers".parse()?;
    let miners: FactionId = "miners-guild".parse()?;
    let aodhan: NpcId = "scout-aodhan".parse()?;
    let sickness: StatusEffectId = "spore-sickness".parse()?;

    let flags = [
        ("entered-whisperwood", FlagValue::Bool(false)),
        ("artifact-clues", FlagValue::Int(0)),
        ("aodhan-status", FlagValue::from("unknown")),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect();

    Ok(ContentPack {
        player: Some(aria()?),
        start_location: Some(silverthorn.clone()),
        timestamp: "0001-01-01T00:00:00Z".to_string(),
        difficulty: Difficulty::Standard,
        flags,
        locations: locations(&silverthorn, &whisperwood, &durnhelm, &miners)?,
        factions: factions(&rangers, &miners, &silverthorn, &durnhelm),
        npcs: npcs(&aodhan, &rangers, &whisperwood, &silverthorn, &sickness)?,
        creatures: vec![spore_wolf(&sickness)?, myconid_wraith()?, alley_thug()?],
        items: items()?,
        status_effects: status_effects(&sickness)?,
        quests: quests(&rangers, &aodhan, &whisperwood)?,
        party: Default::default(),
    })
}

/// The starter campaign loaded with default configuration.
pub fn starter_state(seed: u64) -> EngineResult<GameState> {
    starter_pack()?.into_state(seed, EngineConfig::default())
}

fn aria() -> EngineResult<PlayerCharacter> {
    let human = Race {
        id: "human".to_string(),
        name: "Human".to_string(),
        bonuses: Modifiers::new()
            .with(Ability::Wisdom.key(), 1)
            .with(Modifiers::INITIATIVE, 1),
        traits: vec!["versatile".to_string()],
    };
    let ranger = CharacterClass {
        id: "ranger".to_string(),
        name: "Ranger".to_string(),
        hit_die: 10,
        save_proficiencies: vec![SaveKind::Fortitude, SaveKind::Reflex],
        bonuses: Modifiers::new()
            .with(Ability::Dexterity.key(), 1)
            .with(Modifiers::ARMOR_CLASS, 1),
    };

    let mut pc = PlayerCharacter::new(
        "pc-aria".parse()?,
        "Aria",
        AbilityScores::new(10, 14, 12, 12, 13, 11),
        human,
        ranger,
    )
    .with_skill(Skill::Survival, ProficiencyTier::Trained)
    .with_skill(Skill::Stealth, ProficiencyTier::Trained);
    pc.background = "Scout of Silverthorn".to_string();

    pc.equip(iron_sabre()?)?;
    pc.inventory.add(&"forest-tonic".parse()?, 2);
    pc.inventory.add(&"everbloom-salve".parse()?, 1);
    pc.inventory.add(&"warding-charm".parse()?, 1);
    Ok(pc)
}

fn iron_sabre() -> EngineResult<Item> {
    let mut sabre = Item::new("iron-sabre".parse()?, "Iron Sabre").with_kind(ItemKind::Equipment(
        Equipment::new(EquipmentSlot::MainHand)
            .with_modifiers(Modifiers::new().with(Modifiers::ATTACK, 1))
            .with_attack(
                AttackProfile::new("Iron Sabre", Ability::Dexterity, DiceFormula::new(1, 6, 0))
                    .with_damage_type(DamageType::Slashing),
            ),
    ));
    sabre.rarity = "uncommon".to_string();
    sabre.value = 25;
    Ok(sabre)
}

fn items() -> EngineResult<Vec<Item>> {
    let axe = Item::new("woodsman-axe".parse()?, "Woodsman's Axe").with_kind(ItemKind::Equipment(
        Equipment::new(EquipmentSlot::MainHand).with_attack(
            AttackProfile::new("Woodsman's Axe", Ability::Strength, DiceFormula::new(1, 8, 0))
                .with_damage_type(DamageType::Slashing),
        ),
    ));

    let tonic = Item::new("forest-tonic".parse()?, "Forest Tonic")
        .with_kind(ItemKind::Consumable(Consumable::new(ConsumableEffect::Heal(25))));

    let mut salve_use = Consumable::new(ConsumableEffect::Heal(5));
    salve_use.charges = 3;
    let salve = Item::new("everbloom-salve".parse()?, "Everbloom Salve")
        .with_kind(ItemKind::Consumable(salve_use));

    let mut charm_use = Consumable::new(ConsumableEffect::ApplyStatus("warded".parse()?));
    charm_use.usable_in_combat = false;
    let charm = Item::new("warding-charm".parse()?, "Warding Charm")
        .with_kind(ItemKind::Consumable(charm_use));

    let map = Item::new("old-map".parse()?, "Old Map of the Pass");

    Ok(vec![iron_sabre()?, axe, tonic, salve, charm, map])
}

fn status_effects(sickness: &StatusEffectId) -> EngineResult<Vec<StatusEffect>> {
    Ok(vec![
        StatusEffect::new("inspired".parse()?, "Inspired", EffectDuration::Minutes(60))
            .with_modifiers(Modifiers::new().with("will", 1).with(Modifiers::HIT_POINTS, 3)),
        StatusEffect::new(sickness.clone(), "Spore Sickness", EffectDuration::Turns(3))
            .with_stacking(StackingRule::Stack, 3)
            .with_modifiers(Modifiers::new().with(Modifiers::ATTACK, -1))
            .with_dispel_when(Condition::flag_is("sporefall-cleansed", true)),
        StatusEffect::new("warded".parse()?, "Warded", EffectDuration::Minutes(60))
            .with_modifiers(Modifiers::new().with(Modifiers::ARMOR_CLASS, 1)),
    ])
}

fn spore_wolf(sickness: &StatusEffectId) -> EngineResult<Creature> {
    let mut bite = AttackProfile::new("Infected Bite", Ability::Strength, DiceFormula::new(1, 6, 0))
        .with_to_hit(2)
        .with_damage_type(DamageType::Piercing)
        .with_on_hit(sickness.clone());
    bite.damage_bonus = 2;

    let mut wolf = Creature::new(
        "spore-wolf".parse()?,
        "Spore Wolf",
        2,
        8,
        12,
        AbilityScores::new(13, 14, 12, 3, 11, 6),
    )
    .with_action(bite)
    .with_xp_value(150);
    wolf.role = "skirmisher".to_string();
    wolf.save_proficiencies = vec![SaveKind::Fortitude, SaveKind::Reflex];
    wolf.traits = vec!["pack-tactics".to_string()];
    wolf.recompute();
    Ok(wolf)
}

fn myconid_wraith() -> EngineResult<Creature> {
    let mut burst = AttackProfile::new("Spore Burst", Ability::Wisdom, DiceFormula::new(1, 8, 0))
        .with_to_hit(3)
        .with_damage_type(DamageType::Psychic);
    burst.damage_bonus = 3;

    let mut wraith = Creature::new(
        "myconid-wraith".parse()?,
        "Myconid Wraith",
        4,
        10,
        14,
        AbilityScores::new(10, 12, 14, 8, 15, 10),
    )
    .with_action(burst)
    .with_xp_value(450);
    wraith.role = "controller".to_string();
    wraith.save_proficiencies = vec![SaveKind::Will, SaveKind::Fortitude];
    wraith.traits = vec!["spore-cloud".to_string(), "flying".to_string()];
    wraith.recompute();
    Ok(wraith)
}

fn alley_thug() -> EngineResult<Creature> {
    Ok(Creature::new(
        "alley-thug".parse()?,
        "Alley Thug",
        1,
        6,
        11,
        AbilityScores::new(12, 12, 10, 9, 9, 9),
    )
    .with_action(AttackProfile::new("Cudgel", Ability::Strength, DiceFormula::new(1, 4, 0)))
    .with_xp_value(25))
}

fn locations(
    silverthorn: &LocationId,
    whisperwood: &LocationId,
    durnhelm: &LocationId,
    miners: &FactionId,
) -> EngineResult<Vec<Location>> {
    let mut town = Location::new(silverthorn.clone(), "Silverthorn")
        .with_connection(Connection::new(whisperwood.clone(), 240))
        .with_encounter(
            EncounterEntry::new("street-brawl".parse()?).spawning("alley-thug".parse()?, 1),
        );
    town.biome = "temperate-town".to_string();
    town.danger = DangerLevel::Safe;
    town.points_of_interest = vec!["market-square".to_string(), "old-watchtower".to_string()];
    town.tags = ["hub", "starting-town"].iter().map(|t| t.to_string()).collect();

    let mut forest = Location::new(whisperwood.clone(), "Whisperwood / Sporefall")
        .with_connection(Connection::new(silverthorn.clone(), 240))
        .with_connection(Connection::new(durnhelm.clone(), 180).when(Condition::Flag {
            key: "artifact-clues".to_string(),
            cmp: Comparator::Ge,
            value: FlagValue::Int(1),
        }))
        .with_encounter(
            EncounterEntry::new("spore-wolf-pack".parse()?)
                .with_weight(3)
                .in_window(TimeWindow::Day)
                .spawning("spore-wolf".parse()?, 2),
        )
        .with_encounter(
            EncounterEntry::new("myconid-wraith".parse()?)
                .with_weight(1)
                .in_window(TimeWindow::Night)
                .spawning("myconid-wraith".parse()?, 1),
        );
    forest.biome = "corrupted-forest".to_string();
    forest.danger = DangerLevel::High;
    forest.points_of_interest = vec!["spore-choked-path".to_string(), "aodhans-camp".to_string()];
    forest.tags = ["quest-hub"].iter().map(|t| t.to_string()).collect();

    let mut patrol = EncounterEntry::new("mountain-patrol".parse()?);
    patrol.hostile_npcs.push("spore-wolf-alpha".parse()?);
    let mut pass = Location::new(durnhelm.clone(), "Durnhelm")
        .with_connection(Connection::new(whisperwood.clone(), 180))
        .with_encounter(patrol);
    pass.biome = "mountain-pass".to_string();
    pass.danger = DangerLevel::Medium;
    pass.controlled_by = Some(miners.clone());
    pass.points_of_interest = vec!["switchback-trail".to_string(), "watch-fire".to_string()];
    pass.tags = ["faction-clue"].iter().map(|t| t.to_string()).collect();

    Ok(vec![town, forest, pass])
}

fn factions(
    rangers: &FactionId,
    miners: &FactionId,
    silverthorn: &LocationId,
    durnhelm: &LocationId,
) -> Vec<Faction> {
    let mut wardens = Faction::new(rangers.clone(), "Silverthorn Rangers");
    wardens.ideology = "Keep the roads open and the forest watched".to_string();
    wardens.territory.insert(silverthorn.clone());
    wardens.base_reputation = 5;

    let mut guild = Faction::new(miners.clone(), "Miners' Guild");
    guild.ideology = "Stone, coin, and the old tunnels".to_string();
    guild.territory.insert(durnhelm.clone());
    guild.relationships.insert(rangers.clone(), 10);

    vec![wardens, guild]
}

fn npcs(
    aodhan: &NpcId,
    rangers: &FactionId,
    whisperwood: &LocationId,
    silverthorn: &LocationId,
    sickness: &StatusEffectId,
) -> EngineResult<Vec<Npc>> {
    let greeting = DialogueNode::new(
        "greeting",
        "A lean ranger lowers a bow. \"You walked through the spores to find me?\"",
    )
    .with_choice(
        DialogueChoice::new("ask-about-spores", "Ask what Aodhan found in the spores.")
            .when(Condition::flag_is("entered-whisperwood", true))
            .with_effect(Effect::set_flag("artifact-clues", 1i64))
            .with_effect(Effect::AdjustRelationship {
                npc_id: aodhan.clone(),
                delta: 5,
            })
            .then("clues"),
    )
    .with_choice(
        DialogueChoice::new("persuade", "Convince Aodhan to report back to the rangers.")
            .with_check(ChoiceCheck {
                kind: CheckKind::Skill(Skill::Persuasion),
                dc: 12,
                mode: RollMode::Normal,
            })
            .with_effect(Effect::AdjustReputation {
                faction_id: rangers.clone(),
                delta: 10,
            })
            .with_failure_effect(Effect::AdjustRelationship {
                npc_id: aodhan.clone(),
                delta: -5,
            }),
    )
    .with_choice(DialogueChoice::new("leave", "Leave the scout to the watch."));

    let mut clues = DialogueNode::new(
        "clues",
        "\"Something under Durnhelm is feeding the bloom. The miners know more than they say.\"",
    )
    .with_choice(DialogueChoice::new("thank", "Say thanks and go."));
    clues.on_enter.push(Effect::set_flag("heard-aodhan-clues", true));

    let mut scout = Npc::new(aodhan.clone(), "Aodhan")
        .with_dialogue(greeting)
        .with_dialogue(clues);
    scout.archetype = "missing-scout".to_string();
    scout.faction_id = Some(rangers.clone());
    scout.schedule = vec![
        ScheduleEntry {
            start_hour: 8,
            end_hour: 20,
            location_id: whisperwood.clone(),
            activity: "tracking the spore-choked path".to_string(),
        },
        ScheduleEntry {
            start_hour: 20,
            end_hour: 8,
            location_id: silverthorn.clone(),
            activity: "reporting at the watchtower".to_string(),
        },
    ];
    scout.quest_hooks.push("echoes-in-whisperwood".parse()?);

    let mut alpha = Npc::new("spore-wolf-alpha".parse()?, "Spore Wolf Alpha").with_stat_block(
        spore_wolf(sickness)?,
        Some(NpcScalingProfile {
            base_level: 2,
            attack_progression: 1,
            damage_progression: 1,
            ..NpcScalingProfile::default()
        }),
    );
    alpha.archetype = "creature-encounter".to_string();
    alpha.disposition = -50;

    Ok(vec![scout, alpha])
}

fn quests(rangers: &FactionId, aodhan: &NpcId, whisperwood: &LocationId) -> EngineResult<Vec<Quest>> {
    let mut travel = QuestStage::new("travel-whisperwood")
        .on_success(Effect::set_flag("entered-whisperwood", true))
        .on_success(Effect::set_flag("aodhan-status", "missing"));
    travel.description = "Reach Whisperwood and survey the corruption.".to_string();
    travel.success_next = Some("gather-clues".to_string());

    let mut gather = QuestStage::new("gather-clues")
        .requires(Condition::flag_is("entered-whisperwood", true))
        .on_success(Effect::set_flag("artifact-clues", 1i64));
    gather.description = "Collect evidence about Aodhan near the spore-choked paths.".to_string();
    gather.success_next = Some("trace-artifact".to_string());

    let mut trace = QuestStage::new("trace-artifact")
        .requires(Condition::Flag {
            key: "artifact-clues".to_string(),
            cmp: Comparator::Ge,
            value: FlagValue::Int(1),
        })
        .on_success(Effect::set_flag("artifact-clues", 2i64));
    trace.description = "Follow leads toward the artifact in Durnhelm.".to_string();

    let mut echoes = Quest::new("echoes-in-whisperwood".parse()?, "Echoes in the Whisperwood")
        .with_stage(travel)
        .with_stage(gather)
        .with_stage(trace);
    echoes.summary =
        "Investigate Aodhan's fate in Whisperwood and uncover a buried artifact.".to_string();
    echoes.triggers = Some(Condition::Visited {
        location_id: whisperwood.clone(),
    });
    echoes.fail_conditions = Some(Condition::flag_is("aodhan-status", "dead"));
    echoes.rewards = vec![
        Effect::GrantXp { amount: 300 },
        Effect::AdjustReputation {
            faction_id: rangers.clone(),
            delta: 10,
        },
    ];
    echoes.related_factions.push(rangers.clone());
    echoes.related_npcs.push(aodhan.clone());

    let mut hunt = QuestStage::new("hunt-wolves").on_success(Effect::GrantItem {
        item_id: "woodsman-axe".parse::<ItemId>()?,
        quantity: 1,
    });
    hunt.description = "Thin the spore wolf packs around the forest road.".to_string();

    let mut cull = Quest::new("wolf-cull".parse()?, "Cull the Spore Wolves").with_stage(hunt);
    cull.dependencies.push(QuestDependency {
        quest_id: echoes.id.clone(),
        min_stage: 1,
    });
    cull.rewards.push(Effect::GrantXp { amount: 150 });

    Ok(vec![echoes, cull])
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_rules::Combatant;

    #[test]
    fn test_aria_derived_stats() {
        let pc = aria().unwrap();
        assert_eq!(pc.max_hit_points(), 11);
        assert_eq!(pc.armor_class(), 13);
        assert_eq!(pc.initiative_modifier(), 5);
        assert_eq!(pc.ability_score(Ability::Wisdom), 14);
        assert_eq!(pc.attack_bonus(), 1);
        assert_eq!(pc.attack_profiles()[0].name, "Iron Sabre");
    }

    #[test]
    fn test_spore_wolf_stat_block() {
        let wolf = spore_wolf(&"spore-sickness".parse().unwrap()).unwrap();
        assert_eq!(wolf.max_hit_points(), 12);
        assert_eq!(wolf.armor_class(), 14);
        assert_eq!(wolf.initiative_modifier(), 4);
    }

    #[test]
    fn test_starter_state_loads() {
        let state = starter_state(42).unwrap();
        assert_eq!(state.current_location().as_str(), "silverthorn");
        assert_eq!(state.timestamp(), "0001-01-01T00:00:00Z");
        assert_eq!(state.locations().count(), 3);
        assert!(state.creature("myconid-wraith").is_some());
        assert_eq!(state.flag("aodhan-status"), Some(&FlagValue::from("unknown")));
    }
}
