//! The encounter state machine: setup, initiative, action resolution, and
//! write-back on resolution.

use tracing::{debug, info};

use campaign_rules::{
    AttackProfile, Combatant, Condition, ConsumableEffect, CreatureId, EffectDuration,
    EncounterOutcome, EntityType, ItemId, Modifiers, RollMode, StatusEffect, StatusEffectId,
};

use super::{
    CombatAction, CombatEvent, CombatLogEntry, CombatPhase, CombatantRef, EncounterId,
    EncounterSetup, EncounterState, EncounterSummary, Participant, Side, TurnReport,
};
use crate::error::{EngineError, EngineResult};
use crate::state::{ensure_storable_flags, GameState};

/// Status granted by the defend action.
pub const DEFENDING: &str = "defending";

impl GameState {
    /// Start an encounter from a location's encounter table entry.
    ///
    /// The party is the player plus living companions; hostiles are the
    /// entry's spawned creatures and hostile NPCs. Initiative is rolled
    /// immediately and the encounter waits on the first actor.
    pub fn begin_encounter(&mut self, setup: EncounterSetup) -> EngineResult<EncounterId> {
        self.transact("begin_encounter", |state| state.begin_encounter_inner(setup))
    }

    pub(crate) fn begin_encounter_inner(&mut self, setup: EncounterSetup) -> EngineResult<EncounterId> {
        if self.active_encounter.is_some() {
            return Err(EngineError::invalid_action("an encounter is already in progress"));
        }
        if !self.pc.is_alive() {
            return Err(EngineError::invalid_action("the player cannot fight"));
        }
        let mut scripted = Vec::new();
        if let Some(objective) = &setup.objective {
            objective.visit_flags(&mut |key, value| scripted.push((key, value)));
        }
        for effect in &setup.on_resolved {
            effect.visit_flags(&mut |key, value| scripted.push((key, value)));
        }
        ensure_storable_flags(scripted)?;

        let location_id = setup
            .location_id
            .unwrap_or_else(|| self.current_location.clone());
        let entry = self
            .locations
            .get(&location_id)
            .ok_or_else(|| EngineError::validation(format!("unknown location '{location_id}'")))?
            .entry(&setup.entry_id)
            .cloned()
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "location '{location_id}' has no encounter '{}'",
                    setup.entry_id
                ))
            })?;

        let mut participants = vec![seat(CombatantRef::player(&self.pc.id), Side::Party)];

        let companions: Vec<_> = self
            .party
            .active
            .iter()
            .filter(|id| {
                self.npcs
                    .get(*id)
                    .is_some_and(|npc| npc.is_alive && npc.stat_block.is_some())
            })
            .cloned()
            .collect();
        for npc_id in companions {
            self.ready_npc(&npc_id)?;
            participants.push(seat(CombatantRef::npc(&npc_id), Side::Party));
        }

        for npc_id in &entry.hostile_npcs {
            let alive = self.npcs.get(npc_id).is_some_and(|npc| npc.is_alive);
            if !alive || self.party.contains(npc_id) {
                debug!(npc = %npc_id, "hostile npc absent");
                continue;
            }
            self.ready_npc(npc_id)?;
            participants.push(seat(CombatantRef::npc(npc_id), Side::Hostile));
        }

        for group in &entry.spawns {
            let template = self
                .creatures
                .get(&group.creature_id)
                .cloned()
                .ok_or_else(|| {
                    EngineError::validation(format!("unknown creature '{}'", group.creature_id))
                })?;
            for _ in 0..group.count {
                self.spawn_counter += 1;
                let instance_id = CreatureId::new(format!("{}-{}", template.id, self.spawn_counter))?;
                let instance = template.spawn(instance_id.clone());
                self.creature_instances.insert(instance_id.clone(), instance);
                participants.push(seat(CombatantRef::creature(&instance_id), Side::Hostile));
            }
        }

        if !participants.iter().any(|p| p.side == Side::Hostile) {
            return Err(EngineError::invalid_action(format!(
                "encounter '{}' has nobody to fight",
                setup.entry_id
            )));
        }

        let id = EncounterId(self.rng.uuid());
        let mut encounter = EncounterState {
            id,
            location_id,
            entry_id: setup.entry_id,
            phase: CombatPhase::Forming,
            participants,
            active_index: 0,
            round: 0,
            objective: setup.objective,
            on_resolved: setup.on_resolved,
            log: Vec::new(),
        };
        info!(
            encounter = %id,
            entry = %encounter.entry_id,
            location = %encounter.location_id,
            combatants = encounter.participants.len(),
            "encounter formed"
        );

        self.roll_initiative(&mut encounter);
        self.active_encounter = Some(encounter);
        Ok(id)
    }

    /// Make sure an NPC has a combat-ready copy in place.
    fn ready_npc(&mut self, npc_id: &campaign_rules::NpcId) -> EngineResult<()> {
        let player_level = self.pc.level();
        let difficulty = self.difficulty;
        let npc = self
            .npcs
            .get_mut(npc_id)
            .ok_or_else(|| EngineError::validation(format!("unknown npc '{npc_id}'")))?;
        let block = npc.combat_copy(player_level, difficulty).ok_or_else(|| {
            EngineError::validation(format!("npc '{npc_id}' has no stat block"))
        })?;
        npc.combat_block = Some(block);
        Ok(())
    }

    fn roll_initiative(&mut self, encounter: &mut EncounterState) {
        encounter.phase = CombatPhase::RollingInitiative;
        let die = self.config.initiative_die;
        for participant in encounter.participants.iter_mut() {
            let modifier = self
                .combatant(&participant.combatant)
                .map(|c| c.initiative_modifier())
                .unwrap_or(0);
            let roll = self.rng.roll_die(die);
            participant.modifier = modifier;
            participant.initiative = roll as i32 + modifier;
            encounter.log.push(CombatLogEntry {
                round: 0,
                actor: participant.combatant.clone(),
                event: CombatEvent::Initiative {
                    roll,
                    total: participant.initiative,
                },
            });
        }

        // Ties: higher modifier first, then id order.
        encounter.participants.sort_by(|a, b| {
            b.initiative
                .cmp(&a.initiative)
                .then_with(|| b.modifier.cmp(&a.modifier))
                .then_with(|| a.combatant.id.cmp(&b.combatant.id))
                .then_with(|| a.combatant.kind.cmp(&b.combatant.kind))
        });

        encounter.active_index = encounter.participants.len().saturating_sub(1);
        encounter.round = 0;
        self.advance_turn(encounter);
        encounter.phase = CombatPhase::TurnActive;
        debug!(
            order = ?encounter.participants.iter().map(|p| p.combatant.to_string()).collect::<Vec<_>>(),
            "initiative rolled"
        );
    }

    /// The record behind a combat reference.
    pub fn combatant(&self, combatant: &CombatantRef) -> Option<&dyn Combatant> {
        match combatant.kind {
            EntityType::Player if self.pc.id.as_str() == combatant.id => Some(&self.pc as &dyn Combatant),
            EntityType::Npc => self
                .npcs
                .get(combatant.id.as_str())?
                .combat_block
                .as_ref()
                .map(|block| block as &dyn Combatant),
            EntityType::Creature => self
                .creature_instances
                .get(combatant.id.as_str())
                .map(|c| c as &dyn Combatant),
            _ => None,
        }
    }

    fn combatant_mut(&mut self, combatant: &CombatantRef) -> EngineResult<&mut dyn Combatant> {
        let found: Option<&mut dyn Combatant> = match combatant.kind {
            EntityType::Player if self.pc.id.as_str() == combatant.id => {
                Some(&mut self.pc as &mut dyn Combatant)
            }
            EntityType::Npc => self
                .npcs
                .get_mut(combatant.id.as_str())
                .and_then(|npc| npc.combat_block.as_mut())
                .map(|block| block as &mut dyn Combatant),
            EntityType::Creature => self
                .creature_instances
                .get_mut(combatant.id.as_str())
                .map(|c| c as &mut dyn Combatant),
            _ => None,
        };
        found.ok_or_else(|| EngineError::validation(format!("unknown combatant '{combatant}'")))
    }

    fn is_conscious(&self, combatant: &CombatantRef) -> bool {
        self.combatant(combatant).is_some_and(|c| c.is_conscious())
    }

    fn is_alive(&self, combatant: &CombatantRef) -> bool {
        self.combatant(combatant).is_some_and(|c| c.is_alive())
    }

    fn attack_profiles(&self, combatant: &CombatantRef) -> Vec<AttackProfile> {
        let profiles = match combatant.kind {
            EntityType::Player => self.pc.attack_profiles(),
            EntityType::Npc => self
                .npcs
                .get(combatant.id.as_str())
                .and_then(|npc| npc.combat_block.as_ref())
                .map(|block| block.actions.clone())
                .unwrap_or_default(),
            EntityType::Creature => self
                .creature_instances
                .get(combatant.id.as_str())
                .map(|c| c.actions.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        if profiles.is_empty() {
            vec![AttackProfile::new(
                "Unarmed Strike",
                campaign_rules::Ability::Strength,
                self.config.unarmed_damage,
            )]
        } else {
            profiles
        }
    }

    /// Resolve one action for the active combatant and move to the next turn.
    ///
    /// Illegal actions are rejected and leave the encounter exactly as it was.
    pub fn submit_action(&mut self, action: CombatAction) -> EngineResult<TurnReport> {
        self.transact("submit_action", |state| state.submit_action_inner(action))
    }

    /// Spend the active player's turn on a consumable, aimed at `target` or
    /// the player when `None`.
    pub fn use_consumable_in_combat(
        &mut self,
        item_id: &ItemId,
        target: Option<CombatantRef>,
    ) -> EngineResult<TurnReport> {
        self.submit_action(CombatAction::UseConsumable {
            item_id: item_id.clone(),
            target,
        })
    }

    fn submit_action_inner(&mut self, action: CombatAction) -> EngineResult<TurnReport> {
        let mut encounter = self
            .active_encounter
            .take()
            .ok_or_else(|| EngineError::invalid_action("no encounter in progress"))?;
        if encounter.phase != CombatPhase::TurnActive {
            return Err(EngineError::invalid_action("the encounter is not awaiting an action"));
        }
        let actor = encounter
            .active()
            .cloned()
            .ok_or_else(|| EngineError::invalid_action("nobody is acting"))?;
        if action != CombatAction::Pass && !self.is_conscious(&actor.combatant) {
            return Err(EngineError::invalid_action(format!(
                "'{}' cannot act",
                actor.combatant
            )));
        }

        encounter.phase = CombatPhase::ResolvingAction;
        let round = encounter.round;
        let mut events = Vec::new();
        let mut defending = false;

        match action {
            CombatAction::Attack { target, attack } => {
                self.resolve_attack(&encounter, &actor, &target, attack, &mut events)?;
            }
            CombatAction::UseConsumable { item_id, target } => {
                let target = target.unwrap_or_else(|| actor.combatant.clone());
                self.resolve_consumable(&encounter, &actor, &item_id, &target, &mut events)?;
            }
            CombatAction::Defend => {
                defending = true;
                events.push(CombatEvent::Defend);
            }
            CombatAction::Flee => {
                if !actor.combatant.is_player() {
                    return Err(EngineError::invalid_action("only the player can flee"));
                }
                if let Some(seat) = encounter.participants.get_mut(encounter.active_index) {
                    seat.fled = true;
                }
                events.push(CombatEvent::Fled);
            }
            CombatAction::Pass => events.push(CombatEvent::Passed),
        }

        self.end_turn(&encounter, &actor, &mut events)?;
        if defending {
            let stance = self.defending_status()?;
            self.combatant_mut(&actor.combatant)?
                .apply_status(&stance, Some("defend".to_string()));
        }

        for event in &events {
            encounter.log.push(CombatLogEntry {
                round,
                actor: actor.combatant.clone(),
                event: event.clone(),
            });
        }

        encounter.phase = CombatPhase::CheckingEnd;
        let resolution = match self.check_end(&encounter)? {
            Some(outcome) => Some(self.resolve_encounter(encounter, outcome)?),
            None => {
                self.advance_turn(&mut encounter);
                encounter.phase = CombatPhase::TurnActive;
                self.active_encounter = Some(encounter);
                None
            }
        };

        Ok(TurnReport {
            actor: actor.combatant,
            round,
            events,
            resolution,
        })
    }

    fn resolve_attack(
        &mut self,
        encounter: &EncounterState,
        actor: &Participant,
        target: &CombatantRef,
        attack: Option<usize>,
        events: &mut Vec<CombatEvent>,
    ) -> EngineResult<()> {
        let defender = encounter
            .participant(target)
            .ok_or_else(|| EngineError::invalid_action(format!("'{target}' is not in this fight")))?;
        if defender.side == actor.side {
            return Err(EngineError::invalid_action(format!("'{target}' is an ally")));
        }
        if defender.fled || !self.is_alive(target) {
            return Err(EngineError::invalid_action(format!("'{target}' cannot be attacked")));
        }

        let profiles = self.attack_profiles(&actor.combatant);
        let profile = profiles
            .get(attack.unwrap_or(0))
            .cloned()
            .ok_or_else(|| EngineError::invalid_action("no such attack"))?;

        let (to_hit, damage_modifier) = {
            let attacker = self.combatant(&actor.combatant).ok_or_else(|| {
                EngineError::validation(format!("unknown combatant '{}'", actor.combatant))
            })?;
            let ability = attacker.ability_modifier(profile.ability);
            (
                ability + attacker.proficiency_bonus() + profile.to_hit_bonus + attacker.attack_bonus(),
                ability + profile.damage_bonus + attacker.damage_bonus(),
            )
        };
        let (armor_class, resistance) = {
            let defender = self
                .combatant(target)
                .ok_or_else(|| EngineError::validation(format!("unknown combatant '{target}'")))?;
            (defender.armor_class(), defender.resistance(profile.damage_type))
        };

        let roll = self.rng.roll_d20(RollMode::Normal);
        let total = roll as i32 + to_hit;
        let critical = roll == 20;
        let hit = critical || total >= armor_class;

        let mut damage = 0;
        let mut target_down = false;
        if hit {
            let mut raw = (self.rng.roll(&profile.damage) + damage_modifier).max(0);
            if critical {
                raw = raw.saturating_mul(self.config.critical_multiplier);
            }
            damage = resistance.apply(raw);
            target_down = self.combatant_mut(target)?.apply_damage(damage);
        }
        debug!(
            attacker = %actor.combatant,
            %target,
            attack = %profile.name,
            roll,
            total,
            armor_class,
            hit,
            critical,
            damage,
            "attack resolved"
        );
        events.push(CombatEvent::Attack {
            target: target.clone(),
            attack: profile.name.clone(),
            roll,
            total,
            target_armor_class: armor_class,
            hit,
            critical,
            damage,
            target_down,
        });

        if hit && !target_down {
            for effect_id in &profile.on_hit {
                let effect = self.status_effects.get(effect_id).cloned().ok_or_else(|| {
                    EngineError::validation(format!("unknown status effect '{effect_id}'"))
                })?;
                let bearer = self.combatant_mut(target)?;
                bearer.apply_status(&effect, Some(actor.combatant.to_string()));
                let stacks = bearer.status_effects().stacks_of(effect_id.as_str());
                events.push(CombatEvent::StatusApplied {
                    target: target.clone(),
                    effect_id: effect_id.clone(),
                    stacks,
                });
            }
        }
        Ok(())
    }

    fn resolve_consumable(
        &mut self,
        encounter: &EncounterState,
        actor: &Participant,
        item_id: &ItemId,
        target: &CombatantRef,
        events: &mut Vec<CombatEvent>,
    ) -> EngineResult<()> {
        if !actor.combatant.is_player() {
            return Err(EngineError::invalid_action("only the player carries items"));
        }
        let item = self
            .items
            .get(item_id)
            .ok_or_else(|| EngineError::invalid_action(format!("unknown item '{item_id}'")))?;
        let consumable = item
            .as_consumable()
            .cloned()
            .ok_or_else(|| EngineError::invalid_action(format!("'{item_id}' is not a consumable")))?;
        if !consumable.usable_in_combat {
            return Err(EngineError::invalid_action(format!(
                "'{item_id}' cannot be used in combat"
            )));
        }
        if !self.pc.inventory.contains(item_id.as_str()) {
            return Err(EngineError::invalid_action(format!("no '{item_id}' left")));
        }
        let seated = encounter.participant(target).is_some_and(|p| !p.fled);
        if !seated || !self.is_alive(target) {
            return Err(EngineError::invalid_action(format!("'{target}' cannot be helped")));
        }

        match &consumable.effect {
            ConsumableEffect::Heal(amount) => self.combatant_mut(target)?.heal(*amount),
            ConsumableEffect::ApplyStatus(effect_id) => {
                let effect = self.status_effects.get(effect_id).cloned().ok_or_else(|| {
                    EngineError::validation(format!("unknown status effect '{effect_id}'"))
                })?;
                self.combatant_mut(target)?
                    .apply_status(&effect, Some(item_id.to_string()));
            }
        }
        self.pc.inventory.consume_charge(item_id, consumable.charges)?;
        debug!(item = %item_id, %target, "consumable used");
        events.push(CombatEvent::Consumable {
            item_id: item_id.clone(),
            target: target.clone(),
        });
        Ok(())
    }

    fn defending_status(&self) -> EngineResult<StatusEffect> {
        Ok(
            StatusEffect::new(StatusEffectId::new(DEFENDING)?, "Defending", EffectDuration::Turns(1))
                .with_modifiers(Modifiers::new().with(Modifiers::ARMOR_CLASS, self.config.defend_bonus)),
        )
    }

    /// Tick the actor's turn-based effects, then re-check dispel conditions on everyone.
    fn end_turn(
        &mut self,
        encounter: &EncounterState,
        actor: &Participant,
        events: &mut Vec<CombatEvent>,
    ) -> EngineResult<()> {
        let expired = self.combatant_mut(&actor.combatant)?.tick_turn();
        if !expired.is_empty() {
            events.push(CombatEvent::StatusExpired { effect_ids: expired });
        }

        for participant in &encounter.participants {
            let conditions: Vec<(StatusEffectId, Condition)> = match self.combatant(&participant.combatant) {
                Some(bearer) => bearer
                    .status_effects()
                    .dispel_conditions()
                    .map(|(id, condition)| (id.clone(), condition.clone()))
                    .collect(),
                None => continue,
            };
            let mut dispelled = Vec::new();
            for (id, condition) in conditions {
                if self.evaluate(&condition)? {
                    dispelled.push(id);
                }
            }
            if !dispelled.is_empty() {
                self.combatant_mut(&participant.combatant)?
                    .remove_statuses(&dispelled);
                events.push(CombatEvent::Dispelled {
                    target: participant.combatant.clone(),
                    effect_ids: dispelled,
                });
            }
        }
        Ok(())
    }

    /// Move to the next combatant able to take a turn. Incapacitated combatants
    /// lose their turn but still reach its boundary.
    fn advance_turn(&mut self, encounter: &mut EncounterState) {
        let count = encounter.participants.len();
        for _ in 0..count {
            encounter.active_index += 1;
            if encounter.active_index >= count {
                encounter.active_index = 0;
                encounter.round += 1;
            }
            let Some(next) = encounter.participants.get(encounter.active_index).cloned() else {
                return;
            };
            if next.fled || !self.is_alive(&next.combatant) {
                continue;
            }
            if self.is_conscious(&next.combatant) {
                return;
            }

            let mut expired = Vec::new();
            if let Ok(bearer) = self.combatant_mut(&next.combatant) {
                expired = bearer.tick_turn();
            }
            debug!(combatant = %next.combatant, "incapacitated, turn skipped");
            encounter.log.push(CombatLogEntry {
                round: encounter.round,
                actor: next.combatant.clone(),
                event: CombatEvent::Skipped,
            });
            if !expired.is_empty() {
                encounter.log.push(CombatLogEntry {
                    round: encounter.round,
                    actor: next.combatant,
                    event: CombatEvent::StatusExpired { effect_ids: expired },
                });
            }
        }
    }

    /// A side is out when none of its remaining combatants is alive and conscious.
    fn side_out(&self, encounter: &EncounterState, side: Side) -> bool {
        !encounter
            .side(side)
            .filter(|p| !p.fled)
            .any(|p| self.is_conscious(&p.combatant))
    }

    fn check_end(&self, encounter: &EncounterState) -> EngineResult<Option<EncounterOutcome>> {
        if encounter.side(Side::Party).any(|p| p.fled && p.combatant.is_player()) {
            return Ok(Some(EncounterOutcome::Fled));
        }
        if self.side_out(encounter, Side::Party) {
            return Ok(Some(EncounterOutcome::Defeat));
        }
        if self.side_out(encounter, Side::Hostile) {
            return Ok(Some(EncounterOutcome::Victory));
        }
        if let Some(objective) = &encounter.objective {
            if self.evaluate(objective)? {
                return Ok(Some(EncounterOutcome::ObjectiveMet));
            }
        }
        Ok(None)
    }

    /// Close the encounter: clear combat-only effects, write NPC results back,
    /// award XP, record the outcome in flags, then run the resolution effects.
    fn resolve_encounter(
        &mut self,
        mut encounter: EncounterState,
        outcome: EncounterOutcome,
    ) -> EngineResult<EncounterSummary> {
        encounter.phase = CombatPhase::Resolved(outcome);
        let stance = [StatusEffectId::new(DEFENDING)?];

        let mut defeated = Vec::new();
        let mut xp = 0u32;
        for participant in &encounter.participants {
            if let Ok(bearer) = self.combatant_mut(&participant.combatant) {
                bearer.remove_statuses(&stance);
            }
            if participant.side == Side::Hostile && !self.is_alive(&participant.combatant) {
                xp = xp.saturating_add(self.xp_value(&participant.combatant));
                defeated.push(participant.combatant.clone());
            }
            if participant.combatant.kind == EntityType::Npc {
                if let Some(npc) = self.npcs.get_mut(participant.combatant.id.as_str()) {
                    if let Some(block) = npc.combat_block.take() {
                        npc.store_combat_result(block);
                    }
                    if !npc.is_alive && self.party.leader.as_ref() == Some(&npc.id) {
                        self.party.leader = None;
                    }
                }
            }
        }

        let awarded = matches!(outcome, EncounterOutcome::Victory | EncounterOutcome::ObjectiveMet);
        let xp_awarded = if awarded { xp } else { 0 };
        if xp_awarded > 0 {
            if self.pc.is_alive() {
                let levels = self.pc.gain_xp(xp_awarded);
                if !levels.is_empty() {
                    info!(?levels, "player levelled up");
                }
            }
            for participant in encounter.side(Side::Party) {
                if participant.combatant.kind != EntityType::Npc {
                    continue;
                }
                if let Some(npc) = self.npcs.get_mut(participant.combatant.id.as_str()) {
                    if npc.is_alive {
                        npc.gain_xp(xp_awarded);
                    }
                }
            }
        }

        self.flags.insert(
            "last-encounter-outcome".to_string(),
            outcome.as_str().into(),
        );
        self.flags.insert(
            format!("encounter:{}", encounter.entry_id),
            outcome.as_str().into(),
        );

        let summary = EncounterSummary {
            id: encounter.id,
            outcome,
            rounds: encounter.round,
            xp_awarded,
            defeated,
        };
        info!(
            encounter = %summary.id,
            outcome = outcome.as_str(),
            rounds = summary.rounds,
            xp = xp_awarded,
            "encounter resolved"
        );

        let on_resolved = encounter.on_resolved.clone();
        self.last_encounter = Some(encounter);
        self.apply_effects(&on_resolved)?;
        Ok(summary)
    }

    fn xp_value(&self, combatant: &CombatantRef) -> u32 {
        match combatant.kind {
            EntityType::Creature => self
                .creature_instances
                .get(combatant.id.as_str())
                .map(|c| c.xp_value)
                .unwrap_or(0),
            EntityType::Npc => self
                .npcs
                .get(combatant.id.as_str())
                .and_then(|npc| npc.combat_block.as_ref())
                .map(|block| block.xp_value)
                .unwrap_or(0),
            _ => 0,
        }
    }
}

fn seat(combatant: CombatantRef, side: Side) -> Participant {
    Participant {
        combatant,
        side,
        initiative: 0,
        modifier: 0,
        fled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::seed;
    use campaign_rules::{EncounterTableId, FlagValue, LocationId, NpcId, TargetRef};

    fn sturdy_state() -> GameState {
        let mut state = seed::starter_state(42).unwrap();
        state.pc = state.pc.clone().with_level(20);
        state
    }

    fn wolf_pack() -> EncounterSetup {
        EncounterSetup::new(EncounterTableId::new("spore-wolf-pack").unwrap())
            .at(LocationId::new("whisperwood").unwrap())
    }

    fn player(state: &GameState) -> CombatantRef {
        CombatantRef::player(&state.pc().id)
    }

    /// Let everyone else act until the player is up.
    fn until_player_turn(state: &mut GameState) {
        for _ in 0..50 {
            let Some(encounter) = state.active_encounter() else {
                return;
            };
            if encounter.active().is_some_and(|p| p.combatant.is_player()) {
                return;
            }
            let action = state.choose_ai_action().unwrap();
            state.submit_action(action).unwrap();
        }
    }

    #[test]
    fn test_begin_spawns_instances_and_orders_initiative() {
        let mut state = sturdy_state();
        let id = state.begin_encounter(wolf_pack()).unwrap();
        let encounter = state.active_encounter().unwrap();

        assert_eq!(encounter.id, id);
        assert_eq!(encounter.phase, CombatPhase::TurnActive);
        assert_eq!(encounter.round, 1);
        assert_eq!(encounter.participants.len(), 3);
        assert!(state.creature_instance("spore-wolf-1").is_some());
        assert!(state.creature_instance("spore-wolf-2").is_some());

        let totals: Vec<i32> = encounter.participants.iter().map(|p| p.initiative).collect();
        let mut sorted = totals.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(totals, sorted);
    }

    #[test]
    fn test_second_encounter_rejected() {
        let mut state = sturdy_state();
        state.begin_encounter(wolf_pack()).unwrap();
        let err = state.begin_encounter(wolf_pack()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAction(_)));
    }

    #[test]
    fn test_unknown_entry_rejected() {
        let mut state = sturdy_state();
        let setup = EncounterSetup::new(EncounterTableId::new("dragon-lair").unwrap());
        assert!(matches!(
            state.begin_encounter(setup),
            Err(EngineError::Validation(_))
        ));
        assert!(state.active_encounter().is_none());
    }

    #[test]
    fn test_cannot_attack_ally() {
        let mut state = sturdy_state();
        state.begin_encounter(wolf_pack()).unwrap();
        until_player_turn(&mut state);
        let snapshot = state.clone();

        let me = player(&state);
        let err = state.submit_action(CombatAction::attack(me)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAction(_)));
        assert_eq!(state, snapshot);
    }

    #[test]
    fn test_consumable_rules_in_combat() {
        let mut state = sturdy_state();
        state.begin_encounter(wolf_pack()).unwrap();
        until_player_turn(&mut state);

        let charm = ItemId::new("warding-charm").unwrap();
        assert!(matches!(
            state.submit_action(CombatAction::use_item(charm)),
            Err(EngineError::InvalidAction(_))
        ));
        let map = ItemId::new("old-map").unwrap();
        assert!(matches!(
            state.submit_action(CombatAction::use_item(map)),
            Err(EngineError::InvalidAction(_))
        ));

        let tonic = ItemId::new("forest-tonic").unwrap();
        let report = state.use_consumable_in_combat(&tonic, None).unwrap();
        assert!(matches!(report.events[0], CombatEvent::Consumable { .. }));
        assert_eq!(state.pc().inventory.quantity_of("forest-tonic"), 1);
    }

    #[test]
    fn test_flee_resolves_encounter() {
        let mut state = sturdy_state();
        state.begin_encounter(wolf_pack()).unwrap();
        until_player_turn(&mut state);

        let report = state.submit_action(CombatAction::Flee).unwrap();
        let summary = report.resolution.unwrap();
        assert_eq!(summary.outcome, EncounterOutcome::Fled);
        assert_eq!(summary.xp_awarded, 0);
        assert!(state.active_encounter().is_none());
        assert_eq!(
            state.flag("last-encounter-outcome"),
            Some(&FlagValue::Text("fled".to_string()))
        );
        assert_eq!(state.last_encounter().unwrap().outcome(), Some(EncounterOutcome::Fled));
    }

    #[test]
    fn test_defend_raises_armor_until_next_turn() {
        let mut state = sturdy_state();
        state.begin_encounter(wolf_pack()).unwrap();
        until_player_turn(&mut state);
        let base = state.pc().armor_class();

        state.submit_action(CombatAction::Defend).unwrap();
        assert_eq!(state.pc().armor_class(), base + 2);
        assert!(state.pc().status_effects().has(DEFENDING));

        until_player_turn(&mut state);
        if state.active_encounter().is_some() {
            state.submit_action(CombatAction::Pass).unwrap();
            assert!(!state.pc().status_effects().has(DEFENDING));
        }
    }

    #[test]
    fn test_dispel_condition_checked_at_turn_boundary() {
        let mut state = sturdy_state();
        state.begin_encounter(wolf_pack()).unwrap();
        until_player_turn(&mut state);

        let sickness = StatusEffectId::new("spore-sickness").unwrap();
        state
            .apply_quest_effect(&[campaign_rules::Effect::ApplyStatusEffect {
                target: TargetRef::Player,
                effect_id: sickness,
            }])
            .unwrap();
        state.set_flag("sporefall-cleansed", true).unwrap();
        assert!(state.pc().status_effects().has("spore-sickness"));

        let report = state.submit_action(CombatAction::Pass).unwrap();
        assert!(!state.pc().status_effects().has("spore-sickness"));
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e, CombatEvent::Dispelled { .. })));
    }

    #[test]
    fn test_fight_to_victory_awards_xp_and_keeps_templates() {
        let mut state = sturdy_state();
        let template_before = state.creature("spore-wolf").cloned();
        let xp_before = state.pc().xp();
        state.begin_encounter(wolf_pack()).unwrap();

        let summary = state.run_ai_turns_with_player_attacks(200);
        let summary = summary.expect("the fight should end");

        assert_eq!(summary.outcome, EncounterOutcome::Victory);
        assert_eq!(summary.xp_awarded, 300);
        assert_eq!(summary.defeated.len(), 2);
        assert_eq!(state.pc().xp(), xp_before + 300);
        assert_eq!(state.creature("spore-wolf").cloned(), template_before);
        assert!(!state.creature_instance("spore-wolf-1").unwrap().is_alive());
        assert_eq!(
            state.flag("encounter:spore-wolf-pack"),
            Some(&FlagValue::Text("victory".to_string()))
        );
    }

    #[test]
    fn test_npc_result_written_back() {
        let mut state = sturdy_state();
        let alpha = NpcId::new("spore-wolf-alpha").unwrap();
        state.npcs.get_mut(&alpha).unwrap().scaling = None;
        let template = state.npc("spore-wolf-alpha").unwrap().stat_block.clone();
        state
            .begin_encounter(
                EncounterSetup::new(EncounterTableId::new("mountain-patrol").unwrap())
                    .at(LocationId::new("durnhelm").unwrap()),
            )
            .unwrap();

        let summary = state.run_ai_turns_with_player_attacks(200).unwrap();
        assert_eq!(summary.outcome, EncounterOutcome::Victory);

        let npc = state.npc("spore-wolf-alpha").unwrap();
        assert!(!npc.is_alive);
        assert!(!npc.combat_block.as_ref().unwrap().is_alive());
        assert_eq!(npc.stat_block, template);
    }

    impl GameState {
        /// Player always attacks the first living hostile; everyone else runs on AI.
        fn run_ai_turns_with_player_attacks(&mut self, cap: usize) -> Option<EncounterSummary> {
            for _ in 0..cap {
                let encounter = self.active_encounter()?;
                let actor = encounter.active()?.clone();
                let action = if actor.combatant.is_player() {
                    let target = encounter
                        .side(Side::Hostile)
                        .find(|p| self.is_alive(&p.combatant))?
                        .combatant
                        .clone();
                    CombatAction::attack(target)
                } else {
                    self.choose_ai_action().ok()?
                };
                if let Some(summary) = self.submit_action(action).ok()?.resolution {
                    return Some(summary);
                }
            }
            None
        }
    }
}
