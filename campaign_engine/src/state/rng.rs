//! The seeded random stream every roll is drawn from.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campaign_rules::{DiceFormula, RollMode};

/// A ChaCha8 stream that saves as its seed plus how far it has been read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RngPosition", into = "RngPosition")]
pub struct RngStream {
    seed: u64,
    rng: ChaCha8Rng,
}

#[derive(Serialize, Deserialize)]
struct RngPosition {
    seed: u64,
    word_pos: u128,
}

impl From<RngPosition> for RngStream {
    fn from(position: RngPosition) -> Self {
        let mut stream = RngStream::new(position.seed);
        stream.rng.set_word_pos(position.word_pos);
        stream
    }
}

impl From<RngStream> for RngPosition {
    fn from(stream: RngStream) -> Self {
        RngPosition {
            seed: stream.seed,
            word_pos: stream.rng.get_word_pos(),
        }
    }
}

impl PartialEq for RngStream {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed && self.word_pos() == other.word_pos()
    }
}

impl RngStream {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Words consumed so far.
    pub fn word_pos(&self) -> u128 {
        self.rng.get_word_pos()
    }

    /// A value in `1..=sides`. A zero-sided die always rolls 0.
    pub fn roll_die(&mut self, sides: u32) -> u32 {
        if sides == 0 {
            return 0;
        }
        self.rng.gen_range(1..=sides)
    }

    pub fn roll(&mut self, dice: &DiceFormula) -> i32 {
        dice.roll_with(|sides| self.roll_die(sides))
    }

    /// A d20 honoring advantage or disadvantage.
    pub fn roll_d20(&mut self, mode: RollMode) -> u32 {
        let first = self.roll_die(20);
        match mode {
            RollMode::Normal => first,
            _ => {
                let second = self.roll_die(20);
                mode.keep(first, second)
            }
        }
    }

    /// True with probability `p`. Always draws, so the stream advances the same way either side.
    pub fn chance(&mut self, p: f64) -> bool {
        let draw: f64 = self.rng.gen();
        draw < p
    }

    /// Weighted pick. Zero total weight picks nothing.
    pub fn pick_weighted<'a, T>(&mut self, items: &[&'a T], weight: impl Fn(&T) -> u32) -> Option<&'a T> {
        let total: u64 = items.iter().map(|item| u64::from(weight(*item))).sum();
        if total == 0 {
            return None;
        }
        let mut roll = self.rng.gen_range(0..total);
        for item in items {
            let w = u64::from(weight(*item));
            if roll < w {
                return Some(*item);
            }
            roll -= w;
        }
        None
    }

    /// A v4-shaped UUID built from stream bytes rather than system entropy.
    pub fn uuid(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_rolls() {
        let mut a = RngStream::new(42);
        let mut b = RngStream::new(42);
        let rolls_a: Vec<u32> = (0..20).map(|_| a.roll_die(20)).collect();
        let rolls_b: Vec<u32> = (0..20).map(|_| b.roll_die(20)).collect();
        assert_eq!(rolls_a, rolls_b);
        assert!(rolls_a.iter().all(|r| (1..=20).contains(r)));
    }

    #[test]
    fn test_serde_resumes_position() {
        let mut original = RngStream::new(7);
        for _ in 0..5 {
            original.roll_die(6);
        }

        let json = serde_json::to_string(&original).unwrap();
        let mut restored: RngStream = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);

        let next_original: Vec<u32> = (0..10).map(|_| original.roll_die(100)).collect();
        let next_restored: Vec<u32> = (0..10).map(|_| restored.roll_die(100)).collect();
        assert_eq!(next_original, next_restored);
    }

    #[test]
    fn test_pick_weighted_respects_zero_weights() {
        let items = ["never", "always"];
        let refs: Vec<&&str> = items.iter().collect();
        let mut rng = RngStream::new(3);
        for _ in 0..50 {
            let picked = rng
                .pick_weighted(&refs, |item| if *item == "always" { 1 } else { 0 })
                .unwrap();
            assert_eq!(*picked, "always");
        }
        assert!(rng.pick_weighted(&refs, |_| 0).is_none());
    }

    #[test]
    fn test_chance_bounds() {
        let mut rng = RngStream::new(11);
        assert!((0..100).all(|_| rng.chance(1.0)));
        assert!((0..100).all(|_| !rng.chance(0.0)));
    }

    #[test]
    fn test_uuid_is_deterministic() {
        assert_eq!(RngStream::new(1).uuid(), RngStream::new(1).uuid());
        assert_ne!(RngStream::new(1).uuid(), RngStream::new(2).uuid());
    }
}
