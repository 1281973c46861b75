//! Dice notation such as `1d6+2`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RulesError;

/// `count` dice with `sides` faces plus a flat `modifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiceFormula {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceFormula {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// A single die, e.g. `d20`.
    pub fn single(sides: u32) -> Self {
        Self::new(1, sides, 0)
    }

    pub fn parse(raw: &str) -> Result<Self, RulesError> {
        let invalid = || RulesError::DiceFormula(raw.to_string());
        let text: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let text = text.to_ascii_lowercase();

        let (dice_part, modifier) = match text.find(['+', '-']) {
            Some(idx) => {
                let (dice, rest) = text.split_at(idx);
                let modifier: i32 = rest.parse().map_err(|_| invalid())?;
                (dice.to_string(), modifier)
            }
            None => (text, 0),
        };

        let (count, sides) = dice_part.split_once('d').ok_or_else(invalid)?;
        let count = if count.is_empty() {
            1
        } else {
            count.parse::<u32>().map_err(|_| invalid())?
        };
        let sides = sides.parse::<u32>().map_err(|_| invalid())?;

        if count == 0 || sides == 0 {
            return Err(invalid());
        }

        Ok(Self::new(count, sides, modifier))
    }

    /// Roll using `roll_die(sides)`, which must return a value in `1..=sides`.
    pub fn roll_with(&self, mut roll_die: impl FnMut(u32) -> u32) -> i32 {
        let total: i64 = (0..self.count).map(|_| i64::from(roll_die(self.sides))).sum();
        (total + i64::from(self.modifier)).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    pub fn min(&self) -> i32 {
        self.count as i32 + self.modifier
    }

    pub fn max(&self) -> i32 {
        (self.count * self.sides) as i32 + self.modifier
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

impl FromStr for DiceFormula {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DiceFormula {
    type Error = RulesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DiceFormula> for String {
    fn from(dice: DiceFormula) -> Self {
        dice.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formulas() {
        assert_eq!(DiceFormula::parse("1d6+2").unwrap(), DiceFormula::new(1, 6, 2));
        assert_eq!(DiceFormula::parse("2d8-1").unwrap(), DiceFormula::new(2, 8, -1));
        assert_eq!(DiceFormula::parse("d20").unwrap(), DiceFormula::new(1, 20, 0));
        assert_eq!(DiceFormula::parse(" 1D8 + 3 ").unwrap(), DiceFormula::new(1, 8, 3));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DiceFormula::parse("").is_err());
        assert!(DiceFormula::parse("6").is_err());
        assert!(DiceFormula::parse("0d6").is_err());
        assert!(DiceFormula::parse("1d0").is_err());
        assert!(DiceFormula::parse("1d6+x").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(DiceFormula::new(1, 6, 2).to_string(), "1d6+2");
        assert_eq!(DiceFormula::new(2, 4, -1).to_string(), "2d4-1");
        assert_eq!(DiceFormula::new(1, 20, 0).to_string(), "1d20");
    }

    #[test]
    fn test_roll_with_fixed_dice() {
        let dice = DiceFormula::new(2, 6, 3);
        assert_eq!(dice.roll_with(|sides| sides), 15);
        assert_eq!(dice.roll_with(|_| 1), 5);
        assert_eq!(dice.min(), 5);
        assert_eq!(dice.max(), 15);
    }

    #[test]
    fn test_serde_as_string() {
        let dice: DiceFormula = serde_json::from_str("\"1d8+3\"").unwrap();
        assert_eq!(dice, DiceFormula::new(1, 8, 3));
        assert_eq!(serde_json::to_string(&dice).unwrap(), "\"1d8+3\"");
    }
}
