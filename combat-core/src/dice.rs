//! Dice notation and the injected dice-roll collaborator.
//!
//! Supports the `{count}d{sides}[+|-modifier]` grammar (count defaults to 1),
//! plus flat modifiers and multi-term sums such as `2d6+1d4+3`.
//!
//! Mechanics never call an RNG directly; they go through a [`DiceRoller`],
//! which lets tests substitute a deterministic stub.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;

/// Largest die we accept. Anything bigger is almost certainly a decode error.
const MAX_SIDES: u32 = 1000;

/// Largest number of dice in one term.
const MAX_COUNT: u32 = 100;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("Too many dice: {0}")]
    TooManyDice(u32),
    #[error("No dice specified")]
    NoDice,
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }
}

/// A single `NdS` term of a dice expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceComponent {
    pub count: u32,
    pub sides: u32,
    /// +1 or -1
    pub sign: i32,
}

/// A complete dice expression (e.g., 2d6+3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub components: Vec<DiceComponent>,
    pub modifier: i32,
    pub original: String,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut components = Vec::new();
        let mut modifier: i32 = 0;
        let mut current = String::new();
        let mut sign: i32 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_component(&current, sign, &mut components, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_component(&current, sign, &mut components, &mut modifier)?;
        }

        if components.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression {
            components,
            modifier,
            original: notation,
        })
    }

    fn parse_component(
        s: &str,
        sign: i32,
        components: &mut Vec<DiceComponent>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        if let Some(d_pos) = s.find('d') {
            let count_str = &s[..d_pos];
            let sides_str = &s[d_pos + 1..];

            let count: u32 = if count_str.is_empty() {
                1
            } else {
                count_str
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(s.to_string()))?
            };
            if count > MAX_COUNT {
                return Err(DiceError::TooManyDice(count));
            }

            let sides: u32 = sides_str
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            if sides == 0 || sides > MAX_SIDES {
                return Err(DiceError::InvalidDieSize(sides));
            }

            components.push(DiceComponent { count, sides, sign });
        } else {
            let value: i32 = s
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            *modifier = modifier
                .checked_add(sign * value)
                .ok_or_else(|| DiceError::InvalidNotation(s.to_string()))?;
        }

        Ok(())
    }

    /// Roll with a specific RNG.
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> i32 {
        let dice_total: i32 = self
            .components
            .iter()
            .map(|c| {
                let sum: u32 = (0..c.count).map(|_| rng.gen_range(1..=c.sides)).sum();
                c.sign * sum as i32
            })
            .fold(0i32, i32::saturating_add);
        dice_total.saturating_add(self.modifier)
    }

    /// The same expression with every die count doubled (critical hits).
    pub fn doubled(&self) -> Self {
        let components: Vec<DiceComponent> = self
            .components
            .iter()
            .map(|c| DiceComponent {
                count: c.count * 2,
                ..*c
            })
            .collect();
        let original = render(&components, self.modifier);
        Self {
            components,
            modifier: self.modifier,
            original,
        }
    }

    /// Lowest and highest possible totals.
    pub fn bounds(&self) -> (i32, i32) {
        self.components
            .iter()
            .fold((self.modifier, self.modifier), |(lo, hi), c| {
                let min = c.count as i32;
                let max = (c.count * c.sides) as i32;
                if c.sign > 0 {
                    (lo.saturating_add(min), hi.saturating_add(max))
                } else {
                    (lo.saturating_sub(max), hi.saturating_sub(min))
                }
            })
    }
}

fn render(components: &[DiceComponent], modifier: i32) -> String {
    let mut out = String::new();
    for (i, c) in components.iter().enumerate() {
        if c.sign < 0 {
            out.push('-');
        } else if i > 0 {
            out.push('+');
        }
        out.push_str(&format!("{}d{}", c.count, c.sides));
    }
    match modifier {
        0 => {}
        m if m > 0 && !out.is_empty() => out.push_str(&format!("+{m}")),
        m => out.push_str(&m.to_string()),
    }
    out
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Build `1d20+N` / `1d20-N` notation for a flat bonus.
pub fn d20_with(bonus: i32) -> String {
    with_modifier("1d20", bonus)
}

/// Append a signed modifier to a dice notation string.
pub fn with_modifier(notation: &str, bonus: i32) -> String {
    match bonus {
        0 => notation.to_string(),
        b if b > 0 => format!("{notation}+{b}"),
        b => format!("{notation}{b}"),
    }
}

// ============================================================================
// Dice roller collaborator
// ============================================================================

/// The dice-randomness source. Receives notation, returns the total.
///
/// Only the rules engine and the ledger roll dice, and they always go
/// through this trait.
pub trait DiceRoller: Send + Sync {
    fn roll(&self, expression: &str) -> i32;
}

impl<F> DiceRoller for F
where
    F: Fn(&str) -> i32 + Send + Sync,
{
    fn roll(&self, expression: &str) -> i32 {
        self(expression)
    }
}

/// Default roller backed by `rand`.
pub struct RandomDice<R = rand::rngs::StdRng> {
    rng: Mutex<R>,
}

impl RandomDice {
    pub fn new() -> Self {
        use rand::SeedableRng;
        Self {
            rng: Mutex::new(rand::rngs::StdRng::from_entropy()),
        }
    }

    /// Deterministic roller for reproducible encounters.
    pub fn seeded(seed: u64) -> Self {
        use rand::SeedableRng;
        Self {
            rng: Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomDice {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng + Send> DiceRoller for RandomDice<R> {
    fn roll(&self, expression: &str) -> i32 {
        let expr = match DiceExpression::parse(expression) {
            Ok(expr) => expr,
            Err(e) => {
                tracing::warn!(expression, error = %e, "unparsable dice expression, rolling 0");
                return 0;
            }
        };
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        expr.roll_with_rng(&mut *rng)
    }
}

/// A d20 rolled under advantage rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct D20Roll {
    pub first: i32,
    /// Only rolled under advantage or disadvantage.
    pub second: Option<i32>,
    /// The die that counts.
    pub kept: i32,
}

impl D20Roll {
    pub fn is_natural_20(&self) -> bool {
        self.kept == 20
    }

    pub fn is_natural_1(&self) -> bool {
        self.kept == 1
    }
}

/// Roll a bare d20, twice when advantage or disadvantage applies.
pub fn roll_d20(dice: &dyn DiceRoller, advantage: Advantage) -> D20Roll {
    let first = dice.roll("1d20");
    match advantage {
        Advantage::Normal => D20Roll {
            first,
            second: None,
            kept: first,
        },
        Advantage::Advantage => {
            let second = dice.roll("1d20");
            D20Roll {
                first,
                second: Some(second),
                kept: first.max(second),
            }
        }
        Advantage::Disadvantage => {
            let second = dice.roll("1d20");
            D20Roll {
                first,
                second: Some(second),
                kept: first.min(second),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let expr = DiceExpression::parse("1d20").unwrap();
        assert_eq!(expr.components.len(), 1);
        assert_eq!(expr.components[0].count, 1);
        assert_eq!(expr.components[0].sides, 20);
        assert_eq!(expr.modifier, 0);
    }

    #[test]
    fn test_parse_default_count() {
        let expr = DiceExpression::parse("d8+2").unwrap();
        assert_eq!(expr.components[0].count, 1);
        assert_eq!(expr.components[0].sides, 8);
        assert_eq!(expr.modifier, 2);
    }

    #[test]
    fn test_parse_with_modifier() {
        let expr = DiceExpression::parse("1d20+5").unwrap();
        assert_eq!(expr.modifier, 5);

        let expr = DiceExpression::parse("2d6-2").unwrap();
        assert_eq!(expr.modifier, -2);
    }

    #[test]
    fn test_parse_odd_sides() {
        let expr = DiceExpression::parse("3d7").unwrap();
        assert_eq!(expr.components[0].sides, 7);
        assert!(matches!(
            DiceExpression::parse("1d0"),
            Err(DiceError::InvalidDieSize(0))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DiceExpression::parse("").is_err());
        assert!(DiceExpression::parse("a bunch").is_err());
        assert!(DiceExpression::parse("2dx").is_err());
        assert!(matches!(
            DiceExpression::parse("500d6"),
            Err(DiceError::TooManyDice(500))
        ));
    }

    #[test]
    fn test_parse_rejects_modifier_overflow() {
        assert!(matches!(
            DiceExpression::parse("1d6+2147483647+1"),
            Err(DiceError::InvalidNotation(_))
        ));
        assert!(matches!(
            DiceExpression::parse("-2147483647-2"),
            Err(DiceError::InvalidNotation(_))
        ));

        let expr = DiceExpression::parse("1d6+2147483647").unwrap();
        assert_eq!(expr.bounds().1, i32::MAX);
        assert_eq!(expr.roll_with_rng(&mut rand::thread_rng()), i32::MAX);
    }

    #[test]
    fn test_doubled() {
        let expr = DiceExpression::parse("2d6+3").unwrap().doubled();
        assert_eq!(expr.components[0].count, 4);
        assert_eq!(expr.modifier, 3);
        assert_eq!(expr.original, "4d6+3");
    }

    #[test]
    fn test_bounds() {
        let expr = DiceExpression::parse("2d6+3").unwrap();
        assert_eq!(expr.bounds(), (5, 15));
    }

    #[test]
    fn test_random_roll_range() {
        let dice = RandomDice::seeded(7);
        for _ in 0..200 {
            let total = dice.roll("1d20+5");
            assert!((6..=25).contains(&total));
        }
    }

    #[test]
    fn test_closure_roller() {
        let dice = |_: &str| 11;
        assert_eq!(DiceRoller::roll(&dice, "1d20"), 11);
    }

    #[test]
    fn test_roll_d20_advantage() {
        let seq = Mutex::new(vec![4, 17].into_iter());
        let dice = move |_: &str| seq.lock().unwrap().next().unwrap_or(1);
        let roll = roll_d20(&dice, Advantage::Advantage);
        assert_eq!((roll.first, roll.second), (4, Some(17)));
        assert_eq!(roll.kept, 17);
    }

    #[test]
    fn test_with_modifier() {
        assert_eq!(d20_with(2), "1d20+2");
        assert_eq!(d20_with(-1), "1d20-1");
        assert_eq!(d20_with(0), "1d20");
    }

    #[test]
    fn test_advantage_combine() {
        assert_eq!(
            Advantage::Normal.combine(Advantage::Advantage),
            Advantage::Advantage
        );
        assert_eq!(
            Advantage::Advantage.combine(Advantage::Disadvantage),
            Advantage::Normal
        );
        assert_eq!(
            Advantage::Advantage.combine(Advantage::Advantage),
            Advantage::Advantage
        );
    }
}
