//! Tea recipes supplied by the profile store.

use crate::brew::countdown::COUNTDOWN_EXTRA_SECONDS;
use crate::error::{Error, Result};

/// What the brew needs to know about a tea.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Recipe {
    /// Display name.
    pub name: String,
    /// Water temperature to reach before infusing, in degrees Celsius.
    pub target_temperature_celsius: i32,
    /// Infusion time in whole minutes.
    pub duration_minutes: u32,
}

impl Recipe {
    /// Create a recipe.
    pub fn new(name: impl Into<String>, target_temperature_celsius: i32, duration_minutes: u32) -> Self {
        Self {
            name: name.into(),
            target_temperature_celsius,
            duration_minutes,
        }
    }

    /// Build a recipe from the string fields a profile record stores.
    ///
    /// Numbers may carry a fractional part (`"80.0"`), which is truncated.
    pub fn from_fields(name: &str, temperature: &str, minutes: &str) -> Result<Self> {
        let target = parse_whole(temperature)
            .ok_or_else(|| Error::invalid_parameter("temperature", temperature))?;
        let duration = parse_whole(minutes)
            .filter(|m| *m >= 0)
            .and_then(|m| u32::try_from(m).ok())
            .ok_or_else(|| Error::invalid_parameter("minutes", minutes))?;

        Ok(Self::new(name, target, duration))
    }

    /// Length of the infusion countdown in seconds.
    ///
    /// This is `duration_minutes * 60 + 1`, so a 3 minute tea starts at `03:01`.
    pub fn infusion_seconds(&self) -> u32 {
        self.duration_minutes
            .saturating_mul(60)
            .saturating_add(COUNTDOWN_EXTRA_SECONDS)
    }
}

fn parse_whole(value: &str) -> Option<i32> {
    let parsed: f64 = value.trim().parse().ok()?;
    if !parsed.is_finite() || parsed < i32::MIN as f64 || parsed > i32::MAX as f64 {
        return None;
    }
    Some(parsed.trunc() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fields() {
        let recipe = Recipe::from_fields("Sencha", "80.0", "3").unwrap();
        assert_eq!(recipe, Recipe::new("Sencha", 80, 3));

        let recipe = Recipe::from_fields("Assam", " 95.7 ", "4.5").unwrap();
        assert_eq!(recipe.target_temperature_celsius, 95);
        assert_eq!(recipe.duration_minutes, 4);
    }

    #[test]
    fn test_from_fields_rejects_garbage() {
        assert!(Recipe::from_fields("x", "hot", "3").is_err());
        assert!(Recipe::from_fields("x", "80", "-1").is_err());
        assert!(Recipe::from_fields("x", "80", "").is_err());
        assert!(Recipe::from_fields("x", "NaN", "3").is_err());
    }

    #[test]
    fn test_infusion_seconds() {
        assert_eq!(Recipe::new("Sencha", 80, 3).infusion_seconds(), 181);
        assert_eq!(Recipe::new("Rinse", 60, 0).infusion_seconds(), 1);
    }
}
