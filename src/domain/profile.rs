//! Warmup ramp profiles.
//!
//! A profile is an immutable, ordered list of ramp steps referenced by stage
//! index. Mailboxes reference a profile by name; editing a catalog never
//! rewrites a mailbox's completed stage history, only what future stages ask
//! for.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One stage of a ramp: the day offset at which the stage nominally begins,
/// the daily volume to send, and the observed reply rate required to bank a
/// day toward advancement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RampStep {
    /// Nominal day offset from warmup start when this stage begins.
    pub day_offset: u32,
    /// Warmup emails to send per day at this stage.
    pub target_daily_volume: u32,
    /// Reply rate (0.0..=1.0) a day must reach to count toward advancement.
    pub target_reply_rate: f64,
}

/// A named ramp curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupProfile {
    /// Catalog name mailboxes reference.
    pub name: String,
    /// Ordered ramp stages; index 0 is stage 1.
    pub steps: Vec<RampStep>,
    /// Consecutive met days required to advance out of a stage.
    pub hold_days: u32,
}

impl WarmupProfile {
    /// The step for a 1-based stage, if the stage exists.
    pub fn step(&self, stage: u32) -> Option<&RampStep> {
        if stage == 0 {
            return None;
        }
        self.steps.get(stage as usize - 1)
    }

    /// Number of stages in the ramp.
    pub fn final_stage(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Whether the given 1-based stage is the last one before `Active`.
    pub fn is_final_stage(&self, stage: u32) -> bool {
        stage >= self.final_stage()
    }
}

/// Immutable set of profiles a deployment knows about.
///
/// Built-ins are always present; configuration may add more (or shadow a
/// built-in by name).
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: HashMap<String, WarmupProfile>,
}

impl ProfileCatalog {
    /// Catalog containing only the built-in profiles.
    pub fn builtin() -> Self {
        let mut profiles = HashMap::new();
        for profile in [conservative(), standard(), aggressive()] {
            profiles.insert(profile.name.clone(), profile);
        }
        Self { profiles }
    }

    /// Builds a catalog from the built-ins plus extra profiles, later entries
    /// shadowing earlier ones by name.
    pub fn with_extras(extras: impl IntoIterator<Item = WarmupProfile>) -> Self {
        let mut catalog = Self::builtin();
        for profile in extras {
            catalog.profiles.insert(profile.name.clone(), profile);
        }
        catalog
    }

    /// Looks up a profile by name.
    pub fn get(&self, name: &str) -> Option<&WarmupProfile> {
        self.profiles.get(name)
    }

    /// Names of every known profile, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

fn curve(name: &str, volumes: &[u32], reply_rate: f64, hold_days: u32) -> WarmupProfile {
    let steps = volumes
        .iter()
        .enumerate()
        .map(|(i, &volume)| RampStep {
            day_offset: i as u32 * hold_days,
            target_daily_volume: volume,
            target_reply_rate: reply_rate,
        })
        .collect();
    WarmupProfile {
        name: name.to_string(),
        steps,
        hold_days,
    }
}

/// Slow ramp for fresh domains with no sending history.
pub fn conservative() -> WarmupProfile {
    curve("conservative", &[2, 4, 6, 9, 12, 16, 20], 0.30, 4)
}

/// Default ramp.
pub fn standard() -> WarmupProfile {
    curve("standard", &[5, 10, 15, 20, 25, 30], 0.40, 3)
}

/// Fast ramp for domains with prior reputation.
pub fn aggressive() -> WarmupProfile {
    curve("aggressive", &[10, 18, 26, 35], 0.35, 2)
}
