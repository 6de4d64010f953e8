//! Capacity model: per-generation limits derived from a plan descriptor.
//!
//! A plan is written `"<firstGenSize>:<multiplier>"`. Generation 1 holds
//! `firstGenSize` members and every deeper generation holds `multiplier`
//! times the one above it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::DEFAULT_PLAN;
use crate::error::{NetworkError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlanType {
    pub first_gen_size: u64,
    pub multiplier: u64,
}

impl PlanType {
    pub fn new(first_gen_size: u64, multiplier: u64) -> Result<Self> {
        if first_gen_size == 0 || multiplier == 0 {
            return Err(NetworkError::InvalidPlanFormat(format!(
                "{first_gen_size}:{multiplier}"
            )));
        }
        Ok(Self {
            first_gen_size,
            multiplier,
        })
    }

    /// Capacity of `generation` (1-based). Generation 0 has no slots.
    /// Saturates at `u64::MAX` instead of wrapping for very deep generations.
    pub fn capacity(&self, generation: u32) -> u64 {
        if generation == 0 {
            return 0;
        }
        let mut cap = self.first_gen_size;
        for _ in 1..generation {
            cap = cap.saturating_mul(self.multiplier);
        }
        cap
    }

    /// Capacities of generations `1..=max_generation`, in order.
    pub fn capacities(&self, max_generation: u32) -> Vec<u64> {
        let mut out = Vec::with_capacity(max_generation as usize);
        let mut cap = self.first_gen_size;
        for g in 1..=max_generation {
            if g > 1 {
                cap = cap.saturating_mul(self.multiplier);
            }
            out.push(cap);
        }
        out
    }

    /// Sum of all generation capacities up to and including `max_generation`.
    pub fn total_capacity(&self, max_generation: u32) -> u64 {
        self.capacities(max_generation)
            .into_iter()
            .fold(0u64, u64::saturating_add)
    }
}

impl Default for PlanType {
    fn default() -> Self {
        DEFAULT_PLAN
    }
}

impl FromStr for PlanType {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || NetworkError::InvalidPlanFormat(s.to_string());
        let tokens: Vec<&str> = s.split(':').collect();
        let [first, multiplier] = tokens.as_slice() else {
            return Err(invalid());
        };
        let first: u64 = first.trim().parse().map_err(|_| invalid())?;
        let multiplier: u64 = multiplier.trim().parse().map_err(|_| invalid())?;
        PlanType::new(first, multiplier).map_err(|_| invalid())
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.first_gen_size, self.multiplier)
    }
}

impl Serialize for PlanType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PlanType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Capacity of `generation` under the plan written as `plan`.
pub fn generation_capacity(plan: &str, generation: u32) -> Result<u64> {
    Ok(plan.parse::<PlanType>()?.capacity(generation))
}

/// The plan used when nothing else is configured.
pub const fn default_plan() -> PlanType {
    DEFAULT_PLAN
}
