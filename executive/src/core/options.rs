//! Generation options passed with every engine call.
//!
//! All call sites draw from one [`GenerationProfiles`] value so temperature and
//! token limits are decided in a single place instead of per call.

use serde::{Deserialize, Serialize};

/// Sampling options for a single generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Sequences that end generation early.
    pub stop: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2048,
            stop: Vec::new(),
        }
    }
}

impl GenerationOptions {
    /// Low temperature so the plan stays parseable.
    pub fn planning() -> Self {
        Self {
            temperature: 0.1,
            ..Self::default()
        }
    }

    pub fn step() -> Self {
        Self {
            max_tokens: 1024,
            ..Self::default()
        }
    }

    pub fn audit() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 512,
            ..Self::default()
        }
    }
}

/// Options for each kind of engine call the orchestrator makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationProfiles {
    pub plan: GenerationOptions,
    pub step: GenerationOptions,
    pub audit: GenerationOptions,
}

impl Default for GenerationProfiles {
    fn default() -> Self {
        Self {
            plan: GenerationOptions::planning(),
            step: GenerationOptions::step(),
            audit: GenerationOptions::audit(),
        }
    }
}

impl GenerationProfiles {
    /// Human-readable violations; empty when every profile is usable.
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (label, options) in [
            ("plan", &self.plan),
            ("step", &self.step),
            ("audit", &self.audit),
        ] {
            if !(0.0..=2.0).contains(&options.temperature) {
                errors.push(format!(
                    "generation.{label}.temperature must be within 0.0..=2.0"
                ));
            }
            if options.max_tokens == 0 {
                errors.push(format!("generation.{label}.max_tokens must be > 0"));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_default_to_call_specific_presets() {
        let profiles = GenerationProfiles::default();
        assert_eq!(profiles.plan.temperature, 0.1);
        assert_eq!(profiles.step.max_tokens, 1024);
        assert_eq!(profiles.audit.temperature, 0.0);
        assert!(profiles.violations().is_empty());
    }

    #[test]
    fn violations_name_the_offending_profile() {
        let profiles = GenerationProfiles {
            audit: GenerationOptions {
                max_tokens: 0,
                ..GenerationOptions::audit()
            },
            ..GenerationProfiles::default()
        };
        assert_eq!(
            profiles.violations(),
            vec!["generation.audit.max_tokens must be > 0".to_string()]
        );
    }
}
