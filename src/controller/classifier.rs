//! Gamepad classifier
//!
//! Decides from a device's advertised name whether it is a gamepad we watch.
//! A physical controller usually exposes several evdev nodes (the pad itself,
//! a touchpad, motion sensors) that all share a name prefix, so the policy is
//! two substring lists: a deny list checked first, then an allow list.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pattern lists used to build a [`GamepadClassifier`]
///
/// Loaded from the `[classifier]` table of the config file. Missing keys fall
/// back to the built-in lists.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Substrings that mark a device as a supported gamepad
    pub allow: Vec<String>,
    /// Substrings that exclude a device even when an allow pattern matches
    pub deny: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            allow: vec!["Wireless Controller".to_string(), "Stadia".to_string()],
            deny: vec![
                "Wireless Controller Touchpad".to_string(),
                "Wireless Controller Motion Sensors".to_string(),
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct GamepadClassifier {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl GamepadClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        // An empty pattern is a substring of every name
        let keep = |patterns: &[String]| -> Vec<String> {
            patterns
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect()
        };

        let classifier = Self {
            allow: keep(&config.allow),
            deny: keep(&config.deny),
        };
        debug!(
            "Gamepad classifier: allow={:?}, deny={:?}",
            classifier.allow, classifier.deny
        );
        classifier
    }

    /// Returns true if `name` should be monitored.
    ///
    /// Deny patterns take precedence over allow patterns.
    pub fn is_supported_gamepad(&self, name: &str) -> bool {
        if self.deny.iter().any(|pattern| name.contains(pattern.as_str())) {
            return false;
        }

        self.allow.iter().any(|pattern| name.contains(pattern.as_str()))
    }
}

impl Default for GamepadClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
