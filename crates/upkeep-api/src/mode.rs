//! Request-side modes for an update run

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a mode string is not recognised
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct ParseModeError {
    /// Which mode was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
    /// Accepted values
    pub expected: &'static str,
}

/// How compatibility filters are applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatMode {
    /// Apply filters, warn on conflicts and keep going
    #[default]
    Auto,
    /// Any conflict aborts the manager's routine
    Strict,
    /// Do not consult filters at all
    Off,
}

impl CompatMode {
    /// Whether filters should be consulted
    #[must_use]
    pub fn enabled(self) -> bool {
        !matches!(self, CompatMode::Off)
    }
}

impl fmt::Display for CompatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatMode::Auto => write!(f, "auto"),
            CompatMode::Strict => write!(f, "strict"),
            CompatMode::Off => write!(f, "off"),
        }
    }
}

impl FromStr for CompatMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(CompatMode::Auto),
            "strict" => Ok(CompatMode::Strict),
            "off" => Ok(CompatMode::Off),
            _ => Err(ParseModeError {
                kind: "compat mode",
                value: s.to_string(),
                expected: "auto, strict, off",
            }),
        }
    }
}

/// Version strategy requested for the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Update to the absolute latest version
    Latest,
    /// Update to the latest stable version
    #[default]
    Stable,
    /// Only patch/minor moves; indexes are refreshed, nothing is upgraded
    Minor,
    /// Keep exact versions
    Fixed,
}

impl Strategy {
    /// Whether this strategy performs upgrade/install steps
    #[must_use]
    pub fn upgrades(self) -> bool {
        matches!(self, Strategy::Latest | Strategy::Stable)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Latest => write!(f, "latest"),
            Strategy::Stable => write!(f, "stable"),
            Strategy::Minor => write!(f, "minor"),
            Strategy::Fixed => write!(f, "fixed"),
        }
    }
}

impl FromStr for Strategy {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(Strategy::Latest),
            "stable" => Ok(Strategy::Stable),
            "minor" => Ok(Strategy::Minor),
            "fixed" => Ok(Strategy::Fixed),
            _ => Err(ParseModeError {
                kind: "strategy",
                value: s.to_string(),
                expected: "latest, stable, minor, fixed",
            }),
        }
    }
}
