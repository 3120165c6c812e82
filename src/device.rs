//! Bridge build-time configuration, and simulation profiles describing a
//! bridge together with the targets wired behind it.
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_TARGETS;
use crate::protocol::ResponseWidth;

/// Fixed at instantiation; a running bridge never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Number of bus targets, N.
    pub targets: usize,
    /// Whether BLOCK_SETUP and the streaming automaton are built in.
    #[serde(default = "default_true")]
    pub block_transfer: bool,
    /// Send only the upper 16 bits of every response.
    #[serde(default)]
    pub narrow_response: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            targets: 1,
            block_transfer: true,
            narrow_response: false,
        }
    }
}

impl ::std::fmt::Display for BridgeConfig {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        write!(
            f,
            "{} target(s), block transfer {}, {}-bit responses",
            self.targets,
            if self.block_transfer { "on" } else { "off" },
            self.response_width().bytes() * 8
        )
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (1..=MAX_TARGETS).contains(&self.targets),
            "target count must be within 1..={}, got {}",
            MAX_TARGETS,
            self.targets
        );
        Ok(())
    }

    pub const fn response_width(&self) -> ResponseWidth {
        ResponseWidth::from_narrow(self.narrow_response)
    }
}

fn default_true() -> bool {
    true
}

/// A simulated memory target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    /// Bytes of backing memory.
    #[serde(deserialize_with = "parse_size")]
    pub size: u32,
    /// Ticks before acknowledge. 0 acknowledges on the first tick.
    #[serde(default)]
    pub latency: u32,
    /// Random extra ticks, 0..=jitter, added per cycle.
    #[serde(default)]
    pub jitter: u32,
    /// Initial content of every word.
    #[serde(default, deserialize_with = "parse_word")]
    pub fill: u32,
}

/// A bridge and the targets behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub link: LinkSpec,
    pub targets: Vec<TargetSpec>,
}

/// Timing of the simulated byte link, in bridge ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Idle ticks between inbound bytes. A serial link is much slower than
    /// the bridge clock, and hosts rely on that to let bus cycles finish.
    #[serde(default = "default_byte_gap")]
    pub byte_gap: u32,
    /// Ticks the host withholds readiness before taking each outbound byte.
    #[serde(default)]
    pub tx_stall: u32,
}

impl Default for LinkSpec {
    fn default() -> Self {
        LinkSpec {
            byte_gap: default_byte_gap(),
            tx_stall: 0,
        }
    }
}

fn default_byte_gap() -> u32 {
    10
}

impl ::std::fmt::Display for Profile {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        write!(f, "{} ({})", self.name, self.bridge)
    }
}

impl Profile {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let profile: Profile = serde_yaml::from_str(raw)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&raw)
    }

    fn validate(&self) -> Result<()> {
        self.bridge.validate()?;
        anyhow::ensure!(
            self.targets.len() <= self.bridge.targets,
            "profile {} wires {} targets to a bridge with {}",
            self.name,
            self.targets.len(),
            self.bridge.targets
        );
        if self.targets.len() < self.bridge.targets {
            log::warn!(
                "profile {}: target slots {}..{} are empty, cycles there never complete",
                self.name,
                self.targets.len(),
                self.bridge.targets
            );
        }
        Ok(())
    }
}

pub struct ProfileDB {
    profiles: Vec<Profile>,
}

impl ProfileDB {
    pub fn load() -> Result<Self> {
        Ok(ProfileDB {
            profiles: vec![
                Profile::from_yaml(include_str!("../profiles/default.yaml"))?,
                Profile::from_yaml(include_str!("../profiles/narrow.yaml"))?,
                Profile::from_yaml(include_str!("../profiles/minimal.yaml"))?,
                Profile::from_yaml(include_str!("../profiles/slow.yaml"))?,
            ],
        })
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Find a built-in profile by name, or load one from a YAML file path.
    pub fn find(name_or_path: &str) -> Result<Profile> {
        let db = ProfileDB::load()?;
        if let Some(profile) = db.profiles.iter().find(|p| p.name == name_or_path) {
            return Ok(profile.clone());
        }
        let path = Path::new(name_or_path);
        if path.exists() {
            log::debug!("Loading profile from {}", path.display());
            return Profile::from_file(path);
        }
        anyhow::bail!("Profile {:?} is neither built in nor a file", name_or_path)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Literal {
    Int(u64),
    Str(String),
}

fn parse_literal(lit: Literal) -> std::result::Result<u64, String> {
    let s = match lit {
        Literal::Int(n) => return Ok(n),
        Literal::Str(s) => s.trim().replace('_', ""),
    };
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if let Some(kib) = ["KiB", "KB", "K"].iter().find_map(|sfx| s.strip_suffix(sfx)) {
        kib.parse::<u64>().ok().map(|n| n * 1024)
    } else {
        s.parse().ok()
    };
    parsed.ok_or_else(|| format!("error while parsing {:?}", s))
}

fn parse_size<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = parse_literal(Literal::deserialize(deserializer)?).map_err(serde::de::Error::custom)?;
    u32::try_from(n).map_err(|_| serde::de::Error::custom(format!("size {} too large", n)))
}

fn parse_word<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = parse_literal(Literal::deserialize(deserializer)?).map_err(serde::de::Error::custom)?;
    u32::try_from(n).map_err(|_| serde::de::Error::custom(format!("{:#x} is not a 32-bit word", n)))
}
