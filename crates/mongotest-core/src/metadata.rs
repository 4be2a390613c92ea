//! Test metadata model
//!
//! Declarative requirements and exclusions attached to each test. Every field
//! is optional and an absent field never excludes a test.
//!
//! ```toml
//! [test.metadata.requires]
//! topology = ["replicaset", "sharded"]
//! mongodb = ">=3.6.0"
//! os = "!win32"
//!
//! [test.metadata.ignore]
//! ci = true
//! ```

use crate::version::VersionRange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Requirements and exclusions for a single test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Requires>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Ignore>,
}

/// The `requires` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Requires {
    /// Topology tag or set of tags the test can run against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<TopologyRequirement>,

    /// Range the live database version must satisfy
    #[serde(default, alias = "database", skip_serializing_if = "Option::is_none")]
    pub mongodb: Option<VersionRange>,

    /// Range the host runtime version must satisfy
    #[serde(default, alias = "node", skip_serializing_if = "Option::is_none")]
    pub host: Option<VersionRange>,

    /// Platform tag, optionally negated with a leading `!`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<PlatformRequirement>,

    /// Host capabilities that must be available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeSet<Capability>>,
}

/// The `ignore` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ignore {
    /// Exclude the test when running under CI
    #[serde(default, alias = "travis", skip_serializing_if = "Option::is_none")]
    pub ci: Option<bool>,
}

/// One topology tag or a set of acceptable tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    untagged,
    expecting = "a topology tag or an array of topology tags"
)]
pub enum TopologyRequirement {
    One(String),
    Any(Vec<String>),
}

impl TopologyRequirement {
    /// Whether `tag` is one of the accepted topologies
    pub fn accepts(&self, tag: &str) -> bool {
        match self {
            TopologyRequirement::One(t) => t == tag,
            TopologyRequirement::Any(tags) => tags.iter().any(|t| t == tag),
        }
    }

    pub fn tags(&self) -> Vec<&str> {
        match self {
            TopologyRequirement::One(t) => vec![t.as_str()],
            TopologyRequirement::Any(tags) => tags.iter().map(String::as_str).collect(),
        }
    }
}

/// Platform tag such as `linux`, `darwin` or `!win32`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformRequirement(pub String);

impl PlatformRequirement {
    /// A plain tag must equal the platform. A negated tag excludes only the
    /// platform it names.
    pub fn accepts(&self, platform: &str) -> bool {
        let tag = self.0.as_str();
        if tag == platform {
            return true;
        }
        tag.starts_with('!') && tag != format!("!{}", platform)
    }
}

/// Optional host capability a test may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Loopback IPv6 sockets
    Ipv6,
    /// Unix domain sockets
    UnixSockets,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::Ipv6, Capability::UnixSockets];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Ipv6 => "ipv6",
            Capability::UnixSockets => "unix-sockets",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TestMetadata {
    pub fn topology(&self) -> Option<&TopologyRequirement> {
        self.requires.as_ref().and_then(|r| r.topology.as_ref())
    }

    pub fn mongodb(&self) -> Option<&VersionRange> {
        self.requires.as_ref().and_then(|r| r.mongodb.as_ref())
    }

    pub fn host(&self) -> Option<&VersionRange> {
        self.requires.as_ref().and_then(|r| r.host.as_ref())
    }

    pub fn os(&self) -> Option<&PlatformRequirement> {
        self.requires.as_ref().and_then(|r| r.os.as_ref())
    }

    /// Whether the test lists `capability` under `requires.features`
    pub fn requires_feature(&self, capability: Capability) -> bool {
        self.requires
            .as_ref()
            .and_then(|r| r.features.as_ref())
            .is_some_and(|features| features.contains(&capability))
    }

    pub fn ignored_on_ci(&self) -> bool {
        self.ignore.as_ref().and_then(|i| i.ci).unwrap_or(false)
    }
}
