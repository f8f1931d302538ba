//! Persisted subserver registry: record sets, parsing and plausibility.

use super::{ProcessId, RegistryCorruption, SubserverPort, SubserverRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Minimum port accepted by the default plausibility policy.
const DEFAULT_MIN_PORT: u16 = 1024;

/// Ordered set of subserver records with unique ports.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct SubserverRecordSet(Vec<SubserverRecord>);

impl SubserverRecordSet {
    /// Creates a record set from individual records.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryCorruption::DuplicatePort`] when two records share a
    /// port.
    pub fn from_records(
        records: impl IntoIterator<Item = SubserverRecord>,
    ) -> Result<Self, RegistryCorruption> {
        let collected: Vec<SubserverRecord> = records.into_iter().collect();
        let mut seen = HashSet::with_capacity(collected.len());
        for record in &collected {
            if !seen.insert(record.port()) {
                return Err(RegistryCorruption::DuplicatePort(record.port()));
            }
        }
        Ok(Self(collected))
    }

    /// Builds the record set for a server family whose endpoints are all
    /// owned by `pid`.
    #[must_use]
    pub fn owned_by(endpoints: &[SubserverPort], pid: ProcessId) -> Self {
        Self(endpoints.iter().map(|endpoint| endpoint.owned_by(pid)).collect())
    }

    /// Returns the records in persisted order.
    #[must_use]
    pub fn records(&self) -> &[SubserverRecord] {
        &self.0
    }

    /// Returns whether the set holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns each distinct owning process once, in first-seen order.
    #[must_use]
    pub fn distinct_pids(&self) -> Vec<ProcessId> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .map(SubserverRecord::pid)
            .filter(|pid| seen.insert(*pid))
            .collect()
    }

    /// Serialises the set into the registry file format.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error; plain records never produce one in
    /// practice.
    pub fn to_registry_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.0)
    }
}

/// Classified contents of the registry file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryContents {
    /// No registry file exists.
    Absent,
    /// The file exists but cannot be trusted.
    Corrupt(RegistryCorruption),
    /// The file holds a well-formed record set.
    Valid(SubserverRecordSet),
}

impl RegistryContents {
    /// Classifies raw registry text.
    ///
    /// Parsing is strict: the text must be a JSON array whose elements are
    /// objects with exactly `protocol`, `port` and `pid`, where `port` and
    /// `pid` are positive integers and ports do not repeat. Anything else is
    /// reported as [`RegistryContents::Corrupt`].
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let records: Vec<SubserverRecord> = match serde_json::from_str(text) {
            Ok(records) => records,
            Err(err) => return Self::Corrupt(RegistryCorruption::Malformed(err.to_string())),
        };
        match SubserverRecordSet::from_records(records) {
            Ok(set) => Self::Valid(set),
            Err(corruption) => Self::Corrupt(corruption),
        }
    }

    /// Classifies the result of reading the registry file, where `None`
    /// means the file does not exist.
    #[must_use]
    pub fn from_file_text(text: Option<&str>) -> Self {
        text.map_or(Self::Absent, Self::parse)
    }
}

/// Reason a well-formed registry record cannot describe this server family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryViolation {
    /// The record claims a port below the policy minimum.
    #[error("record claims port {port}, below the minimum of {min_port}")]
    PortBelowMinimum {
        /// Claimed port.
        port: u16,
        /// Lowest port the policy accepts.
        min_port: u16,
    },

    /// The record names an endpoint that is not configured.
    #[error("record claims unconfigured endpoint {0}")]
    UnconfiguredEndpoint(SubserverPort),
}

/// Plausibility rules applied to well-formed registry records.
///
/// A record that parses but could not have been written for this server
/// family, such as one claiming a privileged port, marks the registry stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPolicy {
    min_port: u16,
    require_configured_endpoints: bool,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            min_port: DEFAULT_MIN_PORT,
            require_configured_endpoints: true,
        }
    }
}

impl RegistryPolicy {
    /// Creates a policy with explicit rules.
    #[must_use]
    pub const fn new(min_port: u16, require_configured_endpoints: bool) -> Self {
        Self {
            min_port,
            require_configured_endpoints,
        }
    }

    /// Returns the lowest port a record may claim.
    #[must_use]
    pub const fn min_port(&self) -> u16 {
        self.min_port
    }

    /// Returns whether records must match a configured endpoint.
    #[must_use]
    pub const fn require_configured_endpoints(&self) -> bool {
        self.require_configured_endpoints
    }

    /// Checks a single record against the policy.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryViolation`] the record commits.
    pub fn check(
        &self,
        record: &SubserverRecord,
        configured: &[SubserverPort],
    ) -> Result<(), RegistryViolation> {
        if record.port() < self.min_port {
            return Err(RegistryViolation::PortBelowMinimum {
                port: record.port(),
                min_port: self.min_port,
            });
        }
        if self.require_configured_endpoints && !configured.contains(&record.endpoint()) {
            return Err(RegistryViolation::UnconfiguredEndpoint(record.endpoint()));
        }
        Ok(())
    }

    /// Returns the first violation committed by any record in `set`.
    #[must_use]
    pub fn first_violation(
        &self,
        set: &SubserverRecordSet,
        configured: &[SubserverPort],
    ) -> Option<RegistryViolation> {
        set.records()
            .iter()
            .find_map(|record| self.check(record, configured).err())
    }
}
