//! Synchronization descriptions and their interpretation.
//!
//! A [`SynchronizationDescription`] is an ordered list of groups. Each group
//! describes `repeats` equidistant intervals; the interval values are keyed by
//! [`Domain`]:
//!
//! ```json
//! [{"Delay": {"Time": 0.1},
//!   "Initial": {"Time": 0.0, "Position": 0.0},
//!   "Active": {"Time": 0.01, "Position": 0.1},
//!   "Total": {"Time": 0.1, "Position": 1.0},
//!   "Repeats": 10}]
//! ```
//!
//! [`interpret`] turns a description into a [`GeneratorConfiguration`] for a
//! single trigger/gate channel.

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// =============================================================================
// Description
// =============================================================================

/// Axis along which intervals are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Seconds since the start of generation.
    Time,
    /// Position of the moveable, in its user units.
    Position,
    /// Counts of a monitor channel. Accepted in descriptions, never generated.
    Monitor,
}

/// Values of one group, keyed by domain.
pub type DomainValues = BTreeMap<Domain, f64>;

/// One group of equidistant intervals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SynchronizationGroup {
    /// Wait before the first interval.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub delay: DomainValues,
    /// Start of the first interval.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub initial: DomainValues,
    /// Length of the active part of each interval. Its sign gives the direction in the position domain.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub active: DomainValues,
    /// Distance between the starts of two consecutive intervals.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub total: DomainValues,
    /// Number of intervals in the group.
    #[serde(default)]
    pub repeats: u64,
}

impl SynchronizationGroup {
    /// Empty group of `repeats` intervals.
    pub fn new(repeats: u64) -> Self {
        Self {
            repeats,
            ..Self::default()
        }
    }

    /// Time-only group.
    pub fn time(delay: f64, active: f64, total: f64, repeats: u64) -> Self {
        Self::new(repeats)
            .with_delay(Domain::Time, delay)
            .with_initial(Domain::Time, 0.0)
            .with_active(Domain::Time, active)
            .with_total(Domain::Time, total)
    }

    /// Position-only group.
    pub fn position(initial: f64, active: f64, total: f64, repeats: u64) -> Self {
        Self::new(repeats)
            .with_initial(Domain::Position, initial)
            .with_active(Domain::Position, active)
            .with_total(Domain::Position, total)
    }

    /// Sets the delay for `domain`.
    pub fn with_delay(mut self, domain: Domain, value: f64) -> Self {
        self.delay.insert(domain, value);
        self
    }

    /// Sets the initial value for `domain`.
    pub fn with_initial(mut self, domain: Domain, value: f64) -> Self {
        self.initial.insert(domain, value);
        self
    }

    /// Sets the active length for `domain`.
    pub fn with_active(mut self, domain: Domain, value: f64) -> Self {
        self.active.insert(domain, value);
        self
    }

    /// Sets the total length for `domain`.
    pub fn with_total(mut self, domain: Domain, value: f64) -> Self {
        self.total.insert(domain, value);
        self
    }

    /// Generation domains (`Time`, `Position`) present in `Total`.
    pub fn generation_domains(&self) -> Vec<Domain> {
        [Domain::Time, Domain::Position]
            .into_iter()
            .filter(|d| self.total.contains_key(d))
            .collect()
    }
}

/// Ordered list of synchronization groups. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynchronizationDescription {
    groups: Vec<SynchronizationGroup>,
}

impl SynchronizationDescription {
    /// Builds a description from its groups.
    pub fn new(groups: Vec<SynchronizationGroup>) -> Self {
        Self { groups }
    }

    /// Groups in generation order.
    pub fn groups(&self) -> &[SynchronizationGroup] {
        &self.groups
    }

    /// True if the description has no group.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sum of `repeats` over all groups.
    pub fn total_repeats(&self) -> u64 {
        self.groups.iter().map(|g| g.repeats).sum()
    }

    /// Parses the JSON form shown in the module docs.
    ///
    /// Malformed input is a [`DaqError::Configuration`].
    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            DaqError::Configuration(format!("invalid synchronization description: {}", e))
        })
    }

    /// Serializes to the JSON form accepted by [`SynchronizationDescription::from_json`].
    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|e| {
            DaqError::Configuration(format!("cannot serialize synchronization description: {}", e))
        })
    }
}

impl From<Vec<SynchronizationGroup>> for SynchronizationDescription {
    fn from(groups: Vec<SynchronizationGroup>) -> Self {
        Self::new(groups)
    }
}

// =============================================================================
// Generator configuration
// =============================================================================

/// How a position threshold is crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Position increasing: fires once `position >= threshold`.
    GreaterOrEqual,
    /// Position decreasing: fires once `position <= threshold`.
    LessOrEqual,
}

impl Comparison {
    /// Whether `position` has reached `threshold`.
    pub fn is_satisfied(self, position: f64, threshold: f64) -> bool {
        match self {
            Comparison::GreaterOrEqual => position >= threshold,
            Comparison::LessOrEqual => position <= threshold,
        }
    }
}

/// Which event a threshold fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Start of an interval.
    Active,
    /// End of the active part of an interval.
    Passive,
}

/// One position threshold of a position-domain configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdEvent {
    /// Position at which the event fires.
    pub threshold: f64,
    /// Direction of the crossing.
    pub comparison: Comparison,
    /// Event fired on crossing.
    pub edge: Edge,
    /// Repetition index shared by the Active/Passive pair.
    pub id: u64,
}

/// Time-domain configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSchedule {
    /// Wait before the first Active event.
    pub offset: Duration,
    /// Time from an Active event to its Passive event.
    pub active_period: Duration,
    /// Time from a Passive event to the next Active event.
    pub passive_period: Duration,
    /// Number of Active/Passive pairs.
    pub repetitions: u64,
}

/// Concrete configuration of one trigger/gate channel.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorConfiguration {
    /// Wall-clock generation.
    Time(TimeSchedule),
    /// Thresholds evaluated in order against the position feed.
    Position(Vec<ThresholdEvent>),
}

impl GeneratorConfiguration {
    /// Domain this configuration generates in.
    pub fn domain(&self) -> Domain {
        match self {
            GeneratorConfiguration::Time(_) => Domain::Time,
            GeneratorConfiguration::Position(_) => Domain::Position,
        }
    }

    /// Number of Active events a complete run emits.
    pub fn active_events(&self) -> u64 {
        match self {
            GeneratorConfiguration::Time(schedule) => schedule.repetitions,
            GeneratorConfiguration::Position(events) => {
                events.iter().filter(|e| e.edge == Edge::Active).count() as u64
            }
        }
    }
}

// =============================================================================
// Interpretation
// =============================================================================

/// Picks the generation domain shared by all groups.
///
/// `preferred` wins when every group defines it, otherwise `Position` is
/// preferred over `Time`.
pub fn resolve_domain(
    description: &SynchronizationDescription,
    preferred: Option<Domain>,
) -> AppResult<Domain> {
    if description.is_empty() {
        return Err(DaqError::Configuration(
            "synchronization description has no groups".into(),
        ));
    }

    let mut common = vec![Domain::Time, Domain::Position];
    for (index, group) in description.groups().iter().enumerate() {
        let domains = group.generation_domains();
        if domains.is_empty() {
            return Err(DaqError::Configuration(format!(
                "group {} defines neither Time nor Position in Total",
                index
            )));
        }
        common.retain(|d| domains.contains(d));
    }

    if common.is_empty() {
        return Err(DaqError::Configuration(
            "groups mix Time and Position domains".into(),
        ));
    }

    let domain = match preferred {
        Some(p) if common.contains(&p) => p,
        _ if common.contains(&Domain::Position) => Domain::Position,
        _ => Domain::Time,
    };
    Ok(domain)
}

/// Interprets a synchronization description for one channel.
pub fn interpret(
    description: &SynchronizationDescription,
    preferred: Option<Domain>,
) -> AppResult<GeneratorConfiguration> {
    match resolve_domain(description, preferred)? {
        Domain::Position => interpret_position(description).map(GeneratorConfiguration::Position),
        _ => interpret_time(description).map(GeneratorConfiguration::Time),
    }
}

fn required(values: &DomainValues, domain: Domain, field: &str, group: usize) -> AppResult<f64> {
    let value = values.get(&domain).copied().ok_or_else(|| {
        DaqError::Configuration(format!(
            "group {} is missing {} for domain {:?}",
            group, field, domain
        ))
    })?;
    if !value.is_finite() {
        return Err(DaqError::Configuration(format!(
            "group {} has non-finite {} for domain {:?}",
            group, field, domain
        )));
    }
    Ok(value)
}

fn interpret_position(description: &SynchronizationDescription) -> AppResult<Vec<ThresholdEvent>> {
    let mut events = Vec::with_capacity(2 * description.total_repeats() as usize);
    let mut id = 0;

    for (index, group) in description.groups().iter().enumerate() {
        let mut initial = required(&group.initial, Domain::Position, "Initial", index)?;
        let active = required(&group.active, Domain::Position, "Active", index)?;
        let total = required(&group.total, Domain::Position, "Total", index)?;
        let comparison = if active >= 0.0 {
            Comparison::GreaterOrEqual
        } else {
            Comparison::LessOrEqual
        };

        for _ in 0..group.repeats {
            events.push(ThresholdEvent {
                threshold: initial,
                comparison,
                edge: Edge::Active,
                id,
            });
            events.push(ThresholdEvent {
                threshold: initial + active,
                comparison,
                edge: Edge::Passive,
                id,
            });
            id += 1;
            initial += total;
        }
    }

    check_monotonic(&events)?;
    Ok(events)
}

fn check_monotonic(events: &[ThresholdEvent]) -> AppResult<()> {
    for pair in events.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.comparison != next.comparison {
            return Err(DaqError::Configuration(
                "position groups move in opposite directions".into(),
            ));
        }
        let ordered = match next.comparison {
            Comparison::GreaterOrEqual => next.threshold >= prev.threshold,
            Comparison::LessOrEqual => next.threshold <= prev.threshold,
        };
        if !ordered {
            return Err(DaqError::Configuration(format!(
                "position thresholds are not monotonic at repetition {}",
                next.id
            )));
        }
    }
    Ok(())
}

fn seconds(value: f64, field: &str) -> AppResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        DaqError::Configuration(format!("{} must be a non-negative time, got {}", field, value))
    })
}

fn interpret_time(description: &SynchronizationDescription) -> AppResult<TimeSchedule> {
    let groups = description.groups();
    // TODO: multi-group time generation needs a per-group schedule in FunctionGenerator.
    if groups.len() != 1 {
        return Err(DaqError::Configuration(format!(
            "time-domain generation supports exactly one group, got {}",
            groups.len()
        )));
    }

    let group = &groups[0];
    let delay = group.delay.get(&Domain::Time).copied().unwrap_or(0.0);
    let active = required(&group.active, Domain::Time, "Active", 0)?;
    let total = required(&group.total, Domain::Time, "Total", 0)?;

    Ok(TimeSchedule {
        offset: seconds(delay, "Delay")?,
        active_period: seconds(active, "Active")?,
        passive_period: seconds(total - active, "Total - Active")?,
        repetitions: group.repeats,
    })
}
