//! Static routing table from (event kind, task name) to automation.
//!
//! Event types arrive as free-form strings (`TaskCreated`, `taskcreated`) and
//! task names as human-entered titles (`  Move Out `). Both are normalized
//! into a [`RoutingKey`] before lookup; anything that does not normalize to a
//! known event kind cannot be routed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Upstream task lifecycle events that can trigger automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A task was created.
    TaskCreated,
    /// A task was edited.
    TaskUpdated,
    /// A task was marked complete.
    TaskCompleted,
}

impl EventKind {
    /// Parses an event type, ignoring case and surrounding whitespace.
    pub fn parse(event_type: &str) -> Option<Self> {
        match event_type.trim().to_ascii_lowercase().as_str() {
            "taskcreated" => Some(Self::TaskCreated),
            "taskupdated" => Some(Self::TaskUpdated),
            "taskcompleted" => Some(Self::TaskCompleted),
            _ => None,
        }
    }

    /// Lower-cased wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "taskcreated",
            Self::TaskUpdated => "taskupdated",
            Self::TaskCompleted => "taskcompleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a task name for routing: trimmed and lower-cased.
pub fn normalize_task_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Lookup key into the routing table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    event: EventKind,
    task: String,
}

impl RoutingKey {
    /// Builds a key from raw webhook values.
    ///
    /// Returns `None` if the event type is not a known [`EventKind`] or the
    /// task name is blank.
    pub fn parse(event_type: &str, task_name: &str) -> Option<Self> {
        let event = EventKind::parse(event_type)?;
        let task = normalize_task_name(task_name);
        (!task.is_empty()).then_some(Self { event, task })
    }

    /// Builds a key from an already-parsed event kind.
    pub fn new(event: EventKind, task_name: &str) -> Self {
        Self { event, task: normalize_task_name(task_name) }
    }

    /// Event kind component.
    pub fn event(&self) -> EventKind {
        self.event
    }

    /// Normalized task name component.
    pub fn task(&self) -> &str {
        &self.task
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event, self.task)
    }
}

/// Automated workflows a task can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Automation {
    /// One-time onboarding of a new tenant account.
    Initiation,
    /// Resident move-out processing.
    MoveOut,
    /// Refund of a resident's security deposit.
    SecurityDepositRefund,
    /// Utility bill-back to residents.
    UtilityBill,
    /// Distribution of funds to a property owner.
    OwnerDistribution,
}

impl Automation {
    /// Every automation, in routing-table order.
    pub const ALL: [Self; 5] = [
        Self::Initiation,
        Self::MoveOut,
        Self::SecurityDepositRefund,
        Self::UtilityBill,
        Self::OwnerDistribution,
    ];

    /// Stable name used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiation => "initiation",
            Self::MoveOut => "move_out",
            Self::SecurityDepositRefund => "security_deposit_refund",
            Self::UtilityBill => "utility_bill",
            Self::OwnerDistribution => "owner_distribution",
        }
    }

    /// Whether this is the initiation workflow, which bypasses the category
    /// gate and runs at most once per tenant.
    pub fn is_initiation(self) -> bool {
        self == Self::Initiation
    }
}

impl fmt::Display for Automation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The routing table. Task names are stored normalized.
pub const ROUTES: &[(EventKind, &str, Automation)] = &[
    (EventKind::TaskCreated, "initiation", Automation::Initiation),
    (EventKind::TaskCreated, "move out", Automation::MoveOut),
    (EventKind::TaskCreated, "security deposit refund", Automation::SecurityDepositRefund),
    (EventKind::TaskCreated, "utility bill", Automation::UtilityBill),
    (EventKind::TaskCompleted, "owner distribution", Automation::OwnerDistribution),
];

/// Looks up the automation for `key`.
pub fn route(key: &RoutingKey) -> Option<Automation> {
    ROUTES
        .iter()
        .find(|(event, task, _)| *event == key.event && *task == key.task)
        .map(|(_, _, automation)| *automation)
}
