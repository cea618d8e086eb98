//! Flow control against a downstream queue's depth
//!
//! A backfill worker suspends itself while the queue it feeds is above its
//! high-water mark and resumes only once it has drained to `highwater_ok`.

use tracing::warn;

use crate::broker::BrokerClient;
use crate::config::{WaterLevel, WaterLevels};
use crate::document::EntityType;

/// The queue whose depth gates a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterSource {
    River,
    Backfill(EntityType),
}

impl WaterSource {
    /// Object workers feed the river, container workers feed the object
    /// queue and account workers feed the container queue
    #[must_use]
    pub fn for_queue(queue: EntityType) -> Self {
        match queue {
            EntityType::Object => Self::River,
            EntityType::Container => Self::Backfill(EntityType::Object),
            EntityType::Account => Self::Backfill(EntityType::Container),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::River => "river",
            Self::Backfill(entity) => entity.as_str(),
        }
    }

    #[must_use]
    pub fn queue_name(&self, broker: &BrokerClient) -> String {
        match self {
            Self::River => broker.river_queue_name().to_string(),
            Self::Backfill(entity) => broker.backfill_queue_name(*entity),
        }
    }

    /// Thresholds configured for this source
    #[must_use]
    pub fn level<'a>(&self, levels: &'a WaterLevels) -> &'a WaterLevel {
        match self {
            Self::River | Self::Backfill(EntityType::Account) => &levels.river,
            Self::Backfill(EntityType::Object) => &levels.object,
            Self::Backfill(EntityType::Container) => &levels.container,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighwaterState {
    Normal,
    Throttled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Sleep and check again
    Wait,
    /// Consume a batch
    Proceed,
}

/// Hysteresis state machine for one worker
#[derive(Debug, Clone)]
pub struct HighwaterGate {
    source: &'static str,
    level: WaterLevel,
    state: HighwaterState,
}

impl HighwaterGate {
    #[must_use]
    pub fn new(source: WaterSource, level: WaterLevel) -> Self {
        Self {
            source: source.name(),
            level,
            state: HighwaterState::Normal,
        }
    }

    #[must_use]
    pub fn state(&self) -> HighwaterState {
        self.state
    }

    #[must_use]
    pub fn level(&self) -> &WaterLevel {
        &self.level
    }

    /// Feed one depth reading; an unknown depth counts as empty
    pub fn observe(&mut self, depth: Option<u64>) -> GateDecision {
        let depth = depth.unwrap_or(0);
        match self.state {
            HighwaterState::Normal if depth > self.level.highwater => {
                warn!(
                    source = self.source,
                    depth,
                    highwater = self.level.highwater,
                    "hit high water mark, suspending processing"
                );
                self.state = HighwaterState::Throttled;
                GateDecision::Wait
            }
            HighwaterState::Throttled if depth > self.level.highwater_ok => {
                warn!(
                    source = self.source,
                    depth,
                    highwater_ok = self.level.highwater_ok,
                    "water level still too high"
                );
                GateDecision::Wait
            }
            HighwaterState::Throttled => {
                warn!(source = self.source, depth, "high water recovered");
                self.state = HighwaterState::Normal;
                GateDecision::Proceed
            }
            HighwaterState::Normal => GateDecision::Proceed,
        }
    }
}
