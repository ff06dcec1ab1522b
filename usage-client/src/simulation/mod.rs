//! Counterfactual replay of stored intervals under a hypothetical solar
//! array and battery.
//!
//! The replay is strictly sequential: battery state of charge is threaded
//! from one interval into the next, so intervals are never reordered.

pub mod pv;

use time::OffsetDateTime;

use crate::domain::{interval::interval_cost, Interval, SiteZone};

pub use pv::pv_yield_kwh;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SimulationError {
    #[error("solar capacity must be non-negative, got {0}")]
    SolarCapacity(f64),
    #[error("battery capacity must be non-negative, got {0}")]
    BatteryCapacity(f64),
    #[error("round-trip efficiency must be in (0, 1], got {0}")]
    Efficiency(f64),
    #[error("intervals must be strictly ascending: {next} does not follow {previous}")]
    Unordered {
        previous: OffsetDateTime,
        next: OffsetDateTime,
    },
}

/// Hypothetical equipment to replay history against, and the site zone
/// whose local hours drive the solar curve.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SimulationParameters {
    solar_capacity_kw: f64,
    battery_capacity_kwh: f64,
    battery_round_trip_efficiency: f64,
    #[serde(skip)]
    zone: SiteZone,
}

impl SimulationParameters {
    pub fn new(
        solar_capacity_kw: f64,
        battery_capacity_kwh: f64,
        battery_round_trip_efficiency: f64,
    ) -> Result<Self, SimulationError> {
        // Negated comparisons so NaN is rejected too.
        if !(solar_capacity_kw >= 0.0) {
            return Err(SimulationError::SolarCapacity(solar_capacity_kw));
        }
        if !(battery_capacity_kwh >= 0.0) {
            return Err(SimulationError::BatteryCapacity(battery_capacity_kwh));
        }
        if !(battery_round_trip_efficiency > 0.0 && battery_round_trip_efficiency <= 1.0) {
            return Err(SimulationError::Efficiency(battery_round_trip_efficiency));
        }

        Ok(Self {
            solar_capacity_kw,
            battery_capacity_kwh,
            battery_round_trip_efficiency,
            zone: SiteZone::default(),
        })
    }

    pub fn with_zone(mut self, zone: SiteZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn zone(&self) -> SiteZone {
        self.zone
    }

    pub fn solar_capacity_kw(&self) -> f64 {
        self.solar_capacity_kw
    }

    pub fn battery_capacity_kwh(&self) -> f64 {
        self.battery_capacity_kwh
    }

    pub fn battery_round_trip_efficiency(&self) -> f64 {
        self.battery_round_trip_efficiency
    }
}

/// Battery state carried across one simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationState {
    pub state_of_charge_kwh: f64,
}

impl SimulationState {
    fn empty() -> Self {
        Self {
            state_of_charge_kwh: 0.0,
        }
    }

    /// Dispatches the battery against `net` grid draw and returns the net
    /// left for the grid. Only charging loses energy; discharge is lossless.
    fn dispatch(&mut self, net: f64, params: &SimulationParameters) -> f64 {
        let capacity = params.battery_capacity_kwh;
        if capacity <= 0.0 {
            return net;
        }

        let soc = self.state_of_charge_kwh;
        if net > 0.0 && soc > 0.0 {
            let discharge = net.min(soc);
            self.state_of_charge_kwh -= discharge;
            net - discharge
        } else if net < 0.0 && soc < capacity {
            let surplus = -net;
            let room = capacity - soc;
            let stored = surplus.min(room) * params.battery_round_trip_efficiency;
            self.state_of_charge_kwh += stored;
            net + stored
        } else {
            net
        }
    }
}

/// Outcome of replaying one interval.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SimulatedInterval {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub pv_kwh: f64,
    pub state_of_charge_kwh: f64,
    pub import_kwh: f64,
    pub export_kwh: f64,
    pub import_price: f64,
    pub export_price: f64,
    pub baseline_cost: f64,
    pub scenario_cost: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SimulationResult {
    pub intervals: Vec<SimulatedInterval>,
    pub baseline_total: f64,
    pub scenario_total: f64,
    /// Positive means the hypothetical equipment saves money.
    pub delta: f64,
}

/// Replays `intervals` (strictly ascending) with the given equipment.
/// Timestamps are re-expressed in the parameters' site zone first, so the
/// offset they arrive with does not matter. Prices are the stored ones for
/// both baseline and scenario.
pub fn simulate(
    intervals: &[Interval],
    params: &SimulationParameters,
) -> Result<SimulationResult, SimulationError> {
    if let Some(pair) = intervals.windows(2).find(|w| w[1].ts <= w[0].ts) {
        return Err(SimulationError::Unordered {
            previous: pair[0].ts,
            next: pair[1].ts,
        });
    }

    let mut state = SimulationState::empty();
    let mut results = Vec::with_capacity(intervals.len());
    let mut baseline_total = 0.0;
    let mut scenario_total = 0.0;

    for it in intervals {
        let load = it.import_kwh - it.export_kwh;
        let ts = params.zone.localize(it.ts);
        let pv_kwh = pv_yield_kwh(ts, params.solar_capacity_kw);
        let net = state.dispatch(load - pv_kwh, params);

        let import_kwh = net.max(0.0);
        let export_kwh = (-net).max(0.0);

        let baseline_cost = interval_cost(it.import_kwh, it.export_kwh, it.import_price, it.export_price);
        let scenario_cost = interval_cost(import_kwh, export_kwh, it.import_price, it.export_price);
        baseline_total += baseline_cost;
        scenario_total += scenario_cost;

        results.push(SimulatedInterval {
            ts,
            pv_kwh,
            state_of_charge_kwh: state.state_of_charge_kwh,
            import_kwh,
            export_kwh,
            import_price: it.import_price,
            export_price: it.export_price,
            baseline_cost,
            scenario_cost,
        });
    }

    Ok(SimulationResult {
        intervals: results,
        baseline_total,
        scenario_total,
        delta: baseline_total - scenario_total,
    })
}
