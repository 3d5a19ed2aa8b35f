//! Feedback interface towards the surrounding charging-station application
//!
//! The engine reports session lifecycle and measurement information through
//! this trait. Callbacks are invoked synchronously from the protocol loop;
//! implementations must not block.

use serde::{Deserialize, Serialize};

/// Discrete session lifecycle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// The vehicle requests external-identification authorization.
    RequireAuthEim,
    /// The power hardware should start the cable check routine.
    StartCableCheck,
    /// Session setup completed; the vehicle is identified.
    SetupFinished,
    /// Energy transfer has started.
    ChargeLoopStarted,
    /// Energy transfer has stopped.
    ChargeLoopFinished,
    /// The DC contactor must open.
    DcOpenContactor,
    /// The data link terminated normally.
    DlinkTerminate,
    /// The data link failed.
    DlinkError,
    /// The session was paused for a later resume.
    DlinkPause,
}

/// Operating envelope of the DC power path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcTransferLimits {
    pub max_voltage: f32,
    pub max_current: f32,
    pub max_power: f32,
    pub min_voltage: f32,
    pub min_current: f32,
}

impl Default for DcTransferLimits {
    fn default() -> Self {
        Self {
            max_voltage: 500.0,
            max_current: 200.0,
            max_power: 100_000.0,
            min_voltage: 150.0,
            min_current: 0.0,
        }
    }
}

/// The vehicle's momentary charging setpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcChargeTarget {
    pub voltage: f32,
    pub current: f32,
}

/// Progress information displayed by the vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present_soc: Option<i8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_time_to_full_soc_s: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_energy_capacity_wh: Option<u32>,
}

/// Callback sink consumed by the surrounding application.
///
/// Every method has a no-op default so applications implement only what
/// they observe.
pub trait Feedback: Send + Sync {
    fn signal(&self, _event: SignalEvent) {}

    fn dc_charge_target(&self, _target: DcChargeTarget) {}

    fn dc_max_limits(&self, _limits: DcTransferLimits) {}

    fn evcc_id(&self, _id: &str) {}

    fn selected_protocol(&self, _protocol: &str) {}

    fn display_parameters(&self, _params: DisplayParameters) {}
}

/// Feedback sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFeedback;

impl Feedback for NullFeedback {}
