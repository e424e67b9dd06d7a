//! Thermal-Adaptive Executor (§4.8): a first-order RC thermal model gating
//! layer execution on mobility-class devices. `ThermalExecutor::new` hoists
//! the mobility check to construction time (§9 redesign note) — a
//! non-mobility device gets the `NoOp` variant and pays only a constant-time
//! branch per layer, never the prediction/pause machinery.

use fabric_types::Device;
use std::time::Duration;

const THROTTLE_THRESHOLD_C: f64 = 85.0;
const INTEGRATION_STEP_S: f64 = 0.01;
/// If the predicted cool-down would run longer than this many multiples of
/// the layer's own duration, the workload is thermally unsustainable at its
/// current precision; signal the caller via `on_precision_reduce`.
const PRECISION_REDUCE_COOLDOWN_RATIO: f64 = 3.0;

/// Per-device RC thermal parameters (§4.8). Not part of the static `Device`
/// attributes (§3), so derived deterministically from them the same way
/// `Device::peak_flops` derives a throughput estimate: more compute units
/// imply more thermal mass and a proportionally larger heatsink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalParams {
    /// Thermal capacity `C`, joules per degree Celsius.
    pub thermal_capacity_j_per_c: f64,
    /// Heat-transfer coefficient `h`, watts per degree Celsius.
    pub heat_transfer_coefficient: f64,
    pub ambient_c: f64,
}

impl ThermalParams {
    pub fn for_device(device: &Device) -> Self {
        ThermalParams {
            thermal_capacity_j_per_c: 5.0 + device.compute_units as f64 * 0.1,
            heat_transfer_coefficient: 2.0 + device.compute_units as f64 * 0.01,
            ambient_c: 25.0,
        }
    }

    fn tau_s(&self) -> f64 {
        self.thermal_capacity_j_per_c / self.heat_transfer_coefficient
    }
}

/// A layer's estimated sustained power draw and execution duration, fed to
/// the executor ahead of launch (§4.8 step 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerProfile {
    pub power_w: f64,
    pub duration_s: f64,
}

/// User-visible hooks fired around pause/resume/precision decisions (§4.8).
/// Default is silent (no-op closures) so callers only wire up what they need.
pub struct ThermalCallbacks {
    pub on_pause: Box<dyn Fn() + Send + Sync>,
    pub on_resume: Box<dyn Fn() + Send + Sync>,
    pub on_precision_reduce: Box<dyn Fn() + Send + Sync>,
}

impl Default for ThermalCallbacks {
    fn default() -> Self {
        ThermalCallbacks {
            on_pause: Box::new(|| {}),
            on_resume: Box::new(|| {}),
            on_precision_reduce: Box::new(|| {}),
        }
    }
}

/// Either a real predictive controller (mobility devices) or a zero-cost
/// pass-through (everything else). An enum rather than a trait object since
/// there are exactly two shapes (§9).
pub enum ThermalExecutor {
    Predictive(PredictiveExecutor),
    NoOp,
}

impl ThermalExecutor {
    pub fn new(device: Device, safe_margin_c: f64, resume_margin_c: f64, callbacks: ThermalCallbacks) -> Self {
        if !device.mobility_flag {
            return ThermalExecutor::NoOp;
        }
        ThermalExecutor::Predictive(PredictiveExecutor::new(device, safe_margin_c, resume_margin_c, callbacks))
    }

    /// Run the §4.8 control loop for one layer. No-op devices return
    /// immediately; predictive devices may pause before returning.
    pub async fn before_layer(&mut self, layer: LayerProfile) {
        match self {
            ThermalExecutor::NoOp => {}
            ThermalExecutor::Predictive(p) => p.before_layer(layer).await,
        }
    }

    pub fn current_temp_c(&self) -> Option<f64> {
        match self {
            ThermalExecutor::NoOp => None,
            ThermalExecutor::Predictive(p) => Some(p.current_temp_c),
        }
    }
}

pub struct PredictiveExecutor {
    params: ThermalParams,
    current_temp_c: f64,
    safe_temp_c: f64,
    resume_temp_c: f64,
    throttled: bool,
    callbacks: ThermalCallbacks,
}

impl PredictiveExecutor {
    fn new(device: Device, safe_margin_c: f64, resume_margin_c: f64, callbacks: ThermalCallbacks) -> Self {
        let params = ThermalParams::for_device(&device);
        let safe_temp_c = THROTTLE_THRESHOLD_C - safe_margin_c;
        PredictiveExecutor {
            current_temp_c: params.ambient_c,
            safe_temp_c,
            resume_temp_c: safe_temp_c - resume_margin_c,
            throttled: false,
            params,
            callbacks,
        }
    }

    /// Integrate `dT/dt = (P - h(T - T_amb)) / C` forward by `duration_s`,
    /// `INTEGRATION_STEP_S`-wide steps (§4.8).
    fn integrate(&self, start_temp_c: f64, power_w: f64, duration_s: f64) -> f64 {
        let mut t = start_temp_c;
        let mut elapsed = 0.0;
        while elapsed < duration_s {
            let step = INTEGRATION_STEP_S.min(duration_s - elapsed);
            let dt = (power_w - self.params.heat_transfer_coefficient * (t - self.params.ambient_c))
                / self.params.thermal_capacity_j_per_c;
            t += dt * step;
            elapsed += step;
        }
        t
    }

    /// Closed-form cool-down time to reach `target_temp_c`, passively
    /// (`P = 0`): `t = -tau * ln((target - T_amb) / (T_now - T_amb))` (§4.8
    /// step 3). `None` if already at or below the target.
    fn cooldown_seconds(&self, target_temp_c: f64) -> Option<f64> {
        let above_ambient_now = self.current_temp_c - self.params.ambient_c;
        let above_ambient_target = target_temp_c - self.params.ambient_c;
        if above_ambient_now <= above_ambient_target || above_ambient_now <= 0.0 {
            return None;
        }
        let ratio = above_ambient_target / above_ambient_now;
        Some(-self.params.tau_s() * ratio.ln())
    }

    async fn before_layer(&mut self, layer: LayerProfile) {
        if self.throttled {
            if let Some(t_cool) = self.cooldown_seconds(self.resume_temp_c) {
                tokio::time::sleep(Duration::from_secs_f64(t_cool.max(0.0))).await;
                self.current_temp_c = self.resume_temp_c;
            }
            self.throttled = false;
            (self.callbacks.on_resume)();
        }

        let t_peak = self.integrate(self.current_temp_c, layer.power_w, layer.duration_s);
        if t_peak > self.safe_temp_c {
            if let Some(t_cool) = self.cooldown_seconds(self.safe_temp_c) {
                if t_cool / layer.duration_s.max(1e-9) > PRECISION_REDUCE_COOLDOWN_RATIO {
                    (self.callbacks.on_precision_reduce)();
                }
                (self.callbacks.on_pause)();
                tokio::time::sleep(Duration::from_secs_f64(t_cool.max(0.0))).await;
                self.current_temp_c = self.safe_temp_c;
                self.throttled = true;
            }
        }

        self.current_temp_c = self.integrate(self.current_temp_c, layer.power_w, layer.duration_s);
    }
}
