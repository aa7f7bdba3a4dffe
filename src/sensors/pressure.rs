//! Filter-line pressure transducer.
//!
//! Ratiometric 0.5–4.5 V sensor spanning 0–100 kPa, read through a
//! 2:3 divider on an ADC channel. The conversion is pure math so it is
//! host-testable; only the raw ADC read is target-specific.

use core::sync::atomic::AtomicU16;
#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::Ordering;

static SIM_PRESSURE_ADC: AtomicU16 = AtomicU16::new(0);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_pressure_adc(raw: u16) {
    SIM_PRESSURE_ADC.store(raw, Ordering::Relaxed);
}

const ADC_MAX: f32 = 4095.0;
const V_REF: f32 = 3.3;
/// Divider scale from sensor output to ADC input.
const DIVIDER: f32 = 1.5;
const V_ZERO: f32 = 0.5;
const V_SPAN: f32 = 4.0;
const KPA_SPAN: f32 = 100.0;

#[derive(Debug, Clone, Copy)]
pub struct PressureReading {
    pub raw: u16,
    pub kpa: f32,
}

pub struct PressureSensor {
    channel: i32,
}

impl PressureSensor {
    pub fn new(channel: i32) -> Self {
        Self { channel }
    }

    pub fn read(&self) -> PressureReading {
        let raw = self.read_adc();
        PressureReading {
            raw,
            kpa: adc_to_kpa(raw),
        }
    }

    #[cfg(target_os = "espidf")]
    fn read_adc(&self) -> u16 {
        let raw = unsafe { esp_idf_svc::sys::adc1_get_raw(self.channel as _) };
        raw.max(0) as u16
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self) -> u16 {
        let _ = self.channel;
        SIM_PRESSURE_ADC.load(Ordering::Relaxed)
    }
}

/// Raw ADC counts to kPa, clamped to the transducer span.
pub fn adc_to_kpa(raw: u16) -> f32 {
    let v_sensor = (f32::from(raw) / ADC_MAX) * V_REF * DIVIDER;
    let kpa = (v_sensor - V_ZERO) / V_SPAN * KPA_SPAN;
    kpa.clamp(0.0, KPA_SPAN)
}
