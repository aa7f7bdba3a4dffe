//! Board pin map (ESP32 feeder controller, rev C).

/// Stepper STEP line, driven by the RMT pulse generator.
pub const STEPPER_STEP_GPIO: i32 = 15;
/// Stepper direction line.
pub const STEPPER_DIR_GPIO: i32 = 13;
/// Stepper enable line (active low).
pub const STEPPER_EN_GPIO: i32 = 14;
/// Stepper driver reset line.
pub const STEPPER_RESET_GPIO: i32 = 2;

/// DS18B20 one-wire bus.
pub const ONEWIRE_GPIO: i32 = 4;
/// Water-level float switch input.
pub const WATER_LEVEL_GPIO: i32 = 25;
/// Pressure transducer, ADC1 channel (GPIO34).
pub const PRESSURE_ADC_CHANNEL: i32 = 6;
