//! Reservoir water-level float switch.
//!
//! Digital input, HIGH while the pellet-reservoir water jacket is at
//! level. On ESP-IDF the GPIO is read directly; on the host a static
//! atomic serves injected values (water-present by default, the safe
//! assumption for tests that do not care).

use core::sync::atomic::AtomicBool;
#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::Ordering;

static SIM_WATER: AtomicBool = AtomicBool::new(true);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_water(present: bool) {
    SIM_WATER.store(present, Ordering::Relaxed);
}

pub struct WaterLevelSensor {
    gpio: i32,
    last: bool,
}

impl WaterLevelSensor {
    pub fn new(gpio: i32) -> Self {
        Self { gpio, last: true }
    }

    pub fn read(&mut self) -> bool {
        self.last = self.read_gpio();
        self.last
    }

    pub fn water_ok(&self) -> bool {
        self.last
    }

    #[cfg(target_os = "espidf")]
    fn read_gpio(&self) -> bool {
        unsafe { esp_idf_svc::sys::gpio_get_level(self.gpio) != 0 }
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_gpio(&self) -> bool {
        let _ = self.gpio;
        SIM_WATER.load(Ordering::Relaxed)
    }
}
