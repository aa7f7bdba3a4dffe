//! Feed drum driver.
//!
//! Feed requests arrive through a single-slot mailbox and are consumed
//! exactly once by the feeder loop; a request that lands while another
//! is already queued overwrites it (last writer wins), which matches
//! the feed button's intent — there is no point queueing two feeds.
//!
//! One feed cycle runs `step_count` batches of `step_fwd` forward
//! pulses followed by `step_rev` reverse pulses. The back-and-forth
//! motion shakes pellets loose instead of compacting them against the
//! drum wall. The pulse train itself goes through [`StepperPort`];
//! the RMT backend blocks on hardware completion, so the loop holds no
//! locks while the drum is physically moving.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{info, warn};

use crate::Error;
use crate::app::commands::FeedRequest;
use crate::app::ports::StepperPort;
use crate::config::MIN_FEED_SPEED;

/// Single-slot feed request mailbox. Producers: HTTP path, bus path,
/// scheduler delegate. Consumer: the feeder loop.
pub struct FeedMailbox {
    slot: Signal<CriticalSectionRawMutex, FeedRequest>,
}

impl FeedMailbox {
    pub const fn new() -> Self {
        Self {
            slot: Signal::new(),
        }
    }

    pub fn request(&self, req: FeedRequest) {
        self.slot.signal(req);
    }

    /// Take the pending request, if any. Consuming resets the slot.
    pub fn try_take(&self) -> Option<FeedRequest> {
        self.slot.try_take()
    }
}

impl Default for FeedMailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// The feeder actuator.
pub struct FeederDriver<P: StepperPort> {
    stepper: P,
    feeds_completed: u32,
}

impl<P: StepperPort> FeederDriver<P> {
    pub fn new(stepper: P) -> Self {
        Self {
            stepper,
            feeds_completed: 0,
        }
    }

    /// Execute one feed cycle. Blocks for the duration of the drum
    /// motion.
    pub fn run_cycle(&mut self, req: &FeedRequest) -> Result<(), Error> {
        let params = req.params.clamped();
        if params.speed != req.params.speed {
            warn!("feeder: speed {} below floor, clamped to {MIN_FEED_SPEED}", req.params.speed);
        }
        info!(
            "feeder: running {} batches ({} fwd / {} rev) at speed {}",
            params.step_count, params.step_fwd, params.step_rev, params.speed
        );

        self.stepper.set_enabled(true);
        let result = self.run_batches(&params);
        self.stepper.set_enabled(false);
        result?;

        self.feeds_completed += 1;
        info!("feeder: cycle done ({} total)", self.feeds_completed);
        Ok(())
    }

    pub fn feeds_completed(&self) -> u32 {
        self.feeds_completed
    }

    fn run_batches(&mut self, params: &crate::config::FeederParams) -> Result<(), Error> {
        for _ in 0..params.step_count {
            self.stepper.set_direction(true);
            self.stepper.pulse(params.step_fwd, params.speed)?;
            self.stepper.set_direction(false);
            self.stepper.pulse(params.step_rev, params.speed)?;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// RMT stepper backend (ESP-IDF)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub mod rmt {
    //! DRV8825 stepper over the RMT pulse generator.
    //!
    //! EN and DIR are plain GPIOs; STEP is driven by a one-item RMT
    //! train per pulse, waiting on hardware completion like the
    //! board's proven bring-up sequence does.

    use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
    use esp_idf_hal::rmt::config::TransmitConfig;
    use esp_idf_hal::rmt::{FixedLengthSignal, PinState, Pulse, PulseTicks, RmtChannel, TxRmtDriver};

    use crate::Error;
    use crate::app::ports::StepperPort;

    pub struct RmtStepper<'d> {
        tx: TxRmtDriver<'d>,
        en: PinDriver<'d, AnyOutputPin, Output>,
        dir: PinDriver<'d, AnyOutputPin, Output>,
    }

    impl<'d> RmtStepper<'d> {
        pub fn new(
            channel: impl esp_idf_hal::peripheral::Peripheral<P = impl RmtChannel> + 'd,
            step_pin: impl esp_idf_hal::peripheral::Peripheral<P = impl esp_idf_hal::gpio::OutputPin> + 'd,
            en: AnyOutputPin,
            dir: AnyOutputPin,
        ) -> Result<Self, Error> {
            let config = TransmitConfig::new().clock_divider(1);
            let tx = TxRmtDriver::new(channel, step_pin, &config)
                .map_err(|_| Error::Peripheral("rmt install"))?;
            let mut en = PinDriver::output(en).map_err(|_| Error::Peripheral("en pin"))?;
            let dir = PinDriver::output(dir).map_err(|_| Error::Peripheral("dir pin"))?;
            // Disabled (active-low EN high) until a feed runs.
            en.set_high().map_err(|_| Error::Peripheral("en pin"))?;
            Ok(Self { tx, en, dir })
        }
    }

    impl StepperPort for RmtStepper<'_> {
        fn set_enabled(&mut self, on: bool) {
            let _ = if on {
                self.en.set_low()
            } else {
                self.en.set_high()
            };
        }

        fn set_direction(&mut self, forward: bool) {
            let _ = if forward {
                self.dir.set_high()
            } else {
                self.dir.set_low()
            };
        }

        fn pulse(&mut self, count: u16, half_period: u16) -> Result<(), Error> {
            let ticks = PulseTicks::new(half_period).map_err(|_| Error::Peripheral("pulse ticks"))?;
            let high = Pulse::new(PinState::High, ticks);
            let low = Pulse::new(PinState::Low, ticks);
            let mut signal = FixedLengthSignal::<1>::new();
            signal
                .set(0, &(high, low))
                .map_err(|_| Error::Peripheral("rmt signal"))?;
            for _ in 0..count {
                self.tx
                    .start_blocking(&signal)
                    .map_err(|_| Error::Peripheral("rmt tx"))?;
            }
            Ok(())
        }
    }
}
