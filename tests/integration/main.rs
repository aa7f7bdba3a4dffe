//! Integration test driver for `tests/integration/`.
//!
//! Each `mod` below maps to a file that exercises a slice of the
//! orchestration core against the simulation adapters. All tests run
//! on the host with no real hardware required.

// Links the std critical-section implementation required by the
// embassy-sync primitives under test.
use critical_section as _;

mod boot_tests;
mod orchestration_tests;
