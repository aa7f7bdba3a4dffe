fn main() {
    // ESP-IDF build environment propagation. Host builds (tests,
    // simulation) skip this entirely.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
