//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter   | Implements      | Connects to                       |
//! |-----------|-----------------|-----------------------------------|
//! | `storage` | StoragePort     | SPIFFS JSON files / in-memory map |
//! | `system`  | SystemPort      | heap stats, restart, OTA          |
//! | `time`    | Clock           | system wall clock / fake clock    |
//! | `netif`   | NetifPort       | WiFi + Ethernet stacks / sim      |
//! | `bus`     | BusPort         | MQTT client / recording sim       |
//! | `sntp`    | —               | SNTP client (one-shot start)      |
//! | `rlog`    | —               | UDP remote log collector          |
//! | `http`    | —               | HTTP server routing shim          |

pub mod bus;
pub mod http;
pub mod netif;
pub mod rlog;
pub mod sntp;
pub mod storage;
pub mod system;
pub mod time;
