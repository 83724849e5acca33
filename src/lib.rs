//! # Pico W Weather Station Runtime
//!
//! `picow-weather` is a `no_std` connectivity-and-telemetry runtime for a
//! Raspberry Pi Pico W weather station, built upon the
//! [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Runs on the bare-metal Pico W without a
//!   standard library or dynamic memory allocation. Buffers are managed
//!   using `heapless`.
//! - **Fully Async:** Built with `async/await` on Embassy timers and
//!   networking, so the command poll, telemetry cycle and status page never
//!   block each other.
//! - **Rust 2024 Edition:** Uses native `async fn` in traits, removing the
//!   need for `async-trait`.
//! - **Hardware Behind Ports:** The wireless driver, sensor suite, core-temp
//!   ADC and indicator LED all sit behind small traits ([`wifi::NetLink`],
//!   [`sensor::WeatherSensor`], [`sensor::CoreTempAdc`],
//!   `embedded_hal::digital::OutputPin`), so the whole runtime is testable
//!   on the host.
//! - **Restart Over Repair:** Broker and link failures invalidate the
//!   session; the documented recovery is cool down and restart the process
//!   rather than patching up half-dead connections.
//!
//! ## Startup Sequence
//!
//! The firmware binary wires the pieces together in this order:
//!
//! ```ignore
//! let config = StationConfig::new(SSID, PASSWORD, BROKER, ID, "station", "station/led");
//! let _net = wifi::connect(&mut link, &mut led_pin, &mut delay, &config.wifi()).await?;
//! match timesync::fetch_ntp_time(stack, config.ntp_host, config.utc_offset_hours, timeout).await {
//!     Ok(unix) => set_rtc(unix),
//!     Err(e) => log::warn!("time sync failed: {e:?}, keeping previous clock"),
//! }
//! let session = BrokerSession::connect(transport, &config.broker_options()).await?;
//! let mut agent = WeatherAgent::new(session, sensor, adc, led, &config, Instant::now());
//! agent.subscribe_control().await?;
//! agent.run().await
//! ```
//!
//! On any `BrokerError` the binary logs it, sleeps
//! [`broker::RESTART_COOLDOWN`] and resets the device.

#![cfg_attr(not(test), no_std)]

pub mod agent;
pub mod broker;
pub mod command;
pub mod config;
pub mod error;
pub mod httpd;
pub mod metrics;
pub mod packet;
pub mod scheduler;
pub mod sensor;
pub mod timesync;
pub mod transport;
pub mod wifi;

// Re-export key types for easier access at the crate root.
pub use agent::WeatherAgent;
pub use broker::{BrokerOptions, BrokerSession};
pub use command::{Command, LedControl};
pub use config::StationConfig;
pub use error::{BrokerError, ConnectivityError, SensorError, TimeSyncError};
pub use transport::TcpTransport;
