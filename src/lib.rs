/* \page ServerOverview Server Overview
AmneziaWG server tooling.

- Settings and directory layout (`config.rs`).
- Key validation, the `awg` key tool and `server.keys` (`keys.rs`).
- `server.conf` loader/writer (`server_conf.rs`) and templates (`wg.rs`).
- First-run initialization (`bootstrap.rs`).
- Client registration and IP allocation (`peer_registry.rs`) under the
  config-directory lock (`lock.rs`).
- Explicit server key repair (`repair.rs`).
- QR rendering of client configs (`qr.rs`).
- Foreground server process (`runtime.rs`, `nat.rs`).
*/
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod exec;
pub mod filelog;
pub mod fsutil;
pub mod keys;
pub mod lock;
pub mod nat;
pub mod peer_registry;
pub mod qr;
pub mod repair;
pub mod runtime;
pub mod server_conf;
pub mod wg;

pub use error::{Error, Result};
