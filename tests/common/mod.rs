#![allow(dead_code)]

use awg_manager::{bootstrap, config::Settings, keys::KeyGenerator, Result};
use base64::{engine::general_purpose, Engine as _};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Deterministic stand-in for `awg`: keys are base64 of a counter, and the
/// public key is the private key with every byte inverted.
#[derive(Default)]
pub struct FakeKeys {
    counter: AtomicU32,
    broken: Option<&'static str>,
}

impl FakeKeys {
    /// Returns a 12-character value from `op` ("genkey", "pubkey" or "genpsk").
    pub fn broken(op: &'static str) -> Self {
        Self { broken: Some(op), ..Self::default() }
    }

    fn next(&self, tag: u8) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut bytes = [tag; 32];
        bytes[..4].copy_from_slice(&n.to_le_bytes());
        general_purpose::STANDARD.encode(bytes)
    }

    fn check(&self, op: &str, value: String) -> Result<String> {
        if self.broken == Some(op) {
            return Ok("bm90LWEta2V5".to_string());
        }
        Ok(value)
    }
}

pub fn derive(private_key: &str) -> String {
    let mut bytes = general_purpose::STANDARD.decode(private_key).unwrap();
    bytes.iter_mut().for_each(|b| *b = !*b);
    general_purpose::STANDARD.encode(bytes)
}

impl KeyGenerator for FakeKeys {
    fn generate_private_key(&self) -> Result<String> {
        self.check("genkey", self.next(0x11))
    }

    fn derive_public_key(&self, private_key: &str) -> Result<String> {
        self.check("pubkey", derive(private_key))
    }

    fn generate_preshared_key(&self) -> Result<String> {
        self.check("genpsk", self.next(0x33))
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub settings: Settings,
}

impl Fixture {
    /// Settings rooted in a fresh temp dir; nothing created yet.
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            config_dir: dir.path().join("config"),
            vpn_network: "10.201.0.0/24".into(),
            server_ip: "203.0.113.7".into(),
            lock_timeout_secs: 5,
            ..Settings::default()
        };
        Self { dir, settings }
    }

    /// Bootstrapped server directory.
    pub fn initialized() -> Self {
        let fx = Self::empty();
        bootstrap::ensure_server_initialized(&fx.settings, &FakeKeys::default()).unwrap();
        fx
    }

    pub fn layout(&self) -> awg_manager::config::Layout {
        self.settings.layout()
    }

    pub fn server_conf(&self) -> String {
        std::fs::read_to_string(self.layout().server_conf()).unwrap()
    }

    pub fn write_server_conf(&self, text: &str) {
        std::fs::create_dir_all(self.layout().root()).unwrap();
        std::fs::write(self.layout().server_conf(), text).unwrap();
    }

    /// Names under `clients/`, including any leftovers from staging.
    pub fn client_entries(&self) -> Vec<String> {
        match std::fs::read_dir(self.layout().clients_dir()) {
            Ok(rd) => {
                let mut v: Vec<String> =
                    rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect();
                v.sort();
                v
            }
            Err(_) => Vec::new(),
        }
    }
}
