use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// AmneziaWG junk-packet and header-mangling parameters. They must be
/// identical in the server config and every client config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Obfuscation {
    pub jc: u32,
    pub jmin: u32,
    pub jmax: u32,
    pub s1: u32,
    pub s2: u32,
    pub h1: u32,
    pub h2: u32,
    pub h3: u32,
    pub h4: u32,
}

impl Default for Obfuscation {
    fn default() -> Self {
        Self { jc: 4, jmin: 50, jmax: 1000, s1: 0, s2: 0, h1: 1, h2: 2, h3: 3, h4: 4 }
    }
}

impl Obfuscation {
    /// Config-file keys, in the order they are rendered.
    pub const KEYS: [&'static str; 9] = ["Jc", "Jmin", "Jmax", "S1", "S2", "H1", "H2", "H3", "H4"];

    pub fn values(&self) -> [u32; 9] {
        [self.jc, self.jmin, self.jmax, self.s1, self.s2, self.h1, self.h2, self.h3, self.h4]
    }

    /// Builds the parameter set from a per-key lookup; absent keys become 0.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<u32>) -> Self {
        let v: Vec<u32> = Self::KEYS.iter().map(|k| lookup(k).unwrap_or(0)).collect();
        Self { jc: v[0], jmin: v[1], jmax: v[2], s1: v[3], s2: v[4], h1: v[5], h2: v[6], h3: v[7], h4: v[8] }
    }

    fn slot(&mut self, key: &str) -> Option<&mut u32> {
        Some(match key {
            "Jc" => &mut self.jc,
            "Jmin" => &mut self.jmin,
            "Jmax" => &mut self.jmax,
            "S1" => &mut self.s1,
            "S2" => &mut self.s2,
            "H1" => &mut self.h1,
            "H2" => &mut self.h2,
            "H3" => &mut self.h3,
            "H4" => &mut self.h4,
            _ => return None,
        })
    }
}

/// Runtime settings: defaults, then an optional TOML file, then environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub interface: String,
    pub vpn_network: String,
    pub listen_port: u16,
    pub ext_interface: String,
    pub dns: String,
    pub server_ip: String,
    /// Command prefix for the key tool, e.g. `docker exec -i amneziawg-server awg`.
    pub awg_command: String,
    pub lock_timeout_secs: u64,
    pub stats_interval_secs: u64,
    pub obfuscation: Obfuscation,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("./config"),
            interface: "awg0".into(),
            vpn_network: "10.8.0.0/24".into(),
            listen_port: 51820,
            ext_interface: "eth0".into(),
            dns: "1.1.1.1".into(),
            server_ip: "YOUR_SERVER_IP".into(),
            awg_command: "awg".into(),
            lock_timeout_secs: 30,
            stats_interval_secs: 300,
            obfuscation: Obfuscation::default(),
        }
    }
}

impl Settings {
    /// Loads settings from `path` (when given) and overlays the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => {
                let s = fs::read_to_string(p).map_err(Error::io(p))?;
                toml::from_str(&s).map_err(|e| Error::Settings(format!("{}: {}", p.display(), e)))?
            }
            None => Settings::default(),
        };
        settings.apply_env(|k| std::env::var(k).ok())?;
        Ok(settings)
    }

    /// Overrides fields from environment-style variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let text = |key: &str, field: &mut String| {
            if let Some(v) = lookup(key) {
                *field = v;
            }
        };
        text("INTERFACE", &mut self.interface);
        text("VPN_NETWORK", &mut self.vpn_network);
        text("EXT_INTERFACE", &mut self.ext_interface);
        text("DNS", &mut self.dns);
        text("SERVER_IP", &mut self.server_ip);
        text("AWG_COMMAND", &mut self.awg_command);
        if let Some(v) = lookup("CONFIG_DIR") {
            self.config_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LISTEN_PORT") {
            self.listen_port = parse_number("LISTEN_PORT", &v)?;
        }
        if let Some(v) = lookup("LOCK_TIMEOUT_SECS") {
            self.lock_timeout_secs = parse_number("LOCK_TIMEOUT_SECS", &v)?;
        }
        for key in Obfuscation::KEYS {
            let var = format!("AWG_{}", key.to_uppercase());
            if let Some(v) = lookup(&var) {
                let n = parse_number(&var, &v)?;
                if let Some(slot) = self.obfuscation.slot(key) {
                    *slot = n;
                }
            }
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.config_dir)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Settings(format!("{key}={value}: {e}")))
}

/// File layout of the shared configuration directory.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn server_conf(&self) -> PathBuf {
        self.root.join("server.conf")
    }

    pub fn server_keys(&self) -> PathBuf {
        self.root.join("server.keys")
    }

    pub fn clients_dir(&self) -> PathBuf {
        self.root.join("clients")
    }

    pub fn client_dir(&self, name: &str) -> PathBuf {
        self.clients_dir().join(name)
    }

    pub fn client_conf(&self, name: &str) -> PathBuf {
        self.client_dir(name).join(format!("{name}.conf"))
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".add-client.lock")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.root.join("registrations.log")
    }
}
