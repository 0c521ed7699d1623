//! Key material: validation, the external key tool, and `server.keys`.

use crate::{
    error::{Error, Result},
    exec,
};
use base64::{engine::general_purpose, Engine as _};
use std::path::Path;

/// Length of a base64-encoded curve25519 key.
pub const KEY_B64_LEN: usize = 44;

/// Checks that `value` is a 44-character base64 encoding of 32 bytes.
pub fn validate_key(what: &'static str, value: &str) -> Result<()> {
    if value.len() != KEY_B64_LEN {
        return Err(Error::InvalidKeyLength { what, got: value.len(), expected: KEY_B64_LEN });
    }
    match general_purpose::STANDARD.decode(value) {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        _ => Err(Error::InvalidKeyEncoding { what }),
    }
}

/// Source of key material. Implementations return one base64 key per call.
pub trait KeyGenerator {
    fn generate_private_key(&self) -> Result<String>;
    fn derive_public_key(&self, private_key: &str) -> Result<String>;
    fn generate_preshared_key(&self) -> Result<String>;
}

/// `awg genkey|pubkey|genpsk`, optionally behind a prefix like `docker exec -i <container>`.
#[derive(Debug, Clone)]
pub struct AwgCommand {
    argv: Vec<String>,
}

impl AwgCommand {
    pub fn new(prefix: &str) -> Self {
        Self { argv: exec::split_command(prefix) }
    }

    fn call(&self, op: &str, stdin: Option<&str>) -> Result<String> {
        let mut argv = self.argv.clone();
        argv.push(op.to_string());
        exec::run(&argv, stdin)
    }
}

impl KeyGenerator for AwgCommand {
    fn generate_private_key(&self) -> Result<String> {
        self.call("genkey", None)
    }

    fn derive_public_key(&self, private_key: &str) -> Result<String> {
        self.call("pubkey", Some(private_key))
    }

    fn generate_preshared_key(&self) -> Result<String> {
        self.call("genpsk", None)
    }
}

/// A private/public pair, each validated by whoever constructs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl KeyPair {
    /// Generates and validates a fresh pair.
    pub fn generate(keygen: &dyn KeyGenerator) -> Result<Self> {
        let private_key = keygen.generate_private_key()?;
        validate_key("private key", &private_key)?;
        let public_key = keygen.derive_public_key(&private_key)?;
        validate_key("public key", &public_key)?;
        Ok(Self { private_key, public_key })
    }
}

/// Parsed `server.keys`: `KEY=value` lines, order preserved for rewrites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerKeys {
    lines: Vec<String>,
}

impl ServerKeys {
    pub const PRIVATE: &'static str = "PRIVATE_KEY";
    pub const PUBLIC: &'static str = "PUBLIC_KEY";

    pub fn parse(text: &str) -> Self {
        Self { lines: text.lines().map(str::to_string).collect() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(Error::io(path))?;
        Ok(Self::parse(&text))
    }

    pub fn from_pair(pair: &KeyPair) -> Self {
        Self {
            lines: vec![
                format!("{}={}", Self::PRIVATE, pair.private_key),
                format!("{}={}", Self::PUBLIC, pair.public_key),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            let (k, v) = line.trim().split_once('=')?;
            (k.trim() == name).then(|| v.trim())
        })
    }

    pub fn private_key(&self) -> Option<&str> {
        self.get(Self::PRIVATE)
    }

    pub fn public_key(&self) -> Option<&str> {
        self.get(Self::PUBLIC)
    }

    /// Replaces the `PUBLIC_KEY` line (appending one if absent).
    pub fn set_public_key(&mut self, value: &str) {
        let line = format!("{}={}", Self::PUBLIC, value);
        match self
            .lines
            .iter_mut()
            .find(|l| l.trim().split_once('=').map(|(k, _)| k.trim()) == Some(Self::PUBLIC))
        {
            Some(existing) => *existing = line,
            None => self.lines.push(line),
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}
