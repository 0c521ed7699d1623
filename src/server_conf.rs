//! Loader/writer for `server.conf`.
//!
//! The file stays plain, human-editable text. It is parsed once into an
//! [`Interface`] plus an ordered list of [`PeerEntry`] records; new peers are
//! appended to the preserved raw text so operator comments survive.

use crate::{
    config::Obfuscation,
    error::{Error, Result},
    fsutil, wg,
};
use ipnetwork::Ipv4Network;
use std::{fmt, net::Ipv4Addr, path::Path, str::FromStr};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    pub private_key: Option<String>,
    pub address: Option<String>,
    pub listen_port: Option<u16>,
    pub dns: Option<String>,
    pub obfuscation: Obfuscation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerEntry {
    pub name: Option<String>,
    pub public_key: String,
    pub preshared_key: Option<String>,
    pub allowed_ips: String,
}

/// The first three octets of the server's `Address`; clients get `/32`s in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet([u8; 3]);

impl Subnet {
    pub fn host(&self, octet: u8) -> Ipv4Addr {
        Ipv4Addr::new(self.0[0], self.0[1], self.0[2], octet)
    }

    /// Host octet of `addr` when it lies in this subnet.
    pub fn host_octet(&self, addr: Ipv4Addr) -> Option<u8> {
        let o = addr.octets();
        (o[..3] == self.0).then_some(o[3])
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

#[derive(Debug, Clone)]
pub struct ServerConf {
    raw: String,
    pub interface: Interface,
    pub peers: Vec<PeerEntry>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Interface,
    Peer,
}

impl ServerConf {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(Error::io(path))?;
        Ok(Self::parse(raw))
    }

    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut interface = Interface::default();
        let mut obfuscation: Vec<(String, u32)> = Vec::new();
        let mut peers: Vec<PeerEntry> = Vec::new();
        let mut section = Section::None;

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if section == Section::Peer {
                    if let (Some(name), Some(peer)) =
                        (comment.trim().strip_prefix("Client:"), peers.last_mut())
                    {
                        peer.name = Some(name.trim().to_string());
                    }
                }
                continue;
            }
            if line.starts_with('[') {
                section = match line {
                    "[Interface]" => Section::Interface,
                    "[Peer]" => {
                        peers.push(PeerEntry::default());
                        Section::Peer
                    }
                    _ => Section::None,
                };
                continue;
            }
            let Some((key, value)) = line.split_once('=') else { continue };
            let (key, value) = (key.trim(), value.trim().to_string());
            match section {
                Section::Interface => match key {
                    "PrivateKey" => interface.private_key = Some(value),
                    "Address" => interface.address = Some(value),
                    "ListenPort" => interface.listen_port = value.parse().ok(),
                    "DNS" => interface.dns = Some(value),
                    k if Obfuscation::KEYS.contains(&k) => {
                        if let Ok(n) = value.parse() {
                            obfuscation.push((k.to_string(), n));
                        }
                    }
                    _ => {}
                },
                Section::Peer => {
                    if let Some(peer) = peers.last_mut() {
                        match key {
                            "PublicKey" => peer.public_key = value,
                            "PresharedKey" => peer.preshared_key = Some(value),
                            "AllowedIPs" => peer.allowed_ips = value,
                            _ => {}
                        }
                    }
                }
                Section::None => {}
            }
        }
        interface.obfuscation = Obfuscation::from_lookup(|k| {
            obfuscation.iter().find(|(name, _)| name == k).map(|(_, n)| *n)
        });
        Self { raw, interface, peers }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn subnet(&self) -> Result<Subnet> {
        let address = self.interface.address.as_deref().unwrap_or("");
        // Dual-stack lines list several CIDRs; the first IPv4 one is the subnet.
        let net = address
            .split(',')
            .map(str::trim)
            .filter(|cidr| cidr.contains('/'))
            .find_map(|cidr| Ipv4Network::from_str(cidr).ok())
            .ok_or_else(|| Error::UnparsableSubnet(address.to_string()))?;
        let o = net.ip().octets();
        Ok(Subnet([o[0], o[1], o[2]]))
    }

    /// Host octets of every `<subnet>.N/32` in the peers' `AllowedIPs`.
    pub fn assigned_hosts(&self, subnet: Subnet) -> Vec<u8> {
        self.peers
            .iter()
            .flat_map(|p| p.allowed_ips.split(','))
            .filter_map(|cidr| Ipv4Network::from_str(cidr.trim()).ok())
            .filter(|net| net.prefix() == 32)
            .filter_map(|net| subnet.host_octet(net.ip()))
            .collect()
    }

    pub fn append_peer(&mut self, peer: PeerEntry) {
        self.raw.push_str(&wg::render_peer_stanza(&peer));
        self.peers.push(peer);
    }

    /// Writes the file to its staging path; see [`fsutil::tmp_path`].
    pub fn stage(&self, path: &Path) -> Result<()> {
        fsutil::write_with_mode(&fsutil::tmp_path(path), &self.raw, 0o600)
    }
}
