use crate::{
    config::Obfuscation,
    error::{Error, Result},
    server_conf::PeerEntry,
};
use ipnetwork::Ipv4Network;
use std::{fmt::Write as _, net::Ipv4Addr, str::FromStr};

/**
 * @brief Derive the server's own VPN address from the network CIDR.
 * @param vpn_network Network in CIDR form, e.g. `10.201.0.0/24`.
 * @return `a.b.c.1/<mask>`.
 */
pub fn server_address(vpn_network: &str) -> Result<String> {
    let net = Ipv4Network::from_str(vpn_network)
        .ok()
        .filter(|_| vpn_network.contains('/'))
        .ok_or_else(|| Error::UnparsableSubnet(vpn_network.to_string()))?;
    let o = net.ip().octets();
    Ok(format!("{}.{}.{}.1/{}", o[0], o[1], o[2], net.prefix()))
}

fn push_obfuscation(out: &mut String, obf: &Obfuscation) {
    for (key, value) in Obfuscation::KEYS.iter().zip(obf.values()) {
        let _ = writeln!(out, "{key} = {value}");
    }
}

/// Inputs for a freshly bootstrapped `server.conf`.
#[derive(Debug, Clone)]
pub struct ServerTemplate<'a> {
    pub private_key: &'a str,
    pub address: &'a str,
    pub listen_port: u16,
    pub obfuscation: Obfuscation,
    pub ext_interface: &'a str,
    pub dns: &'a str,
    pub generated_at: &'a str,
}

impl ServerTemplate<'_> {
    pub fn render(&self) -> String {
        let ext = self.ext_interface;
        let mut out = String::new();
        let _ = write!(
            out,
            "# AmneziaWG Server Configuration\n\
             # Auto-generated on {}\n\
             \n\
             [Interface]\n\
             # Server's private key\n\
             PrivateKey = {}\n\
             \n\
             # Server's VPN IP address\n\
             Address = {}\n\
             \n\
             # UDP port for AmneziaWG\n\
             ListenPort = {}\n\
             \n\
             # AmneziaWG obfuscation parameters\n\
             # WARNING: These MUST match on ALL clients!\n",
            self.generated_at, self.private_key, self.address, self.listen_port
        );
        push_obfuscation(&mut out, &self.obfuscation);
        let _ = write!(
            out,
            "\n\
             # NAT and routing\n\
             PostUp = iptables -A FORWARD -i %i -j ACCEPT; iptables -A FORWARD -o %i -j ACCEPT; iptables -t nat -A POSTROUTING -o {ext} -j MASQUERADE\n\
             PostDown = iptables -D FORWARD -i %i -j ACCEPT; iptables -D FORWARD -o %i -j ACCEPT; iptables -t nat -D POSTROUTING -o {ext} -j MASQUERADE\n\
             \n\
             # DNS for clients\n\
             DNS = {}\n\
             \n\
             \n\
             ### Clients (Peers)\n\
             ### Managed automatically - do not edit manually\n\
             \n",
            self.dns
        );
        out
    }
}

/**
 * @brief Render the `[Peer]` stanza appended to `server.conf` for one client.
 * @param peer Peer record; `name` becomes a `# Client:` comment.
 */
pub fn render_peer_stanza(peer: &PeerEntry) -> String {
    let mut out = String::from("\n[Peer]\n");
    if let Some(name) = &peer.name {
        let _ = writeln!(out, "# Client: {name}");
    }
    let _ = writeln!(out, "PublicKey = {}", peer.public_key);
    if let Some(psk) = &peer.preshared_key {
        let _ = writeln!(out, "PresharedKey = {psk}");
    }
    let _ = writeln!(out, "AllowedIPs = {}", peer.allowed_ips);
    out
}

/// A client's `<name>.conf`, routing all traffic through the server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub private_key: String,
    pub address: Ipv4Addr,
    pub dns: String,
    pub obfuscation: Obfuscation,
    pub server_public_key: String,
    pub preshared_key: String,
    pub endpoint: String,
}

impl ClientConfig {
    pub fn render(&self) -> String {
        let mut out = String::from("[Interface]\n");
        let _ = writeln!(out, "PrivateKey = {}", self.private_key);
        let _ = writeln!(out, "Address = {}/32", self.address);
        let _ = writeln!(out, "DNS = {}", self.dns);
        push_obfuscation(&mut out, &self.obfuscation);
        out.push_str("\n[Peer]\n");
        let _ = writeln!(out, "PublicKey = {}", self.server_public_key);
        let _ = writeln!(out, "PresharedKey = {}", self.preshared_key);
        let _ = writeln!(out, "Endpoint = {}", self.endpoint);
        out.push_str("AllowedIPs = 0.0.0.0/0, ::/0\n");
        out.push_str("PersistentKeepalive = 25\n");
        out
    }
}
