use crate::{
    config::{Layout, Settings},
    error::{Error, Result},
    filelog, fsutil,
    keys::{validate_key, KeyGenerator, KeyPair, ServerKeys},
    lock::ConfigDirLock,
    server_conf::{PeerEntry, ServerConf},
    wg::ClientConfig,
};
use log::{debug, info, warn};
use std::{
    fs,
    net::Ipv4Addr,
    path::{Path, PathBuf},
};

/// Highest host octet handed to a client; `.255` is broadcast.
const LAST_HOST: u8 = 254;
/// `.1` belongs to the server.
const FIRST_CLIENT_HOST: u8 = 2;

/// A committed client registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub address: Ipv4Addr,
    pub client_dir: PathBuf,
    pub config_path: PathBuf,
    pub public_key: String,
    pub server_public_key: String,
}

/**
 * @brief Check a client name is safe to use as a directory name.
 * @param name Client identifier given on the command line.
 */
pub fn validate_client_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidClientName(name.to_string()))
    }
}

/**
 * @brief Pick the host octet for the next client.
 * @param existing Host octets already present in `AllowedIPs`.
 * @return `max(existing) + 1` (at least 2), or `None` once the /24 is full.
 */
pub fn next_host(existing: &[u8]) -> Option<u8> {
    let next = existing.iter().max().map_or(FIRST_CLIENT_HOST, |m| m.saturating_add(1));
    let next = next.max(FIRST_CLIENT_HOST);
    (next <= LAST_HOST).then_some(next)
}

/**
 * @brief List peers recorded in `server.conf`.
 * @param settings Provides the configuration directory.
 */
pub fn list_peers(settings: &Settings) -> Result<Vec<PeerEntry>> {
    let layout = settings.layout();
    let path = layout.server_conf();
    if !path.exists() {
        return Err(Error::NotInitialized(path));
    }
    Ok(ServerConf::load(&path)?.peers)
}

fn check_preconditions(layout: &Layout, name: &str) -> Result<()> {
    let conf = layout.server_conf();
    if !conf.exists() {
        return Err(Error::NotInitialized(conf));
    }
    if layout.client_dir(name).exists() {
        return Err(Error::ClientExists(name.to_string()));
    }
    Ok(())
}

/**
 * @brief Register a new client: allocate an IP, create keys and config, add the peer.
 * @param settings Config directory, endpoint host and lock timeout.
 * @param keygen Key tool used for the client keys (and the server key fallback).
 * @param name Client identifier; becomes `clients/<name>/`.
 * @return The committed registration.
 *
 * Runs under [`ConfigDirLock`]. Nothing becomes visible until every key is
 * validated and every file is staged; a failure leaves the config
 * directory as it was.
 */
pub fn register(settings: &Settings, keygen: &dyn KeyGenerator, name: &str) -> Result<Registration> {
    validate_client_name(name)?;
    let layout = settings.layout();
    check_preconditions(&layout, name)?;

    let _lock = ConfigDirLock::acquire(&layout.lock_file(), settings.lock_timeout())?;
    // Another registration may have won the race for this name.
    check_preconditions(&layout, name)?;

    let conf_path = layout.server_conf();
    let mut conf = ServerConf::load(&conf_path)?;
    let subnet = conf.subnet()?;
    let host = next_host(&conf.assigned_hosts(subnet))
        .ok_or_else(|| Error::AddressPoolExhausted(subnet.to_string()))?;
    let address = subnet.host(host);
    info!("assigned IP {} to '{}'", address, name);

    let client = KeyPair::generate(keygen)?;
    let preshared_key = keygen.generate_preshared_key()?;
    validate_key("preshared key", &preshared_key)?;
    debug!("client keys generated");

    let server_public_key = resolve_server_public_key(&layout, &conf, keygen)?;

    let client_conf = ClientConfig {
        private_key: client.private_key.clone(),
        address,
        dns: conf.interface.dns.clone().unwrap_or_else(|| settings.dns.clone()),
        obfuscation: conf.interface.obfuscation,
        server_public_key: server_public_key.clone(),
        preshared_key: preshared_key.clone(),
        endpoint: format!(
            "{}:{}",
            settings.server_ip,
            conf.interface.listen_port.unwrap_or(settings.listen_port)
        ),
    };
    conf.append_peer(PeerEntry {
        name: Some(name.to_string()),
        public_key: client.public_key.clone(),
        preshared_key: Some(preshared_key.clone()),
        allowed_ips: format!("{address}/32"),
    });

    let rendered = client_conf.render();
    let staging = Staging::new(&layout, name);
    fsutil::create_dir_with_mode(&staging.dir, 0o700)?;
    for (file, contents) in [
        ("privatekey".to_string(), client.private_key.as_str()),
        ("publickey".to_string(), client.public_key.as_str()),
        ("presharedkey".to_string(), preshared_key.as_str()),
        (format!("{name}.conf"), rendered.as_str()),
    ] {
        fsutil::write_with_mode(&staging.dir.join(file), contents, 0o600)?;
    }
    conf.stage(&conf_path)?;

    let client_dir = layout.client_dir(name);
    staging.commit(&client_dir, &conf_path)?;

    filelog::write_line(&layout.audit_log(), &format!("registered {} {} {}", name, address, client.public_key));
    info!("client '{}' created", name);
    Ok(Registration {
        name: name.to_string(),
        address,
        config_path: layout.client_conf(name),
        client_dir,
        public_key: client.public_key,
        server_public_key,
    })
}

/// Server public key for client configs. Never writes `server.keys`; a
/// malformed key there is left for `repair-keys`.
fn resolve_server_public_key(layout: &Layout, conf: &ServerConf, keygen: &dyn KeyGenerator) -> Result<String> {
    let keys_path = layout.server_keys();
    if keys_path.exists() {
        let keys = ServerKeys::load(&keys_path)?;
        let public = keys
            .public_key()
            .ok_or(Error::MissingField { field: ServerKeys::PUBLIC, path: keys_path.clone() })?;
        return match validate_key("server public key", public) {
            Ok(()) => Ok(public.to_string()),
            Err(_) => Err(Error::MalformedServerPublicKey { got: public.len() }),
        };
    }
    let private = conf
        .interface
        .private_key
        .as_deref()
        .ok_or(Error::MissingField { field: "PrivateKey", path: layout.server_conf() })?;
    let public = keygen.derive_public_key(private)?;
    validate_key("server public key", &public)?;
    Ok(public)
}

/// Client directory and `server.conf` replacement staged side by side.
/// Dropping without [`Staging::commit`] removes both.
struct Staging {
    dir: PathBuf,
    conf_tmp: PathBuf,
    done: bool,
}

impl Staging {
    fn new(layout: &Layout, name: &str) -> Self {
        Self {
            dir: layout
                .clients_dir()
                .join(format!(".staging-{}-{}", name, std::process::id())),
            conf_tmp: fsutil::tmp_path(&layout.server_conf()),
            done: false,
        }
    }

    fn commit(mut self, client_dir: &Path, conf_path: &Path) -> Result<()> {
        fs::rename(&self.dir, client_dir).map_err(Error::io(client_dir))?;
        if let Err(e) = fs::rename(&self.conf_tmp, conf_path) {
            if let Err(undo) = fs::remove_dir_all(client_dir) {
                warn!("could not roll back {}: {}", client_dir.display(), undo);
            }
            return Err(Error::Io { path: conf_path.to_path_buf(), source: e });
        }
        self.done = true;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if self.dir.exists() {
            let _ = fs::remove_dir_all(&self.dir);
        }
        if self.conf_tmp.exists() {
            let _ = fs::remove_file(&self.conf_tmp);
        }
    }
}
