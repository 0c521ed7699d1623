use crate::{
    config::Settings,
    error::{Error, Result},
    fsutil,
    keys::{validate_key, KeyGenerator, ServerKeys},
    lock::ConfigDirLock,
    server_conf::ServerConf,
};
use log::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    AlreadyValid,
    Repaired { public_key: String },
}

/// Rewrites a malformed `PUBLIC_KEY` in `server.keys` from the server's
/// private key (`PRIVATE_KEY`, else `PrivateKey` in `server.conf`).
pub fn repair_server_keys(settings: &Settings, keygen: &dyn KeyGenerator) -> Result<RepairOutcome> {
    let layout = settings.layout();
    let keys_path = layout.server_keys();
    if !keys_path.exists() {
        return Err(Error::NotInitialized(keys_path));
    }
    let _lock = ConfigDirLock::acquire(&layout.lock_file(), settings.lock_timeout())?;

    let mut keys = ServerKeys::load(&keys_path)?;
    if let Some(current) = keys.public_key() {
        if validate_key("server public key", current).is_ok() {
            return Ok(RepairOutcome::AlreadyValid);
        }
        warn!("server.keys contains an invalid public key ({} chars)", current.len());
    }

    let private = match keys.private_key() {
        Some(k) => k.to_string(),
        None => {
            let conf_path = layout.server_conf();
            if !conf_path.exists() {
                return Err(Error::MissingField { field: ServerKeys::PRIVATE, path: keys_path });
            }
            ServerConf::load(&conf_path)?
                .interface
                .private_key
                .ok_or(Error::MissingField { field: "PrivateKey", path: conf_path })?
        }
    };
    validate_key("server private key", &private)?;

    let public_key = keygen.derive_public_key(&private)?;
    validate_key("regenerated server public key", &public_key)?;
    keys.set_public_key(&public_key);
    fsutil::replace_atomic(&keys_path, &keys.render(), 0o600)?;
    info!("updated {} with regenerated public key", keys_path.display());
    Ok(RepairOutcome::Repaired { public_key })
}
