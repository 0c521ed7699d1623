use crate::{
    config::{Layout, Settings},
    error::Result,
    fsutil,
    keys::{KeyGenerator, KeyPair, ServerKeys},
    wg::{self, ServerTemplate},
};
use log::info;

/// What [`ensure_server_initialized`] had to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bootstrap {
    pub created_keys: bool,
    pub created_config: bool,
}

/**
 * @brief Create `server.keys` and `server.conf` when they are missing.
 * @param settings Network, port and obfuscation defaults for a new config.
 * @param keygen Key tool used only when `server.keys` is absent.
 * @return Which files were created; existing files are never touched.
 */
pub fn ensure_server_initialized(settings: &Settings, keygen: &dyn KeyGenerator) -> Result<Bootstrap> {
    let layout = settings.layout();
    fsutil::create_dir_with_mode(layout.root(), 0o755)?;
    fsutil::create_dir_with_mode(&layout.clients_dir(), 0o755)?;

    let mut outcome = Bootstrap::default();
    let keys_path = layout.server_keys();
    if keys_path.exists() {
        info!("using existing keys from {}", keys_path.display());
    } else {
        info!("generating server keys");
        let pair = KeyPair::generate(keygen)?;
        fsutil::write_with_mode(&keys_path, &ServerKeys::from_pair(&pair).render(), 0o600)?;
        info!("keys generated and saved to {}", keys_path.display());
        outcome.created_keys = true;
    }

    let conf_path = layout.server_conf();
    if conf_path.exists() {
        info!("using existing config: {}", conf_path.display());
    } else {
        info!("creating server configuration");
        let text = render_server_conf(settings, &layout)?;
        fsutil::write_with_mode(&conf_path, &text, 0o600)?;
        info!("server config created: {}", conf_path.display());
        outcome.created_config = true;
    }
    Ok(outcome)
}

fn render_server_conf(settings: &Settings, layout: &Layout) -> Result<String> {
    let keys_path = layout.server_keys();
    let keys = ServerKeys::load(&keys_path)?;
    let private_key = keys.private_key().ok_or(crate::Error::MissingField {
        field: ServerKeys::PRIVATE,
        path: keys_path.clone(),
    })?;
    let address = wg::server_address(&settings.vpn_network)?;
    let generated_at = chrono::Local::now().format("%c").to_string();
    Ok(ServerTemplate {
        private_key,
        address: &address,
        listen_port: settings.listen_port,
        obfuscation: settings.obfuscation,
        ext_interface: &settings.ext_interface,
        dns: &settings.dns,
        generated_at: &generated_at,
    }
    .render())
}
