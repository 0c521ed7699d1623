use crate::{
    config::Settings,
    error::{Error, Result},
    exec, peer_registry,
};
use log::debug;
use qrcode::{render::unicode, QrCode};
use std::path::PathBuf;

/// Which renderer produced the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
    Qrencode,
    Library,
}

#[derive(Debug, Clone)]
pub struct RenderedQr {
    pub renderer: Renderer,
    pub image: String,
    pub config_path: PathBuf,
}

/**
 * @brief Render a client's config as a terminal QR code.
 * @param settings Provides the configuration directory.
 * @param name Client identifier.
 * @return The rendered code; `qrencode` is preferred, the `qrcode` crate is the fallback.
 */
pub fn render_client(settings: &Settings, name: &str) -> Result<RenderedQr> {
    peer_registry::validate_client_name(name)?;
    let config_path = settings.layout().client_conf(name);
    if !config_path.exists() {
        return Err(Error::ClientNotFound { name: name.to_string(), path: config_path });
    }
    let text = std::fs::read_to_string(&config_path).map_err(Error::io(&config_path))?;
    let (renderer, image) = render_text(&text, &["qrencode", "-t", "ansiutf8"])?;
    Ok(RenderedQr { renderer, image, config_path })
}

/// Pipes `text` to `external`, falling back to in-process encoding.
pub fn render_text(text: &str, external: &[&str]) -> Result<(Renderer, String)> {
    let argv: Vec<String> = external.iter().map(|s| s.to_string()).collect();
    match exec::run(&argv, Some(text)) {
        Ok(out) if !out.is_empty() => return Ok((Renderer::Qrencode, out)),
        Ok(_) => debug!("{} produced no output", argv.join(" ")),
        Err(e) => debug!("external qr renderer unavailable: {}", e),
    }
    let code = QrCode::new(text.as_bytes()).map_err(|e| Error::Qr(e.to_string()))?;
    // Light-on-dark so phone cameras read it from a dark terminal.
    let image = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();
    Ok((Renderer::Library, image))
}

/// Shown when no renderer could encode the config.
pub fn manual_instructions(config_path: &std::path::Path) -> String {
    format!(
        "Please install qrencode (recommended):\n  apt install qrencode  # Debian/Ubuntu\n  yum install qrencode  # CentOS/RHEL\n\nOr manually show the config file:\n  cat {}",
        config_path.display()
    )
}
