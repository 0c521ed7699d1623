use awg_manager::{
    bootstrap, config::Settings, keys::AwgCommand, peer_registry, qr, repair, runtime, Error,
};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("LOG_LEVEL", "info"))
        .format_target(false)
        .init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let mut settings = Settings::load(cli.settings.as_deref())?;
    if let Some(dir) = cli.config_dir {
        settings.config_dir = dir;
    }
    let keygen = AwgCommand::new(&settings.awg_command);
    match cli.cmd {
        Cmd::Init => {
            let done = bootstrap::ensure_server_initialized(&settings, &keygen)?;
            if !done.created_keys && !done.created_config {
                println!("Server already initialized in {}", settings.config_dir.display());
            }
        }
        Cmd::Serve => runtime::start(&settings)?,
        Cmd::Register { client_name } => {
            let reg = peer_registry::register(&settings, &keygen, &client_name)?;
            println!();
            println!("Client '{}' created successfully!", reg.name);
            println!();
            println!("Client configuration:");
            println!("  - Config file: {}", reg.config_path.display());
            println!("  - IP address: {}", reg.address);
            println!("  - Public key: {}", reg.public_key);
            println!("  - Server public key: {}", reg.server_public_key);
        }
        Cmd::RenderQr { client_name } => {
            println!("=== QR Code for client: {} ===", client_name);
            println!();
            match qr::render_client(&settings, &client_name) {
                Ok(out) => {
                    println!("{}", out.image);
                    println!();
                    println!("Scan this QR code with AmneziaWG mobile app");
                    if out.renderer == qr::Renderer::Library {
                        println!();
                        println!("TIP: For better quality, install qrencode");
                    }
                }
                Err(e @ Error::Qr(_)) => {
                    let path = settings.layout().client_conf(&client_name);
                    eprintln!("{}", qr::manual_instructions(&path));
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
        Cmd::ListPeers => {
            for p in peer_registry::list_peers(&settings)? {
                println!(
                    "{} {} {}",
                    p.name.as_deref().unwrap_or("-"),
                    p.allowed_ips,
                    p.public_key
                );
            }
        }
        Cmd::RepairKeys => match repair::repair_server_keys(&settings, &keygen)? {
            repair::RepairOutcome::AlreadyValid => println!("server.keys is valid; nothing to do"),
            repair::RepairOutcome::Repaired { public_key } => {
                println!("Updated server.keys with regenerated public key: {}", public_key)
            }
        },
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "awg-manager")]
#[command(version, about = "AmneziaWG server bootstrap and client registration")]
struct Cli {
    /// Shared configuration directory (server.conf, server.keys, clients/).
    #[arg(long, global = true, env = "CONFIG_DIR")]
    config_dir: Option<PathBuf>,
    /// Optional TOML settings file; environment variables override it.
    #[arg(long, global = true, env = "AWG_SETTINGS")]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create server keys and server.conf if missing.
    Init,
    /// Initialize, bring the interface up and run until signalled.
    Serve,
    /// Register a new client and print its details.
    Register { client_name: String },
    /// Print a client's config as a QR code.
    RenderQr { client_name: String },
    ListPeers,
    /// Regenerate a malformed PUBLIC_KEY in server.keys.
    RepairKeys,
}
