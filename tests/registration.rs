mod common;

use awg_manager::{peer_registry, server_conf::ServerConf, Error};
use common::{derive, FakeKeys, Fixture};
use std::{collections::HashSet, fs, net::Ipv4Addr};

#[test]
fn sequential_registrations_get_increasing_addresses() {
    let fx = Fixture::initialized();
    let keys = FakeKeys::default();
    let hosts: Vec<u8> = (0..6)
        .map(|i| {
            let reg = peer_registry::register(&fx.settings, &keys, &format!("client{i}")).unwrap();
            reg.address.octets()[3]
        })
        .collect();
    assert_eq!(hosts, vec![2, 3, 4, 5, 6, 7]);

    let conf = ServerConf::parse(fx.server_conf());
    assert_eq!(conf.peers.len(), 6);
    assert_eq!(conf.peers[0].name.as_deref(), Some("client0"));
    assert_eq!(conf.peers[5].allowed_ips, "10.201.0.7/32");
}

#[test]
fn next_address_follows_the_highest_not_the_gap() {
    let fx = Fixture::initialized();
    let mut text = fx.server_conf();
    for host in [2, 3, 5] {
        text.push_str(&format!("\n[Peer]\nPublicKey = k{host}\nAllowedIPs = 10.201.0.{host}/32\n"));
    }
    fx.write_server_conf(&text);

    let reg = peer_registry::register(&fx.settings, &FakeKeys::default(), "laptop").unwrap();
    assert_eq!(reg.address, Ipv4Addr::new(10, 201, 0, 6));
}

#[test]
fn registration_writes_client_record_and_peer() {
    let fx = Fixture::initialized();
    let reg = peer_registry::register(&fx.settings, &FakeKeys::default(), "phone").unwrap();

    let dir = fx.layout().client_dir("phone");
    assert_eq!(reg.client_dir, dir);
    let private = fs::read_to_string(dir.join("privatekey")).unwrap();
    let public = fs::read_to_string(dir.join("publickey")).unwrap();
    let psk = fs::read_to_string(dir.join("presharedkey")).unwrap();
    assert_eq!(public, derive(&private));
    assert_eq!(reg.public_key, public);

    let server = ServerConf::parse(fx.server_conf());
    let client = ServerConf::parse(fs::read_to_string(&reg.config_path).unwrap());
    assert_eq!(client.interface.private_key.as_deref(), Some(private.as_str()));
    assert_eq!(client.interface.address.as_deref(), Some("10.201.0.2/32"));
    assert_eq!(client.interface.obfuscation, server.interface.obfuscation);
    assert_eq!(client.peers.len(), 1);
    assert_eq!(client.peers[0].public_key, reg.server_public_key);
    assert_eq!(client.peers[0].preshared_key.as_deref(), Some(psk.as_str()));

    let text = fs::read_to_string(&reg.config_path).unwrap();
    assert!(text.contains("Endpoint = 203.0.113.7:51820\n"));
    assert!(text.contains("DNS = 1.1.1.1\n"));

    let peer = server.peers.last().unwrap();
    assert_eq!(peer.name.as_deref(), Some("phone"));
    assert_eq!(peer.public_key, public);
    assert_eq!(peer.preshared_key.as_deref(), Some(psk.as_str()));

    assert_eq!(fx.client_entries(), vec!["phone".to_string()]);
    let audit = fs::read_to_string(fx.layout().audit_log()).unwrap();
    assert!(audit.contains("registered phone 10.201.0.2"));
}

#[cfg(unix)]
#[test]
fn client_files_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let fx = Fixture::initialized();
    let reg = peer_registry::register(&fx.settings, &FakeKeys::default(), "phone").unwrap();
    let mode = |p: std::path::PathBuf| fs::metadata(p).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode(reg.client_dir.clone()), 0o700);
    for f in ["privatekey", "publickey", "presharedkey", "phone.conf"] {
        assert_eq!(mode(reg.client_dir.join(f)), 0o600, "{f}");
    }
    assert_eq!(mode(fx.layout().server_conf()), 0o600);
}

#[test]
fn uninitialized_server_is_rejected_without_side_effects() {
    let fx = Fixture::empty();
    let err = peer_registry::register(&fx.settings, &FakeKeys::default(), "phone").unwrap_err();
    assert!(matches!(err, Error::NotInitialized(_)));
    assert!(!fx.layout().root().exists());
}

#[test]
fn existing_client_is_rejected() {
    let fx = Fixture::initialized();
    let keys = FakeKeys::default();
    peer_registry::register(&fx.settings, &keys, "phone").unwrap();
    let before = fx.server_conf();

    let err = peer_registry::register(&fx.settings, &keys, "phone").unwrap_err();
    assert!(matches!(err, Error::ClientExists(name) if name == "phone"));
    assert_eq!(fx.server_conf(), before);
}

#[test]
fn path_like_names_are_rejected() {
    let fx = Fixture::initialized();
    let err = peer_registry::register(&fx.settings, &FakeKeys::default(), "../escape").unwrap_err();
    assert!(matches!(err, Error::InvalidClientName(_)));
}

#[test]
fn malformed_key_aborts_before_any_write() {
    for op in ["genkey", "pubkey", "genpsk"] {
        let fx = Fixture::initialized();
        let before = fx.server_conf();
        let err = peer_registry::register(&fx.settings, &FakeKeys::broken(op), "phone").unwrap_err();
        assert!(
            matches!(err, Error::InvalidKeyLength { got: 12, expected: 44, .. }),
            "{op}: {err:?}"
        );
        assert!(fx.client_entries().is_empty(), "{op}");
        assert_eq!(fx.server_conf(), before, "{op}");
        assert!(!fx.layout().audit_log().exists());
    }
}

#[test]
fn malformed_server_public_key_is_not_silently_repaired() {
    let fx = Fixture::initialized();
    let keys_path = fx.layout().server_keys();
    let private = fs::read_to_string(&keys_path).unwrap().lines().next().unwrap().to_string();
    let corrupted = format!("{private}\nPUBLIC_KEY=Enter passphrase:\n");
    fs::write(&keys_path, &corrupted).unwrap();

    let err = peer_registry::register(&fx.settings, &FakeKeys::default(), "phone").unwrap_err();
    assert!(matches!(err, Error::MalformedServerPublicKey { got: 17 }));
    assert_eq!(fs::read_to_string(&keys_path).unwrap(), corrupted);
    assert!(fx.client_entries().is_empty());
}

#[test]
fn missing_keys_file_derives_server_key_from_config() {
    let fx = Fixture::initialized();
    let conf = ServerConf::parse(fx.server_conf());
    let expected = derive(conf.interface.private_key.as_deref().unwrap());
    fs::remove_file(fx.layout().server_keys()).unwrap();

    let reg = peer_registry::register(&fx.settings, &FakeKeys::default(), "phone").unwrap();
    assert_eq!(reg.server_public_key, expected);
    assert!(!fx.layout().server_keys().exists());
}

#[test]
fn failure_after_staging_restores_previous_state() {
    let fx = Fixture::initialized();
    let before = fx.server_conf();
    // A directory in the way makes writing the staged server.conf fail.
    fs::create_dir(fx.layout().root().join("server.conf.tmp")).unwrap();

    let err = peer_registry::register(&fx.settings, &FakeKeys::default(), "phone").unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "{err:?}");
    let entries = fx.client_entries();
    assert!(!entries.iter().any(|e| e == "phone" || e.starts_with(".staging-")), "{entries:?}");
    assert_eq!(fx.server_conf(), before);
}

#[test]
fn unparsable_address_is_integrity_error() {
    let fx = Fixture::empty();
    fx.write_server_conf("[Interface]\nAddress = nonsense\n");
    let err = peer_registry::register(&fx.settings, &FakeKeys::default(), "phone").unwrap_err();
    assert!(matches!(err, Error::UnparsableSubnet(_)));
    assert!(fx.client_entries().is_empty());
}

#[test]
fn full_subnet_is_exhaustion_error() {
    let fx = Fixture::initialized();
    let mut text = fx.server_conf();
    text.push_str("\n[Peer]\nPublicKey = last\nAllowedIPs = 10.201.0.254/32\n");
    fx.write_server_conf(&text);
    let err = peer_registry::register(&fx.settings, &FakeKeys::default(), "phone").unwrap_err();
    assert!(matches!(err, Error::AddressPoolExhausted(_)));
}

#[test]
fn concurrent_registrations_never_share_an_address() {
    let fx = Fixture::initialized();
    let keys = FakeKeys::default();
    let settings = &fx.settings;
    let keys_ref = &keys;
    let addresses: Vec<Ipv4Addr> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                s.spawn(move || {
                    peer_registry::register(settings, keys_ref, &format!("c{i}")).unwrap().address
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<_> = addresses.iter().collect();
    assert_eq!(unique.len(), addresses.len());
    let conf = ServerConf::parse(fx.server_conf());
    let mut hosts = conf.assigned_hosts(conf.subnet().unwrap());
    assert_eq!(hosts.len(), 8);
    hosts.sort_unstable();
    assert_eq!(hosts, (2..=9).collect::<Vec<u8>>());
}

#[test]
fn list_peers_reports_registered_clients() {
    let fx = Fixture::initialized();
    let keys = FakeKeys::default();
    peer_registry::register(&fx.settings, &keys, "a").unwrap();
    peer_registry::register(&fx.settings, &keys, "b").unwrap();
    let peers = peer_registry::list_peers(&fx.settings).unwrap();
    let names: Vec<_> = peers.iter().map(|p| p.name.clone().unwrap()).collect();
    assert_eq!(names, vec!["a", "b"]);

    let empty = Fixture::empty();
    assert!(matches!(peer_registry::list_peers(&empty.settings), Err(Error::NotInitialized(_))));
}
