use crate::exec::run_lenient;
use log::{debug, info, warn};
use std::path::Path;

/// Clamp TCP MSS to the path MTU.
const MSS_CLAMP: IptablesRule = IptablesRule {
    table: "mangle",
    chain: "FORWARD",
    spec: &["-p", "tcp", "--tcp-flags", "SYN,RST", "SYN", "-j", "TCPMSS", "--clamp-mss-to-pmtu"],
};

struct IptablesRule {
    table: &'static str,
    chain: &'static str,
    spec: &'static [&'static str],
}

impl IptablesRule {
    fn command(&self, action: &'static str) -> Vec<&'static str> {
        let mut argv = vec!["iptables", "-t", self.table, action, self.chain];
        argv.extend_from_slice(self.spec);
        argv
    }

    /// Appends the rule unless `iptables -C` already finds it.
    fn ensure(&self) -> bool {
        if run_lenient(&self.command("-C")).0 {
            debug!("iptables rule already present in {}/{}", self.table, self.chain);
            return true;
        }
        run_lenient(&self.command("-A")).0
    }
}

/// Best-effort host preparation before the interface comes up. In host
/// network mode some of these are not permitted; failures are only logged.
pub fn setup_forwarding() {
    info!("enabling IP forwarding");
    for key in ["net.ipv4.ip_forward=1", "net.ipv6.conf.all.forwarding=1"] {
        if !run_lenient(&["sysctl", "-w", key]).0 {
            warn!("sysctl -w {} failed (ignored)", key);
        }
    }
    if Path::new("/lib/modules").exists() {
        for module in ["tun", "wireguard"] {
            let _ = run_lenient(&["modprobe", "-q", module]);
        }
    }
    info!("configuring MSS clamping");
    if !MSS_CLAMP.ensure() {
        warn!("MSS clamping rule not installed (ignored)");
    }
}
