//! Remote shell target derivation
//!
//! An engine address is not always a usable login address: local engines sit
//! behind a socket and remote ones carry a scheme and port. These helpers turn
//! a host descriptor into the ordered list of addresses worth dialing.

use std::net::IpAddr;

use fleetdeck_api::models::HostDescriptor;

/// Name containers and the daemon use to reach the machine they run on
pub const DOCKER_HOST_GATEWAY: &str = "host.docker.internal";

/// Ordered, de-duplicated list of addresses to try for a host
///
/// Local hosts: the address IP (when it is one), then the gateway name.
/// Remote hosts: the hostname parsed out of the address, then the host id.
pub fn ssh_candidates(host: &HostDescriptor) -> Vec<String> {
    let parsed = parse_hostname(&host.address);
    let raw = if host.is_local {
        let ip = parsed.filter(|h| h.parse::<IpAddr>().is_ok());
        vec![ip, Some(DOCKER_HOST_GATEWAY.to_string())]
    } else {
        vec![parsed, Some(host.id.clone())]
    };

    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for candidate in raw.into_iter().flatten() {
        let candidate = candidate.trim().to_string();
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

/// Single display target for a host's remote shell
pub fn derive_ssh_host(host: &HostDescriptor) -> String {
    let parsed = parse_hostname(&host.address);
    if host.is_local {
        return parsed
            .filter(|h| h.parse::<IpAddr>().is_ok())
            .unwrap_or_else(|| DOCKER_HOST_GATEWAY.to_string());
    }
    parsed.unwrap_or_else(|| host.id.clone())
}

/// Extract the bare hostname from an engine address
///
/// Strips the scheme, any path, user-info and port. Socket addresses yield
/// `None`.
pub fn parse_hostname(address: &str) -> Option<String> {
    let rest = match address.split_once("://") {
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("unix") => return None,
        Some((_, rest)) => rest,
        None => address,
    };
    let rest = rest.split('/').next().unwrap_or_default();
    let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);

    let host = if let Some(bracketed) = rest.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else if rest.parse::<IpAddr>().is_ok() {
        rest
    } else {
        match rest.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => rest,
        }
    };

    let host = host.trim();
    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(id: &str, address: &str, is_local: bool) -> HostDescriptor {
        HostDescriptor::new(id, id, address, is_local)
    }

    #[test]
    fn test_parse_hostname_variants() {
        assert_eq!(
            parse_hostname("tcp://nas.lan:2375"),
            Some("nas.lan".to_string())
        );
        assert_eq!(
            parse_hostname("ssh://admin@10.0.0.4:22/path"),
            Some("10.0.0.4".to_string())
        );
        assert_eq!(parse_hostname("[fe80::1]:2375"), Some("fe80::1".to_string()));
        assert_eq!(parse_hostname("unix:///var/run/docker.sock"), None);
        assert_eq!(parse_hostname("tcp://:2375"), None);
    }

    #[test]
    fn test_remote_candidates_hostname_then_id() {
        let h = host("pi4", "tcp://192.168.1.20:2375", false);
        assert_eq!(ssh_candidates(&h), vec!["192.168.1.20", "pi4"]);
    }

    #[test]
    fn test_remote_candidates_dedup() {
        let h = host("nas", "tcp://nas:2375", false);
        assert_eq!(ssh_candidates(&h), vec!["nas"]);
    }

    #[test]
    fn test_local_candidates() {
        let socket = host("local", "unix:///var/run/docker.sock", true);
        assert_eq!(ssh_candidates(&socket), vec![DOCKER_HOST_GATEWAY]);

        let ip = host("local", "tcp://172.17.0.1:2375", true);
        assert_eq!(ssh_candidates(&ip), vec!["172.17.0.1", DOCKER_HOST_GATEWAY]);
    }

    #[test]
    fn test_remote_without_hostname_falls_back_to_id() {
        let h = host("edge", "tcp://:2375", false);
        assert_eq!(ssh_candidates(&h), vec!["edge"]);
        assert_eq!(derive_ssh_host(&h), "edge");
    }

    #[test]
    fn test_derive_ssh_host() {
        assert_eq!(
            derive_ssh_host(&host("local", "unix:///var/run/docker.sock", true)),
            DOCKER_HOST_GATEWAY
        );
        assert_eq!(
            derive_ssh_host(&host("pi4", "tcp://pi4.lan:2375", false)),
            "pi4.lan"
        );
    }
}
