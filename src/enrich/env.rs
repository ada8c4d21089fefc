//! Environment and address derivation

use crate::compose::service::Role;
use crate::config::GlobalParameters;

/// Internal Vault endpoint
pub const VAULT_HOST: &str = "vault.priv";

/// Consul agent address
pub const CONSUL_ADDR: &str = "consul.priv:8500";

/// Domain external peer hosts live under
pub const PEER_DOMAIN: &str = "peer.articulate.zone";

/// Port the discovery layer routes to
pub const DISCOVERY_PORT: u16 = 3000;

/// Interval between discovery health checks
pub const DISCOVERY_CHECK_INTERVAL: &str = "15s";

/// Key part of a `KEY=VALUE` entry
pub fn env_key(entry: &str) -> &str {
    entry.split_once('=').map_or(entry, |(key, _)| key)
}

/// Append `key=value` unless a variable named `key` is already set
///
/// Returns whether the variable was appended.
pub fn push_unique(env: &mut Vec<String>, key: &str, value: &str) -> bool {
    push_entry(env, format!("{}={}", key, value))
}

/// Append a `KEY=VALUE` entry unless its key is already set
pub fn push_entry(env: &mut Vec<String>, entry: String) -> bool {
    let key = env_key(&entry);
    if env.iter().any(|existing| env_key(existing) == key) {
        tracing::debug!("Keeping existing {}", key);
        return false;
    }

    env.push(entry);
    true
}

/// URL scheme for internal endpoints; legacy accounts predate TLS
pub fn scheme(params: &GlobalParameters) -> &'static str {
    if params.is_legacy_account() {
        "http"
    } else {
        "https"
    }
}

/// Externally reachable host of the deployment
pub fn peer_host(params: &GlobalParameters) -> String {
    if params.is_legacy_account() {
        format!("{}.{}", params.build_name, PEER_DOMAIN)
    } else {
        format!("{}.{}.{}", params.build_name, params.account_name, PEER_DOMAIN)
    }
}

/// Externally reachable address of the deployment
pub fn peer_address(params: &GlobalParameters) -> String {
    format!("{}://{}", scheme(params), peer_host(params))
}

/// Identity and address variables every service receives
pub fn identity_vars(params: &GlobalParameters) -> Vec<(&'static str, String)> {
    vec![
        ("APP_NAME", params.app_name().to_string()),
        ("APP_ENV", format!("peer-{}", params.build_name)),
        ("VAULT_ADDR", format!("{}://{}", scheme(params), VAULT_HOST)),
        ("CONSUL_ADDR", CONSUL_ADDR.to_string()),
        ("PEER_HOST", peer_host(params)),
        (
            "PEER_DEPLOYMENT",
            format!("{}-{}", params.product_name, params.build_name),
        ),
    ]
}

/// Variables registering a service with the discovery and routing layer
pub fn discovery_vars(params: &GlobalParameters, service: &str, role: Role) -> Vec<(String, String)> {
    let prefix = format!("SERVICE_{}", DISCOVERY_PORT);
    let (name, tags) = match role {
        Role::Primary => (
            params.build_name.clone(),
            format!("urlprefix-{}/", peer_host(params)),
        ),
        Role::Secondary => (
            format!("{}-{}", params.build_name, service),
            format!("urlprefix-{}/{}", peer_host(params), service),
        ),
    };

    vec![
        (
            format!("{}_CHECK_INTERVAL", prefix),
            DISCOVERY_CHECK_INTERVAL.to_string(),
        ),
        (format!("{}_CHECK_TCP", prefix), "true".to_string()),
        (format!("{}_NAME", prefix), name),
        (format!("{}_TAGS", prefix), tags),
    ]
}
