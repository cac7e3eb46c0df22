//! Startup banner

use super::config::{AppConfig, ServiceRole, is_all_interfaces};
use super::constants::APP_NAME;

/// Print the service endpoints and the broker the services talk to
pub fn print_banner(config: &AppConfig, roles: &[ServiceRole]) {
    // Use localhost for display when binding to all interfaces
    let host = &config.server.host;
    let display_host = if is_all_interfaces(host) {
        "localhost"
    } else {
        host.as_str()
    };
    const W: usize = 10;

    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();

    for role in roles {
        let base = format!("http://{}:{}", display_host, config.server.port(*role));
        let routes = match role {
            ServiceRole::Producer => "POST /send, GET /health",
            ServiceRole::Consumer => "GET /messages, GET /health",
        };
        println!(
            "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {} \x1b[90m({})\x1b[0m",
            format!("{}:", capitalize(&role.to_string())),
            base,
            routes
        );
    }

    println!(
        "  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {} \x1b[90m({}, topic {})\x1b[0m",
        "Broker:", config.broker.brokers, config.broker.backend, config.broker.topic
    );
    println!();
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("producer"), "Producer");
        assert_eq!(capitalize(""), "");
    }
}
