//! Diagnostic checks for the `doctor` subcommand: config file presence,
//! config validation, and a live dial of the ingress-link RPC listener
//! this process will push events to.

use sa_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("sa-orchestrator doctor");
    println!("=======================\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_store(&mut all_passed);
    check_ingress_link(config, &mut all_passed).await;

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

/// The in-memory store has no external connection to attempt; it is
/// always ready once constructed. Reported as its own check so a future
/// persistent store backend has a slot to report real connectivity.
fn check_store(all_passed: &mut bool) {
    let _store = sa_domain::store::InMemoryStore::new();
    print_check("Run/event store", true, "in-memory (ready)".into());
    *all_passed = *all_passed && true;
}

async fn check_ingress_link(config: &Config, all_passed: &mut bool) {
    let addr = format!("{}:{}", config.ingress_link.host, config.ingress_link.rpc_port);
    let reachable = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        tokio::net::TcpStream::connect(&addr),
    )
    .await
    .map(|r| r.is_ok())
    .unwrap_or(false);

    print_check(
        "Ingress link reachable",
        reachable,
        if reachable {
            addr
        } else {
            format!("{addr} (unreachable)")
        },
    );

    if !reachable {
        *all_passed = false;
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
