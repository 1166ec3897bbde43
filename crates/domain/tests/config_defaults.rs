use sa_domain::config::Config;

#[test]
fn default_host_binds_all_interfaces() {
    let config = Config::default();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn toml_overrides_only_the_fields_it_sets() {
    let toml_str = r#"
[server]
host = "127.0.0.1"
ingress_port = 3210
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.ingress_port, 3210);
    assert_eq!(config.server.orchestrator_http_port, 8080);
}
