use std::env;
use std::fs;

use crate::config::{self, AppConfig};

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.database.url, "sqlite://data/bookstock.db");
    assert_eq!(config.database.max_connections, 16);
    assert_eq!(config.auth.token_ttl_secs, 86_400);
    assert_eq!(config.uploads.dir, "uploads");
    assert_eq!(config.uploads.max_file_size, 5 * 1024 * 1024);
    assert_eq!(config.cors.origins, vec!["http://localhost:4028".to_string()]);
    assert!(config.security.is_none());
    assert!(!config.server.trust_proxy);
    assert_eq!(config.auth.bcrypt_cost, 10);
}

#[test]
fn test_defaults_ship_no_credentials() {
    let config = AppConfig::default();
    assert!(config.auth.jwt_secret.is_empty());
    assert!(config.auth.admin_email.is_none());
    assert!(config.auth.admin_password.is_none());

    let err = config::validate(&config).unwrap_err().to_string();
    assert!(err.contains("auth.jwt_secret is required"), "{err}");
}

#[test]
fn test_validation_rejects_bad_values() {
    let mut base = AppConfig::default();
    base.auth.jwt_secret = "0123456789abcdef".into();
    assert!(config::validate(&base).is_ok());

    let mut c = base.clone();
    c.server.port = 0;
    assert!(config::validate(&c).unwrap_err().to_string().contains("invalid server.port"));

    let mut c = base.clone();
    c.auth.jwt_secret = "short".into();
    assert!(config::validate(&c).unwrap_err().to_string().contains("at least 16 bytes"));

    let mut c = base.clone();
    c.auth.token_ttl_secs = 0;
    assert!(config::validate(&c).is_err());

    let mut c = base.clone();
    c.database.max_connections = 0;
    assert!(config::validate(&c).is_err());

    let mut c = base.clone();
    c.uploads.max_file_size = 0;
    assert!(config::validate(&c).is_err());

    for cost in [3, 32] {
        let mut c = base.clone();
        c.auth.bcrypt_cost = cost;
        assert!(config::validate(&c).unwrap_err().to_string().contains("bcrypt_cost"));
    }

    let mut c = base.clone();
    c.auth.admin_email = Some("a@b.c".into());
    c.auth.admin_password = None;
    assert!(config::validate(&c).is_err());
}

// Single test touching process env so runs cannot interleave.
#[test]
fn test_load_layers_file_then_env() {
    env::remove_var("BOOKSTOCK__AUTH__JWT_SECRET");
    let err = config::load().unwrap_err();
    assert!(err.to_string().contains("auth.jwt_secret is required"), "{err}");

    env::set_var("BOOKSTOCK__AUTH__JWT_SECRET", "from-env-secret-0123456789");
    let cfg = config::load().unwrap();
    assert_eq!(cfg.auth.jwt_secret, "from-env-secret-0123456789");

    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("custom.toml"),
        r#"
[server]
host = "0.0.0.0"
port = 7000

[uploads]
dir = "/var/lib/bookstock/uploads"
max_file_size = 1024
"#,
    )
    .unwrap();
    env::set_var("BOOKSTOCK_CONFIG", dir.path().join("custom").to_str().unwrap());

    let cfg = config::load().unwrap();
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 7000);
    assert_eq!(cfg.uploads.max_file_size, 1024);

    env::set_var("BOOKSTOCK__SERVER__PORT", "8888");
    env::set_var("BOOKSTOCK__CORS__ORIGINS", "http://a.example,http://b.example");
    let cfg = config::load().unwrap();
    assert_eq!(cfg.server.port, 8888);
    assert_eq!(cfg.cors.origins, vec!["http://a.example".to_string(), "http://b.example".to_string()]);

    env::set_var("BOOKSTOCK__SERVER__PORT", "0");
    let err = config::load().unwrap_err();
    assert!(err.to_string().contains("invalid server.port"));

    env::remove_var("BOOKSTOCK__SERVER__PORT");
    env::remove_var("BOOKSTOCK__AUTH__JWT_SECRET");
    env::remove_var("BOOKSTOCK__CORS__ORIGINS");
    env::remove_var("BOOKSTOCK_CONFIG");
}

#[test]
fn test_ensure_sqlite_parent_dir() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("subdir/test.db");
    let db_url = format!("sqlite://{}", db_path.display());

    assert!(!db_path.parent().unwrap().exists());
    config::ensure_sqlite_parent_dir(&db_url).unwrap();
    assert!(db_path.parent().unwrap().exists());

    assert!(config::ensure_sqlite_parent_dir("postgres://localhost/db").is_ok());
}
