use product_feeds::config::ConfigLoader;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const TEST_KEY: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        for key in [
            "FEEDS_PROFILE",
            "FEEDS_API_BIND_ADDR",
            "FEEDS_LOG_LEVEL",
            "FEEDS_CRYPTO_KEY",
            "FEEDS_SHOPIFY_WEBHOOK_SECRET",
            "FEEDS_STOREFRONT_BASE_URL",
            "FEEDS_SCHEDULER_TICK_INTERVAL_SECONDS",
            "FEEDS_SCHEDULER_MAX_CONSECUTIVE_FAILURES",
            "FEEDS_DISPATCH_BACKOFF_UNIT_MS",
        ] {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.scheduler.max_consecutive_failures, 3);
    assert_eq!(cfg.scheduler.tick_interval_seconds, 60);
    assert_eq!(cfg.sync.max_pages, 10);
    assert_eq!(cfg.dispatch.backoff_unit_ms, 1000);
    assert!(cfg.storefront_base_url.is_none());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "FEEDS_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "FEEDS_API_BIND_ADDR=192.168.0.10:5000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "FEEDS_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        &format!("FEEDS_PROFILE=test\nFEEDS_API_BIND_ADDR=127.0.0.1:4000\nFEEDS_CRYPTO_KEY={TEST_KEY}\n"),
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.crypto_key.as_deref().map(<[u8]>::len), Some(32));
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "FEEDS_API_BIND_ADDR=127.0.0.1:3000\nFEEDS_STOREFRONT_BASE_URL=https://file.example\n",
    );

    unsafe {
        env::set_var("FEEDS_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("FEEDS_STOREFRONT_BASE_URL", "https://shop.example/");
        env::set_var("FEEDS_DISPATCH_BACKOFF_UNIT_MS", "5");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(
        cfg.storefront_base_url.as_deref(),
        Some("https://shop.example")
    );
    assert_eq!(cfg.dispatch.backoff_unit_ms, 5);

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    unsafe {
        env::set_var("FEEDS_API_BIND_ADDR", "not-an-addr");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn production_profile_requires_secrets() {
    let _guard = env_guard();
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    unsafe {
        env::set_var("FEEDS_PROFILE", "prod");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("prod without crypto key should fail");
    assert!(format!("{}", err).to_lowercase().contains("crypto"));

    unsafe {
        env::set_var("FEEDS_CRYPTO_KEY", TEST_KEY);
    }
    let err = loader
        .load()
        .expect_err("prod without webhook secret should fail");
    assert!(format!("{}", err).contains("FEEDS_SHOPIFY_WEBHOOK_SECRET"));

    unsafe {
        env::set_var("FEEDS_SHOPIFY_WEBHOOK_SECRET", "shh");
    }
    let cfg = loader.load().expect("prod with secrets loads");
    let redacted = cfg.redacted_json().unwrap();
    assert!(!redacted.contains("shh"));

    clear_env();
}

#[test]
fn scheduler_bounds_are_validated() {
    let _guard = env_guard();
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    unsafe {
        env::set_var("FEEDS_SCHEDULER_TICK_INTERVAL_SECONDS", "1");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    assert!(loader.load().is_err());

    unsafe {
        env::set_var("FEEDS_SCHEDULER_TICK_INTERVAL_SECONDS", "30");
        env::set_var("FEEDS_SCHEDULER_MAX_CONSECUTIVE_FAILURES", "0");
    }
    assert!(loader.load().is_err());

    clear_env();
}
