use super::*;
use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
/// Callers must hold `env_guard()`.
unsafe fn clear_server_env() {
    unsafe {
        std::env::remove_var("BIND_ADDR");
        std::env::remove_var("PORT");
        std::env::remove_var("STATIC_DIR");
        std::env::remove_var("HUB_COMMAND_CAPACITY");
        std::env::remove_var("PLAYER_OUTBOUND_CAPACITY");
        std::env::remove_var("REWARD_SCORE");
    }
}

#[test]
fn from_env_defaults() {
    let _guard = env_guard();
    unsafe { clear_server_env() };

    let cfg = ServerConfig::from_env();
    assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.static_dir, PathBuf::from(DEFAULT_STATIC_DIR));
    assert_eq!(cfg.hub, HubConfig::default());
    assert_eq!(cfg.listen_addr(), "0.0.0.0:8080");
}

#[test]
fn from_env_overrides_and_clamps() {
    let _guard = env_guard();
    unsafe {
        clear_server_env();
        std::env::set_var("PORT", "9100");
        std::env::set_var("STATIC_DIR", "/srv/www");
        std::env::set_var("HUB_COMMAND_CAPACITY", "0");
        std::env::set_var("PLAYER_OUTBOUND_CAPACITY", "4");
        std::env::set_var("REWARD_SCORE", "25");
    }

    let cfg = ServerConfig::from_env();
    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.static_dir, PathBuf::from("/srv/www"));
    assert_eq!(cfg.hub.command_capacity, 1);
    assert_eq!(cfg.hub.outbound_capacity, 4);
    assert_eq!(cfg.hub.reward_score, 25);

    unsafe { clear_server_env() };
}

#[test]
fn env_parse_falls_back_on_garbage() {
    let _guard = env_guard();
    unsafe { std::env::set_var("TICTAC_TEST_GARBAGE", "not-a-number") };
    assert_eq!(env_parse("TICTAC_TEST_GARBAGE", 7_u32), 7);
    unsafe { std::env::remove_var("TICTAC_TEST_GARBAGE") };
}
