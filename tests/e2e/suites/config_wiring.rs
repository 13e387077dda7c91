//! 配置装配测试

use std::fs;
use std::path::Path;
use std::time::Duration;

use forge_lock::{Config, ConfigError, Provider, RedisStore, provide_mutex_manager};
use forge_shared::config::AppConfig;
use forge_shared::test_utils::unique_key;

use crate::setup::TestEnvironment;

fn repo_config_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
}

#[test]
fn test_test_environment_settings() {
    let env = TestEnvironment::setup().unwrap();

    assert_eq!(env.lock_config.app, "forge-e2e");
    assert_eq!(env.lock_config.namespace, "default");
    assert_eq!(env.lock_config.expiry, Duration::from_secs(1));
    assert_eq!(env.lock_config.tries, 50);
    assert_eq!(env.lock_config.retry_delay, Duration::from_millis(10));

    let mutex = env.manager().new_mutex("k1", vec![]).unwrap();
    assert_eq!(mutex.key(), "forge-e2e:default:k1");
}

#[test]
fn test_production_selects_redis_quorum() {
    let app = AppConfig::load_from("forge", "production", repo_config_dir()).unwrap();
    assert_eq!(app.redis.node_urls().len(), 3);
    assert!(app.observability.json_logs());

    let config = Config::from_settings(&app.lock).unwrap();
    assert_eq!(config.provider, Provider::Redis);
    // 生产默认值
    assert_eq!(config.expiry, Duration::from_secs(8));
    assert_eq!(config.tries, 8);

    // 缺少 Redis 节点时不能启动
    assert!(provide_mutex_manager(config.clone(), None).is_none());

    // 只创建客户端，不会建立连接
    let store = RedisStore::open(&app.redis).unwrap();
    assert_eq!(store.quorum(), 2);
    assert!(provide_mutex_manager(config, Some(store)).is_some());
}

#[test]
fn test_unknown_provider_is_rejected() {
    let dir = std::env::temp_dir().join(unique_key("forge-e2e-config"));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("default.toml"), "[lock]\nprovider = \"etcd\"\n").unwrap();

    let app = AppConfig::load_from("forge", "development", &dir).unwrap();
    let err = Config::from_settings(&app.lock).unwrap_err();
    assert_eq!(err, ConfigError::UnknownProvider("etcd".to_string()));

    fs::remove_dir_all(&dir).unwrap();
}
