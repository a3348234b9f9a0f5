//! Integration tests for the configuration service.
//!
//! Most tests run against both store backends through `backends()`.

use jones::error::{ErrorCode, JonesError, Result};
use jones::nodemap::Encoding;
use jones::store::{MemoryStore, NodeStat, SqliteStore, TreeStore, Version};
use jones::{ConfigService, EnvPath, NodeMap};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn env(name: &str) -> EnvPath {
    EnvPath::new(name).expect("valid env")
}

fn backends() -> Vec<Arc<dyn TreeStore>> {
    vec![
        Arc::new(MemoryStore::new()),
        Arc::new(SqliteStore::open_in_memory().expect("Failed to open in-memory store")),
    ]
}

/// root {timeout: 30} -> prod {timeout: 10, region: na} -> prod/us {region: us-east}
fn setup_tree(store: Arc<dyn TreeStore>) -> ConfigService {
    let svc = ConfigService::new(store, "testservice").expect("Failed to open service");
    svc.create_config(&EnvPath::root(), &json!({"timeout": 30}))
        .unwrap();
    svc.create_config(&env("prod"), &json!({"timeout": 10, "region": "na"}))
        .unwrap();
    svc.create_config(&env("prod/us"), &json!({"region": "us-east"}))
        .unwrap();
    svc
}

fn as_value(map: jones::ConfigMap) -> Value {
    Value::Object(map)
}

mod view_tests {
    use super::*;

    #[test]
    fn views_overlay_root_to_leaf() {
        for store in backends() {
            let svc = setup_tree(store);

            assert_eq!(
                as_value(svc.get_view_by_env(&env("prod/us")).unwrap()),
                json!({"timeout": 10, "region": "us-east"})
            );
            assert_eq!(
                as_value(svc.get_view_by_env(&env("prod")).unwrap()),
                json!({"timeout": 10, "region": "na"})
            );
            assert_eq!(
                as_value(svc.get_view_by_env(&EnvPath::root()).unwrap()),
                json!({"timeout": 30})
            );
        }
    }

    #[test]
    fn every_view_equals_merge_of_ancestor_configs() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.create_config(&env("dev"), &json!({"debug": true})).unwrap();
            svc.create_config(&env("prod/us/east"), &json!({"zone": "1a", "timeout": 5}))
                .unwrap();

            for e in svc.list_envs().unwrap() {
                let mut expected = serde_json::Map::new();
                for ancestor in e.ancestors() {
                    let (_, conf) = svc.get_config_by_env(&ancestor).unwrap();
                    expected.extend(conf);
                }
                assert_eq!(svc.get_view_by_env(&e).unwrap(), expected, "view of {}", e);
            }
        }
    }

    #[test]
    fn set_config_cascades_to_descendants_only() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.create_config(&env("dev"), &json!({"debug": true})).unwrap();
            let dev_before = svc.get_view_by_env(&env("dev")).unwrap();

            let (version, _) = svc.get_config_by_env(&env("prod")).unwrap();
            svc.set_config(&env("prod"), &json!({"timeout": 20, "region": "eu"}), version)
                .unwrap();

            assert_eq!(
                as_value(svc.get_view_by_env(&env("prod")).unwrap()),
                json!({"timeout": 20, "region": "eu"})
            );
            assert_eq!(
                as_value(svc.get_view_by_env(&env("prod/us")).unwrap()),
                json!({"timeout": 20, "region": "us-east"})
            );
            assert_eq!(svc.get_view_by_env(&env("dev")).unwrap(), dev_before);
            assert_eq!(
                as_value(svc.get_view_by_env(&EnvPath::root()).unwrap()),
                json!({"timeout": 30})
            );
        }
    }

    #[test]
    fn root_change_reaches_every_view() {
        for store in backends() {
            let svc = setup_tree(store);
            let (version, _) = svc.get_config_by_env(&EnvPath::root()).unwrap();
            svc.set_config(&EnvPath::root(), &json!({"timeout": 30, "retries": 3}), version)
                .unwrap();

            for e in ["", "prod", "prod/us"] {
                let view = svc.get_view_by_env(&env(e)).unwrap();
                assert_eq!(view["retries"], 3, "view of '{}'", e);
            }
        }
    }

    #[test]
    fn removed_key_falls_back_to_ancestor() {
        for store in backends() {
            let svc = setup_tree(store);
            let (version, _) = svc.get_config_by_env(&env("prod")).unwrap();
            svc.set_config(&env("prod"), &json!({"region": "na"}), version)
                .unwrap();

            assert_eq!(svc.get_view_by_env(&env("prod/us")).unwrap()["timeout"], 30);
        }
    }

    #[test]
    fn refresh_views_rebuilds_stale_view() {
        for store in backends() {
            let svc = setup_tree(Arc::clone(&store));
            let path = svc.view_path(&env("prod/us"));
            store.set(&path, b"{\"stale\": true}", None).unwrap();

            svc.refresh_views(&env("prod")).unwrap();
            assert_eq!(
                as_value(svc.get_view_by_env(&env("prod/us")).unwrap()),
                json!({"timeout": 10, "region": "us-east"})
            );
        }
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn create_then_get_returns_initial_version() {
        for store in backends() {
            let svc = ConfigService::new(store, "svc").unwrap();
            let conf = json!({"timeout": 30, "nested": {"a": [1, 2]}});
            svc.create_config(&EnvPath::root(), &conf).unwrap();

            let (version, stored) = svc.get_config_by_env(&EnvPath::root()).unwrap();
            assert_eq!(version, 0);
            assert_eq!(as_value(stored), conf);
        }
    }

    #[test]
    fn non_mapping_rejected_before_any_write() {
        for store in backends() {
            let svc = ConfigService::new(Arc::clone(&store), "svc").unwrap();
            let err = svc.create_config(&EnvPath::root(), &json!([1, 2, 3])).unwrap_err();
            assert_eq!(err.code, ErrorCode::Validation);
            assert!(!svc.exists().unwrap());
            assert!(!store.exists("/services/svc/views").unwrap());

            svc.create_config(&EnvPath::root(), &json!({})).unwrap();
            let err = svc.set_config(&EnvPath::root(), &json!("x"), 0).unwrap_err();
            assert_eq!(err.code, ErrorCode::Validation);
            assert_eq!(svc.get_config_by_env(&EnvPath::root()).unwrap().0, 0);
        }
    }

    #[test]
    fn create_existing_fails() {
        for store in backends() {
            let svc = setup_tree(store);
            let err = svc.create_config(&env("prod"), &json!({})).unwrap_err();
            assert_eq!(err.code, ErrorCode::AlreadyExists);
        }
    }

    #[test]
    fn stale_version_conflicts_and_current_version_advances() {
        for store in backends() {
            let svc = setup_tree(store);
            let (v0, _) = svc.get_config_by_env(&env("prod")).unwrap();
            svc.set_config(&env("prod"), &json!({"a": 1}), v0).unwrap();

            let err = svc.set_config(&env("prod"), &json!({"a": 2}), v0).unwrap_err();
            assert_eq!(err.code, ErrorCode::VersionConflict);

            let (v1, conf) = svc.get_config_by_env(&env("prod")).unwrap();
            assert!(v1 > v0);
            assert_eq!(as_value(conf), json!({"a": 1}));

            svc.set_config(&env("prod"), &json!({"a": 2}), v1).unwrap();
            assert!(svc.get_config_by_env(&env("prod")).unwrap().0 > v1);
        }
    }

    #[test]
    fn set_missing_env_is_not_found() {
        for store in backends() {
            let svc = setup_tree(store);
            let err = svc.set_config(&env("staging"), &json!({}), 0).unwrap_err();
            assert_eq!(err.code, ErrorCode::NotFound);
        }
    }

    #[test]
    fn delete_config_removes_config_and_view() {
        for store in backends() {
            let svc = setup_tree(Arc::clone(&store));
            let (version, _) = svc.get_config_by_env(&env("prod/us")).unwrap();
            svc.delete_config(&env("prod/us"), version).unwrap();

            let err = svc.get_config_by_env(&env("prod/us")).unwrap_err();
            assert_eq!(err.code, ErrorCode::NotFound);
            let err = svc.get_view_by_env(&env("prod/us")).unwrap_err();
            assert_eq!(err.code, ErrorCode::NotFound);
            assert!(svc.get_view_by_env(&env("prod")).is_ok());
        }
    }

    #[test]
    fn delete_config_with_wrong_version_keeps_everything() {
        for store in backends() {
            let svc = setup_tree(store);
            let err = svc.delete_config(&env("prod/us"), 7).unwrap_err();
            assert_eq!(err.code, ErrorCode::VersionConflict);
            assert!(svc.get_view_by_env(&env("prod/us")).is_ok());
        }
    }

    #[test]
    fn delete_config_is_not_recursive() {
        for store in backends() {
            let svc = setup_tree(store);
            let (version, _) = svc.get_config_by_env(&env("prod")).unwrap();
            let err = svc.delete_config(&env("prod"), version).unwrap_err();
            assert_eq!(err.code, ErrorCode::NotEmpty);
            assert!(svc.get_config_by_env(&env("prod/us")).is_ok());
        }
    }

    #[test]
    fn exists_and_delete_all() {
        for store in backends() {
            let svc = ConfigService::new(Arc::clone(&store), "svc").unwrap();
            assert!(!svc.exists().unwrap());

            svc.create_config(&EnvPath::root(), &json!({})).unwrap();
            assert!(svc.exists().unwrap());

            svc.delete_all().unwrap();
            assert!(!svc.exists().unwrap());
            assert!(!store.exists("/services/svc").unwrap());
        }
    }

    #[test]
    fn child_envs_are_relative_and_exclude_self() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.create_config(&env("prod/eu"), &json!({})).unwrap();

            let children: Vec<String> = svc
                .get_child_envs(&env("prod"))
                .unwrap()
                .into_iter()
                .map(String::from)
                .collect();
            assert_eq!(children, vec!["eu", "us"]);

            let all: Vec<String> = svc
                .get_child_envs(&EnvPath::root())
                .unwrap()
                .into_iter()
                .map(String::from)
                .collect();
            assert_eq!(all, vec!["prod", "prod/eu", "prod/us"]);

            assert!(svc.get_child_envs(&env("prod/us")).unwrap().is_empty());
        }
    }
}

mod association_tests {
    use super::*;

    #[test]
    fn host_resolves_to_env_view() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.assoc_host("web01.example.com", &env("prod/us")).unwrap();

            assert_eq!(
                svc.get_config("web01.example.com").unwrap(),
                svc.get_view_by_env(&env("prod/us")).unwrap()
            );
        }
    }

    #[test]
    fn host_follows_view_updates() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.assoc_host("web01", &env("prod/us")).unwrap();

            let (version, _) = svc.get_config_by_env(&EnvPath::root()).unwrap();
            svc.set_config(&EnvPath::root(), &json!({"timeout": 30, "owner": "ops"}), version)
                .unwrap();
            assert_eq!(svc.get_config("web01").unwrap()["owner"], "ops");
        }
    }

    #[test]
    fn unknown_host_is_not_found() {
        for store in backends() {
            let svc = setup_tree(store);
            let err = svc.get_config("ghost").unwrap_err();
            assert_eq!(err.code, ErrorCode::NotFound);
        }
    }

    #[test]
    fn host_pointing_at_missing_view_is_not_found() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.assoc_host("web01", &env("staging")).unwrap();
            let err = svc.get_config("web01").unwrap_err();
            assert_eq!(err.code, ErrorCode::NotFound);
        }
    }

    #[test]
    fn root_never_has_associations() {
        for store in backends() {
            let svc = setup_tree(store);
            assert_eq!(svc.get_associations(&EnvPath::root()).unwrap(), None);

            svc.assoc_host("web01", &EnvPath::root()).unwrap();
            assert_eq!(svc.get_associations(&EnvPath::root()).unwrap(), None);
        }
    }

    #[test]
    fn associations_grouped_by_env() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.assoc_host("web02", &env("prod")).unwrap();
            svc.assoc_host("web01", &env("prod")).unwrap();
            svc.assoc_host("web03", &env("prod/us")).unwrap();

            assert_eq!(
                svc.get_associations(&env("prod")).unwrap(),
                Some(vec!["web01".to_string(), "web02".to_string()])
            );
            assert_eq!(
                svc.get_associations(&env("prod/us")).unwrap(),
                Some(vec!["web03".to_string()])
            );
            assert_eq!(svc.get_associations(&env("dev")).unwrap(), Some(vec![]));
        }
    }

    #[test]
    fn reassociation_moves_host() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.assoc_host("web01", &env("prod")).unwrap();
            svc.assoc_host("web01", &env("prod/us")).unwrap();

            assert_eq!(svc.get_associations(&env("prod")).unwrap(), Some(vec![]));
            assert_eq!(svc.get_config("web01").unwrap()["region"], "us-east");
        }
    }

    #[test]
    fn delete_association() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.assoc_host("web01", &env("prod")).unwrap();
            svc.delete_association("web01").unwrap();

            assert_eq!(svc.get_config("web01").unwrap_err().code, ErrorCode::NotFound);
            assert_eq!(
                svc.delete_association("web01").unwrap_err().code,
                ErrorCode::NotFound
            );
        }
    }

    #[test]
    fn legacy_nodemap_is_read_and_migrated_on_write() {
        for store in backends() {
            let svc = setup_tree(Arc::clone(&store));
            let map_path = "/services/testservice/nodemaps";
            let legacy = format!(
                "web01 -> {}\nweb02 -> {}",
                svc.view_path(&env("prod")),
                svc.view_path(&env("prod/us"))
            );
            store.set(map_path, legacy.as_bytes(), None).unwrap();

            assert_eq!(svc.get_config("web01").unwrap()["region"], "na");
            assert_eq!(
                svc.get_associations(&env("prod/us")).unwrap(),
                Some(vec!["web02".to_string()])
            );

            let map = NodeMap::new(Arc::clone(&store), map_path).unwrap();
            assert_eq!(map.encoding().unwrap(), Encoding::Legacy);

            svc.assoc_host("web03", &env("prod")).unwrap();
            assert_eq!(map.encoding().unwrap(), Encoding::Json);
            assert_eq!(svc.get_all_associations().unwrap().len(), 3);
        }
    }
}

mod cascade_failure_tests {
    use super::*;

    /// Delegates to a `MemoryStore` but can fail the Nth view write.
    struct FailingViewWrites {
        inner: MemoryStore,
        /// 0 disables injection.
        fail_on: AtomicUsize,
        view_writes: AtomicUsize,
    }

    impl FailingViewWrites {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_on: AtomicUsize::new(0),
                view_writes: AtomicUsize::new(0),
            }
        }

        fn fail_nth_view_write(&self, n: usize) {
            self.view_writes.store(0, Ordering::SeqCst);
            self.fail_on.store(n, Ordering::SeqCst);
        }
    }

    impl TreeStore for FailingViewWrites {
        fn ensure_path(&self, path: &str) -> Result<()> {
            self.inner.ensure_path(path)
        }

        fn get(&self, path: &str) -> Result<(Vec<u8>, NodeStat)> {
            self.inner.get(path)
        }

        fn set(&self, path: &str, data: &[u8], expected: Option<Version>) -> Result<NodeStat> {
            if path.contains("/views") {
                let n = self.view_writes.fetch_add(1, Ordering::SeqCst) + 1;
                if n == self.fail_on.load(Ordering::SeqCst) {
                    return Err(JonesError::version_conflict(
                        path,
                        expected.unwrap_or_default(),
                        expected.unwrap_or_default() + 1,
                    ));
                }
            }
            self.inner.set(path, data, expected)
        }

        fn create(&self, path: &str, data: &[u8]) -> Result<NodeStat> {
            self.inner.create(path, data)
        }

        fn delete(&self, path: &str, expected: Option<Version>, recursive: bool) -> Result<()> {
            self.inner.delete(path, expected, recursive)
        }

        fn exists(&self, path: &str) -> Result<bool> {
            self.inner.exists(path)
        }

        fn children(&self, path: &str) -> Result<Vec<String>> {
            self.inner.children(path)
        }
    }

    fn setup_failing() -> (Arc<FailingViewWrites>, ConfigService) {
        let store = Arc::new(FailingViewWrites::new());
        let svc = ConfigService::new(store.clone(), "svc").unwrap();
        svc.create_config(&EnvPath::root(), &json!({"v": 1})).unwrap();
        svc.create_config(&env("a"), &json!({})).unwrap();
        svc.create_config(&env("b"), &json!({})).unwrap();
        (store, svc)
    }

    #[test]
    fn partial_cascade_keeps_committed_views_and_leaves_rest_stale() {
        let (store, svc) = setup_failing();

        // Cascade order from root is root, a, b; fail on "a"
        store.fail_nth_view_write(2);
        let (version, _) = svc.get_config_by_env(&EnvPath::root()).unwrap();
        let err = svc
            .set_config(&EnvPath::root(), &json!({"v": 2}), version)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::VersionConflict);

        // The config write itself committed
        assert_eq!(svc.get_config_by_env(&EnvPath::root()).unwrap().1["v"], 2);

        assert_eq!(svc.get_view_by_env(&EnvPath::root()).unwrap()["v"], 2);
        assert_eq!(svc.get_view_by_env(&env("a")).unwrap()["v"], 1);
        assert_eq!(svc.get_view_by_env(&env("b")).unwrap()["v"], 1);
    }

    #[test]
    fn refresh_views_resumes_interrupted_cascade() {
        let (store, svc) = setup_failing();

        store.fail_nth_view_write(2);
        let (version, _) = svc.get_config_by_env(&EnvPath::root()).unwrap();
        assert!(svc.set_config(&EnvPath::root(), &json!({"v": 2}), version).is_err());

        store.fail_nth_view_write(0);
        svc.refresh_views(&EnvPath::root()).unwrap();
        for e in ["", "a", "b"] {
            assert_eq!(svc.get_view_by_env(&env(e)).unwrap()["v"], 2, "view of '{}'", e);
        }
    }
}

mod snapshot_tests {
    use super::*;
    use jones::service::list_services;

    #[test]
    fn export_lists_every_env() {
        for store in backends() {
            let svc = setup_tree(store);
            svc.assoc_host("web01", &env("prod/us")).unwrap();

            let snapshot = svc.export().unwrap();
            assert_eq!(snapshot.service, "testservice");

            let envs: Vec<&str> = snapshot.envs.iter().map(|e| e.env.as_str()).collect();
            assert_eq!(envs, vec!["", "prod", "prod/us"]);

            let leaf = &snapshot.envs[2];
            assert_eq!(leaf.version, 0);
            assert_eq!(
                leaf.view.clone().map(Value::Object),
                Some(json!({"timeout": 10, "region": "us-east"}))
            );
            assert_eq!(
                snapshot.associations.get("web01").map(String::as_str),
                Some("/services/testservice/views/prod/us")
            );
        }
    }

    #[test]
    fn export_of_empty_service() {
        for store in backends() {
            let svc = ConfigService::new(store, "empty").unwrap();
            let snapshot = svc.export().unwrap();
            assert!(snapshot.envs.is_empty());
            assert!(snapshot.associations.is_empty());
        }
    }

    #[test]
    fn services_are_listed_by_name() {
        for store in backends() {
            assert!(list_services(store.as_ref(), "/services").unwrap().is_empty());

            ConfigService::new(Arc::clone(&store), "web").unwrap();
            ConfigService::new(Arc::clone(&store), "api").unwrap();
            assert_eq!(
                list_services(store.as_ref(), "/services").unwrap(),
                vec!["api", "web"]
            );
        }
    }

    #[test]
    fn services_are_isolated() {
        for store in backends() {
            let web = setup_tree(Arc::clone(&store));
            let api = ConfigService::new(Arc::clone(&store), "api").unwrap();
            api.create_config(&EnvPath::root(), &json!({"timeout": 1})).unwrap();

            assert_eq!(web.get_view_by_env(&EnvPath::root()).unwrap()["timeout"], 30);
            api.delete_all().unwrap();
            assert!(web.exists().unwrap());
        }
    }
}
