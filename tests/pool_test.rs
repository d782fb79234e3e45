//! Instance pool lifecycle tests against the scripted driver

mod common;

use common::{MockDriver, MockState, eventually};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kodegen_tools_webfetch::browser_pool::{
    AbsorbedError, BrowserMode, InstanceHealth, InstancePool, PoolConfig, PoolError,
    RemovalReason, ResourceScope,
};
use kodegen_tools_webfetch::driver::{ResourceType, RouteDecision};
use kodegen_tools_webfetch::utils::MAX_CONSECUTIVE_LAUNCH_FAILURES;

fn pool_config(max_browsers: usize, max_pages: usize) -> PoolConfig {
    PoolConfig {
        max_browsers,
        max_pages_per_context: max_pages,
        max_browser_age: Duration::from_secs(3600),
        max_idle_time: Duration::from_secs(60),
        health_check_interval: Duration::from_secs(3600),
        ..PoolConfig::default()
    }
}

async fn started_pool(config: PoolConfig) -> (Arc<InstancePool>, MockDriver) {
    common::init_tracing();
    let driver = MockDriver::new();
    let pool = InstancePool::new(config, Arc::new(driver.clone()));
    pool.initialize().await.expect("pool initializes");
    (pool, driver)
}

#[tokio::test]
async fn test_initialize_fills_pool_and_is_idempotent() {
    let (pool, driver) = started_pool(pool_config(3, 2)).await;
    assert!(pool.is_initialized());
    assert_eq!(pool.size().await, 3);

    pool.initialize().await.expect("second initialize");
    assert_eq!(MockState::count(&driver.state.launches), 3);
    assert_eq!(MockState::count(&driver.state.contexts), 3);

    let launch = driver.state.last_launch().expect("launched");
    assert!(launch.headless);
    assert_eq!(launch.request_timeout, Some(Duration::from_secs(30)));
    pool.cleanup().await;
}

#[tokio::test]
async fn test_initialize_fails_when_no_instance_launches() {
    let driver = MockDriver::new();
    driver.state.fail_next_launches(usize::MAX);
    let pool = InstancePool::new(pool_config(3, 2), Arc::new(driver.clone()));

    let err = pool.initialize().await.expect_err("nothing launched");
    assert!(matches!(err, PoolError::InitFailed(_)));
    assert!(err.to_string().contains("scripted launch failure"));
    assert_eq!(
        MockState::count(&driver.state.launches),
        MAX_CONSECUTIVE_LAUNCH_FAILURES
    );
    assert!(!pool.is_initialized());
}

#[tokio::test]
async fn test_initialize_tolerates_isolated_launch_failure() {
    let driver = MockDriver::new();
    driver.state.fail_next_launches(1);
    let pool = InstancePool::new(pool_config(2, 2), Arc::new(driver.clone()));

    pool.initialize().await.expect("recovers after one failure");
    assert_eq!(pool.size().await, 2);
    assert_eq!(MockState::count(&driver.state.launches), 3);
    pool.cleanup().await;
}

#[tokio::test]
async fn test_capacity_exhaustion_until_release() {
    let (pool, _driver) = started_pool(pool_config(1, 1)).await;

    let held = pool.acquire_page().await.expect("first slot");
    let shown = format!("{held:?}");
    assert!(shown.starts_with("PooledPage"), "got: {shown}");
    assert!(shown.contains(&format!("instance_id: {}", held.instance_id())));
    let err = pool.acquire_page().await.expect_err("pool is full");
    assert!(matches!(
        err,
        PoolError::CapacityExhausted {
            max_browsers: 1,
            max_pages_per_context: 1
        }
    ));

    pool.release_page(held).await;
    let again = pool.acquire_page().await.expect("slot freed");
    pool.release_page(again).await;
    pool.cleanup().await;
}

#[tokio::test]
async fn test_concurrent_acquires_respect_single_slot() {
    let (pool, _driver) = started_pool(pool_config(1, 1)).await;

    let (a, b) = tokio::join!(pool.acquire_page(), pool.acquire_page());
    assert_eq!(
        [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
        1,
        "exactly one concurrent acquire wins the only slot"
    );
    for page in [a, b].into_iter().flatten() {
        pool.release_page(page).await;
    }
    pool.cleanup().await;
}

#[tokio::test]
async fn test_acquire_balances_across_instances() {
    let (pool, _driver) = started_pool(pool_config(2, 2)).await;

    let first = pool.acquire_page().await.expect("page");
    let second = pool.acquire_page().await.expect("page");
    assert_ne!(first.instance_id(), second.instance_id());

    let metrics = pool.metrics().await;
    assert!(metrics.iter().all(|m| m.open_pages == 1));

    pool.release_page(first).await;
    pool.release_page(second).await;
    pool.cleanup().await;
}

#[tokio::test]
async fn test_metrics_are_snapshots() {
    let (pool, _driver) = started_pool(pool_config(1, 2)).await;

    let before = pool.metrics().await;
    let page = pool.acquire_page().await.expect("page");
    let after = pool.metrics().await;

    assert_eq!(before[0].open_pages, 0);
    assert_eq!(before[0].pages_created, 0);
    assert_eq!(after[0].open_pages, 1);
    assert_eq!(after[0].pages_created, 1);

    pool.release_page(page).await;
    let stats = pool.stats().await;
    assert_eq!(stats.instances, 1);
    assert_eq!(stats.open_pages, 0);
    assert_eq!(stats.pages_created, 1);
    assert_eq!(stats.mode, BrowserMode::Headless);
    pool.cleanup().await;
}

#[tokio::test]
async fn test_dropped_guard_closes_page() {
    let (pool, driver) = started_pool(pool_config(1, 1)).await;

    let page = pool.acquire_page().await.expect("page");
    let page_id = page.page().id().clone();
    drop(page);

    let mock_page = driver.state.page(&page_id).expect("mock page");
    assert!(eventually!(Duration::from_secs(2), mock_page.is_closed()));
    let reacquired = pool.acquire_page().await.expect("slot returned");
    pool.release_page(reacquired).await;
    pool.cleanup().await;
}

#[tokio::test]
async fn test_page_crash_isolates_owning_instance() {
    let (pool, driver) = started_pool(pool_config(2, 4)).await;

    let doomed = pool.acquire_page().await.expect("page");
    let survivor = pool.acquire_page().await.expect("page");
    let crashed_instance = doomed.instance_id();
    let healthy_instance = survivor.instance_id();
    assert_ne!(crashed_instance, healthy_instance);

    driver
        .state
        .page(doomed.page().id())
        .expect("mock page")
        .crash();

    let replaced = eventually!(Duration::from_secs(2), {
        let metrics = pool.metrics().await;
        metrics.len() == 2 && metrics.iter().all(|m| m.id != crashed_instance)
    });
    assert!(replaced, "crashed instance retired and replaced");

    let metrics = pool.metrics().await;
    assert!(metrics.iter().any(|m| m.id == healthy_instance));
    assert!(metrics.iter().all(|m| m.health == InstanceHealth::Healthy));

    for _ in 0..4 {
        let page = pool.acquire_page().await.expect("page");
        assert_ne!(page.instance_id(), crashed_instance);
        pool.release_page(page).await;
    }
    assert_eq!(MockState::count(&driver.state.launches), 3);

    drop(doomed);
    pool.release_page(survivor).await;
    pool.cleanup().await;
}

#[tokio::test]
async fn test_disconnect_self_heals_once() {
    let (pool, driver) = started_pool(pool_config(2, 2)).await;
    let browsers = driver.state.browsers();

    browsers[0].disconnect();
    browsers[0].repeat_disconnect_event();
    browsers[0].repeat_disconnect_event();

    let healed = eventually!(
        Duration::from_secs(2),
        MockState::count(&driver.state.launches) == 3 && pool.size().await == 2
    );
    assert!(healed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        MockState::count(&driver.state.launches),
        3,
        "duplicate disconnect events notify the pool once"
    );
    pool.cleanup().await;
}

#[tokio::test]
async fn test_sweep_retires_disconnected_without_event() {
    let (pool, driver) = started_pool(pool_config(1, 1)).await;
    let first = pool.metrics().await[0].id;

    driver.state.browsers()[0].sever();

    let report = pool.health_check().await;
    assert_eq!(report.removed, vec![(first, RemovalReason::Disconnected)]);
    assert_eq!(report.launched, 1);
    assert_eq!(pool.size().await, 1);
    pool.cleanup().await;
}

#[tokio::test]
async fn test_age_retirement_replenishes() {
    let mut config = pool_config(2, 2);
    config.max_browser_age = Duration::from_secs(60);
    let (pool, driver) = started_pool(config).await;

    let report = pool
        .health_check_at(Instant::now() + Duration::from_secs(61))
        .await;
    assert_eq!(report.removed.len(), 2);
    assert!(
        report
            .removed
            .iter()
            .all(|(_, reason)| *reason == RemovalReason::MaxAge)
    );
    assert_eq!(report.launched, 2);
    assert_eq!(pool.size().await, 2);
    assert_eq!(MockState::count(&driver.state.launches), 4);
    assert_eq!(MockState::count(&driver.state.browser_closes), 2);
    pool.cleanup().await;
}

#[tokio::test]
async fn test_idle_eviction_spares_busy_instance() {
    let mut config = pool_config(2, 2);
    config.max_idle_time = Duration::from_secs(1);
    let (pool, _driver) = started_pool(config).await;

    let busy = pool.acquire_page().await.expect("page");
    let busy_instance = busy.instance_id();

    let report = pool
        .health_check_at(Instant::now() + Duration::from_secs(5))
        .await;
    assert_eq!(report.removed.len(), 1);
    assert_ne!(report.removed[0].0, busy_instance);
    assert_eq!(report.removed[0].1, RemovalReason::Idle);

    let metrics = pool.metrics().await;
    assert!(metrics.iter().any(|m| m.id == busy_instance));
    assert_eq!(metrics.len(), 2);

    pool.release_page(busy).await;
    pool.cleanup().await;
}

#[tokio::test]
async fn test_idle_eviction_keeps_last_instance() {
    let mut config = pool_config(1, 2);
    config.max_idle_time = Duration::from_secs(1);
    let (pool, driver) = started_pool(config).await;

    let report = pool
        .health_check_at(Instant::now() + Duration::from_secs(1800))
        .await;
    assert!(report.removed.is_empty());
    assert_eq!(report.launched, 0);
    assert_eq!(pool.size().await, 1);
    assert_eq!(MockState::count(&driver.state.launches), 1);
    pool.cleanup().await;
}

#[tokio::test]
async fn test_idle_eviction_stops_at_floor() {
    let mut config = pool_config(3, 2);
    config.max_idle_time = Duration::from_secs(1);
    let driver = MockDriver::new();
    let pool = InstancePool::new(config, Arc::new(driver.clone()));
    pool.initialize().await.expect("pool initializes");
    // no relaunches, so the floor is observable after the sweep
    driver.state.fail_next_launches(usize::MAX);

    let report = pool
        .health_check_at(Instant::now() + Duration::from_secs(10))
        .await;
    assert_eq!(report.removed.len(), 2);
    assert_eq!(report.launched, 0);
    assert_eq!(pool.size().await, 1);
    pool.cleanup().await;
}

#[tokio::test]
async fn test_health_timer_runs_sweeps() {
    let mut config = pool_config(1, 1);
    config.max_browser_age = Duration::from_millis(30);
    config.health_check_interval = Duration::from_millis(20);
    let (pool, driver) = started_pool(config).await;

    let swept = eventually!(
        Duration::from_secs(2),
        MockState::count(&driver.state.launches) >= 3
    );
    assert!(swept, "timer keeps rescheduling itself");
    pool.cleanup().await;
}

#[tokio::test]
async fn test_context_interceptor_blocks_configured_traffic() {
    let mut config = pool_config(1, 1);
    config.blocked_domains = vec!["ads.example".to_string()];
    config.blocked_resource_types = vec![ResourceType::Image];
    let (pool, driver) = started_pool(config).await;

    assert_eq!(MockState::count(&driver.state.context_routes), 1);
    let state = &driver.state;
    assert_eq!(
        state.context_decision("https://cdn.ads.example/x.js", ResourceType::Script),
        RouteDecision::Abort
    );
    assert_eq!(
        state.context_decision("https://example.com/a.png", ResourceType::Image),
        RouteDecision::Abort
    );
    assert_eq!(
        state.context_decision("https://example.com/app.js", ResourceType::Script),
        RouteDecision::Continue
    );
    // unparseable URL errors inside the blocker and is let through
    assert_eq!(
        state.context_decision("::not a url::", ResourceType::Script),
        RouteDecision::Continue
    );
    pool.cleanup().await;
}

#[tokio::test]
async fn test_error_hook_receives_absorbed_errors() {
    common::init_tracing();
    let mut config = pool_config(1, 1);
    config.blocked_domains = vec!["ads.example".to_string()];
    let driver = MockDriver::new();
    let seen: Arc<Mutex<Vec<AbsorbedError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let pool = InstancePool::with_error_hook(
        config,
        Arc::new(driver.clone()),
        Arc::new(move |absorbed: AbsorbedError| sink.lock().push(absorbed)),
    );
    pool.initialize().await.expect("pool initializes");

    driver.state.fail_page_closes(true);
    let page = pool.acquire_page().await.expect("page");
    let instance_id = page.instance_id();
    pool.release_page(page).await;

    assert_eq!(
        driver.state.context_decision("::not a url::", ResourceType::Script),
        RouteDecision::Continue
    );

    let seen = seen.lock().clone();
    let scopes: Vec<ResourceScope> = seen.iter().map(|a| a.scope).collect();
    assert_eq!(scopes, vec![ResourceScope::Page, ResourceScope::Interceptor]);
    assert!(seen.iter().all(|a| a.instance_id == instance_id));
    assert!(seen[0].error.contains("scripted close failure"));
    assert!(seen[1].error.contains("::not a url::"));

    driver.state.fail_page_closes(false);
    pool.cleanup().await;
}

#[tokio::test]
async fn test_cleanup_is_idempotent_and_fails_fast() {
    let (pool, driver) = started_pool(pool_config(2, 2)).await;

    pool.cleanup().await;
    pool.cleanup().await;

    assert!(pool.is_shutting_down());
    assert_eq!(pool.size().await, 0);
    assert_eq!(MockState::count(&driver.state.browser_closes), 2);
    assert!(matches!(
        pool.acquire_page().await,
        Err(PoolError::ShuttingDown)
    ));
    assert!(pool.health_check().await.removed.is_empty());
    assert_eq!(MockState::count(&driver.state.launches), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_pool_bounds_hold(
        max_browsers in 1usize..4,
        max_pages in 1usize..4,
        ops in prop::collection::vec(any::<bool>(), 1..40),
    ) {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        runtime.block_on(async move {
            let (pool, _driver) = started_pool(pool_config(max_browsers, max_pages)).await;
            let mut held = Vec::new();
            for acquire in ops {
                if acquire {
                    match pool.acquire_page().await {
                        Ok(page) => held.push(page),
                        Err(e) => {
                            assert!(matches!(e, PoolError::CapacityExhausted { .. }));
                            assert_eq!(held.len(), max_browsers * max_pages);
                        }
                    }
                } else if let Some(page) = held.pop() {
                    pool.release_page(page).await;
                }

                let metrics = pool.metrics().await;
                assert!(metrics.len() <= max_browsers);
                assert!(metrics.iter().all(|m| m.open_pages <= max_pages));
                assert_eq!(
                    metrics.iter().map(|m| m.open_pages).sum::<usize>(),
                    held.len()
                );
            }
            for page in held {
                pool.release_page(page).await;
            }
            pool.cleanup().await;
        });
    }
}
