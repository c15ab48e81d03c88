use maplet_bridge::prelude::*;
use std::time::Duration;

/// SDK bootstrap behaviour under concurrent, slow and failing loads
#[cfg(test)]
mod bootstrap_tests {
    use super::*;

    fn bootstrap_with(loader: HeadlessLoader) -> (Arc<HeadlessLoader>, Arc<SdkBootstrap>) {
        let loader = Arc::new(loader);
        let bootstrap = SdkBootstrap::new(loader.clone());
        (loader, bootstrap)
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_load() {
        let (loader, bootstrap) = bootstrap_with(
            HeadlessLoader::new(HeadlessEngine::new()).with_delay(Duration::from_millis(20)),
        );
        let config = ProviderConfig::new("client-id");

        let first = bootstrap.request_load(&config);
        let second = bootstrap.request_load(&config);
        assert_eq!(bootstrap.status(), BootstrapStatus::Loading);

        let (a, b) = futures::join!(first, second);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.same_as(&b));
        assert_eq!(loader.calls(), 1);
        assert_eq!(bootstrap.load_actions(), 1);
        assert_eq!(bootstrap.status(), BootstrapStatus::Ready);
    }

    #[tokio::test]
    async fn test_many_providers_mount_against_one_load() {
        let engine = HeadlessEngine::new();
        let (loader, bootstrap) = bootstrap_with(
            HeadlessLoader::new(engine.clone()).with_delay(Duration::from_millis(10)),
        );

        let mut providers: Vec<MapProvider> = (0..4)
            .map(|_| {
                MapProvider::new(
                    bootstrap.clone(),
                    ProviderConfig::new("client-id"),
                    MapOptions::default(),
                )
            })
            .collect();
        let mounts = providers
            .iter_mut()
            .enumerate()
            .map(|(i, provider)| provider.mount(MountTarget::new(format!("map-{}", i)).unwrap()));
        let maps = futures::future::join_all(mounts).await;

        assert!(maps.iter().all(|map| map.is_ok()));
        assert_eq!(loader.calls(), 1);
        assert_eq!(
            engine.count_calls(|call| matches!(call, NativeCall::CreateMap { .. })),
            4
        );
    }

    #[tokio::test]
    async fn test_timeout_rejects_every_waiter_then_allows_retry() {
        let (loader, bootstrap) = bootstrap_with(
            HeadlessLoader::new(HeadlessEngine::new()).with_delay(Duration::from_millis(200)),
        );
        let config = ProviderConfig::new("client-id").with_timeout_ms(20);

        let (a, b) = futures::join!(
            bootstrap.request_load(&config),
            bootstrap.request_load(&config)
        );
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert_eq!(a, MapError::Timeout(20));
        assert_eq!(a, b);
        assert_eq!(a.kind(), ErrorKind::Timeout);
        assert_eq!(bootstrap.status(), BootstrapStatus::Idle);
        assert_eq!(bootstrap.last_error(), Some(MapError::Timeout(20)));

        let retry = ProviderConfig::new("client-id").with_timeout_ms(1_000);
        assert!(bootstrap.request_load(&retry).await.is_ok());
        assert_eq!(loader.calls(), 2);
        assert_eq!(bootstrap.last_error(), None);
    }

    #[tokio::test]
    async fn test_failure_returns_to_idle_and_retries() {
        let (loader, bootstrap) =
            bootstrap_with(HeadlessLoader::new(HeadlessEngine::new()).failing_first(1));
        let config = ProviderConfig::new("client-id");

        let err = bootstrap.request_load(&config).await.unwrap_err();
        assert!(matches!(err, MapError::Load(_)));
        assert_eq!(bootstrap.status(), BootstrapStatus::Idle);

        let handle = bootstrap.request_load(&config).await.unwrap();
        assert_eq!(handle.api_key_id(), "client-id");
        assert_eq!(loader.calls(), 2);
        assert_eq!(bootstrap.status(), BootstrapStatus::Ready);
    }

    #[tokio::test]
    async fn test_provider_reports_bootstrap_failure() {
        let engine = HeadlessEngine::new();
        let (_, bootstrap) = bootstrap_with(HeadlessLoader::new(engine).failing_first(1));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let mut provider = MapProvider::new(
            bootstrap,
            ProviderConfig::new("client-id"),
            MapOptions::default(),
        )
        .with_callbacks(ProviderCallbacks::new().on_error(move |err| {
            sink.lock().unwrap().push(err.clone());
        }));
        let context = provider.context();

        assert!(provider.mount(MountTarget::new("map").unwrap()).await.is_err());
        assert_eq!(context.status(), SdkStatus::Error);
        assert!(context.error().is_some());
        assert!(context.map().is_none());
        assert_eq!(errors.lock().unwrap().len(), 1);

        // The next mount retries the bootstrap
        let map = provider.mount(MountTarget::new("map").unwrap()).await.unwrap();
        assert_eq!(context.status(), SdkStatus::Ready);
        assert!(context.map().unwrap().same_map(&map));
    }

    #[tokio::test]
    async fn test_unmount_invalidates_outstanding_refs() {
        let engine = HeadlessEngine::new();
        let (_, bootstrap) = bootstrap_with(HeadlessLoader::new(engine.clone()));
        let mut provider = MapProvider::new(
            bootstrap,
            ProviderConfig::new("client-id"),
            MapOptions::new(LatLng::new(37.5665, 126.978), 12.0),
        );
        let map = provider.mount(MountTarget::new("map").unwrap()).await.unwrap();
        let native = map.native_id().unwrap();

        drop(provider);
        assert!(!map.is_alive());
        assert_eq!(map.set_zoom(3.0).unwrap_err().kind(), ErrorKind::StaleHandle);
        assert!(engine.map_state(native).unwrap().destroyed);
    }
}
