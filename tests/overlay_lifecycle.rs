use maplet_bridge::prelude::*;

/// Overlay controllers driven through a provider and the headless engine
#[cfg(test)]
mod overlay_lifecycle_tests {
    use super::*;

    fn provider(engine: &HeadlessEngine) -> MapProvider {
        let bootstrap = SdkBootstrap::new(Arc::new(HeadlessLoader::new(engine.clone())));
        MapProvider::new(
            bootstrap,
            ProviderConfig::new("client-id"),
            MapOptions::new(LatLng::new(37.5665, 126.978), 12.0),
        )
    }

    fn created_overlays(engine: &HeadlessEngine) -> usize {
        engine.count_calls(|call| matches!(call, NativeCall::CreateOverlay { .. }))
    }

    #[tokio::test]
    async fn test_pending_updates_are_buffered_until_attach() {
        let engine = HeadlessEngine::new();
        let mut provider = provider(&engine);
        let mut marker = OverlayController::new(OverlayDescriptor::marker(LatLng::new(1.0, 1.0)));

        assert_eq!(marker.mount(provider.context()).unwrap(), OverlayState::Pending);
        let latest = OverlayDescriptor::marker(LatLng::new(2.0, 2.0)).content("Seoul");
        assert!(marker.update(latest.clone()).unwrap().is_empty());
        assert!(marker.native().is_err());
        assert_eq!(created_overlays(&engine), 0);

        let (map, attached) = futures::join!(
            provider.mount(MountTarget::new("map").unwrap()),
            marker.attached()
        );
        map.unwrap();
        attached.unwrap();

        let native = marker.native().unwrap().native_id();
        let snapshot = engine.overlay_state(native).unwrap();
        assert_eq!(snapshot.geometry, latest.geometry);
        assert_eq!(snapshot.content.as_deref(), Some("Seoul"));
        assert_eq!(created_overlays(&engine), 1);
    }

    #[tokio::test]
    async fn test_sync_attaches_once_map_is_ready() {
        let engine = HeadlessEngine::new();
        let mut provider = provider(&engine);
        let mut circle =
            OverlayController::new(OverlayDescriptor::circle(LatLng::new(37.5, 127.0), 250.0));
        circle.mount(provider.context()).unwrap();
        assert_eq!(circle.sync().unwrap(), OverlayState::Pending);

        provider.mount(MountTarget::new("map").unwrap()).await.unwrap();
        assert_eq!(circle.sync().unwrap(), OverlayState::Attached);
        assert_eq!(circle.sync().unwrap(), OverlayState::Attached);
        assert_eq!(created_overlays(&engine), 1);
        assert_eq!(
            provider
                .handle()
                .unwrap()
                .overlay_count_of(OverlayKind::Circle)
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_position_change_moves_instead_of_recreating() {
        let engine = HeadlessEngine::new();
        let mut provider = provider(&engine);
        provider.mount(MountTarget::new("map").unwrap()).await.unwrap();

        let path = vec![LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0)];
        let mut line = OverlayController::new(OverlayDescriptor::polyline(path.clone()));
        line.mount(provider.context()).unwrap();
        let native = line.native().unwrap().native_id();
        engine.clear_calls();

        let mut longer = path;
        longer.push(LatLng::new(2.0, 1.5));
        let diff = line
            .update(OverlayDescriptor::polyline(longer.clone()))
            .unwrap();
        assert!(diff.geometry && !diff.style && !diff.visible);
        assert_eq!(engine.calls(), vec![NativeCall::SetGeometry { overlay: native }]);

        line.set_visible(false).unwrap();
        assert!(!engine.overlay_state(native).unwrap().visible);
        assert_eq!(created_overlays(&engine), 0);
        assert_eq!(line.bounds().unwrap().north_east, LatLng::new(2.0, 1.5));
    }

    #[tokio::test]
    async fn test_handlers_rebind_only_on_identity_change() {
        let engine = HeadlessEngine::new();
        let mut provider = provider(&engine);
        provider.mount(MountTarget::new("map").unwrap()).await.unwrap();

        let clicks = Arc::new(Mutex::new(Vec::new()));
        let sink = clicks.clone();
        let on_click = Handler::new(move |event: &OverlayEvent| {
            sink.lock().unwrap().push(event.lat_lng);
        });
        let base = OverlayDescriptor::marker(LatLng::new(1.0, 1.0));
        let mut marker = OverlayController::new(base.clone().on("click", on_click.clone()));
        marker.mount(provider.context()).unwrap();
        let native = marker.native().unwrap().native_id();
        engine.clear_calls();

        // Fresh descriptor, same handler: nothing rebinds
        marker.update(base.clone().on("click", on_click)).unwrap();
        assert!(engine.calls().is_empty());

        let other = Handler::new(|_: &OverlayEvent| {});
        marker.update(base.on("click", other)).unwrap();
        let listener_calls = engine.count_calls(|call| {
            matches!(
                call,
                NativeCall::AddListener { .. } | NativeCall::RemoveListener { .. }
            )
        });
        assert_eq!(listener_calls, 2);
        assert_eq!(engine.listeners_on(native), 1);

        engine.dispatch(native, NativeEvent::new("click").at(LatLng::new(1.0, 1.0)));
        assert!(clicks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispose_unbinds_before_native_dispose() {
        let engine = HeadlessEngine::new();
        let mut provider = provider(&engine);
        provider.mount(MountTarget::new("map").unwrap()).await.unwrap();

        let descriptor = OverlayDescriptor::polygon(vec![vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 1.0),
            LatLng::new(1.0, 1.0),
        ]])
        .on("click", Handler::new(|_: &OverlayEvent| {}))
        .on("mouseover", Handler::new(|_: &OverlayEvent| {}));
        let mut polygon = OverlayController::new(descriptor);
        polygon.mount(provider.context()).unwrap();
        let native = polygon.native().unwrap().native_id();
        engine.clear_calls();

        drop(polygon);
        let calls = engine.calls_for(native);
        let dispose_at = calls
            .iter()
            .position(|call| matches!(call, NativeCall::DisposeOverlay { .. }))
            .unwrap();
        let removals = calls[..dispose_at]
            .iter()
            .filter(|call| matches!(call, NativeCall::RemoveListener { .. }))
            .count();
        assert_eq!(removals, 2);
        assert_eq!(dispose_at, calls.len() - 1);
        assert_eq!(engine.listeners_on(native), 0);
        assert_eq!(provider.handle().unwrap().overlay_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_updates_after_provider_unmount_are_stale() {
        let engine = HeadlessEngine::new();
        let mut provider = provider(&engine);
        provider.mount(MountTarget::new("map").unwrap()).await.unwrap();

        let mut marker = OverlayController::new(
            OverlayDescriptor::marker(LatLng::new(1.0, 1.0))
                .on("click", Handler::new(|_: &OverlayEvent| {})),
        );
        marker.mount(provider.context()).unwrap();
        let native = marker.native().unwrap().native_id();
        provider.unmount();

        let err = marker
            .update(OverlayDescriptor::marker(LatLng::new(5.0, 5.0)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleHandle);
        marker.dispose();
        assert_eq!(marker.state(), OverlayState::Disposed);

        // Only the handlers are unbound once the map is gone
        assert_eq!(engine.listeners_on(native), 0);
        assert_eq!(
            engine.count_calls(|call| matches!(call, NativeCall::DisposeOverlay { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_registry_orders_overlays_by_z_index() {
        let engine = HeadlessEngine::new();
        let mut provider = provider(&engine);
        let map = provider.mount(MountTarget::new("map").unwrap()).await.unwrap();

        let mut top = OverlayController::new(
            OverlayDescriptor::marker(LatLng::new(1.0, 1.0)).style(Style::default().z_index(10)),
        );
        let mut bottom = OverlayController::new(
            OverlayDescriptor::heat_layer(vec![(LatLng::new(1.0, 1.0), 0.5)])
                .style(Style::default().z_index(1)),
        );
        top.mount(provider.context()).unwrap();
        bottom.mount(provider.context()).unwrap();

        let order: Vec<OverlayId> = map.overlays().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(order, vec![bottom.id(), top.id()]);

        // Raising the heat layer re-registers it above the marker
        let raised = bottom.descriptor().clone().style(Style::default().z_index(20));
        bottom.update(raised).unwrap();
        let order: Vec<OverlayId> = map.overlays().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(order, vec![top.id(), bottom.id()]);
    }
}
