use maplet_bridge::prelude::*;

const TRAILS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "id": "namsan", "geometry": {"type": "LineString", "coordinates": [[126.985, 37.551], [126.988, 37.554]]}, "properties": {"name": "Namsan loop"}},
        {"type": "Feature", "id": "cheonggye", "geometry": {"type": "Point", "coordinates": [126.978, 37.569]}, "properties": {"name": "Cheonggye plaza"}}
    ]
}"#;

const RUN_GPX: &str = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="maplet-bridge-demo">
  <trk><name>Morning run</name>
    <trkseg>
      <trkpt lat="37.5665" lon="126.9780"/>
      <trkpt lat="37.5700" lon="126.9830"/>
      <trkpt lat="37.5740" lon="126.9870"/>
    </trkseg>
  </trk>
</gpx>"#;

/// Headless walkthrough: bootstrap, one map, a marker and a data layer
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let engine = HeadlessEngine::new();
    let loader = HeadlessLoader::new(engine.clone()).with_delay(Duration::from_millis(25));
    let bootstrap = BootstrapRegistry::get_or_install(Arc::new(loader));

    let config = ProviderConfig::from_json(r#"{"apiKeyId": "demo-client", "timeoutMs": 2000}"#)?;
    let options = MapOptions::new(LatLng::new(37.5665, 126.978), 12.0).with_map_type(MapType::Normal);
    let callbacks = ProviderCallbacks::new()
        .on_ready(|| log::info!("provider ready"))
        .on_error(|err| log::error!("provider failed: {}", err));
    let mut provider = MapProvider::new(bootstrap.clone(), config, options).with_callbacks(callbacks);
    let map = provider.mount(MountTarget::new("map")?).await?;

    let mut marker = OverlayController::new(
        OverlayDescriptor::marker(LatLng::new(37.5665, 126.978))
            .content("City Hall")
            .on(
                "click",
                Handler::new(|event: &OverlayEvent| log::info!("marker clicked at {:?}", event.lat_lng)),
            ),
    );
    marker.mount(provider.context())?;
    let moved = marker
        .descriptor()
        .clone()
        .with_geometry(OverlayGeometry::Position(LatLng::new(37.57, 126.98)));
    let diff = marker.update(moved)?;
    log::info!("marker update issued {} setter call(s)", diff.setter_count());

    let fetcher = MemoryFetcher::new();
    fetcher.insert("/trails.geojson", TRAILS);
    fetcher.insert("/run.gpx", RUN_GPX);

    let props = DataLayerProps::new("/trails.geojson")
        .style(Style::default().stroke("#2b8a3e", 4.0))
        .on(
            DataLayerEventKind::Click,
            Handler::new(|event: &DataLayerEvent| log::info!("clicked feature {}", event.feature.id)),
        )
        .on_data_ready(|features| log::info!("data ready: {} feature(s)", features.len()))
        .on_data_error(|err| log::warn!("data error: {}", err));
    let counters = props.counters.clone();

    let mut layer = DataLayerController::new(props.clone(), Arc::new(fetcher));
    layer.mount(provider.context())?;
    layer.settle().await?;

    let layer_id = layer.native_id()?;
    engine.dispatch_feature_event(layer_id, "click", &FeatureId::from("namsan"))?;
    layer.override_style(&FeatureId::from("namsan"), &Style::default().stroke("#e03131", 6.0))?;

    layer.update(props.url("/run.gpx"))?;
    layer.settle().await?;
    if let Some(bounds) = layer.bounds()? {
        map.fit_bounds(bounds)?;
    }

    println!("{}", layer.to_geojson()?.to_json_string()?);
    println!("{}", serde_json::to_string_pretty(&counters.snapshot())?);
    log::info!(
        "map at {:?}, zoom {:.1}, {} overlay(s), {} SDK load(s)",
        map.center()?,
        map.zoom()?,
        map.overlay_count()?,
        bootstrap.load_actions()
    );

    layer.dispose();
    marker.dispose();
    provider.unmount();
    Ok(())
}
