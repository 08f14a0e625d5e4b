//! End-to-end worker lifecycle through the host event channel.

use std::sync::Arc;

use reqwest::Url;
use serde_json::json;
use shellcache_core::worker::{FetchEvent, MessageEvent, NotificationClickEvent, VersionReply};
use shellcache_core::{
    CacheStorage, ChannelHost, Destination, DiskCacheStorage, HostCommand, HostEvent,
    MemoryCacheStorage, Request, RequestKey, Response, ScriptedFetcher, ServiceWorker,
    WorkerConfig, WorkerContext, WorkerState,
};
use tokio::sync::{mpsc, oneshot};

fn config() -> WorkerConfig {
    WorkerConfig {
        scope: "https://water.test/".to_string(),
        precache: vec![
            "/app/index.html".to_string(),
            "/app/styles/main.css".to_string(),
            "https://fonts.googleapis.com/css2?family=Inter".to_string(),
        ],
        ..Default::default()
    }
}

fn network(config: &WorkerConfig) -> Arc<ScriptedFetcher> {
    let net = Arc::new(ScriptedFetcher::new(config.scope_url().unwrap()));
    for locator in &config.precache {
        net.respond(&config.resolve(locator).unwrap(), 200, format!("body of {}", locator));
    }
    net
}

async fn fetch(events: &mpsc::Sender<HostEvent>, request: Request) -> Option<Response> {
    let (tx, rx) = oneshot::channel();
    events
        .send(HostEvent::Fetch(FetchEvent {
            request,
            respond_with: tx,
        }))
        .await
        .unwrap();
    rx.await.unwrap()
}

#[tokio::test]
async fn install_activate_and_serve_through_event_loop() {
    let config = config();
    let net = network(&config);
    let storage = Arc::new(MemoryCacheStorage::new());
    let stale = config.resolve("/app/index.html").unwrap();
    storage
        .put(
            "molintas-water-v0.9.0",
            RequestKey::new("GET", &stale),
            Response::new(&stale, 200, "old shell"),
        )
        .await
        .unwrap();

    let (host, mut commands) = ChannelHost::new();
    let ctx = WorkerContext::new(config.clone(), storage.clone(), net.clone(), Arc::new(host));
    let worker = Arc::new(ServiceWorker::new(ctx));
    let (events, rx) = mpsc::channel(16);
    let event_loop = tokio::spawn(Arc::clone(&worker).run(rx));

    events.send(HostEvent::Install).await.unwrap();
    events.send(HostEvent::Activate).await.unwrap();

    // Precached entry is served without another network call
    let calls_after_install = 3;
    let index = fetch(&events, Request::navigate(config.resolve("/app/index.html").unwrap())).await;
    assert_eq!(index.unwrap().text(), "body of /app/index.html");
    assert_eq!(net.calls(), calls_after_install);
    assert_eq!(worker.state(), WorkerState::Activated);

    // Only the current cache survives activation
    assert_eq!(storage.names().await.unwrap(), vec!["molintas-water-v1.0.0"]);

    // Version query over a reply port
    let (port, reply) = oneshot::channel();
    events
        .send(HostEvent::Message(MessageEvent {
            data: Some(json!({"type": "GET_VERSION"})),
            ports: vec![port],
        }))
        .await
        .unwrap();
    let reply: VersionReply = serde_json::from_value(reply.await.unwrap()).unwrap();
    assert_eq!(reply.version, "molintas-water-v1.0.0");

    drop(events);
    event_loop.await.unwrap();

    let mut seen = Vec::new();
    while let Ok(command) = commands.try_recv() {
        seen.push(command);
    }
    assert_eq!(seen, vec![HostCommand::SkipWaiting, HostCommand::ClaimClients]);
}

#[tokio::test]
async fn push_and_click_through_event_loop() {
    let config = config();
    let net = network(&config);
    let (host, mut commands) = ChannelHost::new();
    let ctx = WorkerContext::new(
        config,
        Arc::new(MemoryCacheStorage::new()),
        net,
        Arc::new(host),
    );
    let worker = Arc::new(ServiceWorker::new(ctx));
    let (events, rx) = mpsc::channel(16);
    let event_loop = tokio::spawn(Arc::clone(&worker).run(rx));

    events
        .send(HostEvent::Push {
            data: Some(br#"{"title":"T","body":"B"}"#.to_vec()),
        })
        .await
        .unwrap();
    let shown = match commands.recv().await {
        Some(HostCommand::ShowNotification(n)) => n,
        other => panic!("expected a notification, got {:?}", other),
    };
    assert_eq!(shown.title, "T");
    assert_eq!(shown.body, "B");
    let actions: Vec<&str> = shown.actions.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec!["explore", "close"]);

    events
        .send(HostEvent::NotificationClick(NotificationClickEvent {
            notification: shown.clone(),
            action: Some("explore".to_string()),
        }))
        .await
        .unwrap();
    assert_eq!(commands.recv().await, Some(HostCommand::CloseNotification(shown)));
    assert_eq!(
        commands.recv().await,
        Some(HostCommand::OpenWindow(Url::parse("https://water.test/app/").unwrap()))
    );

    drop(events);
    event_loop.await.unwrap();
}

#[tokio::test]
async fn disk_storage_survives_restart_and_serves_offline() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let net = network(&config);

    {
        let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
        let (host, _commands) = ChannelHost::new();
        let ctx = WorkerContext::new(config.clone(), storage, net.clone(), Arc::new(host));
        let worker = ServiceWorker::new(ctx);
        assert_eq!(worker.install().await.unwrap(), 3);
        worker.activate().await.unwrap();

        // Runtime caching of a same-origin asset
        let logo = config.resolve("/app/icons/logo.svg").unwrap();
        net.respond(&logo, 200, "<svg/>");
        worker.fetch(Request::get(logo)).await.unwrap();
        worker.settle().await;
    }

    // New process, network gone
    net.set_offline(true);
    let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    let (host, _commands) = ChannelHost::new();
    let ctx = WorkerContext::new(config.clone(), storage, net, Arc::new(host));
    let worker = ServiceWorker::restore(ctx).await.unwrap();
    assert_eq!(worker.state(), WorkerState::Activated);

    let logo = worker
        .fetch(Request::get(config.resolve("/app/icons/logo.svg").unwrap()))
        .await;
    assert_eq!(logo.unwrap().text(), "<svg/>");

    let page = worker
        .fetch(Request::navigate(config.resolve("/app/reports").unwrap()))
        .await;
    assert_eq!(page.unwrap().text(), "body of /app/index.html");

    let script = worker
        .fetch(
            Request::get(config.resolve("/app/js/uncached.js").unwrap())
                .with_destination(Destination::Script),
        )
        .await;
    assert!(script.is_none());
}
