use std::time::Duration;

use axum::{body::Bytes, routing::post, Router};
use event_relay::{Collector, RelayConfig};
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    // Local collector that prints whatever it receives.
    let collector = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let collector_url = format!("http://{}/events", collector.local_addr()?);
    let app = Router::new().route(
        "/events",
        post(|body: Bytes| async move {
            println!("collector received: {}", String::from_utf8_lossy(&body));
        }),
    );
    tokio::spawn(async move { axum::serve(collector, app).await });

    let config = RelayConfig::new("127.0.0.1:8080".parse()?, Collector::new(collector_url));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let relay = tokio::spawn(event_relay::run(config, async {
        let _ = stop_rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(200)).await;

    let response = reqwest::Client::new()
        .post("http://127.0.0.1:8080/")
        .body(r#"{"ev":"click","uid":"u-1","atrk1":"button","atrv1":"buy","atrt1":"string"}"#)
        .send()
        .await?;
    println!("relay answered {}: {}", response.status(), response.text().await?);

    let _ = stop_tx.send(());
    relay.await??;
    Ok(())
}
