//! Connects two in-process `Pair`s, exposes a method, an actor, and an
//! event, and drives all three. Run with `RUST_LOG=debug cargo run --example echo`
//! to see the crate's `tracing` instrumentation.

use rpc_pair::{handler, method_actor, transport, transport::Transport, ActorRegistry, Pair};
use serde_json::Value;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = Pair::builder()
        .name("server")
        .error_sink(|err| tracing::error!(%err, "server pair error"))
        .build()?;
    let client = Pair::builder()
        .name("client")
        .error_sink(|err| tracing::error!(%err, "client pair error"))
        .build()?;

    server.expose(
        "add",
        handler(|params| async move {
            let a = params[0].as_i64().unwrap_or(0);
            let b = params[1].as_i64().unwrap_or(0);
            Ok(Value::from(a + b))
        }),
    );

    let registry = Arc::new(ActorRegistry::new());
    registry.clone().expose(&server)?;
    registry.expose_actor("counter-1", Arc::new(method_actor("bump", {
        let count = Arc::new(std::sync::atomic::AtomicI64::new(0));
        move |_args| {
            let count = count.clone();
            async move { Ok(Value::from(count.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1)) }
        }
    })))?;

    let (server_transport, client_transport) = transport::duplex();
    let _server_handle = server_transport.attach(&server);
    let _client_handle = client_transport.attach(&client);

    let sum = client
        .call("add", vec![Value::from(10), Value::from(5)])
        .await?;
    println!("add(10, 5) = {sum}");

    let remote = client.get_actor("counter-1");
    let first = remote.call("bump", vec![]).await?;
    let second = remote.call("bump", vec![]).await?;
    println!("counter-1 bumped to {first} then {second}");

    server.on("ping", |data| println!("server saw ping: {data:?}"));
    client.emit("ping", vec![Value::from("hello")]).await?;

    Ok(())
}
