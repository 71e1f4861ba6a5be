//! Checker: a sample edge application.
//!
//! - Reports a random `random_data` property every 3 seconds, plus a
//!   `data_event` event when the value reaches 70.
//! - Answers the `test_app_call` service with code 200, echoing its params.
//! - Calls `setTemperature` on a child device every 5 seconds when one is
//!   given on the command line.
//!
//! Configuration comes from the environment unless `--edgeconfig` names a
//! JSON file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use edgeapp::prelude::*;
use edgeapp::{EventRecord, PropertyValue, logging};
use rand::Rng;
use tracing::{error, info, warn};

const PROPERTY_ID: &str = "random_data";
const EVENT_ID: &str = "data_event";
const EVENT_PARAM: &str = "event_value";
const SERVICE_ID: &str = "test_app_call";
const EVENT_THRESHOLD: u32 = 70;

const POST_INTERVAL: Duration = Duration::from_secs(3);
const CALL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "checker")]
struct Args {
    /// JSON configuration file; read from the environment when omitted
    #[arg(long)]
    edgeconfig: Option<PathBuf>,

    /// Thing-model id of a child device to subscribe to and call
    #[arg(long, env = "ENDPOINT_THING_ID")]
    endpoint_thing_id: Option<String>,

    /// Device id of the child device to call
    #[arg(long, env = "ENDPOINT_DEVICE_ID")]
    endpoint_device_id: Option<String>,
}

type Client = Arc<EdgeClient>;

#[tokio::main]
async fn main() {
    logging::init("info");
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("checker failed: {e}");
    }
}

async fn run(args: Args) -> Result<(), EdgeError> {
    let runtime = match args.edgeconfig {
        Some(path) => RuntimeKind::Standalone(path),
        None => RuntimeKind::Container,
    };
    let mut options = ClientOptions::new(runtime).service_ids([SERVICE_ID]);
    if let Some(thing_id) = &args.endpoint_thing_id {
        options = options.endpoint_thing_ids([thing_id.clone()]);
    }

    let client: Client = Arc::new(EdgeClient::new(options));
    let mut events = client.init().await?;
    if let Err(e) = client.start().await {
        client.cleanup().await;
        return Err(e);
    }
    info!(info = ?client.edge_device_info().await?, "checker started");

    let mut tasks = vec![tokio::spawn(post_data(client.clone()))];
    if let (Some(thing_id), Some(device_id)) =
        (args.endpoint_thing_id, args.endpoint_device_id)
    {
        tasks.push(tokio::spawn(call_endpoint(
            client.clone(),
            thing_id,
            device_id,
        )));
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => on_event(&client, event).await,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    for task in tasks {
        task.abort();
    }
    client.cleanup().await;
    info!("checker exited");
    Ok(())
}

async fn on_event(client: &Client, event: SessionEvent) {
    let message = match event {
        SessionEvent::Connected => {
            info!("connected");
            return;
        }
        SessionEvent::Disconnected { reason } => {
            warn!(%reason, "disconnected");
            return;
        }
        SessionEvent::Message(message) => message,
    };
    info!(
        kind = %message.kind,
        thing_id = %message.model_id,
        device_id = %message.device_id,
        payload = %String::from_utf8_lossy(&message.payload),
        "message received"
    );
    if message.kind != MessageKind::ServiceCall {
        return;
    }

    let call: ServiceCall = match serde_json::from_slice(&message.payload) {
        Ok(call) => call,
        Err(e) => {
            warn!(error = %e, "undecodable service call");
            return;
        }
    };
    if call.identifier != SERVICE_ID {
        return;
    }
    let reply = call.reply(200, call.params.clone());
    match send(client, MessageKind::ServiceReply, &reply).await {
        Ok(()) => info!(message_id = %reply.message_id, "service call answered"),
        Err(e) => warn!(error = %e, "failed to answer service call"),
    }
}

/// Reports a random property sample every few seconds.
async fn post_data(client: Client) {
    let mut ticker = tokio::time::interval(POST_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let value: u32 = rand::rng().random_range(0..100);
        let now = now_millis();

        let property =
            [PropertyValue::new(PROPERTY_ID, now, value.to_string())];
        if let Err(e) = send(&client, MessageKind::Property, &property).await {
            warn!(error = %e, "failed to send property");
        }

        if value >= EVENT_THRESHOLD {
            let mut params = Params::new();
            params.insert(EVENT_PARAM.into(), value.to_string().into());
            let event = EventRecord {
                identifier: EVENT_ID.into(),
                timestamp: now,
                params,
            };
            if let Err(e) = send(&client, MessageKind::Event, &event).await {
                warn!(error = %e, "failed to send event");
            }
        }
    }
}

/// Calls `setTemperature` on a child device every few seconds.
async fn call_endpoint(client: Client, thing_id: String, device_id: String) {
    loop {
        tokio::time::sleep(CALL_INTERVAL).await;
        let call = ServiceCall::new("setTemperature").with_param("temperature", 35);
        match client.call_endpoint(&thing_id, &device_id, call).await {
            Ok(reply) => info!(code = reply.code, "endpoint replied"),
            Err(e) if e.is_timeout() => warn!("endpoint call timed out"),
            Err(e) => warn!(error = %e, "endpoint call failed"),
        }
    }
}

async fn send<T: serde::Serialize>(
    client: &Client,
    kind: MessageKind,
    body: &T,
) -> Result<(), EdgeError> {
    let payload = serde_json::to_vec(body)
        .map_err(|e| EdgeError::InvalidArgument(e.to_string()))?;
    client.send_message(kind, &payload).await
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
