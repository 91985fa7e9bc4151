use crate::activity::{RelayActivity, ResultResponse, UserActivity};
use crate::api::{self, HttpTransport, NodeRegistryResponse, RegistryClient, SendMessageRequest};
use crate::config::Config;
use anyhow::{Context, Result};
use onionnet_core::{
    send_onion, Directory, NodeId, NodeRecord, NodeRegistry, OnionError, Relay, Transport,
    MAX_ENVELOPE_SIZE,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::{Filter, Reply};

// ============================================================================
// NODE CONTEXTS
// ============================================================================

pub struct RelayContext {
    pub relay: Relay,
    pub transport: Arc<dyn Transport>,
    pub activity: RelayActivity,
    pub expose_private_key: bool,
}

pub struct UserContext {
    pub user_id: u32,
    pub config: Config,
    pub directory: Arc<dyn Directory>,
    pub transport: Arc<dyn Transport>,
    pub activity: UserActivity,
}

fn with_state<T: Send + Sync + 'static>(
    state: Arc<T>,
) -> impl Filter<Extract = (Arc<T>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn status_route() -> BoxedFilter<(&'static str,)> {
    warp::path!("status").and(warp::get()).map(|| "live").boxed()
}

/// HTTP status for a failed routing step
fn status_for(err: &OnionError) -> StatusCode {
    match err {
        e if e.is_bad_envelope() => StatusCode::BAD_REQUEST,
        OnionError::Transport(_) => StatusCode::BAD_GATEWAY,
        OnionError::InsufficientNodes { .. } | OnionError::Directory(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        OnionError::EnvelopeTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(err: &OnionError) -> warp::reply::Response {
    warp::reply::with_status(err.to_string(), status_for(err)).into_response()
}

// ============================================================================
// ROUTES
// ============================================================================

pub fn registry_routes(registry: Arc<NodeRegistry>) -> BoxedFilter<(impl Reply,)> {
    let register_route = warp::path!("registerNode")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(registry.clone()))
        .and_then(handle_register_node)
        .boxed();

    let list_route = warp::path!("getNodeRegistry")
        .and(warp::get())
        .and(with_state(registry))
        .map(|registry: Arc<NodeRegistry>| {
            warp::reply::json(&NodeRegistryResponse {
                nodes: registry.snapshot(),
            })
        })
        .boxed();

    status_route().or(register_route).or(list_route).boxed()
}

pub fn relay_routes(ctx: Arc<RelayContext>) -> BoxedFilter<(impl Reply,)> {
    let message_route = warp::path!("message")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_ENVELOPE_SIZE as u64))
        .and(warp::body::bytes())
        .and(with_state(ctx.clone()))
        .and_then(handle_relay_message)
        .boxed();

    let encrypted_route = warp::path!("getLastReceivedEncryptedMessage")
        .and(warp::get())
        .and(with_state(ctx.clone()))
        .map(|ctx: Arc<RelayContext>| {
            warp::reply::json(&ResultResponse {
                result: ctx.activity.last_encrypted_hex(),
            })
        })
        .boxed();

    let decrypted_route = warp::path!("getLastReceivedDecryptedMessage")
        .and(warp::get())
        .and(with_state(ctx.clone()))
        .map(|ctx: Arc<RelayContext>| {
            warp::reply::json(&ResultResponse {
                result: ctx.activity.last_decrypted_hex(),
            })
        })
        .boxed();

    let destination_route = warp::path!("getLastMessageDestination")
        .and(warp::get())
        .and(with_state(ctx.clone()))
        .map(|ctx: Arc<RelayContext>| {
            warp::reply::json(&ResultResponse {
                result: ctx.activity.last_destination(),
            })
        })
        .boxed();

    let private_key_route = warp::path!("getPrivateKey")
        .and(warp::get())
        .and(with_state(ctx))
        .and_then(handle_private_key)
        .boxed();

    status_route()
        .or(message_route)
        .or(encrypted_route)
        .or(decrypted_route)
        .or(destination_route)
        .or(private_key_route)
        .boxed()
}

pub fn user_routes(ctx: Arc<UserContext>) -> BoxedFilter<(impl Reply,)> {
    let receive_route = warp::path!("message")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_ENVELOPE_SIZE as u64))
        .and(warp::body::bytes())
        .and(with_state(ctx.clone()))
        .map(|body: bytes::Bytes, ctx: Arc<UserContext>| {
            tracing::info!(user_id = ctx.user_id, bytes = body.len(), "message delivered");
            ctx.activity.record_received(&body);
            "received"
        })
        .boxed();

    let send_route = warp::path!("sendMessage")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(ctx.clone()))
        .and_then(handle_send_message)
        .boxed();

    let received_route = warp::path!("getLastReceivedMessage")
        .and(warp::get())
        .and(with_state(ctx.clone()))
        .map(|ctx: Arc<UserContext>| {
            warp::reply::json(&ResultResponse {
                result: ctx.activity.last_received(),
            })
        })
        .boxed();

    let sent_route = warp::path!("getLastSentMessage")
        .and(warp::get())
        .and(with_state(ctx.clone()))
        .map(|ctx: Arc<UserContext>| {
            warp::reply::json(&ResultResponse {
                result: ctx.activity.last_sent(),
            })
        })
        .boxed();

    let circuit_route = warp::path!("getLastCircuit")
        .and(warp::get())
        .and(with_state(ctx))
        .map(|ctx: Arc<UserContext>| {
            warp::reply::json(&ResultResponse {
                result: ctx.activity.last_circuit(),
            })
        })
        .boxed();

    status_route()
        .or(receive_route)
        .or(send_route)
        .or(received_route)
        .or(sent_route)
        .or(circuit_route)
        .boxed()
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn handle_register_node(
    record: NodeRecord,
    registry: Arc<NodeRegistry>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let node_id = record.node_id;
    match registry.register(record).await {
        Ok(()) => {
            tracing::info!(node_id, "relay registered");
            Ok("success".into_response())
        }
        Err(e) => Ok(
            warp::reply::with_status(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response(),
        ),
    }
}

async fn handle_relay_message(
    body: bytes::Bytes,
    ctx: Arc<RelayContext>,
) -> Result<warp::reply::Response, warp::Rejection> {
    ctx.activity.record_received(&body);

    let peeled = match ctx.relay.peel(&body) {
        Ok(peeled) => peeled,
        Err(e) => return Ok(error_reply(&e)),
    };
    ctx.activity.record_peeled(&peeled);

    match ctx.relay.forward(&peeled, ctx.transport.as_ref()).await {
        Ok(_) => Ok("forwarded".into_response()),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_private_key(ctx: Arc<RelayContext>) -> Result<impl Reply, warp::Rejection> {
    if !ctx.expose_private_key {
        return Err(warp::reject::not_found());
    }
    let secret = ctx.relay.keys().secret_key_bytes();
    Ok(warp::reply::json(&ResultResponse {
        result: Some(hex::encode(*secret)),
    }))
}

async fn handle_send_message(
    request: SendMessageRequest,
    ctx: Arc<UserContext>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let final_address = match ctx.config.user_address(request.destination_user_id) {
        Ok(address) => address,
        Err(e) => {
            return Ok(
                warp::reply::with_status(e.to_string(), StatusCode::BAD_REQUEST).into_response(),
            )
        }
    };

    match send_onion(
        ctx.directory.as_ref(),
        ctx.transport.as_ref(),
        final_address,
        request.message.as_bytes(),
    )
    .await
    {
        Ok(sent) => {
            ctx.activity
                .record_sent(&request.message, sent.circuit.node_ids());
            Ok("success".into_response())
        }
        Err(e) => {
            tracing::warn!(user_id = ctx.user_id, error = %e, "send failed");
            Ok(error_reply(&e))
        }
    }
}

// ============================================================================
// NODE STARTUP
// ============================================================================

fn socket_addr(config: &Config, port: u16) -> Result<SocketAddr> {
    format!("{}:{}", config.host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, port))
}

fn spawn_server<T>(routes: BoxedFilter<(T,)>, addr: SocketAddr) -> JoinHandle<()>
where
    T: Reply + Send + 'static,
{
    tokio::spawn(async move {
        warp::serve(routes).run(addr).await;
    })
}

pub async fn start_registry(config: &Config) -> Result<JoinHandle<()>> {
    let addr = socket_addr(config, config.registry_port)?;
    let handle = spawn_server(registry_routes(Arc::new(NodeRegistry::new())), addr);
    api::wait_until_live(&config.registry_url(), 50).await?;
    tracing::info!(%addr, "registry listening");
    Ok(handle)
}

pub async fn start_relay(config: &Config, node_id: NodeId) -> Result<(Arc<RelayContext>, JoinHandle<()>)> {
    let port = config.relay_port(node_id)?;
    let addr = socket_addr(config, port)?;
    let ctx = Arc::new(RelayContext {
        relay: Relay::new(node_id, config.relay_address(node_id)?),
        transport: Arc::new(HttpTransport::new(config.host.clone())),
        activity: RelayActivity::new(),
        expose_private_key: config.expose_private_keys,
    });

    let handle = spawn_server(relay_routes(ctx.clone()), addr);
    api::wait_until_live(&config.url_for_port(port), 50).await?;

    RegistryClient::new(config.registry_url())
        .register(ctx.relay.record())
        .await
        .with_context(|| format!("Relay {} could not register", node_id))?;

    tracing::info!(node_id, %addr, "relay listening");
    Ok((ctx, handle))
}

pub async fn start_user(config: &Config, user_id: u32) -> Result<(Arc<UserContext>, JoinHandle<()>)> {
    let port = config.user_port(user_id)?;
    let addr = socket_addr(config, port)?;
    let ctx = Arc::new(UserContext {
        user_id,
        config: config.clone(),
        directory: Arc::new(RegistryClient::new(config.registry_url())),
        transport: Arc::new(HttpTransport::new(config.host.clone())),
        activity: UserActivity::new(),
    });

    let handle = spawn_server(user_routes(ctx.clone()), addr);
    api::wait_until_live(&config.url_for_port(port), 50).await?;

    tracing::info!(user_id, %addr, "user listening");
    Ok((ctx, handle))
}
