use crate::error::{Error, Result};
use crate::node::Node;
use crate::protocol::{
    AddPeerQuery, AddPeerRes, BalancesRes, ErrRes, SyncQuery, SyncRes, TxAddReq, TxAddRes,
};
use crate::types::{Hash, PeerNode};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

const MAX_BODY_BYTES: u64 = 1024 * 1024;

fn ok<Body: Serialize>(body: &Body) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), StatusCode::OK)
}

fn error_reply(error: &Error) -> WithStatus<Json> {
    let status = if error.is_rejection() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    warp::reply::with_status(
        warp::reply::json(&ErrRes {error: error.to_string()}),
        status,
    )
}

async fn list_balances(node: Node) -> std::result::Result<WithStatus<Json>, warp::Rejection> {
    match node.storage().get_balances().await {
        Ok(balances) => {
            Ok(ok(&BalancesRes {
                block_hash: balances.hash,
                balances: balances.balances,
            }))
        }
        Err(error) => {
            Ok(error_reply(&error))
        }
    }
}

async fn add_tx(body: warp::hyper::body::Bytes, node: Node) -> std::result::Result<WithStatus<Json>, warp::Rejection> {
    let request: TxAddReq = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => return Ok(error_reply(&Error::Json(error))),
    };
    match node.storage().submit_tx(request.into()).await {
        Ok(block_hash) => {
            Ok(ok(&TxAddRes {block_hash}))
        }
        Err(error) => {
            log::debug!("Transaction rejected: {}", error);
            Ok(error_reply(&error))
        }
    }
}

async fn status(node: Node) -> std::result::Result<WithStatus<Json>, warp::Rejection> {
    match node.status().await {
        Ok(status) => Ok(ok(&status)),
        Err(error) => Ok(error_reply(&error)),
    }
}

fn parse_from_block(text: &str) -> Result<Hash> {
    if text.is_empty() {
        return Ok(Hash::default());
    }
    text.parse()
}

async fn sync(query: SyncQuery, node: Node) -> std::result::Result<WithStatus<Json>, warp::Rejection> {
    let from = match parse_from_block(&query.from_block) {
        Ok(hash) => hash,
        Err(error) => return Ok(error_reply(&error)),
    };
    match node.storage().get_blocks_after(from).await {
        Ok(blocks) => Ok(ok(&SyncRes {blocks})),
        Err(error) => Ok(error_reply(&error)),
    }
}

async fn add_peer(query: AddPeerQuery, node: Node) -> std::result::Result<WithStatus<Json>, warp::Rejection> {
    let port = match query.port.parse::<u16>() {
        Ok(port) => port,
        Err(error) => {
            return Ok(ok(&AddPeerRes {
                success: false,
                error: format!("invalid port '{}': {}", query.port, error),
            }))
        }
    };
    if query.ip.is_empty() {
        return Ok(ok(&AddPeerRes {
            success: false,
            error: "missing ip".to_string(),
        }));
    }
    let peer = PeerNode::new(query.ip, port, false, true);
    log::info!("Peer {} was added into known peers", peer.tcp_address());
    node.add_peer(peer).await;
    Ok(ok(&AddPeerRes {
        success: true,
        error: String::new(),
    }))
}

async fn handle_rejection(rejection: warp::Rejection) -> std::result::Result<WithStatus<Json>, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string())
    } else {
        (StatusCode::BAD_REQUEST, format!("{:?}", rejection))
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&ErrRes {error: message}),
        status,
    ))
}

/// All node endpoints, each handler bound to a clone of `node`.
pub fn routes(node: Node) -> impl Filter<Extract = (WithStatus<Json>,), Error = Infallible> + Clone {
    let balances_node = node.clone();
    let balances_route = warp::path!("balances" / "list")
        .and(warp::get())
        .and(warp::any().map(move || balances_node.clone()))
        .and_then(list_balances);
    let tx_node = node.clone();
    let tx_add_route = warp::path!("tx" / "add")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(warp::any().map(move || tx_node.clone()))
        .and_then(add_tx);
    let status_node = node.clone();
    let status_route = warp::path!("node" / "status")
        .and(warp::get())
        .and(warp::any().map(move || status_node.clone()))
        .and_then(status);
    let sync_node = node.clone();
    let sync_route = warp::path!("node" / "sync")
        .and(warp::get())
        .and(warp::query::<SyncQuery>())
        .and(warp::any().map(move || sync_node.clone()))
        .and_then(sync);
    let peer_node = node;
    let peer_route = warp::path!("node" / "peer")
        .and(warp::get())
        .and(warp::query::<AddPeerQuery>())
        .and(warp::any().map(move || peer_node.clone()))
        .and_then(add_peer);
    balances_route
        .or(tx_add_route)
        .unify()
        .or(status_route)
        .unify()
        .or(sync_route)
        .unify()
        .or(peer_route)
        .unify()
        .recover(handle_rejection)
        .unify()
}

/// Serve the node endpoints on `address` until `token` is cancelled.
pub async fn run_api(address: SocketAddr, node: Node, token: CancellationToken) -> Result<()> {
    let (bound, server) = warp::serve(routes(node))
        .try_bind_with_graceful_shutdown(address, async move { token.cancelled().await })
        .map_err(|error| Error::Bind(address.to_string(), error.to_string()))?;
    log::info!("Listening on: {}", bound);
    server.await;
    log::debug!("API stopped");
    Ok(())
}
