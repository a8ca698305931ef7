use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use colored::Colorize;
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::{
    select,
    sync::{
        broadcast::{error::RecvError, Sender},
        RwLock,
    },
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, trace, warn};

use crate::{
    market::{coinranking, news, CoinRanking, NewsApi, UpstreamResponse},
    portfolio::Portfolio,
    state::{StateEvent, TradeRecord},
    trade::{TradeAction, TradeError, TradeRequest},
    valuation::{Valuation, ValuationPoint},
    AppEvent,
};

pub struct ServerState {
    app_tx: Sender<AppEvent>,
    app_state: Arc<RwLock<crate::state::State>>,
    coinranking: CoinRanking,
    news: NewsApi,
}

type SharedServerState = Arc<ServerState>;

impl ServerState {
    pub fn new(
        app_state: Arc<RwLock<crate::state::State>>,
        app_tx: Sender<AppEvent>,
        coinranking: CoinRanking,
        news: NewsApi,
    ) -> Self {
        Self {
            app_tx,
            app_state,
            coinranking,
            news,
        }
    }
}

/// Error answered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Trade(TradeError),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Trade(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(err) => {
                error!("Request failed : {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err))
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<TradeError> for ApiError {
    fn from(err: TradeError) -> Self {
        ApiError::Trade(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct PortfolioResponse {
    portfolio: Portfolio,
}

#[derive(Serialize)]
struct PortfolioOverview {
    portfolio: Portfolio,
    #[serde(flatten)]
    valuation: Valuation,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<ValuationPoint>,
}

#[derive(Serialize)]
struct TradesResponse {
    trades: Vec<TradeRecord>,
}

#[derive(Deserialize)]
struct CoinsQuery {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    timeperiod: Option<String>,
}

#[derive(Deserialize)]
struct NewsQuery {
    q: Option<String>,
    count: Option<u32>,
}

#[derive(Deserialize)]
struct ValuationRequest {
    #[serde(default)]
    prices: HashMap<String, Decimal>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/cryptos", get(get_cryptos))
        .route("/api/crypto/{coin_id}", get(get_crypto))
        .route("/api/crypto/{coin_id}/history", get(get_crypto_history))
        .route("/api/news", get(get_news))
        .route("/api/trade", post(post_trade))
        .route("/api/trades", get(get_trades))
        .route("/api/portfolio", get(get_portfolio))
        .route("/api/portfolio/valuation", post(post_valuation))
        .route("/api/portfolio/history", get(get_history))
        .route("/ws", any(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn start(address: String, state: ServerState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn forward(res: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(res.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(res.body)).into_response()
}

async fn get_cryptos(
    State(state): State<SharedServerState>,
    query: Result<Query<CoinsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(coinranking::DEFAULT_LIMIT);
    Ok(forward(state.coinranking.get_coins(limit).await?))
}

async fn get_crypto(
    State(state): State<SharedServerState>,
    Path(coin_id): Path<String>,
) -> Result<Response, ApiError> {
    Ok(forward(state.coinranking.get_coin(&coin_id).await?))
}

async fn get_crypto_history(
    State(state): State<SharedServerState>,
    Path(coin_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let time_period = query
        .timeperiod
        .unwrap_or_else(|| coinranking::DEFAULT_TIME_PERIOD.to_owned());
    Ok(forward(
        state
            .coinranking
            .get_coin_history(&coin_id, &time_period)
            .await?,
    ))
}

async fn get_news(
    State(state): State<SharedServerState>,
    query: Result<Query<NewsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let q = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(String::from("Missing 'q' query parameter")))?;
    let count = query.count.unwrap_or(news::DEFAULT_COUNT);
    Ok(forward(state.news.search(&q, count).await?))
}

async fn post_trade(
    State(state): State<SharedServerState>,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<PortfolioResponse>, ApiError> {
    let Json(request) = payload?;

    // the write guard is held until the events are broadcast, so subscribers
    // observe trades in the order they were applied
    let mut app_state = state.app_state.write().await;
    let events = app_state.execute(&request).inspect_err(|err| {
        debug!("Trade rejected : {}", err);
    })?;

    for event in events {
        if let StateEvent::Trade(record) = &event {
            info!(
                " {} {} {} at {} (total {})",
                match record.action {
                    TradeAction::Buy => "BUY".green(),
                    TradeAction::Sell => "SELL".red(),
                },
                record.amount,
                record.coin_id,
                record.price,
                record.total
            );
        }
        let _ = state.app_tx.send(AppEvent::State(event));
    }

    let portfolio = app_state.portfolio().clone();
    info!("{}", portfolio);
    Ok(Json(PortfolioResponse { portfolio }))
}

async fn get_trades(State(state): State<SharedServerState>) -> Json<TradesResponse> {
    let app_state = state.app_state.read().await;
    Json(TradesResponse {
        trades: app_state.trades().iter().cloned().collect(),
    })
}

async fn get_portfolio(State(state): State<SharedServerState>) -> Json<PortfolioOverview> {
    let app_state = state.app_state.read().await;
    Json(PortfolioOverview {
        portfolio: app_state.portfolio().clone(),
        valuation: app_state.valuation(),
    })
}

async fn post_valuation(
    State(state): State<SharedServerState>,
    payload: Result<Json<ValuationRequest>, JsonRejection>,
) -> Result<Json<Valuation>, ApiError> {
    let Json(request) = payload?;
    if let Some((coin_id, price)) = request.prices.iter().find(|(_, p)| **p < Decimal::ZERO) {
        return Err(ApiError::BadRequest(format!(
            "Invalid price {} for {}",
            price, coin_id
        )));
    }
    let app_state = state.app_state.read().await;
    Ok(Json(app_state.valuation_at(&request.prices)))
}

async fn get_history(State(state): State<SharedServerState>) -> Json<HistoryResponse> {
    let app_state = state.app_state.read().await;
    Json(HistoryResponse {
        history: app_state.history().points(),
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &AppEvent) -> Result<()> {
    let msg = serde_json::ser::to_string(event)?;
    sender.send(Message::Text(msg.into())).await?;
    Ok(())
}

async fn handle_socket(socket: WebSocket, state: SharedServerState) {
    // subscribe before reading the snapshot so no update falls in between
    let mut app_rx = state.app_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let snapshot = {
        let app_state = state.app_state.read().await;
        AppEvent::State(StateEvent::Portfolio(app_state.portfolio().clone()))
    };
    if let Err(err) = send_event(&mut sender, &snapshot).await {
        debug!("Websocket closed before snapshot : {}", err);
        return;
    }

    let mut send_task = tokio::task::spawn(async move {
        loop {
            match app_rx.recv().await {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Websocket client lagging, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return,
            }
        }
    });

    let mut recv_task = tokio::task::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            trace!("Received websocket message : {:?}", msg);
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }
}
