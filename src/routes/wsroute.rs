use crate::config::WsConfig;
use crate::error::AppError;
use crate::models::VideoId;
use crate::state::AppState;
use crate::websocket::{BroadcastRouter, Connection, Topic};
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

// Topic message or direct reply headed for the socket
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Outbound(String);

// Client frame waiting for the per-connection worker
enum Inbound {
    Text(String),
    Binary(usize),
}

// WebSocket Actor
struct WsSession {
    connection: Arc<Connection>,
    router: BroadcastRouter,
    ws: WsConfig,
    hb: Instant,
    // Taken in `started`
    outbound: Option<UnboundedReceiver<String>>,
    // Feeds the per-connection worker; dropped on stop
    inbound: Option<UnboundedSender<Inbound>>,
}

impl WsSession {
    fn new(
        connection: Arc<Connection>,
        outbound: UnboundedReceiver<String>,
        router: BroadcastRouter,
        ws: WsConfig,
    ) -> Self {
        Self {
            connection,
            router,
            ws,
            hb: Instant::now(),
            outbound: Some(outbound),
            inbound: None,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.ws.client_timeout;
        ctx.run_interval(self.ws.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(
                    connection = ?act.connection.id(),
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Frames of one connection are handled one after another, in arrival order
    fn start_worker(&mut self) {
        let (tx, mut rx) = unbounded_channel::<Inbound>();
        let router = self.router.clone();
        let connection = self.connection.clone();

        actix_rt::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if !connection.is_open() {
                    break;
                }
                let outcome = match frame {
                    Inbound::Text(text) => router.handle_text(&connection, &text).await,
                    Inbound::Binary(len) => router.handle_binary(&connection, len),
                };
                tracing::debug!(
                    connection = ?connection.id(),
                    outcome = outcome.as_str(),
                    "inbound frame handled"
                );
            }
        });

        self.inbound = Some(tx);
    }

    fn enqueue(&self, frame: Inbound, ctx: &mut ws::WebsocketContext<Self>) {
        let queued = self
            .inbound
            .as_ref()
            .map(|tx| tx.send(frame).is_ok())
            .unwrap_or(false);
        if !queued {
            tracing::warn!(connection = ?self.connection.id(), "worker gone, stopping session");
            ctx.stop();
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            connection = ?self.connection.id(),
            topic = %self.connection.topic(),
            "WebSocket session started"
        );

        self.hb(ctx);

        if let Some(rx) = self.outbound.take() {
            ctx.add_message_stream(UnboundedReceiverStream::new(rx).map(Outbound));
        }

        self.start_worker();
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            connection = ?self.connection.id(),
            topic = %self.connection.topic(),
            "WebSocket session stopped"
        );

        // Cleanup: the worker exits after the event in flight
        self.inbound.take();
        self.connection.close();
    }
}

impl Handler<Outbound> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

// Handle WebSocket protocol messages
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.enqueue(Inbound::Text(text.to_string()), ctx);
            }
            Ok(ws::Message::Binary(bytes)) => {
                tracing::warn!("Binary WebSocket messages not supported");
                // Queued behind earlier text frames so replies stay in order
                self.enqueue(Inbound::Binary(bytes.len()), ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!("WebSocket close message received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                let err = AppError::Protocol(e.to_string());
                tracing::warn!(connection = ?self.connection.id(), error = %err, "closing connection");
                ctx.stop();
            }
            _ => {}
        }
    }
}

fn start_session(
    topic: Topic,
    req: &HttpRequest,
    stream: web::Payload,
    state: &AppState,
) -> Result<HttpResponse, Error> {
    let (connection, rx) = state.lifecycle.connect(topic);
    let session = WsSession::new(connection, rx, state.router.clone(), state.config.ws.clone());
    // On a failed handshake the session is dropped and the connection leaves with it
    ws::start(session, req, stream)
}

#[get("/ws/videos/{video_id}")]
pub async fn ws_views(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, Error> {
    let topic = Topic::VideoViews(VideoId(path.into_inner()));
    start_session(topic, &req, stream, &state)
}

#[get("/ws/ratings/{video_id}")]
pub async fn ws_ratings(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, Error> {
    let topic = Topic::VideoRatings(VideoId(path.into_inner()));
    start_session(topic, &req, stream, &state)
}

#[get("/ws/comments")]
pub async fn ws_comments(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    start_session(Topic::Comments, &req, stream, &state)
}
