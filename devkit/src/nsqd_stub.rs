/*!
Stub HTTP nsqd pour tests sans broker

Démarre un serveur Axum sur 127.0.0.1 (port éphémère) qui répond à
`GET /stats` selon un mode scriptable, modifiable pendant le test.
*/

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Comportement courant du stub sur `/stats`
#[derive(Debug, Clone)]
pub enum StubMode {
    /// 200 + document JSON
    Serve(Value),
    /// Code HTTP d'erreur, corps texte
    Status(u16),
    /// Ne répond jamais (timeout côté client)
    Hang,
    /// 200 + corps qui n'est pas du JSON
    Garbage,
}

#[derive(Debug)]
struct StubState {
    mode: StubMode,
    hits: usize,
}

type SharedStub = Arc<Mutex<StubState>>;

pub struct NsqdStub {
    addr: SocketAddr,
    state: SharedStub,
    handle: JoinHandle<()>,
}

impl NsqdStub {
    pub async fn start(document: Value) -> anyhow::Result<Self> {
        Self::start_with(StubMode::Serve(document)).await
    }

    pub async fn start_with(mode: StubMode) -> anyhow::Result<Self> {
        crate::init_test_logging();

        let state: SharedStub = Arc::new(Mutex::new(StubState { mode, hits: 0 }));
        let app = Router::new()
            .route("/stats", get(stats))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[stub] nsqd stub stopped: {e}");
            }
        });

        log::info!("[stub] nsqd stub listening on {addr}");
        Ok(Self { addr, state, handle })
    }

    /// Adresse au format attendu par `?target=` (sans schéma)
    pub fn target(&self) -> String {
        self.addr.to_string()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn set_mode(&self, mode: StubMode) {
        log::info!("[stub] mode -> {}", mode_name(&mode));
        self.state.lock().mode = mode;
    }

    pub fn serve(&self, document: Value) {
        self.set_mode(StubMode::Serve(document));
    }

    pub fn fail(&self, status: u16) {
        self.set_mode(StubMode::Status(status));
    }

    pub fn hang(&self) {
        self.set_mode(StubMode::Hang);
    }

    pub fn garbage(&self) {
        self.set_mode(StubMode::Garbage);
    }

    /// Nombre de requêtes `/stats` reçues
    pub fn hits(&self) -> usize {
        self.state.lock().hits
    }
}

impl Drop for NsqdStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn stats(State(state): State<SharedStub>) -> Response {
    let mode = {
        let mut guard = state.lock();
        guard.hits += 1;
        guard.mode.clone()
    };

    match mode {
        StubMode::Serve(document) => (
            [(header::CONTENT_TYPE, "application/json")],
            document.to_string(),
        )
            .into_response(),
        StubMode::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "stub failure").into_response()
        }
        StubMode::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        StubMode::Garbage => "this is not json".into_response(),
    }
}

fn mode_name(mode: &StubMode) -> &'static str {
    match mode {
        StubMode::Serve(_) => "serve",
        StubMode::Status(_) => "status",
        StubMode::Hang => "hang",
        StubMode::Garbage => "garbage",
    }
}
