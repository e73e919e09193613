//! HTTP configuration portal.
//!
//! # Endpoints
//!
//! ### `GET /`
//! Form for the network credentials and, when the settings record carries a
//! broker section, the broker fields pre-filled with the stored values.
//!
//! ### `POST /save`
//! Form submission (`application/x-www-form-urlencoded`). The values are
//! handed to the provisioning controller on its next poll.
//!
//! The server runs on the tokio runtime whose [`Handle`] is passed in; the
//! [`ConfigPortal`] methods themselves are synchronous and never block.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Form, State},
    response::Html,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use iotkit_core::{
    BrokerSubmission, ConfigPortal, PortalError, PortalEvent, PortalRequest, PortalSubmission,
};

struct PortalState {
    request: PortalRequest,
    submissions: mpsc::UnboundedSender<PortalSubmission>,
}

type SharedPortal = Arc<PortalState>;

/// Fields posted by the form. Broker fields are absent when hidden.
#[derive(Debug, Deserialize)]
struct SaveForm {
    #[serde(default)]
    ssid: String,
    #[serde(default)]
    password: String,
    mqtt_server: Option<String>,
    mqtt_port: Option<String>,
    mqtt_user: Option<String>,
    mqtt_password: Option<String>,
}

impl SaveForm {
    fn into_submission(self, with_broker: bool) -> PortalSubmission {
        let submission = PortalSubmission::new(self.ssid, self.password);
        if !with_broker {
            return submission;
        }
        submission.with_broker(BrokerSubmission {
            server: self.mqtt_server.unwrap_or_default(),
            port: self.mqtt_port.unwrap_or_default(),
            user: self.mqtt_user.unwrap_or_default(),
            password: self.mqtt_password.unwrap_or_default(),
        })
    }
}

struct Running {
    local_addr: SocketAddr,
    submissions: mpsc::UnboundedReceiver<PortalSubmission>,
    server: JoinHandle<()>,
}

/// [`ConfigPortal`] serving a web form over HTTP.
pub struct HttpPortal {
    bind_addr: SocketAddr,
    runtime: Handle,
    running: Option<Running>,
}

impl HttpPortal {
    pub fn new(bind_addr: SocketAddr, runtime: Handle) -> Self {
        Self {
            bind_addr,
            runtime,
            running: None,
        }
    }

    /// Address the server is listening on while open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn is_open(&self) -> bool {
        self.running.is_some()
    }
}

impl ConfigPortal for HttpPortal {
    fn open(&mut self, request: &PortalRequest) -> Result<(), PortalError> {
        self.close();

        let listener = std::net::TcpListener::bind(self.bind_addr)
            .and_then(|l| l.set_nonblocking(true).map(|()| l))
            .map_err(|e| PortalError::Server(format!("{}: {}", self.bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| PortalError::Server(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(PortalState {
            request: request.clone(),
            submissions: tx,
        });
        let app = router(state);

        let server = self.runtime.spawn(async move {
            let listener = match tokio::net::TcpListener::from_std(listener) {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Portal listener error: {}", e);
                    return;
                }
            };
            if let Err(e) = axum::serve(listener, app).await {
                error!("Portal server error: {}", e);
            }
        });

        info!(
            access_point = %request.access_point,
            "configuration portal on http://{}",
            local_addr
        );
        self.running = Some(Running {
            local_addr,
            submissions: rx,
            server,
        });
        Ok(())
    }

    fn poll(&mut self) -> PortalEvent {
        let Some(running) = self.running.as_mut() else {
            return PortalEvent::Failed(PortalError::NotOpen);
        };

        match running.submissions.try_recv() {
            Ok(submission) => PortalEvent::Submitted(submission),
            Err(mpsc::error::TryRecvError::Empty) if running.server.is_finished() => {
                PortalEvent::Failed(PortalError::Server("server stopped".to_string()))
            }
            Err(mpsc::error::TryRecvError::Empty) => PortalEvent::Pending,
            Err(mpsc::error::TryRecvError::Disconnected) => PortalEvent::Closed,
        }
    }

    fn close(&mut self) {
        if let Some(running) = self.running.take() {
            running.server.abort();
            debug!(addr = %running.local_addr, "configuration portal closed");
        }
    }
}

impl Drop for HttpPortal {
    fn drop(&mut self) {
        self.close();
    }
}

fn router(state: SharedPortal) -> Router {
    Router::new()
        .route("/", get(form_handler))
        .route("/save", post(save_handler))
        .with_state(state)
}

/// Handler for `GET /`.
async fn form_handler(State(state): State<SharedPortal>) -> Html<String> {
    Html(render_form(&state.request))
}

/// Handler for `POST /save`.
async fn save_handler(
    State(state): State<SharedPortal>,
    Form(form): Form<SaveForm>,
) -> Html<String> {
    let with_broker = state.request.broker_defaults.is_some();
    let submission = form.into_submission(with_broker);
    let ssid = escape_html(&submission.ssid);

    if state.submissions.send(submission).is_err() {
        return Html("<p>Configuration portal is closing.</p>".to_string());
    }
    Html(format!(
        "<!DOCTYPE html><html><body><p>Saved. Joining <b>{}</b>.</p></body></html>",
        ssid
    ))
}

fn render_form(request: &PortalRequest) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><title>{0}</title></head><body>\
         <h1>{0}</h1><form method=\"post\" action=\"/save\">\
         <label>SSID <input name=\"ssid\"></label><br>\
         <label>Password <input name=\"password\" type=\"password\"></label><br>",
        escape_html(&request.access_point)
    );

    if let Some(broker) = &request.broker_defaults {
        let _ = write!(
            html,
            "<label>MQTT server <input name=\"mqtt_server\" value=\"{}\"></label><br>\
             <label>MQTT port <input name=\"mqtt_port\" value=\"{}\"></label><br>\
             <label>MQTT user <input name=\"mqtt_user\" value=\"{}\"></label><br>\
             <label>MQTT password <input name=\"mqtt_password\" type=\"password\" value=\"{}\"></label><br>",
            escape_html(broker.server()),
            broker.port(),
            escape_html(broker.user()),
            escape_html(broker.password()),
        );
    }

    html.push_str("<button type=\"submit\">Save</button></form></body></html>");
    html
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
