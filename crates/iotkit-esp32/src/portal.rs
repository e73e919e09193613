//! SoftAP configuration portal for ESP32.
//!
//! Opens an open access point named after the device and serves the
//! configuration form on port 80. Submissions reach the provisioning
//! controller through a channel drained by [`ConfigPortal::poll`].

use std::fmt::Write as _;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::{Read, Write};
use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration};
use log::{info, warn};

use iotkit_core::{
    BrokerSubmission, ConfigPortal, PortalError, PortalEvent, PortalRequest, PortalSubmission,
};

use crate::wifi::{lock, SharedWifi};

/// Largest form body accepted.
const MAX_BODY_LEN: usize = 1024;

struct Running {
    _server: EspHttpServer<'static>,
    submissions: Receiver<PortalSubmission>,
}

/// [`ConfigPortal`] on the ESP32 access point.
pub struct SoftApPortal {
    wifi: SharedWifi,
    running: Option<Running>,
}

impl SoftApPortal {
    pub fn new(wifi: SharedWifi) -> Self {
        Self {
            wifi,
            running: None,
        }
    }

    fn start_access_point(&self, name: &str) -> Result<(), PortalError> {
        let failed = |reason: String| PortalError::AccessPoint {
            name: name.to_string(),
            reason,
        };
        let ap = AccessPointConfiguration {
            ssid: name
                .try_into()
                .map_err(|_| failed("name too long (max 32 chars)".to_string()))?,
            auth_method: AuthMethod::None,
            ..Default::default()
        };

        let mut wifi = lock(&self.wifi).map_err(|e| failed(e.to_string()))?;
        wifi.set_configuration(&Configuration::Mixed(ClientConfiguration::default(), ap))
            .map_err(|e| failed(e.to_string()))?;
        if !wifi.is_started().map_err(|e| failed(e.to_string()))? {
            wifi.start().map_err(|e| failed(e.to_string()))?;
        }
        Ok(())
    }

    fn start_server(&self, request: &PortalRequest) -> Result<Running, PortalError> {
        let server_error = |e: esp_idf_svc::sys::EspError| PortalError::Server(e.to_string());
        let mut server = EspHttpServer::new(&HttpConfiguration::default()).map_err(server_error)?;
        let (tx, rx) = mpsc::channel();

        let form = render_form(request);
        server
            .fn_handler("/", Method::Get, move |req| {
                req.into_ok_response()?.write_all(form.as_bytes())
            })
            .map_err(server_error)?;

        let with_broker = request.broker_defaults.is_some();
        server
            .fn_handler::<anyhow::Error, _>("/save", Method::Post, move |mut req| {
                let mut body = Vec::new();
                let mut buf = [0u8; 256];
                loop {
                    let n = req.read(&mut buf)?;
                    if n == 0 || body.len() + n > MAX_BODY_LEN {
                        break;
                    }
                    body.extend_from_slice(&buf[..n]);
                }

                let submission = parse_form(&body, with_broker);
                let ssid = escape_html(&submission.ssid);
                let page = if tx.send(submission).is_ok() {
                    format!("<p>Saved. Joining <b>{}</b>.</p>", ssid)
                } else {
                    "<p>Configuration portal is closing.</p>".to_string()
                };
                req.into_ok_response()?.write_all(page.as_bytes())?;
                Ok(())
            })
            .map_err(server_error)?;

        Ok(Running {
            _server: server,
            submissions: rx,
        })
    }
}

impl ConfigPortal for SoftApPortal {
    fn open(&mut self, request: &PortalRequest) -> Result<(), PortalError> {
        self.close();
        self.start_access_point(&request.access_point)?;
        self.running = Some(self.start_server(request)?);
        info!("Configuration portal open on access point {}", request.access_point);
        Ok(())
    }

    fn poll(&mut self) -> PortalEvent {
        let Some(running) = self.running.as_ref() else {
            return PortalEvent::Failed(PortalError::NotOpen);
        };
        match running.submissions.try_recv() {
            Ok(submission) => PortalEvent::Submitted(submission),
            Err(TryRecvError::Empty) => PortalEvent::Pending,
            Err(TryRecvError::Disconnected) => PortalEvent::Closed,
        }
    }

    fn close(&mut self) {
        if self.running.take().is_none() {
            return;
        }
        match lock(&self.wifi) {
            Ok(mut wifi) => {
                if let Err(e) =
                    wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))
                {
                    warn!("Failed to leave access point mode: {}", e);
                }
            }
            Err(e) => warn!("{}", e),
        }
        info!("Configuration portal closed");
    }
}

fn parse_form(body: &[u8], with_broker: bool) -> PortalSubmission {
    let mut submission = PortalSubmission::default();
    let mut broker = BrokerSubmission::default();
    for (key, value) in url::form_urlencoded::parse(body) {
        let value = value.into_owned();
        match key.as_ref() {
            "ssid" => submission.ssid = value,
            "password" => submission.password = value,
            "mqtt_server" => broker.server = value,
            "mqtt_port" => broker.port = value,
            "mqtt_user" => broker.user = value,
            "mqtt_password" => broker.password = value,
            _ => {}
        }
    }
    if with_broker {
        submission = submission.with_broker(broker);
    }
    submission
}

fn render_form(request: &PortalRequest) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><title>{0}</title>\
         <meta name=\"viewport\" content=\"width=device-width\"></head><body>\
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
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
