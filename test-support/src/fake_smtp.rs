use log::debug;
use mailin_embedded::{Handler, Server, SslConfig};
use std::{
    net::IpAddr,
    sync::{Mutex, OnceLock},
    time::Duration,
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::timeout,
};

pub const SMTP_PORT: u16 = 4587;
pub const REJECTING_SMTP_PORT: u16 = 4588;

#[derive(Clone)]
struct RecordingSmtpHandler {
    buffer: Vec<u8>,
    received: UnboundedSender<String>,
}

impl Handler for RecordingSmtpHandler {
    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        debug!("Got data:\n{}", String::from_utf8_lossy(buf));
        self.buffer.extend(buf);
        Ok(())
    }

    fn data_end(&mut self) -> mailin_embedded::Response {
        let content = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
        // The receiving side may already be gone at the end of a test run.
        let _ = self.received.send(content);
        mailin_embedded::response::OK
    }

    fn auth_plain(
        &mut self,
        authorization_id: &str,
        authentication_id: &str,
        password: &str,
    ) -> mailin_embedded::Response {
        debug!("Got authentication data {authorization_id}, {authentication_id}, {password}");
        mailin_embedded::response::AUTH_OK
    }
}

/// SMTP server on [`SMTP_PORT`] which accepts every message and hands the raw
/// message content to the test in the order received.
pub struct FakeSmtpServer {
    server: Mutex<Option<Server<RecordingSmtpHandler>>>,
    received: tokio::sync::Mutex<UnboundedReceiver<String>>,
}

impl FakeSmtpServer {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handler = RecordingSmtpHandler {
            buffer: Vec::new(),
            received: sender,
        };
        let mut server = Server::new(handler);
        server
            .with_name("contact.example.com")
            .with_ssl(SslConfig::None)
            .unwrap()
            .with_addr(format!("0.0.0.0:{SMTP_PORT}"))
            .unwrap();
        Self {
            server: Mutex::new(Some(server)),
            received: tokio::sync::Mutex::new(receiver),
        }
    }

    /// The server shared by every test in the process, since they all use the
    /// same port.
    pub fn shared() -> &'static FakeSmtpServer {
        static FAKE_SMTP: OnceLock<FakeSmtpServer> = OnceLock::new();
        FAKE_SMTP.get_or_init(FakeSmtpServer::new)
    }

    /// Starts serving on a background thread. Calling this again is a no-op.
    pub fn start(&self) {
        let mut guard = self.server.lock().unwrap();
        if let Some(server) = guard.take() {
            std::thread::spawn(move || {
                let _ = server.serve();
            });
        }
    }

    pub fn url() -> String {
        format!("smtp://localhost:{SMTP_PORT}")
    }

    /// Waits for the next message the server accepts.
    pub async fn next_mail_content(&self) -> Option<String> {
        self.received.lock().await.recv().await
    }

    /// Like [`Self::next_mail_content`], but with quoted-printable soft line
    /// breaks removed so that text wrapped by the sender can be matched whole.
    pub async fn next_unwrapped_mail_content(&self) -> Option<String> {
        self.next_mail_content()
            .await
            .map(|content| content.replace("=\r\n", ""))
    }

    /// Discards messages left over from earlier tests.
    pub async fn flush(&self) {
        let mut receiver = self.received.lock().await;
        while let Ok(Some(_)) = timeout(Duration::from_millis(100), receiver.recv()).await {}
    }
}

impl Default for FakeSmtpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct RejectingSmtpHandler;

impl Handler for RejectingSmtpHandler {
    fn helo(&mut self, _ip: IpAddr, _domain: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, _from: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }
}

/// Starts an SMTP server on [`REJECTING_SMTP_PORT`] which refuses every message.
pub fn start_rejecting_smtp_server() -> String {
    let mut server = Server::new(RejectingSmtpHandler);
    server
        .with_name("contact.example.com")
        .with_ssl(SslConfig::None)
        .unwrap()
        .with_addr(format!("0.0.0.0:{REJECTING_SMTP_PORT}"))
        .unwrap();
    std::thread::spawn(move || {
        let _ = server.serve();
    });
    format!("smtp://localhost:{REJECTING_SMTP_PORT}")
}
