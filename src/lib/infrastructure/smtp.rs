//! SMTP transport implementation

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use clap::{ArgAction, Parser};
use lettre::transport::smtp::{
    authentication::{Credentials, Mechanism},
    client::{SmtpConnection, TlsParameters},
    extension::ClientId,
};
use tokio::{runtime::Handle, task};
use tracing::{debug, info};

use crate::domain::{
    mailer::{SendError, Session, SessionError, Transport, TransportMessage},
    specification::{Encryption, TransportConfig},
};

/// Process-level SMTP settings that do not belong in a specification document
#[derive(Clone, Debug, Parser)]
pub struct SmtpOptions {
    /// Verify the TLS certificate
    #[clap(long, env = "SMTP_VERIFY_TLS", default_value_t = true, action = ArgAction::Set)]
    pub verify_tls: bool,

    /// Name announced in EHLO (defaults to the local host name)
    #[clap(long, env = "SMTP_HELO_NAME")]
    pub helo_name: Option<String>,
}

impl Default for SmtpOptions {
    fn default() -> Self {
        Self {
            verify_tls: true,
            helo_name: None,
        }
    }
}

/// SMTP mailer
#[derive(Debug, Default, Clone)]
pub struct SmtpMailer {
    options: SmtpOptions,
}

impl SmtpMailer {
    /// Create a new SMTP mailer
    pub fn new(options: SmtpOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Transport for SmtpMailer {
    type Session = SmtpSession;

    async fn open(&self, config: &TransportConfig) -> Result<SmtpSession, SessionError> {
        let settings = ConnectionSettings::new(config, &self.options)?;
        let connection = settings.connect().await?;

        info!(host = %settings.host, port = settings.port, "SMTP session open");

        Ok(SmtpSession {
            settings,
            connection: Some(connection),
        })
    }
}

/// Everything needed to (re)connect to the server
#[derive(Clone)]
struct ConnectionSettings {
    host: String,
    port: u16,
    encryption: Encryption,
    timeout: Duration,
    hello: ClientId,
    tls: Option<TlsParameters>,
    credentials: Option<Credentials>,
    username: Option<String>,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encryption", &self.encryption)
            .field("timeout", &self.timeout)
            .field("username", &self.username)
            .finish()
    }
}

impl ConnectionSettings {
    fn new(config: &TransportConfig, options: &SmtpOptions) -> Result<Self, SessionError> {
        let tls = match config.encryption {
            Encryption::None => None,
            Encryption::Starttls | Encryption::Tls => Some(
                TlsParameters::builder(config.host.clone())
                    .dangerous_accept_invalid_certs(!options.verify_tls)
                    .build()
                    .map_err(|err| SessionError::UnknownError(err.into()))?,
            ),
        };

        let credentials = config
            .credentials
            .as_ref()
            .map(|credentials| {
                env::var(&credentials.password_env)
                    .map(|password| Credentials::new(credentials.username.clone(), password))
                    .map_err(|_| SessionError::MissingPassword(credentials.password_env.clone()))
            })
            .transpose()?;

        let hello = match &options.helo_name {
            Some(name) => ClientId::Domain(name.clone()),
            None => ClientId::default(),
        };

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            encryption: config.encryption,
            timeout: config.timeout,
            hello,
            tls,
            credentials,
            username: config
                .credentials
                .as_ref()
                .map(|credentials| credentials.username.clone()),
        })
    }

    async fn connect(&self) -> Result<SmtpConnection, SessionError> {
        let settings = self.clone();

        task::spawn_blocking(move || settings.connect_blocking())
            .await
            .map_err(|err| SessionError::UnknownError(err.into()))?
    }

    fn connect_blocking(&self) -> Result<SmtpConnection, SessionError> {
        let refused = |reason: String| SessionError::Connect {
            host: self.host.clone(),
            port: self.port,
            reason,
        };

        let wrapper = match self.encryption {
            Encryption::Tls => self.tls.as_ref(),
            Encryption::None | Encryption::Starttls => None,
        };

        let mut connection = SmtpConnection::connect(
            (self.host.as_str(), self.port),
            Some(self.timeout),
            &self.hello,
            wrapper,
            None,
        )
        .map_err(|err| refused(err.to_string()))?;

        if let (Encryption::Starttls, Some(tls)) = (self.encryption, &self.tls) {
            if !connection.can_starttls() {
                connection.abort();

                return Err(refused("server does not offer STARTTLS".to_string()));
            }

            connection
                .starttls(tls, &self.hello)
                .map_err(|err| refused(err.to_string()))?;
        }

        if let Some(credentials) = &self.credentials {
            if let Err(err) = connection.auth(&[Mechanism::Plain, Mechanism::Login], credentials) {
                connection.abort();

                return Err(SessionError::Authentication {
                    username: self.username.clone().unwrap_or_default(),
                    reason: err.to_string(),
                });
            }
        }

        Ok(connection)
    }
}

/// One SMTP connection, reused for every message of a batch
pub struct SmtpSession {
    settings: ConnectionSettings,
    connection: Option<SmtpConnection>,
}

impl fmt::Debug for SmtpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSession")
            .field("settings", &self.settings)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

#[async_trait]
impl Session for SmtpSession {
    async fn send(&mut self, message: &TransportMessage) -> Result<(), SendError> {
        // A rejected message makes the server drop the transaction; reconnect before the next.
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                debug!(host = %self.settings.host, "reconnecting");

                self.settings.connect().await?
            }
        };

        let envelope = message.envelope().clone();
        let email = message.formatted();

        let (connection, result) = task::spawn_blocking(move || {
            let result = connection.send(&envelope, &email);

            (connection, result)
        })
        .await
        .map_err(|err| SessionError::UnknownError(err.into()))?;

        match result {
            Ok(_) => {
                self.connection = Some(connection);

                Ok(())
            }
            Err(err) if err.is_permanent() || err.is_transient() => {
                if !connection.has_broken() {
                    self.connection = Some(connection);
                }

                Err(SendError::Rejected(err.to_string()))
            }
            Err(err) => Err(SessionError::Broken(err.to_string()).into()),
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        task::spawn_blocking(move || connection.quit())
            .await
            .map_err(|err| SessionError::UnknownError(err.into()))?
            .map_err(|err| SessionError::Broken(err.to_string()))?;

        debug!(host = %self.settings.host, "SMTP session closed");

        Ok(())
    }
}

impl Drop for SmtpSession {
    fn drop(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        // Aborting writes QUIT, which must not block an async worker.
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || connection.abort());
            }
            Err(_) => connection.abort(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Write},
        net::{TcpListener, TcpStream},
        thread::{self, JoinHandle},
    };

    use testresult::TestResult;

    use crate::domain::{
        mailer::{Attachments, MessageBuilder},
        merge::render_message,
        specification::{Credentials as CredentialsReference, Specification},
    };

    use super::*;

    /// Answers `connections` SMTP clients in turn, refusing `RCPT TO` for `refused`, and returns
    /// every command it received.
    fn smtp_server(connections: usize, refused: &'static str) -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener binds");
        let port = listener.local_addr().expect("listener has an address").port();

        let handle = thread::spawn(move || {
            let mut commands = Vec::new();

            for stream in listener.incoming().take(connections) {
                serve(stream.expect("client connects"), refused, &mut commands);
            }

            commands
        });

        (port, handle)
    }

    fn reply(stream: &mut TcpStream, line: &str) {
        let _ = stream.write_all(format!("{line}\r\n").as_bytes());
    }

    fn serve(mut stream: TcpStream, refused: &str, commands: &mut Vec<String>) {
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout is set");
        let mut reader = BufReader::new(stream.try_clone().expect("stream clones"));

        reply(&mut stream, "220 localhost ready");

        let mut line = String::new();
        let mut in_data = false;

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            let command = line.trim_end().to_string();

            if in_data {
                if command == "." {
                    in_data = false;
                    reply(&mut stream, "250 queued");
                }
                continue;
            }

            commands.push(command.clone());

            if command.starts_with("EHLO") || command.starts_with("HELO") {
                reply(&mut stream, "250 localhost");
            } else if command.starts_with("RCPT TO") && command.contains(refused) {
                reply(&mut stream, "550 mailbox unavailable");
            } else if command.starts_with("DATA") {
                in_data = true;
                reply(&mut stream, "354 end data with <CR><LF>.<CR><LF>");
            } else if command.starts_with("QUIT") {
                reply(&mut stream, "221 bye");
                break;
            } else {
                reply(&mut stream, "250 ok");
            }
        }
    }

    async fn commands_seen(server: JoinHandle<Vec<String>>) -> Vec<String> {
        task::spawn_blocking(move || server.join())
            .await
            .expect("join task completes")
            .expect("server thread finishes")
    }

    fn local(port: u16) -> TransportConfig {
        TransportConfig {
            port,
            timeout: Duration::from_secs(5),
            ..config(Encryption::None)
        }
    }

    fn message(to: &str) -> TransportMessage {
        let spec = Specification::from_yaml_str(&format!(
            "sender:\n  address: news@example.com\ntransport: {{}}\ntemplate:\n  subject: Hi\n  body: Hello\nrecipients:\n  - address: {to}\n"
        ))
        .expect("test specification is valid");
        let attachments = Attachments::default();

        MessageBuilder::new(&spec, &attachments)
            .expect("builder is ready")
            .build(
                &spec.recipients()[0],
                render_message(spec.template(), spec.fields()),
            )
            .expect("message builds")
    }

    fn config(encryption: Encryption) -> TransportConfig {
        TransportConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            encryption,
            credentials: None,
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_default_options_verify_tls() {
        assert!(SmtpOptions::default().verify_tls);
        assert!(SmtpOptions::default().helo_name.is_none());
    }

    #[test]
    fn test_options_parse_from_arguments() {
        let options =
            SmtpOptions::parse_from(["mailcast", "--verify-tls", "false", "--helo-name", "mx.local"]);

        assert!(!options.verify_tls);
        assert_eq!(options.helo_name.as_deref(), Some("mx.local"));
    }

    #[test]
    fn test_missing_password_variable_is_reported() {
        let mut config = config(Encryption::None);
        config.credentials = Some(CredentialsReference {
            username: "mailer".to_string(),
            password_env: "MAILCAST_TEST_PASSWORD_THAT_IS_NEVER_SET".to_string(),
        });

        let result = ConnectionSettings::new(&config, &SmtpOptions::default());

        assert!(matches!(
            result,
            Err(SessionError::MissingPassword(name)) if name == "MAILCAST_TEST_PASSWORD_THAT_IS_NEVER_SET"
        ));
    }

    #[test]
    fn test_plain_connection_has_no_tls_parameters() {
        let settings = ConnectionSettings::new(&config(Encryption::None), &SmtpOptions::default())
            .expect("settings build without credentials");

        assert!(settings.tls.is_none());
        assert!(settings.credentials.is_none());
    }

    #[tokio::test]
    async fn test_open_fails_when_nothing_listens() {
        let result = SmtpMailer::default().open(&config(Encryption::None)).await;

        assert!(matches!(
            result,
            Err(SessionError::Connect { port: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_message_reconnects_for_the_next() -> TestResult {
        let (port, server) = smtp_server(2, "refused@example.com");

        let mut session = SmtpMailer::default().open(&local(port)).await?;

        let rejected = session.send(&message("refused@example.com")).await;
        assert!(matches!(rejected, Err(SendError::Rejected(_))));

        session.send(&message("alice@example.com")).await?;
        session.close().await?;

        let commands = commands_seen(server).await;

        assert_eq!(
            commands.iter().filter(|command| command.starts_with("EHLO")).count(),
            2
        );
        assert!(commands
            .iter()
            .any(|command| command.starts_with("RCPT TO:<alice@example.com>")));
        assert_eq!(commands.last().map(String::as_str), Some("QUIT"));

        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_session_still_quits() -> TestResult {
        let (port, server) = smtp_server(1, "nobody@example.com");

        let session = SmtpMailer::default().open(&local(port)).await?;
        drop(session);

        let commands = commands_seen(server).await;

        assert_eq!(commands.last().map(String::as_str), Some("QUIT"));

        Ok(())
    }
}
