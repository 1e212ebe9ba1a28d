//! IMAP-over-TLS mail gateway.
//!
//! Each fetch opens a session, selects the configured folder, pulls messages
//! past the checkpoint and logs out again. The cursor is `uidvalidity:uid`; a
//! cursor from another UIDVALIDITY epoch is treated as absent.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use super::gateway::MailGateway;
use super::parser::parse_message;
use super::types::{CanonicalMessage, FetchBatch, SyncCheckpoint};
use crate::config::MailConfig;
use crate::error::GatewayError;

type ImapSession = async_imap::Session<Compat<TlsStream<TcpStream>>>;

pub struct ImapGateway {
    config: MailConfig,
    password: Option<String>,
    tls: TlsConnector,
}

/// Parse a `uidvalidity:uid` cursor.
fn parse_cursor(cursor: &str) -> Option<(u32, u32)> {
    let (validity, uid) = cursor.split_once(':')?;
    Some((validity.trim().parse().ok()?, uid.trim().parse().ok()?))
}

fn format_cursor(validity: u32, uid: u32) -> String {
    format!("{}:{}", validity, uid)
}

/// Order and cap the UIDs a search returned.
///
/// Past a cursor the oldest `max` are kept so the next cycle resumes where
/// this one stopped. Without a cursor the newest `max` are kept.
fn select_uids(found: HashSet<u32>, after: Option<u32>, max: usize) -> Vec<u32> {
    let mut uids: Vec<u32> = found
        .into_iter()
        .filter(|uid| after.is_none_or(|last| *uid > last))
        .collect();
    uids.sort_unstable();

    if uids.len() > max {
        match after {
            Some(_) => uids.truncate(max),
            None => {
                uids.drain(..uids.len() - max);
            }
        }
    }
    uids
}

fn tls_connector() -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .context("Failed to configure TLS")?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

impl ImapGateway {
    pub fn new(config: MailConfig, password: Option<String>) -> Result<Self> {
        Ok(Self {
            config,
            password,
            tls: tls_connector()?,
        })
    }

    async fn connect(&self) -> Result<ImapSession> {
        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GatewayError::NotAuthenticated("no IMAP password configured".into()))?;

        let addr = format!("{}:{}", self.config.server, self.config.port);
        let tcp = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("Failed to connect to {}", addr))?;

        let server_name = ServerName::try_from(self.config.server.clone())
            .with_context(|| format!("Invalid server name '{}'", self.config.server))?;
        let tls_stream = self
            .tls
            .connect(server_name, tcp)
            .await
            .context("TLS handshake failed")?;

        // async-imap speaks futures-io
        let client = async_imap::Client::new(tls_stream.compat());

        let session = client
            .login(&self.config.username, password)
            .await
            .map_err(|(e, _)| GatewayError::NotAuthenticated(format!("Login failed: {}", e)))?;

        tracing::info!("Connected to IMAP server {}", self.config.server);
        Ok(session)
    }

    async fn fetch_with(
        &self,
        session: &mut ImapSession,
        since: &SyncCheckpoint,
    ) -> Result<FetchBatch> {
        let folder = &self.config.folder;
        let mailbox = session
            .select(folder)
            .await
            .with_context(|| format!("Failed to select folder '{}'", folder))?;
        let validity = mailbox.uid_validity.unwrap_or(0);

        let last_uid = since
            .cursor
            .as_deref()
            .and_then(parse_cursor)
            .filter(|(v, _)| *v == validity)
            .map(|(_, uid)| uid);

        let query = match last_uid {
            Some(last) => format!("UID {}:*", last.saturating_add(1)),
            None => {
                let since_date = Utc::now() - chrono::Duration::days(self.config.initial_lookback_days);
                format!("SINCE {}", since_date.format("%d-%b-%Y"))
            }
        };

        let found = session
            .uid_search(&query)
            .await
            .with_context(|| format!("UID SEARCH {} failed", query))?;
        let uids = select_uids(found, last_uid, self.config.max_fetch);

        let fallback_last = last_uid.unwrap_or_else(|| mailbox.uid_next.unwrap_or(1).saturating_sub(1));
        let highest = uids.last().copied().unwrap_or(fallback_last);
        let new_cursor = Some(format_cursor(validity, highest.max(fallback_last)));

        if uids.is_empty() {
            tracing::debug!("No new messages in {}", folder);
            return Ok(FetchBatch {
                messages: Vec::new(),
                new_cursor,
            });
        }

        let uid_set = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        // PEEK leaves the \Seen flag alone
        let mut fetches = session
            .uid_fetch(&uid_set, "(UID INTERNALDATE BODY.PEEK[])")
            .await
            .context("Failed to fetch messages")?;

        let now = Utc::now().timestamp();
        let mut messages: Vec<CanonicalMessage> = Vec::with_capacity(uids.len());
        while let Some(result) = fetches.next().await {
            let fetch = result.context("Failed to fetch message")?;
            let (Some(uid), Some(raw)) = (fetch.uid, fetch.body()) else {
                continue;
            };
            let received = fetch
                .internal_date()
                .map(|d| d.timestamp())
                .unwrap_or(now);
            match parse_message(raw, &format_cursor(validity, uid), received) {
                Some(message) => messages.push(message),
                None => tracing::warn!("Skipping unparsable message uid {}", uid),
            }
        }

        tracing::info!("Fetched {} messages from {}", messages.len(), folder);
        Ok(FetchBatch {
            messages,
            new_cursor,
        })
    }
}

#[async_trait]
impl MailGateway for ImapGateway {
    async fn fetch_new_messages(&self, since: &SyncCheckpoint) -> Result<FetchBatch> {
        let mut session = self.connect().await?;
        let result = self.fetch_with(&mut session, since).await;
        session.logout().await.ok();
        result
    }
}
