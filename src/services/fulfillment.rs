use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::{config::FulfillmentConfig, errors::ServiceError};

const PACKET_TYPE_AUTH: i32 = 3;
const PACKET_TYPE_EXECCOMMAND: i32 = 2;
const AUTH_FAILED_ID: i32 = -1;
const MAX_BODY_LEN: usize = 4096;

/// Sends one ordered batch of rendered commands to the game server.
///
/// The whole list is one attempt: the first failure fails the attempt, and
/// partial execution before that failure still counts as a failed attempt.
#[async_trait]
pub trait FulfillmentExecutor: Send + Sync {
    async fn execute(&self, commands: &[String]) -> Result<(), ServiceError>;
}

/// Builds the configured executor: RCON when the control channel is fully
/// configured, otherwise the disabled stand-in whose fixed failure reason
/// routes paid orders to the audit-log fallback.
pub fn executor_from_config(config: &FulfillmentConfig) -> Arc<dyn FulfillmentExecutor> {
    match (&config.host, config.port, &config.password) {
        (Some(host), Some(port), Some(password)) => Arc::new(RconExecutor::new(
            host.clone(),
            port,
            password.clone(),
        )),
        _ => Arc::new(DisabledExecutor),
    }
}

/// Executor used when no game-server control channel is configured.
pub struct DisabledExecutor;

#[async_trait]
impl FulfillmentExecutor for DisabledExecutor {
    async fn execute(&self, _commands: &[String]) -> Result<(), ServiceError> {
        Err(ServiceError::FulfillmentError(
            "remote execution disabled; deliver manually from the audit log".to_string(),
        ))
    }
}

/// Source-RCON executor. Opens a fresh connection per attempt,
/// authenticates, then sends each command in order.
pub struct RconExecutor {
    host: String,
    port: u16,
    password: String,
}

impl RconExecutor {
    pub fn new(host: String, port: u16, password: String) -> Self {
        Self {
            host,
            port,
            password,
        }
    }
}

#[async_trait]
impl FulfillmentExecutor for RconExecutor {
    #[instrument(skip(self, commands), fields(host = %self.host, count = commands.len()))]
    async fn execute(&self, commands: &[String]) -> Result<(), ServiceError> {
        let mut conn = RconConnection::connect(&self.host, self.port, &self.password).await?;
        for command in commands {
            conn.exec(command).await?;
        }
        debug!("all fulfillment commands accepted");
        Ok(())
    }
}

struct RconConnection {
    stream: TcpStream,
    next_id: i32,
}

impl RconConnection {
    async fn connect(host: &str, port: u16, password: &str) -> Result<Self, ServiceError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| ServiceError::FulfillmentError(format!("connect failed: {}", e)))?;
        let mut conn = Self { stream, next_id: 1 };

        let id = conn.send_packet(PACKET_TYPE_AUTH, password).await?;
        let (response_id, _) = conn.read_packet().await?;
        if response_id == AUTH_FAILED_ID {
            return Err(ServiceError::FulfillmentError(
                "authentication rejected".to_string(),
            ));
        }
        if response_id != id {
            return Err(ServiceError::FulfillmentError(format!(
                "unexpected auth response id {}",
                response_id
            )));
        }
        Ok(conn)
    }

    async fn exec(&mut self, command: &str) -> Result<(), ServiceError> {
        let id = self.send_packet(PACKET_TYPE_EXECCOMMAND, command).await?;
        let (response_id, body) = self.read_packet().await?;
        if response_id != id {
            return Err(ServiceError::FulfillmentError(format!(
                "unexpected response id {} for command",
                response_id
            )));
        }
        debug!(command, response = %body, "command accepted");
        Ok(())
    }

    async fn send_packet(&mut self, packet_type: i32, body: &str) -> Result<i32, ServiceError> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        // Packet layout: length prefix, then id, type, NUL-terminated body
        // plus an empty trailing string, all little-endian.
        let len = 4 + 4 + body.len() + 2;
        let mut buf = BytesMut::with_capacity(4 + len);
        buf.put_i32_le(len as i32);
        buf.put_i32_le(id);
        buf.put_i32_le(packet_type);
        buf.put_slice(body.as_bytes());
        buf.put_u8(0);
        buf.put_u8(0);

        self.stream
            .write_all(&buf)
            .await
            .map_err(|e| ServiceError::FulfillmentError(format!("write failed: {}", e)))?;
        Ok(id)
    }

    async fn read_packet(&mut self) -> Result<(i32, String), ServiceError> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| ServiceError::FulfillmentError(format!("read failed: {}", e)))?;
        let len = i32::from_le_bytes(len_buf);
        if len < 10 || len as usize > MAX_BODY_LEN {
            return Err(ServiceError::FulfillmentError(format!(
                "invalid packet length {}",
                len
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| ServiceError::FulfillmentError(format!("read failed: {}", e)))?;

        let mut payload = BytesMut::from(&payload[..]);
        let id = payload.get_i32_le();
        let _packet_type = payload.get_i32_le();
        // Strip the two trailing NULs.
        let body_len = payload.len().saturating_sub(2);
        let body = String::from_utf8_lossy(&payload[..body_len]).into_owned();
        Ok((id, body))
    }
}
