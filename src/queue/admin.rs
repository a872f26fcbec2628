//! Client for the queue server's text admin protocol (`status`, `workers`, `version`).

use crate::config::reconnect::Reconnect;
use crate::connection::{ConnectionManager, Connector};
use crate::error::WorkhorseResult;
use crate::error::transport::TransportError;
use async_trait::async_trait;
use futures::FutureExt;
use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

const STATUS: &str = "status";
const WORKERS: &str = "workers";
const VERSION: &str = "version";
const END_OF_LIST: &str = ".";

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FunctionStatus {
    pub function: String,
    /// Jobs queued or running.
    pub total: u64,
    pub running: u64,
    pub available_workers: u64,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub fd: u64,
    pub address: String,
    pub client_id: String,
    pub functions: Vec<String>,
}

pub struct AdminConnector {
    address: String,
    timeout: Duration,
}

#[async_trait]
impl Connector for AdminConnector {
    type Connection = BufStream<TcpStream>;
    type Error = TransportError;

    fn name(&self) -> &str {
        "queue admin"
    }

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| TransportError::Timeout(format!("connecting to {}", self.address)))?
            .map_err(|err| TransportError::Connection(format!("{}: {err}", self.address)))?;
        Ok(BufStream::new(stream))
    }

    fn is_transient(&self, error: &Self::Error) -> bool {
        error.is_transient()
    }
}

/// Queries a queue server's admin interface. Connects on first use.
pub struct ServerAdmin {
    manager: ConnectionManager<AdminConnector>,
    timeout: Duration,
}

impl ServerAdmin {
    pub fn new(address: impl Into<String>, timeout: Duration, reconnect: Reconnect) -> Self {
        Self {
            manager: ConnectionManager::new(
                AdminConnector {
                    address: address.into(),
                    timeout,
                },
                reconnect,
            ),
            timeout,
        }
    }

    pub async fn status(&mut self) -> WorkhorseResult<Vec<FunctionStatus>> {
        let lines = self.command(STATUS, false).await?;
        Ok(parse_status(&lines)?)
    }

    pub async fn workers(&mut self) -> WorkhorseResult<Vec<WorkerInfo>> {
        let lines = self.command(WORKERS, false).await?;
        Ok(parse_workers(&lines)?)
    }

    pub async fn version(&mut self) -> WorkhorseResult<String> {
        let lines = self.command(VERSION, true).await?;
        Ok(lines.into_iter().next().unwrap_or_default())
    }

    async fn command(&mut self, command: &'static str, single: bool) -> WorkhorseResult<Vec<String>> {
        let timeout = self.timeout;
        let lines = self
            .manager
            .with_retry(|stream| {
                async move {
                    stream.write_all(format!("{command}\n").as_bytes()).await?;
                    stream.flush().await?;

                    let mut lines = Vec::new();
                    loop {
                        let line = read_line(stream, timeout).await?;
                        if single {
                            lines.push(line);
                            break;
                        }
                        if line == END_OF_LIST {
                            break;
                        }
                        lines.push(line);
                    }
                    Ok(lines)
                }
                .boxed()
            })
            .await?;
        Ok(lines)
    }
}

async fn read_line(
    stream: &mut BufStream<TcpStream>,
    timeout: Duration,
) -> Result<String, TransportError> {
    let mut line = String::new();
    let read = tokio::time::timeout(timeout, stream.read_line(&mut line))
        .await
        .map_err(|_| TransportError::Timeout("reading admin response".to_string()))??;
    if read == 0 {
        return Err(TransportError::Connection(
            "connection closed by the queue server".to_string(),
        ));
    }
    Ok(line.trim().to_string())
}

/// Parse `status` rows: `function\ttotal\trunning\tavailable_workers`.
pub fn parse_status(lines: &[String]) -> Result<Vec<FunctionStatus>, TransportError> {
    lines
        .iter()
        .map(|line| {
            let invalid = || TransportError::Protocol(format!("Invalid status row: {line:?}"));
            let (function, total, running, workers) =
                line.split('\t').collect_tuple().ok_or_else(invalid)?;
            let number = |value: &str| value.trim().parse::<u64>().map_err(|_| invalid());
            Ok(FunctionStatus {
                function: function.to_string(),
                total: number(total)?,
                running: number(running)?,
                available_workers: number(workers)?,
            })
        })
        .collect()
}

/// Parse `workers` rows: `fd address client_id : function function…`.
pub fn parse_workers(lines: &[String]) -> Result<Vec<WorkerInfo>, TransportError> {
    lines
        .iter()
        .map(|line| {
            let invalid = || TransportError::Protocol(format!("Invalid worker row: {line:?}"));
            let (connection, functions) = line
                .split_once(" : ")
                .or_else(|| line.strip_suffix(" :").map(|connection| (connection, "")))
                .ok_or_else(invalid)?;
            let (fd, address, client_id) = connection
                .split_whitespace()
                .collect_tuple()
                .ok_or_else(invalid)?;
            Ok(WorkerInfo {
                fd: fd.parse().map_err(|_| invalid())?,
                address: address.to_string(),
                client_id: client_id.to_string(),
                functions: functions.split_whitespace().map(str::to_string).collect(),
            })
        })
        .collect()
}

/// Render `status` rows as an aligned table.
pub fn format_status(status: &[FunctionStatus]) -> String {
    let width = status
        .iter()
        .map(|row| row.function.len())
        .chain(std::iter::once("Function".len()))
        .max()
        .unwrap_or_default();
    let row = |function: &str, total: &str, running: &str, workers: &str| {
        format!("{function:<width$} : {total:<10} {running:<10} {workers:<10}")
            .trim_end()
            .to_string()
    };

    let mut output = vec![
        String::new(),
        row("Function", "Enqueued", "Running", "Workers"),
        String::new(),
    ];
    output.extend(status.iter().map(|status| {
        row(
            &status.function,
            &status.total.to_string(),
            &status.running.to_string(),
            &status.available_workers.to_string(),
        )
    }));
    output.join("\n") + "\n"
}
