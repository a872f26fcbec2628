//! Contract with the queue server. The wire protocol lives behind [`ClientTransport`] and
//! [`WorkerTransport`]; this crate ships an in-process [`memory::MemoryQueue`] and a line-protocol
//! [`admin::ServerAdmin`].

use crate::config::queue::QueueOption;
use crate::connection::Connector;
use crate::error::transport::TransportError;
use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display, EnumString, IntoStaticStr};

pub mod admin;
pub mod client;
pub mod memory;
pub mod worker;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// The submission calls a queue server offers: one per priority, each in a foreground (wait for
/// the result) and a background (return the handle) flavor.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Primitive {
    Do,
    DoLow,
    DoHigh,
    DoBackground,
    DoLowBackground,
    DoHighBackground,
}

impl Primitive {
    pub fn select(priority: Priority, background: bool) -> Self {
        match (priority, background) {
            (Priority::Normal, false) => Primitive::Do,
            (Priority::Low, false) => Primitive::DoLow,
            (Priority::High, false) => Primitive::DoHigh,
            (Priority::Normal, true) => Primitive::DoBackground,
            (Priority::Low, true) => Primitive::DoLowBackground,
            (Priority::High, true) => Primitive::DoHighBackground,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Primitive::Do | Primitive::DoBackground => Priority::Normal,
            Primitive::DoLow | Primitive::DoLowBackground => Priority::Low,
            Primitive::DoHigh | Primitive::DoHighBackground => Priority::High,
        }
    }

    pub fn is_background(&self) -> bool {
        matches!(
            self,
            Primitive::DoBackground | Primitive::DoLowBackground | Primitive::DoHighBackground
        )
    }
}

/// One job handed to a worker by the queue server.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Delivery {
    pub handle: String,
    pub function: String,
    pub unique: Option<String>,
    pub workload: String,
}

/// What a worker reports back for a delivery.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Completion {
    /// The job was handled; the string is the result handed back to a foreground caller.
    Success(String),
    /// The job can never succeed and must not be handed out again.
    Fail,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ClientTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ClientConnection>, TransportError>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ClientConnection: Send {
    /// Submit a job. Background primitives return the job handle, foreground primitives return
    /// the result the worker reported.
    async fn submit(
        &mut self,
        primitive: Primitive,
        function: &str,
        workload: &str,
        unique: Option<String>,
    ) -> Result<String, TransportError>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn connect(
        &self,
        options: &[QueueOption],
    ) -> Result<Box<dyn WorkerConnection>, TransportError>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait WorkerConnection: Send {
    async fn add_function(&mut self, function: &str) -> Result<(), TransportError>;

    async fn unregister(&mut self, function: &str) -> Result<(), TransportError>;

    /// Wait up to `timeout` for a job for one of the registered functions.
    async fn grab(&mut self, timeout: Duration) -> Result<Option<Delivery>, TransportError>;

    async fn complete(&mut self, handle: &str, completion: Completion)
    -> Result<(), TransportError>;
}

pub struct ClientConnector {
    transport: Arc<dyn ClientTransport>,
}

impl ClientConnector {
    pub fn new(transport: Arc<dyn ClientTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Connector for ClientConnector {
    type Connection = Box<dyn ClientConnection>;
    type Error = TransportError;

    fn name(&self) -> &str {
        "queue client"
    }

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.transport.connect().await
    }

    fn is_transient(&self, error: &Self::Error) -> bool {
        error.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Priority::Normal, false, Primitive::Do)]
    #[case(Priority::Low, false, Primitive::DoLow)]
    #[case(Priority::High, false, Primitive::DoHigh)]
    #[case(Priority::Normal, true, Primitive::DoBackground)]
    #[case(Priority::Low, true, Primitive::DoLowBackground)]
    #[case(Priority::High, true, Primitive::DoHighBackground)]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn select_primitive(
        #[case] priority: Priority,
        #[case] background: bool,
        #[case] expected: Primitive,
    ) {
        let primitive = Primitive::select(priority, background);
        assert_eq!(primitive, expected);
        assert_eq!(primitive.priority(), priority);
        assert_eq!(primitive.is_background(), background);
    }

    #[test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn primitive_display() {
        assert_eq!(Primitive::DoHighBackground.to_string(), "doHighBackground");
    }
}
