//! TCP accept and cross-runner socket hand-off, built on `engine-io`'s reactor and
//! `engine-actor`'s mailboxes.

pub mod error;
pub mod socket_router_service;
pub mod tcp_server_service;

pub use error::NetError;
pub use socket_router_service::{SocketIntakeService, SocketRouterService, SOCKET_INTAKE};
pub use tcp_server_service::{OpenSocketSet, TcpServerService};
