//! # MiniPACS Web
//!
//! REST与WADO风格的HTTP服务，路由根为 /api。

pub mod handlers;
pub mod server;
pub mod wado;

pub use server::{create_app, AppState, WebServer};
