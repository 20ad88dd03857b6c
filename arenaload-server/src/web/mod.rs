//! The JSON control surface webserver.
//!
//! The application is implemented in the [`App`] struct, which sets up routing and middleware. To
//! listen to incoming connections, use the [`server()`] function, which opens a TCP listener,
//! resumes a previous simulation run and serves the application until the process is terminated.

mod app;
mod middleware;
mod server;

pub use app::App;
pub use server::server;
