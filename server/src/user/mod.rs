mod pending_connection;

pub use pending_connection::PendingConnection;
